use serde::{Deserialize, Serialize};
use std::fmt;

use crate::chain::SegmentChain;
use crate::error::TraceError;

/// One raw trace as handed over by a loader or caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceInput {
    /// Where the trace came from (file stem, directory, request index...).
    pub label: String,
    pub text: String,
}

impl TraceInput {
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }
}

/// A trace with its segment chain computed once up front.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub label: String,
    pub text: String,
    pub chain: SegmentChain,
    pub fingerprint: String,
}

impl Trace {
    /// Reduce an input to its chain. Blank input is rejected so batches can
    /// exclude it without aborting.
    pub fn parse(input: TraceInput) -> Result<Self, TraceError> {
        if input.text.trim().is_empty() {
            return Err(TraceError::Blank(input.label));
        }
        let chain = SegmentChain::from_trace(&input.text);
        let fingerprint = chain.fingerprint();
        Ok(Self {
            label: input.label,
            text: input.text,
            chain,
            fingerprint,
        })
    }

    pub fn line_count(&self) -> usize {
        self.text.lines().count()
    }
}

/// True if `text` has at least `minimum` lines. Short traces carry too little
/// structure to compare meaningfully.
pub fn has_minimum_lines(text: &str, minimum: usize) -> bool {
    minimum == 0 || text.lines().nth(minimum - 1).is_some()
}

/// How a loaded trace file is turned into a source label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LabelMode {
    /// File name without extension.
    File,
    /// Name of the containing directory.
    Dir,
}

impl fmt::Display for LabelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelMode::File => write!(f, "file"),
            LabelMode::Dir => write!(f, "dir"),
        }
    }
}

impl std::str::FromStr for LabelMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(LabelMode::File),
            "dir" => Ok(LabelMode::Dir),
            _ => Err(format!("unknown label mode: {s}")),
        }
    }
}

/// Which pairs the pairwise scanner compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelPolicy {
    /// Skip pairs whose labels are equal.
    CrossLabelOnly,
    AllPairs,
}

impl LabelPolicy {
    pub fn from_cross_label_only(cross_label_only: bool) -> Self {
        if cross_label_only {
            LabelPolicy::CrossLabelOnly
        } else {
            LabelPolicy::AllPairs
        }
    }

    pub fn should_compare(self, label_a: &str, label_b: &str) -> bool {
        match self {
            LabelPolicy::CrossLabelOnly => label_a != label_b,
            LabelPolicy::AllPairs => true,
        }
    }
}

impl fmt::Display for LabelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelPolicy::CrossLabelOnly => write!(f, "cross-label-only"),
            LabelPolicy::AllPairs => write!(f, "all-pairs"),
        }
    }
}

/// A batch item dropped before comparison because it was malformed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Excluded {
    pub index: usize,
    pub label: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_minimum_lines() {
        let text = "a\nb\nc";
        assert!(has_minimum_lines(text, 0));
        assert!(has_minimum_lines(text, 3));
        assert!(!has_minimum_lines(text, 4));
        assert!(has_minimum_lines("", 0));
        assert!(!has_minimum_lines("", 1));
    }

    #[test]
    fn test_trace_parse_rejects_blank() {
        let err = Trace::parse(TraceInput::new("svc-a", "  \n\t")).unwrap_err();
        assert_eq!(err, TraceError::Blank("svc-a".to_string()));
    }

    #[test]
    fn test_trace_parse_keeps_text_and_chain() {
        let trace = Trace::parse(TraceInput::new("svc-a", "boom\nat a.b.C.m(C.java:1)")).unwrap();
        assert_eq!(trace.label, "svc-a");
        assert_eq!(trace.line_count(), 2);
        assert_eq!(trace.chain.prefixes(), vec!["a.b.C"]);
        assert_eq!(trace.fingerprint, trace.chain.fingerprint());
    }

    #[test]
    fn test_label_policy() {
        assert!(!LabelPolicy::CrossLabelOnly.should_compare("x", "x"));
        assert!(LabelPolicy::CrossLabelOnly.should_compare("x", "y"));
        assert!(LabelPolicy::AllPairs.should_compare("x", "x"));
        assert_eq!(LabelPolicy::from_cross_label_only(true), LabelPolicy::CrossLabelOnly);
    }

    #[test]
    fn test_label_mode_parse() {
        assert_eq!("DIR".parse::<LabelMode>().unwrap(), LabelMode::Dir);
        assert!("path".parse::<LabelMode>().is_err());
        assert_eq!(LabelMode::File.to_string(), "file");
    }
}
