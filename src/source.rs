//! Trace files: splitting multi-trace documents and labelling their traces.
//!
//! A trace file holds one or more traces separated by a line of dashes and may
//! start with a sidecar banner, which is removed before splitting. Only files
//! named by the caller are read.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::InputConfig;
use crate::error::ConfigError;
use crate::types::{LabelMode, TraceInput};

pub struct DocumentSplitter {
    separator: String,
    header: Option<Regex>,
    label_by: LabelMode,
}

/// Traces read from a batch of files, plus the files that could not be read.
#[derive(Debug, Default)]
pub struct LoadedTraces {
    pub traces: Vec<TraceInput>,
    pub failed: Vec<(PathBuf, String)>,
}

impl DocumentSplitter {
    pub fn new(input: &InputConfig) -> Result<Self, ConfigError> {
        if input.separator.is_empty() {
            return Err(ConfigError::EmptySeparator);
        }
        let header = match input.header_pattern.as_deref() {
            None | Some("") => None,
            Some(pattern) => Some(Regex::new(pattern).map_err(|e| {
                ConfigError::InvalidHeaderPattern {
                    pattern: pattern.to_string(),
                    reason: e.to_string(),
                }
            })?),
        };
        Ok(Self {
            separator: input.separator.clone(),
            header,
            label_by: input.label_by,
        })
    }

    fn strip_header<'a>(&self, content: &'a str) -> std::borrow::Cow<'a, str> {
        match &self.header {
            Some(re) => re.replace_all(content, ""),
            None => std::borrow::Cow::Borrowed(content),
        }
    }

    /// Every chunk between separators, trimmed, empty ones included. Keeps
    /// positions stable so two documents can be compared chunk by chunk.
    pub fn split_positional(&self, content: &str) -> Vec<String> {
        self.strip_header(content)
            .split(self.separator.as_str())
            .map(|chunk| chunk.trim().to_string())
            .collect()
    }

    /// Non-empty traces of a document.
    pub fn split(&self, content: &str) -> Vec<String> {
        self.split_positional(content)
            .into_iter()
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }

    pub fn label_for(&self, path: &Path) -> String {
        let name = match self.label_by {
            LabelMode::File => path.file_stem(),
            LabelMode::Dir => path.parent().and_then(|p| p.file_name()),
        };
        name.map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string())
    }

    pub fn load_file(&self, path: &Path) -> Result<Vec<TraceInput>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading traces: {}", path.display()))?;
        let label = self.label_for(path);
        let traces: Vec<TraceInput> = self
            .split(&content)
            .into_iter()
            .map(|text| TraceInput::new(label.clone(), text))
            .collect();
        tracing::debug!("{}: {} trace(s) as '{label}'", path.display(), traces.len());
        Ok(traces)
    }

    /// Load several files in order. An unreadable file is logged and skipped;
    /// the rest of the batch still loads.
    pub fn load_all<P: AsRef<Path>>(&self, paths: &[P]) -> LoadedTraces {
        let mut loaded = LoadedTraces::default();
        for path in paths {
            let path = path.as_ref();
            match self.load_file(path) {
                Ok(mut traces) => loaded.traces.append(&mut traces),
                Err(e) => {
                    tracing::warn!("Skipping {}: {e:#}", path.display());
                    loaded.failed.push((path.to_path_buf(), format!("{e:#}")));
                }
            }
        }
        tracing::info!(
            "Loaded {} trace(s) from {} file(s)",
            loaded.traces.len(),
            paths.len() - loaded.failed.len()
        );
        loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter() -> DocumentSplitter {
        DocumentSplitter::new(&InputConfig::default()).unwrap()
    }

    fn sep() -> String {
        "-".repeat(80)
    }

    #[test]
    fn test_split_on_dash_line() {
        let doc = format!("first\nat a.B.c(B.java:1)\n{}\nsecond\n{}\n", sep(), sep());
        assert_eq!(
            splitter().split(&doc),
            vec!["first\nat a.B.c(B.java:1)".to_string(), "second".to_string()]
        );
        assert_eq!(splitter().split_positional(&doc).len(), 3);
    }

    #[test]
    fn test_strips_sidecar_banner() {
        let doc = format!(
            "linkerd-proxy,istio-proxy,vault-agent\n\n\nboom\nat x.Y.z(Y.java:2)\n{}",
            sep()
        );
        assert_eq!(splitter().split(&doc), vec!["boom\nat x.Y.z(Y.java:2)".to_string()]);
    }

    #[test]
    fn test_custom_separator_and_no_header() {
        let cfg = InputConfig {
            separator: "=====".to_string(),
            header_pattern: None,
            label_by: LabelMode::File,
        };
        let splitter = DocumentSplitter::new(&cfg).unwrap();
        assert_eq!(splitter.split("a\n=====\nb"), vec!["a", "b"]);
    }

    #[test]
    fn test_rejects_bad_config() {
        let mut cfg = InputConfig::default();
        cfg.separator.clear();
        assert_eq!(
            DocumentSplitter::new(&cfg).err(),
            Some(ConfigError::EmptySeparator)
        );

        let cfg = InputConfig {
            header_pattern: Some("([unclosed".to_string()),
            ..InputConfig::default()
        };
        assert!(matches!(
            DocumentSplitter::new(&cfg),
            Err(ConfigError::InvalidHeaderPattern { .. })
        ));
    }

    #[test]
    fn test_labels() {
        let path = Path::new("/data/payments-api/run42_stacktrace.txt");
        assert_eq!(splitter().label_for(path), "run42_stacktrace");
        let by_dir = DocumentSplitter::new(&InputConfig {
            label_by: LabelMode::Dir,
            ..InputConfig::default()
        })
        .unwrap();
        assert_eq!(by_dir.label_for(path), "payments-api");
    }

    #[test]
    fn test_load_all_skips_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("svc_a.txt");
        std::fs::write(&good, format!("one\n{}\ntwo", sep())).unwrap();
        let missing = dir.path().join("missing.txt");

        let loaded = splitter().load_all(&[missing.clone(), good]);
        assert_eq!(loaded.traces.len(), 2);
        assert!(loaded.traces.iter().all(|t| t.label == "svc_a"));
        assert_eq!(loaded.failed.len(), 1);
        assert_eq!(loaded.failed[0].0, missing);
    }
}
