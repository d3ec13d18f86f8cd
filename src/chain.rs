//! Run-length-encoded segment chains.
//!
//! A chain is the structural shape of one trace: its frame prefixes read from
//! the innermost call outward, with consecutive repeats folded into a single
//! [`Segment`].

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::frame;

/// A maximal run of consecutive frames sharing one prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    pub prefix: String,
    pub count: usize,
}

impl Segment {
    pub fn new(prefix: impl Into<String>, count: usize) -> Self {
        Self {
            prefix: prefix.into(),
            count,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "('{}', {})", self.prefix, self.count)
    }
}

/// Ordered segments of one trace, innermost frame first.
///
/// Adjacent segments never share a prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentChain {
    segments: Vec<Segment>,
}

impl SegmentChain {
    /// Build the chain for a raw trace: keep frame lines, reverse them, then
    /// fold runs of equal prefixes.
    pub fn from_trace(text: &str) -> Self {
        let prefixes: Vec<String> = frame::frames(text).map(frame::extract_prefix).collect();
        Self::from_prefixes(prefixes.into_iter().rev())
    }

    /// Fold an already innermost-first prefix sequence.
    pub fn from_prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut segments: Vec<Segment> = Vec::new();
        for prefix in prefixes {
            let prefix = prefix.into();
            match segments.last_mut() {
                Some(last) if last.prefix == prefix => last.count += 1,
                _ => segments.push(Segment::new(prefix, 1)),
            }
        }
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Prefix-only projection; this is what similarity is computed over.
    pub fn prefixes(&self) -> Vec<&str> {
        self.segments.iter().map(|s| s.prefix.as_str()).collect()
    }

    /// Number of frames the chain was built from.
    pub fn frame_count(&self) -> usize {
        self.segments.iter().map(|s| s.count).sum()
    }

    /// Undo the encoding: the frame prefixes in source (outermost-last) order.
    #[cfg(test)]
    pub fn expand(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .segments
            .iter()
            .flat_map(|s| std::iter::repeat(s.prefix.as_str()).take(s.count))
            .collect();
        out.reverse();
        out
    }

    /// SHA-256 over the prefix projection. Two chains with the same
    /// fingerprint score 100 against each other.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                hasher.update(b"\n");
            }
            hasher.update(segment.prefix.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

impl fmt::Display for SegmentChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE: &str = "java.lang.RuntimeException: boom
\tat com.acme.web.Handler.handle(Handler.java:40)
\tat com.acme.web.Handler$1.run(Handler.java:12)
\tat reactor.core.publisher.FluxMap$MapSubscriber.onNext(FluxMap.java:100)
\tat reactor.core.publisher.FluxMap.subscribe(FluxMap.java:60)
\tat java.lang.Thread.run(Thread.java:829)";

    #[test]
    fn test_chain_innermost_first() {
        let chain = SegmentChain::from_trace(SAMPLE);
        assert_eq!(
            chain.segments(),
            &[
                Segment::new("java.lang.Thread", 1),
                Segment::new("reactor.core.publisher.FluxMap", 2),
                Segment::new("com.acme.web.Handler", 2),
            ]
        );
        assert_eq!(chain.frame_count(), 5);
    }

    #[test]
    fn test_chain_identical_frames_example() {
        let trace = "at a.b.C.m1(C.java:1)\nat a.b.C.m2(C.java:2)";
        let chain = SegmentChain::from_trace(trace);
        assert_eq!(chain.segments(), &[Segment::new("a.b.C", 2)]);
    }

    #[test]
    fn test_chain_empty_without_frames() {
        let chain = SegmentChain::from_trace("Exception in thread main\nno frames here");
        assert!(chain.is_empty());
        assert_eq!(chain.frame_count(), 0);
        assert!(chain.expand().is_empty());
    }

    #[test]
    fn test_chain_non_adjacent_repeats_stay_separate() {
        let chain = SegmentChain::from_prefixes(["a", "a", "b", "a"]);
        assert_eq!(
            chain.segments(),
            &[Segment::new("a", 2), Segment::new("b", 1), Segment::new("a", 1)]
        );
    }

    #[test]
    fn test_fingerprint_ignores_counts() {
        let a = SegmentChain::from_prefixes(["x", "y"]);
        let b = SegmentChain::from_prefixes(["x", "x", "x", "y"]);
        let c = SegmentChain::from_prefixes(["y", "x"]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_display_matches_node_format() {
        let chain = SegmentChain::from_prefixes(["a.B", "a.B", "c.D"]);
        assert_eq!(chain.to_string(), "('a.B', 2)\n('c.D', 1)");
    }

    fn frame_line(class: &str, method: &str) -> String {
        format!("at {class}.{method}(X.java:1)")
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_expand_reconstructs_frame_prefixes(
            picks in proptest::collection::vec(0_usize..4, 0..40),
        ) {
            let classes = ["a.b.C", "a.b.D", "x.Y$Inner", "z.W"];
            let text: String = picks
                .iter()
                .map(|&i| frame_line(classes[i], "run"))
                .collect::<Vec<_>>()
                .join("\n");
            let expected: Vec<String> = frame::frames(&text).map(frame::extract_prefix).collect();

            let chain = SegmentChain::from_trace(&text);
            prop_assert_eq!(chain.expand(), expected.iter().map(String::as_str).collect::<Vec<_>>());
            prop_assert_eq!(chain.clone(), SegmentChain::from_trace(&text));
            for pair in chain.segments().windows(2) {
                prop_assert_ne!(&pair[0].prefix, &pair[1].prefix);
            }
            prop_assert!(chain.segments().iter().all(|s| s.count >= 1));
        }
    }
}
