//! LCS-based similarity between segment chains.

use serde::Serialize;
use similar::{Algorithm, ChangeTag, TextDiff};

use crate::chain::SegmentChain;

/// Length of the longest common subsequence of two sequences.
///
/// Classic DP (`dp[i][j] = dp[i-1][j-1] + 1` on a match, otherwise
/// `max(dp[i-1][j], dp[i][j-1])`), kept to two rows sized by the shorter
/// input. O(m·n) time, O(min(m, n)) space.
pub fn lcs_length<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return 0;
    }

    let mut prev = vec![0usize; short.len() + 1];
    let mut curr = vec![0usize; short.len() + 1];

    for x in long {
        for (j, y) in short.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[short.len()]
}

/// Similarity percentage in `[0, 100]`: `LCS / max(m, n) * 100` over the
/// prefix projections. Repeat counts do not take part.
///
/// Returns `0.0` when either chain is empty. Not rounded.
///
/// Cost is one O(m·n) LCS per call; an all-pairs scan over N traces is
/// O(N² · m·n).
pub fn similarity(a: &SegmentChain, b: &SegmentChain) -> f64 {
    let seq_a = a.prefixes();
    let seq_b = b.prefixes();
    if seq_a.is_empty() || seq_b.is_empty() {
        return 0.0;
    }

    let lcs = lcs_length(&seq_a, &seq_b);
    let max_len = seq_a.len().max(seq_b.len());
    lcs as f64 / max_len as f64 * 100.0
}

/// Both chains of a compared pair together with their score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub chain_a: SegmentChain,
    pub chain_b: SegmentChain,
    pub similarity: f64,
}

/// Reduce two raw traces and score them.
pub fn compare(raw_a: &str, raw_b: &str) -> Comparison {
    let chain_a = SegmentChain::from_trace(raw_a);
    let chain_b = SegmentChain::from_trace(raw_b);
    let similarity = similarity(&chain_a, &chain_b);
    Comparison {
        chain_a,
        chain_b,
        similarity,
    }
}

/// Which side(s) of an alignment a prefix belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Both,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlignedPrefix {
    pub side: Side,
    pub prefix: String,
}

/// Side-by-side alignment of two chains' prefixes, for display only.
pub fn align(a: &SegmentChain, b: &SegmentChain) -> Vec<AlignedPrefix> {
    let seq_a = a.prefixes();
    let seq_b = b.prefixes();
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Lcs)
        .diff_slices(&seq_a[..], &seq_b[..]);

    diff.iter_all_changes()
        .map(|change| AlignedPrefix {
            side: match change.tag() {
                ChangeTag::Equal => Side::Both,
                ChangeTag::Delete => Side::Left,
                ChangeTag::Insert => Side::Right,
            },
            prefix: change.value().to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chain(prefixes: &[&str]) -> SegmentChain {
        SegmentChain::from_prefixes(prefixes.iter().copied())
    }

    /// Full-table LCS, used to check the rolling-row version.
    fn lcs_table(a: &[&str], b: &[&str]) -> usize {
        let (m, n) = (a.len(), b.len());
        let mut dp = vec![vec![0usize; n + 1]; m + 1];
        for i in 1..=m {
            for j in 1..=n {
                dp[i][j] = if a[i - 1] == b[j - 1] {
                    dp[i - 1][j - 1] + 1
                } else {
                    dp[i - 1][j].max(dp[i][j - 1])
                };
            }
        }
        dp[m][n]
    }

    #[test]
    fn test_lcs_known_values() {
        assert_eq!(lcs_length(&["a", "b", "c", "d"], &["b", "d"]), 2);
        assert_eq!(lcs_length(&["a", "b", "c"], &["c", "b", "a"]), 1);
        assert_eq!(lcs_length::<&str>(&[], &["a"]), 0);
        assert_eq!(
            lcs_length(&['A', 'B', 'C', 'B', 'D', 'A', 'B'], &['B', 'D', 'C', 'A', 'B', 'A']),
            4
        );
    }

    #[test]
    fn test_identical_traces_score_100() {
        let trace = "at a.b.C.m1(C.java:1)\nat a.b.C.m2(C.java:2)";
        let cmp = compare(trace, trace);
        assert_eq!(cmp.chain_a.segments().len(), 1);
        assert_eq!(cmp.chain_a.segments()[0].prefix, "a.b.C");
        assert_eq!(cmp.chain_a.segments()[0].count, 2);
        assert_eq!(cmp.similarity, 100.0);
    }

    #[test]
    fn test_disjoint_prefixes_score_0() {
        let a = SegmentChain::from_prefixes(["x.Y", "x.Y", "x.Y"]);
        let b = SegmentChain::from_prefixes(["p.Q", "p.Q", "p.Q"]);
        assert_eq!(similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_empty_chain_scores_0() {
        let cmp = compare("no frames at all", "at a.b.C.m(C.java:1)");
        assert!(cmp.chain_a.is_empty());
        assert_eq!(cmp.similarity, 0.0);
        assert_eq!(similarity(&SegmentChain::default(), &SegmentChain::default()), 0.0);
    }

    #[test]
    fn test_score_uses_longer_side() {
        let a = chain(&["a", "b", "c", "d"]);
        let b = chain(&["a", "c"]);
        assert_eq!(similarity(&a, &b), 50.0);
    }

    #[test]
    fn test_counts_do_not_affect_score() {
        let a = SegmentChain::from_prefixes(["a", "b"]);
        let b = SegmentChain::from_prefixes(["a", "a", "a", "b", "b"]);
        assert_eq!(similarity(&a, &b), 100.0);
    }

    #[test]
    fn test_align_covers_both_sides() {
        let a = chain(&["a", "b", "c"]);
        let b = chain(&["a", "x", "c", "y"]);
        let aligned = align(&a, &b);
        let left = aligned.iter().filter(|p| p.side != Side::Right).count();
        let right = aligned.iter().filter(|p| p.side != Side::Left).count();
        assert_eq!(left, 3);
        assert_eq!(right, 4);
        assert_eq!(aligned[0], AlignedPrefix { side: Side::Both, prefix: "a".into() });
    }

    fn arb_chain() -> impl Strategy<Value = SegmentChain> {
        proptest::collection::vec(prop_oneof![Just("a"), Just("b"), Just("c"), Just("d")], 0..24)
            .prop_map(|v| SegmentChain::from_prefixes(v))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn prop_symmetric(a in arb_chain(), b in arb_chain()) {
            prop_assert_eq!(similarity(&a, &b), similarity(&b, &a));
        }

        #[test]
        fn prop_bounded(a in arb_chain(), b in arb_chain()) {
            let s = similarity(&a, &b);
            prop_assert!((0.0..=100.0).contains(&s));
            if a.is_empty() || b.is_empty() {
                prop_assert_eq!(s, 0.0);
            }
        }

        #[test]
        fn prop_identity(a in arb_chain()) {
            prop_assume!(!a.is_empty());
            prop_assert_eq!(similarity(&a, &a), 100.0);
        }

        #[test]
        fn prop_rolling_rows_match_full_table(a in arb_chain(), b in arb_chain()) {
            let (pa, pb) = (a.prefixes(), b.prefixes());
            prop_assert_eq!(lcs_length(&pa, &pb), lcs_table(&pa, &pb));
        }
    }
}
