//! All-pairs similarity scan.
//!
//! Every unordered pair `(i, j)`, `i < j`, allowed by the [`LabelPolicy`] is
//! scored and recorded. That is O(N²) comparisons of O(m·n) each; the scan
//! does not prune. Chains are built once per trace up front.

use rayon::prelude::*;
use serde::Serialize;

use crate::similarity::similarity;
use crate::types::{Excluded, LabelPolicy, Trace, TraceInput};

/// One scored pair. Indices refer to positions in the scanned collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairRecord {
    pub i: usize,
    pub j: usize,
    pub label_i: String,
    pub label_j: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub threshold: f64,
    pub policy: LabelPolicy,
    pub trace_count: usize,
    pub total_comparisons: usize,
    pub above_threshold_count: usize,
    pub excluded_count: usize,
    pub pairs: Vec<PairRecord>,
    pub excluded: Vec<Excluded>,
}

impl ScanReport {
    /// Recorded pairs at or above the threshold, highest first.
    pub fn matches(&self) -> Vec<&PairRecord> {
        let mut hits: Vec<&PairRecord> = self
            .pairs
            .iter()
            .filter(|p| p.similarity >= self.threshold)
            .collect();
        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then(a.i.cmp(&b.i))
                .then(a.j.cmp(&b.j))
        });
        hits
    }
}

pub struct PairwiseScanner {
    threshold: f64,
    policy: LabelPolicy,
    parallel: bool,
}

impl PairwiseScanner {
    pub fn new(threshold: f64, policy: LabelPolicy, parallel: bool) -> Self {
        Self {
            threshold,
            policy,
            parallel,
        }
    }

    pub fn scan<I>(&self, inputs: I) -> ScanReport
    where
        I: IntoIterator<Item = TraceInput>,
    {
        let mut slots: Vec<Option<Trace>> = Vec::new();
        let mut excluded = Vec::new();
        for (index, input) in inputs.into_iter().enumerate() {
            match Trace::parse(input) {
                Ok(trace) => slots.push(Some(trace)),
                Err(e) => {
                    tracing::warn!("Excluding trace {index} from scan: {e}");
                    excluded.push(Excluded {
                        index,
                        label: e.label().to_string(),
                        reason: e.to_string(),
                    });
                    slots.push(None);
                }
            }
        }

        let present: Vec<(usize, &Trace)> = slots
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.as_ref().map(|t| (i, t)))
            .collect();

        let mut work: Vec<(usize, usize)> = Vec::new();
        for a in 0..present.len() {
            for b in a + 1..present.len() {
                if self.policy.should_compare(&present[a].1.label, &present[b].1.label) {
                    work.push((a, b));
                }
            }
        }

        tracing::info!(
            "Scanning {} traces: {} comparisons ({}{})",
            present.len(),
            work.len(),
            self.policy,
            if self.parallel { ", parallel" } else { "" }
        );

        let score = |&(a, b): &(usize, usize)| {
            let (i, ti) = present[a];
            let (j, tj) = present[b];
            PairRecord {
                i,
                j,
                label_i: ti.label.clone(),
                label_j: tj.label.clone(),
                similarity: similarity(&ti.chain, &tj.chain),
            }
        };

        // Collecting from an indexed parallel iterator preserves input order.
        let pairs: Vec<PairRecord> = if self.parallel {
            work.par_iter().map(score).collect()
        } else {
            work.iter().map(score).collect()
        };

        let above_threshold_count = pairs
            .iter()
            .filter(|p| p.similarity >= self.threshold)
            .count();

        ScanReport {
            threshold: self.threshold,
            policy: self.policy,
            trace_count: present.len(),
            total_comparisons: pairs.len(),
            above_threshold_count,
            excluded_count: excluded.len(),
            pairs,
            excluded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace_of(prefixes: &[&str]) -> String {
        let mut lines = vec!["java.lang.NullPointerException".to_string()];
        for p in prefixes.iter().rev() {
            lines.push(format!("\tat {p}.run({p}.java:7)"));
        }
        lines.join("\n")
    }

    fn inputs() -> Vec<TraceInput> {
        vec![
            TraceInput::new("alpha", trace_of(&["a", "b", "c", "d"])),
            TraceInput::new("alpha", trace_of(&["a", "b", "c", "d"])),
            TraceInput::new("beta", trace_of(&["a", "b", "c", "x"])),
            TraceInput::new("gamma", trace_of(&["w", "x", "y", "z"])),
        ]
    }

    #[test]
    fn test_cross_label_only_skips_same_label() {
        let report = PairwiseScanner::new(70.0, LabelPolicy::CrossLabelOnly, false).scan(inputs());
        // 6 pairs minus the (0, 1) alpha/alpha pair.
        assert_eq!(report.total_comparisons, 5);
        assert!(report.pairs.iter().all(|p| p.label_i != p.label_j));
        let keys: Vec<(usize, usize)> = report.pairs.iter().map(|p| (p.i, p.j)).collect();
        assert_eq!(keys, vec![(0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]);
        // (0,2) and (1,2) are 75%.
        assert_eq!(report.above_threshold_count, 2);
        assert_eq!(report.pairs[0].similarity, 75.0);
    }

    #[test]
    fn test_all_pairs_includes_same_label() {
        let report = PairwiseScanner::new(70.0, LabelPolicy::AllPairs, false).scan(inputs());
        assert_eq!(report.total_comparisons, 6);
        assert_eq!(report.pairs[0].similarity, 100.0);
        assert_eq!(report.above_threshold_count, 3);
    }

    #[test]
    fn test_records_below_threshold_pairs() {
        let report = PairwiseScanner::new(99.0, LabelPolicy::CrossLabelOnly, false).scan(inputs());
        assert_eq!(report.total_comparisons, 5);
        assert_eq!(report.above_threshold_count, 0);
        assert!(report.matches().is_empty());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut many = Vec::new();
        for n in 0..24 {
            let shape: Vec<String> = (0..6).map(|k| format!("p{}", (n * k + k) % 9)).collect();
            let refs: Vec<&str> = shape.iter().map(String::as_str).collect();
            many.push(TraceInput::new(format!("src{}", n % 5), trace_of(&refs)));
        }
        let seq = PairwiseScanner::new(50.0, LabelPolicy::CrossLabelOnly, false).scan(many.clone());
        let par = PairwiseScanner::new(50.0, LabelPolicy::CrossLabelOnly, true).scan(many);
        assert_eq!(seq.pairs, par.pairs);
        assert_eq!(seq.above_threshold_count, par.above_threshold_count);
    }

    #[test]
    fn test_blank_trace_excluded_indices_preserved() {
        let mut items = inputs();
        items.insert(1, TraceInput::new("blank", "\n \n"));
        let report = PairwiseScanner::new(70.0, LabelPolicy::AllPairs, false).scan(items);
        assert_eq!(report.excluded_count, 1);
        assert_eq!(report.excluded[0].index, 1);
        assert_eq!(report.trace_count, 4);
        assert!(report.pairs.iter().all(|p| p.i != 1 && p.j != 1));
        assert_eq!((report.pairs[0].i, report.pairs[0].j), (0, 2));
    }

    #[test]
    fn test_matches_sorted_by_score() {
        let report = PairwiseScanner::new(70.0, LabelPolicy::AllPairs, false).scan(inputs());
        let scores: Vec<f64> = report.matches().iter().map(|p| p.similarity).collect();
        assert_eq!(scores, vec![100.0, 75.0, 75.0]);
    }
}
