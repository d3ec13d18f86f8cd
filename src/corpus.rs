//! Greedy, order-dependent corpus of mutually distinct traces.
//!
//! Each candidate is compared against every member admitted so far and kept
//! only if its best match stays below the threshold. Decisions are final, so
//! the result depends on arrival order and is not a global clustering.

use serde::Serialize;

use crate::similarity::similarity;
use crate::types::{has_minimum_lines, Excluded, Trace, TraceInput};

/// What happened to one offered trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Admission {
    /// Appended to the corpus at `position`.
    Distinct {
        position: usize,
        best_similarity: Option<f64>,
    },
    /// Rejected: `best_similarity` against `closest_label` reached the threshold.
    Similar {
        closest_position: usize,
        closest_label: String,
        best_similarity: f64,
    },
    /// Fewer lines than the configured minimum; never compared.
    Skipped { line_count: usize },
    /// Malformed input, dropped before comparison.
    Excluded { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub index: usize,
    pub label: String,
    #[serde(flatten)]
    pub admission: Admission,
}

/// Outcome of one corpus pass.
#[derive(Debug, Clone, Serialize)]
pub struct CorpusReport {
    pub threshold: f64,
    pub minimum_lines: usize,
    pub distinct_count: usize,
    pub similar_count: usize,
    pub skipped_count: usize,
    pub excluded_count: usize,
    #[serde(skip)]
    pub corpus: Vec<Trace>,
    pub decisions: Vec<Decision>,
    pub excluded: Vec<Excluded>,
}

impl CorpusReport {
    /// Raw texts of the admitted traces, in admission order.
    pub fn corpus_texts(&self) -> Vec<&str> {
        self.corpus.iter().map(|t| t.text.as_str()).collect()
    }
}

pub struct CorpusDeduplicator {
    threshold: f64,
    minimum_lines: usize,
    members: Vec<Trace>,
    decisions: Vec<Decision>,
    excluded: Vec<Excluded>,
    similar_count: usize,
    skipped_count: usize,
}

impl CorpusDeduplicator {
    /// `threshold` is a percentage in `[0, 100]`; validate it at the
    /// configuration boundary before constructing.
    pub fn new(threshold: f64, minimum_lines: usize) -> Self {
        Self {
            threshold,
            minimum_lines,
            members: Vec::new(),
            decisions: Vec::new(),
            excluded: Vec::new(),
            similar_count: 0,
            skipped_count: 0,
        }
    }

    /// Decide on one candidate. Candidates must be offered in arrival order.
    pub fn offer(&mut self, input: TraceInput) -> &Admission {
        let index = self.decisions.len();
        let label = input.label.clone();
        let admission = self.decide(index, input);
        self.decisions.push(Decision {
            index,
            label,
            admission,
        });
        &self.decisions[index].admission
    }

    fn decide(&mut self, index: usize, input: TraceInput) -> Admission {
        if !has_minimum_lines(&input.text, self.minimum_lines) {
            let line_count = input.text.lines().count();
            tracing::debug!(
                "Skipping trace {index} ({}): {line_count} lines < {}",
                input.label,
                self.minimum_lines
            );
            self.skipped_count += 1;
            return Admission::Skipped { line_count };
        }

        let candidate = match Trace::parse(input) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!("Excluding trace {index}: {e}");
                self.excluded.push(Excluded {
                    index,
                    label: e.label().to_string(),
                    reason: e.to_string(),
                });
                return Admission::Excluded {
                    reason: e.to_string(),
                };
            }
        };

        let best = self.best_match(&candidate);
        match best {
            Some((position, score)) if score >= self.threshold => {
                let closest_label = self.members[position].label.clone();
                tracing::debug!(
                    "Trace {index} ({}) is {score:.2}% similar to corpus member {position} ({closest_label})",
                    candidate.label
                );
                self.similar_count += 1;
                Admission::Similar {
                    closest_position: position,
                    closest_label,
                    best_similarity: score,
                }
            }
            _ => {
                let position = self.members.len();
                tracing::debug!(
                    "Trace {index} ({}) admitted as corpus member {position}",
                    candidate.label
                );
                self.members.push(candidate);
                Admission::Distinct {
                    position,
                    best_similarity: best.map(|(_, score)| score),
                }
            }
        }
    }

    /// Highest-scoring member (first one on ties) and its score.
    fn best_match(&self, candidate: &Trace) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (position, member) in self.members.iter().enumerate() {
            let score = if member.fingerprint == candidate.fingerprint
                && !member.chain.is_empty()
                && !candidate.chain.is_empty()
            {
                100.0
            } else {
                similarity(&candidate.chain, &member.chain)
            };
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((position, score));
            }
        }
        best
    }

    pub fn finish(self) -> CorpusReport {
        CorpusReport {
            threshold: self.threshold,
            minimum_lines: self.minimum_lines,
            distinct_count: self.members.len(),
            similar_count: self.similar_count,
            skipped_count: self.skipped_count,
            excluded_count: self.excluded.len(),
            corpus: self.members,
            decisions: self.decisions,
            excluded: self.excluded,
        }
    }

    /// Run a whole stream through the deduplicator.
    pub fn process<I>(threshold: f64, minimum_lines: usize, inputs: I) -> CorpusReport
    where
        I: IntoIterator<Item = TraceInput>,
    {
        let mut dedup = Self::new(threshold, minimum_lines);
        for input in inputs {
            dedup.offer(input);
        }
        let report = dedup.finish();
        tracing::info!(
            "Corpus: {} distinct, {} similar, {} skipped, {} excluded",
            report.distinct_count,
            report.similar_count,
            report.skipped_count,
            report.excluded_count
        );
        report
    }
}
