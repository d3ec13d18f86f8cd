//! Console rendering and on-disk persistence of comparison results.
//!
//! Scores are rounded to two decimals here and nowhere else.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use crate::corpus::{Admission, CorpusReport};
use crate::scanner::ScanReport;
use crate::similarity::{AlignedPrefix, Comparison, Side};

pub fn format_similarity(score: f64) -> String {
    format!("{score:.2}%")
}

fn colored_score(score: f64, threshold: f64) -> colored::ColoredString {
    let text = format_similarity(score);
    if score >= threshold {
        text.red().bold()
    } else {
        text.green()
    }
}

/// Nodes of both traces followed by their similarity.
pub fn render_comparison(cmp: &Comparison, alignment: Option<&[AlignedPrefix]>) -> String {
    let mut lines: Vec<String> = vec!["Nodes for Trace 1:".bold().to_string()];
    lines.extend(cmp.chain_a.segments().iter().map(|s| format!("   {s}")));
    lines.push(String::new());
    lines.push("Nodes for Trace 2:".bold().to_string());
    lines.extend(cmp.chain_b.segments().iter().map(|s| format!("   {s}")));

    if let Some(aligned) = alignment {
        lines.push(String::new());
        lines.push("Alignment:".bold().to_string());
        for entry in aligned {
            let line = match entry.side {
                Side::Both => format!("  = {}", entry.prefix).normal(),
                Side::Left => format!("  < {}", entry.prefix).yellow(),
                Side::Right => format!("  > {}", entry.prefix).cyan(),
            };
            lines.push(line.to_string());
        }
    }

    lines.push(String::new());
    lines.push(format!("Similarity: {}", format_similarity(cmp.similarity).bold()));
    lines.push(String::new());
    lines.push("=".repeat(80));
    lines.join("\n") + "\n"
}

fn describe(admission: &Admission) -> String {
    match admission {
        Admission::Distinct {
            position,
            best_similarity,
        } => format!(
            "{} as #{position}{}",
            "distinct".green(),
            best_similarity
                .map(|s| format!(" (best {})", format_similarity(s)))
                .unwrap_or_default()
        ),
        Admission::Similar {
            closest_position,
            closest_label,
            best_similarity,
        } => format!(
            "{} to #{closest_position} {closest_label} ({})",
            "similar".yellow(),
            format_similarity(*best_similarity)
        ),
        Admission::Skipped { line_count } => format!("skipped ({line_count} lines)"),
        Admission::Excluded { reason } => format!("{} ({reason})", "excluded".red()),
    }
}

pub fn render_corpus_summary(report: &CorpusReport) -> String {
    let mut lines = vec![
        format!(
            "{} (threshold {}, minimum {} lines)",
            "Corpus".bold(),
            format_similarity(report.threshold),
            report.minimum_lines
        ),
        format!("  Distinct: {}", report.distinct_count.to_string().green()),
        format!("  Similar:  {}", report.similar_count.to_string().yellow()),
        format!("  Skipped:  {}", report.skipped_count),
    ];
    if report.excluded_count > 0 {
        lines.push(format!("  Excluded: {}", report.excluded_count.to_string().red()));
    }

    lines.extend(report.decisions.iter().map(|d| {
        format!("    [{:>4}] {:<32} {}", d.index, d.label, describe(&d.admission))
    }));
    lines.join("\n") + "\n"
}

pub fn render_scan_summary(report: &ScanReport, top: usize) -> String {
    let mut lines = vec![
        format!(
            "{} {} traces, {} comparisons ({}), threshold {}",
            "Scan".bold(),
            report.trace_count,
            report.total_comparisons,
            report.policy,
            format_similarity(report.threshold)
        ),
        format!(
            "  At or above threshold: {}",
            report.above_threshold_count.to_string().bold()
        ),
    ];
    if report.excluded_count > 0 {
        lines.push(format!("  Excluded: {}", report.excluded_count.to_string().red()));
    }

    let matches = report.matches();
    if !matches.is_empty() && top > 0 {
        lines.push(String::new());
        lines.push(format!(
            "  {:<6} {:<6} {:<28} {:<28} {:>8}",
            "i", "j", "Label i", "Label j", "Score"
        ));
        for pair in matches.iter().take(top) {
            lines.push(format!(
                "  {:<6} {:<6} {:<28} {:<28} {:>8}",
                pair.i,
                pair.j,
                pair.label_i,
                pair.label_j,
                colored_score(pair.similarity, report.threshold)
            ));
        }
        if matches.len() > top {
            lines.push(format!("  ... {} more", matches.len() - top));
        }
    }
    lines.join("\n") + "\n"
}

/// Wrapper written around every JSON report.
#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    tool: &'static str,
    version: &'static str,
    generated_at: DateTime<Utc>,
    report: &'a T,
}

pub fn to_json<T: Serialize>(report: &T) -> Result<String> {
    let envelope = Envelope {
        tool: "tracesift",
        version: env!("CARGO_PKG_VERSION"),
        generated_at: Utc::now(),
        report,
    };
    Ok(serde_json::to_string_pretty(&envelope)?)
}

pub fn write_json<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    std::fs::write(path, to_json(report)?)
        .with_context(|| format!("writing report: {}", path.display()))?;
    tracing::info!("Report written to {}", path.display());
    Ok(())
}

/// Write the admitted traces joined by `separator`, so the file can be fed
/// back in as input.
pub fn write_corpus(path: &Path, report: &CorpusReport, separator: &str) -> Result<()> {
    let joined = report.corpus_texts().join(&format!("\n{separator}\n"));
    std::fs::write(path, joined)
        .with_context(|| format!("writing corpus: {}", path.display()))?;
    tracing::info!(
        "Corpus of {} trace(s) written to {}",
        report.distinct_count,
        path.display()
    );
    Ok(())
}
