mod chain;
mod config;
mod corpus;
mod error;
mod frame;
mod mcp;
mod report;
mod scanner;
mod similarity;
mod source;
mod types;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};

use config::{CliOverrides, SiftConfig};
use corpus::CorpusDeduplicator;
use scanner::PairwiseScanner;
use source::DocumentSplitter;
use types::LabelMode;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "tracesift",
    version,
    about = "Structural similarity and deduplication of JVM stack traces"
)]
enum Cli {
    /// Compare the traces of two files position by position
    Compare {
        /// First trace file
        #[arg(long)]
        trace1: PathBuf,

        /// Second trace file
        #[arg(long)]
        trace2: PathBuf,

        /// Also print a prefix alignment of each pair
        #[arg(long)]
        align: bool,

        /// Config file path
        #[arg(long, default_value = config::DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },

    /// Build a corpus of mutually distinct traces, in file order
    Dedup {
        /// Trace files, read in the order given
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Similarity cutoff in percent
        #[arg(long)]
        threshold: Option<f64>,

        /// Skip traces with fewer lines than this
        #[arg(long)]
        min_lines: Option<i64>,

        /// How traces are labelled
        #[arg(long, value_enum)]
        label_by: Option<LabelMode>,

        /// Write the distinct traces here, in input format
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write the per-trace decisions here as JSON
        #[arg(long)]
        summary: Option<PathBuf>,

        /// Config file path
        #[arg(long, default_value = config::DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },

    /// Score every pair of traces across files
    Scan {
        /// Trace files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Similarity cutoff in percent
        #[arg(long)]
        threshold: Option<f64>,

        /// Also compare traces that share a label
        #[arg(long)]
        all_pairs: bool,

        /// Score pairs on a thread pool
        #[arg(long)]
        parallel: bool,

        /// How traces are labelled
        #[arg(long, value_enum)]
        label_by: Option<LabelMode>,

        /// Write every scored pair here as JSON
        #[arg(long)]
        output: Option<PathBuf>,

        /// Number of matches to print
        #[arg(long, default_value = "20")]
        top: usize,

        /// Config file path
        #[arg(long, default_value = config::DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },

    /// Show version and effective config
    Info {
        /// Config file path
        #[arg(long, default_value = config::DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },

    /// Start as MCP server over stdio
    Serve {
        /// Config file path
        #[arg(long, default_value = config::DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries reports and JSON-RPC responses; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tracesift=info".parse()?),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli {
        Cli::Compare {
            trace1,
            trace2,
            align,
            config: config_path,
        } => {
            let cfg = config::build_config(&config_path, &CliOverrides::default())?;
            cmd_compare(&cfg, &trace1, &trace2, align)?;
        }

        Cli::Dedup {
            files,
            threshold,
            min_lines,
            label_by,
            output,
            summary,
            config: config_path,
        } => {
            let overrides = CliOverrides {
                threshold,
                minimum_lines: min_lines,
                label_by,
                ..CliOverrides::default()
            };
            let cfg = config::build_config(&config_path, &overrides)?;
            cmd_dedup(&cfg, &files, output.as_deref(), summary.as_deref()).await?;
        }

        Cli::Scan {
            files,
            threshold,
            all_pairs,
            parallel,
            label_by,
            output,
            top,
            config: config_path,
        } => {
            let overrides = CliOverrides {
                threshold,
                cross_label_only: all_pairs.then_some(false),
                parallel: parallel.then_some(true),
                label_by,
                ..CliOverrides::default()
            };
            let cfg = config::build_config(&config_path, &overrides)?;
            cmd_scan(&cfg, &files, output.as_deref(), top).await?;
        }

        Cli::Info {
            config: config_path,
        } => {
            let cfg = config::build_config(&config_path, &CliOverrides::default())?;
            println!("tracesift v{}", env!("CARGO_PKG_VERSION"));
            println!("  Threshold: {}", report::format_similarity(cfg.threshold));
            println!("  Minimum lines: {}", cfg.minimum_lines);
            println!("  Scan: {}, parallel={}", cfg.label_policy(), cfg.parallel);
            println!(
                "  Input: separator {:?}, header {:?}, label by {}",
                cfg.input.separator, cfg.input.header_pattern, cfg.input.label_by
            );
        }

        Cli::Serve {
            config: config_path,
        } => {
            let cfg = config::build_config(&config_path, &CliOverrides::default())?;
            mcp::serve(cfg).await?;
        }
    }

    Ok(())
}

// ===========================================================================
// tracesift compare
// ===========================================================================

fn cmd_compare(cfg: &SiftConfig, path_a: &Path, path_b: &Path, align: bool) -> Result<()> {
    let splitter = DocumentSplitter::new(&cfg.input)?;
    let doc_a = std::fs::read_to_string(path_a)
        .with_context(|| format!("reading traces: {}", path_a.display()))?;
    let doc_b = std::fs::read_to_string(path_b)
        .with_context(|| format!("reading traces: {}", path_b.display()))?;

    let chunks_a = splitter.split_positional(&doc_a);
    let chunks_b = splitter.split_positional(&doc_b);
    if chunks_a.len() != chunks_b.len() {
        tracing::warn!(
            "Trace counts differ ({} vs {}); extra traces are ignored",
            chunks_a.len(),
            chunks_b.len()
        );
    }

    let mut compared = 0usize;
    for (a, b) in chunks_a.iter().zip(&chunks_b) {
        if a.is_empty() || b.is_empty() {
            continue;
        }
        let cmp = similarity::compare(a, b);
        let alignment = align.then(|| similarity::align(&cmp.chain_a, &cmp.chain_b));
        print!("{}", report::render_comparison(&cmp, alignment.as_deref()));
        compared += 1;
    }

    if compared == 0 {
        println!("{}", "No trace pairs to compare.".yellow());
    }
    Ok(())
}

// ===========================================================================
// tracesift dedup
// ===========================================================================

async fn cmd_dedup(
    cfg: &SiftConfig,
    files: &[PathBuf],
    output: Option<&Path>,
    summary: Option<&Path>,
) -> Result<()> {
    let splitter = DocumentSplitter::new(&cfg.input)?;
    let loaded = splitter.load_all(files);
    if loaded.traces.is_empty() {
        anyhow::bail!("No traces loaded from {} file(s)", files.len());
    }

    let (threshold, minimum_lines) = (cfg.threshold, cfg.minimum_lines);
    let traces = loaded.traces;
    let result = tokio::task::spawn_blocking(move || {
        CorpusDeduplicator::process(threshold, minimum_lines, traces)
    })
    .await
    .context("corpus task failed")?;

    print!("{}", report::render_corpus_summary(&result));
    for (path, reason) in &loaded.failed {
        println!("  {} {}: {reason}", "unreadable".red(), path.display());
    }

    if let Some(path) = output {
        report::write_corpus(path, &result, &cfg.input.separator)?;
    }
    if let Some(path) = summary {
        report::write_json(path, &result)?;
    }
    Ok(())
}

// ===========================================================================
// tracesift scan
// ===========================================================================

async fn cmd_scan(
    cfg: &SiftConfig,
    files: &[PathBuf],
    output: Option<&Path>,
    top: usize,
) -> Result<()> {
    let splitter = DocumentSplitter::new(&cfg.input)?;
    let loaded = splitter.load_all(files);
    if loaded.traces.is_empty() {
        anyhow::bail!("No traces loaded from {} file(s)", files.len());
    }

    let scanner = PairwiseScanner::new(cfg.threshold, cfg.label_policy(), cfg.parallel);
    let traces = loaded.traces;
    let result = tokio::task::spawn_blocking(move || scanner.scan(traces))
        .await
        .context("scan task failed")?;

    print!("{}", report::render_scan_summary(&result, top));
    for (path, reason) in &loaded.failed {
        println!("  {} {}: {reason}", "unreadable".red(), path.display());
    }

    if let Some(path) = output {
        report::write_json(path, &result)?;
    }
    Ok(())
}
