use crate::error::ConfigError;
use crate::types::{LabelMode, LabelPolicy};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "tracesift.toml";

/// Effective configuration, merged from defaults + file + env + CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct SiftConfig {
    /// Similarity cutoff in percent, `[0, 100]`.
    pub threshold: f64,
    /// Traces with fewer lines are skipped by the corpus builder.
    pub minimum_lines: usize,
    /// Pairwise scan compares only traces with different labels.
    pub cross_label_only: bool,
    /// Evaluate pairwise comparisons on a thread pool.
    pub parallel: bool,
    pub input: InputConfig,
}

/// How trace files are split and labelled.
#[derive(Debug, Clone, PartialEq)]
pub struct InputConfig {
    pub separator: String,
    /// Regex removed from a document before splitting.
    pub header_pattern: Option<String>,
    pub label_by: LabelMode,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            separator: "-".repeat(80),
            header_pattern: Some(r"linkerd-proxy,istio-proxy,vault-agent\n\n\n".to_string()),
            label_by: LabelMode::File,
        }
    }
}

impl Default for SiftConfig {
    fn default() -> Self {
        Self {
            threshold: 80.0,
            minimum_lines: 8,
            cross_label_only: true,
            parallel: false,
            input: InputConfig::default(),
        }
    }
}

impl SiftConfig {
    pub fn label_policy(&self) -> LabelPolicy {
        LabelPolicy::from_cross_label_only(self.cross_label_only)
    }

    /// Reject anything out of range. Nothing is clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_threshold(self.threshold)?;
        if self.input.separator.is_empty() {
            return Err(ConfigError::EmptySeparator);
        }
        if let Some(pattern) = self.input.header_pattern.as_deref() {
            regex::Regex::new(pattern).map_err(|e| ConfigError::InvalidHeaderPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

pub fn validate_threshold(threshold: f64) -> Result<f64, ConfigError> {
    if threshold.is_finite() && (0.0..=100.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(ConfigError::ThresholdOutOfRange(threshold))
    }
}

pub fn minimum_lines_from(n: i64) -> Result<usize, ConfigError> {
    usize::try_from(n).map_err(|_| ConfigError::NegativeMinimumLines(n))
}

// ---------------------------------------------------------------------------
// TOML config structures (deserialized from tracesift.toml)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    similarity: Option<TomlSimilarity>,
    corpus: Option<TomlCorpus>,
    scan: Option<TomlScan>,
    input: Option<TomlInput>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlSimilarity {
    threshold: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlCorpus {
    minimum_lines: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlScan {
    cross_label_only: Option<bool>,
    parallel: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlInput {
    separator: Option<String>,
    header_pattern: Option<String>,
    label_by: Option<String>,
}

// ---------------------------------------------------------------------------
// TOML loader
// ---------------------------------------------------------------------------

/// Load configuration from tracesift.toml on top of the defaults.
pub fn load_toml_config(path: &Path) -> Result<SiftConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config: {}", path.display()))?;
    let toml_cfg: TomlConfig =
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;

    let defaults = SiftConfig::default();
    let similarity = toml_cfg.similarity.unwrap_or_default();
    let corpus = toml_cfg.corpus.unwrap_or_default();
    let scan = toml_cfg.scan.unwrap_or_default();
    let input = toml_cfg.input.unwrap_or_default();

    let minimum_lines = match corpus.minimum_lines {
        Some(n) => minimum_lines_from(n)?,
        None => defaults.minimum_lines,
    };

    let label_by = match input.label_by {
        Some(s) => s.parse::<LabelMode>().map_err(|_| ConfigError::UnknownLabelMode(s))?,
        None => defaults.input.label_by,
    };

    // An empty header_pattern in the file disables header stripping.
    let header_pattern = match input.header_pattern {
        Some(p) if p.is_empty() => None,
        Some(p) => Some(p),
        None => defaults.input.header_pattern,
    };

    Ok(SiftConfig {
        threshold: similarity.threshold.unwrap_or(defaults.threshold),
        minimum_lines,
        cross_label_only: scan.cross_label_only.unwrap_or(defaults.cross_label_only),
        parallel: scan.parallel.unwrap_or(defaults.parallel),
        input: InputConfig {
            separator: input.separator.unwrap_or(defaults.input.separator),
            header_pattern,
            label_by,
        },
    })
}

// ---------------------------------------------------------------------------
// Env var overlay (applied on top of any config source)
// ---------------------------------------------------------------------------

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Apply `TRACESIFT_*` overrides. Env vars win over file-based config; a
/// value that does not parse is an error, not ignored.
fn apply_env_overrides(
    cfg: &mut SiftConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(v) = env("TRACESIFT_THRESHOLD") {
        cfg.threshold = parse_env("TRACESIFT_THRESHOLD", &v)?;
    }
    if let Some(v) = env("TRACESIFT_MIN_LINES") {
        cfg.minimum_lines = minimum_lines_from(parse_env("TRACESIFT_MIN_LINES", &v)?)?;
    }
    if let Some(v) = env("TRACESIFT_CROSS_LABEL_ONLY") {
        cfg.cross_label_only = parse_env("TRACESIFT_CROSS_LABEL_ONLY", &v)?;
    }
    if let Some(v) = env("TRACESIFT_PARALLEL") {
        cfg.parallel = parse_env("TRACESIFT_PARALLEL", &v)?;
    }
    if let Some(v) = env("TRACESIFT_SEPARATOR") {
        cfg.input.separator = v;
    }
    if let Some(v) = env("TRACESIFT_LABEL_BY") {
        cfg.input.label_by = v
            .parse()
            .map_err(|_| ConfigError::UnknownLabelMode(v.clone()))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Values given on the command line; `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub threshold: Option<f64>,
    pub minimum_lines: Option<i64>,
    pub cross_label_only: Option<bool>,
    pub parallel: Option<bool>,
    pub separator: Option<String>,
    pub label_by: Option<LabelMode>,
}

/// Build a SiftConfig with the following precedence (highest wins):
///   1. CLI flags
///   2. Environment variables
///   3. tracesift.toml (if present)
///   4. Compiled defaults
///
/// The merged result is validated before it is returned.
pub fn build_config(config_path: &Path, cli: &CliOverrides) -> Result<SiftConfig> {
    build_config_with_env(config_path, cli, |key| std::env::var(key).ok())
}

fn build_config_with_env(
    config_path: &Path,
    cli: &CliOverrides,
    env: impl Fn(&str) -> Option<String>,
) -> Result<SiftConfig> {
    let mut cfg = if config_path.exists() {
        tracing::info!("Loading config from {}", config_path.display());
        load_toml_config(config_path)?
    } else {
        tracing::debug!("No config file at {}, using defaults", config_path.display());
        SiftConfig::default()
    };

    apply_env_overrides(&mut cfg, env)?;

    if let Some(threshold) = cli.threshold {
        cfg.threshold = threshold;
    }
    if let Some(n) = cli.minimum_lines {
        cfg.minimum_lines = minimum_lines_from(n)?;
    }
    if let Some(cross) = cli.cross_label_only {
        cfg.cross_label_only = cross;
    }
    if let Some(parallel) = cli.parallel {
        cfg.parallel = parallel;
    }
    if let Some(ref separator) = cli.separator {
        cfg.input.separator = separator.clone();
    }
    if let Some(label_by) = cli.label_by {
        cfg.input.label_by = label_by;
    }

    cfg.validate()?;
    Ok(cfg)
}
