//! Playbook configuration.
//!
//! All file locations derive from a single root directory:
//!
//! | file | purpose |
//! |------|---------|
//! | `playbook.md` | active knowledge document |
//! | `playbook.archive.md` | archived bullets |
//! | `traces.jsonl` / `traces.archive.jsonl` | trace log and its archive |
//! | `insights.jsonl` / `insights.archive.jsonl` | insight log and its archive |
//!
//! [`PlaybookConfig::from_env`] overlays `PLAYBOOK_*` environment variables on
//! the defaults.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use playbook_merge::ConsolidationConfig;
use serde::{Deserialize, Serialize};

use crate::error::{PlaybookError, Result};
use crate::telemetry::{parse_level, LogFormat};

pub const DEFAULT_ROOT: &str = ".playbook";
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.8;
pub const DEFAULT_MAX_LINES: usize = 500;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Per-owner retention policy for trace and insight logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Most recent records always kept per owner.
    pub max_per_owner: usize,
    /// Age window, in days. Only consulted when `keep_recent_beyond_cap` is
    /// set; with the default hard cap it has no effect.
    pub max_age_days: u64,
    /// Keep records beyond `max_per_owner` while they are younger than
    /// `max_age_days`. Off by default: the per-owner cap is hard.
    pub keep_recent_beyond_cap: bool,
    /// JSON field holding the owner id.
    pub owner_field: String,
    /// JSON field holding the ISO-8601 timestamp.
    pub timestamp_field: String,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_per_owner: 10,
            max_age_days: 30,
            keep_recent_beyond_cap: false,
            owner_field: "ownerId".to_string(),
            timestamp_field: "timestamp".to_string(),
        }
    }
}

/// A primary append-only log and its archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPaths {
    pub primary: PathBuf,
    pub archive: PathBuf,
}

impl LogPaths {
    pub fn new(primary: impl Into<PathBuf>, archive: impl Into<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            archive: archive.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookConfig {
    pub playbook_path: PathBuf,
    pub archive_path: PathBuf,
    pub traces: LogPaths,
    pub insights: LogPaths,
    /// Deltas below this confidence are rejected.
    pub confidence_threshold: f64,
    /// Archival starts once the document exceeds this many lines.
    pub max_lines: usize,
    /// Run the consolidation pass after every merge.
    pub consolidate_after_merge: bool,
    pub consolidation: ConsolidationConfig,
    pub retention: RetentionPolicy,
    /// Output format for [`crate::telemetry::init_from_config`].
    #[serde(default)]
    pub log_format: LogFormat,
    /// Level used when neither `PLAYBOOK_LOG` nor `RUST_LOG` is set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for PlaybookConfig {
    fn default() -> Self {
        Self::for_root(DEFAULT_ROOT)
    }
}

impl PlaybookConfig {
    /// Default configuration with every file under `root`.
    pub fn for_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            playbook_path: root.join("playbook.md"),
            archive_path: root.join("playbook.archive.md"),
            traces: LogPaths::new(root.join("traces.jsonl"), root.join("traces.archive.jsonl")),
            insights: LogPaths::new(
                root.join("insights.jsonl"),
                root.join("insights.archive.jsonl"),
            ),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            max_lines: DEFAULT_MAX_LINES,
            consolidate_after_merge: true,
            consolidation: ConsolidationConfig::default(),
            retention: RetentionPolicy::default(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
        }
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = max_lines;
        self
    }

    pub fn with_consolidation(mut self, consolidation: ConsolidationConfig) -> Self {
        self.consolidation = consolidation;
        self
    }

    pub fn with_consolidate_after_merge(mut self, enabled: bool) -> Self {
        self.consolidate_after_merge = enabled;
        self
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Defaults overlaid with `PLAYBOOK_*` environment variables.
    ///
    /// * `PLAYBOOK_ROOT`
    /// * `PLAYBOOK_CONFIDENCE_THRESHOLD`
    /// * `PLAYBOOK_MAX_LINES`
    /// * `PLAYBOOK_CONSOLIDATE` (`true`/`false`)
    /// * `PLAYBOOK_SIMILARITY_THRESHOLD`
    /// * `PLAYBOOK_RETENTION_MAX_PER_OWNER`
    /// * `PLAYBOOK_RETENTION_MAX_AGE_DAYS`
    /// * `PLAYBOOK_RETENTION_KEEP_RECENT` (`true`/`false`)
    /// * `PLAYBOOK_LOG_FORMAT` (`text`/`json`)
    /// * `PLAYBOOK_LOG_LEVEL`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`PlaybookConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let root = lookup("PLAYBOOK_ROOT").unwrap_or_else(|| DEFAULT_ROOT.to_string());
        let mut config = Self::for_root(root);

        if let Some(v) = parse_var(&lookup, "PLAYBOOK_CONFIDENCE_THRESHOLD")? {
            config.confidence_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "PLAYBOOK_MAX_LINES")? {
            config.max_lines = v;
        }
        if let Some(v) = parse_var(&lookup, "PLAYBOOK_CONSOLIDATE")? {
            config.consolidate_after_merge = v;
        }
        if let Some(v) = parse_var(&lookup, "PLAYBOOK_SIMILARITY_THRESHOLD")? {
            config.consolidation.similarity_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "PLAYBOOK_RETENTION_MAX_PER_OWNER")? {
            config.retention.max_per_owner = v;
        }
        if let Some(v) = parse_var(&lookup, "PLAYBOOK_RETENTION_MAX_AGE_DAYS")? {
            config.retention.max_age_days = v;
        }
        if let Some(v) = parse_var(&lookup, "PLAYBOOK_RETENTION_KEEP_RECENT")? {
            config.retention.keep_recent_beyond_cap = v;
        }
        if let Some(v) = parse_var(&lookup, "PLAYBOOK_LOG_FORMAT")? {
            config.log_format = v;
        }
        if let Some(v) = lookup("PLAYBOOK_LOG_LEVEL") {
            config.log_level = v.trim().to_string();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(PlaybookError::InvalidConfig(format!(
                "confidence_threshold {} outside [0, 1]",
                self.confidence_threshold
            )));
        }
        let similarity = self.consolidation.similarity_threshold;
        if !(similarity > 0.0 && similarity <= 1.0) {
            return Err(PlaybookError::InvalidConfig(format!(
                "similarity_threshold {similarity} outside (0, 1]"
            )));
        }
        if self.max_lines == 0 {
            return Err(PlaybookError::InvalidConfig(
                "max_lines must be positive".to_string(),
            ));
        }
        if self.retention.owner_field.is_empty() || self.retention.timestamp_field.is_empty() {
            return Err(PlaybookError::InvalidConfig(
                "retention field names must not be empty".to_string(),
            ));
        }
        parse_level(&self.log_level)?;
        Ok(())
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| PlaybookError::InvalidConfig(format!("{name}={raw} is not valid"))),
    }
}
