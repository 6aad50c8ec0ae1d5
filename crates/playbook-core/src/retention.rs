//! Retention for the append-only trace and insight logs.
//!
//! Each log holds one JSON object per line. Records are grouped by owner and
//! ordered newest first; the newest `max_per_owner` of each owner are always
//! kept. With [`RetentionPolicy::keep_recent_beyond_cap`] set, older records
//! also survive while younger than `max_age_days`. Whatever is dropped moves
//! verbatim to the log's archive, so nothing is deleted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{LogPaths, PlaybookConfig, RetentionPolicy};
use crate::error::Result;
use crate::fsio::{append_atomic, read_optional, write_atomic};
use crate::obs::{emit_record_malformed, emit_retention_completed, OperationSpan};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionOutcome {
    pub log: PathBuf,
    pub archive: PathBuf,
    /// `false` when the primary log did not exist and nothing was done.
    pub present: bool,
    pub kept: usize,
    pub archived: usize,
    /// Unparseable lines; moved to the archive and also counted in `archived`.
    pub malformed: usize,
}

impl RetentionOutcome {
    fn empty(paths: &LogPaths, present: bool) -> Self {
        Self {
            log: paths.primary.clone(),
            archive: paths.archive.clone(),
            present,
            kept: 0,
            archived: 0,
            malformed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionReport {
    pub traces: RetentionOutcome,
    pub insights: RetentionOutcome,
}

/// A well-formed log line with its retention keys extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord<'a> {
    pub line: &'a str,
    pub owner: String,
    pub timestamp: DateTime<Utc>,
}

/// Records split by [`partition_records`], each in the order it is written.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Partition<'a> {
    /// Ascending by timestamp, stable on ties.
    pub keep: Vec<LogRecord<'a>>,
    /// Input order.
    pub archive: Vec<LogRecord<'a>>,
}

/// RFC 3339, or a naive `YYYY-MM-DDTHH:MM:SS[.fff]` read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Extract owner and timestamp from one log line.
pub fn parse_record<'a>(
    line: &'a str,
    policy: &RetentionPolicy,
) -> std::result::Result<LogRecord<'a>, String> {
    let value: Value = serde_json::from_str(line).map_err(|e| format!("invalid JSON: {e}"))?;
    let object = value.as_object().ok_or("record is not a JSON object")?;

    let owner = match object.get(&policy.owner_field) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(format!("missing or empty {}", policy.owner_field)),
    };
    let timestamp = object
        .get(&policy.timestamp_field)
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .ok_or_else(|| format!("missing or invalid {}", policy.timestamp_field))?;

    Ok(LogRecord {
        line,
        owner,
        timestamp,
    })
}

/// Split records into kept and archived per owner.
pub fn partition_records<'a>(
    records: Vec<LogRecord<'a>>,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Partition<'a> {
    // None: nothing beyond the cap survives
    let cutoff = policy.keep_recent_beyond_cap.then(|| {
        i64::try_from(policy.max_age_days)
            .ok()
            .and_then(Duration::try_days)
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    });

    let mut keep_flags = vec![false; records.len()];
    {
        let mut by_owner: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, record) in records.iter().enumerate() {
            by_owner.entry(record.owner.as_str()).or_default().push(idx);
        }
        for indices in by_owner.values_mut() {
            // newest first; equal timestamps keep input order
            indices.sort_by(|a, b| records[*b].timestamp.cmp(&records[*a].timestamp));
            for (rank, idx) in indices.iter().enumerate() {
                keep_flags[*idx] = rank < policy.max_per_owner
                    || cutoff.is_some_and(|cutoff| records[*idx].timestamp >= cutoff);
            }
        }
    }

    let mut partition = Partition::default();
    for (record, keep) in records.into_iter().zip(keep_flags) {
        if keep {
            partition.keep.push(record);
        } else {
            partition.archive.push(record);
        }
    }
    partition.keep.sort_by_key(|r| r.timestamp);
    partition
}

fn archive_header(primary: &Path, now: DateTime<Utc>) -> Result<String> {
    let name = primary
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let header = serde_json::json!({
        "archiveOf": name,
        "createdAt": now.to_rfc3339_opts(SecondsFormat::Secs, true),
    });
    Ok(format!("{}\n", serde_json::to_string(&header)?))
}

fn join_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Apply `policy` to one log at `now`.
///
/// An absent primary log is a no-op. An empty one is rewritten empty.
/// The archive is written before the primary is rewritten.
pub fn clean_log(paths: &LogPaths, policy: &RetentionPolicy, now: DateTime<Utc>) -> Result<RetentionOutcome> {
    let Some(text) = read_optional(&paths.primary)? else {
        return Ok(RetentionOutcome::empty(paths, false));
    };

    let mut records = Vec::new();
    let mut malformed: Vec<&str> = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        match parse_record(line, policy) {
            Ok(record) => records.push(record),
            Err(error) => {
                emit_record_malformed(&paths.primary, idx + 1, &error);
                malformed.push(line);
            }
        }
    }

    let partition = partition_records(records, policy, now);
    let mut outcome = RetentionOutcome::empty(paths, true);
    outcome.kept = partition.keep.len();
    outcome.malformed = malformed.len();
    outcome.archived = partition.archive.len() + malformed.len();

    if outcome.archived > 0 {
        let body = join_lines(
            malformed
                .iter()
                .copied()
                .chain(partition.archive.iter().map(|r| r.line)),
        );
        append_atomic(&paths.archive, &archive_header(&paths.primary, now)?, &body)?;
    }
    write_atomic(
        &paths.primary,
        join_lines(partition.keep.iter().map(|r| r.line)).as_bytes(),
    )?;

    emit_retention_completed(&paths.primary, outcome.kept, outcome.archived, outcome.malformed);
    Ok(outcome)
}

pub fn clean_all(config: &PlaybookConfig) -> Result<RetentionReport> {
    clean_all_at(config, Utc::now())
}

/// Clean the trace log and the insight log, independently.
pub fn clean_all_at(config: &PlaybookConfig, now: DateTime<Utc>) -> Result<RetentionReport> {
    let _span = OperationSpan::enter("retention");
    Ok(RetentionReport {
        traces: clean_log(&config.traces, &config.retention, now)?,
        insights: clean_log(&config.insights, &config.retention, now)?,
    })
}
