//! Loading the delta stream produced by upstream analysis.
//!
//! A stream file is either a JSON array of deltas or JSON Lines (one delta
//! per line). Entries that fail to deserialize are skipped with a warning and
//! reported back; they never abort the rest of the batch.

use std::path::Path;

use playbook_merge::Delta;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fsio::read_required;
use crate::obs::emit_record_malformed;

/// An entry of the stream that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedEntry {
    /// 1-based line (JSON Lines) or array position (JSON array).
    pub position: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeltaBatch {
    pub deltas: Vec<Delta>,
    pub malformed: Vec<MalformedEntry>,
}

/// Read and decode the delta stream at `path`. The file must exist.
pub fn load_deltas(path: &Path) -> Result<DeltaBatch> {
    let text = read_required(path)?;
    parse_deltas(path, &text)
}

/// Decode a delta stream; `path` is only used for diagnostics.
pub fn parse_deltas(path: &Path, text: &str) -> Result<DeltaBatch> {
    let mut batch = DeltaBatch::default();

    if text.trim_start().starts_with('[') {
        let entries: Vec<serde_json::Value> = serde_json::from_str(text)?;
        for (idx, entry) in entries.into_iter().enumerate() {
            decode(&mut batch, path, idx + 1, serde_json::from_value(entry));
        }
    } else {
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            decode(&mut batch, path, idx + 1, serde_json::from_str(line));
        }
    }

    Ok(batch)
}

fn decode(
    batch: &mut DeltaBatch,
    path: &Path,
    position: usize,
    parsed: std::result::Result<Delta, serde_json::Error>,
) {
    match parsed {
        Ok(delta) => batch.deltas.push(delta),
        Err(e) => {
            emit_record_malformed(path, position, &e);
            batch.malformed.push(MalformedEntry {
                position,
                error: e.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlaybookError;
    use tempfile::tempdir;

    fn delta_json(id: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "section": "testing",
            "op": "add",
            "content": format!("content for {id}"),
            "metadata": {
                "confidence": 0.9,
                "evidence": "seen across multiple runs",
                "source": { "ownerId": "bd-1" },
                "createdAt": "2026-10-01T00:00:00Z"
            }
        })
    }

    #[test]
    fn test_jsonl_with_corrupt_line() {
        let text = format!(
            "{}\n\nnot json at all\n{}\n",
            delta_json("d-1"),
            delta_json("d-2")
        );
        let batch = parse_deltas(Path::new("deltas.jsonl"), &text).unwrap();
        let ids: Vec<_> = batch.deltas.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d-1", "d-2"]);
        assert_eq!(batch.malformed.len(), 1);
        assert_eq!(batch.malformed[0].position, 3);
    }

    #[test]
    fn test_json_array_with_bad_entry() {
        let text = serde_json::json!([delta_json("d-1"), {"id": "d-2"}]).to_string();
        let batch = parse_deltas(Path::new("deltas.json"), &text).unwrap();
        assert_eq!(batch.deltas.len(), 1);
        assert_eq!(batch.malformed[0].position, 2);
    }

    #[test]
    fn test_empty_stream() {
        let batch = parse_deltas(Path::new("deltas.jsonl"), "").unwrap();
        assert!(batch.deltas.is_empty());
        assert!(batch.malformed.is_empty());
    }

    #[test]
    fn test_missing_stream_is_fatal() {
        let dir = tempdir().unwrap();
        let err = load_deltas(&dir.path().join("deltas.jsonl")).unwrap_err();
        assert!(matches!(err, PlaybookError::MissingInput { .. }));
    }
}
