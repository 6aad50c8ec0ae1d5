//! Reading the archive back and restoring bullets from it.

use std::path::Path;

use chrono::{DateTime, Utc};
use playbook_merge::sidecar::{is_sidecar_line, parse_sidecar};
use playbook_merge::{parse_bullet_line, sort_canonical, KnowledgeBullet};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ArchivalReason, ENTRY_PREFIX};
use crate::error::{PlaybookError, Result};
use crate::fsio::read_required;
use crate::store::PlaybookStore;

/// A bullet as recorded in the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedBullet {
    pub archived_at: DateTime<Utc>,
    pub reason: ArchivalReason,
    pub bullet: KnowledgeBullet,
}

/// Parse every entry of an archive document, in file order.
///
/// Entries that cannot be decoded are skipped with a warning; the archive is
/// append-only and one bad entry should not hide the rest.
pub fn parse_archive(text: &str) -> Vec<ArchivedBullet> {
    let mut entries = Vec::new();
    let mut current: Option<(usize, &str, Vec<&str>)> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim_end();
        if let Some(stamp) = line.strip_prefix(ENTRY_PREFIX) {
            if let Some((start, header, body)) = current.take() {
                push_entry(&mut entries, start, header, &body);
            }
            current = Some((idx + 1, stamp, Vec::new()));
        } else if let Some((_, _, body)) = current.as_mut() {
            if !line.trim().is_empty() {
                body.push(line.trim());
            }
        }
    }
    if let Some((start, header, body)) = current {
        push_entry(&mut entries, start, header, &body);
    }
    entries
}

fn push_entry(entries: &mut Vec<ArchivedBullet>, line: usize, stamp: &str, body: &[&str]) {
    match parse_entry(stamp, body) {
        Ok(entry) => entries.push(entry),
        Err(error) => warn!(event = "archive.entry_malformed", line = line, error = %error),
    }
}

fn parse_entry(stamp: &str, body: &[&str]) -> std::result::Result<ArchivedBullet, String> {
    let archived_at = DateTime::parse_from_rfc3339(stamp.trim())
        .map_err(|e| format!("bad timestamp {stamp:?}: {e}"))?
        .with_timezone(&Utc);

    let reason: ArchivalReason = entry_field(body, 0, "reason")?.parse()?;
    let section = entry_field(body, 1, "section")?;

    let bullet_line = body.get(2).ok_or("missing bullet line")?;
    let parsed = parse_bullet_line(bullet_line).ok_or("unrecognized bullet line")?;
    let mut bullet = parsed.into_bullet(section, 0).map_err(|e| e.to_string())?;

    if let Some(sidecar) = body.get(3).filter(|l| is_sidecar_line(l)) {
        bullet.provenance = parse_sidecar(sidecar).map_err(|e| e.to_string())?.provenance;
    }

    Ok(ArchivedBullet {
        archived_at,
        reason,
        bullet,
    })
}

/// `- <name>: <value>` on line `idx` of an entry body.
fn entry_field<'a>(body: &[&'a str], idx: usize, name: &str) -> std::result::Result<&'a str, String> {
    body.get(idx)
        .and_then(|l| l.strip_prefix("- "))
        .and_then(|l| l.strip_prefix(name))
        .and_then(|l| l.strip_prefix(':'))
        .map(str::trim)
        .ok_or_else(|| format!("missing {name} field"))
}

/// Read and parse the archive at `path`. A missing archive is an error.
pub fn read_archive(path: &Path) -> Result<Vec<ArchivedBullet>> {
    Ok(parse_archive(&read_required(path)?))
}

/// Move the most recently archived copy of bullet `id` back into the active
/// document. The archive itself is left untouched.
///
/// Fails with [`PlaybookError::RestoreConflict`] when the document already
/// holds a bullet with the same id or the same content hash.
pub fn restore_archived(document: &Path, archive: &Path, id: &str) -> Result<KnowledgeBullet> {
    let restored = read_archive(archive)?
        .into_iter()
        .rev()
        .find(|entry| entry.bullet.id == id)
        .map(|entry| entry.bullet)
        .ok_or_else(|| PlaybookError::BulletNotArchived {
            id: id.to_string(),
            path: archive.to_path_buf(),
        })?;

    let store = PlaybookStore::new(document);
    let mut doc = store.load()?;
    if let Some(existing) = doc
        .bullets
        .iter()
        .find(|b| b.id == restored.id || b.hash == restored.hash)
    {
        return Err(PlaybookError::RestoreConflict {
            id: id.to_string(),
            existing: existing.id.clone(),
        });
    }

    doc.bullets.push(restored.clone());
    sort_canonical(&mut doc.bullets);
    store.save(&doc)?;
    info!(event = "archive.restored", bullet_id = %restored.id, section = %restored.section);
    Ok(restored)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARCHIVE: &str = "\
# Playbook Archive

## Archived 2026-10-01T00:00:00Z
- reason: high-harmful
- section: testing
[Bullet #b-1, helpful:1, harmful:4] Skip flaky tests
<!-- deltaId=d-1 ownerId=bd-1 createdAt=2026-09-01T00:00:00Z hash=abc -->

## Archived not-a-date
- reason: low-signal
- section: testing
[Bullet #b-2, helpful:1, harmful:0] Lost entry
<!-- hash=def -->

## Archived 2026-10-02T00:00:00Z
- reason: zero-helpful
- section: Tool Usage
[Bullet #b-3, helpful:0, harmful:0] Pin toolchains
";

    #[test]
    fn test_parse_archive_skips_malformed_entries() {
        let entries = parse_archive(ARCHIVE);
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].reason, ArchivalReason::HighHarmful);
        assert_eq!(entries[0].bullet.id, "b-1");
        assert_eq!(entries[0].bullet.harmful, 4);
        assert_eq!(
            entries[0].bullet.provenance.as_ref().unwrap().delta_id,
            "d-1"
        );

        assert_eq!(entries[1].bullet.section, "tool_usage");
        assert!(entries[1].bullet.provenance.is_none());
    }

    #[test]
    fn test_parse_archive_ignores_header_only() {
        assert!(parse_archive("# Playbook Archive\n\nnothing yet\n").is_empty());
    }

    #[test]
    fn test_parse_entry_rejects_unknown_reason() {
        let err = parse_entry(
            "2026-10-01T00:00:00Z",
            &["- reason: stale", "- section: s", "[Bullet #x, helpful:0, harmful:0] c"],
        )
        .unwrap_err();
        assert!(err.contains("stale"));
    }
}
