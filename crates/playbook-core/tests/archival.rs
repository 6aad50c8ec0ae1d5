//! Line-budget enforcement against real files.

use std::fs;
use std::path::Path;

use chrono::{TimeZone, Utc};
use tempfile::tempdir;

use playbook_core::archive::ARCHIVE_HEADER;
use playbook_core::{
    read_archive, restore_archived, ArchivalCandidate, ArchivalMaintainer, ArchivalReason,
    Document, KnowledgeBullet, PlaybookError, PlaybookStore,
};

/// One section holding `n` bullets plus one note line: `4 + 2n` lines.
fn write_playbook(path: &Path, n: usize) -> Document {
    let bullets = (0..n)
        .map(|i| KnowledgeBullet::new(format!("b-{i:03}"), "testing", &format!("Rule number {i}"), 1, 0))
        .collect();
    let mut doc = Document::with_title("Playbook").with_bullets(bullets);
    doc.notes
        .insert("testing".to_string(), vec!["Rules learned from CI runs.".to_string()]);
    PlaybookStore::new(path).save(&doc).unwrap();
    doc
}

fn picks(chosen: &'static [(&'static str, ArchivalReason)]) -> impl Fn(&[KnowledgeBullet]) -> Vec<ArchivalCandidate> {
    move |bullets: &[KnowledgeBullet]| {
        chosen.iter()
            .filter_map(|(id, reason)| {
                bullets
                    .iter()
                    .find(|b| b.id == *id)
                    .map(|b| ArchivalCandidate::new(b.clone(), *reason))
            })
            .collect()
    }
}

fn offer_everything(bullets: &[KnowledgeBullet]) -> Vec<ArchivalCandidate> {
    bullets
        .iter()
        .map(|b| ArchivalCandidate::new(b.clone(), ArchivalReason::LowSignal))
        .collect()
}

#[test]
fn test_three_candidates_not_enough_is_partial() {
    let dir = tempdir().unwrap();
    let doc_path = dir.path().join("playbook.md");
    let archive_path = dir.path().join("playbook.archive.md");
    let doc = write_playbook(&doc_path, 258);
    assert_eq!(doc.line_count(), 520);

    let analyzer = picks(&[
        ("b-010", ArchivalReason::LowSignal),
        ("b-011", ArchivalReason::ZeroHelpful),
        ("b-012", ArchivalReason::HighHarmful),
    ]);
    let outcome = ArchivalMaintainer::new(&doc_path, &archive_path, 500)
        .run(&analyzer)
        .unwrap();

    assert_eq!(outcome.bullets_moved, 3);
    assert_eq!(outcome.lines_reduced, 6);
    assert_eq!(outcome.lines_before, 520);
    assert_eq!(outcome.lines_after, 514);
    assert!(outcome.over_budget);
    assert_eq!(outcome.archived_ids, vec!["b-012", "b-010", "b-011"]);
    assert_eq!(outcome.archive_path, archive_path);
}

#[test]
fn test_archives_only_what_is_needed() {
    let dir = tempdir().unwrap();
    let doc_path = dir.path().join("playbook.md");
    let archive_path = dir.path().join("playbook.archive.md");
    write_playbook(&doc_path, 258);

    let analyzer = picks(&[
        ("b-000", ArchivalReason::ZeroHelpful),
        ("b-001", ArchivalReason::HighHarmful),
        ("b-002", ArchivalReason::LowSignal),
        ("b-003", ArchivalReason::LowSignal),
        ("b-004", ArchivalReason::HighHarmful),
    ]);
    let outcome = ArchivalMaintainer::new(&doc_path, &archive_path, 515)
        .run(&analyzer)
        .unwrap();

    assert_eq!(outcome.archived_ids, vec!["b-001", "b-004", "b-002"]);
    assert_eq!(outcome.lines_after, 514);
    assert!(!outcome.over_budget);

    let doc = PlaybookStore::new(&doc_path).load().unwrap();
    assert_eq!(doc.bullets.len(), 255);
    assert!(doc.find("b-001").is_none());
    assert!(doc.find("b-000").is_some());
    assert_eq!(fs::read_to_string(&doc_path).unwrap().lines().count(), 514);
}

#[test]
fn test_under_budget_is_noop() {
    let dir = tempdir().unwrap();
    let doc_path = dir.path().join("playbook.md");
    let archive_path = dir.path().join("playbook.archive.md");
    write_playbook(&doc_path, 3);
    let before = fs::read_to_string(&doc_path).unwrap();

    let analyzer = picks(&[("b-000", ArchivalReason::HighHarmful)]);
    let outcome = ArchivalMaintainer::new(&doc_path, &archive_path, 500)
        .run(&analyzer)
        .unwrap();

    assert_eq!(outcome.bullets_moved, 0);
    assert!(!outcome.over_budget);
    assert!(!archive_path.exists());
    assert_eq!(fs::read_to_string(&doc_path).unwrap(), before);
}

#[test]
fn test_missing_document_is_error() {
    let dir = tempdir().unwrap();
    let analyzer = picks(&[]);
    let err = ArchivalMaintainer::new(dir.path().join("nope.md"), dir.path().join("a.md"), 10)
        .run(&analyzer)
        .unwrap_err();
    assert!(matches!(err, PlaybookError::MissingInput { .. }));
}

#[test]
fn test_archive_is_complete_and_append_only() {
    let dir = tempdir().unwrap();
    let doc_path = dir.path().join("playbook.md");
    let archive_path = dir.path().join("playbook.archive.md");
    let original = write_playbook(&doc_path, 10);
    let maintainer = ArchivalMaintainer::new(&doc_path, &archive_path, 18);
    let first_ts = Utc.with_ymd_and_hms(2026, 10, 18, 6, 0, 0).unwrap();
    let second_ts = Utc.with_ymd_and_hms(2026, 10, 19, 6, 0, 0).unwrap();

    let first = maintainer
        .run_at(&picks(&[("b-001", ArchivalReason::LowSignal)]), first_ts)
        .unwrap();
    let after_first = fs::read_to_string(&archive_path).unwrap();
    assert!(after_first.starts_with(ARCHIVE_HEADER));

    let second = maintainer
        .run_at(
            &picks(&[
                ("b-002", ArchivalReason::ZeroHelpful),
                ("b-003", ArchivalReason::ZeroHelpful),
            ]),
            second_ts,
        )
        .unwrap();
    let archive_text = fs::read_to_string(&archive_path).unwrap();
    assert!(archive_text.starts_with(&after_first));
    assert_eq!(archive_text.matches(ARCHIVE_HEADER).count(), 1);

    let moved: Vec<String> = first
        .archived_ids
        .iter()
        .chain(&second.archived_ids)
        .cloned()
        .collect();
    assert_eq!(moved.len(), 3);
    for id in &moved {
        let bullet = original.find(id).unwrap();
        assert!(archive_text.contains(&bullet.content));
    }

    let entries = read_archive(&archive_path).unwrap();
    let ids: Vec<_> = entries.iter().map(|e| e.bullet.id.as_str()).collect();
    assert_eq!(ids, vec!["b-001", "b-002", "b-003"]);
    assert_eq!(entries[0].archived_at, first_ts);
    assert_eq!(entries[0].reason, ArchivalReason::LowSignal);
    assert_eq!(entries[2].bullet, *original.find("b-003").unwrap());
}

#[test]
fn test_restore_round_trip() {
    let dir = tempdir().unwrap();
    let doc_path = dir.path().join("playbook.md");
    let archive_path = dir.path().join("playbook.archive.md");
    let original = write_playbook(&doc_path, 10);
    ArchivalMaintainer::new(&doc_path, &archive_path, 20)
        .run(&picks(&[("b-004", ArchivalReason::HighHarmful)]))
        .unwrap();
    assert!(PlaybookStore::new(&doc_path).load().unwrap().find("b-004").is_none());

    let restored = restore_archived(&doc_path, &archive_path, "b-004").unwrap();
    assert_eq!(restored, *original.find("b-004").unwrap());
    let doc = PlaybookStore::new(&doc_path).load().unwrap();
    assert_eq!(doc, original);

    let err = restore_archived(&doc_path, &archive_path, "b-004").unwrap_err();
    assert!(matches!(err, PlaybookError::RestoreConflict { .. }));
    let err = restore_archived(&doc_path, &archive_path, "b-999").unwrap_err();
    assert!(matches!(err, PlaybookError::BulletNotArchived { .. }));
}

#[test]
fn test_budget_is_measured_on_serialized_document() {
    let dir = tempdir().unwrap();
    let doc_path = dir.path().join("playbook.md");
    let archive_path = dir.path().join("playbook.archive.md");
    let doc = write_playbook(&doc_path, 10);
    let canonical = doc.line_count();
    let mut text = fs::read_to_string(&doc_path).unwrap();
    text.push_str(&"\n".repeat(7));
    fs::write(&doc_path, text).unwrap();

    let outcome = ArchivalMaintainer::new(&doc_path, &archive_path, canonical)
        .run(&offer_everything)
        .unwrap();

    assert_eq!(outcome.bullets_moved, 0);
    assert_eq!(outcome.lines_before, canonical);
    assert!(!outcome.over_budget);
    assert!(!archive_path.exists());
    assert_eq!(fs::read_to_string(&doc_path).unwrap(), doc.serialize());
}

#[test]
fn test_sidecar_less_document_archives_exactly_enough() {
    let dir = tempdir().unwrap();
    let doc_path = dir.path().join("playbook.md");
    let archive_path = dir.path().join("playbook.archive.md");
    let mut text = String::from("# Playbook\n\n## testing\n");
    for i in 0..20 {
        text.push_str(&format!("[Bullet #b-{i:03}, helpful:1, harmful:0] Rule number {i}\n"));
    }
    fs::write(&doc_path, text).unwrap();

    // sidecars are regenerated on save: 3 + 20 * 2 lines
    let outcome = ArchivalMaintainer::new(&doc_path, &archive_path, 40)
        .run(&offer_everything)
        .unwrap();

    assert_eq!(outcome.lines_before, 43);
    assert_eq!(outcome.archived_ids, vec!["b-000", "b-001"]);
    assert_eq!(outcome.lines_after, 39);
    assert_eq!(outcome.lines_reduced, 4);
    assert!(!outcome.over_budget);
    assert_eq!(fs::read_to_string(&doc_path).unwrap().lines().count(), 39);
}

#[test]
fn test_duplicate_ids_archive_only_the_chosen_bullet() {
    let dir = tempdir().unwrap();
    let doc_path = dir.path().join("playbook.md");
    let archive_path = dir.path().join("playbook.archive.md");
    fs::write(
        &doc_path,
        "# Playbook\n\n## testing\n\
         [Bullet #b-1, helpful:1, harmful:0] First rule\n\
         [Bullet #b-1, helpful:1, harmful:0] Second rule\n\
         [Bullet #b-2, helpful:1, harmful:0] Third rule\n",
    )
    .unwrap();

    let outcome = ArchivalMaintainer::new(&doc_path, &archive_path, 8)
        .run(&picks(&[("b-1", ArchivalReason::HighHarmful)]))
        .unwrap();
    assert_eq!(outcome.bullets_moved, 1);
    assert_eq!(outcome.lines_after, 7);

    let doc = PlaybookStore::new(&doc_path).load().unwrap();
    let left: Vec<_> = doc.bullets.iter().map(|b| b.content.as_str()).collect();
    assert_eq!(left, vec!["Second rule", "Third rule"]);
    let archived = read_archive(&archive_path).unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].bullet.content, "First rule");
}
