//! Archival maintainer: keeps the playbook under its line budget.
//!
//! When the document exceeds `max_lines`, candidates from a
//! [`SignalAnalyzer`] are archived in priority order (see
//! [`ArchivalReason`]) until the document fits or the candidates run out.
//! Running out is reported through [`ArchiveOutcome::over_budget`] and is not
//! an error.
//!
//! Archived bullets are appended to the archive document before the playbook
//! is rewritten, so an interruption between the two writes can duplicate a
//! bullet but never lose one.

mod candidate;
mod reader;

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use playbook_merge::{render_bullet, Document};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use candidate::{ArchivalCandidate, ArchivalReason, CounterSignalAnalyzer, SignalAnalyzer};
pub use reader::{parse_archive, read_archive, restore_archived, ArchivedBullet};

use crate::config::PlaybookConfig;
use crate::error::Result;
use crate::fsio::append_atomic;
use crate::obs::{emit_archive_completed, emit_archive_over_budget};
use crate::store::PlaybookStore;

/// Written once, when the archive file is created.
pub const ARCHIVE_HEADER: &str = "# Playbook Archive\n\nBullets moved out of the active playbook. This file is append-only.\n";

/// Prefix of the timestamped header opening each archive entry.
pub const ENTRY_PREFIX: &str = "## Archived ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveOutcome {
    pub bullets_moved: usize,
    pub lines_reduced: usize,
    pub archive_path: PathBuf,
    pub archived_ids: Vec<String>,
    pub lines_before: usize,
    pub lines_after: usize,
    /// Candidates were exhausted while the document was still over the limit.
    pub over_budget: bool,
}

/// Which candidates to archive, and the document left once they are gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivalPlan {
    pub selected: Vec<ArchivalCandidate>,
    /// `doc` with exactly the selected bullets removed.
    pub document: Document,
    /// Serialized line count of `document`.
    pub remaining_lines: usize,
    pub over_budget: bool,
}

/// Choose candidates, highest priority first (stable for equal reasons),
/// until the serialized document fits in `max_lines`.
///
/// Each selection removes one bullet from a working copy, matched on id and
/// content hash, and the copy is measured again, so emptied sections and
/// regenerated sidecars are accounted for. Candidates with no matching bullet
/// left in the copy are skipped.
pub fn plan_archival(
    doc: &Document,
    max_lines: usize,
    mut candidates: Vec<ArchivalCandidate>,
) -> ArchivalPlan {
    candidates.sort_by_key(|c| c.reason);

    let mut document = doc.clone();
    let mut remaining = document.line_count();
    let mut selected: Vec<ArchivalCandidate> = Vec::new();
    for candidate in candidates {
        if remaining <= max_lines {
            break;
        }
        let wanted = &candidate.bullet;
        let position = document
            .bullets
            .iter()
            .position(|b| b.id == wanted.id && b.hash == wanted.hash);
        let Some(position) = position else {
            debug!(event = "archive.candidate_skipped", bullet_id = %wanted.id);
            continue;
        };
        let bullet = document.bullets.remove(position);
        remaining = document.line_count();
        selected.push(ArchivalCandidate::new(bullet, candidate.reason));
    }

    ArchivalPlan {
        selected,
        document,
        remaining_lines: remaining,
        over_budget: remaining > max_lines,
    }
}

/// One archive entry: timestamped header, reason, section, full bullet text.
pub fn render_entry(candidate: &ArchivalCandidate, archived_at: DateTime<Utc>) -> String {
    format!(
        "\n{ENTRY_PREFIX}{}\n- reason: {}\n- section: {}\n{}\n",
        archived_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        candidate.reason,
        candidate.bullet.section,
        render_bullet(&candidate.bullet)
    )
}

#[derive(Debug, Clone)]
pub struct ArchivalMaintainer {
    store: PlaybookStore,
    archive_path: PathBuf,
    max_lines: usize,
}

impl ArchivalMaintainer {
    pub fn new(document: impl Into<PathBuf>, archive: impl Into<PathBuf>, max_lines: usize) -> Self {
        Self {
            store: PlaybookStore::new(document),
            archive_path: archive.into(),
            max_lines,
        }
    }

    pub fn from_config(config: &PlaybookConfig) -> Self {
        Self::new(&config.playbook_path, &config.archive_path, config.max_lines)
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    pub fn run(&self, analyzer: &dyn SignalAnalyzer) -> Result<ArchiveOutcome> {
        self.run_at(analyzer, Utc::now())
    }

    /// Enforce the line budget, stamping archive entries with `now`.
    ///
    /// The budget is measured on the serialized document, which is what gets
    /// written back.
    pub fn run_at(&self, analyzer: &dyn SignalAnalyzer, now: DateTime<Utc>) -> Result<ArchiveOutcome> {
        let doc = self.store.load()?;
        let on_disk = self.store.line_count()?;
        let lines_before = doc.line_count();
        let mut outcome = ArchiveOutcome {
            bullets_moved: 0,
            lines_reduced: 0,
            archive_path: self.archive_path.clone(),
            archived_ids: Vec::new(),
            lines_before,
            lines_after: lines_before,
            over_budget: false,
        };
        if lines_before <= self.max_lines {
            if on_disk > self.max_lines {
                debug!(event = "archive.normalized", on_disk, lines = lines_before);
                self.store.save(&doc)?;
            }
            return Ok(outcome);
        }

        let candidates = analyzer.candidates(&doc.bullets);
        let plan = plan_archival(&doc, self.max_lines, candidates);

        if !plan.selected.is_empty() {
            let body: String = plan
                .selected
                .iter()
                .map(|c| render_entry(c, now))
                .collect();
            append_atomic(&self.archive_path, ARCHIVE_HEADER, &body)?;
            self.store.save(&plan.document)?;

            outcome.archived_ids = plan.selected.iter().map(|c| c.bullet.id.clone()).collect();
            outcome.bullets_moved = plan.selected.len();
            outcome.lines_after = plan.remaining_lines;
            outcome.lines_reduced = lines_before.saturating_sub(outcome.lines_after);
        }

        outcome.over_budget = outcome.lines_after > self.max_lines;
        if outcome.over_budget {
            emit_archive_over_budget(outcome.lines_after, self.max_lines);
        }
        emit_archive_completed(outcome.bullets_moved, outcome.lines_reduced, &self.archive_path);
        Ok(outcome)
    }
}
