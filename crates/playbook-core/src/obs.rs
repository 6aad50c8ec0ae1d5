//! Structured observability hooks for playbook maintenance operations.
//!
//! Every operation runs inside an [`OperationSpan`] carrying a fresh
//! `operation_id`, and reports its result through one of the `emit_*`
//! functions. Events are emitted at `info!` (warnings at `warn!`).

use std::path::Path;

use tracing::{info, warn};
use uuid::Uuid;

/// RAII guard that enters an operation-scoped span.
///
/// ```ignore
/// let _span = OperationSpan::enter("merge");
/// // every event below carries operation = "merge" and operation_id
/// ```
pub struct OperationSpan {
    operation_id: Uuid,
    _span: tracing::span::EnteredSpan,
}

impl OperationSpan {
    pub fn enter(operation: &str) -> Self {
        let operation_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "playbook.operation",
            operation = %operation,
            operation_id = %operation_id,
        );
        Self {
            operation_id,
            _span: span.entered(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.operation_id
    }
}

pub fn emit_merge_completed(accepted: usize, rejected: usize, evicted: usize, bullets: usize) {
    info!(
        event = "merge.completed",
        accepted = accepted,
        rejected = rejected,
        evicted = evicted,
        bullets = bullets,
    );
}

pub fn emit_delta_rejected(delta_id: &str, reason: &str, details: &str) {
    info!(
        event = "delta.rejected",
        delta_id = %delta_id,
        reason = %reason,
        details = %details,
    );
}

pub fn emit_consolidation_completed(removed: usize, groups: usize) {
    info!(event = "consolidation.completed", removed = removed, groups = groups);
}

pub fn emit_archive_completed(moved: usize, lines_reduced: usize, archive: &Path) {
    info!(
        event = "archive.completed",
        bullets_moved = moved,
        lines_reduced = lines_reduced,
        archive = %archive.display(),
    );
}

/// Candidates ran out before the document got under its line limit.
pub fn emit_archive_over_budget(lines: usize, limit: usize) {
    warn!(event = "archive.over_budget", lines = lines, limit = limit);
}

pub fn emit_retention_completed(log: &Path, kept: usize, archived: usize, malformed: usize) {
    info!(
        event = "retention.completed",
        log = %log.display(),
        kept = kept,
        archived = archived,
        malformed = malformed,
    );
}

/// A record or delta line that could not be parsed and was set aside.
pub fn emit_record_malformed(source: &Path, line: usize, error: &dyn std::fmt::Display) {
    warn!(
        event = "record.malformed",
        source = %source.display(),
        line = line,
        error = %error,
    );
}
