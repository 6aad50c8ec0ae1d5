//! End-to-end maintenance operations over the configured files.
//!
//! ```text
//! deltas ──► merge ──► consolidate (optional) ──► save ──► archive (if over budget)
//! ```

use std::path::Path;

use playbook_merge::{consolidate, merge, ConsolidationOutcome, Rejection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::archive::{ArchivalMaintainer, ArchiveOutcome, SignalAnalyzer};
use crate::config::PlaybookConfig;
use crate::deltas::{load_deltas, MalformedEntry};
use crate::error::Result;
use crate::obs::{
    emit_consolidation_completed, emit_delta_rejected, emit_merge_completed, OperationSpan,
};
use crate::store::PlaybookStore;

/// Summary of one [`apply_delta_file`] run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub operation_id: Uuid,
    pub accepted: Vec<String>,
    pub rejected: Vec<Rejection>,
    pub evicted: Vec<String>,
    /// Stream entries that could not be decoded.
    pub malformed: Vec<MalformedEntry>,
    pub consolidation: Option<ConsolidationOutcome>,
    pub archive: Option<ArchiveOutcome>,
    /// Bullets in the document after the run.
    pub bullets: usize,
}

/// Merge the delta stream at `deltas_path` into the playbook.
///
/// A missing playbook is bootstrapped; a missing stream is an error. When an
/// analyzer is given and the saved document is over `max_lines`, an archival
/// pass follows.
pub fn apply_delta_file(
    config: &PlaybookConfig,
    deltas_path: &Path,
    analyzer: Option<&dyn SignalAnalyzer>,
) -> Result<MaintenanceReport> {
    config.validate()?;
    let span = OperationSpan::enter("apply_deltas");

    let batch = load_deltas(deltas_path)?;
    let store = PlaybookStore::new(&config.playbook_path);
    let mut doc = store.load_or_default()?;

    let outcome = merge(&doc.bullets, &batch.deltas, config.confidence_threshold);
    for rejection in &outcome.rejected {
        emit_delta_rejected(&rejection.id, &rejection.reason.to_string(), &rejection.details);
    }
    emit_merge_completed(
        outcome.accepted.len(),
        outcome.rejected.len(),
        outcome.evicted.len(),
        outcome.bullets.len(),
    );
    doc.bullets = outcome.bullets;

    let consolidation = if config.consolidate_after_merge {
        let result = consolidate(&mut doc.bullets, &config.consolidation);
        emit_consolidation_completed(result.removed, result.groups.len());
        Some(result)
    } else {
        None
    };

    store.save(&doc)?;

    let archive = analyzer
        .map(|analyzer| ArchivalMaintainer::from_config(config).run(analyzer))
        .transpose()?;
    let moved = archive.as_ref().map_or(0, |a| a.bullets_moved);
    let bullets = doc.bullets.len().saturating_sub(moved);

    Ok(MaintenanceReport {
        operation_id: span.id(),
        accepted: outcome.accepted,
        rejected: outcome.rejected,
        evicted: outcome.evicted,
        malformed: batch.malformed,
        consolidation,
        archive,
        bullets,
    })
}

/// Run the consolidation pass over the existing playbook and save it.
pub fn consolidate_document(config: &PlaybookConfig) -> Result<ConsolidationOutcome> {
    config.validate()?;
    let _span = OperationSpan::enter("consolidate");

    let store = PlaybookStore::new(&config.playbook_path);
    let mut doc = store.load()?;
    let outcome = consolidate(&mut doc.bullets, &config.consolidation);
    if outcome.removed > 0 {
        store.save(&doc)?;
    }
    emit_consolidation_completed(outcome.removed, outcome.groups.len());
    Ok(outcome)
}

/// Archive bullets until the playbook fits `max_lines`.
pub fn enforce_budget(config: &PlaybookConfig, analyzer: &dyn SignalAnalyzer) -> Result<ArchiveOutcome> {
    config.validate()?;
    let _span = OperationSpan::enter("archive");
    ArchivalMaintainer::from_config(config).run(analyzer)
}
