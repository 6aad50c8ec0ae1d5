//! Playbook-Core: File-Backed Maintenance for the Agent Playbook
//!
//! Re-exports the operations that read and rewrite the playbook, its archive
//! and the trace/insight logs. The pure merge and consolidation logic lives in
//! `playbook-merge`; this crate adds the filesystem, configuration and
//! observability around it.
//!
//! ## Layer 2 - Persistence
//!
//! Every write is atomic (temp file + rename) and archives are append-only,
//! so an interrupted run never loses a bullet or a log record.
//!
//! ## Key Components
//!
//! - `pipeline`: delta file → merge → consolidate → save → archive
//! - `archive`: line-budget enforcement and restore
//! - `retention`: per-owner count/age bounding of append-only logs

pub mod archive;
pub mod config;
pub mod deltas;
mod error;
pub mod fsio;
pub mod obs;
pub mod pipeline;
pub mod retention;
pub mod store;
pub mod telemetry;

pub use archive::{
    plan_archival, read_archive, restore_archived, ArchivalCandidate, ArchivalMaintainer,
    ArchivalPlan, ArchivalReason, ArchiveOutcome, ArchivedBullet, CounterSignalAnalyzer,
    SignalAnalyzer,
};
pub use config::{LogPaths, PlaybookConfig, RetentionPolicy};
pub use deltas::{load_deltas, parse_deltas, DeltaBatch, MalformedEntry};
pub use error::{PlaybookError, Result};
pub use pipeline::{apply_delta_file, consolidate_document, enforce_budget, MaintenanceReport};
pub use retention::{clean_all, clean_all_at, clean_log, RetentionOutcome, RetentionReport};
pub use store::PlaybookStore;
pub use telemetry::{init_from_config, LogFormat};

pub use playbook_merge::{
    ConsolidationConfig, Delta, DeltaMetadata, DeltaOp, Document, KnowledgeBullet, Provenance,
};
