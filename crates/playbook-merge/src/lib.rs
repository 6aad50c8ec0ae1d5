//! Playbook-Merge: Delta Merging and Consolidation for the Agent Playbook
//!
//! This crate holds the pure half of the playbook: the bullet model, the
//! document codec, the delta merger and the consolidation pass. Nothing here
//! touches the filesystem; callers load text, transform the model and write
//! the result back themselves.
//!
//! ## Layer 1 - Domain
//!
//! Focus: content-hash identity, deterministic ordering and textual
//! near-duplicate detection.
//!
//! ## Key Components
//!
//! - `Document`: structured model of the playbook markdown
//! - `merge`: applies a delta batch to a bullet set
//! - `consolidate`: collapses near-duplicate bullets per section

pub mod bullet;
pub mod codec;
pub mod consolidate;
pub mod delta;
mod error;
pub mod hash;
pub mod merge;
pub mod sidecar;

pub use bullet::{sort_canonical, KnowledgeBullet, Provenance};
pub use codec::{bullet_line_count, parse_bullet_line, render_bullet, BulletLine, Document};
pub use consolidate::{consolidate, ConsolidatedGroup, ConsolidationConfig, ConsolidationOutcome};
pub use delta::{Delta, DeltaMetadata, DeltaOp, DeltaSource};
pub use error::{CodecError, SidecarError};
pub use hash::{content_hash, normalize_section, normalize_text};
pub use merge::{merge, MergeOutcome, RejectReason, Rejection, MIN_EVIDENCE_CHARS};

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;
