//! Deltas: proposed atomic changes to the playbook produced upstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operation carried by a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaOp {
    Add,
    Amend,
    Deprecate,
}

impl std::fmt::Display for DeltaOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Amend => write!(f, "amend"),
            Self::Deprecate => write!(f, "deprecate"),
        }
    }
}

/// The task/issue entity that produced a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaSource {
    pub owner_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaMetadata {
    /// Producer confidence in `[0, 1]`.
    pub confidence: f64,
    /// Supporting evidence text.
    pub evidence: String,
    #[serde(default)]
    pub helpful: u32,
    #[serde(default)]
    pub harmful: u32,
    pub source: DeltaSource,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl DeltaMetadata {
    pub fn new(
        confidence: f64,
        evidence: impl Into<String>,
        owner_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            confidence,
            evidence: evidence.into(),
            helpful: 0,
            harmful: 0,
            source: DeltaSource {
                owner_id: owner_id.into(),
            },
            tags: Vec::new(),
            created_at,
        }
    }

    pub fn with_counters(mut self, helpful: u32, harmful: u32) -> Self {
        self.helpful = helpful;
        self.harmful = harmful;
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }
}

/// A proposed change, consumed exactly once by [`crate::merge`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delta {
    pub id: String,
    pub section: String,
    pub op: DeltaOp,
    pub content: String,
    pub metadata: DeltaMetadata,
}

impl Delta {
    pub fn new(
        id: impl Into<String>,
        section: impl Into<String>,
        op: DeltaOp,
        content: impl Into<String>,
        metadata: DeltaMetadata,
    ) -> Self {
        Self {
            id: id.into(),
            section: section.into(),
            op,
            content: content.into(),
            metadata,
        }
    }
}
