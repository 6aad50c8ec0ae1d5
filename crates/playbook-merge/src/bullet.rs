//! Knowledge bullets: the retained items of the playbook.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::{content_hash, normalize_section};

/// Where a bullet came from: the delta that last wrote it and its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub delta_id: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

impl Provenance {
    pub fn new(
        delta_id: impl Into<String>,
        owner_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            delta_id: delta_id.into(),
            owner_id: owner_id.into(),
            created_at,
        }
    }
}

/// A single learned pattern with its feedback counters.
///
/// `section` is always canonical and `hash` always matches
/// `content_hash(section, content)`; use [`KnowledgeBullet::set_content`]
/// rather than assigning `content` directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBullet {
    pub id: String,
    pub section: String,
    pub content: String,
    pub helpful: u32,
    pub harmful: u32,
    pub hash: String,
    pub provenance: Option<Provenance>,
}

impl KnowledgeBullet {
    pub fn new(
        id: impl Into<String>,
        section: &str,
        content: &str,
        helpful: u32,
        harmful: u32,
    ) -> Self {
        let section = normalize_section(section);
        let content = single_line(content);
        let hash = content_hash(&section, &content);
        Self {
            id: id.into(),
            section,
            content,
            helpful,
            harmful,
            hash,
            provenance: None,
        }
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }

    /// Replace the content and re-anchor the hash.
    pub fn set_content(&mut self, content: &str) {
        self.content = single_line(content);
        self.hash = content_hash(&self.section, &self.content);
    }

    /// Whether the bullet violates `harmful <= helpful`.
    pub fn is_net_harmful(&self) -> bool {
        self.harmful > self.helpful
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.provenance.as_ref().map(|p| p.created_at)
    }
}

/// Bullet lines hold exactly one line of text; embedded line breaks become spaces.
fn single_line(content: &str) -> String {
    content
        .trim()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Playbook ordering: section ascending, helpful descending, content
/// ascending, id ascending.
pub fn canonical_order(a: &KnowledgeBullet, b: &KnowledgeBullet) -> Ordering {
    a.section
        .cmp(&b.section)
        .then_with(|| b.helpful.cmp(&a.helpful))
        .then_with(|| a.content.cmp(&b.content))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn sort_canonical(bullets: &mut [KnowledgeBullet]) {
    bullets.sort_by(canonical_order);
}
