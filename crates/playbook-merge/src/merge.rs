//! Delta merger: applies a batch of deltas to an existing bullet set.
//!
//! [`merge`] is a pure function. Each delta is judged on its own, in input
//! order, against the state left by the deltas before it:
//!
//! 1. structurally invalid (confidence outside `[0, 1]`, empty section or
//!    content) → `invalid`
//! 2. `confidence < threshold` → `low-confidence`
//! 3. evidence shorter than [`MIN_EVIDENCE_CHARS`] → `low-evidence`
//! 4. `deprecate` / `amend` need an existing bullet with the same hash,
//!    otherwise `invalid`
//! 5. `add` must not collide with an existing hash, otherwise `duplicate`
//!
//! Afterwards every bullet with `harmful > helpful` is evicted and the result
//! is sorted by [`crate::bullet::canonical_order`].

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bullet::{sort_canonical, KnowledgeBullet, Provenance};
use crate::delta::{Delta, DeltaOp};
use crate::hash::{content_hash, normalize_section};

/// Minimum trimmed evidence length, in characters.
pub const MIN_EVIDENCE_CHARS: usize = 8;

/// Shortest hash prefix used in generated bullet ids.
const ID_PREFIX_HEX: usize = 12;

/// Why a delta was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    LowConfidence,
    LowEvidence,
    Invalid,
    Duplicate,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LowConfidence => write!(f, "low-confidence"),
            Self::LowEvidence => write!(f, "low-evidence"),
            Self::Invalid => write!(f, "invalid"),
            Self::Duplicate => write!(f, "duplicate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub id: String,
    pub reason: RejectReason,
    pub details: String,
}

impl Rejection {
    fn new(delta: &Delta, reason: RejectReason, details: impl Into<String>) -> Self {
        Self {
            id: delta.id.clone(),
            reason,
            details: details.into(),
        }
    }
}

/// Result of a merge pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub bullets: Vec<KnowledgeBullet>,
    /// Accepted delta ids, in input order.
    pub accepted: Vec<String>,
    /// Rejected deltas, in input order.
    pub rejected: Vec<Rejection>,
    /// Bullet ids dropped because `harmful > helpful`.
    pub evicted: Vec<String>,
}

/// Bullets stored by slot, with a hash → slot side map.
struct BulletArena {
    slots: Vec<Option<KnowledgeBullet>>,
    by_hash: HashMap<String, usize>,
    ids: HashSet<String>,
}

impl BulletArena {
    fn from_existing(existing: &[KnowledgeBullet]) -> Self {
        let mut arena = Self {
            slots: Vec::with_capacity(existing.len()),
            by_hash: HashMap::with_capacity(existing.len()),
            ids: HashSet::with_capacity(existing.len()),
        };
        for bullet in existing {
            if let Some(first) = arena.get_mut(&bullet.hash) {
                // Hand-edited documents can carry the same bullet twice; keep
                // the first copy and fold the counters into it.
                debug!(
                    event = "merge.fold_existing_duplicate",
                    kept = %first.id,
                    folded = %bullet.id,
                );
                first.helpful = first.helpful.saturating_add(bullet.helpful);
                first.harmful = first.harmful.saturating_add(bullet.harmful);
                continue;
            }
            arena.insert(bullet.clone());
        }
        arena
    }

    fn get_mut(&mut self, hash: &str) -> Option<&mut KnowledgeBullet> {
        let slot = *self.by_hash.get(hash)?;
        self.slots[slot].as_mut()
    }

    fn get(&self, hash: &str) -> Option<&KnowledgeBullet> {
        let slot = *self.by_hash.get(hash)?;
        self.slots[slot].as_ref()
    }

    fn insert(&mut self, bullet: KnowledgeBullet) {
        self.by_hash.insert(bullet.hash.clone(), self.slots.len());
        self.ids.insert(bullet.id.clone());
        self.slots.push(Some(bullet));
    }

    fn remove(&mut self, hash: &str) -> Option<KnowledgeBullet> {
        let slot = self.by_hash.remove(hash)?;
        let bullet = self.slots[slot].take()?;
        self.ids.remove(&bullet.id);
        Some(bullet)
    }

    /// `b-` plus the shortest hash prefix not already taken.
    fn allocate_id(&self, hash: &str) -> String {
        for len in ID_PREFIX_HEX..=hash.len() {
            let candidate = format!("b-{}", &hash[..len]);
            if !self.ids.contains(&candidate) {
                return candidate;
            }
        }
        let mut n = 1usize;
        loop {
            let candidate = format!("b-{hash}-{n}");
            if !self.ids.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    fn into_bullets(self) -> Vec<KnowledgeBullet> {
        self.slots.into_iter().flatten().collect()
    }
}

/// Apply `deltas` to `existing`, returning the new bullet set and the
/// per-delta classification.
pub fn merge(existing: &[KnowledgeBullet], deltas: &[Delta], threshold: f64) -> MergeOutcome {
    let mut arena = BulletArena::from_existing(existing);
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();

    for delta in deltas {
        match apply_delta(&mut arena, delta, threshold) {
            Ok(()) => accepted.push(delta.id.clone()),
            Err(rejection) => {
                debug!(
                    event = "merge.delta_rejected",
                    delta_id = %rejection.id,
                    reason = %rejection.reason,
                );
                rejected.push(rejection);
            }
        }
    }

    let mut bullets = Vec::new();
    let mut evicted = Vec::new();
    for bullet in arena.into_bullets() {
        if bullet.is_net_harmful() {
            evicted.push(bullet.id);
        } else {
            bullets.push(bullet);
        }
    }
    sort_canonical(&mut bullets);
    evicted.sort();

    MergeOutcome {
        bullets,
        accepted,
        rejected,
        evicted,
    }
}

fn apply_delta(
    arena: &mut BulletArena,
    delta: &Delta,
    threshold: f64,
) -> Result<(), Rejection> {
    let meta = &delta.metadata;

    if !meta.confidence.is_finite() || !(0.0..=1.0).contains(&meta.confidence) {
        return Err(Rejection::new(
            delta,
            RejectReason::Invalid,
            format!("confidence {} outside [0, 1]", meta.confidence),
        ));
    }
    if normalize_section(&delta.section).is_empty() {
        return Err(Rejection::new(delta, RejectReason::Invalid, "empty section"));
    }
    if delta.content.trim().is_empty() {
        return Err(Rejection::new(delta, RejectReason::Invalid, "empty content"));
    }
    if meta.confidence < threshold {
        return Err(Rejection::new(
            delta,
            RejectReason::LowConfidence,
            format!("confidence {} below threshold {}", meta.confidence, threshold),
        ));
    }
    let evidence_chars = meta.evidence.trim().chars().count();
    if evidence_chars < MIN_EVIDENCE_CHARS {
        return Err(Rejection::new(
            delta,
            RejectReason::LowEvidence,
            format!("evidence has {evidence_chars} characters, need {MIN_EVIDENCE_CHARS}"),
        ));
    }

    let hash = content_hash(&delta.section, &delta.content);
    let provenance = Provenance::new(&delta.id, &meta.source.owner_id, meta.created_at);

    match delta.op {
        DeltaOp::Deprecate => match arena.remove(&hash) {
            Some(_) => Ok(()),
            None => Err(Rejection::new(
                delta,
                RejectReason::Invalid,
                "deprecate target not found",
            )),
        },
        DeltaOp::Amend => match arena.get_mut(&hash) {
            Some(bullet) => {
                bullet.set_content(&delta.content);
                bullet.helpful = bullet.helpful.saturating_add(meta.helpful);
                bullet.harmful = bullet.harmful.saturating_add(meta.harmful);
                bullet.provenance = Some(provenance);
                Ok(())
            }
            None => Err(Rejection::new(
                delta,
                RejectReason::Invalid,
                "amend target not found",
            )),
        },
        DeltaOp::Add => {
            if let Some(existing) = arena.get(&hash) {
                return Err(Rejection::new(
                    delta,
                    RejectReason::Duplicate,
                    format!("collides with bullet {}", existing.id),
                ));
            }
            let id = arena.allocate_id(&hash);
            let bullet =
                KnowledgeBullet::new(id, &delta.section, &delta.content, meta.helpful, meta.harmful)
                    .with_provenance(provenance);
            arena.insert(bullet);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::DeltaMetadata;
    use chrono::{TimeZone, Utc};

    const EVIDENCE: &str = "observed in three separate runs";

    fn delta(id: &str, op: DeltaOp, section: &str, content: &str, confidence: f64) -> Delta {
        let ts = Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap();
        Delta::new(
            id,
            section,
            op,
            content,
            DeltaMetadata::new(confidence, EVIDENCE, "bd-1", ts),
        )
    }

    fn add(id: &str, content: &str) -> Delta {
        delta(id, DeltaOp::Add, "testing", content, 0.9)
    }

    #[test]
    fn test_duplicate_add_rejected() {
        let deltas = vec![
            add("d-1", "Run the suite before pushing"),
            delta("d-2", DeltaOp::Add, "Testing", "run  the SUITE before pushing", 0.9),
        ];
        let out = merge(&[], &deltas, 0.8);
        assert_eq!(out.accepted, vec!["d-1"]);
        assert_eq!(out.rejected.len(), 1);
        assert_eq!(out.rejected[0].id, "d-2");
        assert_eq!(out.rejected[0].reason, RejectReason::Duplicate);
        assert!(out.rejected[0].details.contains(&out.bullets[0].id));
    }

    #[test]
    fn test_amend_missing_target_invalid() {
        let out = merge(&[], &[delta("d-1", DeltaOp::Amend, "testing", "nope", 0.9)], 0.8);
        assert!(out.accepted.is_empty());
        assert_eq!(out.rejected[0].reason, RejectReason::Invalid);
    }

    #[test]
    fn test_deprecate_missing_target_invalid() {
        let out = merge(
            &[],
            &[delta("d-1", DeltaOp::Deprecate, "testing", "nope", 0.9)],
            0.8,
        );
        assert_eq!(out.rejected[0].reason, RejectReason::Invalid);
    }

    #[test]
    fn test_amend_pushing_harmful_over_helpful_evicts() {
        let existing = vec![KnowledgeBullet::new("b-x", "testing", "flaky rule", 2, 1)];
        let mut amend = delta("d-1", DeltaOp::Amend, "testing", "flaky rule", 0.9);
        amend.metadata.harmful = 2;
        let out = merge(&existing, &[amend], 0.8);
        assert_eq!(out.accepted, vec!["d-1"]);
        assert!(out.bullets.is_empty());
        assert_eq!(out.evicted, vec!["b-x"]);
    }

    #[test]
    fn test_amend_updates_counters_and_provenance() {
        let existing = vec![KnowledgeBullet::new("b-x", "testing", "Pin versions", 1, 0)];
        let mut amend = delta("d-9", DeltaOp::Amend, "testing", "pin   VERSIONS", 0.9);
        amend.metadata.helpful = 2;
        let out = merge(&existing, &[amend], 0.8);
        let b = &out.bullets[0];
        assert_eq!(b.id, "b-x");
        assert_eq!(b.content, "pin VERSIONS");
        assert_eq!(b.helpful, 3);
        assert_eq!(b.provenance.as_ref().unwrap().delta_id, "d-9");
    }

    #[test]
    fn test_deprecate_removes() {
        let existing = vec![KnowledgeBullet::new("b-x", "testing", "old advice", 1, 0)];
        let out = merge(
            &existing,
            &[delta("d-1", DeltaOp::Deprecate, "testing", "Old advice", 0.9)],
            0.8,
        );
        assert_eq!(out.accepted, vec!["d-1"]);
        assert!(out.bullets.is_empty());
        assert!(out.evicted.is_empty());
    }

    #[test]
    fn test_threshold_and_evidence_checks_in_order() {
        let mut both_bad = add("d-1", "x");
        both_bad.metadata.confidence = 0.1;
        both_bad.metadata.evidence = "short".to_string();
        let mut short = add("d-2", "y");
        short.metadata.evidence = "  1234567 ".to_string();
        let mut exact = add("d-3", "z");
        exact.metadata.evidence = "12345678".to_string();

        let out = merge(&[], &[both_bad, short, exact], 0.8);
        assert_eq!(out.rejected[0].reason, RejectReason::LowConfidence);
        assert_eq!(out.rejected[1].reason, RejectReason::LowEvidence);
        assert_eq!(out.accepted, vec!["d-3"]);
    }

    #[test]
    fn test_confidence_at_threshold_accepted() {
        let out = merge(&[], &[delta("d-1", DeltaOp::Add, "s", "c", 0.8)], 0.8);
        assert_eq!(out.accepted, vec!["d-1"]);
    }

    #[test]
    fn test_structurally_invalid_deltas() {
        let out = merge(
            &[],
            &[
                delta("d-1", DeltaOp::Add, "s", "c", 1.5),
                delta("d-2", DeltaOp::Add, "s", "c", f64::NAN),
                delta("d-3", DeltaOp::Add, "   ", "c", 0.9),
                delta("d-4", DeltaOp::Add, "s", "  ", 0.9),
            ],
            0.8,
        );
        assert!(out.accepted.is_empty());
        assert!(out
            .rejected
            .iter()
            .all(|r| r.reason == RejectReason::Invalid));
    }

    #[test]
    fn test_ordering_contract() {
        let mut a = delta("d-1", DeltaOp::Add, "testing", "beta", 0.9);
        a.metadata.helpful = 1;
        let mut b = delta("d-2", DeltaOp::Add, "testing", "alpha", 0.9);
        b.metadata.helpful = 1;
        let mut c = delta("d-3", DeltaOp::Add, "testing", "zulu", 0.9);
        c.metadata.helpful = 5;
        let d = delta("d-4", DeltaOp::Add, "architecture", "layers", 0.9);
        let out = merge(&[], &[a, b, c, d], 0.8);
        let contents: Vec<_> = out.bullets.iter().map(|b| b.content.as_str()).collect();
        assert_eq!(contents, vec!["layers", "zulu", "alpha", "beta"]);
    }

    #[test]
    fn test_later_delta_sees_earlier_effects() {
        let deltas = vec![
            add("d-1", "cache cargo registry"),
            delta("d-2", DeltaOp::Deprecate, "testing", "cache cargo registry", 0.9),
            add("d-3", "cache cargo registry"),
        ];
        let out = merge(&[], &deltas, 0.8);
        assert_eq!(out.accepted, vec!["d-1", "d-2", "d-3"]);
        assert_eq!(out.bullets.len(), 1);
        assert_eq!(
            out.bullets[0].provenance.as_ref().unwrap().delta_id,
            "d-3"
        );
    }

    #[test]
    fn test_generated_ids_are_hash_prefixed_and_unique() {
        let out = merge(&[], &[add("d-1", "one"), add("d-2", "two")], 0.8);
        for b in &out.bullets {
            assert_eq!(b.id, format!("b-{}", &b.hash[..12]));
        }
        assert_ne!(out.bullets[0].id, out.bullets[1].id);
    }

    #[test]
    fn test_allocate_id_extends_prefix_on_clash() {
        let hash = content_hash("testing", "one");
        let squatter = KnowledgeBullet::new(format!("b-{}", &hash[..12]), "other", "x", 1, 0);
        let out = merge(&[squatter], &[add("d-1", "one")], 0.8);
        let added = out.bullets.iter().find(|b| b.section == "testing").unwrap();
        assert_eq!(added.id, format!("b-{}", &hash[..13]));
    }

    #[test]
    fn test_existing_hash_collisions_folded() {
        let existing = vec![
            KnowledgeBullet::new("b-1", "testing", "Same rule", 2, 0),
            KnowledgeBullet::new("b-2", "testing", "same   rule", 1, 1),
        ];
        let out = merge(&existing, &[], 0.8);
        assert_eq!(out.bullets.len(), 1);
        assert_eq!(out.bullets[0].id, "b-1");
        assert_eq!((out.bullets[0].helpful, out.bullets[0].harmful), (3, 1));
    }
}
