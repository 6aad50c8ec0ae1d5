//! Consolidation pass: collapses near-duplicate bullets within a section.
//!
//! Content is compared on its *similarity key*: lowercase, punctuation turned
//! into spaces, whitespace collapsed, aggregation marker removed. Two bullets
//! in the same section are duplicates when
//!
//! - their keys are equal, or
//! - both keys have at least `min_tokens` tokens and the Jaccard similarity of
//!   their token sets is at least `similarity_threshold`.
//!
//! Groups are the connected components of that relation. Each group keeps one
//! member (highest helpful, then earliest createdAt, then lowest id) whose
//! counters become the group sums and whose content gains an
//! `(Aggregated from n instances)` marker.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bullet::{sort_canonical, KnowledgeBullet};

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\s*\(Aggregated from (\d+) instances\)\s*$")
            .expect("aggregation marker regex is valid")
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Minimum token-set Jaccard similarity for the looser rule.
    pub similarity_threshold: f64,
    /// Both bullets need at least this many tokens for the looser rule.
    pub min_tokens: usize,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            min_tokens: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidatedGroup {
    pub section: String,
    pub retained_id: String,
    pub absorbed_ids: Vec<String>,
    /// Total instances now represented by the retained bullet.
    pub instances: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationOutcome {
    /// Number of bullets removed.
    pub removed: usize,
    pub groups: Vec<ConsolidatedGroup>,
}

/// Split `content` into its base text and the instance count of its marker
/// (1 when unmarked).
pub fn split_marker(content: &str) -> (&str, usize) {
    match marker_regex().captures(content) {
        Some(caps) => {
            let count = caps
                .get(1)
                .and_then(|m| m.as_str().parse::<usize>().ok())
                .unwrap_or(1)
                .max(1);
            let start = caps.get(0).map_or(content.len(), |m| m.start());
            (&content[..start], count)
        }
        None => (content, 1),
    }
}

/// Normalized comparison key for near-duplicate detection.
pub fn similarity_key(content: &str) -> String {
    let (base, _) = split_marker(content);
    let mut folded = String::with_capacity(base.len());
    for c in base.chars() {
        if c.is_alphanumeric() {
            folded.extend(c.to_lowercase());
        } else {
            folded.push(' ');
        }
    }
    folded
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Jaccard similarity of two token sets; two empty sets score 1.0.
pub fn jaccard(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

struct Candidate<'a> {
    key: &'a str,
    tokens: BTreeSet<&'a str>,
}

fn is_duplicate(a: &Candidate<'_>, b: &Candidate<'_>, config: &ConsolidationConfig) -> bool {
    if a.key == b.key {
        return true;
    }
    a.tokens.len() >= config.min_tokens
        && b.tokens.len() >= config.min_tokens
        && jaccard(&a.tokens, &b.tokens) >= config.similarity_threshold
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        // Lower index becomes the root so components are stable.
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[hi] = lo;
    }
}

/// Which member of a group survives.
fn retain_order(a: &KnowledgeBullet, b: &KnowledgeBullet) -> std::cmp::Ordering {
    b.helpful
        .cmp(&a.helpful)
        .then_with(|| a.created_at().cmp(&b.created_at()))
        .then_with(|| a.id.cmp(&b.id))
}

/// Collapse near-duplicate bullets in place. `bullets` is left in canonical
/// order.
pub fn consolidate(
    bullets: &mut Vec<KnowledgeBullet>,
    config: &ConsolidationConfig,
) -> ConsolidationOutcome {
    let keys: Vec<String> = bullets.iter().map(|b| similarity_key(&b.content)).collect();
    let candidates: Vec<Candidate<'_>> = keys
        .iter()
        .map(|key| Candidate {
            key: key.as_str(),
            tokens: key.split(' ').filter(|t| !t.is_empty()).collect(),
        })
        .collect();

    let n = bullets.len();
    let mut parent: Vec<usize> = (0..n).collect();
    for i in 0..n {
        for j in (i + 1)..n {
            if bullets[i].section == bullets[j].section
                && is_duplicate(&candidates[i], &candidates[j], config)
            {
                union(&mut parent, i, j);
            }
        }
    }

    let mut components: Vec<Vec<usize>> = vec![Vec::new(); n];
    for i in 0..n {
        let root = find(&mut parent, i);
        components[root].push(i);
    }

    let mut outcome = ConsolidationOutcome::default();
    let mut drop = vec![false; n];
    let mut rewrites: Vec<(usize, String, u32, u32)> = Vec::new();

    for members in components.iter().filter(|m| m.len() > 1) {
        let keep = members
            .iter()
            .copied()
            .min_by(|&a, &b| retain_order(&bullets[a], &bullets[b]))
            .unwrap_or(members[0]);

        let mut instances = 0usize;
        let mut helpful = 0u32;
        let mut harmful = 0u32;
        let mut absorbed_ids = Vec::new();
        for &m in members {
            let bullet = &bullets[m];
            instances += split_marker(&bullet.content).1;
            helpful = helpful.saturating_add(bullet.helpful);
            harmful = harmful.saturating_add(bullet.harmful);
            if m != keep {
                drop[m] = true;
                absorbed_ids.push(bullet.id.clone());
            }
        }
        absorbed_ids.sort();

        let base = split_marker(&bullets[keep].content).0.trim_end();
        let content = format!("{base} (Aggregated from {instances} instances)");
        debug!(
            event = "consolidation.group",
            section = %bullets[keep].section,
            retained = %bullets[keep].id,
            absorbed = absorbed_ids.len(),
        );
        outcome.removed += absorbed_ids.len();
        outcome.groups.push(ConsolidatedGroup {
            section: bullets[keep].section.clone(),
            retained_id: bullets[keep].id.clone(),
            absorbed_ids,
            instances,
        });
        rewrites.push((keep, content, helpful, harmful));
    }

    for (idx, content, helpful, harmful) in rewrites {
        let bullet = &mut bullets[idx];
        bullet.set_content(&content);
        bullet.helpful = helpful;
        bullet.harmful = harmful;
    }

    let mut idx = 0;
    bullets.retain(|_| {
        let keep = !drop[idx];
        idx += 1;
        keep
    });
    sort_canonical(bullets);
    outcome
}
