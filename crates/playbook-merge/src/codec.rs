//! Playbook document codec.
//!
//! Document layout:
//!
//! ```text
//! # Playbook                      <- preamble (kept verbatim)
//!
//! ## coding_patterns              <- section header
//! Free-form note lines are kept.  <- section note
//! [Bullet #b-1a2b3c4d5e6f, helpful:3, harmful:0] Prefer small diffs
//! <!-- deltaId=d-1 ownerId=bd-7 createdAt=2026-10-01T12:00:00Z hash=1a2b... -->
//! ```
//!
//! The codec never edits text in place: callers parse into a [`Document`],
//! transform it and serialize the whole thing again.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use crate::bullet::KnowledgeBullet;
use crate::error::CodecError;
use crate::hash::normalize_section;
use crate::sidecar::{is_sidecar_line, parse_sidecar, render_sidecar};
use crate::Result;

const SECTION_PREFIX: &str = "## ";

fn bullet_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[Bullet #([^,\]\s]+), helpful:(\d+), harmful:(\d+)\] ?(.*)$")
            .expect("bullet line regex is valid")
    })
}

/// `## name` (or a bare `##`) opens a section; `###` and deeper do not.
fn section_header(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("##")?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest)
    } else {
        None
    }
}

/// Fields of a bullet line before counters are range-checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulletLine<'a> {
    pub id: &'a str,
    pub helpful: &'a str,
    pub harmful: &'a str,
    pub content: &'a str,
}

/// Match `[Bullet #<id>, helpful:<n>, harmful:<m>] <content>`.
pub fn parse_bullet_line(line: &str) -> Option<BulletLine<'_>> {
    let caps = bullet_regex().captures(line)?;
    Some(BulletLine {
        id: caps.get(1)?.as_str(),
        helpful: caps.get(2)?.as_str(),
        harmful: caps.get(3)?.as_str(),
        content: caps.get(4)?.as_str(),
    })
}

impl BulletLine<'_> {
    /// Build a bullet in `section`, checking both counters fit in `u32`.
    pub fn into_bullet(self, section: &str, line: usize) -> Result<KnowledgeBullet> {
        let counter = |value: &str| {
            value.parse::<u32>().map_err(|_| CodecError::InvalidCounter {
                line,
                value: value.to_string(),
            })
        };
        Ok(KnowledgeBullet::new(
            self.id,
            section,
            self.content,
            counter(self.helpful)?,
            counter(self.harmful)?,
        ))
    }
}

/// The bullet line plus its sidecar, joined by `\n` (no trailing newline).
pub fn render_bullet(bullet: &KnowledgeBullet) -> String {
    format!(
        "[Bullet #{}, helpful:{}, harmful:{}] {}\n{}",
        bullet.id,
        bullet.helpful,
        bullet.harmful,
        bullet.content,
        render_sidecar(bullet.provenance.as_ref(), &bullet.hash)
    )
}

/// Number of document lines `bullet` occupies once serialized.
pub fn bullet_line_count(bullet: &KnowledgeBullet) -> usize {
    render_bullet(bullet).lines().count()
}

/// Structured in-memory model of a playbook document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    /// Lines before the first section header.
    pub preamble: Vec<String>,
    /// Non-bullet lines found inside each section.
    pub notes: BTreeMap<String, Vec<String>>,
    pub bullets: Vec<KnowledgeBullet>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(title: &str) -> Self {
        Self {
            preamble: vec![format!("# {title}")],
            ..Self::default()
        }
    }

    pub fn with_bullets(mut self, bullets: Vec<KnowledgeBullet>) -> Self {
        self.bullets = bullets;
        self
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut doc = Document::new();
        let mut section: Option<String> = None;
        // Index of the bullet a sidecar on the next line would attach to.
        let mut open_bullet: Option<usize> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim_end();

            if let Some(name) = section_header(line) {
                let name = normalize_section(name);
                if name.is_empty() {
                    return Err(CodecError::EmptySectionName { line: line_no });
                }
                section = Some(name);
                open_bullet = None;
                continue;
            }

            let Some(current) = section.as_deref() else {
                if parse_bullet_line(line.trim_start()).is_some() {
                    return Err(CodecError::BulletOutsideSection { line: line_no });
                }
                doc.preamble.push(line.to_string());
                continue;
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                open_bullet = None;
            } else if is_sidecar_line(trimmed) {
                let Some(target) = open_bullet.take() else {
                    return Err(CodecError::OrphanSidecar { line: line_no });
                };
                let sidecar = parse_sidecar(trimmed).map_err(|source| {
                    CodecError::MalformedSidecar {
                        line: line_no,
                        source,
                    }
                })?;
                let bullet = &mut doc.bullets[target];
                if let Some(stored) = sidecar.hash.as_deref() {
                    if stored != bullet.hash {
                        warn!(
                            event = "codec.hash_mismatch",
                            line = line_no,
                            bullet_id = %bullet.id,
                            "stored hash differs from content; using recomputed hash"
                        );
                    }
                }
                bullet.provenance = sidecar.provenance;
            } else if let Some(parsed) = parse_bullet_line(trimmed) {
                doc.bullets.push(parsed.into_bullet(current, line_no)?);
                open_bullet = Some(doc.bullets.len() - 1);
            } else {
                doc.notes
                    .entry(current.to_string())
                    .or_default()
                    .push(trimmed.to_string());
                open_bullet = None;
            }
        }

        while doc.preamble.last().is_some_and(|l| l.trim().is_empty()) {
            doc.preamble.pop();
        }
        Ok(doc)
    }

    /// Canonical text: preamble, then sections in ascending order, each with
    /// its notes and bullets (bullets keep their relative order).
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for line in &self.preamble {
            out.push_str(line);
            out.push('\n');
        }

        for section in self.sections() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(SECTION_PREFIX);
            out.push_str(section);
            out.push('\n');
            if let Some(notes) = self.notes.get(section) {
                for note in notes {
                    out.push_str(note);
                    out.push('\n');
                }
            }
            for bullet in self.bullets.iter().filter(|b| b.section == section) {
                out.push_str(&render_bullet(bullet));
                out.push('\n');
            }
        }
        out
    }

    /// Line count of the serialized document.
    pub fn line_count(&self) -> usize {
        self.serialize().lines().count()
    }

    /// All section names with notes or bullets, ascending.
    pub fn sections(&self) -> Vec<&str> {
        let names: BTreeSet<&str> = self
            .notes
            .keys()
            .map(String::as_str)
            .chain(self.bullets.iter().map(|b| b.section.as_str()))
            .collect();
        names.into_iter().collect()
    }

    pub fn find(&self, id: &str) -> Option<&KnowledgeBullet> {
        self.bullets.iter().find(|b| b.id == id)
    }
}
