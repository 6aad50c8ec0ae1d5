//! Provenance sidecar lines.
//!
//! A sidecar is an HTML comment on the line directly below a bullet:
//!
//! ```text
//! <!-- deltaId=d-17 ownerId=bd-42 createdAt=2026-10-01T12:00:00Z hash=9f2c... -->
//! ```
//!
//! The body is a whitespace-separated list of `key=value` tokens. A value is
//! either bare (no whitespace, `"`, `=` or `\`) or double-quoted. Quoted
//! values support the escapes `\"`, `\\`, `\n`, `\r` and `\t`, so a sidecar
//! always stays on one line. Unknown keys are ignored; every other deviation
//! is a [`SidecarError`].

use std::iter::Peekable;
use std::str::Chars;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::bullet::Provenance;
use crate::error::SidecarError;

const OPEN: &str = "<!--";
const CLOSE: &str = "-->";

/// Decoded sidecar contents.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sidecar {
    pub provenance: Option<Provenance>,
    pub hash: Option<String>,
}

/// Whether `line` is shaped like a sidecar comment.
pub fn is_sidecar_line(line: &str) -> bool {
    let t = line.trim();
    t.len() >= OPEN.len() + CLOSE.len() && t.starts_with(OPEN) && t.ends_with(CLOSE)
}

/// Split a sidecar body into ordered `(key, value)` pairs.
pub fn tokenize(body: &str) -> Result<Vec<(String, String)>, SidecarError> {
    let mut chars = body.chars().peekable();
    let mut pairs: Vec<(String, String)> = Vec::new();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
            key.push(c);
        }
        if chars.next_if_eq(&'=').is_none() {
            return Err(SidecarError::MissingEquals { token: key });
        }
        if key.is_empty() {
            return Err(SidecarError::EmptyKey);
        }

        let value = if chars.next_if_eq(&'"').is_some() {
            read_quoted(&mut chars, &key)?
        } else {
            read_bare(&mut chars, &key)?
        };

        if pairs.iter().any(|(k, _)| *k == key) {
            return Err(SidecarError::DuplicateKey { key });
        }
        pairs.push((key, value));
    }

    Ok(pairs)
}

fn read_quoted(chars: &mut Peekable<Chars<'_>>, key: &str) -> Result<String, SidecarError> {
    let mut value = String::new();
    loop {
        match chars.next() {
            None => {
                return Err(SidecarError::UnterminatedQuote {
                    key: key.to_string(),
                })
            }
            Some('"') => break,
            Some('\\') => match chars.next() {
                Some(c @ ('"' | '\\')) => value.push(c),
                Some('n') => value.push('\n'),
                Some('r') => value.push('\r'),
                Some('t') => value.push('\t'),
                Some(other) => {
                    return Err(SidecarError::InvalidEscape {
                        key: key.to_string(),
                        escape: other,
                    })
                }
                None => {
                    return Err(SidecarError::UnterminatedQuote {
                        key: key.to_string(),
                    })
                }
            },
            Some(c) => value.push(c),
        }
    }
    match chars.peek() {
        None => Ok(value),
        Some(c) if c.is_whitespace() => Ok(value),
        Some(_) => Err(SidecarError::TrailingCharacters {
            key: key.to_string(),
        }),
    }
}

fn read_bare(chars: &mut Peekable<Chars<'_>>, key: &str) -> Result<String, SidecarError> {
    let mut value = String::new();
    while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
        if c == '"' {
            return Err(SidecarError::StrayQuote {
                key: key.to_string(),
            });
        }
        value.push(c);
    }
    Ok(value)
}

/// Parse a full sidecar line, including the comment delimiters.
pub fn parse_sidecar(line: &str) -> Result<Sidecar, SidecarError> {
    let t = line.trim();
    if !is_sidecar_line(t) {
        return Err(SidecarError::NotAComment);
    }
    let body = &t[OPEN.len()..t.len() - CLOSE.len()];
    let pairs = tokenize(body)?;
    let lookup = |name: &str| {
        pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    };

    let delta_id = lookup("deltaId");
    let owner_id = lookup("ownerId");
    let created_at = lookup("createdAt");

    let provenance = match (delta_id, owner_id, created_at) {
        (None, None, None) => None,
        (Some(delta_id), Some(owner_id), Some(created_at)) => {
            let created_at = DateTime::parse_from_rfc3339(created_at)
                .map_err(|_| SidecarError::InvalidTimestamp {
                    value: created_at.to_string(),
                })?
                .with_timezone(&Utc);
            Some(Provenance::new(delta_id, owner_id, created_at))
        }
        (None, _, _) => return Err(SidecarError::PartialProvenance { missing: "deltaId" }),
        (_, None, _) => return Err(SidecarError::PartialProvenance { missing: "ownerId" }),
        (_, _, None) => {
            return Err(SidecarError::PartialProvenance {
                missing: "createdAt",
            })
        }
    };

    Ok(Sidecar {
        provenance,
        hash: lookup("hash").map(str::to_string),
    })
}

/// Render a sidecar line for a bullet.
pub fn render_sidecar(provenance: Option<&Provenance>, hash: &str) -> String {
    let mut tokens = Vec::with_capacity(4);
    if let Some(p) = provenance {
        tokens.push(format!("deltaId={}", encode_value(&p.delta_id)));
        tokens.push(format!("ownerId={}", encode_value(&p.owner_id)));
        tokens.push(format!(
            "createdAt={}",
            p.created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        ));
    }
    tokens.push(format!("hash={}", encode_value(hash)));
    format!("{OPEN} {} {CLOSE}", tokens.join(" "))
}

fn encode_value(value: &str) -> String {
    let bare = !value.is_empty()
        && !value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '=' | '\\'));
    if bare && !value.contains(CLOSE) {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
