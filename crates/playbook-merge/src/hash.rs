//! Text normalization and content-hash identity for bullets.
//!
//! A bullet's identity is the SHA-256 of its canonical section name and its
//! whitespace-collapsed, lowercased content. Two bullets that differ only in
//! case or spacing therefore share a hash.

use sha2::{Digest, Sha256};

/// Canonical section name: trimmed, lowercased, whitespace runs replaced by `_`.
pub fn normalize_section(section: &str) -> String {
    section
        .split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Lowercase and collapse every whitespace run to a single space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hex SHA-256 over `normalize_section(section) + "\n" + normalize_text(content)`.
pub fn content_hash(section: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_section(section).as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize_text(content).as_bytes());
    hex::encode(hasher.finalize())
}
