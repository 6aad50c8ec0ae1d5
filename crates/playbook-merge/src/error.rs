//! Error types for playbook-merge

use thiserror::Error;

/// Failures of the provenance sidecar tokenizer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SidecarError {
    #[error("sidecar must be wrapped in <!-- -->")]
    NotAComment,

    #[error("token `{token}` has no `=`")]
    MissingEquals { token: String },

    #[error("empty key")]
    EmptyKey,

    #[error("duplicate key `{key}`")]
    DuplicateKey { key: String },

    #[error("unterminated quoted value for `{key}`")]
    UnterminatedQuote { key: String },

    #[error("invalid escape `\\{escape}` in value for `{key}`")]
    InvalidEscape { key: String, escape: char },

    #[error("unexpected character after value for `{key}`")]
    TrailingCharacters { key: String },

    #[error("unquoted value for `{key}` contains a quote")]
    StrayQuote { key: String },

    #[error("createdAt `{value}` is not an RFC 3339 timestamp")]
    InvalidTimestamp { value: String },

    #[error("incomplete provenance: missing `{missing}`")]
    PartialProvenance { missing: &'static str },
}

/// Errors produced while parsing a playbook document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Malformed provenance comment line
    #[error("line {line}: malformed provenance sidecar: {source}")]
    MalformedSidecar {
        line: usize,
        #[source]
        source: SidecarError,
    },

    /// Sidecar with no bullet line directly above it
    #[error("line {line}: provenance sidecar does not follow a bullet")]
    OrphanSidecar { line: usize },

    /// Bullet line before the first `## section` header
    #[error("line {line}: bullet appears before any section header")]
    BulletOutsideSection { line: usize },

    /// `## ` header with nothing after it
    #[error("line {line}: empty section name")]
    EmptySectionName { line: usize },

    /// helpful/harmful value out of range
    #[error("line {line}: counter `{value}` is out of range")]
    InvalidCounter { line: usize, value: String },
}
