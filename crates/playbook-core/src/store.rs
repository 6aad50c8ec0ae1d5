//! File-backed access to the playbook document.
//!
//! The document is never patched in place: [`PlaybookStore::load`] parses it
//! into a [`Document`], callers transform the model, and
//! [`PlaybookStore::save`] atomically replaces the file with the
//! reserialized text.

use std::path::{Path, PathBuf};

use playbook_merge::Document;

use crate::error::{PlaybookError, Result};
use crate::fsio::{read_optional, read_required, write_atomic};

/// Title written into a freshly bootstrapped document.
pub const DOCUMENT_TITLE: &str = "Playbook";

#[derive(Debug, Clone)]
pub struct PlaybookStore {
    path: PathBuf,
}

impl PlaybookStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the document; a missing file is an error.
    pub fn load(&self) -> Result<Document> {
        let text = read_required(&self.path)?;
        parse_at(&self.path, &text)
    }

    /// Load the document, or start an empty one when the file is absent.
    pub fn load_or_default(&self) -> Result<Document> {
        match read_optional(&self.path)? {
            Some(text) => parse_at(&self.path, &text),
            None => Ok(Document::with_title(DOCUMENT_TITLE)),
        }
    }

    /// Line count of the document as it currently sits on disk.
    pub fn line_count(&self) -> Result<usize> {
        Ok(read_required(&self.path)?.lines().count())
    }

    pub fn save(&self, doc: &Document) -> Result<()> {
        write_atomic(&self.path, doc.serialize().as_bytes())
    }
}

pub(crate) fn parse_at(path: &Path, text: &str) -> Result<Document> {
    Document::parse(text).map_err(|source| PlaybookError::Codec {
        path: path.to_path_buf(),
        source,
    })
}
