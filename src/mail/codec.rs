//! On-disk document codec
//!
//! Every persisted record (mailboxes, messages, the allow-list) is a YAML
//! document. Parsing and serialization are side-effect free; the file
//! helpers here add the write-whole-file-then-rename hardening so readers
//! never observe a half-written document.

use crate::error::{MaildropError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Parse a YAML document from text
pub fn parse_str<T: DeserializeOwned>(text: &str) -> serde_yaml::Result<T> {
    serde_yaml::from_str(text)
}

/// Serialize a document to YAML text
pub fn to_string<T: Serialize>(value: &T) -> serde_yaml::Result<String> {
    serde_yaml::to_string(value)
}

/// Load a document from disk
///
/// Returns `Ok(None)` when the file does not exist; a missing document is
/// a valid state for lazily created records. Malformed content surfaces as
/// a `Format` error carrying the offending path.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let value = parse_str(&text).map_err(|e| MaildropError::Format {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(Some(value))
}

/// Store a document atomically
///
/// Serializes into a temporary file in the target directory, then renames
/// it over `path`. Concurrent readers see either the old or the new
/// document, never a torn write.
pub fn store<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = to_string(value)?;
    let dir = path.parent().ok_or_else(|| MaildropError::Write {
        path: path.to_path_buf(),
        source: std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "document path has no parent directory",
        ),
    })?;

    let write_err = |source: std::io::Error| MaildropError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(text.as_bytes()).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
