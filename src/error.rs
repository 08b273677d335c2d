//! Error types for maildrop
//!
//! One crate-wide error enum covering every failure mode of the messaging
//! engine. Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for maildrop operations
pub type Result<T> = std::result::Result<T, MaildropError>;

/// Comprehensive error type for maildrop operations
#[derive(Error, Debug)]
pub enum MaildropError {
    /// A required field is missing or empty; the caller must retry with
    /// corrected input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An explicitly named thread id could not be resolved from the
    /// relevant mailbox(es).
    #[error("Thread {tid} not found for {scope}")]
    ThreadNotFound { tid: String, scope: String },

    /// A stored document is corrupt or unparseable. Surfaced rather than
    /// auto-repaired; silently discarding history is worse than failing.
    #[error("Format error in {path}: {message}")]
    Format { path: String, message: String },

    /// A unique thread directory could not be created within the retry
    /// budget.
    #[error("Directory collision under {path} after {attempts} attempts")]
    DirectoryCollision { path: PathBuf, attempts: u32 },

    /// A message or mailbox file could not be written.
    #[error("Write error at {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The per-mailbox lock could not be acquired within the retry budget.
    #[error("Timed out waiting for the mailbox lock of {0}")]
    LockTimeout(String),

    /// The notification allow-list could not be loaded. Degrades to "no
    /// auto-notifications"; never fails a send.
    #[error("Allow-list unavailable: {0}")]
    AllowlistLoad(String),

    /// The external notifier rejected or never acknowledged a dispatch.
    /// Per-recipient warning only; never fails a send.
    #[error("Notification dispatch failed: {0}")]
    NotifyDispatch(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl MaildropError {
    /// True when the error should fail the whole send call rather than a
    /// single recipient's branch.
    pub fn aborts_send(&self) -> bool {
        matches!(
            self,
            MaildropError::Validation(_) | MaildropError::ThreadNotFound { .. }
        )
    }
}
