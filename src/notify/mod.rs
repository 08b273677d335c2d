//! Notification dispatch
//!
//! Decides which recipients may receive automatic push notifications and
//! hands eligible deliveries to an external dispatcher. Dispatch runs
//! after the message and mailboxes are durably persisted; a failure here
//! is a per-recipient warning, never a rollback.
//!
//! The dispatcher itself is a pluggable [`Notifier`]: production deploys
//! invoke an external CLI as a bounded subprocess, tests record or
//! discard the payloads.

mod allowlist;
mod dispatcher;

pub use allowlist::{normalize_key, Allowlist, AllowlistState, NotificationGate};
pub use dispatcher::{NoopNotifier, RecordingNotifier, SubprocessNotifier};

use crate::error::Result;
use serde::Serialize;

/// Metadata forwarded to the dispatcher alongside the pointer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotifyMetadata {
    /// Message subject
    pub subject: String,

    /// Thread the message belongs to
    pub thread_tid: String,

    /// Sender agent id
    pub from: String,

    /// Recipient agent id
    pub to: String,

    /// Message kind
    #[serde(rename = "type")]
    pub kind: String,

    /// Work status, when the message carried one
    pub status: Option<String>,
}

/// One notification dispatch request
#[derive(Debug, Clone, PartialEq)]
pub struct NotifyRequest {
    /// Store-root-relative pointer to the written message file
    pub pointer: String,

    /// Project identifier
    pub project: String,

    /// Recipient agent id
    pub to_agent: String,

    /// Provider identifier
    pub provider: String,

    /// Session prefix
    pub session_prefix: String,

    /// Structured message metadata
    pub metadata: NotifyMetadata,
}

/// Pluggable notification dispatcher
pub trait Notifier: Send + Sync {
    /// Deliver one notification; errors surface as per-recipient warnings
    fn notify(&self, request: &NotifyRequest) -> Result<()>;
}
