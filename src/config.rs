//! Runtime configuration
//!
//! Paths for the messaging store and allow-list plus the defaults used to
//! populate notification metadata. The CLI fills this from flags and their
//! `MAILDROP_*` environment fallbacks; embedders construct it directly.

use std::path::PathBuf;
use std::time::Duration;

/// Default bound on a single notification dispatch.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a maildrop store and its notification defaults
#[derive(Debug, Clone)]
pub struct MaildropConfig {
    /// Root of the messaging store; `agents/` and `msg/` live under it
    pub root: PathBuf,

    /// Notification allow-list policy document
    pub allowlist_path: PathBuf,

    /// External notifier command; when absent, dispatch is a no-op
    pub notify_command: Option<PathBuf>,

    /// Project identifier carried in notification payloads
    pub project_id: String,

    /// Provider identifier carried in notification payloads
    pub provider: String,

    /// Session prefix carried in notification payloads
    pub session_prefix: String,

    /// Upper bound on one notifier invocation
    pub notify_timeout: Duration,
}

impl MaildropConfig {
    /// Create a configuration rooted at the given store directory
    ///
    /// The allow-list defaults to `<root>/allowlist.yaml`; notification
    /// metadata defaults are placeholders suitable for local use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let allowlist_path = root.join("allowlist.yaml");
        Self {
            root,
            allowlist_path,
            notify_command: None,
            project_id: "default".to_string(),
            provider: "local".to_string(),
            session_prefix: "maildrop".to_string(),
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    /// Override the allow-list document path
    pub fn with_allowlist(mut self, path: impl Into<PathBuf>) -> Self {
        self.allowlist_path = path.into();
        self
    }

    /// Set the external notifier command
    pub fn with_notify_command(mut self, command: impl Into<PathBuf>) -> Self {
        self.notify_command = Some(command.into());
        self
    }

    /// Set the project identifier for notification metadata
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = project_id.into();
        self
    }

    /// Set the provider identifier for notification metadata
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Set the session prefix for notification metadata
    pub fn with_session_prefix(mut self, session_prefix: impl Into<String>) -> Self {
        self.session_prefix = session_prefix.into();
        self
    }

    /// Bound a single notification dispatch
    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }
}
