//! Postmaster - message dispatch engine
//!
//! The Postmaster turns one logical send into per-recipient deliveries:
//! resolve or create the thread, append the immutable message file, bring
//! both participants' mailbox entries up to date, then consult the
//! notification gate. Each recipient is an independent unit of work; a
//! write failure on one branch never blocks or corrupts the others.
//!
//! # Example
//!
//! ```no_run
//! use maildrop::config::MaildropConfig;
//! use maildrop::mail::{Postmaster, SendRequest};
//!
//! let postmaster = Postmaster::new(MaildropConfig::new("messaging"));
//! let request = SendRequest::new("AGP", ["PMO"], "Kickoff", "Let's start");
//! let report = postmaster.send(&request).unwrap();
//! assert!(report.all_delivered());
//! ```

use crate::config::MaildropConfig;
use crate::error::{MaildropError, Result};
use crate::mail::mailbox::{MailboxStore, ThreadEntry};
use crate::mail::message::{Message, MessageKind, ThreadStatus};
use crate::mail::thread::{resolve_entry, ThreadMessage, ThreadStore};
use crate::mail::naming;
use crate::notify::{
    NoopNotifier, NotificationGate, Notifier, NotifyMetadata, NotifyRequest, SubprocessNotifier,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// One logical send, possibly fanning out to several recipients
#[derive(Debug, Clone)]
pub struct SendRequest {
    /// Sender agent id
    pub from: String,

    /// Recipient agent ids; each is an independent delivery
    pub to: Vec<String>,

    /// Subject line
    pub subject: String,

    /// Message body; must be non-empty
    pub body: String,

    /// Message kind; defaults to STATUS
    pub kind: MessageKind,

    /// Work status for STATUS messages; defaults to TODO
    pub status: Option<ThreadStatus>,

    /// Reference to a related message
    pub relates_to: Option<String>,

    /// Actions expected from the recipient
    pub actions_expected: Vec<String>,

    /// Continue this thread instead of creating one per recipient
    pub thread: Option<String>,

    /// Skip the notification gate entirely
    pub notify_disabled: bool,
}

impl SendRequest {
    /// Send request with the required fields and STATUS defaults
    pub fn new(
        from: impl Into<String>,
        to: impl IntoIterator<Item = impl Into<String>>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into_iter().map(Into::into).collect(),
            subject: subject.into(),
            body: body.into(),
            kind: MessageKind::Status,
            status: None,
            relates_to: None,
            actions_expected: Vec::new(),
            thread: None,
            notify_disabled: false,
        }
    }

    /// Set the message kind
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the work status
    pub fn with_status(mut self, status: ThreadStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Reference a related message
    pub fn with_relates_to(mut self, reference: impl Into<String>) -> Self {
        self.relates_to = Some(reference.into());
        self
    }

    /// Attach expected actions
    pub fn with_actions(mut self, actions: Vec<String>) -> Self {
        self.actions_expected = actions;
        self
    }

    /// Continue an existing thread
    pub fn with_thread(mut self, tid: impl Into<String>) -> Self {
        self.thread = Some(tid.into());
        self
    }

    /// Skip notifications for this send
    pub fn without_notify(mut self) -> Self {
        self.notify_disabled = true;
        self
    }
}

/// How the notification step ended for one delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyStatus {
    /// Caller disabled notifications for this send
    Disabled,

    /// Recipient is not on the allow-list
    NotEligible,

    /// Allow-list could not be loaded; nobody is eligible
    AllowlistUnavailable,

    /// Dispatcher accepted the notification
    Sent,

    /// Dispatcher failed; warning only, the delivery itself succeeded
    Failed(String),
}

/// Successful delivery to one recipient
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Recipient agent id
    pub recipient: String,

    /// Thread the message landed on
    pub tid: String,

    /// Message filename within the thread directory
    pub file: String,

    /// Store-root-relative pointer to the message file
    pub pointer: String,

    /// Outcome of the notification step
    pub notify: NotifyStatus,
}

/// Outcome of one recipient's branch of a send
#[derive(Debug)]
pub enum SendOutcome {
    /// Message written and both mailboxes updated
    Delivered(Delivery),

    /// This branch failed; other recipients are unaffected
    Failed {
        recipient: String,
        error: MaildropError,
    },
}

/// Per-recipient outcomes of one logical send
#[derive(Debug, Default)]
pub struct SendReport {
    pub outcomes: Vec<SendOutcome>,
}

impl SendReport {
    /// True when every recipient's core write succeeded
    pub fn all_delivered(&self) -> bool {
        self.outcomes
            .iter()
            .all(|outcome| matches!(outcome, SendOutcome::Delivered(_)))
    }

    /// The successful deliveries
    pub fn deliveries(&self) -> impl Iterator<Item = &Delivery> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            SendOutcome::Delivered(delivery) => Some(delivery),
            SendOutcome::Failed { .. } => None,
        })
    }
}

/// One thread entry as seen by a pulling agent, with optional replay data
#[derive(Debug, Clone)]
pub struct OverviewLine {
    /// The agent's local view of the thread
    pub entry: ThreadEntry,

    /// Most recent message, present when detail was requested
    pub last: Option<ThreadMessage>,
}

/// Result of a pull
#[derive(Debug)]
pub enum PullView {
    /// All threads, most recently updated first
    Overview(Vec<OverviewLine>),

    /// One explicitly requested thread
    Thread {
        entry: ThreadEntry,
        /// Full history when detail was requested, empty otherwise
        messages: Vec<ThreadMessage>,
    },
}

/// The message dispatch engine
pub struct Postmaster {
    config: MaildropConfig,
    mailboxes: MailboxStore,
    threads: ThreadStore,
    gate: NotificationGate,
    notifier: Arc<dyn Notifier>,
}

impl Postmaster {
    /// Engine with the production notifier wired from the configuration
    ///
    /// Without a configured dispatcher command, eligible notifications
    /// are dropped (no-op dispatcher).
    pub fn new(config: MaildropConfig) -> Self {
        let notifier: Arc<dyn Notifier> = match &config.notify_command {
            Some(command) => Arc::new(SubprocessNotifier::new(
                command.clone(),
                config.notify_timeout,
            )),
            None => Arc::new(NoopNotifier),
        };
        Self::with_notifier(config, notifier)
    }

    /// Engine with an explicit notifier implementation
    pub fn with_notifier(config: MaildropConfig, notifier: Arc<dyn Notifier>) -> Self {
        let mailboxes = MailboxStore::new(&config.root);
        let threads = ThreadStore::new(&config.root);
        let gate = NotificationGate::new(&config.allowlist_path);
        Self {
            config,
            mailboxes,
            threads,
            gate,
            notifier,
        }
    }

    /// The mailbox store backing this engine
    pub fn mailboxes(&self) -> &MailboxStore {
        &self.mailboxes
    }

    /// The thread store backing this engine
    pub fn threads(&self) -> &ThreadStore {
        &self.threads
    }

    /// The notification gate backing this engine
    pub fn gate(&self) -> &NotificationGate {
        &self.gate
    }

    /// Dispatch one logical send
    ///
    /// Validation and an unresolvable explicit thread id fail the whole
    /// call; any other failure is confined to its recipient's outcome.
    pub fn send(&self, request: &SendRequest) -> Result<SendReport> {
        let from = request.from.trim();
        if from.is_empty() {
            return Err(MaildropError::Validation(
                "sender (--from) is required".to_string(),
            ));
        }
        if request.to.is_empty() {
            return Err(MaildropError::Validation(
                "at least one recipient (--to) is required".to_string(),
            ));
        }
        if request.body.trim().is_empty() {
            return Err(MaildropError::Validation(
                "message body is empty (--body or --body-file)".to_string(),
            ));
        }

        self.mailboxes.ensure(from)?;

        let mut report = SendReport::default();
        for recipient in &request.to {
            match self.deliver(from, recipient, request) {
                Ok(delivery) => {
                    tracing::info!(
                        from,
                        to = %delivery.recipient,
                        tid = %delivery.tid,
                        file = %delivery.file,
                        "message delivered"
                    );
                    report.outcomes.push(SendOutcome::Delivered(delivery));
                }
                Err(error) if error.aborts_send() => return Err(error),
                Err(error) => {
                    tracing::error!(from, to = %recipient, %error, "delivery failed");
                    report.outcomes.push(SendOutcome::Failed {
                        recipient: recipient.clone(),
                        error,
                    });
                }
            }
        }
        Ok(report)
    }

    /// One recipient's branch: thread, message file, both mailboxes,
    /// notification.
    fn deliver(&self, from: &str, recipient: &str, request: &SendRequest) -> Result<Delivery> {
        let recipient = recipient.trim();
        if recipient.is_empty() {
            return Err(MaildropError::Validation(
                "recipient id is empty".to_string(),
            ));
        }

        self.mailboxes.ensure(recipient)?;

        let (tid, canonical) = match &request.thread {
            Some(tid) => (tid.clone(), self.resolve_thread(tid, from, recipient)?),
            None => {
                let created = self.threads.create(&request.subject)?;
                (created.tid, created.path)
            }
        };

        let mut message = Message::new(
            &tid,
            request.kind.clone(),
            from,
            recipient,
            &request.subject,
            &request.body,
        )
        .with_actions(request.actions_expected.clone());
        if request.kind.is_status() {
            message.status = Some(request.status.clone().unwrap_or_default());
        }
        if let Some(reference) = &request.relates_to {
            message = message.with_relates_to(reference.clone());
        }

        // The message file lands before any mailbox references it; a crash
        // here leaves an unreferenced file, never a dangling entry.
        let file = self.threads.append(&canonical, &message)?;

        let entry_status = message
            .status
            .clone()
            .unwrap_or_else(|| ThreadStatus::parse(request.kind.as_str()));
        let update = EntryUpdate {
            canonical: &canonical,
            status: &entry_status,
            file: &file,
            subject: &request.subject,
            from,
            to: recipient,
            at: Utc::now(),
        };

        self.update_mailbox(from, &tid, &update)?;
        if recipient != from {
            self.update_mailbox(recipient, &tid, &update)?;
        }

        let pointer = format!("{}/{}", canonical, file);
        let notify = if request.notify_disabled {
            NotifyStatus::Disabled
        } else {
            self.dispatch_notification(recipient, &tid, &pointer, &message)
        };

        Ok(Delivery {
            recipient: recipient.to_string(),
            tid,
            file,
            pointer,
            notify,
        })
    }

    /// Resolve an explicit thread id against the two parties' mailboxes
    ///
    /// Either party may hold the reference; a thread neither knows about
    /// cannot be continued.
    fn resolve_thread(&self, tid: &str, from: &str, recipient: &str) -> Result<String> {
        let recipient_box = self.mailboxes.load(recipient)?;
        let sender_box = self.mailboxes.load(from)?;
        let entry = resolve_entry(tid, &[&recipient_box, &sender_box]).ok_or_else(|| {
            MaildropError::ThreadNotFound {
                tid: tid.to_string(),
                scope: format!("{}/{}", from, recipient),
            }
        })?;

        entry
            .path
            .as_deref()
            .and_then(|path| naming::normalize_thread_path(&self.config.root, path))
            .ok_or_else(|| MaildropError::Format {
                path: naming::mailbox_path(&self.config.root, recipient)
                    .display()
                    .to_string(),
                message: format!("thread entry {} has no usable directory path", tid),
            })
    }

    /// Read-modify-write one mailbox under its lock
    fn update_mailbox(&self, agent: &str, tid: &str, update: &EntryUpdate<'_>) -> Result<()> {
        let _lock = self.mailboxes.lock(agent)?;
        let mut mailbox = self.mailboxes.load(agent)?;
        mailbox.upsert_entry(tid, |entry| update.apply(entry));
        self.mailboxes.save(&mailbox)
    }

    /// Consult the gate and, if eligible, hand off to the dispatcher
    fn dispatch_notification(
        &self,
        recipient: &str,
        tid: &str,
        pointer: &str,
        message: &Message,
    ) -> NotifyStatus {
        let state = self.gate.state();
        if state.load_error.is_some() {
            return NotifyStatus::AllowlistUnavailable;
        }
        if !state.allowlist.is_eligible(recipient) {
            tracing::info!(recipient, "auto-notification skipped, not on the allow-list");
            return NotifyStatus::NotEligible;
        }

        let request = NotifyRequest {
            pointer: pointer.to_string(),
            project: self.config.project_id.clone(),
            to_agent: recipient.to_string(),
            provider: self.config.provider.clone(),
            session_prefix: self.config.session_prefix.clone(),
            metadata: NotifyMetadata {
                subject: message.subject.clone(),
                thread_tid: tid.to_string(),
                from: message.from.clone(),
                to: recipient.to_string(),
                kind: message.kind.to_string(),
                status: message.status.as_ref().map(ToString::to_string),
            },
        };

        match self.notifier.notify(&request) {
            Ok(()) => NotifyStatus::Sent,
            Err(e) => {
                tracing::warn!(recipient, error = %e, "notification dispatch failed");
                NotifyStatus::Failed(e.to_string())
            }
        }
    }

    /// Read an agent's view of its threads
    ///
    /// Scoped to what the requesting agent actually knows about: an
    /// explicit thread id is only looked up in this agent's own mailbox.
    pub fn pull(&self, agent: &str, thread: Option<&str>, detail: bool) -> Result<PullView> {
        let mailbox = self.mailboxes.load(agent)?;
        let mut entries = mailbox.threads.clone();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        match thread {
            Some(tid) => {
                let entry = entries
                    .into_iter()
                    .find(|entry| entry.tid == tid)
                    .ok_or_else(|| MaildropError::ThreadNotFound {
                        tid: tid.to_string(),
                        scope: mailbox.agent.clone(),
                    })?;
                let messages = if detail {
                    self.replay_entry(&entry)?
                } else {
                    Vec::new()
                };
                Ok(PullView::Thread { entry, messages })
            }
            None => {
                let mut lines = Vec::with_capacity(entries.len());
                for entry in entries {
                    let last = if detail {
                        self.replay_entry(&entry)?.pop()
                    } else {
                        None
                    };
                    lines.push(OverviewLine { entry, last });
                }
                Ok(PullView::Overview(lines))
            }
        }
    }

    fn replay_entry(&self, entry: &ThreadEntry) -> Result<Vec<ThreadMessage>> {
        match entry
            .path
            .as_deref()
            .and_then(|path| naming::normalize_thread_path(&self.config.root, path))
        {
            Some(canonical) => self.threads.replay(&canonical),
            None => Ok(Vec::new()),
        }
    }
}

/// The fields every participant's thread entry receives after a delivery
struct EntryUpdate<'a> {
    canonical: &'a str,
    status: &'a ThreadStatus,
    file: &'a str,
    subject: &'a str,
    from: &'a str,
    to: &'a str,
    at: DateTime<Utc>,
}

impl EntryUpdate<'_> {
    fn apply(&self, entry: &mut ThreadEntry) {
        entry.path = Some(self.canonical.to_string());
        entry.status = self.status.clone();
        entry.last = Some(self.file.to_string());
        entry.updated_at = self.at;
        entry.summary = Some(self.subject.to_string());
        entry.add_participant(self.from);
        entry.add_participant(self.to);
    }
}
