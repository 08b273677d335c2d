//! The messaging engine
//!
//! Multi-mailbox threaded messaging over a plain filesystem.
//!
//! # Overview
//!
//! - **naming**: deterministic paths, slugs, and the canonical thread-path
//!   form shared by every writer
//! - **codec**: YAML document parsing and atomic file persistence
//! - **message**: the immutable per-message record
//! - **mailbox**: per-agent thread index with advisory locking
//! - **thread**: append-only thread directories and history replay
//! - **postmaster**: the dispatch engine orchestrating sends and pulls
//!
//! # Consistency model
//!
//! Individual documents are written atomically (temp file + rename) and
//! each mailbox is guarded by its own advisory lock, but a send that
//! touches N mailboxes is N independent updates: a crash mid-send can
//! leave one participant's entry ahead of another's. Message files are
//! written before any mailbox references them, so a mailbox never points
//! at a message that does not exist.

pub mod codec;
pub mod mailbox;
pub mod message;
pub mod naming;
pub mod postmaster;
pub mod thread;

pub use mailbox::{Mailbox, MailboxLock, MailboxStore, ThreadEntry};
pub use message::{parse_actions, Message, MessageKind, ThreadStatus};
pub use postmaster::{
    Delivery, NotifyStatus, OverviewLine, Postmaster, PullView, SendOutcome, SendReport,
    SendRequest,
};
pub use thread::{resolve_entry, NewThread, ThreadMessage, ThreadStore};
