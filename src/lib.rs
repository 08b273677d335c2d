//! Maildrop - File-backed threaded messaging for agent coordination
//!
//! Maildrop lets autonomous agents and human operators exchange structured
//! status and result messages over a plain filesystem. Every agent owns a
//! mailbox document indexing the threads it participates in; every thread
//! is a directory of immutable, append-only message files. An optional
//! notification gate forwards eligible deliveries to an external push
//! dispatcher.
//!
//! # Architecture
//!
//! - **mail**: the messaging engine (naming, codec, mailbox store, thread
//!   store, and the Postmaster dispatch engine)
//! - **notify**: notification allow-list and pluggable dispatcher
//! - **config**: store roots and notification defaults
//! - **error**: crate-wide error taxonomy
//! - **logging**: tracing subscriber setup

pub mod config;
pub mod error;
pub mod logging;
pub mod mail;
pub mod notify;

// Re-exports
pub use config::MaildropConfig;
pub use error::{MaildropError, Result};
