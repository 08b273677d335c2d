//! Thread store
//!
//! A thread is a directory holding an ordered, append-only sequence of
//! message files. Directories never move once created; history is
//! reconstructed by replaying the directory in filename order.

use crate::error::{MaildropError, Result};
use crate::mail::mailbox::{Mailbox, ThreadEntry};
use crate::mail::message::Message;
use crate::mail::{codec, naming};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::PathBuf;

const DIR_MAX_ATTEMPTS: u32 = 1000;
const FILE_MAX_ATTEMPTS: u32 = 1000;
const TID_BYTES: usize = 4;

/// Handle to a freshly created thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewThread {
    /// Generated thread id
    pub tid: String,

    /// Canonical store-root-relative directory path
    pub path: String,
}

/// One replayed message together with its filename
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadMessage {
    /// Message filename within the thread directory
    pub file: String,

    /// Parsed message record
    pub message: Message,
}

/// Filesystem-backed store of thread directories
#[derive(Debug, Clone)]
pub struct ThreadStore {
    root: PathBuf,
}

impl ThreadStore {
    /// Create a store rooted at the messaging root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a new thread for `subject`: fresh id, fresh directory
    pub fn create(&self, subject: &str) -> Result<NewThread> {
        self.create_at(subject, Utc::now())
    }

    /// Create a new thread with an explicit creation time
    pub fn create_at(&self, subject: &str, at: DateTime<Utc>) -> Result<NewThread> {
        let threads_root = self.root.join(naming::THREADS_DIR);
        fs::create_dir_all(&threads_root)?;

        let base = naming::thread_dir_name(subject, at);
        let mut dir_name = base.clone();
        for attempt in 2..=DIR_MAX_ATTEMPTS {
            let candidate = threads_root.join(&dir_name);
            match fs::create_dir(&candidate) {
                Ok(()) => {
                    let tid = generate_tid()?;
                    tracing::debug!(%tid, dir = %dir_name, "thread created");
                    return Ok(NewThread {
                        tid,
                        path: format!("{}/{}", naming::THREADS_DIR, dir_name),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    dir_name = format!("{}-{}", base, attempt);
                }
                Err(e) => {
                    return Err(MaildropError::Write {
                        path: candidate,
                        source: e,
                    })
                }
            }
        }
        Err(MaildropError::DirectoryCollision {
            path: threads_root,
            attempts: DIR_MAX_ATTEMPTS,
        })
    }

    /// Append a message file to the thread at the canonical path
    ///
    /// Never overwrites: a filename collision (identical kind, parties,
    /// and subject) gets a disambiguating numeric suffix instead of
    /// clobbering history. Returns the filename actually written.
    pub fn append(&self, canonical_path: &str, message: &Message) -> Result<String> {
        let dir = naming::thread_abs_path(&self.root, canonical_path);
        fs::create_dir_all(&dir)?;

        let base = naming::message_file_name(
            message.kind.as_str(),
            &message.from,
            &message.to,
            &message.subject,
        );
        let stem = base
            .strip_suffix(&format!(".{}", naming::MESSAGE_EXT))
            .unwrap_or(&base)
            .to_string();

        let mut file_name = base.clone();
        for attempt in 2..=FILE_MAX_ATTEMPTS {
            let candidate = dir.join(&file_name);
            if candidate.exists() {
                file_name = format!("{}-{}.{}", stem, attempt, naming::MESSAGE_EXT);
                continue;
            }
            codec::store(&candidate, message)?;
            return Ok(file_name);
        }
        Err(MaildropError::DirectoryCollision {
            path: dir,
            attempts: FILE_MAX_ATTEMPTS,
        })
    }

    /// Replay a thread's full history in filename order
    ///
    /// The canonical reconstruction used for display: lists the thread
    /// directory, keeps recognized message files, sorts, and parses each.
    /// A corrupt file surfaces as a `Format` error rather than being
    /// silently dropped.
    pub fn replay(&self, canonical_path: &str) -> Result<Vec<ThreadMessage>> {
        let dir = naming::thread_abs_path(&self.root, canonical_path);
        let mut files: Vec<String> = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(&format!(".{}", naming::MESSAGE_EXT)) {
                files.push(name);
            }
        }
        files.sort();

        let mut messages = Vec::with_capacity(files.len());
        for file in files {
            let path = dir.join(&file);
            if let Some(message) = codec::load::<Message>(&path)? {
                messages.push(ThreadMessage { file, message });
            }
        }
        Ok(messages)
    }
}

/// Search candidate mailboxes for a thread entry; first match wins.
///
/// Lets either party continue a thread the other created: the caller
/// passes the recipient's and the sender's mailboxes as candidates.
pub fn resolve_entry<'a>(tid: &str, candidates: &[&'a Mailbox]) -> Option<&'a ThreadEntry> {
    candidates.iter().find_map(|mailbox| mailbox.entry(tid))
}

/// Generate a short thread id: `T-` plus fixed-length random hex.
///
/// Random enough that collisions are negligible without a registry.
fn generate_tid() -> Result<String> {
    let mut bytes = [0u8; TID_BYTES];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    let mut tid = String::with_capacity(2 + TID_BYTES * 2);
    tid.push_str("T-");
    for b in &bytes {
        use std::fmt::Write;
        let _ = write!(tid, "{:02X}", b);
    }
    Ok(tid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::message::{MessageKind, ThreadStatus};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn test_store() -> (ThreadStore, TempDir) {
        let dir = TempDir::new().unwrap();
        (ThreadStore::new(dir.path()), dir)
    }

    fn test_message(tid: &str, subject: &str) -> Message {
        Message::new(tid, MessageKind::Status, "AGP", "PMO", subject, "body")
            .with_status(ThreadStatus::Todo)
    }

    #[test]
    fn test_generate_tid_shape() {
        let tid = generate_tid().unwrap();
        assert_eq!(tid.len(), 10);
        assert!(tid.starts_with("T-"));
        assert!(tid[2..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(generate_tid().unwrap(), tid);
    }

    #[test]
    fn test_create_thread() {
        let (store, dir) = test_store();
        let thread = store.create("Kickoff Phase 2").unwrap();

        assert!(thread.path.starts_with("msg/"));
        assert!(thread.path.ends_with("kickoff-phase-2"));
        assert!(naming::thread_abs_path(dir.path(), &thread.path).is_dir());
    }

    #[test]
    fn test_create_collision_gets_suffix() {
        let (store, _dir) = test_store();
        let at = Utc.with_ymd_and_hms(2026, 8, 7, 9, 0, 0).unwrap();

        let first = store.create_at("Kickoff", at).unwrap();
        let second = store.create_at("Kickoff", at).unwrap();

        assert_ne!(first.path, second.path);
        assert!(second.path.ends_with("-2"));
    }

    #[test]
    fn test_append_and_replay_in_order() {
        let (store, _dir) = test_store();
        let thread = store.create("Kickoff").unwrap();

        let first = store
            .append(&thread.path, &test_message(&thread.tid, "Alpha"))
            .unwrap();
        let second = store
            .append(&thread.path, &test_message(&thread.tid, "Beta"))
            .unwrap();

        let messages = store.replay(&thread.path).unwrap();
        assert_eq!(messages.len(), 2);
        // Filename order: STATUS__agp@pmo__alpha.yaml < STATUS__agp@pmo__beta.yaml
        assert_eq!(messages[0].file, first);
        assert_eq!(messages[1].file, second);
        assert_eq!(messages[0].message.subject, "Alpha");
    }

    #[test]
    fn test_append_never_clobbers() {
        let (store, dir) = test_store();
        let thread = store.create("Kickoff").unwrap();
        let message = test_message(&thread.tid, "Same Subject");

        let first = store.append(&thread.path, &message).unwrap();
        let second = store.append(&thread.path, &message).unwrap();

        assert_ne!(first, second);
        assert!(second.contains("-2."));
        let dir_path = naming::thread_abs_path(dir.path(), &thread.path);
        assert_eq!(fs::read_dir(dir_path).unwrap().count(), 2);
    }

    #[test]
    fn test_replay_skips_unrecognized_files() {
        let (store, dir) = test_store();
        let thread = store.create("Kickoff").unwrap();
        store
            .append(&thread.path, &test_message(&thread.tid, "Alpha"))
            .unwrap();

        let dir_path = naming::thread_abs_path(dir.path(), &thread.path);
        fs::write(dir_path.join("notes.txt"), "not a message").unwrap();

        let messages = store.replay(&thread.path).unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn test_replay_surfaces_corrupt_message() {
        let (store, dir) = test_store();
        let thread = store.create("Kickoff").unwrap();

        let dir_path = naming::thread_abs_path(dir.path(), &thread.path);
        fs::write(dir_path.join("STATUS__x@y__bad.yaml"), "tid: [").unwrap();

        assert!(matches!(
            store.replay(&thread.path),
            Err(MaildropError::Format { .. })
        ));
    }

    #[test]
    fn test_resolve_entry_first_match_wins() {
        let mut recipient = Mailbox::empty("PMO");
        recipient.upsert_entry("T-1", |entry| entry.summary = Some("theirs".to_string()));
        let mut sender = Mailbox::empty("AGP");
        sender.upsert_entry("T-1", |entry| entry.summary = Some("ours".to_string()));
        sender.upsert_entry("T-2", |entry| entry.summary = Some("solo".to_string()));

        let hit = resolve_entry("T-1", &[&recipient, &sender]).unwrap();
        assert_eq!(hit.summary.as_deref(), Some("theirs"));

        let solo = resolve_entry("T-2", &[&recipient, &sender]).unwrap();
        assert_eq!(solo.summary.as_deref(), Some("solo"));

        assert!(resolve_entry("T-404", &[&recipient, &sender]).is_none());
    }
}
