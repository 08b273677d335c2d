//! Mailbox store
//!
//! One mailbox document per agent, indexing every thread the agent has
//! sent to or received from. Mailboxes are created lazily, mutated under a
//! per-mailbox advisory lock, and written atomically. Cross-mailbox
//! atomicity is NOT guaranteed; each mailbox is its own consistency
//! domain.

use crate::error::{MaildropError, Result};
use crate::mail::message::ThreadStatus;
use crate::mail::{codec, naming};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

const LOCK_MAX_ATTEMPTS: u32 = 24;
const LOCK_INITIAL_BACKOFF: Duration = Duration::from_millis(10);
const LOCK_MAX_BACKOFF: Duration = Duration::from_millis(250);

/// One agent's local view of a thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadEntry {
    /// Globally unique thread id, identical across every participant's copy
    pub tid: String,

    /// Thread directory, stored in canonical store-root-relative form
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Work status derived from the latest message
    pub status: ThreadStatus,

    /// Filename of the most recent message on the thread
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,

    /// When this entry was last touched
    pub updated_at: DateTime<Utc>,

    /// Subject of the most recent message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Agents seen on this thread; grows, never shrinks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participants: Vec<String>,
}

impl ThreadEntry {
    /// Fresh entry with default status, created before the first mutation
    pub fn new(tid: impl Into<String>) -> Self {
        Self {
            tid: tid.into(),
            path: None,
            status: ThreadStatus::Todo,
            last: None,
            updated_at: Utc::now(),
            summary: None,
            participants: Vec::new(),
        }
    }

    /// Record a participant if not already present
    pub fn add_participant(&mut self, agent: &str) {
        if !self.participants.iter().any(|p| p == agent) {
            self.participants.push(agent.to_string());
        }
    }
}

/// Per-agent index of threads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mailbox {
    /// Owning agent id
    pub agent: String,

    /// One entry per thread the agent participates in
    #[serde(default)]
    pub threads: Vec<ThreadEntry>,
}

impl Mailbox {
    /// Empty mailbox for an agent that has never exchanged a message
    pub fn empty(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            threads: Vec::new(),
        }
    }

    /// Find a thread entry by id
    pub fn entry(&self, tid: &str) -> Option<&ThreadEntry> {
        self.threads.iter().find(|entry| entry.tid == tid)
    }

    /// Find or create the entry for `tid`, then apply `mutator`
    ///
    /// A created entry starts with default status TODO; the participants
    /// set is only ever touched by the mutator.
    pub fn upsert_entry(&mut self, tid: &str, mutator: impl FnOnce(&mut ThreadEntry)) {
        let index = match self.threads.iter().position(|entry| entry.tid == tid) {
            Some(index) => index,
            None => {
                self.threads.push(ThreadEntry::new(tid));
                self.threads.len() - 1
            }
        };
        mutator(&mut self.threads[index]);
    }
}

/// RAII guard for a mailbox's advisory lock
///
/// Held only across one read-modify-write of that mailbox; released on
/// drop along every exit path.
#[derive(Debug)]
pub struct MailboxLock {
    file: File,
}

impl Drop for MailboxLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Filesystem-backed store of per-agent mailboxes
#[derive(Debug, Clone)]
pub struct MailboxStore {
    root: PathBuf,
}

impl MailboxStore {
    /// Create a store rooted at the messaging root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The messaging root this store serves
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Idempotently create the agent's directory and mailbox document
    ///
    /// Never erases existing content; only the owner field is
    /// re-normalized if a document was written under a different id.
    pub fn ensure(&self, agent: &str) -> Result<Mailbox> {
        let agent = validated_agent_id(agent)?;
        fs::create_dir_all(naming::agent_dir(&self.root, agent))?;

        match codec::load::<Mailbox>(&naming::mailbox_path(&self.root, agent))? {
            Some(mut mailbox) => {
                if mailbox.agent != agent {
                    mailbox.agent = agent.to_string();
                    self.save(&mailbox)?;
                }
                Ok(mailbox)
            }
            None => {
                let mailbox = Mailbox::empty(agent);
                self.save(&mailbox)?;
                Ok(mailbox)
            }
        }
    }

    /// Load an agent's mailbox; an absent document is an empty mailbox,
    /// not an error
    pub fn load(&self, agent: &str) -> Result<Mailbox> {
        let agent = validated_agent_id(agent)?;
        let loaded = codec::load::<Mailbox>(&naming::mailbox_path(&self.root, agent))?;
        Ok(match loaded {
            Some(mut mailbox) => {
                mailbox.agent = agent.to_string();
                mailbox
            }
            None => Mailbox::empty(agent),
        })
    }

    /// Atomically overwrite the mailbox document
    pub fn save(&self, mailbox: &Mailbox) -> Result<()> {
        let agent = validated_agent_id(&mailbox.agent)?;
        fs::create_dir_all(naming::agent_dir(&self.root, agent))?;
        codec::store(&naming::mailbox_path(&self.root, agent), mailbox)
    }

    /// Acquire the agent's mailbox lock with bounded retry and backoff
    ///
    /// Guards one read-modify-write-save sequence against concurrent
    /// writers of the same mailbox. Fails with `LockTimeout` once the
    /// retry budget is exhausted.
    pub fn lock(&self, agent: &str) -> Result<MailboxLock> {
        let agent = validated_agent_id(agent)?;
        fs::create_dir_all(naming::agent_dir(&self.root, agent))?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(naming::mailbox_lock_path(&self.root, agent))?;

        let mut backoff = LOCK_INITIAL_BACKOFF;
        for attempt in 0..LOCK_MAX_ATTEMPTS {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(MailboxLock { file }),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    tracing::debug!(agent, attempt, "mailbox lock contended, backing off");
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(LOCK_MAX_BACKOFF);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(MaildropError::LockTimeout(agent.to_string()))
    }
}

/// Agent ids double as directory names; reject anything that would escape
/// the agents directory.
fn validated_agent_id(agent: &str) -> Result<&str> {
    let agent = agent.trim();
    if agent.is_empty() {
        return Err(MaildropError::Validation("agent id is required".to_string()));
    }
    if agent == "." || agent == ".." || agent.contains('/') || agent.contains('\\') {
        return Err(MaildropError::Validation(format!(
            "agent id '{}' is not a valid directory name",
            agent
        )));
    }
    Ok(agent)
}
