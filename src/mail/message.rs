//! Message records
//!
//! Defines the immutable message document persisted inside a thread
//! directory, plus the kind and status vocabularies shared with mailbox
//! thread entries.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Message kind
///
/// STATUS and RESULT are the built-in kinds; anything else the caller
/// supplies is carried verbatim (upper-cased) as a custom kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Status,
    Result,
    Custom(String),
}

impl MessageKind {
    /// Parse a kind from caller input, normalizing to upper case
    pub fn parse(value: &str) -> Self {
        let upper = value.trim().to_uppercase();
        match upper.as_str() {
            "STATUS" => MessageKind::Status,
            "RESULT" => MessageKind::Result,
            _ => MessageKind::Custom(upper),
        }
    }

    /// The wire form of the kind
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Status => "STATUS",
            MessageKind::Result => "RESULT",
            MessageKind::Custom(name) => name,
        }
    }

    /// STATUS messages carry an explicit work status
    pub fn is_status(&self) -> bool {
        matches!(self, MessageKind::Status)
    }
}

impl Default for MessageKind {
    fn default() -> Self {
        MessageKind::Status
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MessageKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(MessageKind::parse(&s))
    }
}

/// Work status of a thread as seen by one participant
///
/// TODO, IN_PROGRESS, and BLOCKED are the built-in states; non-STATUS
/// message kinds act as pseudo-statuses (e.g. a RESULT message marks its
/// thread entry `RESULT`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadStatus {
    Todo,
    InProgress,
    Blocked,
    Other(String),
}

impl ThreadStatus {
    /// Parse a status from caller input, normalizing to upper case
    pub fn parse(value: &str) -> Self {
        let upper = value.trim().to_uppercase();
        match upper.as_str() {
            "TODO" => ThreadStatus::Todo,
            "IN_PROGRESS" => ThreadStatus::InProgress,
            "BLOCKED" => ThreadStatus::Blocked,
            _ => ThreadStatus::Other(upper),
        }
    }

    /// The wire form of the status
    pub fn as_str(&self) -> &str {
        match self {
            ThreadStatus::Todo => "TODO",
            ThreadStatus::InProgress => "IN_PROGRESS",
            ThreadStatus::Blocked => "BLOCKED",
            ThreadStatus::Other(name) => name,
        }
    }
}

impl Default for ThreadStatus {
    fn default() -> Self {
        ThreadStatus::Todo
    }
}

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ThreadStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ThreadStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ThreadStatus::parse(&s))
    }
}

/// One immutable message within a thread
///
/// Written once into its thread directory and never modified or deleted;
/// a thread's history is the sorted sequence of these files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Thread id this message belongs to
    pub tid: String,

    /// Message kind (STATUS, RESULT, or caller-defined)
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Sender agent id
    pub from: String,

    /// Recipient agent id
    pub to: String,

    /// Subject line; also the thread entry summary
    pub subject: String,

    /// Message body
    pub body: String,

    /// Work status; present on STATUS messages only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ThreadStatus>,

    /// Reference to a related message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relates_to: Option<String>,

    /// Actions the sender expects from the recipient
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions_expected: Option<Vec<String>>,
}

impl Message {
    /// Create a message with the required fields
    pub fn new(
        tid: impl Into<String>,
        kind: MessageKind,
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            tid: tid.into(),
            kind,
            from: from.into(),
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            status: None,
            relates_to: None,
            actions_expected: None,
        }
    }

    /// Attach a work status
    pub fn with_status(mut self, status: ThreadStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Reference a related message
    pub fn with_relates_to(mut self, reference: impl Into<String>) -> Self {
        self.relates_to = Some(reference.into());
        self
    }

    /// Attach expected actions; an empty list is omitted from the record
    pub fn with_actions(mut self, actions: Vec<String>) -> Self {
        if !actions.is_empty() {
            self.actions_expected = Some(actions);
        }
        self
    }
}

/// Split a comma-separated actions argument into a cleaned list
pub fn parse_actions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
