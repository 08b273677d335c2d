//! Filesystem naming and directory layout
//!
//! Deterministic path construction for mailboxes, thread directories, and
//! message files, plus the normalization rule that keeps thread paths
//! comparable across writers.
//!
//! Persisted layout:
//! ```text
//! <root>/agents/<agentId>/mailbox.yaml    # one mailbox document per agent
//! <root>/agents/<agentId>/mailbox.lock    # advisory lock sidecar
//! <root>/msg/<timestamp>—<slug>/          # one directory per thread
//!     <TYPE>__<from>@<to>__<slug>.yaml    # one immutable file per message
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};

/// Directory under the store root holding thread directories
pub const THREADS_DIR: &str = "msg";

/// Directory under the store root holding per-agent mailboxes
pub const AGENTS_DIR: &str = "agents";

/// Mailbox document filename inside an agent directory
pub const MAILBOX_FILE: &str = "mailbox.yaml";

/// Advisory lock sidecar next to the mailbox document
pub const MAILBOX_LOCK_FILE: &str = "mailbox.lock";

/// Extension of persisted message files
pub const MESSAGE_EXT: &str = "yaml";

/// Separator between the timestamp and slug of a thread directory name.
/// The em dash cannot appear in either half, so splitting stays unambiguous.
pub const THREAD_DIR_SEPARATOR: char = '—';

const SLUG_MAX: usize = 80;

/// Directory holding the given agent's mailbox and lock file
pub fn agent_dir(root: &Path, agent: &str) -> PathBuf {
    root.join(AGENTS_DIR).join(agent)
}

/// Path of the given agent's mailbox document
pub fn mailbox_path(root: &Path, agent: &str) -> PathBuf {
    agent_dir(root, agent).join(MAILBOX_FILE)
}

/// Path of the given agent's mailbox lock sidecar
pub fn mailbox_lock_path(root: &Path, agent: &str) -> PathBuf {
    agent_dir(root, agent).join(MAILBOX_LOCK_FILE)
}

/// Lower-case, collapse non-alphanumeric runs to single hyphens, trim
/// hyphens, truncate. Falls back when nothing survives.
pub fn slugify(input: &str, fallback: &str) -> String {
    let mut slug = String::new();
    let mut pending_hyphen = false;
    for c in input.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
        if slug.len() >= SLUG_MAX {
            break;
        }
    }
    slug.truncate(SLUG_MAX);
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug.to_string()
    }
}

/// Filesystem-safe timestamp used as a thread directory prefix.
/// RFC 3339 with millisecond precision, colons replaced for portability.
pub fn timestamp_for_dir(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true).replace(':', "-")
}

/// Base directory name for a new thread created at `at`
pub fn thread_dir_name(subject: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}{}{}",
        timestamp_for_dir(at),
        THREAD_DIR_SEPARATOR,
        slugify(subject, "message")
    )
}

/// Message filename encoding kind, sender, recipient, and subject so that
/// lexicographic order within a thread approximates arrival order.
pub fn message_file_name(kind: &str, from: &str, to: &str, subject: &str) -> String {
    format!(
        "{}__{}@{}__{}.{}",
        kind,
        slugify(from, "from"),
        slugify(to, "to"),
        slugify(subject, "note"),
        MESSAGE_EXT
    )
}

/// Normalize a stored thread path to the canonical store-root-relative
/// form `msg/<dirname>`.
///
/// Accepts absolute paths under `root`, legacy `messaging/msg/...`
/// prefixes, already-canonical `msg/...` values, and bare directory
/// names. Returns `None` for empty values and for absolute paths outside
/// the store root, which cannot refer to a thread of this store.
pub fn normalize_thread_path(root: &Path, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let mut value = raw.replace('\\', "/");

    if Path::new(&value).is_absolute() {
        let rel = Path::new(&value).strip_prefix(root).ok()?;
        value = rel.to_string_lossy().replace('\\', "/");
    }
    if let Some(rest) = value.strip_prefix("./") {
        value = rest.to_string();
    }
    if let Some(rest) = value.strip_prefix("messaging/") {
        value = rest.to_string();
    }
    if value.is_empty() {
        return None;
    }
    if value.starts_with(&format!("{}/", THREADS_DIR)) {
        Some(value)
    } else {
        Some(format!("{}/{}", THREADS_DIR, value))
    }
}

/// Absolute directory for a canonical `msg/<dirname>` thread path
pub fn thread_abs_path(root: &Path, canonical: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for part in canonical.split('/') {
        path.push(part);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Kickoff: Phase 2!", "message"), "kickoff-phase-2");
        assert_eq!(slugify("AGP", "from"), "agp");
        assert_eq!(slugify("--already--slugged--", "x"), "already-slugged");
    }

    #[test]
    fn test_slugify_empty_falls_back() {
        assert_eq!(slugify("", "message"), "message");
        assert_eq!(slugify("!!!", "note"), "note");
    }

    #[test]
    fn test_slugify_truncates() {
        let long = "a".repeat(200);
        assert_eq!(slugify(&long, "x").len(), 80);
    }

    #[test]
    fn test_timestamp_is_filesystem_safe() {
        let at = Utc.with_ymd_and_hms(2026, 8, 7, 12, 30, 45).unwrap();
        let stamp = timestamp_for_dir(at);
        assert!(!stamp.contains(':'));
        assert!(stamp.starts_with("2026-08-07T12-30-45"));
        assert!(stamp.ends_with('Z'));
    }

    #[test]
    fn test_thread_dir_name() {
        let at = Utc.with_ymd_and_hms(2026, 8, 7, 9, 0, 0).unwrap();
        let name = thread_dir_name("Kickoff", at);
        assert!(name.contains(THREAD_DIR_SEPARATOR));
        assert!(name.ends_with("kickoff"));
    }

    #[test]
    fn test_message_file_name() {
        assert_eq!(
            message_file_name("STATUS", "AGP", "PMO", "Kickoff"),
            "STATUS__agp@pmo__kickoff.yaml"
        );
        assert_eq!(
            message_file_name("RESULT", "", "PMO", "???"),
            "RESULT__from@pmo__note.yaml"
        );
    }

    #[test]
    fn test_normalize_thread_path_variants() {
        let root = Path::new("/store");
        assert_eq!(
            normalize_thread_path(root, "msg/2026—kickoff").as_deref(),
            Some("msg/2026—kickoff")
        );
        assert_eq!(
            normalize_thread_path(root, "messaging/msg/2026—kickoff").as_deref(),
            Some("msg/2026—kickoff")
        );
        assert_eq!(
            normalize_thread_path(root, "2026—kickoff").as_deref(),
            Some("msg/2026—kickoff")
        );
        assert_eq!(
            normalize_thread_path(root, "/store/msg/2026—kickoff").as_deref(),
            Some("msg/2026—kickoff")
        );
    }

    #[test]
    fn test_normalize_thread_path_rejects_foreign() {
        let root = Path::new("/store");
        assert_eq!(normalize_thread_path(root, ""), None);
        assert_eq!(normalize_thread_path(root, "   "), None);
        assert_eq!(normalize_thread_path(root, "/elsewhere/msg/x"), None);
    }

    #[test]
    fn test_thread_abs_path() {
        let root = Path::new("/store");
        assert_eq!(
            thread_abs_path(root, "msg/2026—kickoff"),
            PathBuf::from("/store/msg/2026—kickoff")
        );
    }

    #[test]
    fn test_mailbox_paths() {
        let root = Path::new("/store");
        assert_eq!(
            mailbox_path(root, "AGP"),
            PathBuf::from("/store/agents/AGP/mailbox.yaml")
        );
        assert_eq!(
            mailbox_lock_path(root, "AGP"),
            PathBuf::from("/store/agents/AGP/mailbox.lock")
        );
    }
}
