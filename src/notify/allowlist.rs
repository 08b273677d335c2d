//! Notification allow-list
//!
//! A read-mostly policy document restricting which recipients may receive
//! automatic push notifications. Roles map to arbitrary metadata; aliases
//! map to role names and resolve through at most one hop. Loaded once per
//! process and cached on the gate; a load failure degrades to "nobody is
//! eligible" rather than failing sends.

use crate::error::{MaildropError, Result};
use crate::mail::codec;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Normalize an allow-list key or recipient id
///
/// Lower-case, collapse non-alphanumeric runs to single hyphens, trim.
/// Returns `None` when nothing survives.
pub fn normalize_key(value: &str) -> Option<String> {
    let mut key = String::new();
    let mut pending_hyphen = false;
    for c in value.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !key.is_empty() {
                key.push('-');
            }
            pending_hyphen = false;
            key.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// Raw document shape of the allow-list file
#[derive(Debug, Default, Deserialize)]
struct AllowlistDoc {
    /// Role name to arbitrary metadata (metadata is policy for the
    /// dispatcher, opaque here)
    #[serde(default)]
    roles: BTreeMap<String, serde_yaml::Value>,

    /// Alias name to target role name
    #[serde(default)]
    aliases: BTreeMap<String, String>,
}

/// Compiled allow-list with normalized lookup maps
#[derive(Debug, Default)]
pub struct Allowlist {
    /// Normalized role key to original role name
    roles: HashMap<String, String>,

    /// Normalized alias key to target role name
    aliases: HashMap<String, String>,
}

impl Allowlist {
    /// Parse and compile an allow-list document
    pub fn parse(text: &str) -> std::result::Result<Self, serde_yaml::Error> {
        let doc: AllowlistDoc = codec::parse_str(text)?;
        Ok(Self::compile(doc))
    }

    fn compile(doc: AllowlistDoc) -> Self {
        let mut roles = HashMap::new();
        for role_name in doc.roles.keys() {
            if let Some(normalized) = normalize_key(role_name) {
                roles.insert(normalized, role_name.clone());
            }
        }

        let mut aliases = HashMap::new();
        for (alias, target) in &doc.aliases {
            if let Some(normalized) = normalize_key(alias) {
                aliases.insert(normalized, target.clone());
            }
        }
        // Every role is implicitly its own alias
        for (normalized, role_name) in &roles {
            aliases
                .entry(normalized.clone())
                .or_insert_with(|| role_name.clone());
        }

        Self { roles, aliases }
    }

    /// Is this name a known role (case/punctuation-insensitive)?
    pub fn has_role(&self, role_name: &str) -> bool {
        normalize_key(role_name)
            .map(|key| self.roles.contains_key(&key))
            .unwrap_or(false)
    }

    /// Is this recipient eligible for automatic notification?
    ///
    /// Eligible when the normalized id is a known role, or an alias whose
    /// target is itself a known role. One hop only; alias chains are not
    /// followed.
    pub fn is_eligible(&self, recipient: &str) -> bool {
        let Some(key) = normalize_key(recipient) else {
            return false;
        };
        if self.roles.contains_key(&key) {
            return true;
        }
        match self.aliases.get(&key) {
            Some(target) => self.has_role(target),
            None => false,
        }
    }
}

/// Cached allow-list plus the load failure, if any
#[derive(Debug)]
pub struct AllowlistState {
    /// Compiled allow-list; empty when loading failed
    pub allowlist: Allowlist,

    /// Load failure description; when present, nobody is eligible
    pub load_error: Option<String>,
}

/// Process-lifetime allow-list cache and eligibility gate
///
/// Loads the policy document on first use and keeps it until `reload` is
/// called. A load failure is logged once at load time, not per message.
#[derive(Debug)]
pub struct NotificationGate {
    path: PathBuf,
    cache: Mutex<Option<Arc<AllowlistState>>>,
}

impl NotificationGate {
    /// Gate backed by the allow-list document at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    /// Current allow-list state, loading it on first use
    pub fn state(&self) -> Arc<AllowlistState> {
        let mut cache = match self.cache.lock() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(state) = cache.as_ref() {
            return Arc::clone(state);
        }
        let state = Arc::new(load_state(&self.path));
        *cache = Some(Arc::clone(&state));
        state
    }

    /// Drop the cached allow-list so the next use re-reads the document.
    /// Intended for long-running daemon deployments.
    pub fn reload(&self) {
        let mut cache = match self.cache.lock() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        *cache = None;
    }

    /// Is this recipient eligible for automatic notification?
    ///
    /// Always false while the allow-list is unavailable.
    pub fn is_eligible(&self, recipient: &str) -> bool {
        let state = self.state();
        if state.load_error.is_some() {
            return false;
        }
        state.allowlist.is_eligible(recipient)
    }
}

fn load_state(path: &Path) -> AllowlistState {
    match try_load(path) {
        Ok(allowlist) => AllowlistState {
            allowlist,
            load_error: None,
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "allow-list unavailable; automatic notifications disabled"
            );
            AllowlistState {
                allowlist: Allowlist::default(),
                load_error: Some(e.to_string()),
            }
        }
    }
}

fn try_load(path: &Path) -> Result<Allowlist> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| MaildropError::AllowlistLoad(format!("{}: {}", path.display(), e)))?;
    Allowlist::parse(&text)
        .map_err(|e| MaildropError::AllowlistLoad(format!("{}: {}", path.display(), e)))
}
