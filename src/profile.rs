//! Account details shown in reports
//!
//! Details come from Telegram when the account is looked up online, and
//! otherwise from the session's own peer cache and an optional JSON sidecar
//! (`<session stem>.json`) that session bundles often ship with.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// Placeholder for missing fields in reports
pub const NOT_SET: &str = "Not set";

/// Loosely-known account details
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountProfile {
    pub user_id: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub phone: Option<String>,
}

impl AccountProfile {
    /// Parse a sidecar JSON document
    ///
    /// Accepts `user_id` or `id`, numbers or strings for ids and phones, and
    /// `first_name`/`last_name` or a single `name`.
    pub fn from_json(value: &Value) -> Self {
        let user_id = ["user_id", "id"]
            .iter()
            .find_map(|key| value.get(*key).and_then(as_i64));

        let first_name = text(value, "first_name").or_else(|| text(value, "name"));

        Self {
            user_id,
            first_name,
            last_name: text(value, "last_name"),
            username: text(value, "username").map(|u| u.trim_start_matches('@').to_string()),
            phone: text(value, "phone").or_else(|| text(value, "phone_number")),
        }
    }

    /// Fill fields missing here from `other`
    pub fn merge(mut self, other: AccountProfile) -> Self {
        self.user_id = self.user_id.or(other.user_id);
        self.first_name = self.first_name.or(other.first_name);
        self.last_name = self.last_name.or(other.last_name);
        self.username = self.username.or(other.username);
        self.phone = self.phone.or(other.phone);
        self
    }

    /// "First Last", or `None` when both are empty
    pub fn full_name(&self) -> Option<String> {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_string())
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Path of the sidecar for a session file or tdata folder
pub fn sidecar_path(source: &Path) -> PathBuf {
    if source.is_dir() {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        source.with_file_name(format!("{}.json", name))
    } else {
        source.with_extension("json")
    }
}

/// Read the sidecar next to `source`, if there is one
pub fn read_sidecar(source: &Path) -> Result<Option<AccountProfile>> {
    let path = sidecar_path(source);
    if !path.is_file() {
        return Ok(None);
    }

    let raw = std::fs::read_to_string(&path)?;
    let value: Value = serde_json::from_str(&raw)?;
    tracing::debug!("Read sidecar {:?}", path);
    Ok(Some(AccountProfile::from_json(&value)))
}

/// Account summary as recorded in the results log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountInfo {
    pub name: String,
    pub username: Option<String>,
    pub username_display: String,
    pub phone: String,
    pub user_id: Option<i64>,
    pub dc_id: i32,
    #[serde(default)]
    pub chats_count: Option<usize>,
    #[serde(default)]
    pub contacts_count: Option<usize>,
    pub peers_count: Option<usize>,
}

impl AccountInfo {
    pub fn new(profile: &AccountProfile, dc_id: i32, peers_count: Option<usize>) -> Self {
        Self {
            name: profile.full_name().unwrap_or_else(|| NOT_SET.to_string()),
            username: profile.username.clone(),
            username_display: profile
                .username
                .as_ref()
                .map(|u| format!("@{}", u))
                .unwrap_or_else(|| NOT_SET.to_string()),
            phone: profile.phone.clone().unwrap_or_else(|| NOT_SET.to_string()),
            user_id: profile.user_id,
            dc_id,
            chats_count: None,
            contacts_count: None,
            peers_count,
        }
    }

    /// Dialog and contact counts from an online lookup
    pub fn with_counts(mut self, chats_count: Option<usize>, contacts_count: Option<usize>) -> Self {
        self.chats_count = chats_count;
        self.contacts_count = contacts_count;
        self
    }
}
