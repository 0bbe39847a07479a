//! Core queue types for frontdesk.
//!
//! An [`Entry`] is one memo on the front-desk queue: a name, a short note
//! and where it currently sits (waiting or being handled).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Placeholder memo used when the input carries only a name.
pub const DEFAULT_MEMO: &str = "접수/대기";

/// Where an entry sits on the queue.
///
/// `Done` is a transition request, never a stored state: moving an entry
/// to `Done` deletes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    /// Entered at the desk, not yet picked up.
    Waiting,
    /// Being handled.
    InProgress,
    /// Finished; removes the entry.
    Done,
}

impl Status {
    /// The wire spelling of this status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::InProgress => "in-progress",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "waiting" => Ok(Self::Waiting),
            "in-progress" | "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            other => Err(Error::InvalidStatus(other.to_string())),
        }
    }
}

/// Opaque entry identifier.
///
/// Local mode generates UUIDs; the remote service assigns its own, which
/// may be text or an integer column. Both read into the same string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl<'de> Deserialize<'de> for EntryId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => Self(s),
            RawId::Signed(n) => Self(n.to_string()),
            RawId::Unsigned(n) => Self(n.to_string()),
        })
    }
}

impl EntryId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first eight characters, for display.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One queue entry.
///
/// Serialized with the remote table's column names, so the same shape is
/// used for the local blob, PostgREST rows and realtime payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Unique identifier.
    pub id: EntryId,
    /// Who the memo is about.
    pub name: String,
    /// The note itself (treatment, schedule change, message).
    #[serde(rename = "treatment", alias = "memo")]
    pub memo: String,
    /// Current queue position.
    pub status: Status,
    /// When the entry was created; orders the queue.
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Accept both RFC 3339 and the Postgres text form (`2025-03-01 09:30:00.12+00`)
/// that realtime payloads sometimes carry. Unparseable values fall back to now.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(parse_timestamp(&raw))
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return dt.with_timezone(&Utc);
    }
    tracing::warn!("Unparseable created_at '{}', using current time", raw);
    Utc::now()
}

impl Entry {
    /// Create a new waiting entry with a fresh id, stamped now.
    #[must_use]
    pub fn new(name: impl Into<String>, memo: impl Into<String>) -> Self {
        Self {
            id: EntryId::generate(),
            name: name.into(),
            memo: memo.into(),
            status: Status::Waiting,
            created_at: Utc::now(),
        }
    }

    /// Check whether this entry is waiting.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.status == Status::Waiting
    }

    /// Check whether this entry is being handled.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.status == Status::InProgress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(Status::Waiting.to_string(), "waiting");
        assert_eq!(Status::InProgress.to_string(), "in-progress");
        assert_eq!(Status::Done.to_string(), "done");
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("waiting".parse::<Status>().unwrap(), Status::Waiting);
        assert_eq!("in-progress".parse::<Status>().unwrap(), Status::InProgress);
        assert_eq!("in_progress".parse::<Status>().unwrap(), Status::InProgress);
        assert_eq!(" done ".parse::<Status>().unwrap(), Status::Done);

        let err = "finished".parse::<Status>().unwrap_err();
        assert!(matches!(err, Error::InvalidStatus(_)));
    }

    #[test]
    fn test_status_serde_uses_kebab_case() {
        let json = serde_json::to_string(&Status::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
    }

    #[test]
    fn test_entry_new() {
        let entry = Entry::new("Kim", "ultrasound");
        assert_eq!(entry.name, "Kim");
        assert_eq!(entry.memo, "ultrasound");
        assert!(entry.is_waiting());
        assert!(!entry.is_in_progress());
        assert_eq!(entry.id.as_str().len(), 36);
    }

    #[test]
    fn test_entry_ids_are_unique() {
        let a = Entry::new("A", "x");
        let b = Entry::new("A", "x");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_entry_id_short() {
        let id = EntryId::from("0123456789abcdef");
        assert_eq!(id.short(), "01234567");

        let tiny = EntryId::from("42");
        assert_eq!(tiny.short(), "42");
    }

    #[test]
    fn test_entry_id_reads_numbers() {
        let id: EntryId = serde_json::from_str("42").unwrap();
        assert_eq!(id.as_str(), "42");

        let id: EntryId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(id.as_str(), "abc");

        assert!(serde_json::from_str::<EntryId>("true").is_err());
    }

    #[test]
    fn test_entry_serializes_memo_as_treatment() {
        let entry = Entry::new("Lee", "shockwave");
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["treatment"], "shockwave");
        assert_eq!(value["status"], "waiting");
        assert!(value.get("memo").is_none());
    }

    #[test]
    fn test_entry_deserializes_remote_row() {
        let row = r#"{
            "id": "7f1c2a7e-8f1b-4a59-9b8e-2f0c2d3e4f50",
            "created_at": "2025-03-01T09:30:00.123456+00:00",
            "name": "Park",
            "treatment": "4시로 변경",
            "status": "in-progress"
        }"#;
        let entry: Entry = serde_json::from_str(row).unwrap();
        assert_eq!(entry.name, "Park");
        assert_eq!(entry.memo, "4시로 변경");
        assert!(entry.is_in_progress());
    }

    #[test]
    fn test_parse_timestamp_postgres_text_form() {
        let dt = parse_timestamp("2025-03-01 09:30:00.5+00");
        assert_eq!(dt.to_rfc3339(), "2025-03-01T09:30:00.500+00:00");
    }

    #[test]
    fn test_parse_timestamp_garbage_falls_back_to_now() {
        let before = Utc::now();
        let dt = parse_timestamp("yesterday-ish");
        assert!(dt >= before);
    }

    #[test]
    fn test_entry_accepts_memo_alias() {
        let row = r#"{
            "id": "a",
            "created_at": "2025-03-01T09:30:00Z",
            "name": "Choi",
            "memo": "call back",
            "status": "waiting"
        }"#;
        let entry: Entry = serde_json::from_str(row).unwrap();
        assert_eq!(entry.memo, "call back");
    }
}
