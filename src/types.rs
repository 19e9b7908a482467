//! Shared identifiers and small enums.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Opaque queue-entry identifier assigned by the server.
///
/// Deserializes from either a JSON string or a JSON integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntryId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntryId {
    Text(String),
    Number(u64),
}

impl<'de> Deserialize<'de> for EntryId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawEntryId::deserialize(deserializer)? {
            RawEntryId::Text(s) => Self(s),
            RawEntryId::Number(n) => Self(n.to_string()),
        })
    }
}

impl EntryId {
    /// Wraps a server-provided identifier.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrowed identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for EntryId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle of a challenger in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Waiting for a game with the host.
    #[default]
    Waiting,
    /// Currently playing the host.
    Active,
    /// Game finished.
    Done,
}

impl EntryStatus {
    /// Status the reference server moves an entry to on advance.
    pub fn advanced(self) -> Self {
        match self {
            Self::Waiting => Self::Active,
            Self::Active | Self::Done => Self::Done,
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// Board side in a game record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    /// White pieces.
    White,
    /// Black pieces.
    Black,
}

impl Color {
    /// Key used in game-record JSON.
    pub fn key(self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Black => "black",
        }
    }

    /// The other side.
    pub fn opponent(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }
}

/// Remote resource kinds mirrored by the session caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Challenger queue.
    Queue,
    /// Completed game records.
    Records,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queue => f.write_str("queue"),
            Self::Records => f.write_str("records"),
        }
    }
}
