use std::fmt;

use async_trait::async_trait;

use crate::{
    entry::{ArchiveRequest, QueueEntry},
    stats::GameRecord,
    types::EntryId,
};

/// In-process server used for tests and local runs.
pub mod memory;

/// Failure reported by a transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request never got a response.
    Network(String),
    /// The server answered with a non-success status.
    Status(u16),
    /// The response body could not be decoded.
    Decode(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Status(code) => write!(f, "server returned status {code}"),
            Self::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<serde_json::Error> for TransportError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

/// Result of a transport call.
pub type TransportResult<T> = Result<T, TransportError>;

/// Server-side challenger queue.
#[async_trait]
pub trait RemoteQueue: Send + Sync {
    /// Every queue entry, in queue order.
    async fn list_entries(&self) -> TransportResult<Vec<QueueEntry>>;
    /// Deletes the entry with `id`.
    async fn delete_entry(&self, id: &EntryId) -> TransportResult<()>;
    /// Moves the entry with `id` to its next status.
    async fn advance_entry(&self, id: &EntryId) -> TransportResult<()>;
}

/// Server-side archive of completed games.
#[async_trait]
pub trait RemoteRecords: Send + Sync {
    /// Every archived game.
    async fn list_records(&self) -> TransportResult<Vec<GameRecord>>;
    /// Archives the finished game of the challenger named in `request`.
    async fn create_record(&self, request: &ArchiveRequest) -> TransportResult<()>;
}

/// Signal delivered by the push-channel transport. Carries no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushSignal {
    /// A connection was established.
    Opened,
    /// Something changed on the server.
    Changed,
    /// The connection was lost.
    Closed,
}
