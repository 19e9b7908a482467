//! Queue entry and archive request types.

use serde::{Deserialize, Serialize};

use crate::types::{EntryId, EntryStatus};

/// One challenger waiting for (or playing) a game with the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Server-assigned identifier, unique within the queue.
    pub id: EntryId,
    /// Chat handle of the challenger.
    #[serde(rename = "twitchUser")]
    pub challenger_handle: String,
    /// Account name on the game platform.
    #[serde(rename = "chessUser")]
    pub platform_handle: String,
    /// Queue lifecycle status.
    #[serde(default)]
    pub status: EntryStatus,
}

impl QueueEntry {
    /// Builds a waiting entry.
    pub fn waiting(
        id: impl Into<EntryId>,
        challenger_handle: impl Into<String>,
        platform_handle: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            challenger_handle: challenger_handle.into(),
            platform_handle: platform_handle.into(),
            status: EntryStatus::Waiting,
        }
    }

    /// Request body that archives this entry's game as a record.
    pub fn archive_request(&self) -> ArchiveRequest {
        ArchiveRequest {
            challenger_handle: self.challenger_handle.clone(),
            platform_handle: self.platform_handle.clone(),
        }
    }
}

/// Body of a record create: which challenger's game to archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRequest {
    /// Chat handle of the challenger.
    #[serde(rename = "twitchUser")]
    pub challenger_handle: String,
    /// Account name on the game platform.
    #[serde(rename = "chessUser")]
    pub platform_handle: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_server_shape_with_numeric_id() {
        let raw =
            r#"{"id": 7, "twitchUser": "chatter", "chessUser": "knightrider", "status": "active"}"#;
        let entry: QueueEntry = serde_json::from_str(raw).expect("decode");
        assert_eq!(entry.id, EntryId::from(7u64));
        assert_eq!(entry.challenger_handle, "chatter");
        assert_eq!(entry.platform_handle, "knightrider");
        assert_eq!(entry.status, EntryStatus::Active);
    }

    #[test]
    fn missing_status_defaults_to_waiting() {
        let raw = r#"{"id": "a1", "twitchUser": "c", "chessUser": "p"}"#;
        let entry: QueueEntry = serde_json::from_str(raw).expect("decode");
        assert_eq!(entry.status, EntryStatus::Waiting);
    }

    #[test]
    fn archive_request_uses_server_field_names() {
        let entry = QueueEntry::waiting("1", "chatter", "knightrider");
        let body = serde_json::to_value(entry.archive_request()).expect("encode");
        assert_eq!(
            body,
            serde_json::json!({"twitchUser": "chatter", "chessUser": "knightrider"})
        );
    }
}
