//! Runtime event stream payloads.

use crate::types::{EntryId, Resource};

use super::mutation::MutationOp;

/// Events broadcast by a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A cache was refetched and now holds server state.
    Refreshed {
        /// Refetched resource.
        resource: Resource,
        /// Snapshot version after the refetch.
        version: u64,
    },
    /// A refetch failed; the previous snapshot is still served.
    FetchFailed {
        /// Resource whose fetch failed.
        resource: Resource,
    },
    /// Both caches were marked stale by a push signal or the poll timer.
    Invalidated,
    /// The server confirmed a removal.
    EntryRemoved {
        /// Removed entry.
        id: EntryId,
    },
    /// The server confirmed an advance.
    EntryAdvanced {
        /// Advanced entry.
        id: EntryId,
    },
    /// The server stored a record for this entry's game.
    EntryArchived {
        /// Archived entry.
        id: EntryId,
    },
    /// A remote call failed; the optimistic change, if any, was undone.
    MutationFailed {
        /// Failed operation.
        op: MutationOp,
        /// Target entry.
        id: EntryId,
    },
    /// The push channel reported an open connection.
    PushConnected,
    /// The push channel reported a lost connection.
    PushDisconnected,
}
