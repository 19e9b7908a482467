use std::{fmt, sync::Arc};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    core::{
        cache::ResourceCache,
        intents::IntentQueue,
        snapshot::UndoToken,
    },
    entry::QueueEntry,
    remote::{RemoteQueue, RemoteRecords, TransportError},
    stats::GameRecord,
    types::{EntryId, Resource},
};

use super::events::SyncEvent;

/// Mutation intents the coordinator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationOp {
    /// Delete an entry from the queue.
    Remove,
    /// Move an entry to its next status.
    Advance,
    /// Store the entry's finished game as a record.
    Archive,
}

impl fmt::Display for MutationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remove => f.write_str("remove"),
            Self::Advance => f.write_str("advance"),
            Self::Archive => f.write_str("archive"),
        }
    }
}

/// A mutation's remote call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    /// The delete was rejected; the entry is back in the queue.
    Remove {
        /// Entry that was being removed.
        id: EntryId,
        /// Transport failure.
        source: TransportError,
    },
    /// The advance was rejected.
    Advance {
        /// Entry that was being advanced.
        id: EntryId,
        /// Transport failure.
        source: TransportError,
    },
    /// The record create was rejected; records are unchanged.
    Archive {
        /// Entry whose game was being archived.
        entry: Box<QueueEntry>,
        /// Transport failure.
        source: TransportError,
    },
}

impl MutationError {
    /// Operation that failed.
    pub fn op(&self) -> MutationOp {
        match self {
            Self::Remove { .. } => MutationOp::Remove,
            Self::Advance { .. } => MutationOp::Advance,
            Self::Archive { .. } => MutationOp::Archive,
        }
    }

    /// Entry the failed mutation targeted.
    pub fn id(&self) -> &EntryId {
        match self {
            Self::Remove { id, .. } | Self::Advance { id, .. } => id,
            Self::Archive { entry, .. } => &entry.id,
        }
    }

    /// Transport failure behind the mutation error.
    pub fn transport(&self) -> &TransportError {
        match self {
            Self::Remove { source, .. }
            | Self::Advance { source, .. }
            | Self::Archive { source, .. } => source,
        }
    }
}

impl fmt::Display for MutationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of entry {} failed: {}", self.op(), self.id(), self.transport())
    }
}

impl std::error::Error for MutationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.transport())
    }
}

/// Runs remove, advance and archive against the session caches.
///
/// Every intent goes through the same three phases: optimistic apply, remote
/// call, settle. Intents on the same entry queue behind each other.
pub struct MutationCoordinator {
    queue: ResourceCache<QueueEntry>,
    records: ResourceCache<GameRecord>,
    remote_queue: Arc<dyn RemoteQueue>,
    remote_records: Arc<dyn RemoteRecords>,
    intents: IntentQueue<EntryId>,
    events_tx: broadcast::Sender<SyncEvent>,
}

impl MutationCoordinator {
    /// Coordinator over the session caches and their remote collaborators.
    pub fn new(
        queue: ResourceCache<QueueEntry>,
        records: ResourceCache<GameRecord>,
        remote_queue: Arc<dyn RemoteQueue>,
        remote_records: Arc<dyn RemoteRecords>,
        events_tx: broadcast::Sender<SyncEvent>,
    ) -> Self {
        Self {
            queue,
            records,
            remote_queue,
            remote_records,
            intents: IntentQueue::new(),
            events_tx,
        }
    }

    /// Drops `id` from the queue right away, deletes it on the server, and
    /// restores it if the delete fails.
    pub async fn remove_entry(&self, id: EntryId) -> Result<(), MutationError> {
        let _intent = self.intents.acquire(&id).await;

        let target = id.clone();
        let mut token = self
            .queue
            .apply_optimistic(|entries| entries.into_iter().filter(|e| e.id != target).collect());

        let result = self.remote_queue.delete_entry(&id).await;
        if result.is_err() {
            self.queue.rollback(&mut token);
        }
        self.settle_queue(token).await;

        match result {
            Ok(()) => {
                info!(%id, "entry removed");
                let _ = self.events_tx.send(SyncEvent::EntryRemoved { id });
                Ok(())
            }
            Err(source) => {
                warn!(%id, error = %source, "remove failed, rolled back");
                let _ = self.events_tx.send(SyncEvent::MutationFailed {
                    op: MutationOp::Remove,
                    id: id.clone(),
                });
                Err(MutationError::Remove { id, source })
            }
        }
    }

    /// Asks the server to move `id` to its next status. The new status is not
    /// guessed locally; the settle refetch brings it in.
    pub async fn advance_entry(&self, id: EntryId) -> Result<(), MutationError> {
        let _intent = self.intents.acquire(&id).await;

        // Identity transform: nothing to predict, but the in-flight token
        // holds back push invalidations until settle.
        let token = self.queue.apply_optimistic(|entries| entries);

        let result = self.remote_queue.advance_entry(&id).await;
        self.settle_queue(token).await;

        match result {
            Ok(()) => {
                info!(%id, "entry advanced");
                let _ = self.events_tx.send(SyncEvent::EntryAdvanced { id });
                Ok(())
            }
            Err(source) => {
                warn!(%id, error = %source, "advance failed");
                let _ = self.events_tx.send(SyncEvent::MutationFailed {
                    op: MutationOp::Advance,
                    id: id.clone(),
                });
                Err(MutationError::Advance { id, source })
            }
        }
    }

    /// Stores the finished game of `entry` as a record. The queue is left as
    /// is; on success the records cache is invalidated and refetched.
    pub async fn archive_as_record(&self, entry: QueueEntry) -> Result<(), MutationError> {
        let _intent = self.intents.acquire(&entry.id).await;

        match self.remote_records.create_record(&entry.archive_request()).await {
            Ok(()) => {
                info!(id = %entry.id, platform = %entry.platform_handle, "game archived");
                self.records.invalidate();
                match self.records.get().await {
                    Ok(snapshot) => {
                        let _ = self.events_tx.send(SyncEvent::Refreshed {
                            resource: Resource::Records,
                            version: snapshot.version(),
                        });
                    }
                    Err(err) => {
                        warn!(error = %err, "records refetch after archive failed");
                        let _ = self.events_tx.send(SyncEvent::FetchFailed {
                            resource: Resource::Records,
                        });
                    }
                }
                let _ = self.events_tx.send(SyncEvent::EntryArchived { id: entry.id });
                Ok(())
            }
            Err(source) => {
                warn!(id = %entry.id, error = %source, "archive failed");
                let _ = self.events_tx.send(SyncEvent::MutationFailed {
                    op: MutationOp::Archive,
                    id: entry.id.clone(),
                });
                Err(MutationError::Archive {
                    entry: Box::new(entry),
                    source,
                })
            }
        }
    }

    async fn settle_queue(&self, token: UndoToken<QueueEntry>) {
        match self.queue.commit(token).await {
            Ok(()) => {
                if let Some(snapshot) = self.queue.view().filter(|s| !s.is_stale()) {
                    debug!(version = snapshot.version(), "queue settled");
                    let _ = self.events_tx.send(SyncEvent::Refreshed {
                        resource: Resource::Queue,
                        version: snapshot.version(),
                    });
                }
            }
            Err(err) => {
                warn!(error = %err, "queue refetch after mutation failed");
                let _ = self.events_tx.send(SyncEvent::FetchFailed {
                    resource: Resource::Queue,
                });
            }
        }
    }
}
