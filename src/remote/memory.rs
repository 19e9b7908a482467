//! In-process stand-in for the queue server.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use hashbrown::HashMap;

use crate::{
    entry::{ArchiveRequest, QueueEntry},
    stats::GameRecord,
    types::EntryId,
};

use super::{RemoteQueue, RemoteRecords, TransportError, TransportResult};

#[derive(Debug, Default)]
struct ServerState {
    entries: Vec<QueueEntry>,
    records: Vec<GameRecord>,
    finished_games: HashMap<String, GameRecord>,
    archived: Vec<ArchiveRequest>,
    next_id: u64,
}

/// Queue and records server kept in memory.
///
/// Entries get sequential numeric ids. Archiving looks up the finished game
/// registered for the entry's platform handle with [`InMemoryRemote::register_game`].
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    state: Mutex<ServerState>,
}

impl InMemoryRemote {
    /// Empty server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a waiting challenger and returns its id.
    pub fn enqueue(&self, challenger_handle: &str, platform_handle: &str) -> EntryId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = EntryId::from(state.next_id);
        state
            .entries
            .push(QueueEntry::waiting(id.clone(), challenger_handle, platform_handle));
        id
    }

    /// Makes a finished game available for archiving under `platform_handle`.
    pub fn register_game(&self, platform_handle: &str, game: GameRecord) {
        self.lock()
            .finished_games
            .insert(platform_handle.to_string(), game);
    }

    /// Stores a record directly, bypassing the archive flow.
    pub fn push_record(&self, record: GameRecord) {
        self.lock().records.push(record);
    }

    /// Current server-side queue.
    pub fn entries(&self) -> Vec<QueueEntry> {
        self.lock().entries.clone()
    }

    /// Current server-side records.
    pub fn records(&self) -> Vec<GameRecord> {
        self.lock().records.clone()
    }

    /// Every archive request accepted so far.
    pub fn archived(&self) -> Vec<ArchiveRequest> {
        self.lock().archived.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RemoteQueue for InMemoryRemote {
    async fn list_entries(&self) -> TransportResult<Vec<QueueEntry>> {
        Ok(self.entries())
    }

    async fn delete_entry(&self, id: &EntryId) -> TransportResult<()> {
        let mut state = self.lock();
        let pos = state
            .entries
            .iter()
            .position(|e| &e.id == id)
            .ok_or(TransportError::Status(404))?;
        state.entries.remove(pos);
        Ok(())
    }

    async fn advance_entry(&self, id: &EntryId) -> TransportResult<()> {
        let mut state = self.lock();
        let entry = state
            .entries
            .iter_mut()
            .find(|e| &e.id == id)
            .ok_or(TransportError::Status(404))?;
        entry.status = entry.status.advanced();
        Ok(())
    }
}

#[async_trait]
impl RemoteRecords for InMemoryRemote {
    async fn list_records(&self) -> TransportResult<Vec<GameRecord>> {
        Ok(self.records())
    }

    async fn create_record(&self, request: &ArchiveRequest) -> TransportResult<()> {
        let mut state = self.lock();
        let game = state
            .finished_games
            .remove(&request.platform_handle)
            .ok_or(TransportError::Status(404))?;
        state.records.push(game);
        state.archived.push(request.clone());
        Ok(())
    }
}
