use std::{fmt, hash::Hash};

use crate::{entry::QueueEntry, stats::GameRecord, types::EntryId};

/// Entity that can live in a [`crate::core::cache::ResourceCache`].
pub trait CacheItem: Clone + Send + Sync + 'static {
    /// Identity type.
    type Key: Eq + Hash + Clone + fmt::Debug + Send + Sync;

    /// Identity used for de-duplication and rollback reconciliation.
    /// Items without an identity return `None` and are never de-duplicated.
    fn key(&self) -> Option<Self::Key>;
}

impl CacheItem for QueueEntry {
    type Key = EntryId;

    fn key(&self) -> Option<EntryId> {
        Some(self.id.clone())
    }
}

impl CacheItem for GameRecord {
    type Key = ();

    fn key(&self) -> Option<()> {
        None
    }
}

/// Last known server state of one resource, possibly carrying an optimistic
/// change that has not settled yet.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot<T> {
    pub(crate) items: Vec<T>,
    pub(crate) stale: bool,
    pub(crate) version: u64,
}

impl<T> CacheSnapshot<T> {
    pub(crate) fn fresh(items: Vec<T>, version: u64) -> Self {
        Self {
            items,
            stale: false,
            version,
        }
    }

    /// Entities in server order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Takes the entities out of the snapshot.
    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// True once invalidated and not yet refetched.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Bumped on every change to the cache contents.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the resource holds no entities.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: CacheItem> CacheSnapshot<T> {
    /// Looks an entity up by identity.
    pub fn find(&self, key: &T::Key) -> Option<&T> {
        self.items.iter().find(|item| item.key().as_ref() == Some(key))
    }
}

/// Captures the pre-mutation state of an optimistic change.
///
/// Hand it back to [`crate::core::cache::ResourceCache::rollback`] if the
/// remote call fails, and always to
/// [`crate::core::cache::ResourceCache::commit`] once it settles.
#[must_use = "an undo token must be committed or the cache never refetches"]
#[derive(Debug)]
pub struct UndoToken<T: CacheItem> {
    pub(crate) previous: Option<CacheSnapshot<T>>,
    pub(crate) removed: Vec<(usize, T)>,
    pub(crate) added: Vec<T::Key>,
    pub(crate) epoch: u64,
    pub(crate) rolled_back: bool,
}

impl<T: CacheItem> UndoToken<T> {
    /// Snapshot seen right before the optimistic transform.
    pub fn previous(&self) -> Option<&CacheSnapshot<T>> {
        self.previous.as_ref()
    }

    /// True once [`crate::core::cache::ResourceCache::rollback`] consumed it.
    pub fn is_rolled_back(&self) -> bool {
        self.rolled_back
    }
}
