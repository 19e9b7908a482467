//! Session-scoped resource caches and mutation ordering.

/// Keyed resource cache with optimistic updates and single-flight fetches.
pub mod cache;
/// Per-key intent queue serializing mutations.
pub mod intents;
/// Snapshot and undo-token types.
pub mod snapshot;
