//! Session runtime: mutation protocol, push-driven sync and the handle that
//! ties them together.

/// Event stream types emitted by the session.
pub mod events;
/// Session handle, configuration and background loop.
pub mod handle;
/// Optimistic mutation protocol.
pub mod mutation;
/// Push-signal state machine.
pub mod sync;
