//! Client-side sync engine for a stream host's challenger queue.
//!
//! Keeps a local view of the server's queue consistent across initial and
//! periodic fetches, optimistic mutations and push notifications, and folds
//! the host's archived games into session statistics.
//!
//! # Examples
//!
//! Summarizing games without a session:
//! ```
//! use queuesync::stats::{GameRecord, aggregate};
//!
//! let game = GameRecord::from_data(r#"{
//!     "white": {"username": "gandalf868", "result": "win"},
//!     "black": {"username": "x", "rating": 1500},
//!     "accuracies": {"white": 0.9, "black": 0.8}
//! }"#);
//! let agg = aggregate(&[game], "gandalf868");
//! assert_eq!(agg.summary.wins, 1);
//! assert_eq!(agg.summary.average_opponent_rating, Some(1500.0));
//! ```
//!
//! Running a session against the in-memory server:
//! ```no_run
//! use std::sync::Arc;
//!
//! use queuesync::{
//!     remote::{PushSignal, memory::InMemoryRemote},
//!     runtime::handle::{SessionConfig, spawn_session},
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let server = Arc::new(InMemoryRemote::new());
//! let id = server.enqueue("chatter", "knightrider");
//!
//! let (push_tx, push_rx) = tokio::sync::mpsc::channel(16);
//! let session = spawn_session(server.clone(), server.clone(), push_rx, SessionConfig::default());
//! session.refresh().await.expect("refresh");
//!
//! push_tx.send(PushSignal::Opened).await.expect("push");
//! session.remove_entry(id).await.expect("remove");
//! assert!(session.queue_view().expect("loaded").is_empty());
//! session.shutdown().await.expect("shutdown");
//! # }
//! ```

#![deny(missing_docs)]

/// Resource caches, snapshots and the per-key intent queue.
pub mod core;
/// Queue entry and archive request types.
pub mod entry;
/// Collaborator interfaces and the in-memory server.
pub mod remote;
/// Session runtime: mutations, push sync and the presentation handle.
pub mod runtime;
/// Game-record parsing and session statistics.
pub mod stats;
/// Shared identifiers and enums.
pub mod types;
