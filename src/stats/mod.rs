//! Record aggregation: per-game parsing and session summaries.

/// Game-record blob and per-record parsing.
pub mod parse;
/// Folding parsed records into session statistics.
pub mod summary;

pub use parse::{GameRecord, MalformedRecordError, ParsedRecord, parse};
pub use summary::{Aggregate, Summary, aggregate, summarize};
