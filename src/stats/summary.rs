use std::fmt;

use tracing::warn;

use super::parse::{GameRecord, ParsedRecord, parse};

/// Session statistics folded from parsed records.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Summary {
    /// Games the home player won.
    pub wins: usize,
    /// Every other game (losses and draws).
    pub losses: usize,
    /// Mean opponent rating, `None` when there are no games.
    pub average_opponent_rating: Option<f64>,
    /// Mean home accuracy, `None` when there are no games.
    pub average_accuracy: Option<f64>,
}

/// Summary of a record set plus how many records were skipped as malformed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aggregate {
    /// Statistics over the records that parsed.
    pub summary: Summary,
    /// Records rejected by [`parse`].
    pub skipped: usize,
}

/// Folds parsed records into a [`Summary`].
pub fn summarize(records: &[ParsedRecord]) -> Summary {
    let wins = records.iter().filter(|r| r.win).count();
    Summary {
        wins,
        losses: records.len() - wins,
        average_opponent_rating: mean(records.iter().map(|r| r.rating)),
        average_accuracy: mean(records.iter().map(|r| r.accuracy)),
    }
}

/// Parses every record for `home_handle` and summarizes the ones that parse.
///
/// A malformed record is logged and skipped; it never aborts the pass.
pub fn aggregate(records: &[GameRecord], home_handle: &str) -> Aggregate {
    let mut parsed = Vec::with_capacity(records.len());
    let mut skipped = 0usize;

    for (idx, record) in records.iter().enumerate() {
        match parse(record, home_handle) {
            Ok(p) => parsed.push(p),
            Err(err) => {
                warn!(index = idx, error = %err, "skipping malformed game record");
                skipped += 1;
            }
        }
    }

    Aggregate {
        summary: summarize(&parsed),
        skipped,
    }
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    Some(values.sum::<f64>() / n as f64)
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Win: {} Losses: {} Average Chatter Rating: ", self.wins, self.losses)?;
        match self.average_opponent_rating {
            Some(avg) => write!(f, "{}", avg.trunc() as i64),
            None => f.write_str("-"),
        }
    }
}
