use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::Color;

/// Completed game as stored by the server: an opaque JSON document with
/// `white`/`black` player objects and an `accuracies` map keyed by color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameRecord(Value);

impl GameRecord {
    /// Wraps an already-decoded JSON document.
    pub fn new(raw: Value) -> Self {
        Self(raw)
    }

    /// Decodes the JSON text the server keeps in a record's `data` field.
    ///
    /// Text that is not valid JSON is kept verbatim as a string value, so the
    /// record is rejected by [`parse`] instead of failing the whole fetch.
    pub fn from_data(data: &str) -> Self {
        match serde_json::from_str(data) {
            Ok(raw) => Self(raw),
            Err(_) => Self(Value::String(data.to_string())),
        }
    }

    /// Underlying JSON document.
    pub fn raw(&self) -> &Value {
        &self.0
    }
}

/// Per-game figures relative to the home player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedRecord {
    /// The opponent's rating, i.e. the strength of the challenger faced.
    pub rating: f64,
    /// True when the home player won.
    pub win: bool,
    /// Home player's accuracy for the game.
    pub accuracy: f64,
}

/// Why a game record could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedRecordError {
    /// The document is not a JSON object.
    NotAnObject,
    /// Neither side's username equals the home handle.
    NotAParticipant {
        /// Handle that was looked for.
        home: String,
    },
    /// A required numeric field is absent or not a number.
    MissingField {
        /// Side the field was read from.
        color: Color,
        /// Field name (`rating` or `accuracies`).
        field: &'static str,
    },
}

impl fmt::Display for MalformedRecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "game record is not a JSON object"),
            Self::NotAParticipant { home } => {
                write!(f, "{home} played neither side of the game")
            }
            Self::MissingField { color, field } => {
                write!(f, "missing numeric field {field} for {}", color.key())
            }
        }
    }
}

impl std::error::Error for MalformedRecordError {}

/// Normalizes one game record from the point of view of `home_handle`.
///
/// White is checked first, so a record listing the home handle on both sides
/// resolves to white. `rating` is the opponent's rating.
pub fn parse(record: &GameRecord, home_handle: &str) -> Result<ParsedRecord, MalformedRecordError> {
    let doc = record.0.as_object().ok_or(MalformedRecordError::NotAnObject)?;
    let home = home_color(doc, home_handle).ok_or_else(|| MalformedRecordError::NotAParticipant {
        home: home_handle.to_string(),
    })?;
    let opponent = home.opponent();

    let win = doc
        .get(home.key())
        .and_then(|side| side.get("result"))
        .and_then(Value::as_str)
        == Some("win");

    let accuracy = doc
        .get("accuracies")
        .and_then(|acc| acc.get(home.key()))
        .and_then(Value::as_f64)
        .ok_or(MalformedRecordError::MissingField {
            color: home,
            field: "accuracies",
        })?;

    let rating = doc
        .get(opponent.key())
        .and_then(|side| side.get("rating"))
        .and_then(Value::as_f64)
        .ok_or(MalformedRecordError::MissingField {
            color: opponent,
            field: "rating",
        })?;

    Ok(ParsedRecord { rating, win, accuracy })
}

fn home_color(doc: &Map<String, Value>, home_handle: &str) -> Option<Color> {
    [Color::White, Color::Black].into_iter().find(|color| {
        doc.get(color.key())
            .and_then(|side| side.get("username"))
            .and_then(Value::as_str)
            == Some(home_handle)
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn home_as_white_takes_black_rating() {
        let rec = GameRecord::new(json!({
            "white": {"username": "gandalf868", "result": "win"},
            "black": {"username": "x", "rating": 1500},
            "accuracies": {"white": 0.9, "black": 0.8}
        }));
        let parsed = parse(&rec, "gandalf868").expect("parse");
        assert_eq!(
            parsed,
            ParsedRecord {
                rating: 1500.0,
                win: true,
                accuracy: 0.9
            }
        );
    }

    #[test]
    fn home_as_black_takes_white_rating() {
        let rec = GameRecord::new(json!({
            "white": {"username": "x", "result": "win", "rating": 1720},
            "black": {"username": "gandalf868", "result": "checkmated", "rating": 1400},
            "accuracies": {"white": 88.1, "black": 61.4}
        }));
        let parsed = parse(&rec, "gandalf868").expect("parse");
        assert_eq!(parsed.rating, 1720.0);
        assert!(!parsed.win);
        assert_eq!(parsed.accuracy, 61.4);
    }

    #[test]
    fn missing_result_is_not_a_win() {
        let rec = GameRecord::new(json!({
            "white": {"username": "gandalf868"},
            "black": {"username": "x", "rating": 900},
            "accuracies": {"white": 70, "black": 50}
        }));
        assert!(!parse(&rec, "gandalf868").expect("parse").win);
    }

    #[test]
    fn stranger_game_is_rejected() {
        let rec = GameRecord::new(json!({
            "white": {"username": "a", "rating": 1},
            "black": {"username": "b", "rating": 2},
            "accuracies": {"white": 1, "black": 2}
        }));
        assert_eq!(
            parse(&rec, "gandalf868"),
            Err(MalformedRecordError::NotAParticipant {
                home: "gandalf868".to_string()
            })
        );
    }

    #[test]
    fn non_numeric_fields_are_rejected() {
        let rec = GameRecord::new(json!({
            "white": {"username": "gandalf868", "result": "win"},
            "black": {"username": "x", "rating": "1500"},
            "accuracies": {"white": 0.9}
        }));
        assert_eq!(
            parse(&rec, "gandalf868"),
            Err(MalformedRecordError::MissingField {
                color: Color::Black,
                field: "rating"
            })
        );

        let rec = GameRecord::new(json!({
            "white": {"username": "gandalf868", "result": "win"},
            "black": {"username": "x", "rating": 1500}
        }));
        assert_eq!(
            parse(&rec, "gandalf868"),
            Err(MalformedRecordError::MissingField {
                color: Color::White,
                field: "accuracies"
            })
        );
    }

    #[test]
    fn undecodable_data_is_kept_and_rejected_at_parse() {
        let rec = GameRecord::from_data("{not json");
        assert_eq!(rec.raw(), &Value::String("{not json".to_string()));
        assert_eq!(parse(&rec, "gandalf868"), Err(MalformedRecordError::NotAnObject));
    }
}
