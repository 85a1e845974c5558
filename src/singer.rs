//! Singer message decoding.
//!
//! Each input line is one JSON object tagged by `"type"`.

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    Schema {
        stream: String,
        schema: Value,
        #[serde(default)]
        key_properties: Vec<String>,
        #[serde(default)]
        bookmark_properties: Option<Vec<String>>,
    },
    Record {
        stream: String,
        record: Map<String, Value>,
        #[serde(default)]
        time_extracted: Option<String>,
        #[serde(default)]
        version: Option<i64>,
    },
    State {
        value: Value,
    },
    ActivateVersion {
        stream: String,
        version: i64,
    },
    /// Any message type this target does not act on.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, thiserror::Error)]
#[error("line {line}: invalid Singer message: {source}")]
pub struct ParseError {
    pub line: usize,
    #[source]
    pub source: serde_json::Error,
}

/// Decode one line. Returns `Ok(None)` for blank lines.
pub fn parse_message(line: &str, line_number: usize) -> Result<Option<Message>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|source| ParseError {
            line: line_number,
            source,
        })
}
