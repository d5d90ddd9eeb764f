//! Line-level parsing of the widget chat stream.
//!
//! The chat endpoint answers with server-sent events whose data is a small
//! JSON object or the literal `[DONE]` terminator. Events reach the renderer
//! re-framed as `data: ` lines:
//!
//! ```text
//! data: {"response": "Hel", "session_id": "abc"}
//! data: {"response": "lo"}
//! data: [DONE]
//! ```

use serde::Deserialize;

const DATA_PREFIX: &str = "data: ";
const DONE_TOKEN: &str = "[DONE]";

/// Fields the widget understands in a stream payload. Anything else (for
/// example the server timestamp) is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StreamPayload {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One classified protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLine {
    Payload(StreamPayload),
    Done,
    /// A `data: ` line whose JSON could not be parsed.
    Malformed { data: String, reason: String },
    /// Blank lines, comments and anything without the data prefix.
    Ignored,
}

/// Classifies a single protocol line.
pub fn parse_line(line: &str) -> StreamLine {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return StreamLine::Ignored;
    };
    if data.trim() == DONE_TOKEN {
        return StreamLine::Done;
    }
    match serde_json::from_str::<StreamPayload>(data) {
        Ok(payload) => StreamLine::Payload(payload),
        Err(err) => StreamLine::Malformed {
            data: data.to_string(),
            reason: err.to_string(),
        },
    }
}
