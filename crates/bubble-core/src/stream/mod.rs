//! Streaming reply renderer.
//!
//! A `StreamingMessageRenderer` lives for exactly one bot reply. It is fed raw
//! protocol chunks in arrival order and answers each one with the current
//! display state. When the transport ends, `finish` extracts the (at most
//! one) action directive from the full reply and records the assistant turn.

mod scanner;
mod sse;

use std::fmt;

use tracing::{debug, warn};

pub use scanner::ActionScanner;
pub use sse::{StreamLine, StreamPayload, parse_line};

use crate::action::{self, ActionDirective, ActionParseError};
use crate::render::{DisplayBody, HtmlRenderer, display_body};
use crate::session::{Role, StreamSession};

/// Categories of errors that end a reply early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorKind {
    /// The server sent an `error` payload inside the stream.
    Protocol,
    /// The chat endpoint answered with a non-success status.
    HttpStatus,
    /// The request could not be sent or the body could not be read.
    Transport,
}

impl fmt::Display for StreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamErrorKind::Protocol => write!(f, "protocol"),
            StreamErrorKind::HttpStatus => write!(f, "http_status"),
            StreamErrorKind::Transport => write!(f, "transport"),
        }
    }
}

/// Error that terminates the current reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamError {
    pub kind: StreamErrorKind,
    pub message: String,
}

impl StreamError {
    pub fn new(kind: StreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(StreamErrorKind::Protocol, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(StreamErrorKind::Transport, message)
    }

    pub fn http_status(status: u16, body: &str) -> Self {
        let body = body.trim();
        let message = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {body}")
        };
        Self::new(StreamErrorKind::HttpStatus, message)
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

impl std::error::Error for StreamError {}

/// Display state after one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderUpdate {
    /// Trimmed visible text, action blocks removed.
    pub display_text: String,
    /// What to put into the message bubble.
    pub body: DisplayBody,
    /// Session id received in this chunk; the caller should persist it.
    pub session_id: Option<String>,
    /// Whether a `[DONE]` terminator has been seen.
    pub done: bool,
}

/// Outcome of a completed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeResult {
    /// Trimmed reply text without action blocks (what goes into history).
    pub text: String,
    pub body: DisplayBody,
    pub action: Option<ActionDirective>,
}

pub struct StreamingMessageRenderer<'a> {
    session: &'a mut StreamSession,
    html: Option<&'a dyn HtmlRenderer>,
    raw: String,
    scanner: ActionScanner,
    done: bool,
}

impl<'a> StreamingMessageRenderer<'a> {
    /// Starts a new reply for `session`.
    ///
    /// With `html` set to `None` the renderer produces plain-text bodies.
    pub fn new(session: &'a mut StreamSession, html: Option<&'a dyn HtmlRenderer>) -> Self {
        Self {
            session,
            html,
            raw: String::new(),
            scanner: ActionScanner::new(),
            done: false,
        }
    }

    /// Full reply text received so far, action blocks included.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Processes one transport chunk.
    ///
    /// Malformed lines are logged and skipped. A `[DONE]` line stops
    /// processing of the rest of this chunk.
    ///
    /// # Errors
    /// Returns a protocol `StreamError` when the server reports an error;
    /// the reply should then be abandoned.
    pub fn on_chunk(&mut self, chunk: &str) -> Result<RenderUpdate, StreamError> {
        let mut session_id = None;

        for line in chunk.split('\n') {
            match parse_line(line) {
                StreamLine::Ignored => {}
                StreamLine::Done => {
                    self.done = true;
                    break;
                }
                StreamLine::Malformed { data, reason } => {
                    warn!(%reason, data = %data, "Skipping unparseable stream line");
                }
                StreamLine::Payload(payload) => {
                    if let Some(text) = payload.response {
                        self.raw.push_str(&text);
                    }
                    if let Some(id) = payload.session_id.filter(|id| !id.is_empty()) {
                        debug!(session_id = %id, "Received session id");
                        self.session.session_id = Some(id.clone());
                        session_id = Some(id);
                    }
                    if let Some(message) = payload.error {
                        return Err(StreamError::protocol(message));
                    }
                }
            }
        }

        self.scanner.advance(&self.raw);
        let display_text = self.scanner.visible().trim().to_string();
        let body = display_body(self.html, &display_text);

        Ok(RenderUpdate {
            display_text,
            body,
            session_id,
            done: self.done,
        })
    }

    /// Completes the reply.
    ///
    /// Parses the first action block of the full reply, renders the final
    /// text and appends it to the session history when non-empty. Action
    /// parse failures are logged and yield no directive.
    pub fn finish(self) -> FinalizeResult {
        let action = match action::extract_directive(&self.raw) {
            Ok(action) => action,
            Err(ActionParseError::UnknownType(kind)) => {
                debug!(kind = ?kind, "Ignoring action block with unsupported type");
                None
            }
            Err(err) => {
                warn!(error = %err, "Failed to parse action block");
                None
            }
        };

        let text = self.scanner.finish(&self.raw).trim().to_string();
        let body = display_body(self.html, &text);

        if !text.is_empty() {
            self.session.push(Role::Assistant, text.clone());
        }

        FinalizeResult { text, body, action }
    }
}
