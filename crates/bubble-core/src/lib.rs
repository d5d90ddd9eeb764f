//! bubble-core: runtime of the embeddable chat widget.
//!
//! The heart of the crate is [`stream::StreamingMessageRenderer`], which turns
//! the chat endpoint's chunked reply into display text and, once the reply is
//! complete, into at most one [`action::ActionDirective`]. The remaining
//! modules connect it to the backend and to a host UI.

pub mod action;
pub mod client;
pub mod config;
pub mod forms;
pub mod logging;
pub mod rating;
pub mod render;
pub mod session;
pub mod stream;
pub mod widget;

pub use client::WidgetClient;
pub use config::Config;
pub use widget::{ChatWidget, SendOutcome, WidgetView};
