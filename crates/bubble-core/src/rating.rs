//! Satisfaction rating: inactivity timer and prompt decisions.
//!
//! The prompt is offered at most once per session, either after a period
//! without user messages or when the chat is closed. Remote state
//! (`has_rated`) is consulted first, but a failed lookup never suppresses it.

use std::fmt;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tracing::warn;

use crate::config::RatingConfig;

/// Answer given to the rating prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingChoice {
    Rated(u8),
    Dismissed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRating(pub String);

impl fmt::Display for InvalidRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid rating '{}', expected 1-5", self.0)
    }
}

impl std::error::Error for InvalidRating {}

impl RatingChoice {
    /// Parses prompt input: `1`..`5` rates, an empty answer dismisses.
    pub fn parse(input: &str) -> Result<Self, InvalidRating> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Self::Dismissed);
        }
        match input.parse::<u8>() {
            Ok(stars @ 1..=5) => Ok(Self::Rated(stars)),
            _ => Err(InvalidRating(input.to_string())),
        }
    }
}

/// Decides whether to show the prompt.
///
/// `shown_locally` is the stored "already offered" flag; `remote` is the
/// result of the `has_rated` lookup, if one was made.
pub fn should_prompt(shown_locally: bool, remote: Option<anyhow::Result<bool>>) -> bool {
    if shown_locally {
        return false;
    }
    match remote {
        Some(Ok(has_rated)) => !has_rated,
        Some(Err(err)) => {
            warn!(error = %err, "Rating status lookup failed, showing prompt anyway");
            true
        }
        None => true,
    }
}

/// Fires once after a quiet period; rearmed by [`InactivityTimer::reset`].
#[derive(Debug, Clone)]
pub struct InactivityTimer {
    timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl InactivityTimer {
    /// A zero timeout creates a timer that never fires.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout: (!timeout.is_zero()).then_some(timeout),
            deadline: None,
        }
    }

    pub fn from_config(config: &RatingConfig) -> Self {
        if config.enabled {
            Self::new(Duration::from_secs(config.inactivity_secs))
        } else {
            Self::new(Duration::ZERO)
        }
    }

    /// Starts or restarts the countdown.
    pub fn reset(&mut self) {
        self.deadline = self.timeout.map(|timeout| Instant::now() + timeout);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Completes when the countdown runs out. Pends forever while disarmed.
    ///
    /// The timer stays armed; call [`cancel`](Self::cancel) after handling.
    pub async fn expired(&self) {
        match self.deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}
