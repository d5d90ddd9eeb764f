//! Conversation state for one widget instance and its on-disk persistence.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of the conversation, in the shape the chat endpoint expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

/// Server-assigned session id plus the local conversation history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSession {
    pub session_id: Option<String>,
    pub history: Vec<HistoryEntry>,
}

impl StreamSession {
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.history.push(HistoryEntry {
            role,
            content: content.into(),
        });
    }

    /// The last `window` history entries, oldest first.
    pub fn recent_history(&self, window: usize) -> &[HistoryEntry] {
        let start = self.history.len().saturating_sub(window);
        &self.history[start..]
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WidgetRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    /// Sessions for which the rating prompt has been offered. Only the
    /// current session is kept once the id changes or is cleared.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    rating_shown: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredState {
    #[serde(default)]
    widgets: BTreeMap<String, WidgetRecord>,
}

/// Small JSON file remembering session ids and rating prompts per api key.
///
/// Plays the part `localStorage` plays for the browser widget, so a restarted
/// terminal chat continues the same server-side session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
    state: StoredState,
}

impl SessionStore {
    /// Opens the store at the default state path.
    pub fn open() -> Result<Self> {
        Self::open_at(crate::config::paths::state_path())
    }

    /// Opens the store at `path`. A missing file is an empty store.
    pub fn open_at(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read state from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse state from {}", path.display()))?
        } else {
            StoredState::default()
        };
        Ok(Self { path, state })
    }

    pub fn session_id(&self, api_key: &str) -> Option<&str> {
        self.state
            .widgets
            .get(api_key)
            .and_then(|record| record.session_id.as_deref())
    }

    pub fn set_session_id(&mut self, api_key: &str, session_id: &str) -> Result<()> {
        let record = self.state.widgets.entry(api_key.to_string()).or_default();
        if record.session_id.as_deref() == Some(session_id) {
            return Ok(());
        }
        record.session_id = Some(session_id.to_string());
        record.rating_shown.retain(|id| id == session_id);
        self.save()
    }

    /// Forgets the session id so the next message starts a new session.
    pub fn clear_session(&mut self, api_key: &str) -> Result<()> {
        if let Some(record) = self.state.widgets.get_mut(api_key) {
            record.session_id = None;
            record.rating_shown.clear();
            return self.save();
        }
        Ok(())
    }

    pub fn rating_shown(&self, api_key: &str, session_id: &str) -> bool {
        self.state
            .widgets
            .get(api_key)
            .is_some_and(|record| record.rating_shown.contains(session_id))
    }

    pub fn mark_rating_shown(&mut self, api_key: &str, session_id: &str) -> Result<()> {
        let record = self.state.widgets.entry(api_key.to_string()).or_default();
        if record.rating_shown.insert(session_id.to_string()) {
            self.save()?;
        }
        Ok(())
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let contents =
            serde_json::to_string_pretty(&self.state).context("Failed to serialize state")?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, contents)
            .with_context(|| format!("Failed to write state to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                self.path.display()
            )
        })
    }
}
