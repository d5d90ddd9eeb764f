//! Configuration loading and persistence.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use url::Url;

pub mod paths {
    //! Path resolution for bubble configuration and state.
    //!
    //! BUBBLE_HOME resolution order:
    //! 1. BUBBLE_HOME environment variable (if set)
    //! 2. ~/.config/bubble (default)

    use std::path::PathBuf;

    /// Returns the bubble home directory.
    pub fn bubble_home() -> PathBuf {
        if let Ok(home) = std::env::var("BUBBLE_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir()
            .map_or_else(|| PathBuf::from(".bubble"), |h| h.join(".config").join("bubble"))
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        bubble_home().join("config.toml")
    }

    /// Returns the path to the session state file.
    pub fn state_path() -> PathBuf {
        bubble_home().join("state.json")
    }
}

/// Returns the commented config template embedded at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// Merges user config values into the default template, so comments and
/// sections from the template stay present while user values win.
fn merge_with_template(user_config: &str) -> Result<String> {
    use toml_edit::DocumentMut;

    let mut doc: DocumentMut = default_config_template()
        .parse()
        .context("Failed to parse default config template")?;
    let user_doc: DocumentMut = user_config.parse().context("Failed to parse user config")?;

    merge_items(doc.as_table_mut(), user_doc.as_table());

    Ok(doc.to_string())
}

fn merge_items(target: &mut toml_edit::Table, source: &toml_edit::Table) {
    use toml_edit::Item;

    for (key, value) in source.iter() {
        match value {
            Item::Value(v) => {
                target[key] = Item::Value(v.clone());
            }
            Item::Table(src_table) => {
                if let Some(Item::Table(target_table)) = target.get_mut(key) {
                    merge_items(target_table, src_table);
                } else {
                    target[key] = Item::Table(src_table.clone());
                }
            }
            Item::ArrayOfTables(src_arr) => {
                target[key] = Item::ArrayOfTables(src_arr.clone());
            }
            Item::None => {}
        }
    }
}

/// How bot replies are turned into a displayable body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Markdown,
    Plain,
}

/// Satisfaction prompt settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    pub enabled: bool,
    /// Seconds without a user message before the prompt appears; 0 disables
    /// the timer.
    pub inactivity_secs: u64,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            inactivity_secs: 180,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter used when BUBBLE_LOG is unset.
    pub level: String,
    /// Log file; stderr when absent.
    pub file: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base: String,
    pub api_key: Option<String>,
    pub history_window: usize,
    pub render: RenderMode,
    pub rating: RatingConfig,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: Self::DEFAULT_API_BASE.to_string(),
            api_key: None,
            history_window: Self::DEFAULT_HISTORY_WINDOW,
            render: RenderMode::default(),
            rating: RatingConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    pub const DEFAULT_API_BASE: &str = "http://localhost:5000";
    pub const DEFAULT_HISTORY_WINDOW: usize = 6;

    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Applies command-line / environment overrides. Empty values are ignored.
    #[must_use]
    pub fn with_overrides(mut self, api_key: Option<String>, api_base: Option<String>) -> Self {
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key.trim().to_string());
        }
        if let Some(base) = api_base.filter(|b| !b.trim().is_empty()) {
            self.api_base = base.trim().to_string();
        }
        self
    }

    /// Returns the validated API base URL.
    pub fn api_base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.api_base)
            .with_context(|| format!("Invalid api_base '{}'", self.api_base))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("api_base must be an http(s) URL, got '{}'", self.api_base);
        }
        Ok(url)
    }

    /// Returns the configured api key or an error explaining how to set one.
    pub fn require_api_key(&self) -> Result<&str> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => bail!(
                "No api key configured. Pass --api-key, set BUBBLE_API_KEY, or run `bubble config set-key <KEY>`"
            ),
        }
    }

    /// Creates a config file with the default template. Fails if it exists.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Saves only the api_key field to the config file.
    pub fn save_api_key(api_key: &str) -> Result<()> {
        Self::save_api_key_to(&paths::config_path(), api_key)
    }

    /// Saves only the api_key field to a specific config file path.
    ///
    /// Creates the file from the template if it doesn't exist; otherwise the
    /// user's values and comments are kept.
    pub fn save_api_key_to(path: &Path, api_key: &str) -> Result<()> {
        use toml_edit::{DocumentMut, value};

        let contents = if path.exists() {
            let user_config = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            merge_with_template(&user_config)?
        } else {
            default_config_template().to_string()
        };

        let mut doc: DocumentMut = contents
            .parse()
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        doc["api_key"] = value(api_key);

        Self::write_config(path, &doc.to_string())
    }

    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}
