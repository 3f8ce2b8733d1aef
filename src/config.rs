use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::contact::CONTACT_NUMBER;
use crate::stopwatch::DEFAULT_TICK;

/// Name of the per-user and per-project settings directory
pub const CONFIG_DIR: &str = ".espaco";

/// A validation error in the configuration
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.field, self.message)
    }
}

/// Where the account list lives
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("users.json")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Stopwatch refresh settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StopwatchConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_tick_ms() -> u64 {
    DEFAULT_TICK.as_millis() as u64
}

impl Default for StopwatchConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
        }
    }
}

/// Messaging contact opened from the promotional cards
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContactConfig {
    #[serde(default = "default_contact_number")]
    pub number: String,
}

fn default_contact_number() -> String {
    CONTACT_NUMBER.to_string()
}

impl Default for ContactConfig {
    fn default() -> Self {
        Self {
            number: default_contact_number(),
        }
    }
}

/// Activity journal settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JournalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Defaults to `.espaco/sessions` under the working directory
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default = "default_title")]
    pub title: String,
}

fn default_title() -> String {
    "Espaço Fitness Academia".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub stopwatch: StopwatchConfig,
    #[serde(default)]
    pub contact: ContactConfig,
    #[serde(default)]
    pub journal: JournalConfig,
}

/// One config file as written on disk: every field optional so that a
/// layer only overrides what it mentions.
#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigLayer {
    #[serde(default)]
    app: AppLayer,
    #[serde(default)]
    store: StoreLayer,
    #[serde(default)]
    stopwatch: StopwatchLayer,
    #[serde(default)]
    contact: ContactLayer,
    #[serde(default)]
    journal: JournalLayer,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct AppLayer {
    title: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct StoreLayer {
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct StopwatchLayer {
    tick_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ContactLayer {
    number: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct JournalLayer {
    enabled: Option<bool>,
    dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from default paths
    /// Priority: local (.espaco/config.local.toml) > project (.espaco/config.toml) > user (~/.espaco/config.toml)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(CONFIG_DIR).join("config.toml");
            if user_config.exists() {
                config.merge_file(&user_config)?;
            }
        }

        let project_config = Path::new(CONFIG_DIR).join("config.toml");
        if project_config.exists() {
            config.merge_file(&project_config)?;
        }

        // Should be gitignored
        let local_config = Path::new(CONFIG_DIR).join("config.local.toml");
        if local_config.exists() {
            config.merge_file(&local_config)?;
        }

        Ok(config)
    }

    /// Load configuration from a specific path, over the built-in defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Parse a TOML document over the built-in defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config = Self::default();
        config.merge(toml::from_str(content)?);
        Ok(config)
    }

    fn merge_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let layer: ConfigLayer = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        self.merge(layer);
        Ok(())
    }

    /// Merge a layer into this config (the layer wins for every field it sets)
    fn merge(&mut self, other: ConfigLayer) {
        if let Some(title) = other.app.title {
            self.app.title = title;
        }
        if let Some(path) = other.store.path {
            self.store.path = path;
        }
        if let Some(tick_ms) = other.stopwatch.tick_ms {
            self.stopwatch.tick_ms = tick_ms;
        }
        if let Some(number) = other.contact.number {
            self.contact.number = number;
        }
        if let Some(enabled) = other.journal.enabled {
            self.journal.enabled = enabled;
        }
        if other.journal.dir.is_some() {
            self.journal.dir = other.journal.dir;
        }
    }

    /// Refresh interval for the stopwatch worker
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.stopwatch.tick_ms)
    }

    /// Journal directory, resolved against `root` when not configured
    pub fn journal_dir(&self, root: &Path) -> PathBuf {
        self.journal
            .dir
            .clone()
            .unwrap_or_else(|| root.join(CONFIG_DIR).join("sessions"))
    }

    /// Validate configuration and return any errors found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.store.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "store.path".to_string(),
                message: "Must not be empty".to_string(),
            });
        }

        if !(1..=1000).contains(&self.stopwatch.tick_ms) {
            errors.push(ValidationError {
                field: "stopwatch.tick_ms".to_string(),
                message: format!("Must be between 1 and 1000, got {}", self.stopwatch.tick_ms),
            });
        }

        if self.contact.number.trim().is_empty() {
            errors.push(ValidationError {
                field: "contact.number".to_string(),
                message: "Must not be empty".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
