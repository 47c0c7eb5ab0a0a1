use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::client::{DEFAULT_MAX_TOKENS, DEFAULT_SIMULATOR_URL};
use crate::session::DEFAULT_PLAYBACK_INTERVAL;
use crate::trace::DEFAULT_PAGE_SIZE;
use crate::util::paths::config_path;

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("config.toml.example");

/// Number of trailing events shown in the event log view
pub const DEFAULT_RECENT_EVENTS: usize = 25;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the simulator API
    pub simulator_url: String,
    /// Tokens generated per simulation request
    pub max_tokens: u32,
    /// Page capacity used when a trace's model config has no `page_size`
    pub default_page_size: usize,
    /// Delay between frames in `play`
    pub playback_interval: Duration,
    /// How many trailing events the event log view shows
    pub recent_events: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            simulator_url: DEFAULT_SIMULATOR_URL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            default_page_size: DEFAULT_PAGE_SIZE,
            playback_interval: DEFAULT_PLAYBACK_INTERVAL,
            recent_events: DEFAULT_RECENT_EVENTS,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlSimulatorConfig {
    pub url: Option<String>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlModelConfig {
    pub default_page_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlPlaybackConfig {
    pub interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlDisplayConfig {
    pub recent_events: Option<usize>,
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub simulator: Option<TomlSimulatorConfig>,
    pub model: Option<TomlModelConfig>,
    pub playback: Option<TomlPlaybackConfig>,
    pub display: Option<TomlDisplayConfig>,
}

impl Config {
    /// Load configuration from file, merging with defaults
    pub fn load() -> Self {
        let config_file = config_path();

        // Create example config on first run
        if !config_file.exists() {
            Self::create_default_config(&config_file);
        }

        match fs::read_to_string(&config_file) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(e) => {
                tracing::debug!(
                    path = %config_file.display(),
                    error = %e,
                    "No config file loaded"
                );
                Config::default()
            }
        }
    }

    /// Parse a config file's contents over the defaults.
    ///
    /// A file that fails to parse yields the defaults.
    pub fn from_toml_str(contents: &str) -> Self {
        let mut config = Config::default();

        let toml_config = match toml::from_str::<TomlConfig>(contents) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unparseable config file");
                return config;
            }
        };

        if let Some(simulator) = toml_config.simulator {
            if let Some(url) = simulator.url {
                config.simulator_url = url;
            }
            if let Some(max_tokens) = simulator.max_tokens {
                config.max_tokens = max_tokens;
            }
        }

        if let Some(model) = toml_config.model {
            // A zero-slot page can never hold a write.
            if let Some(size) = model.default_page_size.filter(|&size| size > 0) {
                config.default_page_size = size;
            }
        }

        if let Some(playback) = toml_config.playback {
            if let Some(ms) = playback.interval_ms {
                config.playback_interval = Duration::from_millis(ms);
            }
        }

        if let Some(display) = toml_config.display {
            if let Some(recent) = display.recent_events {
                config.recent_events = recent;
            }
        }

        config
    }

    /// Create the default config file from the bundled example
    fn create_default_config(path: &Path) {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    tracing::warn!(
                        path = %parent.display(),
                        error = %e,
                        "Failed to create config directory"
                    );
                    return;
                }
            }
        }

        if let Err(e) = fs::write(path, EXAMPLE_CONFIG) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write default config");
        }
    }

    pub fn with_simulator_url(mut self, url: impl Into<String>) -> Self {
        self.simulator_url = url.into();
        self
    }
}
