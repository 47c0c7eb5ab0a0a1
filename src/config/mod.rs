mod settings;

pub use settings::{Config, TomlConfig, DEFAULT_RECENT_EVENTS, EXAMPLE_CONFIG};
