//! Where kvtrace keeps its config, logs and saved traces.
//!
//! Everything hangs off one data directory, `~/.kvtrace` unless overridden at startup.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::OnceLock;

const DATA_DIR_NAME: &str = ".kvtrace";

static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Fix the data directory for this process. Only the first call takes effect.
pub fn init_data_dir(custom_path: Option<PathBuf>) {
    let Some(path) = custom_path else {
        return;
    };
    if let Err(rejected) = DATA_DIR.set(path) {
        tracing::debug!(
            path = %rejected.display(),
            current = %data_dir().display(),
            "Data directory already set; ignoring override"
        );
    }
}

fn default_data_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(DATA_DIR_NAME),
        None => PathBuf::from(DATA_DIR_NAME),
    }
}

pub fn data_dir() -> PathBuf {
    DATA_DIR.get().cloned().unwrap_or_else(default_data_dir)
}

pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

pub fn log_file_path() -> PathBuf {
    logs_dir().join("kvtrace.log")
}

/// Default destination for `simulate` output
pub fn traces_dir() -> PathBuf {
    data_dir().join("traces")
}

/// `traces/trace-<stamp>.json`
pub fn trace_file_path(stamp: u64) -> PathBuf {
    traces_dir().join(format!("trace-{stamp}.json"))
}

pub fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}

/// Create the log and trace directories if missing.
pub fn ensure_data_dirs() -> io::Result<()> {
    fs::create_dir_all(logs_dir())?;
    fs::create_dir_all(traces_dir())
}
