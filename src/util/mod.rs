//! Utility modules

pub mod paths;

pub use paths::{
    config_path, data_dir, ensure_data_dirs, init_data_dir, log_file_path, logs_dir,
    trace_file_path, traces_dir,
};
