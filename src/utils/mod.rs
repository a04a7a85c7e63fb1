//! Utility modules for error handling and configuration

pub mod config;
pub mod error;
pub mod paths;

// Re-export for convenience
pub use config::{PlayerSettings, TimeoutSettings};
pub use error::{Result, StreamcastError};
pub use paths::{get_config_dir, get_settings_path};
