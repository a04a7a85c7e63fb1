//! Settings location resolution
//!
//! The player can be launched from a service manager where the working
//! directory is `/`, so settings are never looked up relative to the cwd.

use std::path::PathBuf;
use tracing::{debug, warn};

const APP_DIR: &str = "streamcast";

/// Get the configuration directory for streamcast.
///
/// Returns `<config dir>/streamcast/` (e.g. `~/.config/streamcast/` on Linux).
pub fn get_config_dir() -> PathBuf {
    let dir = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .unwrap_or_else(|| {
            warn!("Could not determine config directory, using /tmp");
            PathBuf::from("/tmp")
        })
        .join(APP_DIR);

    debug!("Config directory: {:?}", dir);
    dir
}

/// Default settings file: `<config dir>/streamcast/settings.json`
pub fn get_settings_path() -> PathBuf {
    get_config_dir().join("settings.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_path_is_absolute() {
        let path = get_settings_path();
        assert!(path.is_absolute());
        assert!(path.ends_with("streamcast/settings.json"));
    }
}
