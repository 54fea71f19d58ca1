//! Default paths for focusd components
//!
//! Config lives at `$XDG_CONFIG_HOME/focusd/config.toml` or
//! `~/.config/focusd/config.toml`.

use std::path::PathBuf;

/// Environment variable for overriding the config path
pub const FOCUS_CONFIG_ENV: &str = "FOCUS_CONFIG";

/// Config filename within the config directory
const CONFIG_FILENAME: &str = "config.toml";

/// Application subdirectory name
const APP_DIR: &str = "focusd";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$XDG_CONFIG_HOME/focusd/config.toml` (if XDG_CONFIG_HOME is set)
/// 2. `~/.config/focusd/config.toml` (fallback)
///
/// `$FOCUS_CONFIG` is handled by the CLI layer.
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/tmp").join(APP_DIR).join(CONFIG_FILENAME)
}
