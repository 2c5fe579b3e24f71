//! Daemon settings – reads `/etc/rackd/rackd.toml`.

use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

/// Daemon settings loaded at startup. Every field has a default, so a
/// missing settings file means "run with defaults", not an error.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    /// Address the command server listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Path of the rack topology document (JSON).
    #[serde(default = "default_rack_config")]
    pub rack_config: PathBuf,
}

fn default_listen_addr() -> String {
    rackd_server::DEFAULT_LISTEN.to_string()
}

fn default_rack_config() -> PathBuf {
    PathBuf::from("/etc/rackd/rack.json")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            rack_config: default_rack_config(),
        }
    }
}

/// Return the settings file path, honouring the `RACKD_SETTINGS` override.
pub fn settings_path() -> PathBuf {
    match std::env::var("RACKD_SETTINGS") {
        Ok(p) => PathBuf::from(p),
        Err(_) => PathBuf::from("/etc/rackd/rackd.toml"),
    }
}

/// Load settings from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Settings>, String> {
    load_from(&settings_path())
}

/// Load settings from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Settings>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read settings at {}: {}", path.display(), e))?;
    let mut settings: Settings =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse settings: {}", e))?;
    apply_env_overrides(&mut settings);
    Ok(Some(settings))
}

/// Apply `RACKD_*` environment variable overrides to `settings`.
///
/// Supported variables:
///
/// | Variable | Settings field |
/// |---|---|
/// | `RACKD_LISTEN` | `listen_addr` |
/// | `RACKD_RACK_CONFIG` | `rack_config` |
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(v) = std::env::var("RACKD_LISTEN") {
        settings.listen_addr = v;
    }
    if let Ok(v) = std::env::var("RACKD_RACK_CONFIG") {
        settings.rack_config = PathBuf::from(v);
    }
}
