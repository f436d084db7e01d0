pub mod error;
pub mod profile;

pub use error::*;
pub use profile::{ProfileConfig, Profiles};

use std::path::{Path, PathBuf};

/// Environment variable naming a config file directly
pub const CONFIG_PATH_ENV: &str = "NIMBUS_CONFIG_PATH";

const CANDIDATES: [&str; 2] = ["nimbus.local.yaml", "nimbus.yaml"];

/// Locate the nimbus configuration file
///
/// Search order:
/// 1. `NIMBUS_CONFIG_PATH`
/// 2. current directory: `nimbus.local.yaml`, `nimbus.yaml`
/// 3. `~/.config/nimbus/config.yaml`
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;
    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("nimbus").join("config.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Parse the profiles defined in a config file
pub fn load_profiles(path: &Path) -> Result<Profiles> {
    let content = std::fs::read_to_string(path)?;
    let profiles: Profiles = serde_yaml::from_str(&content)?;
    Ok(profiles)
}

/// Directory used by the shared token cache
pub fn cache_dir() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .ok_or(ConfigError::CacheDirNotFound)?
        .join("nimbus")
        .join("tokens");
    Ok(cache_dir)
}
