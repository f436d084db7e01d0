use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine the user's cache directory")]
    CacheDirNotFound,

    #[error(
        "No configuration file found. Looked in:\n\
        - the current directory: nimbus.local.yaml, nimbus.yaml\n\
        - ~/.config/nimbus/config.yaml\n\
        Set NIMBUS_CONFIG_PATH to point at a file directly"
    )]
    ConfigFileNotFound,

    #[error("Profile '{0}' is not defined")]
    ProfileNotFound(String),

    #[error("Profile '{profile}' has no secret (set `secret` or export {env})")]
    MissingSecret { profile: String, env: String },

    #[error("Profile '{profile}' is invalid: {message}")]
    InvalidProfile { profile: String, message: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
