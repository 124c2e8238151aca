use thiserror::Error;

/// Errors raised while building, loading or saving configurations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("configuration source must be a mapping of name to settings, got {0}")]
    NotAMapping(String),

    #[error("empty configuration provided")]
    Empty,

    #[error(
        "expected exactly one configuration, found {0}; use load_configurations() for multiple"
    )]
    MultipleConfigurations(usize),

    #[error("configuration names and keys must be strings, got {0}")]
    InvalidKey(String),

    #[error("configuration '{name}' has no settings")]
    EmptySettings { name: String },

    #[error("configuration '{name}': group '{group}' is not a mapping, only depth-2 configurations allowed")]
    InvalidShape { name: String, group: String },

    #[error("configuration '{name}': a valid setting is a number, string or list, but not {key}: {value}")]
    InvalidSetting {
        name: String,
        key: String,
        value: String,
    },

    #[error("duplicate configuration name '{0}'")]
    DuplicateName(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
