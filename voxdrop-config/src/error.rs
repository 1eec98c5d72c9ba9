use std::path::PathBuf;

use thiserror::Error;

/// Reasons a settings document is refused.
#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("failed to read settings {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("rule {rule}: `file` and `filere` cannot be used at the same time")]
    ConflictingFilePattern { rule: usize },

    #[error("rule {rule}: invalid `{key}` pattern")]
    InvalidPattern {
        rule: usize,
        key: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("`{key}` must be a non-negative number of seconds, got {value}")]
    InvalidDuration { key: String, value: f64 },
}

pub type Result<T> = std::result::Result<T, ConfigLoadError>;
