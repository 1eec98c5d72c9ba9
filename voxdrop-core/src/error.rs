use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::sink::SinkError;
use crate::transform::TransformError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid wave file {path}: {reason}")]
    InvalidWave { path: PathBuf, reason: String },

    #[error("Companion text file unreadable {path}: {source}")]
    MissingText {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Companion text undecodable {path}: {reason}")]
    InvalidText { path: PathBuf, reason: String },

    #[error("Directory identity unavailable for {path}: {source}")]
    DirIdentity {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Relocation failed: {0}")]
    Relocation(String),

    #[error("Transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("Delivery sink failed: {0}")]
    Sink(#[from] SinkError),

    #[error("Editing host unavailable: {0}")]
    HostUnavailable(String),

    #[error("File watch failed: {0}")]
    Watch(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
