//! User transforms run against a matched pair before delivery.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

pub mod lua;

pub use lua::LuaTransform;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("script failed: {0}")]
    Script(String),

    #[error("script produced an invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl From<mlua::Error> for TransformError {
    fn from(e: mlua::Error) -> Self {
        TransformError::Script(e.to_string())
    }
}

/// Values a transform may rewrite, plus the read-only wave location.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransformContext {
    pub layer: i64,
    pub text: String,
    /// Output file name. Changing it renames the pair on disk.
    pub filename: String,
    pub padding: i64,
    pub user_data: String,
    pub exo_file: String,
    pub lua_file: String,
    wave: PathBuf,
    original_filename: String,
}

impl TransformContext {
    pub fn new(wave: PathBuf) -> Self {
        let filename = wave
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            layer: 1,
            text: String::new(),
            original_filename: filename.clone(),
            filename,
            padding: 0,
            user_data: String::new(),
            exo_file: String::new(),
            lua_file: String::new(),
            wave,
        }
    }

    /// Absolute path of the wave file the transform runs against.
    pub fn wave(&self) -> &std::path::Path {
        &self.wave
    }

    pub fn original_filename(&self) -> &str {
        &self.original_filename
    }

    pub fn renamed(&self) -> bool {
        self.filename != self.original_filename
    }
}

/// Callable applied to a [`TransformContext`].
///
/// Every call must run in a fresh environment: nothing a script does may be
/// visible to the next call.
pub trait Transform: Send + Sync {
    fn apply(
        &self,
        script: &str,
        ctx: TransformContext,
    ) -> Result<TransformContext, TransformError>;
}
