//! Settings for voxdrop.
//!
//! The settings document (`setting.toml`) is parsed into [`models`] with
//! every field defaulted, then validated and resolved by [`loader`] into the
//! rule set and engine configuration the core consumes. [`summary`] logs what
//! was loaded.

pub mod error;
pub mod loader;
pub mod models;
pub mod summary;

pub use error::ConfigLoadError;
pub use loader::{Asas, ConfigLoad, ConfigLoader, Settings, SettingsSource};
pub use models::{FileAsas, FileRule, SettingsFile};
pub use summary::log_summary;
