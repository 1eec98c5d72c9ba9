//! Raw settings document as written in TOML.
//!
//! Every field is optional in the file. Globals fall back to the defaults
//! below, rule and asas fields fall back to the globals during resolution.

use serde::{Deserialize, Serialize};
use voxdrop_core::pipeline::sink::SortMode;
use voxdrop_core::rules::{FileMove, TextEncoding};

pub const DEFAULT_DELTA_SECS: f64 = 15.0;
pub const DEFAULT_FRESHNESS_SECS: f64 = 5.0;
pub const DEFAULT_SORT_DELAY_SECS: f64 = 0.1;
pub const DEFAULT_DEST_DIR: &str = "%PROJECTDIR%";
pub const DEFAULT_EXO_FILE: &str = "template.exo";
pub const DEFAULT_LUA_FILE: &str = "genexo.lua";
pub const DEFAULT_RULE_DIR: &str = "%TEMPDIR%";
pub const DEFAULT_RULE_FILE: &str = "*.wav";

/// Top level of `setting.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SettingsFile {
    #[serde(rename = "basedir")]
    pub base_dir: String,
    /// Seconds. `0` disables the pair modification time check.
    pub delta: f64,
    /// Seconds. `0` disables the freshness filter for created files.
    pub freshness: f64,
    #[serde(rename = "sortdelay")]
    pub sort_delay: f64,
    pub sort: SortMode,
    #[serde(rename = "filemove")]
    pub file_move: FileMove,
    #[serde(rename = "destdir")]
    pub dest_dir: String,
    #[serde(rename = "movedelay")]
    pub move_delay: f64,
    #[serde(rename = "deletetext")]
    pub delete_text: bool,
    #[serde(rename = "acceptemptytext")]
    pub accept_empty_text: bool,
    pub padding: i64,
    #[serde(rename = "exofile")]
    pub exo_file: String,
    #[serde(rename = "luafile")]
    pub lua_file: String,
    #[serde(rename = "fairycall")]
    pub fairy_call: String,
    #[serde(rename = "rule", skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<FileRule>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub asas: Vec<FileAsas>,
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self {
            base_dir: String::new(),
            delta: DEFAULT_DELTA_SECS,
            freshness: DEFAULT_FRESHNESS_SECS,
            sort_delay: DEFAULT_SORT_DELAY_SECS,
            sort: SortMode::ModDate,
            file_move: FileMove::Off,
            dest_dir: DEFAULT_DEST_DIR.to_string(),
            move_delay: 0.0,
            delete_text: false,
            accept_empty_text: false,
            padding: 0,
            exo_file: DEFAULT_EXO_FILE.to_string(),
            lua_file: DEFAULT_LUA_FILE.to_string(),
            fairy_call: String::new(),
            rules: Vec::new(),
            asas: Vec::new(),
        }
    }
}

impl SettingsFile {
    /// Parse a document, skipping a leading UTF-8 byte order mark.
    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents.strip_prefix('\u{feff}').unwrap_or(contents))
    }
}

/// One `[[rule]]` table.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct FileRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    /// Wildcard pattern. Mutually exclusive with `filere`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(rename = "filere", skip_serializing_if = "Option::is_none")]
    pub file_re: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<TextEncoding>,
    /// Content regex tested against the decoded text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifier: Option<String>,
    #[serde(rename = "userdata", skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    #[serde(rename = "filemove", skip_serializing_if = "Option::is_none")]
    pub file_move: Option<FileMove>,
    #[serde(rename = "destdir", skip_serializing_if = "Option::is_none")]
    pub dest_dir: Option<String>,
    #[serde(rename = "movedelay", skip_serializing_if = "Option::is_none")]
    pub move_delay: Option<f64>,
    #[serde(rename = "deletetext", skip_serializing_if = "Option::is_none")]
    pub delete_text: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding: Option<i64>,
    #[serde(rename = "exofile", skip_serializing_if = "Option::is_none")]
    pub exo_file: Option<String>,
    #[serde(rename = "luafile", skip_serializing_if = "Option::is_none")]
    pub lua_file: Option<String>,
}

/// One `[[asas]]` table. Only carried through for the launcher.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct FileAsas {
    #[serde(default)]
    pub exe: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<i64>,
}
