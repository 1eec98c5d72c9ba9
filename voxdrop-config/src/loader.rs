//! Reading `setting.toml` and resolving it into engine types.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::UserDirs;
use regex::Regex;
use tracing::{debug, warn};
use voxdrop_core::EngineConfig;
use voxdrop_core::placeholders::Placeholders;
use voxdrop_core::rules::{FilePattern, Rule, RuleSet, TextEncoding};

use crate::error::{ConfigLoadError, Result};
use crate::models::{
    DEFAULT_RULE_DIR, DEFAULT_RULE_FILE, FileAsas, FileRule, SettingsFile,
};

/// Where the loaded settings came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsSource {
    File(PathBuf),
    /// The settings file does not exist yet. Defaults with no rules.
    Missing(PathBuf),
}

/// Launcher entry for an external audio-save helper. Not used by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asas {
    pub exe: PathBuf,
    pub filter: String,
    pub folder: String,
    pub expanded_folder: PathBuf,
    pub format: String,
    pub flags: i64,
}

impl Asas {
    pub fn exists(&self) -> bool {
        self.exe.is_file()
    }
}

/// Fully resolved settings for one engine run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub engine: EngineConfig,
    pub rules: RuleSet,
    pub asas: Vec<Asas>,
    pub placeholders: Placeholders,
    /// Hotkey that summons the fairy adapters, if configured.
    pub fairy_call: Option<String>,
}

impl Settings {
    /// Validate `doc` and expand its directories with `placeholders`.
    ///
    /// `placeholders.base_dir` is replaced by the document's `basedir`.
    pub fn resolve(doc: SettingsFile, mut placeholders: Placeholders) -> Result<Self> {
        placeholders.base_dir = doc.base_dir.clone();

        let delta = seconds("delta", doc.delta)?;
        let freshness = seconds("freshness", doc.freshness)?;
        let sort_delay = seconds("sortdelay", doc.sort_delay)?;
        seconds("movedelay", doc.move_delay)?;

        let engine = EngineConfig {
            delta: (!delta.is_zero()).then_some(delta),
            freshness: (!freshness.is_zero()).then_some(freshness),
            sort_delay,
            sort: doc.sort,
            accept_empty_text: doc.accept_empty_text,
            ..EngineConfig::default()
        };

        let rules = doc
            .rules
            .iter()
            .enumerate()
            .map(|(index, raw)| resolve_rule(index + 1, raw, &doc, &placeholders))
            .collect::<Result<Vec<_>>>()?;

        let asas = doc
            .asas
            .iter()
            .map(|raw| resolve_asas(raw, &placeholders))
            .collect();

        Ok(Self {
            engine,
            rules: RuleSet::new(rules),
            asas,
            placeholders,
            fairy_call: Some(doc.fairy_call).filter(|key| !key.trim().is_empty()),
        })
    }
}

/// A loaded document plus its provenance.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub settings: Settings,
    pub source: SettingsSource,
}

/// Loads the settings file at a fixed path.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: PathBuf,
    temp_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            temp_dir: temp_dir.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Read, parse and resolve the settings file. `project_file` feeds
    /// `%PROJECTDIR%`.
    ///
    /// A missing file is not an error: the run continues without rules.
    pub fn load(&self, project_file: Option<&Path>) -> Result<ConfigLoad> {
        let (doc, source) = match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let doc = SettingsFile::parse(&contents).map_err(|source| {
                    ConfigLoadError::Parse {
                        path: self.path.clone(),
                        source,
                    }
                })?;
                (doc, SettingsSource::File(self.path.clone()))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(
                    path = %self.path.display(),
                    "settings file not found, create it to start watching"
                );
                (SettingsFile::default(), SettingsSource::Missing(self.path.clone()))
            }
            Err(source) => {
                return Err(ConfigLoadError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let settings = Settings::resolve(doc, self.placeholders(project_file))?;
        debug!(rules = settings.rules.len(), asas = settings.asas.len(), "settings resolved");
        Ok(ConfigLoad { settings, source })
    }

    fn placeholders(&self, project_file: Option<&Path>) -> Placeholders {
        let user = UserDirs::new();
        let folder = |pick: fn(&UserDirs) -> Option<&Path>| {
            user.as_ref()
                .and_then(pick)
                .map(|dir| dir.to_string_lossy().into_owned())
                .unwrap_or_default()
        };

        Placeholders {
            base_dir: String::new(),
            temp_dir: self.temp_dir.to_string_lossy().into_owned(),
            project_dir: String::new(),
            profile: folder(home_dir),
            desktop: folder(UserDirs::desktop_dir),
            documents: folder(UserDirs::document_dir),
        }
        .with_project_file(project_file)
    }
}

fn home_dir(dirs: &UserDirs) -> Option<&Path> {
    Some(dirs.home_dir())
}

fn seconds(key: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigLoadError::InvalidDuration {
        key: key.to_string(),
        value,
    })
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn resolve_rule(
    index: usize,
    raw: &FileRule,
    doc: &SettingsFile,
    placeholders: &Placeholders,
) -> Result<Rule> {
    let file = match (non_empty(&raw.file), non_empty(&raw.file_re)) {
        (Some(_), Some(_)) => {
            return Err(ConfigLoadError::ConflictingFilePattern { rule: index });
        }
        (None, Some(re)) => FilePattern::regex(re).map_err(|source| {
            ConfigLoadError::InvalidPattern {
                rule: index,
                key: "filere",
                source,
            }
        })?,
        (file, None) => FilePattern::wildcard(file.unwrap_or(DEFAULT_RULE_FILE)).map_err(
            |source| ConfigLoadError::InvalidPattern {
                rule: index,
                key: "file",
                source,
            },
        )?,
    };

    let text = non_empty(&raw.text)
        .map(Regex::new)
        .transpose()
        .map_err(|source| ConfigLoadError::InvalidPattern {
            rule: index,
            key: "text",
            source,
        })?;

    let move_delay = match raw.move_delay {
        Some(value) => seconds(&format!("rule[{index}].movedelay"), value)?,
        None => seconds("movedelay", doc.move_delay)?,
    };

    let dir = raw.dir.clone().unwrap_or_else(|| DEFAULT_RULE_DIR.to_string());
    let dest_dir = raw.dest_dir.clone().unwrap_or_else(|| doc.dest_dir.clone());

    let mut rule = Rule::new(placeholders.expand_path(&dir), file);
    rule.dir = dir;
    rule.encoding = raw.encoding.unwrap_or(TextEncoding::ShiftJis);
    rule.text = text;
    rule.layer = raw.layer.unwrap_or(1);
    rule.modifier = non_empty(&raw.modifier).map(str::to_string);
    rule.user_data = raw.user_data.clone().unwrap_or_default();
    rule.exo_file = raw.exo_file.clone().unwrap_or_else(|| doc.exo_file.clone());
    rule.lua_file = raw.lua_file.clone().unwrap_or_else(|| doc.lua_file.clone());
    rule.file_move = raw.file_move.unwrap_or(doc.file_move);
    rule.expanded_dest_dir = placeholders.expand_path(&dest_dir);
    rule.dest_dir = dest_dir;
    rule.move_delay = move_delay;
    rule.delete_text = raw.delete_text.unwrap_or(doc.delete_text);
    rule.padding = raw.padding.unwrap_or(doc.padding);
    Ok(rule)
}

fn resolve_asas(raw: &FileAsas, placeholders: &Placeholders) -> Asas {
    let exe = PathBuf::from(&raw.exe);
    let folder = raw.folder.clone().unwrap_or_else(|| DEFAULT_RULE_DIR.to_string());
    let stem = exe
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    Asas {
        filter: raw.filter.clone().unwrap_or_else(|| "*.wav".to_string()),
        expanded_folder: placeholders.expand_path(&folder),
        folder,
        format: raw.format.clone().unwrap_or_else(|| format!("{stem}_*.wav")),
        flags: raw
            .flags
            .unwrap_or(if raw.format.is_some() { 1 } else { 3 }),
        exe,
    }
}
