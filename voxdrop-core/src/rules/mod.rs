//! User rules: which watched files are delivered, and how.
//!
//! Rules are evaluated in declared order and the first full match wins
//! (see [`RuleSet::find`]).

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::identity::DirIdentity;

pub mod encoding;
pub mod matcher;

pub use encoding::{DecodeError, TextEncoding, UnknownEncoding};
pub use matcher::RuleMatch;

/// What happens to a matched pair before delivery.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileMove {
    #[default]
    Off,
    Copy,
    Move,
}

impl FileMove {
    pub fn as_str(self) -> &'static str {
        match self {
            FileMove::Off => "off",
            FileMove::Copy => "copy",
            FileMove::Move => "move",
        }
    }
}

impl fmt::Display for FileMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File name predicate. A rule uses either a wildcard or an explicit regex.
#[derive(Clone)]
pub enum FilePattern {
    Wildcard { source: String, regex: Regex },
    Regex(Regex),
}

impl FilePattern {
    /// Compile `*` / `?` wildcard syntax. Every other character is literal
    /// and the pattern is anchored at both ends.
    pub fn wildcard(source: &str) -> Result<Self, regex::Error> {
        let mut pattern = String::with_capacity(source.len() + 16);
        pattern.push('^');
        let mut literal = String::new();
        for ch in source.chars() {
            match ch {
                '*' | '?' => {
                    pattern.push_str(&regex::escape(&literal));
                    literal.clear();
                    pattern.push_str(if ch == '*' {
                        r"[^/\\]*?"
                    } else {
                        r"[^/\\]"
                    });
                }
                _ => literal.push(ch),
            }
        }
        pattern.push_str(&regex::escape(&literal));
        pattern.push('$');

        Ok(FilePattern::Wildcard {
            source: source.to_string(),
            regex: Regex::new(&pattern)?,
        })
    }

    pub fn regex(source: &str) -> Result<Self, regex::Error> {
        Regex::new(source).map(FilePattern::Regex)
    }

    pub fn is_match(&self, file_name: &str) -> bool {
        match self {
            FilePattern::Wildcard { regex, .. } | FilePattern::Regex(regex) => {
                regex.is_match(file_name)
            }
        }
    }

    pub fn source(&self) -> &str {
        match self {
            FilePattern::Wildcard { source, .. } => source,
            FilePattern::Regex(regex) => regex.as_str(),
        }
    }
}

impl fmt::Debug for FilePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilePattern::Wildcard { source, .. } => {
                f.debug_tuple("Wildcard").field(source).finish()
            }
            FilePattern::Regex(regex) => {
                f.debug_tuple("Regex").field(&regex.as_str()).finish()
            }
        }
    }
}

/// One resolved rule. Directory placeholders are already expanded.
#[derive(Clone, Debug)]
pub struct Rule {
    /// Watched directory as written in the settings document.
    pub dir: String,
    pub expanded_dir: PathBuf,
    pub file: FilePattern,
    pub encoding: TextEncoding,
    /// Optional content predicate tested against the decoded text.
    pub text: Option<Regex>,
    pub layer: i64,
    /// Lua source run against the transform context.
    pub modifier: Option<String>,
    pub user_data: String,
    pub exo_file: String,
    pub lua_file: String,
    pub file_move: FileMove,
    pub dest_dir: String,
    pub expanded_dest_dir: PathBuf,
    pub move_delay: Duration,
    pub delete_text: bool,
    pub padding: i64,
}

impl Rule {
    /// Rule with defaults for everything but the directory and file
    /// pattern, for callers that build rule sets programmatically.
    pub fn new(dir: impl Into<PathBuf>, file: FilePattern) -> Self {
        let expanded_dir = dir.into();
        Self {
            dir: expanded_dir.to_string_lossy().into_owned(),
            expanded_dir,
            file,
            encoding: TextEncoding::ShiftJis,
            text: None,
            layer: 1,
            modifier: None,
            user_data: String::new(),
            exo_file: "template.exo".to_string(),
            lua_file: "genexo.lua".to_string(),
            file_move: FileMove::Off,
            dest_dir: String::new(),
            expanded_dest_dir: PathBuf::new(),
            move_delay: Duration::ZERO,
            delete_text: false,
            padding: 0,
        }
    }

    pub fn dir_exists(&self) -> bool {
        self.expanded_dir.is_dir()
    }
}

/// Ordered rule list.
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Existing rule directories, one entry per physical directory, sorted.
    pub fn watch_dirs(&self) -> Vec<PathBuf> {
        let mut seen = Vec::<DirIdentity>::new();
        let mut dirs = BTreeSet::new();
        for rule in &self.rules {
            let Ok(id) = DirIdentity::of(&rule.expanded_dir) else {
                continue;
            };
            if seen.contains(&id) {
                continue;
            }
            seen.push(id);
            dirs.insert(rule.expanded_dir.clone());
        }
        dirs.into_iter().collect()
    }

    /// Rules whose directory does not exist and is therefore not watched.
    pub fn missing_dirs(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|rule| !rule.dir_exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn wildcard_matches_whole_name_only() {
        let pattern = FilePattern::wildcard("*.wav").unwrap();
        assert!(pattern.is_match("a.wav"));
        assert!(pattern.is_match(".wav"));
        assert!(!pattern.is_match("a.wav.bak"));
        assert!(!pattern.is_match("a.WAV"));
    }

    #[test]
    fn wildcard_escapes_regex_metacharacters() {
        let pattern = FilePattern::wildcard("voice(1)+?.wav").unwrap();
        assert!(pattern.is_match("voice(1)+a.wav"));
        assert!(!pattern.is_match("voice1a.wav"));
        assert!(!pattern.is_match("voice(1)+ab.wav"));
    }

    #[test]
    fn wildcard_does_not_cross_separators() {
        let pattern = FilePattern::wildcard("*_x.wav").unwrap();
        assert!(!pattern.is_match("dir/a_x.wav"));
        assert!(pattern.is_match("a_x.wav"));
    }

    #[test]
    fn explicit_regex_is_unanchored() {
        let pattern = FilePattern::regex(r"^\d+_").unwrap();
        assert!(pattern.is_match("123_hello.wav"));
        assert!(!pattern.is_match("hello.wav"));
        assert_eq!(pattern.source(), r"^\d+_");
    }

    #[test]
    fn watch_dirs_deduplicates_physical_directories() {
        let tmp = tempdir().unwrap();
        let out = tmp.path().join("out");
        std::fs::create_dir(&out).unwrap();

        let wav = || FilePattern::wildcard("*.wav").unwrap();
        let rules = RuleSet::new(vec![
            Rule::new(&out, wav()),
            Rule::new(out.join("."), wav()),
            Rule::new(tmp.path().join("missing"), wav()),
        ]);

        assert_eq!(rules.watch_dirs(), vec![out.clone()]);
        assert_eq!(rules.missing_dirs().count(), 1);
    }
}
