//! `%NAME%` placeholder expansion for rule directories.

use std::path::{Path, PathBuf};

pub const BASE_DIR: &str = "%BASEDIR%";
pub const TEMP_DIR: &str = "%TEMPDIR%";
pub const PROJECT_DIR: &str = "%PROJECTDIR%";
pub const PROFILE: &str = "%PROFILE%";
pub const DESKTOP: &str = "%DESKTOP%";
pub const MY_DOCUMENTS: &str = "%MYDOC%";

/// Values substituted into rule `dir` / `destdir` strings.
///
/// Expansion is a single left-to-right pass: substituted values are never
/// rescanned, so a value containing `%` cannot trigger a second expansion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Placeholders {
    pub base_dir: String,
    pub temp_dir: String,
    pub project_dir: String,
    pub profile: String,
    pub desktop: String,
    pub documents: String,
}

impl Placeholders {
    /// Placeholder/value pairs in display order.
    pub fn entries(&self) -> [(&'static str, &str); 6] {
        [
            (BASE_DIR, self.base_dir.as_str()),
            (TEMP_DIR, self.temp_dir.as_str()),
            (PROJECT_DIR, self.project_dir.as_str()),
            (PROFILE, self.profile.as_str()),
            (DESKTOP, self.desktop.as_str()),
            (MY_DOCUMENTS, self.documents.as_str()),
        ]
    }

    pub fn expand(&self, raw: &str) -> String {
        let entries = self.entries();
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;

        'scan: while let Some(pos) = rest.find('%') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            for (key, value) in entries {
                if tail.starts_with(key) {
                    out.push_str(value);
                    rest = &tail[key.len()..];
                    continue 'scan;
                }
            }
            out.push('%');
            rest = &tail[1..];
        }
        out.push_str(rest);
        out
    }

    pub fn expand_path(&self, raw: &str) -> PathBuf {
        PathBuf::from(self.expand(raw))
    }

    /// Project directory derived from the host's open project file.
    pub fn with_project_file(mut self, project_file: Option<&Path>) -> Self {
        self.project_dir = project_file
            .and_then(Path::parent)
            .map(|dir| dir.to_string_lossy().into_owned())
            .unwrap_or_default();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Placeholders {
        Placeholders {
            base_dir: "/base".into(),
            temp_dir: "/tmp/vox".into(),
            project_dir: "/proj".into(),
            profile: "/home/me".into(),
            desktop: "/home/me/Desktop".into(),
            documents: "/home/me/Documents".into(),
        }
    }

    #[test]
    fn expands_known_placeholders() {
        let p = sample();
        assert_eq!(p.expand("%TEMPDIR%/out"), "/tmp/vox/out");
        assert_eq!(p.expand("%PROJECTDIR%"), "/proj");
        assert_eq!(p.expand("%BASEDIR%/%MYDOC%"), "/base//home/me/Documents");
    }

    #[test]
    fn leaves_unknown_and_stray_percent_signs() {
        let p = sample();
        assert_eq!(p.expand("%UNKNOWN%/a"), "%UNKNOWN%/a");
        assert_eq!(p.expand("100%"), "100%");
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let p = Placeholders {
            base_dir: "%TEMPDIR%".into(),
            ..sample()
        };
        assert_eq!(p.expand("%BASEDIR%"), "%TEMPDIR%");
    }

    #[test]
    fn project_dir_follows_project_file() {
        let p = sample().with_project_file(Some(Path::new("/work/show/a.aup")));
        assert_eq!(p.project_dir, "/work/show");
        let p = p.with_project_file(None);
        assert_eq!(p.project_dir, "");
    }
}
