//! Moving, copying, renaming and cleaning up delivered files.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::identity::same_dir;
use crate::rules::{FileMove, Rule};

/// Companion text path for a wave path.
pub fn companion_text(wav: &Path) -> PathBuf {
    wav.with_extension("txt")
}

fn relocation_error(action: &str, path: &Path, err: std::io::Error) -> EngineError {
    EngineError::Relocation(format!("failed to {action} {}: {err}", path.display()))
}

/// File operations of one delivery attempt.
///
/// Copies and renames happen immediately and are undone by
/// [`Staging::rollback`]. Removing originals waits for [`Staging::commit`],
/// so a pair whose delivery fails is back where it started.
#[derive(Debug, Default)]
pub struct Staging {
    applied: Vec<Applied>,
    remove: Vec<PathBuf>,
    remove_delay: Duration,
}

#[derive(Debug)]
enum Applied {
    Created(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
}

impl Staging {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delete `path` once the delivery went through.
    pub fn remove_on_commit(&mut self, path: PathBuf) {
        self.remove.push(path);
    }

    /// Whether nothing has been touched or scheduled.
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty() && self.remove.is_empty()
    }

    /// Run the deferred removals. Failures are logged only: the pair was
    /// delivered already.
    pub fn commit(self) {
        if self.remove.is_empty() {
            return;
        }
        if !self.remove_delay.is_zero() {
            spawn_delayed_delete(self.remove, self.remove_delay);
            return;
        }
        for path in &self.remove {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "removed"),
                Err(err) => warn!(path = %path.display(), error = %err, "remove failed"),
            }
        }
    }

    /// Undo copies and renames, newest first.
    pub fn rollback(self) {
        for applied in self.applied.into_iter().rev() {
            let result = match &applied {
                Applied::Created(path) => std::fs::remove_file(path),
                Applied::Renamed { from, to } => std::fs::rename(to, from),
            };
            match result {
                Ok(()) => debug!(?applied, "rolled back"),
                Err(err) => warn!(?applied, error = %err, "rollback failed"),
            }
        }
    }
}

/// Copy or move the pair into the rule's destination directory.
///
/// Returns the wave path to continue with. When source and destination are
/// the same physical directory nothing is touched. Moved originals are only
/// removed when `staging` commits.
pub fn relocate(wav: &Path, rule: &Rule, staging: &mut Staging) -> Result<PathBuf> {
    if rule.file_move == FileMove::Off {
        return Ok(wav.to_path_buf());
    }

    let dest_dir = &rule.expanded_dest_dir;
    if dest_dir.as_os_str().is_empty() {
        return Err(EngineError::Relocation(format!(
            "filemove = {} needs a destination directory (is the project saved?)",
            rule.file_move
        )));
    }
    std::fs::create_dir_all(dest_dir)
        .map_err(|err| relocation_error("create", dest_dir, err))?;

    let src_dir = wav.parent().unwrap_or_else(|| Path::new("."));
    if same_dir(src_dir, dest_dir) {
        debug!(dir = %dest_dir.display(), "destination is the source directory, not relocating");
        return Ok(wav.to_path_buf());
    }

    let Some(file_name) = wav.file_name() else {
        return Err(EngineError::Relocation(format!(
            "{} has no file name",
            wav.display()
        )));
    };
    let new_wav = dest_dir.join(file_name);
    let txt = companion_text(wav);
    let new_txt = companion_text(&new_wav);

    for (from, to) in [(wav, new_wav.as_path()), (txt.as_path(), new_txt.as_path())] {
        let existed = to.exists();
        std::fs::copy(from, to).map_err(|err| relocation_error("copy", from, err))?;
        if !existed {
            staging.applied.push(Applied::Created(to.to_path_buf()));
        }
        debug!(from = %from.display(), to = %to.display(), "copied");
    }

    if rule.file_move == FileMove::Move {
        staging.remove_on_commit(wav.to_path_buf());
        staging.remove_on_commit(txt);
        staging.remove_delay = rule.move_delay;
    }

    info!(
        mode = %rule.file_move,
        from = %wav.display(),
        to = %new_wav.display(),
        "relocated file pair"
    );
    Ok(new_wav)
}

/// Rename `wav` to `new_name` and every sibling sharing its stem
/// (`a.txt`, `a.exo`, ...) to the new stem. Returns the new wave path.
pub fn rename_siblings(wav: &Path, new_name: &str, staging: &mut Staging) -> Result<PathBuf> {
    let dir = wav.parent().unwrap_or_else(|| Path::new("."));
    let new_wav = dir.join(new_name);
    if new_wav == wav {
        return Ok(new_wav);
    }
    let (Some(old_stem), Some(new_stem)) = (wav.file_stem(), Path::new(new_name).file_stem())
    else {
        return Err(EngineError::Relocation(format!(
            "cannot rename {} to {new_name:?}",
            wav.display()
        )));
    };

    let siblings: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|err| relocation_error("list", dir, err))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path != wav && path.is_file() && path.file_stem() == Some(old_stem))
        .collect();

    std::fs::rename(wav, &new_wav).map_err(|err| relocation_error("rename", wav, err))?;
    staging.applied.push(Applied::Renamed {
        from: wav.to_path_buf(),
        to: new_wav.clone(),
    });
    debug!(from = %wav.display(), to = %new_wav.display(), "renamed");

    for sibling in siblings {
        let mut name = OsString::from(new_stem);
        if let Some(ext) = sibling.extension() {
            name.push(".");
            name.push(ext);
        }
        let target = dir.join(name);
        std::fs::rename(&sibling, &target)
            .map_err(|err| relocation_error("rename", &sibling, err))?;
        debug!(from = %sibling.display(), to = %target.display(), "renamed sibling");
        staging.applied.push(Applied::Renamed {
            from: sibling,
            to: target,
        });
    }

    Ok(new_wav)
}

/// Delete `paths` after `delay` without blocking the caller. Failures are
/// logged and otherwise ignored.
pub fn spawn_delayed_delete(paths: Vec<PathBuf>, delay: Duration) {
    debug!(count = paths.len(), delay_ms = delay.as_millis() as u64, "scheduling delayed delete");
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                tokio::time::sleep(delay).await;
                for path in paths {
                    if let Err(err) = tokio::fs::remove_file(&path).await {
                        warn!(path = %path.display(), error = %err, "delayed delete failed");
                    } else {
                        debug!(path = %path.display(), "delayed delete done");
                    }
                }
            });
        }
        Err(_) => {
            std::thread::spawn(move || {
                std::thread::sleep(delay);
                for path in paths {
                    if let Err(err) = std::fs::remove_file(&path) {
                        warn!(path = %path.display(), error = %err, "delayed delete failed");
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::FilePattern;
    use tempfile::tempdir;

    fn rule(src: &Path, mode: FileMove, dest: &Path) -> Rule {
        let mut rule = Rule::new(src, FilePattern::wildcard("*.wav").unwrap());
        rule.file_move = mode;
        rule.expanded_dest_dir = dest.to_path_buf();
        rule
    }

    fn pair(dir: &Path, stem: &str) -> PathBuf {
        let wav = dir.join(format!("{stem}.wav"));
        std::fs::write(&wav, b"wav").unwrap();
        std::fs::write(companion_text(&wav), b"txt").unwrap();
        wav
    }

    #[test]
    fn companion_replaces_extension() {
        assert_eq!(companion_text(Path::new("/a/b.wav")), PathBuf::from("/a/b.txt"));
    }

    #[test]
    fn copy_keeps_sources() {
        let tmp = tempdir().unwrap();
        let dest = tmp.path().join("dest");
        let wav = pair(tmp.path(), "a");

        let mut staging = Staging::new();
        let moved = relocate(&wav, &rule(tmp.path(), FileMove::Copy, &dest), &mut staging).unwrap();
        assert_eq!(moved, dest.join("a.wav"));
        assert!(moved.exists() && dest.join("a.txt").exists());
        staging.commit();
        assert!(wav.exists() && companion_text(&wav).exists());
    }

    #[test]
    fn move_removes_sources_on_commit() {
        let tmp = tempdir().unwrap();
        let dest = tmp.path().join("dest");
        let wav = pair(tmp.path(), "a");

        let mut staging = Staging::new();
        let moved = relocate(&wav, &rule(tmp.path(), FileMove::Move, &dest), &mut staging).unwrap();
        assert_eq!(std::fs::read(&moved).unwrap(), b"wav");
        assert!(wav.exists());

        staging.commit();
        assert!(!wav.exists());
        assert!(!companion_text(&wav).exists());
    }

    #[test]
    fn rolled_back_move_restores_the_pair() {
        let tmp = tempdir().unwrap();
        let dest = tmp.path().join("dest");
        let wav = pair(tmp.path(), "a");

        let mut staging = Staging::new();
        let moved = relocate(&wav, &rule(tmp.path(), FileMove::Move, &dest), &mut staging).unwrap();
        let renamed = rename_siblings(&moved, "b.wav", &mut staging).unwrap();
        assert!(renamed.exists());

        staging.rollback();
        assert!(wav.exists() && companion_text(&wav).exists());
        assert!(!dest.join("a.wav").exists());
        assert!(!dest.join("b.wav").exists());
        assert!(!dest.join("b.txt").exists());
    }

    #[test]
    fn same_directory_is_left_alone() {
        let tmp = tempdir().unwrap();
        let wav = pair(tmp.path(), "a");
        let alias = tmp.path().join(".");

        let mut staging = Staging::new();
        let out = relocate(&wav, &rule(tmp.path(), FileMove::Move, &alias), &mut staging).unwrap();
        assert_eq!(out, wav);
        assert!(staging.is_empty());
        assert!(wav.exists());
    }

    #[test]
    fn empty_destination_is_an_error() {
        let tmp = tempdir().unwrap();
        let wav = pair(tmp.path(), "a");
        assert!(matches!(
            relocate(
                &wav,
                &rule(tmp.path(), FileMove::Copy, Path::new("")),
                &mut Staging::new()
            ),
            Err(EngineError::Relocation(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_move_deletes_later() {
        let tmp = tempdir().unwrap();
        let dest = tmp.path().join("dest");
        let wav = pair(tmp.path(), "a");
        let mut rule = rule(tmp.path(), FileMove::Move, &dest);
        rule.move_delay = Duration::from_secs(3);

        let mut staging = Staging::new();
        relocate(&wav, &rule, &mut staging).unwrap();
        staging.commit();
        assert!(wav.exists());

        tokio::time::sleep(Duration::from_secs(4)).await;
        for _ in 0..50 {
            if !wav.exists() {
                break;
            }
            tokio::task::yield_now().await;
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(!wav.exists());
        assert!(!companion_text(&wav).exists());
    }

    #[test]
    fn rename_moves_all_siblings() {
        let tmp = tempdir().unwrap();
        let wav = pair(tmp.path(), "a");
        std::fs::write(tmp.path().join("a.exo"), b"exo").unwrap();
        std::fs::write(tmp.path().join("ab.txt"), b"other").unwrap();

        let renamed = rename_siblings(&wav, "b.wav", &mut Staging::new()).unwrap();
        assert_eq!(renamed, tmp.path().join("b.wav"));
        assert!(renamed.exists());
        assert!(tmp.path().join("b.txt").exists());
        assert!(tmp.path().join("b.exo").exists());
        assert!(tmp.path().join("ab.txt").exists());
        assert!(!wav.exists());
    }

    #[test]
    fn rolled_back_rename_restores_siblings() {
        let tmp = tempdir().unwrap();
        let wav = pair(tmp.path(), "a");
        std::fs::write(tmp.path().join("a.exo"), b"exo").unwrap();

        let mut staging = Staging::new();
        rename_siblings(&wav, "b.wav", &mut staging).unwrap();
        staging.rollback();

        assert!(wav.exists());
        assert!(tmp.path().join("a.txt").exists());
        assert!(tmp.path().join("a.exo").exists());
        assert!(!tmp.path().join("b.wav").exists());
    }

    #[test]
    fn removal_waits_for_commit() {
        let tmp = tempdir().unwrap();
        let wav = pair(tmp.path(), "a");
        let txt = companion_text(&wav);

        let mut staging = Staging::new();
        staging.remove_on_commit(txt.clone());
        assert!(txt.exists());
        staging.commit();
        assert!(!txt.exists());
    }
}
