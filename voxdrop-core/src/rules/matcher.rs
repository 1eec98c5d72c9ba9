//! Rule lookup for a wave file: directory identity, file pattern, content.

use std::path::Path;

use tracing::debug;

use crate::error::{EngineError, Result};
use crate::identity::DirIdentity;
use crate::pipeline::relocate::companion_text;

use super::encoding::DecodedText;
use super::{Rule, RuleSet};

/// First rule accepting a wave file, with the companion text decoded in the
/// rule's encoding.
#[derive(Debug)]
pub struct RuleMatch<'a> {
    pub index: usize,
    pub rule: &'a Rule,
    pub text: String,
}

impl RuleSet {
    /// Find the first rule whose directory, file name and content predicate
    /// all accept `wav_path`.
    ///
    /// A missing or unreadable companion text is an error for this path.
    /// `Ok(None)` means no rule applies and the caller should skip the file.
    pub fn find(&self, wav_path: &Path) -> Result<Option<RuleMatch<'_>>> {
        let dir = wav_path.parent().unwrap_or_else(|| Path::new("."));
        let dir_id = DirIdentity::of(dir)?;
        let file_name = wav_path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default();

        let txt_path = companion_text(wav_path);
        let raw = std::fs::read(&txt_path).map_err(|source| {
            EngineError::MissingText {
                path: txt_path.clone(),
                source,
            }
        })?;
        let mut decoded = DecodedText::default();

        for (index, rule) in self.rules().iter().enumerate() {
            debug!(rule = index + 1, "checking rule");

            match DirIdentity::of(&rule.expanded_dir) {
                Ok(rule_id) if rule_id == dir_id => {}
                Ok(_) => {
                    debug!(
                        want = %rule.expanded_dir.display(),
                        got = %dir.display(),
                        "directory does not match"
                    );
                    continue;
                }
                Err(err) => {
                    debug!(
                        dir = %rule.expanded_dir.display(),
                        error = %err,
                        "rule directory unavailable"
                    );
                    continue;
                }
            }

            if !rule.file.is_match(&file_name) {
                debug!(
                    filename = %file_name,
                    pattern = rule.file.source(),
                    "file name does not match"
                );
                continue;
            }

            if let Some(text_re) = &rule.text {
                match decoded.get(rule.encoding, &raw) {
                    Ok(text) if text_re.is_match(text) => {}
                    Ok(_) => {
                        debug!("text does not match the content regex");
                        continue;
                    }
                    Err(err) => {
                        debug!(error = %err, "text decoding failed");
                        continue;
                    }
                }
            }

            debug!(rule = index + 1, "rule matched");
            let text = decoded
                .get(rule.encoding, &raw)
                .map_err(|err| EngineError::InvalidText {
                    path: txt_path.clone(),
                    reason: err.to_string(),
                })?
                .to_string();
            return Ok(Some(RuleMatch { index, rule, text }));
        }

        Ok(None)
    }
}
