//! Startup summary written to the log after every (re)load.

use tracing::{info, warn};
use voxdrop_core::host::{ProbeError, ProjectSnapshot};
use voxdrop_core::rules::FileMove;

use crate::loader::Settings;

/// Log the host project, placeholders, timings, fairy call, launcher
/// entries and rules. Returns how many warnings were emitted.
pub fn log_summary(settings: &Settings, project: &Result<ProjectSnapshot, ProbeError>) -> usize {
    let mut warnings = 0;

    match project {
        Err(err) => {
            warn!(error = %err, "editing host not found");
            warnings += 1;
        }
        Ok(snapshot) if !snapshot.has_project() => {
            warn!("no project is open in the editing host");
            warnings += 1;
        }
        Ok(snapshot) => {
            if snapshot.api_version < 1 {
                warn!(
                    api_version = snapshot.api_version,
                    "host drop API is too old, project paths are unavailable"
                );
                warnings += 1;
            }
            info!(
                project = ?snapshot.project_path().map(|p| p.display().to_string()),
                window = snapshot.window,
                width = snapshot.width,
                height = snapshot.height,
                video_rate = snapshot.video_rate,
                video_scale = snapshot.video_scale,
                audio_rate = snapshot.audio_rate,
                audio_channels = snapshot.audio_channels,
                flags = snapshot.flags,
                "editing host project"
            );
        }
    }

    for (key, value) in settings.placeholders.entries() {
        info!(placeholder = key, value, "placeholder");
    }

    let engine = &settings.engine;
    info!(
        delta = ?engine.delta,
        freshness = ?engine.freshness,
        sort_delay = ?engine.sort_delay,
        sort = %engine.sort,
        accept_empty_text = engine.accept_empty_text,
        "timing"
    );

    match &settings.fairy_call {
        Some(key) => info!(key = %key, "fairy call enabled"),
        None => info!("fairy call disabled, no hotkey configured"),
    }

    for (index, asas) in settings.asas.iter().enumerate() {
        info!(
            asas = index + 1,
            exe = %asas.exe.display(),
            filter = %asas.filter,
            folder = %asas.expanded_folder.display(),
            format = %asas.format,
            flags = asas.flags,
            "launcher entry"
        );
        if !asas.exists() {
            warn!(asas = index + 1, exe = %asas.exe.display(), "executable not found, entry ignored");
            warnings += 1;
        }
    }

    for (index, rule) in settings.rules.rules().iter().enumerate() {
        info!(
            rule = index + 1,
            dir = %rule.expanded_dir.display(),
            file = rule.file.source(),
            encoding = %rule.encoding,
            text = rule.text.as_ref().map(|re| re.as_str()),
            layer = rule.layer,
            modifier = rule.modifier.is_some(),
            user_data = %rule.user_data,
            padding = rule.padding,
            exo_file = %rule.exo_file,
            lua_file = %rule.lua_file,
            file_move = %rule.file_move,
            dest_dir = ?(rule.file_move != FileMove::Off).then(|| rule.expanded_dest_dir.display().to_string()),
            delete_text = rule.delete_text,
            "rule"
        );
        if !rule.dir_exists() {
            warn!(
                rule = index + 1,
                dir = %rule.expanded_dir.display(),
                "watched directory not found, rule ignored"
            );
            warnings += 1;
        }
    }

    if settings.rules.is_empty() {
        warn!("no rules configured, nothing will be delivered");
        warnings += 1;
    }

    warnings
}
