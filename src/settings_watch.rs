use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::error::Result;
use crate::slideshow_controller::{SlideshowCommand, SlideshowHandle};

/// Editors often replace the file instead of writing in place, so the
/// parent directory is watched and events are matched by file name.
pub fn touches_settings_file(event: &Event, file_name: &OsStr) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|path| path.file_name() == Some(file_name))
}

/// Commands that bring a running controller in line with the file.
pub fn reload_commands(path: &Path) -> Result<Vec<SlideshowCommand>> {
    let settings = Settings::load(path)?;
    settings.slideshow.validate()?;

    let update = settings.slideshow_update();
    Ok(vec![
        SlideshowCommand::UpdateProfiles(settings.profiles),
        SlideshowCommand::Configure(update),
    ])
}

fn reload(path: &Path, handle: &SlideshowHandle) {
    let commands = match reload_commands(path) {
        Ok(commands) => commands,
        Err(e) => {
            tracing::warn!("Ignoring settings change: {}", e);
            return;
        }
    };

    tracing::info!("Settings file changed, applying");
    for command in commands {
        if let Err(e) = handle.blocking_send(command) {
            tracing::warn!("Could not apply settings: {}", e);
            break;
        }
    }
}

/// Keeps the settings file in sync with the controller until the returned
/// watcher is dropped.
pub fn watch_settings(path: &Path, handle: SlideshowHandle) -> Result<RecommendedWatcher> {
    let settings_path: PathBuf = path.to_path_buf();
    let file_name: OsString = path.file_name().map(OsStr::to_os_string).unwrap_or_default();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if touches_settings_file(&event, &file_name) => reload(&settings_path, &handle),
        Ok(_) => {}
        Err(e) => tracing::warn!("Settings watch error: {:?}", e),
    })?;

    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    tracing::info!("Watching {} for changes", path.display());
    Ok(watcher)
}
