use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::thread;

use crate::forester::ForestCache;

const DEFAULT_FOREST_CONFIG: &str = "forest.toml";

/// Watch the project and mark the forest stale whenever a tree source or
/// the forester config changes.
pub fn spawn_forest_watcher(root: PathBuf, config_file: Option<String>, cache: ForestCache) {
    thread::spawn(move || {
        let mut watcher: RecommendedWatcher =
            match notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    if !matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    ) {
                        return;
                    }

                    if let Some(path) = event
                        .paths
                        .iter()
                        .find(|path| is_forest_source(path, config_file.as_deref()))
                    {
                        tracing::debug!("forest source changed: {}", path.display());
                        cache.invalidate();
                    }
                }
                Err(err) => {
                    tracing::warn!("file watcher error: {err}");
                }
            }) {
                Ok(w) => w,
                Err(err) => {
                    tracing::warn!("failed to initialize file watcher: {err}");
                    return;
                }
            };

        if let Err(err) = watcher.watch(&root, RecursiveMode::Recursive) {
            tracing::warn!("failed to watch forest root {}: {err}", root.display());
            return;
        }

        tracing::info!("watching {}", root.display());
        loop {
            thread::park();
        }
    });
}

/// Tree sources and the forester config decide what `query all` returns.
pub fn is_forest_source(path: &Path, config_file: Option<&str>) -> bool {
    if path.extension().and_then(|ext| ext.to_str()) == Some("tree") {
        return true;
    }

    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };

    let config_name = config_file
        .and_then(|file| Path::new(file).file_name())
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_FOREST_CONFIG);
    name == config_name
}
