//! Config file and recipe directory watcher for hot-reload support.

use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

use notify::{EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, error, info, warn};

use crate::error::Result;

const RELOAD_SETTLE_DELAY: Duration = Duration::from_millis(100);
const DEBOUNCE_DURATION: Duration = Duration::from_millis(500);

/// What changed on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadReason {
    Config,
    Recipes,
}

pub struct ReloadWatcher {
    _watcher_thread: std::thread::JoinHandle<()>,
    _bridge_thread: std::thread::JoinHandle<()>,
}

impl ReloadWatcher {
    /// Watch `config_file` and every existing directory in `recipe_dirs`.
    pub fn spawn(
        config_file: PathBuf,
        recipe_dirs: Vec<PathBuf>,
        tx: tokio_mpsc::UnboundedSender<ReloadReason>,
    ) -> Self {
        let (sync_tx, sync_rx) = mpsc::channel::<ReloadReason>();

        let watcher_thread = std::thread::spawn(move || {
            if let Err(e) = watch(&config_file, &recipe_dirs, &sync_tx) {
                error!("Reload watcher error: {e}");
            }
        });

        let bridge_thread = std::thread::spawn(move || {
            for reason in sync_rx {
                debug!("{:?} changed on disk, sending reload notification", reason);
                // Editors write in several steps; let the file settle
                std::thread::sleep(RELOAD_SETTLE_DELAY);
                if tx.send(reason).is_err() {
                    debug!("Reload receiver dropped, stopping watcher");
                    break;
                }
            }
        });

        Self {
            _watcher_thread: watcher_thread,
            _bridge_thread: bridge_thread,
        }
    }
}

/// Drops events that arrive within the debounce window of the previous one.
struct Debounce {
    last: Mutex<Option<Instant>>,
}

impl Debounce {
    fn new() -> Self {
        Self {
            last: Mutex::new(None),
        }
    }

    fn ready(&self) -> bool {
        let mut last = self.last.lock();
        let now = Instant::now();
        match *last {
            Some(previous) if now.duration_since(previous) <= DEBOUNCE_DURATION => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

fn classify(event: &notify::Event, config_file: &Path) -> Option<ReloadReason> {
    if !matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    ) {
        return None;
    }

    if event
        .paths
        .iter()
        .any(|p| p == config_file || p.file_name() == config_file.file_name())
    {
        Some(ReloadReason::Config)
    } else {
        Some(ReloadReason::Recipes)
    }
}

fn watch(
    config_file: &Path,
    recipe_dirs: &[PathBuf],
    tx: &mpsc::Sender<ReloadReason>,
) -> Result<()> {
    let config_debounce = Arc::new(Debounce::new());
    let recipe_debounce = Arc::new(Debounce::new());
    let config_for_closure = config_file.to_path_buf();

    let (watcher_tx, watcher_rx) = mpsc::channel();

    let mut watcher =
        notify::recommended_watcher(move |result: notify::Result<notify::Event>| match result {
            Ok(event) => {
                let Some(reason) = classify(&event, &config_for_closure) else {
                    return;
                };
                let debounce = match reason {
                    ReloadReason::Config => &config_debounce,
                    ReloadReason::Recipes => &recipe_debounce,
                };
                if debounce.ready() {
                    let _ = watcher_tx.send(reason);
                }
            }
            Err(e) => error!("Watcher error: {}", e),
        })?;

    if let Some(parent) = config_file.parent() {
        watcher.watch(parent, RecursiveMode::NonRecursive)?;
        info!("Watching config directory: {:?}", parent);
    }

    for dir in recipe_dirs {
        if !dir.is_dir() {
            debug!("Recipe directory does not exist, not watching: {:?}", dir);
            continue;
        }
        match watcher.watch(dir, RecursiveMode::Recursive) {
            Ok(()) => info!("Watching recipe directory: {:?}", dir),
            Err(e) => warn!("Failed to watch recipe directory {:?}: {}", dir, e),
        }
    }

    while let Ok(reason) = watcher_rx.recv() {
        let _ = tx.send(reason);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind};

    fn event(kind: EventKind, path: &str) -> notify::Event {
        notify::Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_classify_config_change() {
        let config = Path::new("/home/fish/.config/touchfish/config.json");
        let modified = event(
            EventKind::Modify(ModifyKind::Any),
            "/home/fish/.config/touchfish/config.json",
        );
        assert_eq!(classify(&modified, config), Some(ReloadReason::Config));
    }

    #[test]
    fn test_classify_recipe_change() {
        let config = Path::new("/home/fish/.config/touchfish/config.json");
        let created = event(
            EventKind::Create(CreateKind::File),
            "/home/fish/.config/touchfish/recipes/weather/recipe.json",
        );
        assert_eq!(classify(&created, config), Some(ReloadReason::Recipes));
    }

    #[test]
    fn test_classify_ignores_access() {
        let config = Path::new("/c/config.json");
        let access = event(EventKind::Access(notify::event::AccessKind::Any), "/c/config.json");
        assert_eq!(classify(&access, config), None);
    }

    #[test]
    fn test_debounce_drops_bursts() {
        let debounce = Debounce::new();
        assert!(debounce.ready());
        assert!(!debounce.ready());
    }
}
