use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Watches the config file and signals whenever it is written, created or
/// replaced.
///
/// The parent directory is watched rather than the file itself, so editors
/// that save by renaming a temporary file over the original are still seen,
/// and a config created after startup is picked up.
///
/// # Example
/// ```ignore
/// let (_watcher, mut rx) = ConfigWatcher::spawn(mx_config::default_path());
/// while rx.recv().await.is_some() {
///     let config = mx_config::load(mx_config::default_path())?;
/// }
/// ```
pub struct ConfigWatcher {
    path: PathBuf,
}

impl ConfigWatcher {
    /// Spawn a filesystem watcher for `path`.
    /// Returns the watcher handle and a receiver that fires on every detected change.
    pub fn spawn(path: impl AsRef<Path>) -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        let path = path.as_ref().to_path_buf();
        let watcher = Self { path: path.clone() };

        tokio::spawn(watch_loop(path, tx));

        (watcher, rx)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Directory to watch for changes to `path`.
fn watch_root(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Whether a change to `changed` concerns the config file at `path`.
fn concerns(path: &Path, changed: &Path) -> bool {
    match (path.file_name(), changed.file_name()) {
        (Some(want), Some(got)) => want == got,
        _ => false,
    }
}

async fn watch_loop(path: PathBuf, tx: mpsc::Sender<()>) {
    use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
    use std::time::Duration;

    let (sync_tx, mut sync_rx) = mpsc::channel::<notify::Result<Event>>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res| {
            let _ = sync_tx.blocking_send(res);
        },
        Config::default().with_poll_interval(Duration::from_secs(2)),
    ) {
        Ok(w) => w,
        Err(e) => {
            error!("Failed to create filesystem watcher: {e}");
            return;
        }
    };

    let root = watch_root(&path);
    if let Err(e) = watcher.watch(&root, RecursiveMode::NonRecursive) {
        error!("Failed to watch '{}': {e}", root.display());
        return;
    }

    info!("Watching config file: {}", path.display());

    while let Some(event) = sync_rx.recv().await {
        match event {
            Ok(e) => {
                use notify::EventKind::*;
                if !matches!(e.kind, Modify(_) | Create(_)) {
                    continue;
                }
                if !e.paths.iter().any(|p| concerns(&path, p)) {
                    continue;
                }
                debug!(kind = ?e.kind, "config file changed");
                // A full channel already holds a pending reload.
                if let Err(mpsc::error::TrySendError::Closed(())) = tx.try_send(()) {
                    break;
                }
            }
            Err(e) => warn!("Watcher error: {e}"),
        }
    }
}
