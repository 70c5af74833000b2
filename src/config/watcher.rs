//! File watcher for hot reload of policy data.
//!
//! The blacklist and the classifier model are reloaded through this watcher.
//! The reload callback is expected to build a fresh snapshot and swap it in;
//! a failed reload must leave the current snapshot untouched.
//!
//! The parent directory is watched rather than the file, so a file replaced
//! by rename (as editors and deploy tools do) keeps triggering reloads.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use notify::{Watcher, RecursiveMode, Event, RecommendedWatcher, Config};

/// A watcher that invokes a reload callback when a file changes.
pub struct FileWatcher {
    path: PathBuf,
    label: &'static str,
}

impl FileWatcher {
    /// Create a new FileWatcher. `label` names the watched data in logs.
    pub fn new(path: &Path, label: &'static str) -> Self {
        Self {
            path: path.to_path_buf(),
            label,
        }
    }

    /// Directory to watch and the file name to look for in it.
    fn watch_target(&self) -> (PathBuf, Option<OsString>) {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        (dir, self.path.file_name().map(|name| name.to_os_string()))
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for as long as reloads are wanted.
    pub fn run<F>(self, reload: F) -> Result<RecommendedWatcher, notify::Error>
    where
        F: Fn(&Path) + Send + 'static,
    {
        let (dir, file_name) = self.watch_target();
        let path = self.path.clone();
        let label = self.label;

        let mut watcher = RecommendedWatcher::new(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    let ours = event
                        .paths
                        .iter()
                        .any(|changed| changed.file_name() == file_name.as_deref());
                    if ours {
                        tracing::info!(what = label, path = ?path, "File change detected, reloading...");
                        reload(&path);
                    }
                }
                Err(e) => tracing::error!(what = label, "Watch error: {:?}", e),
            }
        }, Config::default().with_poll_interval(Duration::from_secs(2)))?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(what = self.label, path = ?self.path, dir = ?dir, "File watcher started");
        Ok(watcher)
    }
}
