//! Configuration file watcher for hot reload.
//!
//! Editors usually emit several modify events per save; a config is only
//! forwarded when it differs from the last one sent.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::ClientConfig;

/// Watches one configuration file and sends validated, changed configs.
#[derive(Clone)]
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ClientConfig>,
    last_sent: Arc<Mutex<Option<ClientConfig>>>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ClientConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
            last_sent: Arc::new(Mutex::new(None)),
        };
        (watcher, update_rx)
    }

    /// Seed the last known config so an unchanged file is not re-sent.
    pub fn with_current(self, current: ClientConfig) -> Self {
        *self.last_sent.lock().expect("config watcher mutex poisoned") = Some(current);
        self
    }

    /// Load the file now; returns true when a changed config was sent.
    pub fn reload_now(&self) -> Result<bool, ConfigError> {
        let config = load_config(&self.path)?;
        let mut last_sent = self.last_sent.lock().expect("config watcher mutex poisoned");
        if last_sent.as_ref() == Some(&config) {
            tracing::debug!(path = ?self.path, "Config file unchanged, skipping reload");
            return Ok(false);
        }
        *last_sent = Some(config.clone());
        // A closed receiver means nobody applies updates any more.
        Ok(self.update_tx.send(config).is_ok())
    }

    /// Start watching the file. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();
        let handler = self.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    match handler.reload_now() {
                        Ok(true) => tracing::info!(path = ?handler.path, "Config file changed, update sent"),
                        Ok(false) => {}
                        Err(e) => tracing::error!(
                            error = %e,
                            "Failed to reload config, keeping current configuration"
                        ),
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}
