//! Config file hot-reload (spec §6.3: "changes ... picked up without a
//! process restart") backed by the `notify` crate's filesystem watcher
//! rather than polling `fs::metadata` by hand.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::config::dynamic::{ConfigSection, DynamicConfig};
use crate::config::parser;

#[derive(Debug, Clone)]
pub enum WatcherEvent {
    ConfigChanged {
        section: ConfigSection,
        old_value: serde_json::Value,
        new_value: serde_json::Value,
    },
    Error(String),
}

/// Watches a single config file and emits one [`WatcherEvent`] per changed
/// section on every write.
pub struct ConfigWatcher {
    config_path: PathBuf,
    // Held only to keep the underlying OS watch alive for the process lifetime.
    _watcher: RecommendedWatcher,
    fs_events: std::sync::mpsc::Receiver<notify::Result<Event>>,
}

impl ConfigWatcher {
    pub fn new<P: AsRef<Path>>(config_path: P) -> Result<Self, notify::Error> {
        let config_path = config_path.as_ref().to_path_buf();
        let (fs_tx, fs_events) = std::sync::mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = fs_tx.send(res);
        })?;

        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
        } else {
            watcher.watch(Path::new("."), RecursiveMode::NonRecursive)?;
        }

        log::info!("config watcher started for {:?}", config_path);
        Ok(ConfigWatcher { config_path, _watcher: watcher, fs_events })
    }

    /// Spawns a blocking relay task bridging notify's sync callback onto a
    /// tokio channel, and a second task that reads the file and diffs it
    /// against `baseline` whenever a relevant write arrives.
    pub fn start_watching(self, baseline: DynamicConfig) -> Receiver<WatcherEvent> {
        let (tx, rx) = mpsc::channel(100);
        let ConfigWatcher { config_path, _watcher, fs_events } = self;
        let relay_path = config_path.clone();

        let (relay_tx, mut relay_rx) = mpsc::channel::<()>(16);
        std::thread::spawn(move || {
            while let Ok(res) = fs_events.recv() {
                match res {
                    Ok(event) if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) => {
                        if event.paths.iter().any(|p| p.file_name() == relay_path.file_name()) {
                            if relay_tx.blocking_send(()).is_err() {
                                break;
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        });

        tokio::spawn(async move {
            // Keeps the OS-level watch alive for as long as this task runs.
            let _watcher = _watcher;
            let mut current = baseline;
            while relay_rx.recv().await.is_some() {
                // Debounce: editors often emit several events per save.
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                match Self::read_changes(&config_path, &current) {
                    Ok((next, changes)) => {
                        current = next;
                        for change in changes {
                            if tx
                                .send(WatcherEvent::ConfigChanged {
                                    section: change.section,
                                    old_value: change.old_value,
                                    new_value: change.new_value,
                                })
                                .await
                                .is_err()
                            {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        if tx.send(WatcherEvent::Error(e.to_string())).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        rx
    }

    fn read_changes(
        config_path: &Path,
        current: &DynamicConfig,
    ) -> crate::utils::error::ProxyResult<(DynamicConfig, Vec<parser::ConfigChange>)> {
        let content = std::fs::read_to_string(config_path)
            .map_err(|e| crate::utils::error::ProxyError::Config(format!("failed to read {:?}: {}", config_path, e)))?;
        let toml_config = parser::parse_toml_config(&content)?;
        let mut next = current.clone();
        let changes = parser::update_dynamic_config(&mut next, &toml_config)?;
        next.validate()?;
        Ok((next, changes))
    }
}

/// Spawns the watcher and applies every change it reports to `shared_config`
/// until the process exits or the channel closes.
pub async fn start_config_watcher<P: AsRef<Path>>(
    config_path: P,
    shared_config: Arc<RwLock<DynamicConfig>>,
) -> Result<(), notify::Error> {
    let config_path = config_path.as_ref().to_path_buf();
    if !config_path.exists() {
        log::info!("no config file at {:?}; hot-reload watcher idle", config_path);
        return Ok(());
    }

    let baseline = shared_config.read().clone();
    let watcher = ConfigWatcher::new(&config_path)?;
    let mut events = watcher.start_watching(baseline);

    while let Some(event) = events.recv().await {
        match event {
            WatcherEvent::ConfigChanged { section, new_value, .. } => {
                let mut config = shared_config.write();
                match config.update_section(section, new_value) {
                    Ok(()) => log::info!("config section '{}' reloaded", section),
                    Err(e) => log::error!("failed to apply reloaded config: {}", e),
                }
            }
            WatcherEvent::Error(error) => {
                log::error!("config watcher error: {}", error);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watcher_errors_on_missing_directory() {
        let result = ConfigWatcher::new("/definitely/not/a/real/path/config.toml");
        assert!(result.is_err());
    }
}
