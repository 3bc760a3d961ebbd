//! Periodic JSON-file persistence for the in-memory [`ProxyStore`]
//! (SPEC_FULL.md §4.5): the same durability idiom the scheduler uses for its
//! job log (§4.6) — load once at startup, flush on an interval and on
//! graceful shutdown.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::proxy::Proxy;
use crate::store::ProxyStore;
use crate::utils::error::{ProxyError, ProxyResult};

pub struct SnapshotStore {
    pub store: Arc<ProxyStore>,
    path: PathBuf,
}

impl SnapshotStore {
    /// Loads an existing snapshot from `path` if present, otherwise starts
    /// with an empty store.
    pub async fn load(path: impl AsRef<Path>) -> ProxyResult<Self> {
        let path = path.as_ref().to_path_buf();
        let store = match tokio::fs::File::open(&path).await {
            Ok(mut file) => {
                let mut contents = String::new();
                file.read_to_string(&mut contents)
                    .await
                    .map_err(ProxyError::Network)?;
                let proxies: Vec<Proxy> = serde_json::from_str(&contents)?;
                log::info!("loaded {} proxies from snapshot {}", proxies.len(), path.display());
                ProxyStore::from_proxies(proxies)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("no snapshot at {}, starting with an empty store", path.display());
                ProxyStore::new()
            }
            Err(e) => return Err(ProxyError::Network(e)),
        };
        Ok(SnapshotStore { store: Arc::new(store), path })
    }

    pub async fn flush(&self) -> ProxyResult<()> {
        let proxies = self.store.snapshot_all();
        let json = serde_json::to_vec_pretty(&proxies)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(ProxyError::Network)?;
        }
        let tmp_path = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp_path).await.map_err(ProxyError::Network)?;
        file.write_all(&json).await.map_err(ProxyError::Network)?;
        file.flush().await.map_err(ProxyError::Network)?;
        tokio::fs::rename(&tmp_path, &self.path).await.map_err(ProxyError::Network)?;
        Ok(())
    }

    /// Spawns the periodic flush task (spec §4.5's "periodically serializes
    /// the map to a JSON file"). The returned handle is cooperative: drop it
    /// (or abort it) and call [`flush`] once more during graceful shutdown.
    pub fn spawn_periodic_flush(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = this.flush().await {
                    log::error!("periodic proxy snapshot flush failed: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    use crate::proxy::Protocol;

    #[tokio::test]
    async fn flush_then_load_round_trips_the_store() {
        let dir = std::env::temp_dir().join(format!("proxy-rs-snapshot-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("proxies.json");

        let snapshot = SnapshotStore::load(&path).await.unwrap();
        snapshot.store.upsert(Proxy::new(Ipv4Addr::new(1, 2, 3, 4), 8080, Protocol::Http, "test"));
        snapshot.flush().await.unwrap();

        let reloaded = SnapshotStore::load(&path).await.unwrap();
        assert_eq!(reloaded.store.len(), 1);

        let _ = tokio::fs::remove_dir_all(dir).await;
    }
}
