//! Durable job log (spec §4.6): JSON file loaded on start, flushed on
//! graceful shutdown, same idiom as [`crate::store::snapshot`].

use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::scheduler::ValidationJob;
use crate::utils::error::{ProxyError, ProxyResult};

pub async fn load(path: impl AsRef<Path>) -> ProxyResult<Vec<ValidationJob>> {
    let path = path.as_ref();
    match tokio::fs::File::open(path).await {
        Ok(mut file) => {
            let mut contents = String::new();
            file.read_to_string(&mut contents).await.map_err(ProxyError::Network)?;
            let jobs: Vec<ValidationJob> = serde_json::from_str(&contents)?;
            log::info!("loaded {} persisted jobs from {}", jobs.len(), path.display());
            Ok(jobs)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(ProxyError::Network(e)),
    }
}

pub async fn save(path: impl AsRef<Path>, jobs: &[ValidationJob]) -> ProxyResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(ProxyError::Network)?;
    }
    let json = serde_json::to_vec_pretty(jobs)?;
    let tmp_path = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path).await.map_err(ProxyError::Network)?;
    file.write_all(&json).await.map_err(ProxyError::Network)?;
    file.flush().await.map_err(ProxyError::Network)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(ProxyError::Network)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::JobState;
    use crate::validator::TestLevel;
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn save_then_load_round_trips_jobs() {
        let dir = std::env::temp_dir().join(format!("proxy-rs-scheduler-test-{}", Uuid::new_v4()));
        let path = dir.join("jobs.json");

        let job = ValidationJob {
            job_id: Uuid::new_v4(),
            proxies: vec![Uuid::new_v4()],
            test_level: TestLevel::Standard,
            priority: 5,
            created_at: Utc::now(),
            scheduled_at: Utc::now(),
            completed_at: None,
            state: JobState::Pending,
            auto_retry_failed: false,
            retries_remaining: 2,
            results: Vec::new(),
            error: None,
        };

        save(&path, &[job.clone()]).await.unwrap();
        let loaded = load(&path).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].job_id, job.job_id);

        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn missing_file_loads_as_empty() {
        let jobs = load("/nonexistent/path/jobs.json").await.unwrap();
        assert!(jobs.is_empty());
    }
}
