//! Local MaxMind GeoLite2-City database loading for [`crate::geo::MaxmindProvider`].
//!
//! The database file itself is operator-provided (MaxMind requires a
//! license to redistribute it) — this module only resolves where to find
//! it and opens it, it never fetches one over the network.

use std::path::PathBuf;

use directories::ProjectDirs;
use maxminddb::Reader;

use crate::utils::error::{ProxyError, ProxyResult};

const GEOLITEDB_FILENAME: &str = "GeoLite2-City.mmdb";
const GEOLITEDB_PATH_ENV: &str = "GEOLITE_DB_PATH";

/// Resolution order: `GEOLITE_DB_PATH` env var, then `./data/GeoLite2-City.mmdb`,
/// then the platform data directory (`ProjectDirs`).
fn candidate_paths() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(configured) = std::env::var(GEOLITEDB_PATH_ENV) {
        candidates.push(PathBuf::from(configured));
    }
    candidates.push(PathBuf::from("data").join(GEOLITEDB_FILENAME));
    if let Some(project_dir) = ProjectDirs::from("dev", "proxy-harvester", "proxy-harvester") {
        candidates.push(project_dir.data_dir().join(GEOLITEDB_FILENAME));
    }
    candidates
}

/// Opens the first readable GeoLite2-City database found among the
/// candidate paths. Returns `Ok(None)` (not an error) when none exist —
/// the geolocation test degrades gracefully without a local database, per
/// the validator's "never panics, subtest fails with a zero subscore"
/// contract (spec §4.4.7).
pub async fn open_geolite_db() -> ProxyResult<Option<Reader<Vec<u8>>>> {
    for path in candidate_paths() {
        if !path.exists() {
            continue;
        }
        match Reader::open_readfile(&path) {
            Ok(reader) => return Ok(Some(reader)),
            Err(e) => {
                log::warn!("found {} but failed to open it: {}", path.display(), e);
            }
        }
    }
    log::debug!(
        "no GeoLite2-City database found (set {} to point at one); geolocation subtest will report unavailable",
        GEOLITEDB_PATH_ENV
    );
    Ok(None)
}
