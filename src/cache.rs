//! On-disk caching for IOC source data and the merged index.
//!
//! Each source gets a data file and a metadata file; the merged index gets
//! the same pair. All files are pretty-printed JSON so they can be inspected
//! by hand.
//!
//! # Cache Location
//!
//! Resolved in priority order:
//! 1. `SUPPLYSCAN_CACHE_DIR` environment variable
//! 2. `/cache` when it exists (container convention)
//! 3. the platform cache directory, e.g. `~/.cache/supplyscan/`
//!
//! # Layout
//!
//! ```text
//! source_datadog.json        data from the datadog source
//! source_datadog_meta.json   fetch status for the datadog source
//! iocs.json                  merged IOC index
//! meta.json                  merged index metadata
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::model::{IndexMeta, IocIndex, SourceRecord, SourceStatus};

/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "SUPPLYSCAN_CACHE_DIR";

/// Fixed container-convention cache path.
const CONTAINER_CACHE_DIR: &str = "/cache";

/// Manages per-source IOC caching and merged index storage.
pub struct SourceCache {
    dir: PathBuf,
}

impl SourceCache {
    /// Opens (creating if needed) the cache at the default location.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Init`] when the directory cannot be created; this is
    /// fatal at startup.
    pub fn new() -> Result<Self> {
        Self::at(default_cache_dir())
    }

    /// Opens (creating if needed) a cache at an explicit directory.
    pub fn at(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)
            .map_err(|e| Error::Init(format!("failed to create cache directory: {e}")))?;
        restrict_dir_permissions(&dir);
        Ok(Self { dir })
    }

    /// The directory this cache lives in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn source_file(&self, source: &str) -> PathBuf {
        self.dir.join(format!("source_{source}.json"))
    }

    fn source_meta_file(&self, source: &str) -> PathBuf {
        self.dir.join(format!("source_{source}_meta.json"))
    }

    fn merged_file(&self) -> PathBuf {
        self.dir.join("iocs.json")
    }

    fn merged_meta_file(&self) -> PathBuf {
        self.dir.join("meta.json")
    }

    /// Loads cached data for one source. Absence and unreadable data both
    /// yield `None`.
    pub fn load_source(&self, source: &str) -> Option<SourceRecord> {
        read_json(&self.source_file(source))
    }

    /// Saves one source's data and refreshes its status metadata.
    pub fn save_source(&self, source: &str, record: &SourceRecord) -> Result<()> {
        write_json(&self.source_file(source), record)?;
        self.save_source_status(
            source,
            &SourceStatus {
                name: source.to_owned(),
                last_fetched: record.fetched_at.clone(),
                success: true,
                error: None,
                package_count: record.packages.len(),
            },
        )
    }

    /// Persists a source's fetch status without touching its data file.
    /// Used to record failed fetches for the status endpoint.
    pub fn save_source_status(&self, source: &str, status: &SourceStatus) -> Result<()> {
        write_json(&self.source_meta_file(source), status)
    }

    /// Loads a source's fetch status.
    pub fn load_source_status(&self, source: &str) -> Option<SourceStatus> {
        read_json(&self.source_meta_file(source))
    }

    /// A source is stale when it has no metadata, its timestamp is
    /// unparsable, or its age exceeds the TTL.
    pub fn is_source_stale(&self, source: &str, ttl: Duration) -> bool {
        match self.source_age(source) {
            Some(age) => age > ttl,
            None => true,
        }
    }

    /// Age of a source's cached data, when known.
    pub fn source_age(&self, source: &str) -> Option<Duration> {
        let meta = self.load_source_status(source)?;
        age_of(&meta.last_fetched)
    }

    /// Loads the merged IOC index.
    pub fn load_merged(&self) -> Option<IocIndex> {
        read_json(&self.merged_file())
    }

    /// Saves the merged index and its metadata.
    pub fn save_merged(
        &self,
        index: &IocIndex,
        statuses: &std::collections::HashMap<String, SourceStatus>,
    ) -> Result<()> {
        write_json(&self.merged_file(), index)?;

        let meta = IndexMeta {
            last_updated: index.last_updated.clone(),
            package_count: index.packages.len(),
            version_count: index.version_count(),
            source_statuses: statuses.clone(),
        };
        write_json(&self.merged_meta_file(), &meta)
    }

    /// Loads the merged index metadata.
    pub fn load_merged_meta(&self) -> Option<IndexMeta> {
        read_json(&self.merged_meta_file())
    }

    /// Age of the merged index in whole hours, or -1 when unknown.
    pub fn merged_age_hours(&self) -> i64 {
        self.load_merged_meta()
            .and_then(|meta| age_of(&meta.last_updated))
            .map(|age| (age.as_secs() / 3600) as i64)
            .unwrap_or(-1)
    }
}

/// Resolves the cache directory per the documented priority order.
pub fn default_cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    let container = Path::new(CONTAINER_CACHE_DIR);
    if container.is_dir() {
        return container.to_path_buf();
    }

    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("supplyscan")
}

fn age_of(rfc3339: &str) -> Option<Duration> {
    let parsed = DateTime::parse_from_rfc3339(rfc3339).ok()?;
    let elapsed = Utc::now().signed_duration_since(parsed.with_timezone(&Utc));
    // Clock skew can put a timestamp slightly in the future; that is age 0,
    // not a stale cache.
    Some(elapsed.to_std().unwrap_or(Duration::ZERO))
}

/// Reads and deserialises a JSON file; any failure reads as absence.
fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

/// Serialises a value to a temp file and renames it into place, so readers
/// never observe a partial write.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value).map_err(|e| Error::Cache {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).map_err(|e| Error::Cache {
        path: tmp.clone(),
        source: e,
    })?;
    restrict_file_permissions(&tmp);
    fs::rename(&tmp, path).map_err(|e| Error::Cache {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(unix)]
fn restrict_dir_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o700)) {
        warn!(path = %path.display(), error = %e, "failed to restrict cache directory permissions");
    }
}

#[cfg(not(unix))]
fn restrict_dir_permissions(_path: &Path) {}

#[cfg(unix)]
fn restrict_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        warn!(path = %path.display(), error = %e, "failed to restrict cache file permissions");
    }
}

#[cfg(not(unix))]
fn restrict_file_permissions(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CompromisedPackage, SourcePackage};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn record(source: &str, fetched_at: &str) -> SourceRecord {
        let mut packages = HashMap::new();
        packages.insert(
            "lodash".to_owned(),
            SourcePackage {
                name: "lodash".to_owned(),
                versions: vec!["4.17.20".to_owned()],
                advisory_id: None,
                severity: Some("critical".to_owned()),
            },
        );
        SourceRecord {
            source: source.to_owned(),
            campaign: Some("test-campaign".to_owned()),
            packages,
            fetched_at: fetched_at.to_owned(),
        }
    }

    #[test]
    fn source_round_trip() {
        let dir = TempDir::new().unwrap();
        let cache = SourceCache::at(dir.path().to_path_buf()).unwrap();

        assert!(cache.load_source("datadog").is_none());

        let rec = record("datadog", &Utc::now().to_rfc3339());
        cache.save_source("datadog", &rec).unwrap();

        let loaded = cache.load_source("datadog").unwrap();
        assert_eq!(loaded.source, "datadog");
        assert_eq!(loaded.packages["lodash"].versions, vec!["4.17.20"]);

        let status = cache.load_source_status("datadog").unwrap();
        assert!(status.success);
        assert_eq!(status.package_count, 1);
    }

    #[test]
    fn staleness_decisions() {
        let dir = TempDir::new().unwrap();
        let cache = SourceCache::at(dir.path().to_path_buf()).unwrap();
        let ttl = Duration::from_secs(6 * 3600);

        // No metadata at all.
        assert!(cache.is_source_stale("datadog", ttl));

        // Fresh fetch.
        let rec = record("datadog", &Utc::now().to_rfc3339());
        cache.save_source("datadog", &rec).unwrap();
        assert!(!cache.is_source_stale("datadog", ttl));

        // Old fetch.
        let old = (Utc::now() - chrono::Duration::hours(7)).to_rfc3339();
        cache
            .save_source("datadog", &record("datadog", &old))
            .unwrap();
        assert!(cache.is_source_stale("datadog", ttl));

        // Unparsable timestamp.
        cache
            .save_source_status(
                "datadog",
                &SourceStatus {
                    name: "datadog".to_owned(),
                    last_fetched: "not-a-time".to_owned(),
                    success: true,
                    error: None,
                    package_count: 1,
                },
            )
            .unwrap();
        assert!(cache.is_source_stale("datadog", ttl));
    }

    #[test]
    fn merged_round_trip_preserves_index() {
        let dir = TempDir::new().unwrap();
        let cache = SourceCache::at(dir.path().to_path_buf()).unwrap();

        let mut index = IocIndex {
            last_updated: Utc::now().to_rfc3339(),
            sources: vec!["datadog".to_owned(), "github".to_owned()],
            ..Default::default()
        };
        index.packages.insert(
            "@ctrl/tinycolor".to_owned(),
            CompromisedPackage {
                name: "@ctrl/tinycolor".to_owned(),
                versions: vec!["3.4.1".to_owned(), "4.1.1".to_owned()],
                sources: vec!["datadog".to_owned()],
                campaigns: vec!["shai-hulud-v2".to_owned()],
                advisory_ids: vec!["GHSA-aaaa".to_owned()],
                first_seen: Utc::now().to_rfc3339(),
            },
        );

        cache.save_merged(&index, &HashMap::new()).unwrap();

        let loaded = cache.load_merged().unwrap();
        assert_eq!(loaded.last_updated, index.last_updated);
        assert_eq!(
            loaded.packages["@ctrl/tinycolor"],
            index.packages["@ctrl/tinycolor"]
        );

        let meta = cache.load_merged_meta().unwrap();
        assert_eq!(meta.package_count, 1);
        assert_eq!(meta.version_count, 2);
        assert!(cache.merged_age_hours() >= 0);
    }

    #[test]
    fn corrupt_cache_reads_as_absence() {
        let dir = TempDir::new().unwrap();
        let cache = SourceCache::at(dir.path().to_path_buf()).unwrap();

        fs::write(dir.path().join("iocs.json"), "{ corrupt").unwrap();
        assert!(cache.load_merged().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn cache_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let cache = SourceCache::at(dir.path().to_path_buf()).unwrap();
        let rec = record("datadog", &Utc::now().to_rfc3339());
        cache.save_source("datadog", &rec).unwrap();

        let mode = fs::metadata(dir.path().join("source_datadog.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
