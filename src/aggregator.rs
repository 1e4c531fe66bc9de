//! Multi-source IOC aggregation.
//!
//! The aggregator owns the configured source drivers, their on-disk caches,
//! one shared HTTP client, and the in-memory [`IocIndex`]. All sources fetch
//! in parallel; a failing source never affects its siblings, and stale cached
//! data is preferred over no data.
//!
//! Mutation of the index and the caches happens only under the write half of
//! a read-write lock: `ensure_loaded` and `refresh` hold it for the full
//! fetch-merge-persist cycle, while readers (`index`, `status`) take the
//! read half.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::cache::SourceCache;
use crate::error::Result;
use crate::model::{
    CompromisedPackage, IndexStatus, IocIndex, RefreshResult, SourceRecord, SourceRefreshInfo,
    SourceStatus,
};
use crate::source::IocSource;

/// Bound on a full fetch-merge-persist cycle.
const OPERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// How long a stale per-source cache may still substitute for a failed
/// fetch.
const STALE_GRACE: Duration = Duration::from_secs(7 * 24 * 3600);

/// Merges IOC data from multiple sources into a unified index.
pub struct Aggregator {
    sources: Vec<Box<dyn IocSource>>,
    cache: SourceCache,
    client: reqwest::Client,
    index: RwLock<Option<IocIndex>>,
}

impl Aggregator {
    /// Creates an aggregator over the given sources with a cache at the
    /// default location.
    pub fn new(sources: Vec<Box<dyn IocSource>>) -> Result<Self> {
        Self::with_cache(sources, SourceCache::new()?)
    }

    /// Creates an aggregator with an explicit cache, used by tests and by
    /// callers overriding the cache directory.
    pub fn with_cache(sources: Vec<Box<dyn IocSource>>, cache: SourceCache) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            sources,
            cache,
            client,
            index: RwLock::new(None),
        })
    }

    /// Loads the IOC index, fetching from sources when the caches are stale.
    ///
    /// Idempotent, and never fails: with every source down and no cache, the
    /// scan proceeds against an empty index.
    pub async fn ensure_loaded(&self) {
        let mut guard = self.index.write().await;

        if guard.is_some() && self.all_sources_fresh() {
            return;
        }

        // A fresh merged cache avoids any network traffic.
        let cached = self.cache.load_merged();
        if let Some(db) = &cached {
            if self.all_sources_fresh() {
                *guard = Some(db.clone());
                return;
            }
        }

        let outcome = self.fetch_all(false).await;

        if outcome.records.is_empty() {
            // Graceful degradation: keep whatever we had.
            if let Some(db) = cached {
                *guard = Some(db);
            }
            return;
        }

        let index = merge_records(&outcome.records);
        let statuses = self.build_statuses(&outcome);
        if let Err(e) = self.cache.save_merged(&index, &statuses) {
            warn!(error = %e, "failed to persist merged IOC index");
        }
        *guard = Some(index);
    }

    /// Fetches fresh data from all sources and rebuilds the index.
    ///
    /// With `force`, drivers bypass their cache freshness checks.
    pub async fn refresh(&self, force: bool) -> Result<RefreshResult> {
        let mut guard = self.index.write().await;

        let outcome = self.fetch_all(force).await;

        let mut result = RefreshResult {
            source_results: HashMap::new(),
            ..Default::default()
        };

        for record in &outcome.records {
            result.source_results.insert(
                record.source.clone(),
                SourceRefreshInfo {
                    name: record.source.clone(),
                    updated: !outcome.from_cache.contains(&record.source),
                    package_count: record.packages.len(),
                    error: None,
                },
            );
        }
        for (name, error) in &outcome.errors {
            result.source_results.insert(
                name.clone(),
                SourceRefreshInfo {
                    name: name.clone(),
                    updated: false,
                    package_count: 0,
                    error: Some(error.clone()),
                },
            );
        }

        if outcome.records.is_empty() {
            // Nothing fetched; report what the cache still holds.
            if let Some(meta) = self.cache.load_merged_meta() {
                result.packages_count = meta.package_count;
                result.versions_count = meta.version_count;
            }
            result.cache_age_hours = self.cache.merged_age_hours().max(0);
            return Ok(result);
        }

        let index = merge_records(&outcome.records);
        result.updated = true;
        result.packages_count = index.packages.len();
        result.versions_count = index.version_count();
        result.cache_age_hours = 0;

        let statuses = self.build_statuses(&outcome);
        if let Err(e) = self.cache.save_merged(&index, &statuses) {
            warn!(error = %e, "failed to persist merged IOC index");
        }
        *guard = Some(index);

        Ok(result)
    }

    /// A snapshot of the current index, if one is loaded.
    pub async fn index(&self) -> Option<IocIndex> {
        self.index.read().await.clone()
    }

    /// Reports per-source status plus index totals.
    pub async fn status(&self) -> IndexStatus {
        let guard = self.index.read().await;

        let mut status = IndexStatus::default();
        for source in &self.sources {
            status.sources.push(source.name().to_owned());
            if let Some(meta) = self.cache.load_source_status(source.name()) {
                status.source_details.insert(source.name().to_owned(), meta);
            }
        }

        if let Some(index) = guard.as_ref() {
            status.packages = index.packages.len();
            status.versions = index.version_count();
            status.last_updated = index.last_updated.clone();
        }

        status
    }

    fn all_sources_fresh(&self) -> bool {
        self.sources
            .iter()
            .all(|s| !self.cache.is_source_stale(s.name(), s.cache_ttl()))
    }

    fn build_statuses(&self, outcome: &FetchOutcome) -> HashMap<String, SourceStatus> {
        let mut statuses = HashMap::new();
        for record in &outcome.records {
            statuses.insert(
                record.source.clone(),
                SourceStatus {
                    name: record.source.clone(),
                    last_fetched: record.fetched_at.clone(),
                    success: true,
                    error: None,
                    package_count: record.packages.len(),
                },
            );
        }
        statuses
    }

    /// Runs every source concurrently under the overall timeout.
    ///
    /// Each task loads a fresh cache when allowed, fetches otherwise, and
    /// persists successful fetches best-effort. Failures fall back to stale
    /// cached data inside the grace window. No task's failure cancels its
    /// siblings. Results are collected under a mutex as tasks finish, so a
    /// timeout keeps what the faster sources returned and marks the rest as
    /// timed out.
    async fn fetch_all(&self, force: bool) -> FetchOutcome {
        let collected = std::sync::Mutex::new(FetchOutcome::default());

        let tasks = self.sources.iter().map(|source| {
            let collected = &collected;
            async move {
                let fetch = self.fetch_one(source.as_ref(), force).await;
                let mut outcome = collected.lock().expect("collector poisoned");
                match fetch.result {
                    Ok(record) => {
                        if fetch.from_cache {
                            outcome.from_cache.push(fetch.name);
                        }
                        outcome.records.push(record);
                    }
                    Err(error) => {
                        outcome.errors.insert(fetch.name, error);
                    }
                }
            }
        });

        if tokio::time::timeout(OPERATION_TIMEOUT, join_all(tasks))
            .await
            .is_err()
        {
            warn!("IOC fetch timed out");
        }

        let mut outcome = collected.into_inner().expect("collector poisoned");

        // Sources that neither delivered nor failed were cut off.
        for source in &self.sources {
            let name = source.name();
            let seen = outcome.records.iter().any(|r| r.source == name)
                || outcome.errors.contains_key(name);
            if !seen {
                outcome.errors.insert(name.to_owned(), "fetch timed out".to_owned());
            }
        }

        // Stable merge order regardless of completion order.
        outcome.records.sort_by(|a, b| a.source.cmp(&b.source));
        outcome
    }

    async fn fetch_one(&self, source: &dyn IocSource, force: bool) -> SourceFetch {
        let name = source.name();

        if !force && !self.cache.is_source_stale(name, source.cache_ttl()) {
            if let Some(record) = self.cache.load_source(name) {
                debug!(source = name, "using fresh cached IOC data");
                return SourceFetch {
                    name: name.to_owned(),
                    result: Ok(record),
                    from_cache: true,
                };
            }
        }

        match source.fetch(&self.client).await {
            Ok(record) => {
                if let Err(e) = self.cache.save_source(name, &record) {
                    warn!(source = name, error = %e, "failed to persist source cache");
                }
                SourceFetch {
                    name: name.to_owned(),
                    result: Ok(record),
                    from_cache: false,
                }
            }
            Err(e) => {
                warn!(source = name, error = %e, "IOC source fetch failed");
                self.record_failure(name, &e);

                // Stale data beats no data, inside the grace window.
                let stale = self
                    .cache
                    .source_age(name)
                    .filter(|age| *age <= STALE_GRACE)
                    .and_then(|_| self.cache.load_source(name));

                match stale {
                    Some(record) => {
                        debug!(source = name, "reusing stale cached IOC data");
                        SourceFetch {
                            name: name.to_owned(),
                            result: Ok(record),
                            from_cache: true,
                        }
                    }
                    None => SourceFetch {
                        name: name.to_owned(),
                        result: Err(e.to_string()),
                        from_cache: false,
                    },
                }
            }
        }
    }

    fn record_failure(&self, name: &str, error: &crate::error::Error) {
        let mut status = self
            .cache
            .load_source_status(name)
            .unwrap_or_else(|| SourceStatus {
                name: name.to_owned(),
                ..Default::default()
            });
        status.success = false;
        status.error = Some(error.to_string());
        if let Err(e) = self.cache.save_source_status(name, &status) {
            warn!(source = name, error = %e, "failed to persist source status");
        }
    }
}

struct SourceFetch {
    name: String,
    result: std::result::Result<SourceRecord, String>,
    from_cache: bool,
}

#[derive(Default)]
struct FetchOutcome {
    records: Vec<SourceRecord>,
    errors: HashMap<String, String>,
    from_cache: Vec<String>,
}

/// Combines source records into a unified index.
///
/// Commutative and idempotent: set-valued fields union with duplicates and
/// empty strings removed, and `first_seen` keeps its first value within a
/// merge.
fn merge_records(records: &[SourceRecord]) -> IocIndex {
    let mut packages: HashMap<String, CompromisedPackage> = HashMap::new();
    let mut source_names = Vec::new();
    let now = Utc::now().to_rfc3339();

    for record in records {
        push_unique(&mut source_names, &record.source);

        for (name, pkg) in &record.packages {
            let entry = packages
                .entry(name.clone())
                .or_insert_with(|| CompromisedPackage {
                    name: name.clone(),
                    versions: Vec::new(),
                    sources: Vec::new(),
                    campaigns: Vec::new(),
                    advisory_ids: Vec::new(),
                    first_seen: now.clone(),
                });

            for version in &pkg.versions {
                push_unique(&mut entry.versions, version);
            }
            push_unique(&mut entry.sources, &record.source);
            if let Some(campaign) = &record.campaign {
                push_unique(&mut entry.campaigns, campaign);
            }
            if let Some(advisory) = &pkg.advisory_id {
                push_unique(&mut entry.advisory_ids, advisory);
            }
        }
    }

    IocIndex {
        packages,
        last_updated: now,
        sources: source_names,
    }
}

/// Appends a value unless it is empty or already present.
fn push_unique(list: &mut Vec<String>, value: &str) {
    if !value.is_empty() && !list.iter().any(|v| v == value) {
        list.push(value.to_owned());
    }
}
