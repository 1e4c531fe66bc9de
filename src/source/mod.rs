//! IOC feed drivers.
//!
//! A driver knows how to fetch one threat-intelligence feed and normalise it
//! into a [`SourceRecord`]. The aggregator treats drivers uniformly through
//! the [`IocSource`] trait and never branches on a concrete driver type.

mod advisory;
mod csv_feed;

pub use advisory::AdvisorySource;
pub use csv_feed::CsvFeedSource;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::SourceRecord;

/// A provider of IOC (Indicators of Compromise) data.
#[async_trait]
pub trait IocSource: Send + Sync {
    /// Stable identifier for this source (e.g. `datadog`, `github`).
    fn name(&self) -> &'static str;

    /// How long this source's data stays fresh.
    fn cache_ttl(&self) -> Duration;

    /// Performs one full retrieval.
    ///
    /// # Errors
    ///
    /// Returns a parse, network, or rate-limit error. Failures never affect
    /// sibling sources; the aggregator records them per source.
    async fn fetch(&self, client: &reqwest::Client) -> Result<SourceRecord>;
}

/// The default driver set: the DataDog consolidated IOC list and the GitHub
/// Security Advisory malware feed.
pub fn default_sources(config: &crate::config::Config) -> Vec<Box<dyn IocSource>> {
    let mut csv = CsvFeedSource::new();
    if let Some(url) = &config.csv_feed_url {
        csv = csv.with_url(url.clone());
    }
    if let Some(hours) = config.csv_ttl_hours {
        csv = csv.with_ttl(Duration::from_secs(hours * 3600));
    }

    let mut advisory = AdvisorySource::new();
    if let Some(url) = &config.advisory_url {
        advisory = advisory.with_url(url.clone());
    }
    if let Some(token) = config.github_token() {
        advisory = advisory.with_token(token);
    }
    if let Some(hours) = config.advisory_ttl_hours {
        advisory = advisory.with_ttl(Duration::from_secs(hours * 3600));
    }

    vec![Box::new(csv), Box::new(advisory)]
}
