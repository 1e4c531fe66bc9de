//! IOC (Indicator of Compromise) data types.
//!
//! A [`SourceRecord`] is the normalised output of a single feed driver.
//! The aggregator merges source records into an [`IocIndex`] of
//! [`CompromisedPackage`] entries, preserving which sources, campaigns, and
//! advisories reported each package.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A compromised package as reported by a single source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePackage {
    /// npm package name (e.g. `lodash`, `@ctrl/tinycolor`).
    pub name: String,

    /// Compromised versions. A set: no duplicates.
    pub versions: Vec<String>,

    /// Optional advisory identifier (e.g. `GHSA-xxxx`, `CVE-xxxx`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advisory_id: Option<String>,

    /// Threat level reported by the source (e.g. `critical`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

/// IOC data retrieved from a single source in one fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Source identifier (e.g. `datadog`, `github`).
    pub source: String,

    /// Attack campaign this source tracks (e.g. `shai-hulud-v2`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign: Option<String>,

    /// Compromised packages keyed by name.
    pub packages: HashMap<String, SourcePackage>,

    /// When this data was retrieved (RFC3339).
    pub fetched_at: String,
}

/// A known-compromised package in the merged index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompromisedPackage {
    /// Package name.
    pub name: String,

    /// Union of compromised versions across all sources.
    pub versions: Vec<String>,

    /// Sources that reported this package.
    pub sources: Vec<String>,

    /// Campaigns that flagged this package.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub campaigns: Vec<String>,

    /// Advisory identifiers (GHSA, CVE, ...).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advisory_ids: Vec<String>,

    /// When this package first entered the index (RFC3339).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub first_seen: String,
}

/// The merged in-memory IOC index. Replaced wholesale on each refresh.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IocIndex {
    /// Compromised packages keyed by name.
    pub packages: HashMap<String, CompromisedPackage>,

    /// When the index was last merged (RFC3339).
    pub last_updated: String,

    /// Identifiers of the sources that contributed.
    pub sources: Vec<String>,
}

impl IocIndex {
    /// Total number of compromised versions across all packages.
    pub fn version_count(&self) -> usize {
        self.packages.values().map(|p| p.versions.len()).sum()
    }
}

/// Per-source fetch status, persisted next to the source cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceStatus {
    /// Source identifier.
    pub name: String,

    /// When data was last fetched (RFC3339). Empty when never fetched.
    #[serde(default)]
    pub last_fetched: String,

    /// Whether the last fetch succeeded.
    pub success: bool,

    /// Error message from the last failed fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Number of packages this source reported.
    pub package_count: usize,
}

/// Metadata persisted alongside the merged index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexMeta {
    /// When the merged index was written (RFC3339).
    pub last_updated: String,

    /// Package count at merge time.
    pub package_count: usize,

    /// Version count at merge time.
    pub version_count: usize,

    /// Status of every contributing source at merge time.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub source_statuses: HashMap<String, SourceStatus>,
}
