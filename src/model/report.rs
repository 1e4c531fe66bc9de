//! Report documents returned by the tool surface.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use super::{LockfileInfo, SourceStatus, SUPPORTED_LOCKFILES};

/// A detected supply chain compromise: the installed version is on the IOC
/// list. Always `critical`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Always `critical` for compromise matches.
    pub severity: String,

    /// First campaign that flagged the package, or `supply_chain_compromise`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Package name.
    pub package: String,

    /// The version found in the lockfile.
    pub installed_version: String,

    /// All versions of this package known to be compromised.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compromised_versions: Vec<String>,

    /// Lockfile the dependency was found in.
    #[serde(default)]
    pub lockfile: PathBuf,

    /// Recommended remediation.
    pub action: String,

    /// Attack campaigns that flagged this package.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub campaigns: Vec<String>,

    /// Advisory identifiers (GHSA, CVE, ...).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advisory_ids: Vec<String>,

    /// IOC sources that reported this package.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

/// A package from an at-risk namespace whose installed version is not on the
/// IOC list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    /// Always `namespace_at_risk`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Package name.
    pub package: String,

    /// The version found in the lockfile.
    pub installed_version: String,

    /// Fixed advisory note.
    pub note: String,
}

/// A known vulnerability reported by the registry audit endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulnerabilityFinding {
    /// Normalised severity: critical/high/moderate/low/info/unknown.
    pub severity: String,

    /// Package name.
    pub package: String,

    /// Installed version the advisory names; empty when not listed.
    #[serde(default)]
    pub installed_version: String,

    /// Advisory identifier (GHSA id or `npm:<id>`).
    pub id: String,

    /// Advisory title.
    pub title: String,

    /// Versions the advisory is patched in.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub patched_in: String,

    /// Lockfile the dependency was found in.
    #[serde(default)]
    pub lockfile: PathBuf,
}

/// Aggregated scan statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanSummary {
    pub lockfiles_scanned: usize,
    pub total_dependencies: usize,
    pub issues: IssueCounts,
}

/// Issue counts broken down by severity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueCounts {
    pub critical: usize,
    pub high: usize,
    pub moderate: usize,
    pub supply_chain: usize,
}

/// All supply chain findings from one scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupplyChainReport {
    pub findings: Vec<Finding>,
    pub warnings: Vec<Warning>,
}

/// All vulnerability findings from one scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VulnerabilityReport {
    pub findings: Vec<VulnerabilityFinding>,
}

/// The complete output of a security scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanResult {
    pub summary: ScanSummary,
    pub supply_chain: SupplyChainReport,
    pub vulnerabilities: VulnerabilityReport,
    pub lockfiles: Vec<LockfileInfo>,
}

/// Output of the `status` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Application version.
    pub version: String,

    /// IOC index state.
    pub ioc_database: IndexStatus,

    /// Lockfile basenames the scanner understands.
    pub supported_lockfiles: Vec<String>,
}

impl StatusResponse {
    /// Builds a status response around an index status.
    pub fn new(version: impl Into<String>, ioc_database: IndexStatus) -> Self {
        Self {
            version: version.into(),
            ioc_database,
            supported_lockfiles: SUPPORTED_LOCKFILES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// IOC index state as reported by `status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStatus {
    pub packages: usize,
    pub versions: usize,
    #[serde(default)]
    pub last_updated: String,
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub source_details: HashMap<String, SourceStatus>,
}

/// Output of checking a single package@version.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckResult {
    pub supply_chain: CheckSupplyChain,
    pub vulnerabilities: Vec<VulnerabilityInfo>,
}

/// Supply chain verdict for a single package check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckSupplyChain {
    pub compromised: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub campaigns: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advisory_ids: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

/// A simplified vulnerability record for single-package checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulnerabilityInfo {
    pub id: String,
    pub severity: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub patched_in: String,
}

/// Output of refreshing the IOC index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshResult {
    /// True when at least one source returned fresh data.
    pub updated: bool,
    pub packages_count: usize,
    pub versions_count: usize,
    pub cache_age_hours: i64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub source_results: HashMap<String, SourceRefreshInfo>,
}

/// Per-source outcome of a refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRefreshInfo {
    pub name: String,
    pub updated: bool,
    pub package_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
