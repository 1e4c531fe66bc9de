//! Supply chain detection: matches dependencies against the IOC index.
//!
//! A dependency whose exact version is indexed produces a [`Finding`]; a
//! clean version from a namespace that has hosted compromised packages
//! produces a softer [`Warning`]. A finding always subsumes the warning.

use std::path::PathBuf;

use crate::aggregator::Aggregator;
use crate::cache::SourceCache;
use crate::error::Result;
use crate::model::{Dependency, Finding, IndexStatus, IocIndex, RefreshResult, Warning};
use crate::source::IocSource;

/// Remediation advice attached to every compromise finding.
const FINDING_ACTION: &str = "Update immediately and rotate any exposed credentials";

/// npm scopes that have had compromised packages. Packages from these
/// namespaces trigger warnings even when the installed version appears safe.
const AT_RISK_NAMESPACES: [&str; 10] = [
    "@ctrl",
    "@nativescript-community",
    "@crowdstrike",
    "@asyncapi",
    "@posthog",
    "@postman",
    "@ensdomains",
    "@zapier",
    "@art-ws",
    "@ngx",
];

/// Checks packages against the aggregated IOC index.
pub struct Detector {
    aggregator: Aggregator,
}

impl Detector {
    /// Creates a detector over the given IOC sources with the default cache
    /// location.
    pub fn new(sources: Vec<Box<dyn IocSource>>) -> Result<Self> {
        Ok(Self {
            aggregator: Aggregator::new(sources)?,
        })
    }

    /// Creates a detector with an explicit cache directory.
    pub fn with_cache_dir(sources: Vec<Box<dyn IocSource>>, dir: PathBuf) -> Result<Self> {
        let cache = SourceCache::at(dir)?;
        Ok(Self {
            aggregator: Aggregator::with_cache(sources, cache)?,
        })
    }

    /// Loads the IOC index, refreshing stale sources. Never fails.
    pub async fn ensure_loaded(&self) {
        self.aggregator.ensure_loaded().await;
    }

    /// Forces (or freshness-checks) a refresh of the IOC index.
    pub async fn refresh(&self, force: bool) -> Result<RefreshResult> {
        self.aggregator.refresh(force).await
    }

    /// IOC index status for the status endpoint.
    pub async fn status(&self) -> IndexStatus {
        self.aggregator.status().await
    }

    /// Checks one package@version against the index.
    pub async fn check_package(&self, name: &str, version: &str) -> Option<Finding> {
        let index = self.aggregator.index().await?;
        finding_for(&index, name, version)
    }

    /// Checks a dependency list, returning findings and namespace warnings.
    ///
    /// Within one list, a dependency produces at most one output, and a
    /// finding suppresses the namespace warning for the same dependency.
    pub async fn check_dependencies(
        &self,
        deps: &[Dependency],
    ) -> (Vec<Finding>, Vec<Warning>) {
        let index = self.aggregator.index().await;
        let mut findings = Vec::new();
        let mut warnings = Vec::new();

        for dep in deps {
            if let Some(index) = &index {
                if let Some(finding) = finding_for(index, &dep.name, &dep.version) {
                    findings.push(finding);
                    continue;
                }
            }

            if is_at_risk_namespace(&dep.name) {
                warnings.push(Warning {
                    kind: "namespace_at_risk".to_owned(),
                    package: dep.name.clone(),
                    installed_version: dep.version.clone(),
                    note: namespace_warning_note(),
                });
            }
        }

        (findings, warnings)
    }
}

/// Builds a finding when the installed version is byte-exactly on the
/// compromised list.
fn finding_for(index: &IocIndex, name: &str, version: &str) -> Option<Finding> {
    let pkg = index.packages.get(name)?;
    if !pkg.versions.iter().any(|v| v == version) {
        return None;
    }

    let kind = pkg
        .campaigns
        .first()
        .cloned()
        .unwrap_or_else(|| "supply_chain_compromise".to_owned());

    Some(Finding {
        severity: "critical".to_owned(),
        kind,
        package: name.to_owned(),
        installed_version: version.to_owned(),
        compromised_versions: pkg.versions.clone(),
        lockfile: PathBuf::new(),
        action: FINDING_ACTION.to_owned(),
        campaigns: pkg.campaigns.clone(),
        advisory_ids: pkg.advisory_ids.clone(),
        sources: pkg.sources.clone(),
    })
}

/// True when the package's scope is on the at-risk list.
fn is_at_risk_namespace(package_name: &str) -> bool {
    if !package_name.starts_with('@') {
        return false;
    }
    let Some(slash) = package_name.find('/') else {
        return false;
    };
    let scope = &package_name[..slash];
    AT_RISK_NAMESPACES.contains(&scope)
}

fn namespace_warning_note() -> String {
    "Namespace had compromised packages in Shai-Hulud campaign. \
     This version appears safe but verify."
        .to_owned()
}
