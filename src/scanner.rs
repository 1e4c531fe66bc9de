//! Scan orchestration.
//!
//! Ties the pieces together: lockfile discovery, parsing, supply chain
//! detection, and the registry audit. Upstream failures never abort a scan;
//! a lockfile that fails to parse is skipped and audit failures leave the
//! compromise findings standing.

use std::path::Path;

use tracing::{debug, warn};

use crate::audit::AuditClient;
use crate::detector::Detector;
use crate::error::Result;
use crate::lockfile;
use crate::model::{
    CheckResult, CheckSupplyChain, Dependency, IndexStatus, IssueCounts, LockfileInfo,
    RefreshResult, ScanResult,
};
use crate::source::IocSource;

/// Options for a project scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Scan subdirectories for lockfiles.
    pub recursive: bool,

    /// Keep dev dependencies in the scan.
    pub include_dev: bool,
}

/// Orchestrates the complete security scan.
pub struct Scanner {
    detector: Detector,
    audit: AuditClient,
}

impl Scanner {
    /// Creates a scanner with the given IOC sources and default cache and
    /// audit endpoints.
    pub fn new(sources: Vec<Box<dyn IocSource>>) -> Result<Self> {
        Ok(Self {
            detector: Detector::new(sources)?,
            audit: AuditClient::new(),
        })
    }

    /// Creates a scanner with explicit collaborators. Used by tests.
    pub fn with_parts(detector: Detector, audit: AuditClient) -> Self {
        Self { detector, audit }
    }

    /// Performs a full security scan of a project directory.
    pub async fn scan(&self, path: &Path, opts: &ScanOptions) -> Result<ScanResult> {
        // Best effort; a missing IOC index still leaves the audit findings.
        self.detector.ensure_loaded().await;

        let lockfile_paths = lockfile::find_lockfiles(path, opts.recursive)?;

        let mut result = ScanResult::default();

        for path in lockfile_paths {
            let parsed = match lockfile::detect_and_parse(&path) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unparsable lockfile");
                    continue;
                }
            };

            let deps: Vec<Dependency> = if opts.include_dev {
                parsed.dependencies
            } else {
                parsed.dependencies.into_iter().filter(|d| !d.dev).collect()
            };

            result.lockfiles.push(LockfileInfo {
                path: path.clone(),
                format: parsed.format,
                dependencies: deps.len(),
            });
            result.summary.lockfiles_scanned += 1;
            result.summary.total_dependencies += deps.len();

            let (mut findings, warnings) = self.detector.check_dependencies(&deps).await;
            for finding in &mut findings {
                finding.lockfile = path.clone();
            }
            result.supply_chain.findings.extend(findings);
            result.supply_chain.warnings.extend(warnings);

            match self.audit.audit_dependencies(&deps).await {
                Ok(mut vulns) => {
                    for vuln in &mut vulns {
                        vuln.lockfile = path.clone();
                    }
                    result.vulnerabilities.findings.extend(vulns);
                }
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "vulnerability audit unavailable");
                }
            }
        }

        result.summary.issues = count_issues(&result);
        Ok(result)
    }

    /// Checks a single package@version for compromises and vulnerabilities.
    pub async fn check_package(&self, name: &str, version: &str) -> CheckResult {
        self.detector.ensure_loaded().await;

        let mut result = CheckResult::default();

        if let Some(finding) = self.detector.check_package(name, version).await {
            result.supply_chain = CheckSupplyChain {
                compromised: true,
                campaigns: finding.campaigns,
                advisory_ids: finding.advisory_ids,
                sources: finding.sources,
            };
        }

        match self.audit.audit_single(name, version).await {
            Ok(vulns) => result.vulnerabilities = vulns,
            Err(e) => debug!(package = name, error = %e, "vulnerability audit unavailable"),
        }

        result
    }

    /// Refreshes the IOC index from upstream sources.
    pub async fn refresh(&self, force: bool) -> Result<RefreshResult> {
        self.detector.refresh(force).await
    }

    /// Current IOC index status.
    pub async fn status(&self) -> IndexStatus {
        self.detector.status().await
    }
}

/// Sums issue counts: supply chain findings plus audit severities. Audit
/// severities outside critical/high/moderate do not count as issues.
fn count_issues(result: &ScanResult) -> IssueCounts {
    let mut counts = IssueCounts {
        supply_chain: result.supply_chain.findings.len(),
        ..Default::default()
    };

    for vuln in &result.vulnerabilities.findings {
        match vuln.severity.as_str() {
            "critical" => counts.critical += 1,
            "high" => counts.high += 1,
            "moderate" => counts.moderate += 1,
            _ => {}
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SourcePackage, SourceRecord, VulnerabilityFinding};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    struct StubSource(SourceRecord);

    #[async_trait]
    impl IocSource for StubSource {
        fn name(&self) -> &'static str {
            "stub"
        }
        fn cache_ttl(&self) -> Duration {
            Duration::from_secs(3600)
        }
        async fn fetch(&self, _client: &reqwest::Client) -> crate::error::Result<SourceRecord> {
            Ok(self.0.clone())
        }
    }

    /// A scanner with a stubbed IOC source and an unroutable audit endpoint,
    /// so tests stay off the network.
    fn offline_scanner(cache_dir: &TempDir, entries: &[(&str, &[&str])]) -> Scanner {
        let mut packages = HashMap::new();
        for (name, versions) in entries {
            packages.insert(
                name.to_string(),
                SourcePackage {
                    name: name.to_string(),
                    versions: versions.iter().map(|v| v.to_string()).collect(),
                    advisory_id: None,
                    severity: Some("critical".to_owned()),
                },
            );
        }
        let record = SourceRecord {
            source: "stub".to_owned(),
            campaign: Some("shai-hulud-v2".to_owned()),
            packages,
            fetched_at: chrono::Utc::now().to_rfc3339(),
        };

        let detector = Detector::with_cache_dir(
            vec![Box::new(StubSource(record))],
            cache_dir.path().to_path_buf(),
        )
        .unwrap();
        let audit = AuditClient::new().with_endpoint("http://127.0.0.1:9/audit".to_owned());
        Scanner::with_parts(detector, audit)
    }

    const LOCKFILE_WITH_DEV: &str = r#"{
        "lockfileVersion": 3,
        "packages": {
            "": { "name": "app", "version": "1.0.0" },
            "node_modules/lodash": { "version": "4.17.21" },
            "node_modules/express": { "version": "4.18.2" },
            "node_modules/typescript": { "version": "5.4.2", "dev": true }
        }
    }"#;

    #[tokio::test]
    async fn dev_dependencies_are_filtered_by_default() {
        let project = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        fs::write(project.path().join("package-lock.json"), LOCKFILE_WITH_DEV).unwrap();

        let scanner = offline_scanner(&cache, &[]);

        let result = scanner
            .scan(project.path(), &ScanOptions::default())
            .await
            .unwrap();
        assert_eq!(result.summary.lockfiles_scanned, 1);
        assert_eq!(result.summary.total_dependencies, 2);

        let result = scanner
            .scan(
                project.path(),
                &ScanOptions {
                    include_dev: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(result.summary.total_dependencies, 3);
    }

    #[tokio::test]
    async fn compromised_package_is_found() {
        let project = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        fs::write(
            project.path().join("package-lock.json"),
            r#"{
                "lockfileVersion": 3,
                "packages": {
                    "node_modules/@ctrl/tinycolor": { "version": "3.4.1" }
                }
            }"#,
        )
        .unwrap();

        let scanner = offline_scanner(&cache, &[("@ctrl/tinycolor", &["3.4.1"])]);
        let result = scanner
            .scan(project.path(), &ScanOptions::default())
            .await
            .unwrap();

        assert_eq!(result.supply_chain.findings.len(), 1);
        assert!(result.supply_chain.warnings.is_empty());
        assert_eq!(result.summary.issues.supply_chain, 1);

        let finding = &result.supply_chain.findings[0];
        assert_eq!(finding.kind, "shai-hulud-v2");
        assert!(finding.lockfile.ends_with("package-lock.json"));
    }

    #[tokio::test]
    async fn clean_version_in_risky_namespace_warns() {
        let project = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        fs::write(
            project.path().join("package-lock.json"),
            r#"{
                "lockfileVersion": 3,
                "packages": {
                    "node_modules/@ctrl/tinycolor": { "version": "3.0.0" }
                }
            }"#,
        )
        .unwrap();

        let scanner = offline_scanner(&cache, &[("@ctrl/tinycolor", &["3.4.1"])]);
        let result = scanner
            .scan(project.path(), &ScanOptions::default())
            .await
            .unwrap();

        assert!(result.supply_chain.findings.is_empty());
        assert_eq!(result.supply_chain.warnings.len(), 1);
        assert_eq!(result.supply_chain.warnings[0].kind, "namespace_at_risk");
        assert_eq!(result.summary.issues.supply_chain, 0);
    }

    #[tokio::test]
    async fn malformed_lockfile_is_skipped() {
        let project = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        fs::write(project.path().join("package-lock.json"), "{ not json").unwrap();
        fs::write(
            project.path().join("bun.lock"),
            r#"{ "packages": { "ms": "2.0.0" } }"#,
        )
        .unwrap();

        let scanner = offline_scanner(&cache, &[]);
        let result = scanner
            .scan(project.path(), &ScanOptions::default())
            .await
            .unwrap();

        assert_eq!(result.summary.lockfiles_scanned, 1);
        assert_eq!(result.summary.total_dependencies, 1);
    }

    #[tokio::test]
    async fn recursive_scan_prunes_node_modules() {
        let project = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();

        fs::write(project.path().join("package-lock.json"), "{}").unwrap();
        let nm = project.path().join("node_modules").join("foo");
        fs::create_dir_all(&nm).unwrap();
        fs::write(nm.join("package-lock.json"), "{}").unwrap();
        let pkg = project.path().join("packages").join("a");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(
            pkg.join("yarn.lock"),
            "# yarn lockfile v1\n\nms@2.0.0:\n  version \"2.0.0\"\n",
        )
        .unwrap();

        let scanner = offline_scanner(&cache, &[]);
        let result = scanner
            .scan(
                project.path(),
                &ScanOptions {
                    recursive: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(result.summary.lockfiles_scanned, 2);
        assert!(result
            .lockfiles
            .iter()
            .all(|info| !info.path.to_string_lossy().contains("node_modules")));
    }

    #[tokio::test]
    async fn missing_root_is_an_input_error() {
        let cache = TempDir::new().unwrap();
        let scanner = offline_scanner(&cache, &[]);
        let result = scanner
            .scan(Path::new("/no/such/path"), &ScanOptions::default())
            .await;
        assert!(matches!(result, Err(crate::error::Error::Input(_))));
    }

    #[tokio::test]
    async fn check_package_reports_compromise_provenance() {
        let cache = TempDir::new().unwrap();
        let scanner = offline_scanner(&cache, &[("@ctrl/tinycolor", &["3.4.1"])]);

        let result = scanner.check_package("@ctrl/tinycolor", "3.4.1").await;
        assert!(result.supply_chain.compromised);
        assert_eq!(result.supply_chain.campaigns, vec!["shai-hulud-v2"]);
        assert_eq!(result.supply_chain.sources, vec!["stub"]);

        let result = scanner.check_package("@ctrl/tinycolor", "3.0.0").await;
        assert!(!result.supply_chain.compromised);
    }

    #[test]
    fn issue_counts_ignore_low_and_unknown() {
        let mut result = ScanResult::default();
        for severity in ["critical", "high", "moderate", "low", "info", "unknown"] {
            result.vulnerabilities.findings.push(VulnerabilityFinding {
                severity: severity.to_owned(),
                package: "x".to_owned(),
                installed_version: "1.0.0".to_owned(),
                id: "npm:1".to_owned(),
                title: "t".to_owned(),
                patched_in: String::new(),
                lockfile: PathBuf::new(),
            });
        }

        let counts = count_issues(&result);
        assert_eq!(counts.critical, 1);
        assert_eq!(counts.high, 1);
        assert_eq!(counts.moderate, 1);
        assert_eq!(counts.supply_chain, 0);
    }
}
