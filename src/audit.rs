//! npm registry audit client.
//!
//! Submits a synthetic install manifest to the registry's bulk audit
//! endpoint and converts the returned advisories into vulnerability
//! findings. Audit failures never fail a scan; callers log and move on.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{Dependency, VulnerabilityFinding, VulnerabilityInfo};

const DEFAULT_ENDPOINT: &str = "https://registry.npmjs.org/-/npm/v1/security/audits";

/// Client for the npm audit API.
pub struct AuditClient {
    client: reqwest::Client,
    endpoint: String,
}

impl AuditClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_owned(),
        }
    }

    /// Overrides the audit endpoint. Used by tests and registry mirrors.
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Audits a dependency list, returning one finding per advisory
    /// instance.
    pub async fn audit_dependencies(
        &self,
        deps: &[Dependency],
    ) -> Result<Vec<VulnerabilityFinding>> {
        if deps.is_empty() {
            return Ok(Vec::new());
        }

        let request = build_request(deps);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::parse(
                "npm-audit",
                format!("audit API returned status {}", status.as_u16()),
            ));
        }

        let audit: AuditResponse = response.json().await.map_err(Error::Network)?;
        Ok(convert_advisories(audit.advisories))
    }

    /// Audits a single package, returning simplified records.
    pub async fn audit_single(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Vec<VulnerabilityInfo>> {
        let deps = [Dependency::new(name, version)];
        let findings = self.audit_dependencies(&deps).await?;

        Ok(findings
            .into_iter()
            .map(|f| VulnerabilityInfo {
                id: f.id,
                severity: f.severity,
                title: f.title,
                patched_in: f.patched_in,
            })
            .collect())
    }
}

impl Default for AuditClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct AuditRequest {
    name: String,
    version: String,
    requires: HashMap<String, String>,
    dependencies: HashMap<String, AuditDependency>,
}

#[derive(Serialize)]
struct AuditDependency {
    version: String,
}

#[derive(Deserialize)]
struct AuditResponse {
    #[serde(default)]
    advisories: HashMap<String, Advisory>,
}

#[derive(Deserialize)]
struct Advisory {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    module_name: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    patched_versions: String,
    #[serde(default)]
    github_advisory_id: String,
    #[serde(default)]
    findings: Vec<AdvisoryInstance>,
}

#[derive(Deserialize)]
struct AdvisoryInstance {
    #[serde(default)]
    version: String,
}

fn build_request(deps: &[Dependency]) -> AuditRequest {
    let mut requires = HashMap::new();
    let mut dependencies = HashMap::new();

    for dep in deps {
        requires.insert(dep.name.clone(), dep.version.clone());
        dependencies.insert(
            dep.name.clone(),
            AuditDependency {
                version: dep.version.clone(),
            },
        );
    }

    AuditRequest {
        name: "audit-check".to_owned(),
        version: "1.0.0".to_owned(),
        requires,
        dependencies,
    }
}

/// One finding per installed version the advisory names, or a single
/// versionless finding when it names none.
fn convert_advisories(advisories: HashMap<String, Advisory>) -> Vec<VulnerabilityFinding> {
    let mut findings = Vec::new();

    for advisory in advisories.values() {
        let base = |installed: &str| VulnerabilityFinding {
            severity: normalise_severity(&advisory.severity),
            package: advisory.module_name.clone(),
            installed_version: installed.to_owned(),
            id: advisory_id(advisory),
            title: advisory.title.clone(),
            patched_in: advisory.patched_versions.clone(),
            lockfile: Default::default(),
        };

        if advisory.findings.is_empty() {
            findings.push(base(""));
        } else {
            for instance in &advisory.findings {
                findings.push(base(&instance.version));
            }
        }
    }

    findings
}

/// Severity strings outside the known set collapse to `unknown`.
pub(crate) fn normalise_severity(severity: &str) -> String {
    let severity = severity.to_ascii_lowercase();
    match severity.as_str() {
        "critical" | "high" | "moderate" | "low" | "info" => severity,
        _ => "unknown".to_owned(),
    }
}

fn advisory_id(advisory: &Advisory) -> String {
    if advisory.github_advisory_id.is_empty() {
        format!("npm:{}", advisory.id)
    } else {
        advisory.github_advisory_id.clone()
    }
}
