//! GitHub Security Advisory driver.
//!
//! Pages through the advisory API filtered to npm malware advisories,
//! following the `Link: <...>; rel="next"` header via its `after` cursor.
//! An optional bearer token raises the rate limit; 403/429 surface as
//! [`Error::RateLimited`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use super::IocSource;
use crate::error::{Error, Result};
use crate::model::{SourcePackage, SourceRecord};

const DEFAULT_URL: &str = "https://api.github.com/advisories";

// Advisories move slowly and the unauthenticated rate limit is tight.
const CACHE_TTL: Duration = Duration::from_secs(12 * 3600);

const CAMPAIGN: &str = "github-advisory";

const PAGE_SIZE: usize = 100;

/// IOC source backed by the GitHub Security Advisory Database.
pub struct AdvisorySource {
    url: String,
    token: Option<String>,
    ttl: Duration,
}

impl AdvisorySource {
    pub fn new() -> Self {
        Self {
            url: DEFAULT_URL.to_owned(),
            token: None,
            ttl: CACHE_TTL,
        }
    }

    /// Overrides the API URL.
    pub fn with_url(mut self, url: String) -> Self {
        self.url = url;
        self
    }

    /// Supplies a bearer token for authenticated requests.
    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }

    /// Overrides the cache TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    async fn fetch_page(
        &self,
        client: &reqwest::Client,
        cursor: Option<&str>,
    ) -> Result<(Vec<Advisory>, Option<String>)> {
        let per_page = PAGE_SIZE.to_string();
        let mut request = client
            .get(&self.url)
            .query(&[
                ("ecosystem", "npm"),
                ("type", "malware"),
                ("per_page", per_page.as_str()),
            ])
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header("User-Agent", concat!("supplyscan/", env!("CARGO_PKG_VERSION")));

        if let Some(cursor) = cursor {
            request = request.query(&[("after", cursor)]);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.as_u16() == 403 || status.as_u16() == 429 {
            return Err(Error::RateLimited {
                feed: self.name().to_owned(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(Error::parse(
                self.name(),
                format!("unexpected status code: {}", status.as_u16()),
            ));
        }

        let next_cursor = response
            .headers()
            .get("link")
            .and_then(|v| v.to_str().ok())
            .and_then(extract_next_cursor);

        let advisories: Vec<Advisory> = response.json().await.map_err(Error::Network)?;

        Ok((advisories, next_cursor))
    }
}

impl Default for AdvisorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IocSource for AdvisorySource {
    fn name(&self) -> &'static str {
        "github"
    }

    fn cache_ttl(&self) -> Duration {
        self.ttl
    }

    async fn fetch(&self, client: &reqwest::Client) -> Result<SourceRecord> {
        let mut packages: HashMap<String, SourcePackage> = HashMap::new();
        let mut cursor: Option<String> = None;

        loop {
            let (advisories, next) = match self.fetch_page(client, cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    // Keep what earlier pages yielded.
                    if !packages.is_empty() {
                        debug!(error = %e, "advisory pagination stopped early");
                        break;
                    }
                    return Err(e);
                }
            };

            let short_page = advisories.len() < PAGE_SIZE;
            for advisory in &advisories {
                merge_advisory(&mut packages, advisory);
            }

            match next {
                Some(next) if !short_page => cursor = Some(next),
                _ => break,
            }
        }

        Ok(SourceRecord {
            source: self.name().to_owned(),
            campaign: Some(CAMPAIGN.to_owned()),
            packages,
            fetched_at: Utc::now().to_rfc3339(),
        })
    }
}

#[derive(Deserialize)]
struct Advisory {
    #[serde(default)]
    ghsa_id: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    vulnerabilities: Vec<AdvisoryVulnerability>,
}

#[derive(Deserialize)]
struct AdvisoryVulnerability {
    package: AdvisoryPackage,
    #[serde(default)]
    vulnerable_version_range: String,
}

#[derive(Deserialize)]
struct AdvisoryPackage {
    #[serde(default)]
    ecosystem: String,
    #[serde(default)]
    name: String,
}

/// Folds one advisory's npm vulnerabilities into the package map.
fn merge_advisory(packages: &mut HashMap<String, SourcePackage>, advisory: &Advisory) {
    for vuln in &advisory.vulnerabilities {
        if vuln.package.ecosystem != "npm" || vuln.package.name.is_empty() {
            continue;
        }

        let versions = parse_version_range(&vuln.vulnerable_version_range);
        let entry = packages
            .entry(vuln.package.name.clone())
            .or_insert_with(|| SourcePackage {
                name: vuln.package.name.clone(),
                versions: Vec::new(),
                advisory_id: none_if_empty(&advisory.ghsa_id),
                severity: Some(normalise_severity(&advisory.severity)),
            });

        for version in versions {
            if !entry.versions.contains(&version) {
                entry.versions.push(version);
            }
        }
        if entry.advisory_id.is_none() {
            entry.advisory_id = none_if_empty(&advisory.ghsa_id);
        }
    }
}

/// Expands a human-readable range like `= 1.0.0, = 1.0.1` into versions.
///
/// Only equality ranges expand meaningfully; other tokens (`>= 0`, `< 2.0.0`)
/// are kept verbatim as a best-effort representation and will never match a
/// concrete installed version.
fn parse_version_range(range: &str) -> Vec<String> {
    range
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match part.strip_prefix("= ") {
            Some(version) => version.trim().to_owned(),
            None => part.to_owned(),
        })
        .collect()
}

/// Pulls the `after` query parameter out of the `rel="next"` link.
fn extract_next_cursor(link_header: &str) -> Option<String> {
    for link in link_header.split(',') {
        let mut parts = link.trim().split(';');
        let url_part = parts.next()?.trim();
        let rel = parts.next()?.trim();
        if rel != r#"rel="next""# {
            continue;
        }

        let url = url_part.trim_start_matches('<').trim_end_matches('>');
        let query = url.split_once('?')?.1;
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("after=") {
                return Some(value.to_owned());
            }
        }
    }
    None
}

fn normalise_severity(severity: &str) -> String {
    match severity.to_ascii_lowercase().as_str() {
        "critical" => "critical",
        "high" => "high",
        "moderate" | "medium" => "moderate",
        "low" => "low",
        // Malware with no stated severity is treated as critical.
        _ => "critical",
    }
    .to_owned()
}

fn none_if_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ranges_expand() {
        assert_eq!(
            parse_version_range("= 1.0.0, = 1.0.1"),
            vec!["1.0.0", "1.0.1"]
        );
        assert_eq!(parse_version_range("= 3.4.1"), vec!["3.4.1"]);
    }

    #[test]
    fn inequality_tokens_kept_verbatim() {
        assert_eq!(parse_version_range(">= 0"), vec![">= 0"]);
        assert_eq!(
            parse_version_range("= 1.0.0, < 2.0.0"),
            vec!["1.0.0", "< 2.0.0"]
        );
    }

    #[test]
    fn empty_range_is_empty() {
        assert!(parse_version_range("").is_empty());
        assert!(parse_version_range(" , ").is_empty());
    }

    #[test]
    fn next_cursor_from_link_header() {
        let header = r#"<https://api.github.com/advisories?ecosystem=npm&after=Y3Vyc29y>; rel="next", <https://api.github.com/advisories?ecosystem=npm>; rel="first""#;
        assert_eq!(extract_next_cursor(header), Some("Y3Vyc29y".to_owned()));
    }

    #[test]
    fn no_next_link_means_no_cursor() {
        let header = r#"<https://api.github.com/advisories?page=1>; rel="prev""#;
        assert_eq!(extract_next_cursor(header), None);
        assert_eq!(extract_next_cursor(""), None);
    }

    #[test]
    fn merge_advisory_collects_npm_packages() {
        let advisory = Advisory {
            ghsa_id: "GHSA-aaaa-bbbb-cccc".to_owned(),
            severity: "critical".to_owned(),
            vulnerabilities: vec![
                AdvisoryVulnerability {
                    package: AdvisoryPackage {
                        ecosystem: "npm".to_owned(),
                        name: "evil-pkg".to_owned(),
                    },
                    vulnerable_version_range: "= 1.0.0, = 1.0.1".to_owned(),
                },
                AdvisoryVulnerability {
                    package: AdvisoryPackage {
                        ecosystem: "pip".to_owned(),
                        name: "ignored".to_owned(),
                    },
                    vulnerable_version_range: "= 9.9.9".to_owned(),
                },
            ],
        };

        let mut packages = HashMap::new();
        merge_advisory(&mut packages, &advisory);

        assert_eq!(packages.len(), 1);
        let pkg = &packages["evil-pkg"];
        assert_eq!(pkg.versions, vec!["1.0.0", "1.0.1"]);
        assert_eq!(pkg.advisory_id.as_deref(), Some("GHSA-aaaa-bbbb-cccc"));
    }

    #[test]
    fn merge_advisory_deduplicates_versions() {
        let make = |range: &str| Advisory {
            ghsa_id: "GHSA-x".to_owned(),
            severity: "high".to_owned(),
            vulnerabilities: vec![AdvisoryVulnerability {
                package: AdvisoryPackage {
                    ecosystem: "npm".to_owned(),
                    name: "dup".to_owned(),
                },
                vulnerable_version_range: range.to_owned(),
            }],
        };

        let mut packages = HashMap::new();
        merge_advisory(&mut packages, &make("= 1.0.0"));
        merge_advisory(&mut packages, &make("= 1.0.0, = 1.0.1"));

        assert_eq!(packages["dup"].versions, vec!["1.0.0", "1.0.1"]);
    }

    #[test]
    fn severity_normalisation() {
        assert_eq!(normalise_severity("CRITICAL"), "critical");
        assert_eq!(normalise_severity("medium"), "moderate");
        assert_eq!(normalise_severity("moderate"), "moderate");
        assert_eq!(normalise_severity("low"), "low");
        assert_eq!(normalise_severity(""), "critical");
    }

    #[test]
    fn source_identity() {
        let source = AdvisorySource::new();
        assert_eq!(source.name(), "github");
        assert_eq!(source.cache_ttl(), Duration::from_secs(12 * 3600));
    }
}
