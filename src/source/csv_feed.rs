//! CSV IOC feed driver.
//!
//! Fetches DataDog's consolidated Shai-Hulud IOC list: one HTTP GET, a CSV
//! body with a header row. Column positions are discovered by
//! case-insensitive header matching so upstream column reordering does not
//! break the parse.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::IocSource;
use crate::error::{Error, Result};
use crate::model::{SourcePackage, SourceRecord};

const DEFAULT_URL: &str = "https://raw.githubusercontent.com/DataDog/indicators-of-compromise/main/shai-hulud-2.0/consolidated_iocs.csv";

const CACHE_TTL: Duration = Duration::from_secs(6 * 3600);

const CAMPAIGN: &str = "shai-hulud-v2";

/// IOC source backed by DataDog's consolidated CSV list.
pub struct CsvFeedSource {
    url: String,
    ttl: Duration,
}

impl CsvFeedSource {
    pub fn new() -> Self {
        Self {
            url: DEFAULT_URL.to_owned(),
            ttl: CACHE_TTL,
        }
    }

    /// Overrides the feed URL.
    pub fn with_url(mut self, url: String) -> Self {
        self.url = url;
        self
    }

    /// Overrides the cache TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

impl Default for CsvFeedSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IocSource for CsvFeedSource {
    fn name(&self) -> &'static str {
        "datadog"
    }

    fn cache_ttl(&self) -> Duration {
        self.ttl
    }

    async fn fetch(&self, client: &reqwest::Client) -> Result<SourceRecord> {
        let response = client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::parse(
                self.name(),
                format!("unexpected status code: {}", status.as_u16()),
            ));
        }

        let body = response.text().await?;
        let packages = parse_csv(self.name(), body.as_bytes())?;

        Ok(SourceRecord {
            source: self.name().to_owned(),
            campaign: Some(CAMPAIGN.to_owned()),
            packages,
            fetched_at: Utc::now().to_rfc3339(),
        })
    }
}

struct Columns {
    name: usize,
    version: usize,
}

/// Parses the CSV body into per-package records. Malformed rows are skipped;
/// a missing required column is a parse error.
fn parse_csv(source: &str, body: &[u8]) -> Result<HashMap<String, SourcePackage>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(body);

    let header = reader
        .headers()
        .map_err(|e| Error::parse(source, e))?
        .clone();

    let cols = find_columns(&header).ok_or_else(|| {
        Error::parse(
            source,
            "CSV missing required columns (package_name, package_versions)",
        )
    })?;

    let mut packages = HashMap::new();
    for record in reader.records() {
        let Ok(record) = record else { continue };
        let Some(pkg) = parse_record(&record, &cols) else {
            continue;
        };
        packages.insert(pkg.name.clone(), pkg);
    }

    Ok(packages)
}

/// Locates the name and version columns by candidate header names.
fn find_columns(header: &csv::StringRecord) -> Option<Columns> {
    let name = find_column(header, &["package_name", "name", "package"])?;
    let version = find_column(header, &["package_versions", "version", "compromised_version"])?;
    Some(Columns { name, version })
}

fn find_column(header: &csv::StringRecord, candidates: &[&str]) -> Option<usize> {
    header.iter().position(|col| {
        let col = col.trim();
        candidates.iter().any(|c| col.eq_ignore_ascii_case(c))
    })
}

fn parse_record(record: &csv::StringRecord, cols: &Columns) -> Option<SourcePackage> {
    let name = record.get(cols.name)?.trim();
    let versions = record.get(cols.version)?.trim();
    if name.is_empty() || versions.is_empty() {
        return None;
    }

    Some(SourcePackage {
        name: name.to_owned(),
        versions: split_and_trim(versions),
        advisory_id: None,
        severity: Some("critical".to_owned()),
    })
}

/// Splits a comma-separated list, trimming whitespace and dropping empties.
fn split_and_trim(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_csv() {
        let body = b"package_name,package_versions,sources\n\
            @ctrl/tinycolor,\"3.4.1, 4.1.1\",datadog\n\
            left-pad,1.3.0,community\n";
        let packages = parse_csv("datadog", body).unwrap();

        assert_eq!(packages.len(), 2);
        let tinycolor = &packages["@ctrl/tinycolor"];
        assert_eq!(tinycolor.versions, vec!["3.4.1", "4.1.1"]);
        assert_eq!(tinycolor.severity.as_deref(), Some("critical"));
    }

    #[test]
    fn header_matching_is_case_insensitive() {
        let body = b"Package_Name,VERSION\nlodash,4.17.20\n";
        let packages = parse_csv("datadog", body).unwrap();
        assert_eq!(packages["lodash"].versions, vec!["4.17.20"]);
    }

    #[test]
    fn alternate_column_names_are_accepted() {
        let body = b"package,compromised_version\nchalk,5.6.1\n";
        let packages = parse_csv("datadog", body).unwrap();
        assert!(packages.contains_key("chalk"));
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let body = b"package_name,sources\nlodash,datadog\n";
        assert!(parse_csv("datadog", body).is_err());
    }

    #[test]
    fn header_only_body_yields_empty_record() {
        let body = b"package_name,package_versions\n";
        let packages = parse_csv("datadog", body).unwrap();
        assert!(packages.is_empty());
    }

    #[test]
    fn rows_with_blank_fields_are_skipped() {
        let body = b"package_name,package_versions\n,1.0.0\nlodash,\nok,2.0.0\n";
        let packages = parse_csv("datadog", body).unwrap();
        assert_eq!(packages.len(), 1);
        assert!(packages.contains_key("ok"));
    }

    #[test]
    fn version_list_drops_empty_tokens() {
        assert_eq!(split_and_trim("1.0.0, , 1.0.1,"), vec!["1.0.0", "1.0.1"]);
        assert!(split_and_trim("  ").is_empty());
    }

    #[test]
    fn source_identity() {
        let source = CsvFeedSource::new();
        assert_eq!(source.name(), "datadog");
        assert_eq!(source.cache_ttl(), Duration::from_secs(6 * 3600));
    }
}
