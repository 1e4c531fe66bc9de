//! Dependency and lockfile identity types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lockfile basenames the scanner recognises.
pub const SUPPORTED_LOCKFILES: [&str; 6] = [
    "package-lock.json",
    "npm-shrinkwrap.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "bun.lock",
    "deno.lock",
];

/// The lockfile dialect a file was parsed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LockfileFormat {
    /// package-lock.json / npm-shrinkwrap.json
    Npm,
    /// yarn.lock v1
    YarnClassic,
    /// yarn.lock v2+
    YarnBerry,
    /// pnpm-lock.yaml
    Pnpm,
    /// bun.lock
    Bun,
    /// deno.lock
    Deno,
}

impl LockfileFormat {
    /// Returns the stable identifier used in report documents.
    ///
    /// # Example
    ///
    /// ```
    /// use supplyscan::model::LockfileFormat;
    ///
    /// assert_eq!(LockfileFormat::YarnClassic.as_str(), "yarn-classic");
    /// ```
    pub fn as_str(&self) -> &'static str {
        match self {
            LockfileFormat::Npm => "npm",
            LockfileFormat::YarnClassic => "yarn-classic",
            LockfileFormat::YarnBerry => "yarn-berry",
            LockfileFormat::Pnpm => "pnpm",
            LockfileFormat::Bun => "bun",
            LockfileFormat::Deno => "deno",
        }
    }
}

impl std::fmt::Display for LockfileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single package reference extracted from a lockfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Package name as published (e.g. `lodash`, `@babel/core`).
    pub name: String,

    /// Resolved version string. Opaque; never interpreted as semver.
    pub version: String,

    /// True when the package manager flagged this as development-only.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dev: bool,

    /// True when the dependency is optional.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

impl Dependency {
    /// Creates a non-dev, non-optional dependency.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            dev: false,
            optional: false,
        }
    }
}

/// Metadata about one parsed lockfile, as reported in scan results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockfileInfo {
    /// Path the lockfile was read from.
    pub path: PathBuf,

    /// Format identifier (`npm`, `yarn-classic`, ...).
    #[serde(rename = "type")]
    pub format: LockfileFormat,

    /// Number of dependencies after dev filtering.
    pub dependencies: usize,
}
