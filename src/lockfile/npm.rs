//! Parser for `package-lock.json` and `npm-shrinkwrap.json`.
//!
//! Lockfile v2/v3 stores a flat `packages` map keyed by `node_modules/...`
//! paths; v1 nests a recursive `dependencies` tree. Both collapse to the
//! same dependency list.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::{DependencyList, ParsedLockfile};
use crate::error::{Error, Result};
use crate::model::{Dependency, LockfileFormat};

#[derive(Deserialize)]
struct NpmLockfile {
    #[serde(default, rename = "lockfileVersion")]
    lockfile_version: i64,
    #[serde(default)]
    packages: HashMap<String, NpmPackageEntry>,
    #[serde(default)]
    dependencies: HashMap<String, NpmDependencyEntry>,
}

#[derive(Deserialize)]
struct NpmPackageEntry {
    #[serde(default)]
    version: String,
    #[serde(default)]
    dev: bool,
    #[serde(default)]
    optional: bool,
}

#[derive(Deserialize)]
struct NpmDependencyEntry {
    #[serde(default)]
    version: String,
    #[serde(default)]
    dev: bool,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    dependencies: HashMap<String, NpmDependencyEntry>,
}

pub(super) fn parse(path: &Path) -> Result<ParsedLockfile> {
    let content = super::read_to_string(path)?;
    let deps = parse_content(&content, path)?;
    Ok(ParsedLockfile {
        format: LockfileFormat::Npm,
        path: path.to_path_buf(),
        dependencies: deps,
    })
}

fn parse_content(content: &str, path: &Path) -> Result<Vec<Dependency>> {
    let lockfile: NpmLockfile = serde_json::from_str(content)
        .map_err(|e| Error::parse(path.display().to_string(), e))?;

    let mut list = DependencyList::default();

    if lockfile.lockfile_version >= 2 && !lockfile.packages.is_empty() {
        collect_packages(&lockfile.packages, &mut list);
    } else if !lockfile.dependencies.is_empty() {
        for (name, entry) in &lockfile.dependencies {
            walk_v1(name, entry, &mut list);
        }
    }

    Ok(list.into_vec())
}

/// v2/v3: each key is a `node_modules/...` path; the root entry is the empty
/// key and is skipped.
fn collect_packages(packages: &HashMap<String, NpmPackageEntry>, list: &mut DependencyList) {
    for (pkg_path, entry) in packages {
        if pkg_path.is_empty() {
            continue;
        }
        let Some(name) = extract_package_name(pkg_path) else {
            continue;
        };
        list.push(Dependency {
            name,
            version: entry.version.clone(),
            dev: entry.dev,
            optional: entry.optional,
        });
    }
}

/// v1: recursive descent over nested `dependencies` trees. The same
/// transitive package can appear at many levels, so the list dedups.
fn walk_v1(name: &str, entry: &NpmDependencyEntry, list: &mut DependencyList) {
    list.push(Dependency {
        name: name.to_owned(),
        version: entry.version.clone(),
        dev: entry.dev,
        optional: entry.optional,
    });

    for (nested_name, nested) in &entry.dependencies {
        walk_v1(nested_name, nested, list);
    }
}

/// Extracts the package name from a `node_modules/...` path: the text after
/// the final `node_modules/`, trimmed to `@scope/name` or the first segment.
fn extract_package_name(path: &str) -> Option<String> {
    let tail = path.rsplit("node_modules/").next()?;
    if tail == path || tail.is_empty() {
        // No node_modules/ prefix, or nothing after it.
        return None;
    }

    if let Some(stripped) = tail.strip_prefix('@') {
        let mut segments = stripped.splitn(3, '/');
        let scope = segments.next()?;
        let name = segments.next()?;
        return Some(format!("@{scope}/{name}"));
    }

    tail.split('/').next().map(|s| s.to_owned())
}
