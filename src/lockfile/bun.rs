//! Parser for `bun.lock` (JSONC).
//!
//! The `packages` map keys are `name@version` / `@scope/name@version`; the
//! value is the resolution string, or an array whose first element is the
//! resolution.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use super::{jsonc, DependencyList, ParsedLockfile};
use crate::error::{Error, Result};
use crate::model::{Dependency, LockfileFormat};

#[derive(Deserialize)]
struct BunLockfile {
    #[serde(default)]
    packages: HashMap<String, Value>,
}

pub(super) fn parse(path: &Path) -> Result<ParsedLockfile> {
    let raw = std::fs::read(path).map_err(|e| Error::parse(path.display().to_string(), e))?;
    parse_bytes(&raw, path)
}

fn parse_bytes(raw: &[u8], path: &Path) -> Result<ParsedLockfile> {
    let stripped = jsonc::strip_comments(raw);
    let lockfile: BunLockfile = serde_json::from_slice(&stripped)
        .map_err(|e| Error::parse(path.display().to_string(), e))?;

    let mut list = DependencyList::default();

    for (key, entry) in &lockfile.packages {
        if key.is_empty() || key.starts_with("workspace:") {
            continue;
        }

        let Some(resolution) = resolution_of(entry) else {
            continue;
        };
        let version = extract_version(resolution);
        let name = extract_package_name(key);
        if name.is_empty() || version.is_empty() {
            continue;
        }

        list.push(Dependency::new(name, version));
    }

    Ok(ParsedLockfile {
        format: LockfileFormat::Bun,
        path: path.to_path_buf(),
        dependencies: list.into_vec(),
    })
}

/// The entry is a resolution string or an array starting with one.
fn resolution_of(entry: &Value) -> Option<&str> {
    match entry {
        Value::String(s) => Some(s),
        Value::Array(items) => items.first()?.as_str(),
        _ => None,
    }
}

fn extract_package_name(key: &str) -> String {
    if let Some(rest) = key.strip_prefix('@') {
        match rest.find('@') {
            Some(idx) => key[..idx + 1].to_owned(),
            None => key.to_owned(),
        }
    } else {
        match key.find('@') {
            Some(idx) => key[..idx].to_owned(),
            None => key.to_owned(),
        }
    }
}

/// A resolution starting with a digit is a bare version; otherwise the
/// version follows the last `@` (e.g. `lodash@4.17.21`).
fn extract_version(resolution: &str) -> String {
    if resolution
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit())
    {
        return resolution.to_owned();
    }
    match resolution.rfind('@') {
        Some(idx) => resolution[idx + 1..].to_owned(),
        None => resolution.to_owned(),
    }
}
