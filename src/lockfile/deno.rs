//! Parser for `deno.lock`, extracting the npm package section.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use super::{DependencyList, ParsedLockfile};
use crate::error::{Error, Result};
use crate::model::{Dependency, LockfileFormat};

#[derive(Deserialize)]
struct DenoLockfile {
    #[serde(default)]
    packages: DenoPackages,
}

#[derive(Default, Deserialize)]
struct DenoPackages {
    #[serde(default)]
    npm: HashMap<String, Value>,
}

pub(super) fn parse(path: &Path) -> Result<ParsedLockfile> {
    let content = super::read_to_string(path)?;
    parse_content(&content, path)
}

fn parse_content(content: &str, path: &Path) -> Result<ParsedLockfile> {
    let lockfile: DenoLockfile = serde_json::from_str(content)
        .map_err(|e| Error::parse(path.display().to_string(), e))?;

    let mut list = DependencyList::default();

    for key in lockfile.packages.npm.keys() {
        let Some((name, version)) = parse_npm_key(key) else {
            continue;
        };
        list.push(Dependency::new(name, version));
    }

    Ok(ParsedLockfile {
        format: LockfileFormat::Deno,
        path: path.to_path_buf(),
        dependencies: list.into_vec(),
    })
}

/// Splits `name@version` / `@scope/name@version`, stripping any `_peer`
/// suffix from the version.
fn parse_npm_key(key: &str) -> Option<(String, String)> {
    let (name, version) = if let Some(rest) = key.strip_prefix('@') {
        let at = rest.find('@')?;
        (key[..at + 1].to_owned(), key[at + 2..].to_owned())
    } else {
        let at = key.find('@')?;
        (key[..at].to_owned(), key[at + 1..].to_owned())
    };

    if name.is_empty() || version.is_empty() {
        return None;
    }

    let version = match version.find('_') {
        Some(idx) => version[..idx].to_owned(),
        None => version,
    };

    Some((name, version))
}
