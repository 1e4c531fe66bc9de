//! Parser for `pnpm-lock.yaml`.
//!
//! Package keys changed shape across pnpm versions:
//!
//! - v5: `/lodash/4.17.21`, `/@babel/core/7.23.0`
//! - v6+: `/lodash@4.17.21`, `lodash@4.17.21`, `/@babel/core@7.23.0`
//!
//! Peer-dependency resolutions are encoded as a `_suffix` on the version and
//! are stripped.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::{DependencyList, ParsedLockfile};
use crate::error::{Error, Result};
use crate::model::{Dependency, LockfileFormat};

#[derive(Deserialize)]
struct PnpmLockfile {
    #[serde(default)]
    packages: HashMap<String, PnpmPackage>,
}

#[derive(Default, Deserialize)]
struct PnpmPackage {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    dev: bool,
    #[serde(default)]
    optional: bool,
}

pub(super) fn parse(path: &Path) -> Result<ParsedLockfile> {
    let content = super::read_to_string(path)?;
    parse_content(&content, path)
}

fn parse_content(content: &str, path: &Path) -> Result<ParsedLockfile> {
    let lockfile: PnpmLockfile = serde_yaml::from_str(content)
        .map_err(|e| Error::parse(path.display().to_string(), e))?;

    let mut list = DependencyList::default();

    for (key, pkg) in &lockfile.packages {
        let explicit = pkg.version.as_deref().filter(|v| !v.is_empty());
        let Some((name, version)) = parse_package_key(key, explicit) else {
            continue;
        };
        list.push(Dependency {
            name,
            version,
            dev: pkg.dev,
            optional: pkg.optional,
        });
    }

    Ok(ParsedLockfile {
        format: LockfileFormat::Pnpm,
        path: path.to_path_buf(),
        dependencies: list.into_vec(),
    })
}

/// Splits a pnpm package key into name and version.
///
/// An explicit `version` field (v6+ entries carry one) wins over the key.
fn parse_package_key(key: &str, explicit_version: Option<&str>) -> Option<(String, String)> {
    let key = key.strip_prefix('/').unwrap_or(key);

    if let Some(version) = explicit_version {
        let name = name_from_key(key)?;
        return Some((name, version.to_owned()));
    }

    if let Some(rest) = key.strip_prefix('@') {
        // Scoped: @scope/name@version (v6+) or @scope/name/version (v5).
        let slash = rest.find('/')?;
        let (scope, tail) = rest.split_at(slash);
        let tail = &tail[1..];

        if let Some(at) = tail.find('@') {
            let name = format!("@{scope}/{}", &tail[..at]);
            return Some((name, strip_peer_suffix(&tail[at + 1..])));
        }
        let slash = tail.find('/')?;
        let name = format!("@{scope}/{}", &tail[..slash]);
        Some((name, strip_peer_suffix(&tail[slash + 1..])))
    } else {
        // Unscoped: a slash before any @ means the v5 name/version form.
        let at = key.find('@');
        let slash = key.find('/');
        match (slash, at) {
            (Some(s), Some(a)) if s < a => {
                Some((key[..s].to_owned(), strip_peer_suffix(&key[s + 1..])))
            }
            (Some(s), None) => Some((key[..s].to_owned(), strip_peer_suffix(&key[s + 1..]))),
            (_, Some(a)) if a > 0 => {
                Some((key[..a].to_owned(), strip_peer_suffix(&key[a + 1..])))
            }
            _ => None,
        }
    }
}

fn name_from_key(key: &str) -> Option<String> {
    if let Some(rest) = key.strip_prefix('@') {
        let slash = rest.find('/')?;
        let tail = &rest[slash + 1..];
        let end = tail
            .find('@')
            .or_else(|| tail.find('/'))
            .unwrap_or(tail.len());
        Some(format!("@{}/{}", &rest[..slash], &tail[..end]))
    } else {
        let end = key.find('@').or_else(|| key.find('/')).unwrap_or(key.len());
        if end == 0 {
            return None;
        }
        Some(key[..end].to_owned())
    }
}

/// pnpm encodes peer resolutions as `1.0.0_react@18.2.0`; everything from
/// the first underscore is dropped.
fn strip_peer_suffix(version: &str) -> String {
    match version.find('_') {
        Some(idx) => version[..idx].to_owned(),
        None => version.to_owned(),
    }
}
