//! Parser for yarn.lock v2+ (berry), a YAML document.

use std::path::Path;

use serde::Deserialize;

use super::{yarn, DependencyList, ParsedLockfile};
use crate::error::{Error, Result};
use crate::model::{Dependency, LockfileFormat};

#[derive(Deserialize)]
struct BerryEntry {
    #[serde(default)]
    version: String,
    #[serde(default)]
    resolution: String,
}

pub(super) fn parse_content(content: &str, path: &Path) -> Result<ParsedLockfile> {
    let doc: serde_yaml::Value = serde_yaml::from_str(content)
        .map_err(|e| Error::parse(path.display().to_string(), e))?;

    let mut list = DependencyList::default();

    if let serde_yaml::Value::Mapping(map) = doc {
        for (key, value) in map {
            let Some(key) = key.as_str() else { continue };
            if key == "__metadata" {
                continue;
            }

            let Ok(entry) = serde_yaml::from_value::<BerryEntry>(value) else {
                continue;
            };

            // Workspace entries are the project's own packages.
            if entry.resolution.starts_with("workspace:") {
                continue;
            }

            let name = yarn::extract_package_name(key);
            if name.is_empty() {
                continue;
            }

            list.push(Dependency::new(name, entry.version));
        }
    }

    Ok(ParsedLockfile {
        format: LockfileFormat::YarnBerry,
        path: path.to_path_buf(),
        dependencies: list.into_vec(),
    })
}
