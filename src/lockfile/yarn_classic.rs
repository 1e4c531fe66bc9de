//! Parser for yarn.lock v1 (classic), a line-oriented format.
//!
//! A small state machine: an unindented line opens a package entry, an
//! indented `version "x.y.z"` line inside the entry emits the dependency.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use super::{yarn, DependencyList, ParsedLockfile};
use crate::error::Result;
use crate::model::{Dependency, LockfileFormat};

fn version_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^\s+version\s+"([^"]+)""#).expect("valid regex"))
}

pub(super) fn parse_content(content: &str, path: &Path) -> Result<ParsedLockfile> {
    let mut list = DependencyList::default();
    let mut current: Option<String> = None;

    for line in content.lines() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }

        if is_header_line(line) {
            current = Some(yarn::extract_package_name(line));
            continue;
        }

        if let Some(name) = current.as_deref() {
            if let Some(caps) = version_line_re().captures(line) {
                list.push(Dependency::new(name, &caps[1]));
                current = None;
            }
        }
    }

    Ok(ParsedLockfile {
        format: LockfileFormat::YarnClassic,
        path: path.to_path_buf(),
        dependencies: list.into_vec(),
    })
}

fn is_header_line(line: &str) -> bool {
    !line.starts_with(' ') && !line.starts_with('\t')
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"# THIS IS AN AUTOGENERATED FILE. DO NOT EDIT THIS FILE DIRECTLY.
# yarn lockfile v1


lodash@^4.17.0, lodash@^4.17.21:
  version "4.17.21"
  resolved "https://registry.yarnpkg.com/lodash/-/lodash-4.17.21.tgz"
  integrity sha512-v2kDE...

"@babel/core@^7.0.0":
  version "7.23.0"
  resolved "https://registry.yarnpkg.com/@babel/core/-/core-7.23.0.tgz"

ms@2.0.0:
  version "2.0.0"
"#;

    fn deps(content: &str) -> Vec<Dependency> {
        parse_content(content, Path::new("yarn.lock"))
            .unwrap()
            .dependencies
    }

    #[test]
    fn parses_entries_in_order() {
        let deps = deps(SAMPLE);
        assert_eq!(deps.len(), 3);
        assert_eq!(deps[0].name, "lodash");
        assert_eq!(deps[0].version, "4.17.21");
        assert_eq!(deps[1].name, "@babel/core");
        assert_eq!(deps[1].version, "7.23.0");
        assert_eq!(deps[2].name, "ms");
    }

    #[test]
    fn version_outside_entry_is_ignored() {
        // A version line with no preceding header has no owner.
        let content = "  version \"1.0.0\"\nlodash@^4.17.0:\n  version \"4.17.21\"\n";
        let deps = deps(content);
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name, "lodash");
    }

    #[test]
    fn duplicate_entries_are_collapsed() {
        let content = "a@^1.0.0:\n  version \"1.0.0\"\na@^1:\n  version \"1.0.0\"\n";
        let deps = deps(content);
        assert_eq!(deps.len(), 1);
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        let deps = deps("# just a comment\n\n");
        assert!(deps.is_empty());
    }

    #[test]
    fn only_first_version_per_entry_counts() {
        // The machine clears the entry after the version line, so a second
        // version-shaped line belongs to nobody.
        let content = "a@^1.0.0:\n  version \"1.0.0\"\n  version \"2.0.0\"\n";
        let deps = deps(content);
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].version, "1.0.0");
    }
}
