//! yarn.lock format sniffing and the shared header grammar.
//!
//! Classic (v1) files carry a `# yarn lockfile v1` comment near the top;
//! berry (v2+) files are YAML with a `__metadata:` entry. When neither
//! marker appears before real content, classic wins (the simpler grammar).

use std::path::Path;

use super::{yarn_berry, yarn_classic, ParsedLockfile};
use crate::error::Result;

pub(super) fn parse(path: &Path) -> Result<ParsedLockfile> {
    let content = super::read_to_string(path)?;
    if is_classic(&content) {
        yarn_classic::parse_content(&content, path)
    } else {
        yarn_berry::parse_content(&content, path)
    }
}

/// A file is classic iff `yarn lockfile v1` appears before any line starting
/// with `__metadata:`.
fn is_classic(content: &str) -> bool {
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if line.contains("yarn lockfile v1") {
            return true;
        }
        if line.starts_with("__metadata:") {
            return false;
        }
        // First real line carries neither marker; stop looking.
        break;
    }
    true
}

/// Extracts the package name from a yarn entry specifier.
///
/// Handles all of:
/// - `lodash@^4.17.0:`
/// - `"lodash@^4.17.0, lodash@^4.17.21":`
/// - `"@babel/core@^7.0.0":`
/// - `"@babel/core@npm:^7.0.0"` (berry keys)
pub(super) fn extract_package_name(specifier: &str) -> String {
    let mut spec = specifier.trim().trim_end_matches(':').trim_matches('"');

    // Multiple specifiers share one entry; the name is the same in each.
    if let Some(idx) = spec.find(',') {
        spec = spec[..idx].trim();
    }
    let spec = spec.trim_matches('"');

    if let Some(rest) = spec.strip_prefix('@') {
        // Scoped: the second @ separates name from range.
        match rest.find('@') {
            Some(idx) => spec[..idx + 1].to_owned(),
            None => spec.to_owned(),
        }
    } else {
        match spec.find('@') {
            Some(idx) => spec[..idx].to_owned(),
            None => spec.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_marker_detected() {
        let content = "# THIS IS AN AUTOGENERATED FILE.\n# yarn lockfile v1\n\nlodash@^4.17.0:\n";
        assert!(is_classic(content));
    }

    #[test]
    fn berry_metadata_detected() {
        let content = "__metadata:\n  version: 8\n";
        assert!(!is_classic(content));
    }

    #[test]
    fn defaults_to_classic_without_markers() {
        assert!(is_classic("lodash@^4.17.0:\n  version \"4.17.21\"\n"));
        assert!(is_classic(""));
    }

    #[test]
    fn extracts_plain_names() {
        assert_eq!(extract_package_name("lodash@^4.17.0:"), "lodash");
        assert_eq!(extract_package_name("lodash@npm:^4.17.0"), "lodash");
    }

    #[test]
    fn extracts_scoped_names() {
        assert_eq!(extract_package_name("\"@babel/core@^7.0.0\":"), "@babel/core");
        assert_eq!(extract_package_name("@babel/core@npm:^7.0.0"), "@babel/core");
    }

    #[test]
    fn multiple_specifiers_use_the_first() {
        assert_eq!(
            extract_package_name("\"lodash@^4.17.0, lodash@^4.17.21\":"),
            "lodash"
        );
        assert_eq!(
            extract_package_name("\"@babel/core@^7.0.0, @babel/core@^7.12.0\":"),
            "@babel/core"
        );
    }

    #[test]
    fn specifier_without_range_is_the_name() {
        assert_eq!(extract_package_name("lodash:"), "lodash");
    }
}
