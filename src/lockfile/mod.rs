//! Lockfile discovery and parsing.
//!
//! Six dialects resolve to a uniform [`ParsedLockfile`]:
//!
//! | Basename | Format |
//! |----------|--------|
//! | `package-lock.json`, `npm-shrinkwrap.json` | JSON (v1 and v2/v3) |
//! | `yarn.lock` | line-oriented (v1) or YAML (v2+) |
//! | `pnpm-lock.yaml` | YAML |
//! | `bun.lock` | JSONC |
//! | `deno.lock` | JSON |
//!
//! Every parser deduplicates on `name@version`, so a parsed lockfile never
//! contains two dependencies with the same name and version.

mod bun;
mod deno;
pub(crate) mod jsonc;
mod npm;
mod pnpm;
mod yarn;
mod yarn_berry;
mod yarn_classic;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::model::{Dependency, LockfileFormat, SUPPORTED_LOCKFILES};

/// A lockfile reduced to its dependency list.
#[derive(Debug, Clone)]
pub struct ParsedLockfile {
    /// The dialect the file was parsed as.
    pub format: LockfileFormat,

    /// Where the file was read from.
    pub path: PathBuf,

    /// Deduplicated dependencies.
    pub dependencies: Vec<Dependency>,
}

/// Tracks `name@version` pairs so parsers never emit duplicates.
#[derive(Default)]
pub(crate) struct SeenSet(HashSet<String>);

impl SeenSet {
    /// Returns true the first time a `(name, version)` pair is inserted.
    fn insert(&mut self, name: &str, version: &str) -> bool {
        self.0.insert(format!("{name}@{version}"))
    }
}

/// Collects dependencies while enforcing the no-duplicates invariant.
#[derive(Default)]
pub(crate) struct DependencyList {
    deps: Vec<Dependency>,
    seen: SeenSet,
}

impl DependencyList {
    pub(crate) fn push(&mut self, dep: Dependency) {
        if self.seen.insert(&dep.name, &dep.version) {
            self.deps.push(dep);
        }
    }

    pub(crate) fn into_vec(self) -> Vec<Dependency> {
        self.deps
    }
}

/// Checks whether a basename is a recognised lockfile.
pub fn is_lockfile(filename: &str) -> bool {
    SUPPORTED_LOCKFILES.contains(&filename)
}

/// Detects the lockfile format from the basename and parses the file.
pub fn detect_and_parse(path: &Path) -> Result<ParsedLockfile> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    match name {
        "package-lock.json" | "npm-shrinkwrap.json" => npm::parse(path),
        "yarn.lock" => yarn::parse(path),
        "pnpm-lock.yaml" => pnpm::parse(path),
        "bun.lock" => bun::parse(path),
        "deno.lock" => deno::parse(path),
        _ => Err(Error::parse(
            path.display().to_string(),
            "unknown lockfile format",
        )),
    }
}

/// Searches a directory for lockfiles.
///
/// `node_modules` and dot-directories are never descended. When `recursive`
/// is false only the root directory itself is scanned. Unreadable entries
/// are skipped silently.
pub fn find_lockfiles(root: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(Error::Input(format!(
            "not a directory: {}",
            root.display()
        )));
    }

    let walker = WalkDir::new(root).into_iter().filter_entry(move |entry| {
        if !entry.file_type().is_dir() || entry.depth() == 0 {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        if name == "node_modules" || name.starts_with('.') {
            return false;
        }
        // Non-recursive mode prunes every subdirectory of the root.
        recursive
    });

    let mut lockfiles = Vec::new();
    for entry in walker.flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        if is_lockfile(&entry.file_name().to_string_lossy()) {
            lockfiles.push(entry.into_path());
        }
    }

    Ok(lockfiles)
}

/// Reads a lockfile to a string, mapping I/O failure to a parse error so the
/// orchestrator can skip the file and continue.
pub(crate) fn read_to_string(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::parse(path.display().to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn recognises_all_supported_basenames() {
        for name in SUPPORTED_LOCKFILES {
            assert!(is_lockfile(name), "{name} should be recognised");
        }
        assert!(!is_lockfile("package.json"));
        assert!(!is_lockfile("Cargo.lock"));
    }

    #[test]
    fn dependency_list_rejects_duplicates() {
        let mut list = DependencyList::default();
        list.push(Dependency::new("lodash", "4.17.21"));
        list.push(Dependency::new("lodash", "4.17.21"));
        list.push(Dependency::new("lodash", "4.17.20"));
        assert_eq!(list.into_vec().len(), 2);
    }

    #[test]
    fn find_lockfiles_rejects_missing_root() {
        let result = find_lockfiles(Path::new("/no/such/dir"), true);
        assert!(matches!(result, Err(Error::Input(_))));
    }

    #[test]
    fn find_lockfiles_skips_node_modules_and_hidden_dirs() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package-lock.json"), "{}").unwrap();

        let nm = dir.path().join("node_modules").join("foo");
        fs::create_dir_all(&nm).unwrap();
        fs::write(nm.join("package-lock.json"), "{}").unwrap();

        let hidden = dir.path().join(".git");
        fs::create_dir_all(&hidden).unwrap();
        fs::write(hidden.join("yarn.lock"), "").unwrap();

        let nested = dir.path().join("packages").join("a");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("yarn.lock"), "").unwrap();

        let mut found = find_lockfiles(dir.path(), true).unwrap();
        found.sort();
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("package-lock.json"));
        assert!(found[1].ends_with("packages/a/yarn.lock"));
    }

    #[test]
    fn find_lockfiles_only_node_modules_returns_nothing() {
        let dir = TempDir::new().unwrap();
        let nm = dir.path().join("node_modules").join("a").join("b");
        fs::create_dir_all(&nm).unwrap();
        fs::write(nm.join("package-lock.json"), "{}").unwrap();
        fs::write(
            dir.path().join("node_modules").join("bun.lock"),
            "{}",
        )
        .unwrap();

        let found = find_lockfiles(dir.path(), true).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn find_lockfiles_accepts_dot_named_root() {
        // Pruning applies to directories met during the walk, not to the
        // root the caller named.
        let dir = TempDir::new().unwrap();
        let root = dir.path().join(".workspace");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("package-lock.json"), "{}").unwrap();

        let found = find_lockfiles(&root, false).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn find_lockfiles_non_recursive_ignores_subdirectories() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("yarn.lock"), "").unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("yarn.lock"), "").unwrap();

        let found = find_lockfiles(dir.path(), false).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0], dir.path().join("yarn.lock"));
    }

    #[test]
    fn detect_and_parse_rejects_unknown_basename() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("requirements.txt");
        fs::write(&path, "").unwrap();
        assert!(detect_and_parse(&path).is_err());
    }
}
