//! Loading the manifest of base-installation files.
//!
//! The manifest is written by the base build: one line per installed file,
//! each made of a one-character marker followed by the absolute path.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{PackError, Result};

/// Normalized absolute paths that belong to the base installation.
#[derive(Debug, Clone, Default)]
pub struct InstalledSet {
    paths: HashSet<String>,
}

impl InstalledSet {
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for InstalledSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            paths: iter
                .into_iter()
                .map(|p| normalize_posix(p.as_ref()))
                .collect(),
        }
    }
}

/// Read a manifest file into an [`InstalledSet`].
///
/// A missing manifest is fatal: without it every file under the root would
/// look like extension payload.
pub fn load_installed(path: &Path) -> Result<InstalledSet> {
    let contents = fs::read_to_string(path).map_err(|source| PackError::Manifest {
        path: path.to_path_buf(),
        source,
    })?;

    let set = parse_manifest(&contents);
    info!(?path, entries = set.len(), "Loaded manifest");
    Ok(set)
}

/// Parse manifest text, dropping the marker character of each line.
pub fn parse_manifest(contents: &str) -> InstalledSet {
    let mut set = InstalledSet::default();
    for line in contents.lines() {
        let mut chars = line.chars();
        chars.next();
        let rest = chars.as_str().trim();
        if rest.is_empty() {
            continue;
        }
        if !set.paths.insert(normalize_posix(rest)) {
            debug!(path = rest, "Duplicate manifest entry");
        }
    }
    set
}

/// Canonical posix form of a path, without touching the filesystem.
///
/// Repeated separators collapse, `.` components and trailing separators are
/// dropped. `..` is kept as written.
pub fn normalize_posix(path: &str) -> String {
    let absolute = path.starts_with('/');
    let parts: Vec<&str> = path
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect();

    match (absolute, parts.is_empty()) {
        (true, _) => format!("/{}", parts.join("/")),
        (false, true) => ".".to_string(),
        (false, false) => parts.join("/"),
    }
}
