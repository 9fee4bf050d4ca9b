//! Enumerating the installation root.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{PackError, Result};

/// The files directly inside one directory of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    /// Directory relative to the root, re-rooted at `/`
    pub dir: String,
    /// Directory as walked, for filesystem access
    pub path: PathBuf,
    pub filenames: Vec<OsString>,
}

impl WalkEntry {
    /// Root-relative posix paths of the files in this directory.
    ///
    /// Names that are not valid UTF-8 are rendered lossily; use
    /// [`WalkEntry::files`] to reach the files themselves.
    pub fn paths(&self) -> impl Iterator<Item = String> + '_ {
        self.files().map(|(relative, _)| relative)
    }

    /// Root-relative posix path and walked location of each file.
    pub fn files(&self) -> impl Iterator<Item = (String, PathBuf)> + '_ {
        self.filenames.iter().map(|name| {
            (
                join_posix(&self.dir, &name.to_string_lossy()),
                self.path.join(name),
            )
        })
    }
}

/// Recursively list every file under `root`, grouped by directory.
///
/// Directories come out in pre-order and names within a directory are sorted,
/// so two walks of an unchanged tree agree. Symlinks are listed as files of
/// their parent; with `follow_links` symlinked directories are descended into
/// instead, and links walkdir cannot follow (dangling or looping) are still
/// listed so they get reported.
pub fn gather(root: &Path, follow_links: bool) -> Result<Vec<WalkEntry>> {
    let mut entries: Vec<WalkEntry> = Vec::new();
    let mut index: HashMap<PathBuf, usize> = HashMap::new();

    for entry in WalkDir::new(root)
        .follow_links(follow_links)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => return Err(PackError::Walk(err)),
            Err(err) => {
                match err.path().filter(|path| path.is_symlink()) {
                    Some(link) => {
                        warn!(path = ?link, %err, "Cannot follow symlink");
                        push_file(&mut entries, &index, link);
                    }
                    None => warn!(path = ?err.path(), %err, "Skipping unreadable entry"),
                }
                continue;
            }
        };

        if entry.file_type().is_dir() {
            index.insert(entry.path().to_path_buf(), entries.len());
            entries.push(WalkEntry {
                dir: posix_relative(root, entry.path()),
                path: entry.path().to_path_buf(),
                filenames: Vec::new(),
            });
        } else {
            push_file(&mut entries, &index, entry.path());
        }
    }

    let file_count: usize = entries.iter().map(|e| e.filenames.len()).sum();
    info!(directories = entries.len(), files = file_count, "Walked tree");
    Ok(entries)
}

fn push_file(entries: &mut [WalkEntry], index: &HashMap<PathBuf, usize>, path: &Path) {
    let slot = path.parent().and_then(|parent| index.get(parent));
    match (slot, path.file_name()) {
        (Some(slot), Some(name)) => entries[*slot].filenames.push(name.to_os_string()),
        _ => warn!(?path, "Entry outside any walked directory"),
    }
}

/// `path` relative to `root`, with unix slashes and a leading `/`.
pub fn posix_relative(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    format!("/{}", parts.join("/"))
}

/// Join a root-relative directory and a file name.
pub fn join_posix(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}
