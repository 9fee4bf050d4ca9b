//! Sorting the files of an installation root into payload and the rest.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::{PackConfig, STAGING_PREFIX};
use crate::error::{PackError, Result};
use crate::identify::Identifier;
use crate::manifest::{InstalledSet, load_installed, normalize_posix};
use crate::symbols::SymbolDumper;
use crate::walk::{WalkEntry, gather};

/// What happened to a candidate path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The file itself is a symlink
    Symlink,
    /// The file is only reachable through a symlinked directory
    LinkedParent,
    /// Listed in the manifest
    Installed,
    /// Inside the archive output area
    Staging,
    Payload,
    /// Matches no payload prefix; reported, not packaged
    Custom,
}

/// A file to archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackEntry {
    pub source: PathBuf,
    /// Root-relative posix path, with the leading `/`
    pub relative: String,
}

impl PackEntry {
    /// Name inside the archive: relative to the root, no leading `/`.
    ///
    /// Taken from `source` under `root` so non-UTF-8 names keep their bytes.
    pub fn archive_name<'a>(&'a self, root: &Path) -> &'a Path {
        self.source
            .strip_prefix(root)
            .unwrap_or_else(|_| Path::new(self.relative.trim_start_matches('/')))
    }
}

/// Result of classifying a whole tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackPlan {
    /// Payload in walk order
    pub entries: Vec<PackEntry>,
    pub custom: Vec<String>,
    /// Symlinked files and files under symlinked directories
    pub symlinks: Vec<String>,
    pub extension: Option<String>,
    pub symbols: Vec<String>,
}

impl PackPlan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Load the manifest, walk the root and classify it.
pub fn plan_root<D: SymbolDumper>(config: &PackConfig, dumper: D) -> Result<PackPlan> {
    let installed = load_installed(&config.manifest_path())?;
    let entries = gather(&config.root, config.follow_links)?;
    let identifier = Identifier::new(config.detection, dumper);
    classify_tree(&config.root, &installed, &entries, identifier)
}

/// Classify every walked file under `root`.
///
/// The filesystem checks run in parallel; payload identification then runs in
/// walk order so the first shared object found always names the extension.
pub fn classify_tree<D: SymbolDumper>(
    root: &Path,
    installed: &InstalledSet,
    entries: &[WalkEntry],
    mut identifier: Identifier<D>,
) -> Result<PackPlan> {
    let canonical_root = root.canonicalize().map_err(PackError::io(root))?;
    let candidates: Vec<(String, PathBuf)> = entries.iter().flat_map(WalkEntry::files).collect();

    let checked: Vec<(String, PathBuf, Result<Option<Decision>>)> = candidates
        .into_par_iter()
        .map(|(relative, source)| {
            let skip = precheck(root, &canonical_root, installed, &relative, &source);
            (relative, source, skip)
        })
        .collect();

    let mut plan = PackPlan::default();
    let mut skipped = 0usize;

    for (relative, source, skip) in checked {
        let decision = match skip? {
            Some(decision) => decision,
            None => {
                if identifier.classify(&relative, &source)? {
                    plan.entries.push(PackEntry {
                        source,
                        relative: relative.clone(),
                    });
                    Decision::Payload
                } else {
                    Decision::Custom
                }
            }
        };

        debug!(path = %relative, ?decision, "Classified");
        match decision {
            Decision::Symlink | Decision::LinkedParent => plan.symlinks.push(relative),
            Decision::Custom => plan.custom.push(relative),
            Decision::Installed | Decision::Staging => skipped += 1,
            Decision::Payload => {}
        }
    }

    (plan.extension, plan.symbols) = identifier.into_parts();

    info!(
        payload = plan.entries.len(),
        custom = plan.custom.len(),
        symlinks = plan.symlinks.len(),
        skipped,
        extension = ?plan.extension,
        "Classified tree"
    );
    Ok(plan)
}

/// The filesystem-only rules. `None` means the path is a payload candidate.
fn precheck(
    root: &Path,
    canonical_root: &Path,
    installed: &InstalledSet,
    relative: &str,
    absolute: &Path,
) -> Result<Option<Decision>> {
    let metadata = fs::symlink_metadata(absolute).map_err(PackError::io(absolute))?;
    if metadata.file_type().is_symlink() {
        return Ok(Some(Decision::Symlink));
    }

    if installed.contains(&normalize_posix(relative)) {
        return Ok(Some(Decision::Installed));
    }

    if relative.starts_with(STAGING_PREFIX) {
        return Ok(Some(Decision::Staging));
    }

    if let Some(parent) = absolute.parent() {
        let resolved = parent.canonicalize().map_err(PackError::io(parent))?;
        let parent_relative = parent.strip_prefix(root).unwrap_or(Path::new(""));
        if resolved != canonical_root.join(parent_relative) {
            return Ok(Some(Decision::LinkedParent));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    use crate::config::DetectionRule;
    use crate::symbols::NoSymbols;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, rel.as_bytes()).unwrap();
    }

    fn plan_for(root: &Path, installed: &InstalledSet, follow_links: bool) -> PackPlan {
        let entries = gather(root, follow_links).unwrap();
        let identifier = Identifier::new(DetectionRule::Library, NoSymbols);
        classify_tree(root, installed, &entries, identifier).unwrap()
    }

    fn relatives(plan: &PackPlan) -> Vec<&str> {
        plan.entries.iter().map(|e| e.relative.as_str()).collect()
    }

    #[test]
    fn test_manifest_entries_are_never_packed() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "lib/libpq.so");
        touch(dir.path(), "lib/postgresql/plpgsql.so");
        touch(dir.path(), "lib/postgresql/vector.so");

        let installed: InstalledSet = ["/lib/libpq.so", "/lib/postgresql/plpgsql.so"]
            .into_iter()
            .collect();
        let plan = plan_for(dir.path(), &installed, false);

        assert_eq!(relatives(&plan), vec!["/lib/postgresql/vector.so"]);
        assert_eq!(plan.extension.as_deref(), Some("vector"));
        assert!(plan.custom.is_empty());
    }

    #[test]
    fn test_staging_area_is_never_packed() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "sdk/old.tar");
        touch(dir.path(), "sdk/lib/postgresql/old.so");

        let plan = plan_for(dir.path(), &InstalledSet::default(), false);
        assert!(plan.is_empty());
        assert!(plan.custom.is_empty());
        assert_eq!(plan.extension, None);
    }

    #[test]
    fn test_symlinks_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "lib/postgresql/vector.so");
        symlink(
            dir.path().join("lib/postgresql/vector.so"),
            dir.path().join("lib/postgresql/vector.so.1"),
        )
        .unwrap();
        touch(dir.path(), "elsewhere/extension/linked.control");
        fs::create_dir_all(dir.path().join("share/postgresql")).unwrap();
        symlink(
            dir.path().join("elsewhere/extension"),
            dir.path().join("share/postgresql/extension"),
        )
        .unwrap();

        let plan = plan_for(dir.path(), &InstalledSet::default(), false);
        assert_eq!(relatives(&plan), vec!["/lib/postgresql/vector.so"]);
        assert_eq!(
            plan.symlinks,
            vec!["/lib/postgresql/vector.so.1", "/share/postgresql/extension"]
        );
        assert_eq!(plan.custom, vec!["/elsewhere/extension/linked.control"]);

        let followed = plan_for(dir.path(), &InstalledSet::default(), true);
        assert!(
            followed
                .symlinks
                .contains(&"/share/postgresql/extension/linked.control".to_string())
        );
        assert_eq!(relatives(&followed), vec!["/lib/postgresql/vector.so"]);
    }

    #[test]
    fn test_classification_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "bin/keep");
        touch(dir.path(), "lib/postgresql/a.so");
        touch(dir.path(), "lib/postgresql/b.so");
        touch(dir.path(), "share/postgresql/extension/a.control");
        touch(dir.path(), "tmp/stray.txt");

        let installed: InstalledSet = ["/bin/keep"].into_iter().collect();
        let first = plan_for(dir.path(), &installed, false);
        let second = plan_for(dir.path(), &installed, false);

        assert_eq!(first, second);
        assert_eq!(first.extension.as_deref(), Some("a"));
        assert_eq!(first.entries.len(), 3);
        assert_eq!(
            first.entries[0].archive_name(dir.path()),
            Path::new("lib/postgresql/a.so")
        );
    }

    #[test]
    fn test_non_utf8_names_are_classified() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "lib/postgresql/foo.so");
        let name = OsStr::from_bytes(b"foo\xff.sql");
        let sql = dir.path().join("share/postgresql/extension").join(name);
        fs::create_dir_all(sql.parent().unwrap()).unwrap();
        fs::write(&sql, b"select 1;").unwrap();

        let plan = plan_for(dir.path(), &InstalledSet::default(), false);
        assert_eq!(plan.entries.len(), 2);
        assert_eq!(plan.entries[1].source, sql);
        assert_eq!(
            plan.entries[1].archive_name(dir.path()),
            Path::new("share/postgresql/extension").join(name)
        );
        assert_eq!(plan.extension.as_deref(), Some("foo"));
    }

    #[test]
    fn test_dangling_links_are_reported_when_following() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "lib/postgresql/foo.so");
        symlink(
            dir.path().join("lib/postgresql/missing.so"),
            dir.path().join("lib/postgresql/broken.so"),
        )
        .unwrap();

        let plan = plan_for(dir.path(), &InstalledSet::default(), true);
        assert_eq!(plan.symlinks, vec!["/lib/postgresql/broken.so"]);
        assert_eq!(relatives(&plan), vec!["/lib/postgresql/foo.so"]);
    }
}
