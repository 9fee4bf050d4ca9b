//! Writing the payload archive and clearing packaged files from the root.

use std::fs::{self, Permissions};
use std::io::{BufWriter, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::classify::{PackEntry, PackPlan};
use crate::config::PackConfig;
use crate::error::{PackError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// The plan had no payload; nothing was created or removed.
    NothingToPack { extension: Option<String> },
    Written {
        path: PathBuf,
        entries: usize,
        /// Source files deleted after the archive was persisted
        removed: usize,
    },
}

/// Archive every entry of `plan` into the staging directory, then delete the
/// sources unless `keep_sources` is set.
///
/// The archive is assembled in a temporary file and only renamed into place
/// once complete, so a failed write leaves no archive behind. Source removal
/// is not transactional: if deleting one file fails, those already deleted
/// stay deleted.
pub fn write_archive(config: &PackConfig, plan: &PackPlan) -> Result<ArchiveOutcome> {
    if plan.is_empty() {
        info!(extension = ?plan.extension, "Nothing to pack");
        return Ok(ArchiveOutcome::NothingToPack {
            extension: plan.extension.clone(),
        });
    }

    let name = config
        .name
        .as_deref()
        .or(plan.extension.as_deref())
        .filter(|name| !name.is_empty())
        .ok_or(PackError::NoExtensionName)?;

    let staging = config.staging_dir();
    let path = config.archive_path(name);
    info!(?path, entries = plan.entries.len(), "Writing archive");

    let mut temp = NamedTempFile::new_in(&staging).map_err(PackError::io(&staging))?;
    {
        let writer = BufWriter::new(temp.as_file_mut());
        if config.compression > 0 {
            debug!(level = config.compression, "Compressing archive");
            let encoder = zstd::stream::Encoder::new(writer, config.compression)
                .map_err(PackError::Archive)?;
            let encoder = append_entries(encoder, &config.root, &plan.entries)?;
            encoder
                .finish()
                .and_then(|mut w| w.flush())
                .map_err(PackError::Archive)?;
        } else {
            let mut writer = append_entries(writer, &config.root, &plan.entries)?;
            writer.flush().map_err(PackError::Archive)?;
        }
    }

    fs::set_permissions(temp.path(), Permissions::from_mode(0o644))
        .map_err(PackError::io(temp.path()))?;
    temp.persist(&path)
        .map_err(|err| PackError::io(&path)(err.error))?;

    let mut removed = 0;
    if config.keep_sources {
        debug!("Keeping packaged source files");
    } else {
        for entry in &plan.entries {
            fs::remove_file(&entry.source).map_err(PackError::io(&entry.source))?;
            removed += 1;
        }
        info!(removed, "Removed packaged files");
    }

    Ok(ArchiveOutcome::Written {
        path,
        entries: plan.entries.len(),
        removed,
    })
}

fn append_entries<W: Write>(writer: W, root: &Path, entries: &[PackEntry]) -> Result<W> {
    let mut builder = tar::Builder::new(writer);
    builder.follow_symlinks(false);

    for entry in entries {
        let name = entry.archive_name(root);
        debug!(source = ?entry.source, ?name, "Adding entry");
        builder
            .append_path_with_name(&entry.source, name)
            .map_err(PackError::io(&entry.source))?;
    }

    builder.into_inner().map_err(PackError::Archive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Read;

    fn plan_with(root: &Path, files: &[(&str, &str)]) -> PackPlan {
        let mut plan = PackPlan::default();
        for (relative, contents) in files {
            let source = root.join(relative.trim_start_matches('/'));
            fs::create_dir_all(source.parent().unwrap()).unwrap();
            fs::write(&source, contents).unwrap();
            plan.entries.push(PackEntry {
                source,
                relative: relative.to_string(),
            });
        }
        plan
    }

    fn read_entries<R: Read>(reader: R) -> Vec<(String, String)> {
        let mut archive = tar::Archive::new(reader);
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let name = entry.path().unwrap().to_string_lossy().into_owned();
                let mut contents = String::new();
                entry.read_to_string(&mut contents).unwrap();
                (name, contents)
            })
            .collect()
    }

    #[test]
    fn test_empty_plan_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sdk")).unwrap();
        let config = PackConfig::new(dir.path());
        let plan = PackPlan {
            extension: Some("vector".into()),
            ..Default::default()
        };

        let outcome = write_archive(&config, &plan).unwrap();
        assert_eq!(
            outcome,
            ArchiveOutcome::NothingToPack {
                extension: Some("vector".into())
            }
        );
        assert_eq!(fs::read_dir(dir.path().join("sdk")).unwrap().count(), 0);
    }

    #[test]
    fn test_written_archive_holds_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sdk")).unwrap();
        let config = PackConfig::new(dir.path());
        let mut plan = plan_with(
            dir.path(),
            &[
                ("/lib/postgresql/vector.so", "elf"),
                ("/share/postgresql/extension/vector.control", "comment"),
            ],
        );
        plan.extension = Some("vector".into());

        let outcome = write_archive(&config, &plan).unwrap();
        let path = dir.path().join("sdk/vector.tar");
        assert_eq!(
            outcome,
            ArchiveOutcome::Written {
                path: path.clone(),
                entries: 2,
                removed: 2,
            }
        );

        let entries = read_entries(File::open(&path).unwrap());
        assert_eq!(
            entries,
            vec![
                ("lib/postgresql/vector.so".to_string(), "elf".to_string()),
                (
                    "share/postgresql/extension/vector.control".to_string(),
                    "comment".to_string()
                ),
            ]
        );
        for entry in &plan.entries {
            assert!(!entry.source.exists());
        }
    }

    #[test]
    fn test_keep_sources_and_compression() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sdk")).unwrap();
        let mut config = PackConfig::new(dir.path());
        config.keep_sources = true;
        config.compression = 3;
        config.name = Some("renamed".into());
        let mut plan = plan_with(dir.path(), &[("/lib/postgresql/vector.so", "elf")]);
        plan.extension = Some("vector".into());

        let outcome = write_archive(&config, &plan).unwrap();
        let path = dir.path().join("sdk/renamed.tar.zst");
        assert!(matches!(outcome, ArchiveOutcome::Written { removed: 0, .. }));
        assert!(plan.entries[0].source.exists());

        let decoder = zstd::stream::Decoder::new(File::open(&path).unwrap()).unwrap();
        let entries = read_entries(decoder);
        assert_eq!(
            entries,
            vec![("lib/postgresql/vector.so".to_string(), "elf".to_string())]
        );
    }

    #[test]
    fn test_payload_without_name_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sdk")).unwrap();
        let config = PackConfig::new(dir.path());
        let plan = plan_with(dir.path(), &[("/lib/libhelper.a", "ar")]);

        let err = write_archive(&config, &plan).unwrap_err();
        assert!(matches!(err, PackError::NoExtensionName));
        assert!(plan.entries[0].source.exists());
    }

    #[test]
    fn test_missing_staging_dir_keeps_sources() {
        let dir = tempfile::tempdir().unwrap();
        let config = PackConfig::new(dir.path());
        let mut plan = plan_with(dir.path(), &[("/lib/postgresql/vector.so", "elf")]);
        plan.extension = Some("vector".into());

        let err = write_archive(&config, &plan).unwrap_err();
        assert!(matches!(err, PackError::Io { .. }));
        assert!(plan.entries[0].source.exists());
    }
}
