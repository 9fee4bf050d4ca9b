//! Run configuration and the fixed layout of an installation root.

use std::path::PathBuf;

/// Manifest of base-installation files, relative to the root.
pub const MANIFEST_FILE: &str = "pg.installed";

/// Output area for archives; never packaged itself.
pub const STAGING_PREFIX: &str = "/sdk/";

/// Append-only log of symbol dump output, relative to the root.
pub const SYMBOLS_FILE: &str = "symbols";

/// Where the server loads extension shared objects from.
pub const BINARY_PREFIX: &str = "/lib/postgresql/";

/// Any installed library.
pub const LIBRARY_PREFIX: &str = "/lib/";

/// Control files and SQL scripts for extensions.
pub const EXTENSION_SHARE_PREFIX: &str = "/share/postgresql/extension";

/// Fixed install location of the symbol dump utility.
pub const DEFAULT_SYMBOL_DUMPER: &str = "/usr/local/bin/pgext-symbols";

/// Which library paths count as extension payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DetectionRule {
    /// Everything under `/lib/`
    #[default]
    #[value(name = "lib")]
    Library,
    /// Only `/lib/postgresql/`
    #[value(name = "lib-postgresql")]
    BinaryOnly,
}

#[derive(Debug, Clone)]
pub struct PackConfig {
    pub root: PathBuf,
    pub manifest: Option<PathBuf>,
    pub detection: DetectionRule,
    pub symbol_dumper: Option<PathBuf>,
    pub keep_sources: bool,
    pub follow_links: bool,
    pub name: Option<String>,
    /// Zstd level for the archive; 0 writes a plain tar.
    pub compression: i32,
}

impl PackConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            manifest: None,
            detection: DetectionRule::default(),
            symbol_dumper: Some(PathBuf::from(DEFAULT_SYMBOL_DUMPER)),
            keep_sources: false,
            follow_links: false,
            name: None,
            compression: 0,
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.manifest
            .clone()
            .unwrap_or_else(|| self.root.join(MANIFEST_FILE))
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_PREFIX.trim_matches('/'))
    }

    pub fn symbols_path(&self) -> PathBuf {
        self.root.join(SYMBOLS_FILE)
    }

    /// Final location of the archive for an extension.
    pub fn archive_path(&self, name: &str) -> PathBuf {
        let file_name = if self.compression > 0 {
            format!("{name}.tar.zst")
        } else {
            format!("{name}.tar")
        };
        self.staging_dir().join(file_name)
    }

    /// Absolute location of a root-relative posix path.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative.trim_start_matches('/'))
    }
}
