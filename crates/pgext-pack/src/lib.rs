//! pgext-pack - PostgreSQL extension packager
//!
//! Diffs an installation root against the manifest of base-installation
//! files, sorts the new files into extension payload and everything else,
//! names the extension after its shared object and archives the payload.

pub mod archive;
pub mod classify;
pub mod config;
pub mod error;
pub mod identify;
pub mod manifest;
pub mod symbols;
pub mod walk;

pub use archive::{ArchiveOutcome, write_archive};
pub use classify::{Decision, PackEntry, PackPlan, classify_tree, plan_root};
pub use config::{DetectionRule, PackConfig};
pub use error::{PackError, Result};
pub use identify::Identifier;
pub use manifest::{InstalledSet, load_installed, normalize_posix};
pub use symbols::{ExternalDumper, NoSymbols, SymbolDumper, configured_dumper};
pub use walk::{WalkEntry, gather};
