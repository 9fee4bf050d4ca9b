//! Deciding which files belong to the extension, and naming it.

use std::path::Path;

use tracing::{debug, info};

use crate::config::{BINARY_PREFIX, DetectionRule, EXTENSION_SHARE_PREFIX, LIBRARY_PREFIX};
use crate::error::Result;
use crate::symbols::SymbolDumper;

/// Payload test with accumulated extension name and symbol list.
///
/// The first shared object under the binary-install prefix names the
/// extension; every shared object there is handed to the symbol dumper.
/// Extensions without a shared object are named after their first control
/// file instead.
#[derive(Debug)]
pub struct Identifier<D> {
    rule: DetectionRule,
    dumper: D,
    extension: Option<String>,
    control: Option<String>,
    symbols: Vec<String>,
}

impl<D: SymbolDumper> Identifier<D> {
    pub fn new(rule: DetectionRule, dumper: D) -> Self {
        Self {
            rule,
            dumper,
            extension: None,
            control: None,
            symbols: Vec::new(),
        }
    }

    /// Whether the file at root-relative `relative` (found at `absolute`) is
    /// extension payload.
    pub fn classify(&mut self, relative: &str, absolute: &Path) -> Result<bool> {
        if relative.starts_with(BINARY_PREFIX) {
            if is_shared_object(relative) {
                self.found_shared_object(relative, absolute)?;
            }
            return Ok(true);
        }

        if self.rule == DetectionRule::Library && relative.starts_with(LIBRARY_PREFIX) {
            return Ok(true);
        }

        if relative.starts_with(EXTENSION_SHARE_PREFIX) {
            if self.control.is_none() && has_extension(relative, "control") {
                debug!(path = relative, "Found control file");
                self.control = Some(file_stem(relative));
            }
            return Ok(true);
        }

        Ok(false)
    }

    fn found_shared_object(&mut self, relative: &str, absolute: &Path) -> Result<()> {
        if let Some(name) = self.extension.as_deref() {
            debug!(extension = %name, path = relative, "Additional shared object");
        } else {
            let stem = file_stem(relative);
            info!(extension = %stem, path = relative, "Found extension binary");
            self.extension = Some(stem);
        }

        self.symbols = self.dumper.extract_symbols(absolute)?;
        Ok(())
    }

    /// The shared object's stem, or else the first control file's stem.
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref().or(self.control.as_deref())
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Consume the identifier, returning the extension name and symbols.
    pub fn into_parts(self) -> (Option<String>, Vec<String>) {
        if self.extension.is_none() && self.control.is_some() {
            info!(extension = ?self.control, "No shared object, named after control file");
        }
        (self.extension.or(self.control), self.symbols)
    }
}

fn is_shared_object(relative: &str) -> bool {
    has_extension(relative, "so")
}

fn has_extension(relative: &str, extension: &str) -> bool {
    Path::new(relative)
        .extension()
        .is_some_and(|ext| ext == extension)
}

fn file_stem(relative: &str) -> String {
    Path::new(relative)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
