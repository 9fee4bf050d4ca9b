//! Capturing the imported-symbol table of an extension's shared object.
//!
//! The dump itself is done by an external utility; this crate only records
//! its output lines.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::config::PackConfig;
use crate::error::{PackError, Result};

pub trait SymbolDumper {
    /// Dump the symbols of `binary`, returning every symbol line known so far.
    fn extract_symbols(&mut self, binary: &Path) -> Result<Vec<String>>;
}

impl<D: SymbolDumper + ?Sized> SymbolDumper for &mut D {
    fn extract_symbols(&mut self, binary: &Path) -> Result<Vec<String>> {
        (**self).extract_symbols(binary)
    }
}

impl<D: SymbolDumper + ?Sized> SymbolDumper for Box<D> {
    fn extract_symbols(&mut self, binary: &Path) -> Result<Vec<String>> {
        (**self).extract_symbols(binary)
    }
}

/// Never dumps anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSymbols;

impl SymbolDumper for NoSymbols {
    fn extract_symbols(&mut self, _binary: &Path) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Runs `program <binary> <root>` and appends its output to a symbols file.
///
/// The file is never truncated, so the returned lines accumulate across every
/// shared object dumped against the same root.
#[derive(Debug, Clone)]
pub struct ExternalDumper {
    program: PathBuf,
    root: PathBuf,
    symbols_file: PathBuf,
}

impl ExternalDumper {
    pub fn new(
        program: impl Into<PathBuf>,
        root: impl Into<PathBuf>,
        symbols_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            root: root.into(),
            symbols_file: symbols_file.into(),
        }
    }

    /// Whether the utility is installed.
    pub fn is_available(&self) -> bool {
        self.program.is_file()
    }
}

impl SymbolDumper for ExternalDumper {
    fn extract_symbols(&mut self, binary: &Path) -> Result<Vec<String>> {
        if !self.is_available() {
            debug!(program = ?self.program, "Symbol dump utility not installed, skipping");
            return Ok(Vec::new());
        }

        info!(program = ?self.program, ?binary, "Dumping symbols");
        let output = Command::new(&self.program)
            .arg(binary)
            .arg(&self.root)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(PackError::io(&self.program))?;

        if !output.status.success() {
            return Err(PackError::SymbolDump {
                program: self.program.clone(),
                status: output.status,
            });
        }

        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.symbols_file)
            .map_err(PackError::io(&self.symbols_file))?;
        log.write_all(&output.stdout)
            .map_err(PackError::io(&self.symbols_file))?;
        drop(log);

        let contents =
            fs::read_to_string(&self.symbols_file).map_err(PackError::io(&self.symbols_file))?;
        let lines: Vec<String> = contents.lines().map(str::to_owned).collect();
        debug!(symbols = lines.len(), "Symbols file reloaded");
        Ok(lines)
    }
}

/// The dumper a run is configured with.
pub fn configured_dumper(config: &PackConfig) -> Box<dyn SymbolDumper> {
    match &config.symbol_dumper {
        Some(program) => Box::new(ExternalDumper::new(
            program,
            &config.root,
            config.symbols_path(),
        )),
        None => Box::new(NoSymbols),
    }
}
