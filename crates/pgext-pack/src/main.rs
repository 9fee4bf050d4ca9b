use std::path::PathBuf;

use clap::Parser;
use lloggs::LoggingArgs;
use tracing::info;

use pgext_pack::{
    ArchiveOutcome, DetectionRule, PackConfig, config::DEFAULT_SYMBOL_DUMPER, configured_dumper,
    plan_root, write_archive,
};

#[derive(Parser, Debug)]
#[command(name = "pgext-pack")]
#[command(about = "Package a PostgreSQL extension's build output into a tar archive")]
struct Args {
    /// Installation root to package from
    #[arg(long, env = "PGROOT")]
    root: PathBuf,

    /// Manifest of base-installation files (defaults to ROOT/pg.installed)
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Which library paths count as extension payload
    #[arg(long, value_enum, default_value_t = DetectionRule::Library)]
    detect: DetectionRule,

    /// Symbol dump utility, run as `PROGRAM <shared-object> <root>`
    #[arg(long, env = "PGEXT_SYMBOL_DUMPER", default_value = DEFAULT_SYMBOL_DUMPER)]
    symbol_dumper: PathBuf,

    /// Never run the symbol dump utility
    #[arg(long)]
    no_symbols: bool,

    /// Leave packaged files in the installation root
    #[arg(long)]
    keep_sources: bool,

    /// Descend into symlinked directories
    #[arg(long)]
    follow_links: bool,

    /// Archive name (defaults to the detected extension name)
    #[arg(long)]
    name: Option<String>,

    /// Zstd compression level (0 to write a plain tar, 1-22 for compression)
    #[arg(long, short = 'c', default_value_t = 0)]
    compression: i32,

    /// Classify and report without writing or removing anything
    #[arg(long)]
    dry_run: bool,

    #[command(flatten)]
    logging: LoggingArgs,
}

impl Args {
    fn config(&self) -> PackConfig {
        PackConfig {
            root: self.root.clone(),
            manifest: self.manifest.clone(),
            detection: self.detect,
            symbol_dumper: (!self.no_symbols).then(|| self.symbol_dumper.clone()),
            keep_sources: self.keep_sources,
            follow_links: self.follow_links,
            name: self.name.clone(),
            compression: self.compression,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let _guard = args.logging.setup(|v| match v {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    })?;

    let config = args.config();
    info!(root = ?config.root, detection = ?config.detection, "Packaging extension");

    let rule = "=".repeat(80);
    println!("{rule}");
    let plan = plan_root(&config, configured_dumper(&config))?;
    for path in &plan.symlinks {
        println!("SYMLINK: {path}");
    }
    for path in &plan.custom {
        println!("custom: {path}");
    }
    println!("{rule}");

    let extension = config
        .name
        .as_deref()
        .or(plan.extension.as_deref())
        .unwrap_or_default();
    println!();
    println!("    EXTNAME = {extension:?}");
    println!("    imports = {}", plan.symbols.len());
    println!();

    for entry in &plan.entries {
        println!("{extension} : {} => {}", entry.source.display(), entry.relative);
    }

    if args.dry_run {
        println!("Dry run: {} file(s) would be packed", plan.entries.len());
        return Ok(());
    }

    match write_archive(&config, &plan)? {
        ArchiveOutcome::Written {
            path,
            entries,
            removed,
        } => {
            println!("Archive written to {}", path.display());
            println!("  Entries: {entries}");
            println!("  Removed: {removed}");
        }
        ArchiveOutcome::NothingToPack { extension } => {
            println!(
                "Nothing to pack for {:?}",
                extension.as_deref().unwrap_or_default()
            );
        }
    }

    Ok(())
}
