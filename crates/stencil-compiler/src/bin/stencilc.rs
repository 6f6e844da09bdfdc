//! Stencil build-step CLI

use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use clap::Parser;
use stencil_compiler::config::parse_utc_offset;
use stencil_compiler::{BuildConfig, FileSet, Orchestrator, DEFAULT_MANIFEST};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stencilc")]
#[command(about = "Precompile templates into per-partner artifact caches")]
#[command(version)]
struct Args {
    /// Build manifest (defaults to ./stencil.toml when present)
    #[arg(short, long, value_name = "FILE")]
    manifest: Option<PathBuf>,

    /// Directory for compiled templates
    #[arg(long, value_name = "DIR")]
    compile_dir: Option<PathBuf>,

    /// Additional plugin directory (repeatable)
    #[arg(long = "plugins-dir", value_name = "DIR")]
    plugin_dirs: Vec<PathBuf>,

    /// Directory listing the partners
    #[arg(long, value_name = "DIR")]
    partners_dir: Option<PathBuf>,

    /// Recompile every template even if it is up to date
    #[arg(short, long)]
    force: bool,

    /// Compile every template once per partner
    #[arg(short, long)]
    expand: bool,

    /// UTC offset for artifact timestamps, e.g. -05:00
    #[arg(long, value_name = "OFFSET", allow_hyphen_values = true)]
    utc_offset: Option<String>,

    /// Template directory to scan (repeatable)
    #[arg(long = "fileset", value_name = "DIR")]
    filesets: Vec<PathBuf>,

    /// Include pattern applied to every --fileset
    #[arg(long = "include", value_name = "GLOB")]
    includes: Vec<String>,

    /// Exclude pattern applied to every --fileset
    #[arg(long = "exclude", value_name = "GLOB")]
    excludes: Vec<String>,

    /// Log each compiled template
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args) {
        eprintln!("Build failed: {:#}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = build_config(args)?;

    let mut orchestrator = Orchestrator::new(&config);
    if let Err(e) = orchestrator.run() {
        tracing::error!("Build stopped: {}", orchestrator.counters());
        return Err(e.into());
    }
    Ok(())
}

/// Manifest settings overlaid with command-line flags
fn build_config(args: Args) -> anyhow::Result<BuildConfig> {
    let manifest = match args.manifest {
        Some(path) => Some(path),
        None => Some(PathBuf::from(DEFAULT_MANIFEST)).filter(|p| p.is_file()),
    };

    let mut config = match manifest {
        Some(path) => BuildConfig::load(&path)
            .with_context(|| format!("loading manifest {}", path.display()))?,
        None => BuildConfig::new(),
    };

    if let Some(dir) = args.compile_dir {
        config.compile_dir = Some(dir);
    }
    if let Some(dir) = args.partners_dir {
        config.partners_dir = Some(dir);
    }
    config.plugin_dirs.extend(args.plugin_dirs);
    config.force_compile |= args.force;
    config.expand_partners |= args.expand;
    if let Some(offset) = args.utc_offset {
        config.utc_offset = parse_utc_offset(&offset)?;
    }

    config.filesets.extend(
        args.filesets
            .iter()
            .map(|dir| cli_fileset(dir, &args.includes, &args.excludes)),
    );

    Ok(config)
}

fn cli_fileset(dir: &Path, includes: &[String], excludes: &[String]) -> FileSet {
    let mut fileset = FileSet::new(dir);
    fileset.includes = includes.to_vec();
    fileset.excludes = excludes.to_vec();
    fileset
}
