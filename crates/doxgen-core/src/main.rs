//! doxgen: generate an MkDocs API reference from a source tree.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use doxgen_core::config::DoxConfig;
use doxgen_core::indexer::parser::{capability_report, StructuralParser};
use doxgen_core::indexer::pipeline::Pipeline;
use doxgen_core::store::cache::IncrementalCache;

#[derive(Parser)]
#[command(
    name = "doxgen",
    about = "Generate API documentation sites from source code"
)]
#[command(version, propagate_version = true)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Document a source tree
    Generate {
        /// Source root
        path: PathBuf,

        /// Output directory (defaults to <path>/site)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Maximum number of files to process
        #[arg(short = 'n', long)]
        max_files: Option<usize>,

        /// Process every file regardless of the cache
        #[arg(long)]
        full: bool,

        /// Config file (defaults to <path>/.doxgen.yml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Forget every processed file of a project
    ClearCache {
        /// Source root
        path: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the extraction result of one file as JSON
    Parse {
        file: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show which language grammars are available
    Languages,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "doxgen=debug" } else { "doxgen=info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Generate {
            path,
            output,
            max_files,
            full,
            config,
        } => {
            let config = DoxConfig::resolve(&path, config.as_deref())?;
            let output = output.unwrap_or_else(|| path.join("site"));
            let max_files = max_files.unwrap_or(config.discovery.max_files);
            let pipeline = Pipeline::for_site(config, &path, &output)?;
            let stats = pipeline
                .run(&path, &output, max_files, !full)
                .with_context(|| format!("cannot document {}", path.display()))?;
            println!("{}", stats.summary());
        }
        Commands::ClearCache { path, config } => {
            let config = DoxConfig::resolve(&path, config.as_deref())?;
            let cache = IncrementalCache::open(&config.cache, &path, &path.join("site"));
            let tracked = cache.tracked_count();
            cache.clear()?;
            println!("cleared {tracked} entries from {}", cache.store_path().display());
        }
        Commands::Parse { file, config } => {
            let root = file.parent().unwrap_or(Path::new("."));
            let config = DoxConfig::resolve(root, config.as_deref())?;
            let parser = StructuralParser::new(&config.parser);
            match parser.extract(&file) {
                Ok(parsed) => println!("{}", serde_json::to_string_pretty(&parsed)?),
                Err(err) => {
                    println!("{}", serde_json::to_string_pretty(&err)?);
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Commands::Languages => {
            let report = capability_report();
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.all_available {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
