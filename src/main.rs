mod apply;
mod archive;
mod binary_diff;
mod binary_patch;
mod chunker;
mod create;
mod delta;
mod error;
mod linearize;
mod natsort;
mod patch_format;
mod rolling_hash;
mod util;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;

use crate::create::CreateOptions;
use crate::patch_format::DEFAULT_CHUNK_SIZE;

#[derive(Parser)]
#[command(
    name = "zipdelta",
    about = "Diff zip archives whose contents are related but not named the same",
    long_about = "Streams the entries of two zip archives (or directories) in a \
                  structure-aware natural order through a binary differ, so archives \
                  with renamed, regrouped or resegmented files still produce small patches. \
                  Archive contents never touch the disk except when rebuilding the target."
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a patch that turns the source archive into the target's files
    Create {
        /// Path to the source (original) archive
        #[arg(long)]
        source: PathBuf,
        /// Path to the target (updated) archive
        #[arg(long)]
        target: PathBuf,
        /// Output path for the patch file [default: <source>.zdelta]
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Bytes per diffed chunk
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },
    /// Apply a patch to the source archive and extract the result
    Apply {
        /// Path to the source archive the patch was made from
        #[arg(long)]
        source: PathBuf,
        /// Path to the patch file
        #[arg(long, short)]
        patch: PathBuf,
        /// Directory to write the rebuilt files into
        #[arg(long)]
        out_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match (cli.verbose, cli.quiet) {
        (0, true) => log::LevelFilter::Error,
        (0, false) => log::LevelFilter::Warn,
        (1, _) => log::LevelFilter::Info,
        (2, _) => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let mut logger = env_logger::Builder::new();
    logger.filter_level(level);
    // RUST_LOG, when set, overrides the flags
    logger.parse_env(env_logger::Env::default());
    logger.init();

    match cli.command {
        Commands::Create {
            source,
            target,
            output,
            chunk_size,
        } => {
            let output = output.unwrap_or_else(|| source.clone());
            println!("Creating patch...");
            println!("  Source: {}", source.display());
            println!("  Target: {}", target.display());

            let start = Instant::now();
            let options = CreateOptions { chunk_size };
            let summary = create::create_patch(&source, &target, &output, &options).await?;
            let elapsed = start.elapsed();

            println!("\nPatch created successfully!");
            println!("  Output: {}", summary.patch_path.display());
            println!("  Source entries: {}", summary.source_entries);
            println!("  Target entries: {}", summary.target_entries);
            println!("  Target bytes: {}", summary.target_bytes);
            println!("  Diff records: {}", summary.records);
            println!("  Patch size: {} bytes", summary.patch_bytes);
            println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
        }
        Commands::Apply {
            source,
            patch,
            out_dir,
        } => {
            println!("Applying patch...");
            println!("  Source: {}", source.display());
            println!("  Patch: {}", patch.display());
            println!("  Output directory: {}", out_dir.display());

            let start = Instant::now();
            let summary = apply::apply_patch(&source, &patch, &out_dir).await?;
            let elapsed = start.elapsed();

            println!("\nPatch applied successfully!");
            println!("  Files written: {}", summary.files_written);
            println!("  Bytes written: {}", summary.bytes_written);
            println!("  Diff records applied: {}", summary.records_applied);
            println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
        }
    }

    Ok(())
}
