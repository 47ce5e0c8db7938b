//! AtlasBlob CLI
//!
//! Command-line interface for operating on an AtlasBlob data directory.

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::time::Duration;

use atlasblob::{AtlasError, Config, Storage};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// AtlasBlob CLI
#[derive(Parser, Debug)]
#[command(name = "atlasblob-cli")]
#[command(about = "CLI for the AtlasBlob blob store")]
#[command(version)]
struct Args {
    /// JSON config file (overrides --data-dir and --container-mb)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory
    #[arg(short, long, default_value = "./atlasblob_data")]
    data_dir: PathBuf,

    /// Container capacity in MB
    #[arg(short, long, default_value = "1024")]
    container_mb: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a local file under a name
    Put {
        /// The name to store under
        name: String,

        /// The local file to read
        path: PathBuf,
    },

    /// Fetch a blob
    Get {
        /// The name to fetch
        name: String,

        /// Output file (stdout when omitted)
        out: Option<PathBuf>,
    },

    /// Delete a blob
    Rm {
        /// The name to delete
        name: String,
    },

    /// Delete every blob under a prefix
    RmPrefix {
        /// The prefix to clear
        prefix: String,
    },

    /// List blob names
    Ls {
        /// The prefix to list
        #[arg(default_value = "")]
        prefix: String,

        /// Segments below the prefix (0 = unlimited)
        #[arg(long, default_value = "0")]
        depth: usize,
    },

    /// Verify containers and stored content
    Check,

    /// Print container statistics
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,atlasblob=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(mut config) => {
                config.dump_interval = Duration::ZERO;
                config
            }
            Err(e) => {
                tracing::error!("{}", e);
                std::process::exit(1);
            }
        },
        None => Config::builder()
            .data_dir(&args.data_dir)
            .container_size(args.container_mb * 1024 * 1024)
            .dump_interval(Duration::ZERO)
            .build(),
    };

    let storage = match Storage::open(config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to open storage: {}", e);
            std::process::exit(1);
        }
    };

    let outcome = run(&storage, args.command);
    let closed = storage.close();

    if let Err(e) = outcome.and(closed) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(storage: &Storage, command: Commands) -> atlasblob::Result<()> {
    match command {
        Commands::Put { name, path } => {
            let file = File::open(&path)?;
            let size = file.metadata()?.len();
            let blob = storage.add(&name, BufReader::new(file), size)?;
            println!("{} {} bytes md5={}", blob.name(), blob.size(), blob.md5_hex());
        }
        Commands::Get { name, out } => {
            let mut reader = storage
                .get(&name)?
                .ok_or_else(|| AtlasError::FileNotFound(name.clone()))?;
            match out {
                Some(path) => {
                    let mut file = File::create(path)?;
                    io::copy(&mut reader, &mut file)?;
                }
                None => {
                    let mut stdout = io::stdout().lock();
                    io::copy(&mut reader, &mut stdout)?;
                    stdout.flush()?;
                }
            }
        }
        Commands::Rm { name } => storage.delete(&name)?,
        Commands::RmPrefix { prefix } => {
            let count = storage.delete_childs(&prefix)?;
            println!("deleted {}", count);
        }
        Commands::Ls { prefix, depth } => {
            for name in storage.list(&prefix, depth) {
                println!("{}", name);
            }
        }
        Commands::Check => {
            storage.check()?;
            println!("ok");
        }
        Commands::Stats { json: true } => {
            let stats = storage.stats();
            let out = serde_json::to_string_pretty(&stats)
                .map_err(|e| AtlasError::Config(format!("cannot encode stats: {}", e)))?;
            println!("{}", out);
        }
        Commands::Stats { json: false } => {
            let stats = storage.stats();
            println!(
                "files={} size={} real_size={} holes={} hole_size={} index_version={}",
                stats.file_count,
                stats.file_size,
                stats.file_real_size,
                stats.hole_count,
                stats.hole_size,
                stats.index_version
            );
            for c in &stats.containers {
                println!(
                    "container {:06}: used {}/{} files={} holes={} ({} bytes){}",
                    c.id,
                    c.used,
                    c.size,
                    c.file_count,
                    c.hole_count,
                    c.hole_size,
                    if c.dirty { " dirty" } else { "" }
                );
            }
        }
    }
    Ok(())
}
