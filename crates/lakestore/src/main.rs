use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lakestore::commands::{self, CopyArgs};
use lakestore_config::RuntimeConfig;
use lakestore_core::{BackendKind, FileFormat, LocalConfig, Storage};

/// Read and write Parquet datasets and Delta Lake tables on ADLS, DBFS or local disk
#[derive(Parser)]
#[command(name = "lakestore")]
#[command(version)]
#[command(about = "Read and write Parquet datasets and Delta Lake tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Storage backend: adls, dbfs, local (overrides config file)
    #[arg(short, long, value_name = "BACKEND", global = true)]
    backend: Option<BackendKind>,

    /// Root directory for the local backend
    #[arg(short, long, value_name = "DIR", global = true)]
    root: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the fields, partition columns and fragment count of a dataset
    Schema {
        path: String,

        /// Dataset format: parquet or deltalake
        #[arg(short, long, default_value = "parquet")]
        format: FileFormat,
    },
    /// Count the rows of a dataset, optionally filtered
    Count {
        path: String,

        /// Dataset format: parquet or deltalake
        #[arg(short, long, default_value = "parquet")]
        format: FileFormat,

        /// Row filter such as `Pregnancies=0`; repeat to AND
        #[arg(long = "filter", value_name = "EXPR")]
        filters: Vec<String>,

        /// Rows per streamed batch (overrides config file)
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Copy a dataset, optionally converting format, partitioning or codec
    Copy {
        src: String,
        dst: String,

        /// Source format: parquet or deltalake
        #[arg(long, default_value = "parquet")]
        from: FileFormat,

        /// Destination format: parquet or deltalake
        #[arg(long, default_value = "parquet")]
        to: FileFormat,

        /// Partition column of the destination; repeat for nested partitions
        #[arg(long = "partition", value_name = "COLUMN")]
        partitions: Vec<String>,

        /// Compression codec: none, snappy, gzip, brotli, zstd, lz4
        #[arg(long, default_value = "snappy")]
        compression: String,

        /// Existing data policy: error, overwrite_or_ignore, delete_matching
        /// (parquet) or error, append, overwrite (deltalake)
        #[arg(long, default_value = "error")]
        behavior: String,

        /// Row filter such as `Outcome=1`; repeat to AND
        #[arg(long = "filter", value_name = "EXPR")]
        filters: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    // Step 1: Load configuration (file, then environment)
    let mut config =
        lakestore_config::load_config(cli.config.as_deref()).context("Failed to load configuration")?;

    // Step 2: Apply CLI overrides (highest priority)
    apply_cli_overrides(&mut config, &cli)?;
    config.validate()?;

    // Step 3: Initialize tracing before touching storage
    lakestore::init_tracing(&config);

    // Step 4: Connect the backend
    let backend = config
        .build_backend()
        .await
        .context("Failed to initialize storage backend")?;
    let storage = Storage::new(backend);

    match cli.command {
        Commands::Schema { path, format } => {
            let report = commands::schema(&storage, format, &path).await?;
            println!("{}", report);
        }
        Commands::Count {
            path,
            format,
            filters,
            batch_size,
        } => {
            let batch_size = batch_size.unwrap_or(config.read.batch_size);
            let rows = commands::count(&storage, format, &path, &filters, batch_size).await?;
            println!("{}", rows);
        }
        Commands::Copy {
            src,
            dst,
            from,
            to,
            partitions,
            compression,
            behavior,
            filters,
        } => {
            let args = CopyArgs {
                from,
                to,
                partitions,
                compression,
                behavior,
                filters,
                batch_size: config.read.batch_size,
            };
            let summary = commands::copy(&storage, &src, &dst, &args).await?;
            println!("copied {} rows to {} ({})", summary.rows, dst, to);
            for file in &summary.files {
                println!("  {}", file);
            }
        }
    }

    Ok(())
}

fn apply_cli_overrides(config: &mut RuntimeConfig, cli: &Cli) -> Result<()> {
    if let Some(backend) = cli.backend {
        config.storage.backend = backend;
    }

    // Override local root (only valid for local backend)
    if let Some(root) = &cli.root {
        if config.storage.backend != BackendKind::Local {
            anyhow::bail!(
                "--root flag only works with the local backend, but backend is '{}'.\n\
                Either remove --root or select --backend local.",
                config.storage.backend
            );
        }
        config.storage.local = Some(LocalConfig { root: root.clone() });
    }

    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    Ok(())
}
