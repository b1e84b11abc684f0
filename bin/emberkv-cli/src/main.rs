//! EmberKV CLI - Collections manifest tool
//!
//! Inspects persisted vbucket manifests, validates administrative
//! manifests and replays them against an in-memory bucket.

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use emberkv_collections::{
    BucketManifest, Manager, Manifest, MemoryBucket, Partition, codec,
};
use emberkv_common::{Config, Vbid};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "emberkv-cli")]
#[command(about = "EmberKV collections manifest tool")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "emberkv.toml")]
    config: String,

    /// Log level (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode a persisted vbucket manifest
    Decode {
        /// File holding the encoded manifest
        file: PathBuf,
    },
    /// Apply bucket manifests in order to an in-memory bucket
    Apply {
        /// JSON manifest file, repeat to apply several in order
        #[arg(short, long, required = true)]
        manifest: Vec<PathBuf>,
        /// Number of vbuckets (overrides the config file)
        #[arg(long)]
        vbuckets: Option<u16>,
        /// Purge deleted collections and complete their deletion
        #[arg(long)]
        complete_deletions: bool,
        /// Write vb:0's persisted manifest to this file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Validate a JSON bucket manifest
    Validate {
        /// JSON manifest file
        file: PathBuf,
    },
}

/// Load the config file if it exists, defaults otherwise
fn load_config(path: &str) -> Result<Config> {
    let config: Config = if Path::new(path).exists() {
        let config_str = std::fs::read_to_string(path)?;
        toml::from_str(&config_str).map_err(|e| anyhow!("failed to parse {path}: {e}"))?
    } else {
        Config::default()
    };
    config.validate()?;
    Ok(config)
}

fn decode(file: &Path) -> Result<()> {
    let data = std::fs::read(file)?;
    let manifest = Manifest::from_persisted(&data)?;

    if data.is_empty() {
        println!("{}: empty, no persisted manifest", file.display());
    } else {
        let state = codec::decode(&data)?;
        println!("Persisted manifest ({} bytes)", data.len());
        println!("==============================");
        println!("UID: {:x}", state.manifest_uid);
        for entry in &state.entries {
            println!(
                "  cid:{} scope:{} start:{} end:{}",
                entry.collection_id, entry.scope_id, entry.start_seqno, entry.end_seqno
            );
        }
    }
    print!("{manifest}");
    Ok(())
}

fn apply(
    config: &Config,
    manifests: &[PathBuf],
    complete_deletions: bool,
    out: Option<&Path>,
) -> Result<()> {
    let bucket = MemoryBucket::from_config(&config.bucket);
    let manager = Manager::new(config.bucket.max_collections);

    for path in manifests {
        let json = std::fs::read_to_string(path)?;
        if let Err(e) = manager.update(&bucket, &json) {
            return Err(anyhow!(
                "{}: {} ({})",
                path.display(),
                e,
                e.engine_status()
            ));
        }
        info!("Applied {}", path.display());
    }

    for partition in bucket.memory_partitions() {
        if complete_deletions {
            // A completed deletion queues a hard delete event, flushed by
            // the following sweep
            loop {
                let outcome = partition.run_deletion_sweep()?;
                if outcome.completed.is_empty() {
                    break;
                }
                info!(
                    "{} completed deletion of {:?}, purged {} items",
                    partition.vbid(),
                    outcome.completed,
                    outcome.purged
                );
            }
        } else {
            partition.memory_log().flush()?;
        }
    }

    let mut print_stat = |key: &str, value: &str| println!("{key}: {value}");
    manager.add_stats(&bucket, &mut print_stat);
    for partition in bucket.memory_partitions() {
        partition
            .manifest()
            .lock()
            .add_stats(partition.vbid(), &mut print_stat);
    }

    if let Some(out) = out {
        let persisted = bucket
            .partition(Vbid::new(0))
            .and_then(|partition| partition.memory_log().persisted_manifest());
        match persisted {
            Some(persisted) => {
                std::fs::write(out, persisted.as_bytes())?;
                println!("Wrote {} bytes to {}", persisted.len(), out.display());
            }
            None => warn!("vb:0 has no persisted manifest, nothing written"),
        }
    }
    Ok(())
}

fn validate(config: &Config, file: &Path) -> Result<()> {
    let json = std::fs::read_to_string(file)?;
    let manifest = BucketManifest::from_json(&json, config.bucket.max_collections)?;

    println!("Manifest {} is valid", file.display());
    println!("UID: {:x}", manifest.uid());
    for (sid, scope) in manifest.scopes() {
        println!("  scope {} ({})", scope.name, sid);
        for collection in &scope.collections {
            println!("    collection {} ({})", collection.name, collection.id);
        }
    }
    println!("Collections: {}", manifest.collection_count());
    Ok(())
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let mut config = load_config(&args.config)?;

    // CLI takes precedence over the config file
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match args.command {
        Commands::Decode { file } => decode(&file),
        Commands::Apply {
            manifest,
            vbuckets,
            complete_deletions,
            out,
        } => {
            if let Some(vbuckets) = vbuckets {
                config.bucket.num_vbuckets = vbuckets;
                config.validate()?;
            }
            apply(&config, &manifest, complete_deletions, out.as_deref())
        }
        Commands::Validate { file } => validate(&config, &file),
    }
}
