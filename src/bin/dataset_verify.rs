//! dataset_verify - check a harvested dataset against its catalog
//!
//! Prints split counts, then every catalog row whose image or label is
//! missing and every file with no catalog row. Exits non-zero when the
//! dataset is inconsistent.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use frame_harvest::{DatasetStore, HarvestConfig, StorageSettings};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Verify a harvested dataset against its catalog"
)]
struct Args {
    /// Dataset root. Overrides the storage base path from the config.
    #[arg(long, value_name = "DIR")]
    base: Option<PathBuf>,

    /// Configuration file (.json or .toml) providing storage settings.
    #[arg(long, env = "HARVEST_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print every record, not only problems.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let storage = resolve_storage(&args)?;
    let catalog = storage.catalog_path();
    if !catalog.is_file() {
        return Err(anyhow!("no catalog at {}", catalog.display()));
    }
    let store = DatasetStore::open(&storage)?;
    let report = store.verify()?;

    println!("dataset: {}", storage.base_path.display());
    println!(
        "samples: {} (train {}, val {})",
        report.records, report.counts.train, report.counts.val
    );

    if args.verbose {
        for record in store.records()? {
            println!(
                "  {} {} {} objects [{}]",
                record.id,
                record.split,
                record.objects_count,
                record.classes.join(", ")
            );
        }
    }

    for id in &report.missing_images {
        println!("MISSING IMAGE {}", id);
    }
    for id in &report.missing_labels {
        println!("MISSING LABEL {}", id);
    }
    for path in &report.orphans {
        println!("ORPHAN {}", path.display());
    }

    if report.is_consistent() {
        println!("OK");
        Ok(())
    } else {
        println!(
            "INCONSISTENT: {} missing images, {} missing labels, {} orphans",
            report.missing_images.len(),
            report.missing_labels.len(),
            report.orphans.len()
        );
        std::process::exit(1);
    }
}

fn resolve_storage(args: &Args) -> Result<StorageSettings> {
    let mut storage = match &args.config {
        Some(path) => HarvestConfig::load(Some(path))?.storage,
        None => StorageSettings::default(),
    };
    if let Some(base) = &args.base {
        storage.base_path = base.clone();
    }
    Ok(storage)
}
