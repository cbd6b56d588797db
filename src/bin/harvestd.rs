//! harvestd - camera sample harvester daemon
//!
//! This daemon:
//! 1. Loads configuration (file + HARVEST_* environment overrides)
//! 2. Probes where inference runs and builds the detector
//! 3. Opens the dataset and starts one acquisition thread per camera
//! 4. Runs the collection loop until Ctrl-C

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use frame_harvest::{
    probe_execution_provider, CaptureRegistry, Collector, DatasetStore, Detector,
    DetectorRegistry, ExecutionProvider, HarvestConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Harvest segmentation samples from cameras")]
struct Args {
    /// Configuration file (.json or .toml).
    #[arg(long, env = "HARVEST_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the resolved execution provider and exit.
    #[arg(long)]
    probe_only: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = HarvestConfig::load(args.config.as_deref())?;
    log::info!(
        "harvestd {} starting: {} camera(s), dataset at {}",
        env!("CARGO_PKG_VERSION"),
        cfg.enabled_cameras().count(),
        cfg.storage.base_path.display()
    );

    let engines = DetectorRegistry::with_defaults();
    let provider = probe_execution_provider(&cfg.inference, &engines);
    if args.probe_only {
        println!("{}", provider);
        return Ok(());
    }
    let detector = build_detector(&engines, provider, &cfg)?;

    let store = Arc::new(DatasetStore::open(&cfg.storage)?);
    let counts = store.split_counts()?;
    log::info!(
        "dataset holds {} samples (train {}, val {})",
        counts.total(),
        counts.train,
        counts.val
    );

    let cameras: Vec<_> = cfg.enabled_cameras().cloned().collect();
    if cameras.is_empty() {
        log::warn!("no enabled cameras configured; nothing will be collected");
    }
    let registry = CaptureRegistry::new(&cameras, &cfg.motion, &cfg.capture)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .expect("error setting Ctrl-C handler");

    let mut collector = Collector::new(
        registry,
        detector,
        store,
        cfg.collection.clone(),
        cfg.inference.class_names.clone(),
    );
    log::info!("harvestd running (Ctrl-C to stop)");
    collector.run(&shutdown)?;

    let stats = collector.stats();
    log::info!(
        "harvestd stopped: {} samples saved, {} save failures",
        stats.samples_saved,
        stats.save_failures
    );
    Ok(())
}

/// Build the probed engine. A failing hardware or software engine falls
/// back to the mock engine so cameras keep being exercised.
fn build_detector(
    engines: &DetectorRegistry,
    provider: ExecutionProvider,
    cfg: &HarvestConfig,
) -> Result<Box<dyn Detector>> {
    match engines.build(provider, &cfg.inference) {
        Ok(detector) => Ok(detector),
        Err(err) if provider != ExecutionProvider::Mock => {
            log::error!(
                "{} detector failed to load ({:#}); using mock detector",
                provider,
                err
            );
            engines.build(ExecutionProvider::Mock, &cfg.inference)
        }
        Err(err) => Err(err),
    }
}
