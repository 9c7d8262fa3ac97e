//! Standalone regeneration server.
//!
//! Loads `config.ron`, restores persisted regions and tasks, and ticks the
//! scheduler at the configured interval over an in-memory world until
//! `--run-secs` elapses. Pending tasks are saved and reverted on exit.
//!
//! Run with: `cargo run -p regen-server -- --config ./instance --run-secs 60`

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use regen_config::{CliArgs, Config, PresetConfig};
use regen_core::{MemoryWorld, SystemClock};
use regen_server::{PlatformDirs, RegenContext};
use tracing::{error, info};

/// Worlds the in-memory host starts with.
const DEFAULT_WORLDS: [&str; 3] = ["world", "world_nether", "world_the_end"];

/// How long startup waits for the persisted files to load.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

fn main() {
    let args = CliArgs::parse();
    let config_dir = args.config_dir();

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        let mut config = Config::default();
        config.presets.push(PresetConfig::default());
        config
    });
    config.apply_cli_overrides(&args);

    let dirs = PlatformDirs::resolve(&config_dir, &config.storage);
    if let Err(e) = dirs.create_dirs() {
        eprintln!("Failed to create server directories: {e}");
        std::process::exit(1);
    }
    config.storage.data_dir = dirs.data_dir.clone();

    regen_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));
    info!(
        config = %dirs.config_dir.display(),
        data = %dirs.data_dir.display(),
        "regen-server starting"
    );

    let tick = Duration::from_millis(config.scheduler.tick_interval_ms.max(1));
    let host = MemoryWorld::with_worlds(DEFAULT_WORLDS);
    let mut context = RegenContext::new(config, host, Arc::new(SystemClock));

    if let Err(e) = context.start() {
        error!(error = %e, "failed to start persistence");
        std::process::exit(1);
    }
    context.await_startup(STARTUP_TIMEOUT);
    info!(
        tasks = context.scheduler().len(),
        regions = context.regions().len(),
        tick_ms = tick.as_millis() as u64,
        "regen-server running"
    );

    let deadline = args.run_secs.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut last = Instant::now();
    loop {
        std::thread::sleep(tick);
        let now = Instant::now();
        context.on_tick(now.duration_since(last));
        last = now;

        if deadline.is_some_and(|deadline| now >= deadline) {
            break;
        }
    }

    let (report, _host) = context.shutdown();
    info!(
        saved = ?report.tasks_saved,
        reverted = report.reverted,
        failed_jobs = report.failed_jobs,
        "regen-server stopped"
    );
}
