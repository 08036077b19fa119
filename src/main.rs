// ordertail - main.rs
//
// Process entry point. Handles:
// 1. CLI argument parsing
// 2. Logging initialisation (RUST_LOG > --debug > default)
// 3. Configuration loading
// 4. Running the pipeline until Ctrl-C

pub use ordertail::app;
pub use ordertail::config;
pub use ordertail::core;
pub use ordertail::metrics;
pub use ordertail::util;

use clap::Parser;
use std::path::PathBuf;

/// ordertail - tail, parse, dedupe, and fan out a rotating order-lifecycle
/// log, with a reactive tail-history search engine.
#[derive(Parser, Debug)]
#[command(name = "ordertail", version, about)]
struct Cli {
    /// Root directory above `node_order_statuses/hourly/...`. Overrides
    /// the `root` value in the config file when both are given.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Path to the TOML configuration file.
    #[arg(short = 'c', long, default_value = util::constants::CONFIG_FILE_NAME)]
    config: PathBuf,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    util::logging::init(cli.debug, None);

    tracing::info!(
        version = util::constants::APP_VERSION,
        debug = cli.debug,
        config = %cli.config.display(),
        "ordertail starting"
    );

    let mut loaded = match config::Config::from_toml_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            eprintln!("Error: failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Some(root) = cli.root {
        loaded.root = root;
    }

    tracing::info!(
        root = %loaded.root.display(),
        symbols = loaded.rules.len(),
        "configuration loaded"
    );

    let pipeline = app::pipeline::start(loaded);

    let metrics_handle = spawn_metrics_reporter(pipeline.metrics.clone());

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl-C handler");
    }

    tracing::info!("shutdown requested, stopping pipeline");
    pipeline.cancel();
    pipeline.join().await;
    metrics_handle.abort();
}

/// Log a status-counter snapshot periodically, as a debug convenience in
/// place of an external metrics endpoint (out of scope for this crate).
fn spawn_metrics_reporter(metrics: std::sync::Arc<metrics::Counters>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            ticker.tick().await;
            let snapshot = metrics.snapshot();
            tracing::debug!(
                admitted_updates = snapshot.admitted_updates,
                pre_filter_passed = snapshot.pre_filter_passed,
                pre_filter_rejected = snapshot.pre_filter_rejected,
                parse_errors = snapshot.parse_errors,
                tracked_orders_active = snapshot.tracked_orders_active,
                cache_hits = snapshot.cache_hits,
                cache_misses = snapshot.cache_misses,
                "status counters"
            );
        }
    })
}
