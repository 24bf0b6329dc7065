//! pingtower: periodic HTTP availability monitoring with incident detection
//! and notification fan-out (§1, §2).

mod config;
mod error;
mod metrics;
mod model;
mod notify;
mod prober;
mod scheduler;
mod store;

use config::Config;
use pingtower_gates::GateSet;
use prober::Prober;
use scheduler::Scheduler;
use std::sync::Arc;
use store::{MemoryStore, Store};

const USER_AGENT: &str = concat!("pingtower/", env!("CARGO_PKG_VERSION"));

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        tracing::error!(%err, "pingtower exited with an error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), error::AppError> {
    let config = Config::from_env()?;

    #[cfg(feature = "metrics")]
    {
        metrics::describe();
        install_prometheus_exporter();
    }

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let prober = Prober::new(config.retry, config.tls.clone(), USER_AGENT);
    let gate_set = GateSet::new(
        config.global_concurrency,
        config.global_rps,
        config.service_limits.clone(),
    );
    let notifier = notify::build_from_config(&config);

    let scheduler = Arc::new(Scheduler::new(&config, store, prober, gate_set, notifier));

    tracing::info!(
        global_concurrency = config.global_concurrency,
        tick_secs = config.tick.as_secs(),
        "pingtower starting"
    );

    let run_handle = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run().await })
    };

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::warn!(%err, "failed to listen for shutdown signal"),
    }

    scheduler.stop();
    if let Err(err) = run_handle.await {
        tracing::warn!(%err, "scheduler task did not shut down cleanly");
    }

    Ok(())
}

#[cfg(feature = "metrics")]
fn install_prometheus_exporter() {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let builder = PrometheusBuilder::new().set_buckets(metrics::LATENCY_BUCKETS).unwrap_or_else(|_| PrometheusBuilder::new());

    if let Err(err) = builder.install() {
        tracing::warn!(%err, "failed to install prometheus exporter");
    }
}
