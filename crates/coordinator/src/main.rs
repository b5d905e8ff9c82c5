//! `zoomfarm-coordinator` -- drives a continuous fractal zoom across a pool
//! of render workers.
//!
//! Configuration comes from the environment (see
//! [`CoordinatorConfig::from_env`]). Frames are written as PNGs when
//! `OUTPUT_DIR` is set and only counted otherwise. Stops on Ctrl-C.

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use zoomfarm_coordinator::config::CoordinatorConfig;
use zoomfarm_coordinator::scheduler::Scheduler;
use zoomfarm_coordinator::sink::{CountingSink, FrameSink, PngSequenceSink};
use zoomfarm_coordinator::status;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zoomfarm_coordinator=info,zoomfarm_workers=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CoordinatorConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    let sink: Box<dyn FrameSink> = match &config.output_dir {
        Some(dir) => match PngSequenceSink::new(dir.clone(), config.save_every) {
            Ok(sink) => Box::new(sink),
            Err(e) => {
                tracing::error!(dir = %dir.display(), error = %e, "Cannot create output directory");
                std::process::exit(1);
            }
        },
        None => Box::new(CountingSink::new()),
    };

    tracing::info!(
        workers = config.worker_count,
        endpoints = ?config.worker_endpoints,
        width = config.frame_width,
        height = config.frame_height,
        output_dir = ?config.output_dir,
        "Starting zoomfarm-coordinator",
    );

    let status_interval = config.status_interval;
    let (scheduler, status_rx) = Scheduler::new(config, sink).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to initialise scheduler");
        std::process::exit(1);
    });

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            return;
        }
        tracing::info!("Ctrl-C received, stopping");
        ctrl_c_cancel.cancel();
    });

    let status_task = tokio::spawn(status::log_status(status_rx, status_interval));

    scheduler.run(cancel).await;

    status_task.abort();
}
