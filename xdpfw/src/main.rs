use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xdpfw::api;
use xdpfw::config::{CliArgs, Config};
use xdpfw::counters::CounterSource;
use xdpfw::storage::Storage;
use xdpfw::{Blacklists, CounterBank, Verdict, WorkerPool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliArgs::parse();

    // Load config from file if provided, otherwise use defaults.
    let mut config = if let Some(ref config_path) = cli.config {
        Config::from_file(Path::new(config_path))?
    } else {
        Config::default()
    };
    config.merge_cli(&cli);

    // Logging.
    if config.quiet {
        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new("error"))
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(
                std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
            ))
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // ── Blacklists ────────────────────────────────────────────────────
    let lists = Arc::new(Blacklists::with_capacity(config.capacity));
    for mutation in cli.seed_mutations()? {
        mutation.apply(&lists)?;
    }
    let sizes = lists.sizes();
    tracing::info!(
        "Blacklists loaded: {} MAC, {} IPv4, {} IPv6, {} port entries",
        sizes.mac,
        sizes.v4,
        sizes.v6,
        sizes.ports
    );

    // ── Counters & Workers ────────────────────────────────────────────
    let counters = CounterBank::new(config.counter_mode, config.workers);
    if counters.mode() != config.counter_mode {
        tracing::warn!(
            "{:?} counters need a known worker count, using {:?}",
            config.counter_mode,
            counters.mode()
        );
    }
    let workers = config.workers.max(1);
    let (pool, pool_handle) = WorkerPool::spawn(
        workers,
        config.queue_depth,
        lists.clone(),
        &counters,
        config.unknown_protocol,
    )?;

    // ── Storage ───────────────────────────────────────────────────────
    let storage = Arc::new(Storage::new(&config.db_path)?);

    // ── Snapshot Task ─────────────────────────────────────────────────
    if config.snapshot_interval_seconds > 0 {
        let storage_snapshot = storage.clone();
        let counters_snapshot = counters.clone();
        let every = config.snapshot_interval_seconds;
        tokio::spawn(async move {
            let mut snapshot_interval = interval(Duration::from_secs(every));
            // The first tick fires immediately; skip the empty snapshot.
            snapshot_interval.tick().await;
            loop {
                snapshot_interval.tick().await;
                log_totals(&counters_snapshot);
                if let Err(e) = storage_snapshot.record_snapshot(&counters_snapshot) {
                    tracing::error!("Failed to store counter snapshot: {}", e);
                }
            }
        });
    }

    // ── Data Retention Task ───────────────────────────────────────────
    if let Some(retention_seconds) = config.data_retention_seconds {
        let storage_retention = storage.clone();
        tokio::spawn(async move {
            let mut retention_interval = interval(Duration::from_secs(60));
            loop {
                retention_interval.tick().await;
                match storage_retention.delete_old_data(retention_seconds) {
                    Ok(deleted) if deleted > 0 => {
                        tracing::info!("Data retention: deleted {} old snapshots", deleted);
                    }
                    Err(e) => {
                        tracing::error!("Data retention cleanup failed: {}", e);
                    }
                    _ => {}
                }
            }
        });
    }

    // ── HTTP API ──────────────────────────────────────────────────────
    let app_state = Arc::new(api::AppState {
        lists: lists.clone(),
        counters: counters.clone(),
        pool: pool_handle,
        storage: storage.clone(),
        start_time: std::time::Instant::now(),
    });

    let allowed_ips = config.allowed_ips.clone();
    let app = api::router(app_state, &allowed_ips);

    let listener =
        tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!("Server running on http://0.0.0.0:{}", config.port);
    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // ── Shutdown ──────────────────────────────────────────────────────
    tracing::info!("Shutting down");
    let joined = tokio::time::timeout(
        Duration::from_secs(5),
        tokio::task::spawn_blocking(move || pool.shutdown()),
    )
    .await;
    if joined.is_err() {
        tracing::warn!("Workers still busy after 5s, exiting anyway");
    }
    log_totals(&counters);
    storage.record_snapshot(&counters)?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// One-line summary of every verdict slot.
fn log_totals(counters: &CounterBank) {
    let line = Verdict::ALL
        .iter()
        .filter_map(|&verdict| {
            counters
                .snapshot(verdict.code())
                .ok()
                .map(|c| format!("{}: {} pkts / {} bytes", verdict, c.packets, c.bytes))
        })
        .collect::<Vec<_>>()
        .join(" | ");
    tracing::info!("{}", line);
}
