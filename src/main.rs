//! bitock - Bithumb Market Data Streaming Client
//!
//! Connects to the public WebSocket feed, fans ticker records out to the
//! volume-power workers and the symbol ledger, and records trading decisions
//! to a CSV journal. Reconnects with exponential backoff.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Json, Router};
use prometheus::IntGauge;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bitock::{
    BithumbSnapshotFetcher, Config, DecisionJournal, DecisionSink, FeedClient,
    FeedStats, LedgerSubscriber, SnapshotFetcher, Subscriber, SubscriptionDescriptor,
    SymbolLedger, VolumePowerWorker, WorkerManager,
};

/// Maximum backoff delay in milliseconds (60 seconds)
const MAX_BACKOFF_MS: u64 = 60_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting bitock market data client");

    // Load configuration
    let config = Arc::new(Config::load()?);
    info!(
        symbols = ?config.symbols,
        intervals = ?config.tick_intervals,
        "Configuration loaded"
    );

    let descriptor = SubscriptionDescriptor::ticker(
        config.symbols.clone(),
        config.tick_intervals.clone(),
    )?;

    // Shared collaborators
    let fetcher: Arc<dyn SnapshotFetcher> = Arc::new(BithumbSnapshotFetcher::new(
        &config.rest_endpoint,
        config.snapshot_depth,
    ));
    let journal = Arc::new(DecisionJournal::new(&config.records_dir, "decisions")?);
    let ledger = Arc::new(SymbolLedger::new(config.ledger_capacity));

    // One worker per configured symbol
    let mut manager = WorkerManager::new();
    for symbol in &config.symbols {
        manager.add_worker(VolumePowerWorker::new(
            symbol.clone(),
            fetcher.clone(),
            journal.clone() as Arc<dyn DecisionSink>,
            config.buy_power_threshold,
            config.sell_power_threshold,
        ));
    }
    let manager: Arc<dyn Subscriber> = Arc::new(manager);

    // Start health check server
    let health_port = config.health_port;
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_port).await {
            warn!(error = %e, "Health server error");
        }
    });

    let gauges = FeedGauges::register()?;

    // Forward Ctrl-C into a cooperative shutdown
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    run_supervised(&config, descriptor, manager, ledger, &gauges, shutdown).await?;

    journal.close().await;
    info!("Shutdown complete");
    Ok(())
}

/// Drive the client, reconnecting with exponential backoff until shutdown or
/// the attempt limit is reached. The client itself never retries.
async fn run_supervised(
    config: &Config,
    descriptor: SubscriptionDescriptor,
    manager: Arc<dyn Subscriber>,
    ledger: Arc<SymbolLedger>,
    gauges: &FeedGauges,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut attempts: u32 = 0;

    loop {
        let client = Arc::new(
            FeedClient::new(&config.ws_endpoint, descriptor.clone()).with_timeouts(
                Duration::from_millis(config.connect_timeout_ms),
                Duration::from_millis(config.handshake_timeout_ms),
            ),
        );
        client.subscribe(manager.clone());
        client.subscribe(Arc::new(LedgerSubscriber::new(ledger.clone())));

        // Relay shutdown to this attempt's client
        let stopper = {
            let client = client.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                shutdown.cancelled().await;
                client.stop();
            })
        };

        // Export live counters while the client runs
        let stats_task = {
            let client = client.clone();
            let gauges = gauges.clone();
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(Duration::from_secs(10));
                loop {
                    tick.tick().await;
                    gauges.update(client.stats());
                }
            })
        };

        let result = client.run().await;
        stopper.abort();
        stats_task.abort();
        let stats = client.stats();
        gauges.update(stats);

        match result {
            Ok(()) => {
                info!("Client stopped");
                return Ok(());
            }
            Err(e) if shutdown.is_cancelled() => {
                info!(error = %e, "Connection ended during shutdown");
                return Ok(());
            }
            Err(e) => {
                error!(error = %e, "Feed connection ended");
                if stats.frames_received > 0 {
                    // The session actually streamed; restart the backoff ladder
                    attempts = 0;
                }
                attempts += 1;
                if attempts >= config.max_reconnect_attempts {
                    anyhow::bail!("giving up after {attempts} reconnect attempts");
                }

                let base_delay = config.reconnect_delay_ms * 2u64.pow(attempts.min(6));
                let delay = Duration::from_millis(base_delay.min(MAX_BACKOFF_MS));
                warn!(
                    attempt = attempts,
                    delay_secs = delay.as_secs(),
                    "Reconnecting after error..."
                );

                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = shutdown.cancelled() => return Ok(()),
                }
            }
        }
    }
}

/// Feed counters exported on /metrics
#[derive(Clone)]
struct FeedGauges {
    frames_received: IntGauge,
    records_dispatched: IntGauge,
    frames_drained: IntGauge,
    decode_failures: IntGauge,
    delivery_faults: IntGauge,
}

impl FeedGauges {
    fn register() -> anyhow::Result<Self> {
        Ok(Self {
            frames_received: prometheus::register_int_gauge!(
                "bitock_frames_received",
                "Text frames received from the feed"
            )?,
            records_dispatched: prometheus::register_int_gauge!(
                "bitock_records_dispatched",
                "Records fanned out to subscribers"
            )?,
            frames_drained: prometheus::register_int_gauge!(
                "bitock_frames_drained",
                "Frames discarded with no subscriber registered"
            )?,
            decode_failures: prometheus::register_int_gauge!(
                "bitock_decode_failures",
                "Frames that failed to decode"
            )?,
            delivery_faults: prometheus::register_int_gauge!(
                "bitock_delivery_faults",
                "Subscriber callbacks that returned an error"
            )?,
        })
    }

    fn update(&self, stats: FeedStats) {
        self.frames_received.set(stats.frames_received as i64);
        self.records_dispatched.set(stats.records_dispatched as i64);
        self.frames_drained.set(stats.frames_drained as i64);
        self.decode_failures.set(stats.decode_failures as i64);
        self.delivery_faults.set(stats.delivery_faults as i64);
    }
}

/// Start HTTP server for health checks and metrics
async fn start_health_server(port: u16) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "component": "bitock",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics() -> String {
    use prometheus::{Encoder, TextEncoder};
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
