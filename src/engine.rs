use crate::dispatch::PricingDispatcher;
use crate::errors::{EngineError, EngineResult};
use crate::store::{MarketStore, TickOutcome};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// One full revaluation of the store, in registration order.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PricingReport {
    pub as_of: chrono::DateTime<chrono::Utc>,
    pub prices: Vec<f64>,
    pub elapsed_us: u64,
}

/// Drain raw ticker messages into the store until every sender is dropped.
/// Returns how many messages were applied.
pub async fn run_tick_ingestion(store: Arc<MarketStore>, mut rx: mpsc::Receiver<String>) -> u64 {
    tracing::info!("tick ingestion started");

    let mut applied: u64 = 0;
    while let Some(raw) = rx.recv().await {
        if let TickOutcome::Applied(_) = store.ingest_json(&raw) {
            applied += 1;
        }
    }

    let c = store.counters();
    tracing::info!(
        applied,
        received = c.ticks_received,
        unknown = c.ticks_unknown,
        rejected = c.ticks_rejected,
        malformed = c.ticks_malformed,
        "tick channel closed, ingestion stopped"
    );
    applied
}

/// Reprice a fresh snapshot every `interval` and publish it on `tx`.
///
/// Batch pricing runs on the blocking pool so the runtime keeps serving
/// ingestion. Returns once the report receiver is gone.
pub async fn run_pricing_loop(
    store: Arc<MarketStore>,
    dispatcher: Arc<PricingDispatcher>,
    interval: Duration,
    tx: mpsc::Sender<PricingReport>,
) -> EngineResult<()> {
    tracing::info!(interval_ms = interval.as_millis() as u64, "pricing loop started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if tx.is_closed() {
            break;
        }

        let snapshot = store.snapshot();
        let instruments = snapshot.len();
        let worker = dispatcher.clone();
        let start = Instant::now();

        let prices = tokio::task::spawn_blocking(move || worker.price_batch(&snapshot))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "pricing task failed");
                EngineError::ThreadPool(format!("pricing task: {e}"))
            })?;

        let elapsed_us = start.elapsed().as_micros() as u64;
        let failed = prices.iter().filter(|p| !p.is_finite()).count();
        if failed > 0 {
            tracing::warn!(failed, instruments, "non-finite prices in batch");
        }
        tracing::debug!(instruments, elapsed_us, "batch priced");

        let report = PricingReport {
            as_of: chrono::Utc::now(),
            prices,
            elapsed_us,
        };
        if tx.send(report).await.is_err() {
            break;
        }
    }

    tracing::info!("report receiver dropped, pricing loop stopped");
    Ok(())
}

/// Ingestion and pricing tasks wired to one store, as a host process would
/// run them.
pub struct EngineHandles {
    pub ticks: mpsc::Sender<String>,
    pub reports: mpsc::Receiver<PricingReport>,
    pub ingestion: tokio::task::JoinHandle<u64>,
    pub pricing: tokio::task::JoinHandle<EngineResult<()>>,
}

/// Spawn both loops on the current runtime.
pub fn spawn(
    store: Arc<MarketStore>,
    dispatcher: Arc<PricingDispatcher>,
    config: &crate::config::AppConfig,
) -> EngineHandles {
    let (tick_tx, tick_rx) = mpsc::channel::<String>(config.tick_channel_capacity);
    let (report_tx, report_rx) = mpsc::channel::<PricingReport>(16);

    let ingest_store = store.clone();
    let ingestion = tokio::spawn(async move { run_tick_ingestion(ingest_store, tick_rx).await });

    let interval = Duration::from_millis(config.pricing_interval_ms);
    let pricing = tokio::spawn(async move { run_pricing_loop(store, dispatcher, interval, report_tx).await });

    EngineHandles {
        ticks: tick_tx,
        reports: report_rx,
        ingestion,
        pricing,
    }
}

impl EngineHandles {
    /// Queue one raw message for ingestion.
    pub async fn send_tick(&self, raw: impl Into<String>) -> EngineResult<()> {
        self.ticks
            .send(raw.into())
            .await
            .map_err(|_| EngineError::ChannelClosed("tick ingestion".into()))
    }
}
