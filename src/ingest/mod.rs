//! Trade ingestion from external exchange feeds
//!
//! Each configured source runs as its own task and emits raw trade events
//! onto a shared channel; one consumer task normalizes each event and
//! appends it to the source's staging table. A failing source never takes
//! down the others.

pub mod poll;
pub mod push;

use crate::config::Config;
use crate::error::Result;
use crate::sources::Exchange;
use crate::storage::staging::StagingStore;
use async_trait::async_trait;
use poll::PollSource;
use push::PushSource;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// One observed trade event, as delivered by a source adapter.
#[derive(Debug, Clone)]
pub struct RawTradeEvent {
    pub exchange: Exchange,
    /// Source-native payload, decoded but not yet normalized
    pub payload: Value,
    /// Adapter receipt time, epoch milliseconds
    pub received_at: i64,
}

/// A source adapter: once started, delivers one event per observed trade.
/// No ordering guarantee, within a source or across sources.
#[async_trait]
pub trait TradeSource: Send + Sync {
    fn exchange(&self) -> Exchange;

    /// Run until the receiving side goes away
    async fn run(&self, tx: mpsc::Sender<RawTradeEvent>) -> Result<()>;
}

/// Owns the configured source adapters and the normalize-and-stage consumer.
pub struct Ingester {
    sources: Vec<Arc<dyn TradeSource>>,
    staging: StagingStore,
    started: AtomicBool,
}

impl Ingester {
    pub fn new(config: &Config, staging: StagingStore) -> Self {
        let sources: Vec<Arc<dyn TradeSource>> = vec![
            Arc::new(PushSource::new(
                Exchange::Bitstamp,
                config.sources.bitstamp.clone(),
            )),
            Arc::new(PollSource::new(
                Exchange::Bitfinex,
                config.sources.bitfinex.clone(),
            )),
            Arc::new(PollSource::new(
                Exchange::IndependentReserve,
                config.sources.independent_reserve.clone(),
            )),
            Arc::new(PollSource::new(
                Exchange::Kraken,
                config.sources.kraken.clone(),
            )),
        ];

        Self {
            sources,
            staging,
            started: AtomicBool::new(false),
        }
    }

    /// Spawn every source adapter plus the staging consumer.
    ///
    /// Idempotent: a second call is a no-op, so adapters are never
    /// duplicated.
    pub fn initialize_adapters(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Adapters already initialized");
            return;
        }

        let (tx, mut rx) = mpsc::channel::<RawTradeEvent>(1024);

        for source in &self.sources {
            let source = Arc::clone(source);
            let tx = tx.clone();

            tokio::spawn(async move {
                if let Err(e) = source.run(tx).await {
                    error!("Source {} stopped: {}", source.exchange().name(), e);
                }
            });
        }
        drop(tx);

        let staging = self.staging.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(trade) = event.exchange.normalize(&event.payload, event.received_at)
                else {
                    debug!("Dropped malformed {} payload", event.exchange.name());
                    continue;
                };

                if let Err(e) = staging.append(event.exchange, &trade).await {
                    error!("Failed to stage {} trade: {}", event.exchange.name(), e);
                }
            }
        });
    }
}
