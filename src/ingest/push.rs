//! Push adapter: long-lived WebSocket subscription
//!
//! Opens one subscription per configured (endpoint, channel) pair and
//! forwards each trade event's payload. Connection and protocol errors are
//! fatal for this feed only; the adapter reconnects serially, so the
//! subscription is never duplicated.

use super::{RawTradeEvent, TradeSource};
use crate::config::PushSourceConfig;
use crate::error::{AggregatorError, Result};
use crate::sources::Exchange;
use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{error, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Stream frame envelope: trade payloads arrive under `data` with
/// `event == "trade"`.
#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    event: String,
    #[serde(default)]
    data: Value,
}

pub struct PushSource {
    exchange: Exchange,
    config: PushSourceConfig,
}

impl PushSource {
    pub fn new(exchange: Exchange, config: PushSourceConfig) -> Self {
        Self { exchange, config }
    }

    async fn subscribe_and_listen(&self, tx: &mpsc::Sender<RawTradeEvent>) -> Result<()> {
        let (ws_stream, _) = connect_async(self.config.endpoint.as_str())
            .await
            .map_err(|e| AggregatorError::WebSocket(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let subscribe = serde_json::json!({
            "event": "bts:subscribe",
            "data": { "channel": self.config.channel }
        });
        write
            .send(Message::Text(subscribe.to_string().into()))
            .await
            .map_err(|e| AggregatorError::WebSocket(e.to_string()))?;

        info!(
            "Subscribed to {} channel {} on {}",
            self.exchange.name(),
            self.config.channel,
            self.config.endpoint
        );

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let Ok(envelope) = serde_json::from_str::<StreamEnvelope>(text.as_str())
                    else {
                        continue;
                    };
                    if envelope.event != "trade" {
                        continue;
                    }

                    let event = RawTradeEvent {
                        exchange: self.exchange,
                        payload: envelope.data,
                        received_at: Utc::now().timestamp_millis(),
                    };
                    if tx.send(event).await.is_err() {
                        return Ok(());
                    }
                }
                Ok(Message::Ping(_)) => {
                    // pong is handled by tungstenite
                }
                Ok(Message::Close(_)) => {
                    warn!("{} closed the subscription", self.exchange.name());
                    break;
                }
                Err(e) => return Err(AggregatorError::WebSocket(e.to_string())),
                _ => {}
            }
        }

        Ok(())
    }
}

#[async_trait]
impl TradeSource for PushSource {
    fn exchange(&self) -> Exchange {
        self.exchange
    }

    async fn run(&self, tx: mpsc::Sender<RawTradeEvent>) -> Result<()> {
        loop {
            match self.subscribe_and_listen(&tx).await {
                Ok(()) => {
                    warn!("{} subscription ended, reconnecting", self.exchange.name());
                }
                Err(e) => {
                    error!("{} subscription error: {}", self.exchange.name(), e);
                }
            }

            if tx.is_closed() {
                return Ok(());
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }
}
