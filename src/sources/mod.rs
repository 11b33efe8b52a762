//! Exchange sources and payload normalization
//!
//! Each exchange is a variant of [`Exchange`]; the variant carries the
//! per-source knowledge: staging table name, response envelope shape for
//! polled feeds, and the mapping from the raw payload into the canonical
//! [`Trade`].


use crate::model::Trade;
use chrono::{DateTime, Utc};
use rand::{distr::Alphanumeric, Rng};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

/// The set of configured exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exchange {
    Bitstamp,
    Bitfinex,
    IndependentReserve,
    Kraken,
}

impl Exchange {
    pub const ALL: [Exchange; 4] = [
        Exchange::Bitstamp,
        Exchange::Bitfinex,
        Exchange::IndependentReserve,
        Exchange::Kraken,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Exchange::Bitstamp => "bitstamp",
            Exchange::Bitfinex => "bitfinex",
            Exchange::IndependentReserve => "independent_reserve",
            Exchange::Kraken => "kraken",
        }
    }

    /// Per-source staging table holding trades not yet rolled up
    pub fn staging_table(&self) -> &'static str {
        match self {
            Exchange::Bitstamp => "bitstamp_staging",
            Exchange::Bitfinex => "bitfinex_staging",
            Exchange::IndependentReserve => "independent_reserve_staging",
            Exchange::Kraken => "kraken_staging",
        }
    }

    /// Unwrap a polled response body into its list of raw trade payloads.
    ///
    /// Returns `None` for malformed bodies and for push-only sources.
    pub fn extract_poll_items(&self, body: &Value) -> Option<Vec<Value>> {
        match self {
            Exchange::Bitstamp => None,
            Exchange::Bitfinex => body.as_array().cloned(),
            Exchange::IndependentReserve => body.get("Trades")?.as_array().cloned(),
            // Kraken nests trades under result.<pair>, next to a "last" cursor
            Exchange::Kraken => body
                .get("result")?
                .as_object()?
                .iter()
                .find(|(key, _)| key.as_str() != "last")
                .and_then(|(_, pair)| pair.as_array().cloned()),
        }
    }

    /// Map one raw payload into the canonical trade shape.
    ///
    /// Pure given its inputs: `received_at` (epoch ms, stamped by the
    /// adapter) is used where the source reports no trustworthy timestamp.
    /// Malformed payloads and non-positive amounts/prices yield `None`.
    pub fn normalize(&self, payload: &Value, received_at: i64) -> Option<Trade> {
        let trade = match self {
            Exchange::Bitstamp => {
                let raw: BitstampTrade = serde_json::from_value(payload.clone()).ok()?;
                Trade {
                    external_key: raw.id.to_string(),
                    amount: raw.amount,
                    price: raw.price,
                    created_at: received_at,
                }
            }
            Exchange::Bitfinex => {
                let raw: BitfinexTrade = serde_json::from_value(payload.clone()).ok()?;
                Trade {
                    external_key: raw.tid.to_string(),
                    amount: raw.amount,
                    price: raw.price,
                    // v1 reports seconds
                    created_at: raw.timestamp * 1000,
                }
            }
            Exchange::IndependentReserve => {
                let raw: IndependentReserveTrade = serde_json::from_value(payload.clone()).ok()?;
                Trade {
                    // No native trade id on this feed
                    external_key: synthetic_key(),
                    amount: raw.primary_currency_amount,
                    price: raw.secondary_currency_trade_price,
                    created_at: raw.trade_timestamp_utc.timestamp_millis(),
                }
            }
            Exchange::Kraken => {
                // [price, volume, time, side, order_type, misc, (trade_id)]
                let fields = payload.as_array()?;
                let price: Decimal = fields.first()?.as_str()?.parse().ok()?;
                let amount: Decimal = fields.get(1)?.as_str()?.parse().ok()?;
                let time_secs = fields.get(2)?.as_f64()?;
                let external_key = fields
                    .get(6)
                    .and_then(Value::as_i64)
                    .map(|id| id.to_string())
                    .unwrap_or_else(synthetic_key);
                Trade {
                    external_key,
                    amount,
                    price,
                    created_at: (time_secs * 1000.0) as i64,
                }
            }
        };

        if trade.amount <= Decimal::ZERO || trade.price <= Decimal::ZERO {
            return None;
        }

        Some(Trade {
            price: trade.price.round_dp(2),
            ..trade
        })
    }
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Random fixed-length alphanumeric key for sources without a native trade
/// id. Collisions are low-probability and non-fatal.
fn synthetic_key() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}

#[derive(Debug, Deserialize)]
struct BitstampTrade {
    id: u64,
    amount: Decimal,
    price: Decimal,
}

#[derive(Debug, Deserialize)]
struct BitfinexTrade {
    tid: i64,
    amount: Decimal,
    price: Decimal,
    /// Epoch seconds
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IndependentReserveTrade {
    primary_currency_amount: Decimal,
    secondary_currency_trade_price: Decimal,
    trade_timestamp_utc: DateTime<Utc>,
}
