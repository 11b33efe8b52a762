//! Configuration management
//!
//! One explicit struct built at startup and passed by reference into the
//! ingester, the rollup scheduler and the statistics engine.

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub rollup: RollupConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RollupConfig {
    /// Interval between staging-to-aggregate migrations, in seconds
    pub interval_secs: u64,
}

/// Per-exchange feed endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    pub bitstamp: PushSourceConfig,
    pub bitfinex: PollSourceConfig,
    pub independent_reserve: PollSourceConfig,
    pub kraken: PollSourceConfig,
}

/// A long-lived subscription feed: one (endpoint, channel) pair
#[derive(Debug, Clone, Deserialize)]
pub struct PushSourceConfig {
    pub endpoint: String,
    pub channel: String,
}

/// A scheduled fetch feed. The polling interval is derived from the
/// requests-per-hour budget: `3_600_000 / budget` milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct PollSourceConfig {
    /// Trade list endpoint. A trailing `=` marks a time-window query
    /// parameter to be filled in per poll.
    pub url: String,
    pub requests_per_hour: u32,
}

impl Config {
    /// Load configuration from file, with `MARKET_AGG_*` env overrides
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&path.as_ref().display().to_string()))
            .add_source(config::Environment::with_prefix("MARKET_AGG"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        Ok(config)
    }

    /// Load from default locations, falling back to built-in defaults
    pub fn load_default() -> anyhow::Result<Self> {
        let paths = ["config.toml", "~/.config/market-aggregator/config.toml"];

        for path in paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::load(expanded.as_ref());
            }
        }

        Ok(Self::default())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "market_data.sqlite".to_string(),
        }
    }
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            bitstamp: PushSourceConfig {
                endpoint: "wss://ws.bitstamp.net".to_string(),
                channel: "live_trades_btcusd".to_string(),
            },
            bitfinex: PollSourceConfig {
                url: "https://api.bitfinex.com/v1/trades/btcusd?timestamp=".to_string(),
                requests_per_hour: 60,
            },
            independent_reserve: PollSourceConfig {
                url: "https://api.independentreserve.com/Public/GetRecentTrades?primaryCurrencyCode=xbt&secondaryCurrencyCode=usd&numberOfRecentTradesToRetrieve=50".to_string(),
                requests_per_hour: 60,
            },
            kraken: PollSourceConfig {
                url: "https://api.kraken.com/0/public/Trades?pair=XBTUSD&since=".to_string(),
                requests_per_hour: 60,
            },
        }
    }
}
