//! Multi-Exchange Market Data Aggregator
//!
//! Ingests trades from several cryptocurrency exchanges (push subscriptions
//! and scheduled polling), normalizes them into one canonical record, rolls
//! staged trades up into a single aggregated series on a fixed interval, and
//! answers windowed statistics queries (VWAP, std deviation, min/max, volume).

pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod rollup;
pub mod sources;
pub mod stats;
pub mod storage;
