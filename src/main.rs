//! Multi-Exchange Market Data Aggregator
//!
//! Ingests trades from exchange feeds, rolls staged data up into one
//! aggregated series, and answers windowed statistics queries.

use clap::{Parser, Subcommand};
use market_aggregator::{
    config::Config,
    ingest::Ingester,
    rollup,
    stats::{parse_window, StatsEngine},
    storage::Database,
};
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "market-aggregator")]
#[command(about = "Multi-exchange trade ingestion and aggregation service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingestion pipeline and rollup scheduler
    Run,
    /// Run a single rollup pass and exit
    Rollup,
    /// Query windowed statistics over the aggregated series
    Query {
        /// Window end, epoch milliseconds
        #[arg(long)]
        time: String,
        /// Window length, milliseconds
        #[arg(long)]
        time_period: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = if Path::new(&cli.config).exists() {
        Config::load(&cli.config)?
    } else {
        Config::load_default()?
    };

    match cli.command {
        Commands::Run => run(config).await,
        Commands::Rollup => rollup_once(config).await,
        Commands::Query { time, time_period } => query(config, &time, &time_period).await,
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting market data aggregator");

    let db = Database::connect(&config.database.path).await?;

    let ingester = Ingester::new(&config, db.staging());
    ingester.initialize_adapters();

    rollup::rollup_loop(db.staging(), db.aggregates(), config.rollup.interval_secs).await;

    Ok(())
}

async fn rollup_once(config: Config) -> anyhow::Result<()> {
    let db = Database::connect(&config.database.path).await?;

    let moved = rollup::run_rollup(&db.staging(), &db.aggregates()).await;
    tracing::info!("Rollup moved {} trades", moved);

    Ok(())
}

async fn query(config: Config, time: &str, time_period: &str) -> anyhow::Result<()> {
    let (time, time_period) = parse_window(time, time_period)?;

    let db = Database::connect(&config.database.path).await?;
    let engine = StatsEngine::new(db.aggregates());

    let stats = engine.query(time, time_period).await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
