use std::sync::Arc;

use clap::Parser;
use derivbot::exchange::binance::BinanceFutures;
use derivbot::exchange::bitmex::Bitmex;
use derivbot::exchange::Connector;
use derivbot::models::Venue;
use derivbot::persistence::RedisPersistence;
use derivbot::Result;

#[derive(Parser, Debug)]
#[command(name = "derivbot", about = "Automated derivatives trading engine")]
struct Cli {
    /// Venues to connect (binance_futures, bitmex)
    #[arg(long, value_delimiter = ',', default_value = "binance_futures,bitmex")]
    venues: Vec<String>,

    /// Redis URL for workspace persistence
    #[arg(long, default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Use venue testnets
    #[arg(long)]
    testnet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    tracing::info!("derivbot starting");

    let mut connectors: Vec<Arc<Connector>> = Vec::new();
    for venue_name in &cli.venues {
        let Some(venue) = Venue::from_str(venue_name) else {
            tracing::warn!("unknown venue {}, skipping", venue_name);
            continue;
        };
        match build_connector(venue, cli.testnet) {
            Some(connector) => connectors.push(connector),
            None => tracing::warn!("missing API credentials for {}, skipping", venue),
        }
    }

    if connectors.is_empty() {
        return Err("no venue could be initialized".into());
    }

    // Catalog and balances on connect
    for connector in &connectors {
        connector.init().await;
    }

    // Restore the persisted workspace
    match RedisPersistence::new(&cli.redis_url).await {
        Ok(mut persistence) => {
            restore_watchlist(&mut persistence, &connectors).await;
            restore_strategies(&mut persistence, &connectors).await;
        }
        Err(e) => {
            tracing::warn!(
                "Failed to connect to Redis ({}), continuing without persistence",
                e
            );
        }
    }

    // One long-lived session task per venue
    let handles: Vec<_> = connectors.iter().map(|c| c.start()).collect();

    tracing::info!(
        "{} venue session(s) running. Press Ctrl+C to stop...",
        handles.len()
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("received Ctrl+C, shutting down");

    for connector in &connectors {
        connector.shutdown();
    }

    tracing::info!("derivbot stopped");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter("derivbot=info,derivbot::strategy=debug")
        .init();
}

fn build_connector(venue: Venue, testnet: bool) -> Option<Arc<Connector>> {
    match venue {
        Venue::BinanceFutures => {
            let api_key = std::env::var("BINANCE_API_KEY").ok()?;
            let api_secret = std::env::var("BINANCE_API_SECRET").ok()?;
            Some(Connector::new(Arc::new(BinanceFutures::new(
                api_key, api_secret, testnet,
            ))))
        }
        Venue::Bitmex => {
            let api_key = std::env::var("BITMEX_API_KEY").ok()?;
            let api_secret = std::env::var("BITMEX_API_SECRET").ok()?;
            Some(Connector::new(Arc::new(Bitmex::new(
                api_key, api_secret, testnet,
            ))))
        }
    }
}

fn connector_for(connectors: &[Arc<Connector>], venue: Venue) -> Option<&Arc<Connector>> {
    connectors.iter().find(|c| c.venue() == venue)
}

/// Subscribe market data for every watched instrument
async fn restore_watchlist(persistence: &mut RedisPersistence, connectors: &[Arc<Connector>]) {
    match persistence.load_watchlist().await {
        Ok(entries) => {
            for entry in entries {
                let Some(connector) = connector_for(connectors, entry.venue) else {
                    tracing::warn!(
                        "no active connector for {}, skipping watched {}",
                        entry.venue,
                        entry.symbol
                    );
                    continue;
                };
                connector.watch_instrument(&entry.symbol);
            }
        }
        Err(e) => tracing::warn!("Failed to load watchlist from Redis: {}", e),
    }
}

/// Re-activate every persisted strategy configuration
async fn restore_strategies(persistence: &mut RedisPersistence, connectors: &[Arc<Connector>]) {
    match persistence.load_strategies().await {
        Ok(configs) => {
            for config in configs {
                let Some(connector) = connector_for(connectors, config.venue) else {
                    tracing::warn!(
                        "no active connector for {}, skipping stored strategy on {}",
                        config.venue,
                        config.symbol
                    );
                    continue;
                };
                let symbol = config.symbol.clone();
                match connector.activate_strategy(config).await {
                    Some(id) => tracing::info!("restored strategy {} on {}", id, symbol),
                    None => tracing::warn!("failed to restore strategy on {}", symbol),
                }
            }
        }
        Err(e) => tracing::warn!("Failed to load strategies from Redis: {}", e),
    }
}
