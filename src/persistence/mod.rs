use crate::models::WatchlistEntry;
use crate::strategy::StrategyConfig;
use crate::Result;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::time::{timeout, Duration};

const WATCHLIST_KEY: &str = "workspace:watchlist";
const STRATEGIES_KEY: &str = "workspace:strategies";

/// Redis-backed snapshot store for the workspace
///
/// Persists the watched-instrument rows and the strategy-configuration rows
/// as JSON values in lists. Saves erase the previous rows and write the new
/// snapshot, so the store always reflects the current workspace.
pub struct RedisPersistence {
    conn: ConnectionManager,
}

impl RedisPersistence {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        // Add 5 second timeout to connection attempt
        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| "Redis connection timeout after 5 seconds")??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    async fn save_rows<T: serde::Serialize>(&mut self, key: &str, rows: &[T]) -> Result<()> {
        let _: () = self.conn.del(key).await?;

        for row in rows {
            let value = serde_json::to_string(row)?;
            let _: () = self.conn.rpush(key, value).await?;
        }

        Ok(())
    }

    async fn load_rows<T: serde::de::DeserializeOwned>(&mut self, key: &str) -> Result<Vec<T>> {
        let raw: Vec<String> = self.conn.lrange(key, 0, -1).await?;

        let mut rows = Vec::with_capacity(raw.len());
        for value in raw {
            rows.push(serde_json::from_str(&value)?);
        }

        Ok(rows)
    }

    /// Replace the stored watchlist with the given rows
    pub async fn save_watchlist(&mut self, entries: &[WatchlistEntry]) -> Result<()> {
        self.save_rows(WATCHLIST_KEY, entries).await?;
        tracing::debug!("Saved {} watchlist rows to Redis", entries.len());
        Ok(())
    }

    pub async fn load_watchlist(&mut self) -> Result<Vec<WatchlistEntry>> {
        let entries = self.load_rows(WATCHLIST_KEY).await?;
        tracing::info!("Loaded {} watchlist rows from Redis", entries.len());
        Ok(entries)
    }

    /// Replace the stored strategy configurations with the given rows
    ///
    /// Rule-specific parameters travel inside each row as an opaque tagged
    /// blob, so the store needs no knowledge of rule internals.
    pub async fn save_strategies(&mut self, configs: &[StrategyConfig]) -> Result<()> {
        self.save_rows(STRATEGIES_KEY, configs).await?;
        tracing::debug!("Saved {} strategy rows to Redis", configs.len());
        Ok(())
    }

    pub async fn load_strategies(&mut self) -> Result<Vec<StrategyConfig>> {
        let configs = self.load_rows(STRATEGIES_KEY).await?;
        tracing::info!("Loaded {} strategy rows from Redis", configs.len());
        Ok(configs)
    }
}
