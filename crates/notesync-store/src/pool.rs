//! PostgreSQL connection pool for the remote store.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use notesync_core::defaults::{POOL_ACQUIRE_TIMEOUT_SECS, POOL_MAX_CONNECTIONS};
use notesync_core::{Error, Result};

/// Pool configuration options.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: POOL_MAX_CONNECTIONS,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(POOL_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

impl PoolConfig {
    /// Defaults overridden by `DB_MAX_CONNECTIONS` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.max_connections = n;
        }
        config
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }
}

/// Connect a pool. Every open subscription holds one of its connections
/// for LISTEN.
pub async fn create_pool(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "store",
        component = "pool",
        op = "established",
        max_connections = config.max_connections,
        pool_size = pool.size(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Database connection pool established"
    );
    Ok(pool)
}
