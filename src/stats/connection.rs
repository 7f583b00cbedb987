use anyhow::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
    pub max_lifetime_seconds: u64,
    pub statement_timeout_seconds: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            connection_timeout_seconds: 10,
            idle_timeout_seconds: 300,
            max_lifetime_seconds: 3600,
            // Aggregation queries scan the fact table; give them room
            statement_timeout_seconds: 120,
        }
    }
}

/// Builds the shared PostgreSQL pool. The API only reads and writes single
/// rows, so the pool stays small; the worker shares it.
pub async fn create_pool(database_url: &str, config: &ConnectionConfig) -> Result<PgPool> {
    let mut url = database_url.to_string();
    url.push(if url.contains('?') { '&' } else { '?' });
    url.push_str(&format!(
        "statement_timeout={}s&tcp_keepalives_idle=60&tcp_keepalives_interval=30&tcp_keepalives_count=3",
        config.statement_timeout_seconds
    ));

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
        .idle_timeout(Some(Duration::from_secs(config.idle_timeout_seconds)))
        .max_lifetime(Some(Duration::from_secs(config.max_lifetime_seconds)))
        .test_before_acquire(true)
        .connect(&url)
        .await?;

    sqlx::query("SELECT 1").fetch_one(&pool).await?;

    info!(
        "Connected to PostgreSQL with {} max connections ({} min)",
        config.max_connections, config.min_connections
    );
    Ok(pool)
}

pub async fn check_health(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").fetch_one(pool).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_keeps_a_small_pool() {
        let config = ConnectionConfig::default();
        assert_eq!(config.max_connections, 10);
        assert!(config.min_connections <= config.max_connections);
        assert!(config.statement_timeout_seconds > 0);
    }
}
