use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Outbox polling interval in milliseconds (default: 1000)
    pub outbox_poll_interval_ms: u64,

    /// Maximum outbox rows fetched per publish cycle (default: 100)
    pub outbox_batch_size: i64,

    /// Seconds a ledger claim stays exclusive before another publisher may reclaim it
    pub outbox_lease_secs: u64,

    /// Publish attempts before an event is parked as FAILED; unset retries forever
    pub outbox_max_attempts: Option<i32>,

    /// Seconds a notifier consumer blocks waiting for a queue message
    pub notifier_block_timeout_secs: f64,

    /// Seconds a notifier consumer stays alive without a heartbeat; its
    /// unacknowledged deliveries are recovered after that (default: 30)
    pub notifier_consumer_ttl_secs: u64,

    /// HTTP port for the operations API
    pub api_port: u16,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            outbox_poll_interval_ms: std::env::var("OUTBOX_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("OUTBOX_POLL_INTERVAL_MS must be a valid u64"))?,
            outbox_batch_size: std::env::var("OUTBOX_BATCH_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .ok()
                .filter(|size: &i64| *size > 0)
                .ok_or_else(|| anyhow::anyhow!("OUTBOX_BATCH_SIZE must be a positive integer"))?,
            outbox_lease_secs: std::env::var("OUTBOX_LEASE_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("OUTBOX_LEASE_SECS must be a valid u64"))?,
            outbox_max_attempts: match std::env::var("OUTBOX_MAX_ATTEMPTS") {
                Ok(raw) => Some(
                    raw.parse()
                        .ok()
                        .filter(|attempts: &i32| *attempts > 0)
                        .ok_or_else(|| {
                            anyhow::anyhow!("OUTBOX_MAX_ATTEMPTS must be a positive integer")
                        })?,
                ),
                Err(_) => None,
            },
            notifier_block_timeout_secs: std::env::var("NOTIFIER_BLOCK_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("NOTIFIER_BLOCK_TIMEOUT_SECS must be a number"))?,
            notifier_consumer_ttl_secs: std::env::var("NOTIFIER_CONSUMER_TTL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .ok()
                .filter(|ttl: &u64| *ttl > 0)
                .ok_or_else(|| {
                    anyhow::anyhow!("NOTIFIER_CONSUMER_TTL_SECS must be a positive integer")
                })?,
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("API_PORT must be a valid u16"))?,
        };

        if config.notifier_consumer_ttl_secs as f64 <= config.notifier_block_timeout_secs {
            anyhow::bail!("NOTIFIER_CONSUMER_TTL_SECS must exceed NOTIFIER_BLOCK_TIMEOUT_SECS");
        }

        Ok(config)
    }
}
