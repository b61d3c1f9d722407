use redis::Client;
use redis::aio::ConnectionManager;

/// Create a Redis connection manager for the message bus.
///
/// The manager reconnects on its own and is cheap to clone, so every
/// publisher and queue consumer holds its own clone.
pub async fn create_redis_pool(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let client = Client::open(redis_url)?;
    let manager = ConnectionManager::new(client).await?;

    tracing::info!("Connected to Redis message bus");
    Ok(manager)
}
