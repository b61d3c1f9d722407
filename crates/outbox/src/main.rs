use std::sync::Arc;

use herald_common::bus::RedisBus;
use herald_common::config::AppConfig;
use herald_common::{db, redis_pool};
use herald_outbox::ledger::PgLedger;
use herald_outbox::publisher::{OutboxPublisher, PublisherSettings};
use herald_outbox::store::PgOutboxStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald_outbox=info,herald_common=info".into()),
        )
        .json()
        .init();

    tracing::info!("Herald outbox publisher starting...");

    let config = AppConfig::from_env()?;

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;

    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    let redis = redis_pool::create_redis_pool(&config.redis_url).await?;

    let publisher = OutboxPublisher::new(
        Arc::new(PgOutboxStore::new(pool.clone())),
        Arc::new(PgLedger::new(pool)),
        Arc::new(RedisBus::new(redis)),
        PublisherSettings::from_config(&config),
    );

    tokio::select! {
        result = publisher.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Outbox publisher exited with error");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("Herald outbox publisher stopped.");
    Ok(())
}
