use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use herald_common::bus::{MessageBus, RedisBus};
use herald_common::config::AppConfig;
use herald_common::{db, queues, redis_pool};
use herald_engine::blocks::PgBlockService;
use herald_engine::directory::PgDirectory;
use herald_engine::factory::OrchestratorFactory;
use herald_engine::orchestrator::Collaborators;
use herald_engine::policy::PgPolicyStore;
use herald_engine::sink::PgNotificationSink;
use herald_notifier::consumer::QueueConsumer;
use herald_notifier::dispatch::Dispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald_notifier=info,herald_engine=info".into()),
        )
        .json()
        .init();

    tracing::info!("Herald notifier starting...");

    let config = AppConfig::from_env()?;

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;

    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    let redis = redis_pool::create_redis_pool(&config.redis_url).await?;
    let bus: Arc<dyn MessageBus> = Arc::new(RedisBus::new(redis));

    let collaborators = Collaborators::new(
        Arc::new(PgPolicyStore::new(pool.clone())),
        Arc::new(PgDirectory::new(pool.clone())),
        Arc::new(PgBlockService::new(pool.clone())),
    );
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(OrchestratorFactory::new(collaborators)),
        Arc::new(PgNotificationSink::new(pool)),
    ));

    let mut consumers = JoinSet::new();
    for queue in queues::CONSUMED {
        let consumer = QueueConsumer::new(
            queue,
            bus.clone(),
            dispatcher.clone(),
            config.notifier_block_timeout_secs,
        )
        .with_ttl(Duration::from_secs(config.notifier_consumer_ttl_secs));
        consumers.spawn(async move { consumer.run().await });
    }

    tracing::info!(queues = queues::CONSUMED.len(), "Queue consumers started");

    tokio::select! {
        Some(result) = consumers.join_next() => {
            let error = match result {
                Ok(Ok(())) => anyhow::anyhow!("queue consumer stopped unexpectedly"),
                Ok(Err(e)) => e,
                Err(e) => e.into(),
            };
            tracing::error!(error = %error, "Queue consumer exited with error");
            return Err(error);
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    consumers.shutdown().await;
    tracing::info!("Herald notifier stopped.");
    Ok(())
}
