use std::sync::Arc;

use itemvault_api::config::Config;
use itemvault_infra::{
    FeedConsumer, HttpTradingService, InMemoryRelay, PostgresLedgerStore, Reconciler,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    itemvault_observability::init();

    let config = Config::from_env()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("../infra/migrations").run(&pool).await?;

    let store = Arc::new(PostgresLedgerStore::new(pool));
    let service = Arc::new(HttpTradingService::new(
        config.service_url,
        config.feed_url,
        config.api_key,
    ));
    let relay = Arc::new(InMemoryRelay::new());

    let consumer = FeedConsumer::new(Reconciler::new(store, relay), service);

    tokio::select! {
        // run() returns only on a persistence failure; exiting non-zero
        // lets the supervisor restart us from the committed checkpoint.
        result = consumer.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }

    Ok(())
}
