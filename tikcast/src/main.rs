use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webcast::BridgeConnector;

use tikcast::api::{ApiServer, AppState};
use tikcast::config::AppConfig;
use tikcast::ingest::IngestService;
use tikcast::resolver::RoomResolver;
use tikcast::store::EventStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tikcast=info,webcast=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env_or_default();

    let connector = Arc::new(BridgeConnector::with_config(config.bridge.clone()));
    let resolver = Arc::new(RoomResolver::with_timeout(config.profile_fetch_timeout));
    let store = Arc::new(EventStore::with_capacity(config.buffer_capacity));

    let ingest = Arc::new(IngestService::with_config(
        connector,
        resolver,
        store,
        config.ingest.clone(),
    ));
    ingest.clone().start();

    let server = ApiServer::new(config.api.clone(), AppState::new(ingest.clone()));

    let cancel = server.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            cancel.cancel();
        }
    });

    tracing::info!("tikcast initialized successfully");
    server.run().await?;

    ingest.shutdown().await;

    Ok(())
}
