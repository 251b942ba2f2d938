use docsel_core::{IdStrategy, ResourceConfig};
use docsel_storage::{DocumentStore, InMemoryStore, PersistentStore, Resource};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod metrics;
mod routes;

fn config_from_env() -> anyhow::Result<ResourceConfig> {
    let collection = std::env::var("DOCSEL_COLLECTION").unwrap_or_else(|_| "doc".into());
    let mut config = ResourceConfig::new(collection);
    if let Ok(fields) = std::env::var("DOCSEL_FIELDS") {
        config = config.with_fields(docsel_core::parse(&fields)?);
    }
    if let Ok(field) = std::env::var("DOCSEL_ID_FIELD") {
        config = config.with_id(IdStrategy::Field(field));
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config_from_env()?;
    let store: Arc<dyn DocumentStore> = if let Ok(dir) = std::env::var("DATA_DIR") {
        match PersistentStore::open(std::path::PathBuf::from(dir)) {
            Ok(p) => Arc::new(p),
            Err(e) => {
                warn!("persistent open failed: {} - falling back to memory", e);
                Arc::new(InMemoryStore::new())
            }
        }
    } else {
        Arc::new(InMemoryStore::new())
    };

    let resource = Resource::new(store, config);
    resource.init().await?;
    let app = routes::router(resource.clone());

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".into())
        .parse()?;
    info!(
        collection = %resource.collection(),
        fields = %resource
            .config()
            .fields
            .as_ref()
            .map(|f| f.to_string())
            .unwrap_or_default(),
        "http listening on {}",
        addr
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
