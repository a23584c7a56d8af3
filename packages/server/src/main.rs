#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server binary for the geotag geocoding service.
//!
//! Connects to the database, runs migrations, builds the provider
//! failover chain from environment credentials, starts the cache
//! eviction worker, and serves the `/geotag` REST surface until
//! shutdown. The eviction worker finishes its current tick before the
//! process exits.

use std::sync::Arc;

use actix_web::web;
use geotag_database::{db, run_migrations};
use geotag_resolver::CachedResolver;
use geotag_resolver::config::{EvictionConfig, ResolverConfig};
use geotag_resolver::eviction::EvictionWorker;
use geotag_server::AppState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    log::info!("Connecting to database...");
    let db_conn = db::connect_from_env()
        .await
        .expect("Failed to connect to database");

    log::info!("Running migrations...");
    run_migrations(db_conn.as_ref())
        .await
        .expect("Failed to run migrations");

    let db: Arc<dyn switchy_database::Database> = Arc::from(db_conn);

    let creds = geotag_geocoder::registry::ProviderCredentials::from_env();
    let chain = geotag_geocoder::registry::build_chain(&creds)
        .expect("Failed to build provider failover chain");
    log::info!("Provider chain: {:?}", chain.provider_names());

    let resolver_config = ResolverConfig::from_env();
    let resolver = Arc::new(CachedResolver::new(
        Arc::clone(&db),
        Arc::new(chain),
        resolver_config,
    ));

    let eviction_config = EvictionConfig::from_env();
    let eviction_batch_size = eviction_config.batch_size;
    let eviction_handle = eviction_config.enabled.then(|| {
        EvictionWorker::new(Arc::clone(&db), eviction_config).start()
    });

    let state = web::Data::new(AppState {
        db,
        resolver,
        eviction_batch_size,
    });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    let result = geotag_server::run(&bind_addr, port, state).await;

    if let Some(handle) = eviction_handle {
        handle.stop().await;
    }

    result
}
