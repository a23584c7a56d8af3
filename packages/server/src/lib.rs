#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the geotag geocoding service.
//!
//! Serves the `/geotag` REST surface: cached geocode / reverse /
//! autocomplete resolution, the places store (search, nearby, verify,
//! soft delete), bulk geocoding, and cache statistics. All domain
//! behavior lives in the resolver, geocoder, and places packages; the
//! handlers here are JSON plumbing around them.
//!
//! Literal routes are registered before the `{id}` routes so
//! `/places/search` and `/places/nearby` never shadow into the dynamic
//! segment.

pub mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use geotag_resolver::CachedResolver;
use switchy_database::Database;

/// Shared application state.
pub struct AppState {
    /// Database connection used by the places store and stats handlers.
    pub db: Arc<dyn Database>,
    /// The cached resolver over the provider failover chain.
    pub resolver: Arc<CachedResolver>,
    /// Default batch size for manual cache clears.
    pub eviction_batch_size: u32,
}

/// Runs the HTTP server until it is stopped.
///
/// # Errors
///
/// Returns an [`std::io::Error`] if binding or serving fails.
pub async fn run(
    bind_addr: &str,
    port: u16,
    state: web::Data<AppState>,
) -> std::io::Result<()> {
    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .service(
                web::scope("/geotag")
                    .route("/health", web::get().to(handlers::health))
                    .route("/geocode", web::get().to(handlers::geocode))
                    .route("/reverse", web::get().to(handlers::reverse_geocode))
                    .route("/autocomplete", web::get().to(handlers::autocomplete))
                    .route("/places/search", web::get().to(handlers::search_places))
                    .route("/places/nearby", web::get().to(handlers::nearby_places))
                    .route("/places/validate", web::post().to(handlers::validate_address))
                    .route("/places/{id}/verify", web::put().to(handlers::verify_place))
                    .route("/places/{id}", web::get().to(handlers::get_place))
                    .route("/places/{id}", web::delete().to(handlers::delete_place))
                    .route("/bulk/geocode", web::post().to(handlers::bulk_geocode))
                    .route("/cache/stats", web::get().to(handlers::cache_stats))
                    .route("/cache/clear", web::post().to(handlers::clear_cache))
                    .route("/stats", web::get().to(handlers::stats)),
            )
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
