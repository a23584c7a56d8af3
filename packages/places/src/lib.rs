#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! The places store: permanent, curated geocoded locations.
//!
//! Places are promoted from resolver results (or stored explicitly via
//! the validate-and-store path) and support idempotent upsert on
//! `external_place_id`, two-phase nearby search (bounding-box prefilter
//! plus haversine refinement), and sanitized full-text search with
//! relevance ordering. Deletes are always soft; read paths filter on
//! `deleted_at IS NULL`.

pub mod queries;

use thiserror::Error;

/// Errors that can occur during places operations.
#[derive(Debug, Error)]
pub enum PlacesError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] switchy_database::DatabaseError),

    /// JSON encoding of `place_types` failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The requested place does not exist (or is soft-deleted).
    #[error("Place not found")]
    NotFound,

    /// Data conversion error.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}
