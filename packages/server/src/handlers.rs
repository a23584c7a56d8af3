//! HTTP handler functions for the geotag API.
//!
//! Thin plumbing: parameter validation, resolver / places store calls,
//! and the `{success, data, ...}` response envelope. Input problems map
//! to 400-class machine codes; operation failures to 500-class codes;
//! everything else is the core's business.

use actix_web::{HttpResponse, web};
use chrono::Utc;
use geotag_database::address_cache;
use geotag_geocoder::AutocompleteOptions;
use geotag_places::{PlacesError, queries};
use geotag_places_models::PlaceSearchFilter;
use geotag_resolver::{BULK_MAX_ADDRESSES, eviction};
use geotag_server_models::{
    ApiAddress, ApiHealth, ApiNearbyPlace, ApiPlace, AutocompleteParams, BulkGeocodeBody,
    CacheClearBody, CacheInfo, GeocodeParams, NearbyParams, ReverseParams, SearchMeta,
    SearchParams, ValidateBody, VerifyBody,
};
use uuid::Uuid;

use crate::AppState;

fn bad_request(code: &str, message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({
        "success": false,
        "error": {"code": code, "message": message}
    }))
}

fn not_found(message: &str) -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({
        "success": false,
        "error": {"code": "NOT_FOUND", "message": message}
    }))
}

fn internal_error(code: &str, message: &str) -> HttpResponse {
    HttpResponse::InternalServerError().json(serde_json::json!({
        "success": false,
        "error": {"code": code, "message": message}
    }))
}

fn parse_place_id(raw: &str) -> Result<Uuid, HttpResponse> {
    Uuid::parse_str(raw).map_err(|_| bad_request("INVALID_ID", "Place id must be a UUID"))
}

const fn valid_latitude(lat: f64) -> bool {
    lat >= -90.0 && lat <= 90.0
}

const fn valid_longitude(lng: f64) -> bool {
    lng >= -180.0 && lng <= 180.0
}

/// `GET /geotag/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /geotag/geocode`
pub async fn geocode(
    state: web::Data<AppState>,
    params: web::Query<GeocodeParams>,
) -> HttpResponse {
    let Some(address) = params.address.as_deref().map(str::trim).filter(|a| !a.is_empty())
    else {
        return bad_request("MISSING_PARAMETER", "address is required");
    };

    match state.resolver.geocode(address).await {
        Ok(resolved) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": resolved.value.map(ApiAddress::from),
            "cache_info": CacheInfo { hit: resolved.cache_hit },
        })),
        Err(e) => {
            log::error!("geocode failed for {address:?}: {e}");
            internal_error("GEOCODE_ERROR", "Failed to geocode address")
        }
    }
}

/// `GET /geotag/reverse`
pub async fn reverse_geocode(
    state: web::Data<AppState>,
    params: web::Query<ReverseParams>,
) -> HttpResponse {
    let (Some(lat), Some(lng)) = (params.lat, params.lng) else {
        return bad_request("INVALID_PARAMETER", "lat and lng are required");
    };
    if !valid_latitude(lat) || !valid_longitude(lng) {
        return bad_request("INVALID_PARAMETER", "lat/lng out of range");
    }

    match state.resolver.reverse_geocode(lat, lng).await {
        Ok(resolved) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": resolved.value.map(ApiAddress::from),
            "cache_info": CacheInfo { hit: resolved.cache_hit },
        })),
        Err(e) => {
            log::error!("reverse geocode failed for ({lat}, {lng}): {e}");
            internal_error("GEOCODE_ERROR", "Failed to reverse geocode coordinates")
        }
    }
}

/// `GET /geotag/autocomplete`
pub async fn autocomplete(
    state: web::Data<AppState>,
    params: web::Query<AutocompleteParams>,
) -> HttpResponse {
    let Some(input) = params.input.as_deref().map(str::trim).filter(|i| !i.is_empty()) else {
        return bad_request("MISSING_PARAMETER", "input is required");
    };

    let components = params.country.as_deref().map(|countries| {
        countries
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(|code| format!("country:{code}"))
            .collect::<Vec<_>>()
            .join("|")
    });

    let options = AutocompleteOptions {
        components: components.filter(|c| !c.is_empty()),
        language: params.language.clone(),
        types: params
            .types
            .as_deref()
            .map(|types| {
                types
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
        session_token: params.session_token.clone(),
    };

    match state.resolver.autocomplete(input, &options).await {
        Ok(resolved) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": resolved.value,
            "cache_info": CacheInfo { hit: resolved.cache_hit },
        })),
        Err(e) => {
            log::error!("autocomplete failed for {input:?}: {e}");
            internal_error("AUTOCOMPLETE_ERROR", "Failed to fetch suggestions")
        }
    }
}

/// `GET /geotag/places/{id}`
pub async fn get_place(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let id = match parse_place_id(&path) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match queries::get_place(state.db.as_ref(), id).await {
        Ok(place) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": ApiPlace::from(place),
        })),
        Err(PlacesError::NotFound) => not_found("Place not found"),
        Err(e) => {
            log::error!("place fetch failed for {id}: {e}");
            internal_error("INTERNAL_ERROR", "Failed to fetch place")
        }
    }
}

/// `GET /geotag/places/search`
pub async fn search_places(
    state: web::Data<AppState>,
    params: web::Query<SearchParams>,
) -> HttpResponse {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let offset = params.offset.unwrap_or(0);

    let filter = PlaceSearchFilter {
        query: params.q.clone(),
        country_code: params.country.clone(),
        city: params.city.clone(),
        state_code: params.state.clone(),
        postal_code: params.postal_code.clone(),
        verified: params.verified.as_deref().and_then(|value| match value {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        }),
        limit,
        offset,
    };

    match queries::search_places(state.db.as_ref(), &filter).await {
        Ok((places, total)) => {
            let data: Vec<ApiPlace> = places.into_iter().map(ApiPlace::from).collect();
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "data": data,
                "meta": SearchMeta { total, limit, offset },
            }))
        }
        Err(e) => {
            log::error!("place search failed: {e}");
            internal_error("SEARCH_ERROR", "Failed to search places")
        }
    }
}

/// `GET /geotag/places/nearby`
pub async fn nearby_places(
    state: web::Data<AppState>,
    params: web::Query<NearbyParams>,
) -> HttpResponse {
    let (Some(lat), Some(lng)) = (params.lat, params.lng) else {
        return bad_request("INVALID_PARAMETER", "lat and lng are required");
    };
    if !valid_latitude(lat) || !valid_longitude(lng) {
        return bad_request("INVALID_PARAMETER", "lat/lng out of range");
    }

    let radius = params.radius.unwrap_or(10.0);
    if radius <= 0.0 {
        return bad_request("INVALID_PARAMETER", "radius must be positive");
    }

    match queries::find_nearby(state.db.as_ref(), lat, lng, radius, params.limit).await {
        Ok(nearby) => {
            let data: Vec<ApiNearbyPlace> =
                nearby.into_iter().map(ApiNearbyPlace::from).collect();
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "data": data,
            }))
        }
        Err(e) => {
            log::error!("nearby search failed at ({lat}, {lng}): {e}");
            internal_error("NEARBY_ERROR", "Failed to search nearby places")
        }
    }
}

/// `POST /geotag/places/validate`
pub async fn validate_address(
    state: web::Data<AppState>,
    body: web::Json<ValidateBody>,
) -> HttpResponse {
    let address = body.address.trim();
    if address.is_empty() {
        return bad_request("MISSING_PARAMETER", "address is required");
    }

    match state.resolver.validate_address(address).await {
        Ok(validation) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": {
                "valid": validation.valid,
                "normalized": validation.normalized.map(ApiAddress::from),
                "issues": validation.issues,
            },
        })),
        Err(e) => {
            log::error!("validation failed for {address:?}: {e}");
            internal_error("VALIDATION_ERROR", "Failed to validate address")
        }
    }
}

/// `PUT /geotag/places/{id}/verify`
pub async fn verify_place(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: Option<web::Json<VerifyBody>>,
) -> HttpResponse {
    let id = match parse_place_id(&path) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let verified = body.and_then(|b| b.verified).unwrap_or(true);

    match queries::set_verified(state.db.as_ref(), id, verified).await {
        Ok(place) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": {"id": place.id, "verified": place.verified},
        })),
        Err(PlacesError::NotFound) => not_found("Place not found"),
        Err(e) => {
            log::error!("verify update failed for {id}: {e}");
            internal_error("UPDATE_ERROR", "Failed to update place")
        }
    }
}

/// `DELETE /geotag/places/{id}`
pub async fn delete_place(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let id = match parse_place_id(&path) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match queries::soft_delete_place(state.db.as_ref(), id).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": {"id": id, "deleted": true},
        })),
        Err(PlacesError::NotFound) => not_found("Place not found"),
        Err(e) => {
            log::error!("delete failed for {id}: {e}");
            internal_error("DELETE_ERROR", "Failed to delete place")
        }
    }
}

/// `POST /geotag/bulk/geocode`
pub async fn bulk_geocode(
    state: web::Data<AppState>,
    body: web::Json<BulkGeocodeBody>,
) -> HttpResponse {
    let addresses = &body.addresses;
    if addresses.is_empty() || addresses.len() > BULK_MAX_ADDRESSES {
        return bad_request(
            "INVALID_PARAMETER",
            "addresses must contain between 1 and 100 entries",
        );
    }

    let report = state.resolver.bulk_geocode(addresses).await;

    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "data": report,
    }))
}

/// `GET /geotag/cache/stats`
pub async fn cache_stats(state: web::Data<AppState>) -> HttpResponse {
    let snapshot = state.resolver.metrics().snapshot();
    let hit_rate = snapshot.hit_rate;

    match address_cache::table_stats(state.db.as_ref(), Utc::now().naive_utc()).await {
        Ok((total, expired, by_type)) => {
            let rows: Vec<serde_json::Value> = by_type
                .into_iter()
                .map(|(cache_type, count)| {
                    serde_json::json!({"cache_type": cache_type, "rows": count})
                })
                .collect();

            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "data": {
                    "cache": {
                        "counters": snapshot,
                        "rows": {"total": total, "expired": expired, "by_type": rows},
                    },
                    "hitRate": hit_rate,
                },
            }))
        }
        Err(e) => {
            log::error!("cache stats failed: {e}");
            internal_error("INTERNAL_ERROR", "Failed to read cache stats")
        }
    }
}

/// `POST /geotag/cache/clear`
pub async fn clear_cache(
    state: web::Data<AppState>,
    body: Option<web::Json<CacheClearBody>>,
) -> HttpResponse {
    let batch_size = body
        .and_then(|b| b.batch_size)
        .filter(|&size| size > 0)
        .unwrap_or(state.eviction_batch_size);

    match eviction::run_once(state.db.as_ref(), batch_size).await {
        Ok(stats) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": {"deleted": stats.deleted, "iterations": stats.iterations},
        })),
        Err(e) => {
            log::error!("manual cache clear failed: {e}");
            internal_error("INTERNAL_ERROR", "Failed to clear expired cache entries")
        }
    }
}

/// `GET /geotag/stats`
pub async fn stats(state: web::Data<AppState>) -> HttpResponse {
    let snapshot = state.resolver.metrics().snapshot();
    let hit_rate = snapshot.hit_rate;

    let cache_rows = address_cache::table_stats(state.db.as_ref(), Utc::now().naive_utc()).await;
    let places = queries::place_stats(state.db.as_ref()).await;

    match (cache_rows, places) {
        (Ok((total, expired, _)), Ok(places)) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": {
                "cache": {
                    "counters": snapshot,
                    "rows": {"total": total, "expired": expired},
                },
                "places": places,
                "hitRate": hit_rate,
            },
        })),
        (Err(e), _) => {
            log::error!("stats aggregation failed: {e}");
            internal_error("INTERNAL_ERROR", "Failed to aggregate stats")
        }
        (_, Err(e)) => {
            log::error!("stats aggregation failed: {e}");
            internal_error("INTERNAL_ERROR", "Failed to aggregate stats")
        }
    }
}
