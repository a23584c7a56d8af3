//! Database query functions for the places store.
//!
//! Full-text search and the conflict-target upsert use raw SQL via
//! `query_raw_params()`; coordinates are stored as fixed-precision
//! decimals and cast to `double precision` on read so fingerprint
//! rounding and storage agree.

use std::fmt::Write as _;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use geotag_places_models::{
    CountryCount, NearbyPlace, NewPlace, Place, PlaceSearchFilter, PlaceStats, ProviderCount,
};
use moosicbox_json_utils::database::ToValue as _;
use regex::Regex;
use switchy_database::{Database, DatabaseValue, Row};
use uuid::Uuid;

use crate::PlacesError;

/// Maximum rows per bulk upsert statement, capping statement size on
/// bulk imports.
pub const UPSERT_BATCH_SIZE: usize = 100;

/// Hard cap on the nearby-search radius.
pub const MAX_NEARBY_RADIUS_KM: f64 = 100.0;

/// Default page size for nearby search and full-text search.
pub const DEFAULT_LIMIT: u32 = 20;

/// Maximum page size for nearby search and full-text search.
pub const MAX_LIMIT: u32 = 100;

/// Characters with tsquery operator meaning, stripped before
/// tokenization to prevent operator injection.
static QUERY_SANITIZER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['":&|!()]"#).expect("valid regex"));

const PLACE_COLUMNS: &str = "id, external_place_id, formatted_address,
    latitude::double precision as latitude,
    longitude::double precision as longitude,
    geohash, street_number, street_name, city, district,
    state_code, state_name, country_code, country_name, postal_code,
    place_types, source_provider, confidence, verified,
    created_at, updated_at";

/// Strips tsquery operator characters and collapses whitespace so user
/// input always plain-tokenizes.
#[must_use]
pub fn sanitize_query(raw: &str) -> String {
    let stripped = QUERY_SANITIZER_RE.replace_all(raw, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn opt_string(value: Option<&str>) -> DatabaseValue {
    value.map_or(DatabaseValue::Null, |s| DatabaseValue::String(s.to_string()))
}

fn utc(naive: NaiveDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)
}

fn parse_place_row(row: &Row) -> Result<Place, PlacesError> {
    let conversion = |message: String| PlacesError::Conversion { message };

    let id_raw: String = row
        .to_value("id")
        .map_err(|e| conversion(format!("Failed to parse place id: {e}")))?;
    let id = Uuid::parse_str(&id_raw)
        .map_err(|e| conversion(format!("Place id is not a UUID: {e}")))?;

    let place_types_json: String = row.to_value("place_types").unwrap_or_default();
    let place_types: Vec<String> = if place_types_json.is_empty() {
        Vec::new()
    } else {
        serde_json::from_str(&place_types_json).unwrap_or_else(|e| {
            log::warn!("discarding undecodable place_types {place_types_json:?}: {e}");
            Vec::new()
        })
    };

    let latitude: f64 = row
        .to_value("latitude")
        .map_err(|e| conversion(format!("Failed to parse latitude: {e}")))?;
    let longitude: f64 = row
        .to_value("longitude")
        .map_err(|e| conversion(format!("Failed to parse longitude: {e}")))?;

    let created_at: NaiveDateTime = row.to_value("created_at").unwrap_or_default();
    let updated_at: NaiveDateTime = row.to_value("updated_at").unwrap_or_default();

    Ok(Place {
        id,
        external_place_id: row.to_value("external_place_id").unwrap_or(None),
        formatted_address: row.to_value("formatted_address").unwrap_or_default(),
        latitude,
        longitude,
        geohash: row.to_value("geohash").unwrap_or(None),
        street_number: row.to_value("street_number").unwrap_or(None),
        street_name: row.to_value("street_name").unwrap_or(None),
        city: row.to_value("city").unwrap_or(None),
        district: row.to_value("district").unwrap_or(None),
        state_code: row.to_value("state_code").unwrap_or(None),
        state_name: row.to_value("state_name").unwrap_or(None),
        country_code: row.to_value("country_code").unwrap_or(None),
        country_name: row.to_value("country_name").unwrap_or(None),
        postal_code: row.to_value("postal_code").unwrap_or(None),
        place_types,
        source_provider: row.to_value("source_provider").unwrap_or(None),
        confidence: row.to_value("confidence").unwrap_or(None),
        verified: row.to_value("verified").unwrap_or(false),
        created_at: utc(created_at),
        updated_at: utc(updated_at),
    })
}

/// Geohash for a new place: the supplied value, or one computed from the
/// coordinates.
fn effective_geohash(place: &NewPlace) -> String {
    place.geohash.clone().unwrap_or_else(|| {
        geotag_spatial::geohash(
            place.latitude,
            place.longitude,
            geotag_spatial::GEOHASH_MAX_PRECISION,
        )
    })
}

fn push_place_values(params: &mut Vec<DatabaseValue>, id: &Uuid, place: &NewPlace) -> Result<(), PlacesError> {
    if !(-90.0..=90.0).contains(&place.latitude) || !(-180.0..=180.0).contains(&place.longitude) {
        return Err(PlacesError::Conversion {
            message: format!(
                "Coordinates out of range: ({}, {})",
                place.latitude, place.longitude
            ),
        });
    }

    params.push(DatabaseValue::String(id.to_string()));
    params.push(opt_string(place.external_place_id.as_deref()));
    params.push(DatabaseValue::String(place.formatted_address.clone()));
    params.push(DatabaseValue::Real64(place.latitude));
    params.push(DatabaseValue::Real64(place.longitude));
    params.push(DatabaseValue::String(effective_geohash(place)));
    params.push(opt_string(place.street_number.as_deref()));
    params.push(opt_string(place.street_name.as_deref()));
    params.push(opt_string(place.city.as_deref()));
    params.push(opt_string(place.district.as_deref()));
    params.push(opt_string(place.state_code.as_deref()));
    params.push(opt_string(place.state_name.as_deref()));
    params.push(opt_string(place.country_code.as_deref()));
    params.push(opt_string(place.country_name.as_deref()));
    params.push(opt_string(place.postal_code.as_deref()));
    params.push(DatabaseValue::String(serde_json::to_string(
        &place.place_types,
    )?));
    params.push(opt_string(place.source_provider.as_deref()));
    params.push(
        place
            .confidence
            .map_or(DatabaseValue::Null, DatabaseValue::Real64),
    );
    Ok(())
}

const PLACE_INSERT_COLUMNS: &str = "id, external_place_id, formatted_address, latitude, longitude,
    geohash, street_number, street_name, city, district,
    state_code, state_name, country_code, country_name, postal_code,
    place_types, source_provider, confidence";

const PLACE_VALUES_WIDTH: usize = 18;

const PLACE_CONFLICT_CLAUSE: &str = "ON CONFLICT (external_place_id)
    WHERE external_place_id IS NOT NULL
    DO UPDATE SET
        formatted_address = EXCLUDED.formatted_address,
        latitude = EXCLUDED.latitude,
        longitude = EXCLUDED.longitude,
        geohash = EXCLUDED.geohash,
        street_number = EXCLUDED.street_number,
        street_name = EXCLUDED.street_name,
        city = EXCLUDED.city,
        district = EXCLUDED.district,
        state_code = EXCLUDED.state_code,
        state_name = EXCLUDED.state_name,
        country_code = EXCLUDED.country_code,
        country_name = EXCLUDED.country_name,
        postal_code = EXCLUDED.postal_code,
        place_types = EXCLUDED.place_types,
        source_provider = EXCLUDED.source_provider,
        confidence = EXCLUDED.confidence,
        updated_at = CURRENT_TIMESTAMP";

/// Inserts a single place, updating the existing row when its
/// `external_place_id` already exists, and returns the stored row.
///
/// # Errors
///
/// Returns [`PlacesError`] if the database operation fails.
pub async fn create_place(db: &dyn Database, place: &NewPlace) -> Result<Place, PlacesError> {
    let id = Uuid::new_v4();

    let mut params = Vec::with_capacity(PLACE_VALUES_WIDTH);
    push_place_values(&mut params, &id, place)?;

    let placeholders: Vec<String> = (1..=PLACE_VALUES_WIDTH).map(|i| format!("${i}")).collect();
    let sql = format!(
        "INSERT INTO places ({PLACE_INSERT_COLUMNS})
         VALUES ({})
         {PLACE_CONFLICT_CLAUSE}
         RETURNING {PLACE_COLUMNS}",
        placeholders.join(", ")
    );

    let rows = db.query_raw_params(&sql, &params).await?;
    let row = rows.first().ok_or_else(|| PlacesError::Conversion {
        message: "Upsert returned no row".to_string(),
    })?;

    parse_place_row(row)
}

/// Deduplicates a chunk by `external_place_id` (last write wins), so a
/// single statement never updates the same row twice.
fn dedupe_chunk(chunk: &[NewPlace]) -> Vec<&NewPlace> {
    let mut kept: Vec<&NewPlace> = Vec::with_capacity(chunk.len());
    for place in chunk {
        if let Some(external_id) = &place.external_place_id {
            kept.retain(|existing| existing.external_place_id.as_ref() != Some(external_id));
        }
        kept.push(place);
    }
    kept
}

/// Bulk-upserts places in batches of [`UPSERT_BATCH_SIZE`] rows, and
/// returns the number of affected rows.
///
/// # Errors
///
/// Returns [`PlacesError`] if any database operation fails.
pub async fn upsert_places(db: &dyn Database, places: &[NewPlace]) -> Result<u64, PlacesError> {
    let mut affected = 0u64;

    for chunk in places.chunks(UPSERT_BATCH_SIZE) {
        let deduped = dedupe_chunk(chunk);

        let mut sql = format!("INSERT INTO places ({PLACE_INSERT_COLUMNS}) VALUES ");
        let mut params: Vec<DatabaseValue> =
            Vec::with_capacity(deduped.len() * PLACE_VALUES_WIDTH);

        for (row_idx, place) in deduped.into_iter().enumerate() {
            if row_idx > 0 {
                sql.push_str(", ");
            }
            sql.push('(');
            for col_idx in 0..PLACE_VALUES_WIDTH {
                if col_idx > 0 {
                    sql.push_str(", ");
                }
                write!(sql, "${}", row_idx * PLACE_VALUES_WIDTH + col_idx + 1).unwrap();
            }
            sql.push(')');

            push_place_values(&mut params, &Uuid::new_v4(), place)?;
        }

        sql.push(' ');
        sql.push_str(PLACE_CONFLICT_CLAUSE);

        affected += db.exec_raw_params(&sql, &params).await?;
    }

    Ok(affected)
}

/// Fetches a live place by id.
///
/// # Errors
///
/// Returns [`PlacesError::NotFound`] if no live row matches, or
/// [`PlacesError`] if the query fails.
pub async fn get_place(db: &dyn Database, id: Uuid) -> Result<Place, PlacesError> {
    let sql = format!(
        "SELECT {PLACE_COLUMNS} FROM places WHERE id = $1 AND deleted_at IS NULL"
    );
    let rows = db
        .query_raw_params(&sql, &[DatabaseValue::String(id.to_string())])
        .await?;

    rows.first().map(parse_place_row).transpose()?.ok_or(PlacesError::NotFound)
}

/// Fetches a live place by provider identifier, or `None`.
///
/// # Errors
///
/// Returns [`PlacesError`] if the query fails.
pub async fn get_place_by_external_id(
    db: &dyn Database,
    external_place_id: &str,
) -> Result<Option<Place>, PlacesError> {
    let sql = format!(
        "SELECT {PLACE_COLUMNS} FROM places
         WHERE external_place_id = $1 AND deleted_at IS NULL"
    );
    let rows = db
        .query_raw_params(&sql, &[DatabaseValue::String(external_place_id.to_string())])
        .await?;

    rows.first().map(parse_place_row).transpose()
}

/// Finds live places within `radius_km` of a point, ordered ascending
/// by distance.
///
/// Two-phase: a bounding-box prefilter in SQL, then exact haversine
/// refinement that drops the rectangle corners. The radius is capped at
/// [`MAX_NEARBY_RADIUS_KM`]; `limit` defaults to [`DEFAULT_LIMIT`] and
/// is capped at [`MAX_LIMIT`].
///
/// # Errors
///
/// Returns [`PlacesError`] if the query fails.
pub async fn find_nearby(
    db: &dyn Database,
    latitude: f64,
    longitude: f64,
    radius_km: f64,
    limit: Option<u32>,
) -> Result<Vec<NearbyPlace>, PlacesError> {
    let radius_km = radius_km.min(MAX_NEARBY_RADIUS_KM);
    let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as usize;

    let bbox = geotag_spatial::BoundingBox::around(latitude, longitude, radius_km);

    let sql = format!(
        "SELECT {PLACE_COLUMNS} FROM places
         WHERE deleted_at IS NULL
           AND latitude BETWEEN $1 AND $2
           AND longitude BETWEEN $3 AND $4"
    );
    let rows = db
        .query_raw_params(
            &sql,
            &[
                DatabaseValue::Real64(bbox.south),
                DatabaseValue::Real64(bbox.north),
                DatabaseValue::Real64(bbox.west),
                DatabaseValue::Real64(bbox.east),
            ],
        )
        .await?;

    let mut nearby = Vec::with_capacity(rows.len());
    for row in &rows {
        let place = parse_place_row(row)?;
        let distance_km =
            geotag_spatial::haversine_km(latitude, longitude, place.latitude, place.longitude);
        if distance_km <= radius_km {
            nearby.push(NearbyPlace { place, distance_km });
        }
    }

    nearby.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    nearby.truncate(limit);

    Ok(nearby)
}

/// Full-text search over live places with optional filters.
///
/// Returns the page of matches and the total match count. Ordered by
/// relevance rank when the query is non-empty, by `created_at DESC`
/// otherwise.
///
/// # Errors
///
/// Returns [`PlacesError`] if a query fails.
#[allow(clippy::too_many_lines)]
pub async fn search_places(
    db: &dyn Database,
    filter: &PlaceSearchFilter,
) -> Result<(Vec<Place>, i64), PlacesError> {
    let limit = filter.limit.clamp(1, MAX_LIMIT);
    let offset = filter.offset;

    let sanitized = filter
        .query
        .as_deref()
        .map(sanitize_query)
        .filter(|query| !query.is_empty());

    let mut clauses = String::new();
    let mut params: Vec<DatabaseValue> = Vec::new();
    let mut param_idx = 1u32;
    let mut query_param_idx = None;

    if let Some(query) = &sanitized {
        write!(
            clauses,
            " AND search_vector @@ plainto_tsquery('simple', ${param_idx})"
        )
        .unwrap();
        params.push(DatabaseValue::String(query.clone()));
        query_param_idx = Some(param_idx);
        param_idx += 1;
    }

    if let Some(country) = &filter.country_code {
        write!(clauses, " AND country_code = ${param_idx}").unwrap();
        params.push(DatabaseValue::String(country.to_uppercase()));
        param_idx += 1;
    }

    if let Some(city) = &filter.city {
        write!(clauses, " AND LOWER(city) = LOWER(${param_idx})").unwrap();
        params.push(DatabaseValue::String(city.clone()));
        param_idx += 1;
    }

    if let Some(state) = &filter.state_code {
        write!(clauses, " AND state_code = ${param_idx}").unwrap();
        params.push(DatabaseValue::String(state.to_uppercase()));
        param_idx += 1;
    }

    if let Some(postal) = &filter.postal_code {
        write!(clauses, " AND postal_code = ${param_idx}").unwrap();
        params.push(DatabaseValue::String(postal.clone()));
        param_idx += 1;
    }

    if let Some(verified) = filter.verified {
        write!(clauses, " AND verified = ${param_idx}").unwrap();
        params.push(DatabaseValue::Bool(verified));
        param_idx += 1;
    }

    let count_sql = format!(
        "SELECT COUNT(*) as cnt FROM places WHERE deleted_at IS NULL{clauses}"
    );
    let count_rows = db.query_raw_params(&count_sql, &params).await?;
    let total: i64 = count_rows
        .first()
        .and_then(|row| row.to_value("cnt").ok())
        .unwrap_or(0);

    let order = query_param_idx.map_or_else(
        || "created_at DESC".to_string(),
        |idx| format!("ts_rank(search_vector, plainto_tsquery('simple', ${idx})) DESC, created_at DESC"),
    );

    let mut sql = format!(
        "SELECT {PLACE_COLUMNS} FROM places
         WHERE deleted_at IS NULL{clauses}
         ORDER BY {order}"
    );

    write!(sql, " LIMIT ${param_idx}").unwrap();
    params.push(DatabaseValue::Int64(i64::from(limit)));
    param_idx += 1;

    write!(sql, " OFFSET ${param_idx}").unwrap();
    params.push(DatabaseValue::Int64(i64::from(offset)));

    let rows = db.query_raw_params(&sql, &params).await?;

    let mut places = Vec::with_capacity(rows.len());
    for row in &rows {
        places.push(parse_place_row(row)?);
    }

    Ok((places, total))
}

/// Flips the human-asserted quality flag and returns the updated place.
///
/// # Errors
///
/// Returns [`PlacesError::NotFound`] if no live row matches, or
/// [`PlacesError`] if the update fails.
pub async fn set_verified(
    db: &dyn Database,
    id: Uuid,
    verified: bool,
) -> Result<Place, PlacesError> {
    let sql = format!(
        "UPDATE places SET verified = $2, updated_at = CURRENT_TIMESTAMP
         WHERE id = $1 AND deleted_at IS NULL
         RETURNING {PLACE_COLUMNS}"
    );
    let rows = db
        .query_raw_params(
            &sql,
            &[
                DatabaseValue::String(id.to_string()),
                DatabaseValue::Bool(verified),
            ],
        )
        .await?;

    rows.first().map(parse_place_row).transpose()?.ok_or(PlacesError::NotFound)
}

/// Soft-deletes a place. Never physical-deletes.
///
/// # Errors
///
/// Returns [`PlacesError::NotFound`] if no live row matches, or
/// [`PlacesError`] if the update fails.
pub async fn soft_delete_place(db: &dyn Database, id: Uuid) -> Result<(), PlacesError> {
    let affected = db
        .exec_raw_params(
            "UPDATE places SET deleted_at = CURRENT_TIMESTAMP
             WHERE id = $1 AND deleted_at IS NULL",
            &[DatabaseValue::String(id.to_string())],
        )
        .await?;

    if affected == 0 {
        return Err(PlacesError::NotFound);
    }

    Ok(())
}

/// Aggregate counters for the stats endpoint: totals, top-20 countries,
/// and per-provider counts over live places.
///
/// # Errors
///
/// Returns [`PlacesError`] if a query fails.
pub async fn place_stats(db: &dyn Database) -> Result<PlaceStats, PlacesError> {
    let rows = db
        .query_raw_params(
            "SELECT COUNT(*) as total,
                    COUNT(*) FILTER (WHERE verified) as verified
             FROM places WHERE deleted_at IS NULL",
            &[],
        )
        .await?;

    let (total, verified) = rows.first().map_or((0, 0), |row| {
        (
            row.to_value("total").unwrap_or(0),
            row.to_value("verified").unwrap_or(0),
        )
    });

    let rows = db
        .query_raw_params(
            "SELECT country_code, COUNT(*) as cnt
             FROM places
             WHERE deleted_at IS NULL AND country_code IS NOT NULL
             GROUP BY country_code
             ORDER BY cnt DESC
             LIMIT 20",
            &[],
        )
        .await?;

    let countries = rows
        .iter()
        .map(|row| CountryCount {
            country_code: row.to_value("country_code").unwrap_or_default(),
            count: row.to_value("cnt").unwrap_or(0),
        })
        .collect();

    let rows = db
        .query_raw_params(
            "SELECT source_provider, COUNT(*) as cnt
             FROM places
             WHERE deleted_at IS NULL AND source_provider IS NOT NULL
             GROUP BY source_provider
             ORDER BY cnt DESC",
            &[],
        )
        .await?;

    let providers = rows
        .iter()
        .map(|row| ProviderCount {
            provider: row.to_value("source_provider").unwrap_or_default(),
            count: row.to_value("cnt").unwrap_or(0),
        })
        .collect();

    Ok(PlaceStats {
        total,
        verified,
        countries,
        providers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_operator_characters() {
        assert_eq!(
            sanitize_query("main & street | (sydney)"),
            "main street sydney"
        );
        assert_eq!(sanitize_query("it's \"quoted\":here!"), "it s quoted here");
    }

    #[test]
    fn sanitize_collapses_whitespace() {
        assert_eq!(sanitize_query("  main    street  "), "main street");
        assert_eq!(sanitize_query("&|!"), "");
    }

    #[test]
    fn dedupe_keeps_last_write_per_external_id() {
        let a = NewPlace {
            external_place_id: Some("osm:node:1".to_string()),
            formatted_address: "first".to_string(),
            ..NewPlace::default()
        };
        let b = NewPlace {
            external_place_id: Some("osm:node:1".to_string()),
            formatted_address: "second".to_string(),
            ..NewPlace::default()
        };
        let c = NewPlace {
            external_place_id: None,
            formatted_address: "keyless".to_string(),
            ..NewPlace::default()
        };

        let items = [a, b, c];
        let deduped = dedupe_chunk(&items);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].formatted_address, "second");
        assert_eq!(deduped[1].formatted_address, "keyless");
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        let place = NewPlace {
            latitude: 91.0,
            longitude: 0.0,
            ..NewPlace::default()
        };
        let mut params = Vec::new();
        let result = push_place_values(&mut params, &Uuid::new_v4(), &place);
        assert!(matches!(result, Err(PlacesError::Conversion { .. })));
    }

    #[test]
    fn effective_geohash_computes_when_missing() {
        let place = NewPlace {
            latitude: 57.64911,
            longitude: 10.40744,
            ..NewPlace::default()
        };
        assert!(effective_geohash(&place).starts_with("u4pruy"));

        let place = NewPlace {
            geohash: Some("abc".to_string()),
            ..NewPlace::default()
        };
        assert_eq!(effective_geohash(&place), "abc");
    }
}
