//! Address cache repository.
//!
//! One row per fingerprint, keyed by `(cache_type, key_hash)` with a
//! unique index. Result columns are denormalized so hits can be
//! reconstructed without touching `response_json` (except autocomplete,
//! which caches a list). Expired rows are removed in batches by the
//! eviction worker; a batched delete is safe to race against concurrent
//! upserts.

use chrono::NaiveDateTime;
use moosicbox_json_utils::database::ToValue as _;
use strum_macros::{AsRefStr, Display, EnumString};
use switchy_database::{Database, DatabaseValue, Row};

use crate::DbError;

/// Which operation a cache row belongs to. Differentiates semantics of
/// otherwise similar keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum CacheType {
    /// Forward geocoding (address to coordinates).
    Geocode,
    /// Reverse geocoding (coordinates to address).
    Reverse,
    /// Autocomplete suggestion lists.
    Autocomplete,
    /// Provider place lookups.
    PlaceDetails,
}

impl CacheType {
    /// All cache types, in stats display order.
    pub const ALL: [Self; 4] = [
        Self::Geocode,
        Self::Reverse,
        Self::Autocomplete,
        Self::PlaceDetails,
    ];
}

/// A cache row as stored.
#[derive(Debug, Clone)]
pub struct AddressCacheRow {
    /// Monotonic row id.
    pub id: i64,
    /// Which operation produced this row.
    pub cache_type: CacheType,
    /// Pre-hash canonical key, kept for diagnostics.
    pub cache_key: String,
    /// SHA-256 hex of `cache_key`; the indexed lookup column.
    pub key_hash: String,
    /// Denormalized result columns.
    pub formatted_address: Option<String>,
    /// Latitude of the cached result.
    pub latitude: Option<f64>,
    /// Longitude of the cached result.
    pub longitude: Option<f64>,
    /// Building number.
    pub street_number: Option<String>,
    /// Street name.
    pub street_name: Option<String>,
    /// City.
    pub city: Option<String>,
    /// District / neighborhood.
    pub district: Option<String>,
    /// State code.
    pub state_code: Option<String>,
    /// State long name.
    pub state_name: Option<String>,
    /// ISO country code.
    pub country_code: Option<String>,
    /// Country long name.
    pub country_name: Option<String>,
    /// Postal code.
    pub postal_code: Option<String>,
    /// Provider place identifier.
    pub external_place_id: Option<String>,
    /// Full structured response; required for autocomplete.
    pub response_json: Option<String>,
    /// Which adapter produced the result.
    pub provider: Option<String>,
    /// Number of cache hits served from this row (advisory).
    pub hit_count: i64,
    /// Absolute expiry timestamp.
    pub expires_at: NaiveDateTime,
    /// Insert timestamp.
    pub created_at: NaiveDateTime,
    /// Last upsert or hit-bump timestamp.
    pub updated_at: NaiveDateTime,
}

/// Fields for inserting or overwriting a cache row.
#[derive(Debug, Clone)]
pub struct NewCacheEntry {
    /// Which operation produced this entry.
    pub cache_type: CacheType,
    /// Pre-hash canonical key.
    pub cache_key: String,
    /// SHA-256 hex of `cache_key`.
    pub key_hash: String,
    /// Denormalized result columns.
    pub formatted_address: Option<String>,
    /// Latitude of the result.
    pub latitude: Option<f64>,
    /// Longitude of the result.
    pub longitude: Option<f64>,
    /// Building number.
    pub street_number: Option<String>,
    /// Street name.
    pub street_name: Option<String>,
    /// City.
    pub city: Option<String>,
    /// District / neighborhood.
    pub district: Option<String>,
    /// State code.
    pub state_code: Option<String>,
    /// State long name.
    pub state_name: Option<String>,
    /// ISO country code.
    pub country_code: Option<String>,
    /// Country long name.
    pub country_name: Option<String>,
    /// Postal code.
    pub postal_code: Option<String>,
    /// Provider place identifier.
    pub external_place_id: Option<String>,
    /// Full structured response.
    pub response_json: Option<String>,
    /// Which adapter produced the result.
    pub provider: Option<String>,
    /// Absolute expiry timestamp.
    pub expires_at: NaiveDateTime,
}

const CACHE_COLUMNS: &str = "id, cache_type, cache_key, key_hash, formatted_address,
    latitude, longitude, street_number, street_name, city, district,
    state_code, state_name, country_code, country_name, postal_code,
    external_place_id, response_json, provider, hit_count,
    expires_at, created_at, updated_at";

fn opt_string(value: &Option<String>) -> DatabaseValue {
    value
        .as_ref()
        .map_or(DatabaseValue::Null, |s| DatabaseValue::String(s.clone()))
}

fn opt_real(value: Option<f64>) -> DatabaseValue {
    value.map_or(DatabaseValue::Null, DatabaseValue::Real64)
}

fn parse_row(row: &Row) -> Result<AddressCacheRow, DbError> {
    let conversion = |message: String| DbError::Conversion { message };

    let cache_type_raw: String = row
        .to_value("cache_type")
        .map_err(|e| conversion(format!("Failed to parse cache_type: {e}")))?;
    let cache_type = cache_type_raw
        .parse::<CacheType>()
        .map_err(|e| conversion(format!("Unknown cache_type '{cache_type_raw}': {e:?}")))?;

    Ok(AddressCacheRow {
        id: row
            .to_value("id")
            .map_err(|e| conversion(format!("Failed to parse cache id: {e}")))?,
        cache_type,
        cache_key: row.to_value("cache_key").unwrap_or_default(),
        key_hash: row
            .to_value("key_hash")
            .map_err(|e| conversion(format!("Failed to parse key_hash: {e}")))?,
        formatted_address: row.to_value("formatted_address").unwrap_or(None),
        latitude: row.to_value("latitude").unwrap_or(None),
        longitude: row.to_value("longitude").unwrap_or(None),
        street_number: row.to_value("street_number").unwrap_or(None),
        street_name: row.to_value("street_name").unwrap_or(None),
        city: row.to_value("city").unwrap_or(None),
        district: row.to_value("district").unwrap_or(None),
        state_code: row.to_value("state_code").unwrap_or(None),
        state_name: row.to_value("state_name").unwrap_or(None),
        country_code: row.to_value("country_code").unwrap_or(None),
        country_name: row.to_value("country_name").unwrap_or(None),
        postal_code: row.to_value("postal_code").unwrap_or(None),
        external_place_id: row.to_value("external_place_id").unwrap_or(None),
        response_json: row.to_value("response_json").unwrap_or(None),
        provider: row.to_value("provider").unwrap_or(None),
        hit_count: row.to_value("hit_count").unwrap_or(0),
        expires_at: row
            .to_value("expires_at")
            .map_err(|e| conversion(format!("Failed to parse expires_at: {e}")))?,
        created_at: row.to_value("created_at").unwrap_or_default(),
        updated_at: row.to_value("updated_at").unwrap_or_default(),
    })
}

/// Looks up a live (unexpired) cache row by `(cache_type, key_hash)`.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub async fn lookup(
    db: &dyn Database,
    cache_type: CacheType,
    key_hash: &str,
    now: NaiveDateTime,
) -> Result<Option<AddressCacheRow>, DbError> {
    let sql = format!(
        "SELECT {CACHE_COLUMNS} FROM address_cache
         WHERE cache_type = $1 AND key_hash = $2 AND expires_at > $3"
    );

    let rows = db
        .query_raw_params(
            &sql,
            &[
                DatabaseValue::String(cache_type.to_string()),
                DatabaseValue::String(key_hash.to_string()),
                DatabaseValue::DateTime(now),
            ],
        )
        .await?;

    rows.first().map(parse_row).transpose()
}

/// Inserts a cache entry, overwriting any existing row for the same
/// `(cache_type, key_hash)`. The last writer wins; `hit_count` and
/// `created_at` survive the overwrite.
///
/// # Errors
///
/// Returns [`DbError`] if the upsert fails.
pub async fn upsert(db: &dyn Database, entry: &NewCacheEntry) -> Result<(), DbError> {
    db.exec_raw_params(
        "INSERT INTO address_cache (
            cache_type, cache_key, key_hash, formatted_address,
            latitude, longitude, street_number, street_name, city,
            district, state_code, state_name, country_code, country_name,
            postal_code, external_place_id, response_json, provider, expires_at
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
            $11, $12, $13, $14, $15, $16, $17, $18, $19
        )
        ON CONFLICT (cache_type, key_hash) DO UPDATE SET
            cache_key = EXCLUDED.cache_key,
            formatted_address = EXCLUDED.formatted_address,
            latitude = EXCLUDED.latitude,
            longitude = EXCLUDED.longitude,
            street_number = EXCLUDED.street_number,
            street_name = EXCLUDED.street_name,
            city = EXCLUDED.city,
            district = EXCLUDED.district,
            state_code = EXCLUDED.state_code,
            state_name = EXCLUDED.state_name,
            country_code = EXCLUDED.country_code,
            country_name = EXCLUDED.country_name,
            postal_code = EXCLUDED.postal_code,
            external_place_id = EXCLUDED.external_place_id,
            response_json = EXCLUDED.response_json,
            provider = EXCLUDED.provider,
            expires_at = EXCLUDED.expires_at,
            updated_at = CURRENT_TIMESTAMP",
        &[
            DatabaseValue::String(entry.cache_type.to_string()),
            DatabaseValue::String(entry.cache_key.clone()),
            DatabaseValue::String(entry.key_hash.clone()),
            opt_string(&entry.formatted_address),
            opt_real(entry.latitude),
            opt_real(entry.longitude),
            opt_string(&entry.street_number),
            opt_string(&entry.street_name),
            opt_string(&entry.city),
            opt_string(&entry.district),
            opt_string(&entry.state_code),
            opt_string(&entry.state_name),
            opt_string(&entry.country_code),
            opt_string(&entry.country_name),
            opt_string(&entry.postal_code),
            opt_string(&entry.external_place_id),
            opt_string(&entry.response_json),
            opt_string(&entry.provider),
            DatabaseValue::DateTime(entry.expires_at),
        ],
    )
    .await?;

    Ok(())
}

/// Increments a row's hit counter.
///
/// Not serialized with respect to concurrent re-inserts; exact hit
/// counts are advisory.
///
/// # Errors
///
/// Returns [`DbError`] if the update fails.
pub async fn increment_hit_count(db: &dyn Database, id: i64) -> Result<(), DbError> {
    db.exec_raw_params(
        "UPDATE address_cache
         SET hit_count = hit_count + 1, updated_at = CURRENT_TIMESTAMP
         WHERE id = $1",
        &[DatabaseValue::Int64(id)],
    )
    .await?;

    Ok(())
}

/// Deletes up to `batch_size` expired rows and returns the deleted
/// count.
///
/// # Errors
///
/// Returns [`DbError`] if the delete fails.
pub async fn delete_expired(
    db: &dyn Database,
    now: NaiveDateTime,
    batch_size: u32,
) -> Result<u64, DbError> {
    let sql = format!(
        "DELETE FROM address_cache WHERE id IN (
            SELECT id FROM address_cache WHERE expires_at < $1 LIMIT {batch_size}
        )"
    );

    let deleted = db
        .exec_raw_params(&sql, &[DatabaseValue::DateTime(now)])
        .await?;

    Ok(deleted)
}

/// Row counts for the cache table: `(total, expired, per-type counts)`.
pub type CacheTableStats = (i64, i64, Vec<(String, i64)>);

/// Returns row counts for the cache stats endpoint.
///
/// # Errors
///
/// Returns [`DbError`] if a query fails.
pub async fn table_stats(db: &dyn Database, now: NaiveDateTime) -> Result<CacheTableStats, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT COUNT(*) as total,
                    COUNT(*) FILTER (WHERE expires_at < $1) as expired
             FROM address_cache",
            &[DatabaseValue::DateTime(now)],
        )
        .await?;

    let (total, expired) = rows.first().map_or((0, 0), |row| {
        (
            row.to_value("total").unwrap_or(0),
            row.to_value("expired").unwrap_or(0),
        )
    });

    let rows = db
        .query_raw_params(
            "SELECT cache_type, COUNT(*) as cnt
             FROM address_cache
             GROUP BY cache_type
             ORDER BY cache_type",
            &[],
        )
        .await?;

    let by_type = rows
        .iter()
        .map(|row| {
            (
                row.to_value("cache_type").unwrap_or_default(),
                row.to_value("cnt").unwrap_or(0),
            )
        })
        .collect();

    Ok((total, expired, by_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_type_round_trips_through_strings() {
        for cache_type in CacheType::ALL {
            let parsed = cache_type.to_string().parse::<CacheType>().unwrap();
            assert_eq!(parsed, cache_type);
        }
    }

    #[test]
    fn cache_type_uses_snake_case() {
        assert_eq!(CacheType::Geocode.to_string(), "geocode");
        assert_eq!(CacheType::PlaceDetails.to_string(), "place_details");
        assert_eq!("reverse".parse::<CacheType>().unwrap(), CacheType::Reverse);
    }
}
