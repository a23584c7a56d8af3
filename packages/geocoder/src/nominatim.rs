//! Nominatim / OpenStreetMap geocoder adapter.
//!
//! Free, but the public instance is rate-limited to **1 request per
//! second** and requires a descriptive `User-Agent`. The chain does not
//! enforce the rate limit; operators pointing at the public endpoint do
//! so at their own risk.
//!
//! Place identifiers are emitted as `"osm:{type}:{id}"` and resolved via
//! the `/lookup` endpoint.
//!
//! See <https://nominatim.org/release-docs/develop/api/Search/>

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    AutocompleteOptions, GeocodeError, GeocodingProvider, GeocodingResult, HTTP_TIMEOUT,
    Suggestion, ValidationResult, check_status, normalize,
};

/// Default public Nominatim endpoint.
pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";

/// One shared descriptive agent per process, per the Nominatim usage
/// policy.
const USER_AGENT: &str = concat!(
    "geotag/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/Tesseract-Nexus/geotag)"
);

/// Nominatim / `OpenStreetMap` provider.
pub struct NominatimProvider {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimProvider {
    /// Creates a provider against the given endpoint, or the public
    /// instance when `base_url` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: Option<String>) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    async fn search(
        &self,
        query: &str,
        limit: &str,
        country_codes: &[String],
    ) -> Result<Vec<Value>, GeocodeError> {
        let url = format!("{}/search", self.base_url);
        let mut params = vec![
            ("q", query.to_string()),
            ("format", "jsonv2".to_string()),
            ("addressdetails", "1".to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(first) = country_codes.first() {
            params.push(("countrycodes", first.clone()));
        }

        let resp = self.client.get(&url).query(&params).send().await?;
        check_status("nominatim", resp.status())?;

        let body: Value = resp.json().await?;
        body.as_array().cloned().ok_or_else(|| GeocodeError::Parse {
            message: "Nominatim response is not an array".to_string(),
        })
    }
}

/// Parses one Nominatim result object into the canonical schema.
fn parse_result(entry: &Value) -> Result<GeocodingResult, GeocodeError> {
    let latitude = entry["lat"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| entry["lat"].as_f64())
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing lat in Nominatim response".to_string(),
        })?;

    let longitude = entry["lon"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| entry["lon"].as_f64())
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing lon in Nominatim response".to_string(),
        })?;

    let mut result = GeocodingResult {
        formatted_address: entry["display_name"].as_str().unwrap_or_default().to_string(),
        latitude,
        longitude,
        place_id: place_id(entry),
        place_types: entry["type"]
            .as_str()
            .map(|t| vec![t.to_string()])
            .unwrap_or_default(),
        confidence: entry["importance"].as_f64().map(|v| v.clamp(0.0, 1.0)),
        provider: "openstreetmap".to_string(),
        ..GeocodingResult::default()
    };

    if entry["address"].is_object() {
        normalize::apply_nominatim_address(&mut result, &entry["address"]);
    }

    Ok(result)
}

/// Builds the `"osm:{type}:{id}"` identifier from a result object.
fn place_id(entry: &Value) -> Option<String> {
    let osm_type = entry["osm_type"].as_str()?;
    let osm_id = entry["osm_id"].as_i64()?;
    Some(format!("osm:{osm_type}:{osm_id}"))
}

/// Maps an `"osm:{type}:{id}"` identifier to the `N123` / `W123` / `R123`
/// form accepted by `/lookup`.
fn lookup_id(place_id: &str) -> Option<String> {
    let rest = place_id.strip_prefix("osm:")?;
    let (osm_type, osm_id) = rest.split_once(':')?;
    let prefix = match osm_type {
        "node" => 'N',
        "way" => 'W',
        "relation" => 'R',
        _ => return None,
    };
    osm_id.parse::<i64>().ok()?;
    Some(format!("{prefix}{osm_id}"))
}

#[async_trait]
impl GeocodingProvider for NominatimProvider {
    fn name(&self) -> &str {
        "openstreetmap"
    }

    async fn geocode(&self, address: &str) -> Result<Option<GeocodingResult>, GeocodeError> {
        let results = self.search(address, "1", &[]).await?;
        results.first().map(parse_result).transpose()
    }

    async fn reverse_geocode(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<GeocodingResult>, GeocodeError> {
        let url = format!("{}/reverse", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("format", "jsonv2".to_string()),
                ("addressdetails", "1".to_string()),
            ])
            .send()
            .await?;
        check_status("nominatim", resp.status())?;

        let body: Value = resp.json().await?;

        // Nominatim reports "unable to geocode" as an error key with a
        // 200 status.
        if body["error"].is_string() {
            return Ok(None);
        }

        parse_result(&body).map(Some)
    }

    async fn autocomplete(
        &self,
        input: &str,
        options: &AutocompleteOptions,
    ) -> Result<Vec<Suggestion>, GeocodeError> {
        let results = self.search(input, "5", &options.country_codes()).await?;

        Ok(results
            .iter()
            .filter_map(|entry| {
                let description = entry["display_name"].as_str()?;
                Some(Suggestion {
                    description: description.to_string(),
                    place_id: place_id(entry),
                    place_types: entry["type"]
                        .as_str()
                        .map(|t| vec![t.to_string()])
                        .unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn place_details(
        &self,
        place_id: &str,
    ) -> Result<Option<GeocodingResult>, GeocodeError> {
        let Some(osm_id) = lookup_id(place_id) else {
            return Err(GeocodeError::Parse {
                message: format!("Not an OSM place id: {place_id}"),
            });
        };

        let url = format!("{}/lookup", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("osm_ids", osm_id.as_str()),
                ("format", "jsonv2"),
                ("addressdetails", "1"),
            ])
            .send()
            .await?;
        check_status("nominatim", resp.status())?;

        let body: Value = resp.json().await?;
        let results = body.as_array().ok_or_else(|| GeocodeError::Parse {
            message: "Nominatim lookup response is not an array".to_string(),
        })?;

        results.first().map(parse_result).transpose()
    }

    async fn validate_address(&self, address: &str) -> Result<ValidationResult, GeocodeError> {
        let Some(result) = self.geocode(address).await? else {
            return Ok(ValidationResult {
                valid: false,
                normalized: None,
                issues: vec!["Address not found".to_string()],
            });
        };

        let issues = normalize::validation_issues(&result);
        Ok(ValidationResult {
            valid: issues.is_empty(),
            normalized: Some(result),
            issues,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_entry() -> Value {
        json!({
            "osm_type": "node",
            "osm_id": 123_456,
            "lat": "-33.8688",
            "lon": "151.2093",
            "display_name": "123, Main Street, Sydney, NSW, Australia",
            "type": "house",
            "importance": 0.62,
            "address": {
                "house_number": "123",
                "road": "Main Street",
                "city": "Sydney",
                "state": "New South Wales",
                "ISO3166-2-lvl4": "AU-NSW",
                "country": "Australia",
                "country_code": "au",
                "postcode": "2000"
            }
        })
    }

    #[test]
    fn parses_full_result() {
        let result = parse_result(&sample_entry()).unwrap();
        assert!((result.latitude - -33.8688).abs() < 1e-9);
        assert!((result.longitude - 151.2093).abs() < 1e-9);
        assert_eq!(result.place_id.as_deref(), Some("osm:node:123456"));
        assert_eq!(result.country_code.as_deref(), Some("AU"));
        assert_eq!(result.state_code.as_deref(), Some("NSW"));
        assert_eq!(result.provider, "openstreetmap");
    }

    #[test]
    fn parse_fails_without_coordinates() {
        let entry = json!({"display_name": "nowhere"});
        assert!(parse_result(&entry).is_err());
    }

    #[test]
    fn lookup_id_mapping() {
        assert_eq!(lookup_id("osm:node:123").as_deref(), Some("N123"));
        assert_eq!(lookup_id("osm:way:9").as_deref(), Some("W9"));
        assert_eq!(lookup_id("osm:relation:7").as_deref(), Some("R7"));
        assert_eq!(lookup_id("osm:junk:7"), None);
        assert_eq!(lookup_id("liq:55"), None);
    }
}
