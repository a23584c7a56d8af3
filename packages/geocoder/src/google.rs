//! Google Geocoding / Places adapter.
//!
//! Responses carry a `status` discriminator: `OK` parses, `ZERO_RESULTS`
//! is a successful empty answer (returned as `None` — a terminal success
//! for the failover chain), anything else is an error.
//! `get_place_details` uses `/place/details/json` with a fixed `fields`
//! set to bound billing. Autocomplete session tokens pass through when
//! provided.
//!
//! See <https://developers.google.com/maps/documentation/geocoding>

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    AutocompleteOptions, GeocodeError, GeocodingProvider, GeocodingResult, HTTP_TIMEOUT,
    Suggestion, ValidationResult, check_status, normalize,
};

/// Default Google Maps API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api";

/// Fields requested from the place details endpoint.
const DETAILS_FIELDS: &str = "place_id,formatted_address,geometry,address_component,type";

/// Google provider.
pub struct GoogleProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoogleProvider {
    /// Creates a provider with the given API key.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: String, api_key: String) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    async fn get_json(
        &self,
        path: &str,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<Value, GeocodeError> {
        let url = format!("{}{path}", self.base_url);
        params.push(("key", self.api_key.clone()));

        let resp = self.client.get(&url).query(&params).send().await?;
        check_status("google", resp.status())?;

        Ok(resp.json().await?)
    }
}

/// Maps the vendor `status` field onto the error taxonomy.
///
/// Returns `Ok(false)` for `ZERO_RESULTS` (successful empty answer) and
/// `Ok(true)` for `OK`.
fn check_vendor_status(body: &Value) -> Result<bool, GeocodeError> {
    match body["status"].as_str().unwrap_or("") {
        "OK" => Ok(true),
        "ZERO_RESULTS" => Ok(false),
        "OVER_QUERY_LIMIT" => Err(GeocodeError::RateLimited),
        "REQUEST_DENIED" => Err(GeocodeError::InvalidCredentials),
        other => Err(GeocodeError::Provider {
            message: format!(
                "google returned status {other}: {}",
                body["error_message"].as_str().unwrap_or("no detail")
            ),
        }),
    }
}

/// Parses one geocoding result object into the canonical schema.
fn parse_result(entry: &Value) -> Result<GeocodingResult, GeocodeError> {
    let latitude = entry
        .pointer("/geometry/location/lat")
        .and_then(Value::as_f64)
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing geometry.location.lat in Google response".to_string(),
        })?;

    let longitude = entry
        .pointer("/geometry/location/lng")
        .and_then(Value::as_f64)
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing geometry.location.lng in Google response".to_string(),
        })?;

    let mut result = GeocodingResult {
        formatted_address: entry["formatted_address"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
        latitude,
        longitude,
        place_id: entry["place_id"].as_str().map(String::from),
        place_types: entry["types"]
            .as_array()
            .map(|types| {
                types
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
        confidence: None,
        provider: "google".to_string(),
        ..GeocodingResult::default()
    };

    if let Some(components) = entry["address_components"].as_array() {
        apply_components(&mut result, components);
    }

    Ok(result)
}

/// Fills the component fields from a Google `address_components` array.
///
/// Google's component types are the canonical set, so the mapping is
/// direct; only the locality fallback and code casing rules apply.
fn apply_components(result: &mut GeocodingResult, components: &[Value]) {
    for component in components {
        let Some(types) = component["types"].as_array() else {
            continue;
        };
        let has = |wanted: &str| types.iter().filter_map(Value::as_str).any(|t| t == wanted);

        let long_name = component["long_name"].as_str().map(String::from);
        let short_name = component["short_name"].as_str().map(String::from);

        if has("street_number") {
            result.street_number = long_name;
        } else if has("route") {
            result.street_name = long_name;
        } else if has("locality") {
            result.city = result.city.take().or(long_name);
        } else if has("postal_town") {
            // Some regions report the town only as postal_town.
            result.city = result.city.take().or(long_name);
        } else if has("sublocality") || has("neighborhood") {
            result.district = result.district.take().or(long_name);
        } else if has("administrative_area_level_1") {
            result.state_name.clone_from(&long_name);
            result.state_code =
                normalize::state_code_or_name(short_name.as_deref(), long_name.as_deref());
        } else if has("country") {
            result.country_name = long_name;
            result.country_code = normalize::country_code(short_name.as_deref());
        } else if has("postal_code") {
            result.postal_code = long_name;
        }
    }
}

#[async_trait]
impl GeocodingProvider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    async fn geocode(&self, address: &str) -> Result<Option<GeocodingResult>, GeocodeError> {
        let body = self
            .get_json("/geocode/json", vec![("address", address.to_string())])
            .await?;

        if !check_vendor_status(&body)? {
            return Ok(None);
        }

        let results = body["results"].as_array().ok_or_else(|| GeocodeError::Parse {
            message: "Google response missing 'results' array".to_string(),
        })?;
        results.first().map(parse_result).transpose()
    }

    async fn reverse_geocode(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<GeocodingResult>, GeocodeError> {
        let body = self
            .get_json(
                "/geocode/json",
                vec![("latlng", format!("{latitude},{longitude}"))],
            )
            .await?;

        if !check_vendor_status(&body)? {
            return Ok(None);
        }

        let results = body["results"].as_array().ok_or_else(|| GeocodeError::Parse {
            message: "Google response missing 'results' array".to_string(),
        })?;
        results.first().map(parse_result).transpose()
    }

    async fn autocomplete(
        &self,
        input: &str,
        options: &AutocompleteOptions,
    ) -> Result<Vec<Suggestion>, GeocodeError> {
        let mut params = vec![("input", input.to_string())];
        if let Some(components) = &options.components {
            params.push(("components", components.clone()));
        }
        if let Some(language) = &options.language {
            params.push(("language", language.clone()));
        }
        if !options.types.is_empty() {
            params.push(("types", options.types.join("|")));
        }
        if let Some(token) = &options.session_token {
            params.push(("sessiontoken", token.clone()));
        }

        let body = self.get_json("/place/autocomplete/json", params).await?;

        if !check_vendor_status(&body)? {
            return Ok(Vec::new());
        }

        let predictions = body["predictions"]
            .as_array()
            .ok_or_else(|| GeocodeError::Parse {
                message: "Google response missing 'predictions' array".to_string(),
            })?;

        Ok(predictions
            .iter()
            .filter_map(|prediction| {
                let description = prediction["description"].as_str()?;
                Some(Suggestion {
                    description: description.to_string(),
                    place_id: prediction["place_id"].as_str().map(String::from),
                    place_types: prediction["types"]
                        .as_array()
                        .map(|types| {
                            types
                                .iter()
                                .filter_map(Value::as_str)
                                .map(String::from)
                                .collect()
                        })
                        .unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn place_details(
        &self,
        place_id: &str,
    ) -> Result<Option<GeocodingResult>, GeocodeError> {
        let body = self
            .get_json(
                "/place/details/json",
                vec![
                    ("place_id", place_id.to_string()),
                    ("fields", DETAILS_FIELDS.to_string()),
                ],
            )
            .await?;

        if !check_vendor_status(&body)? {
            return Ok(None);
        }

        if body["result"].is_object() {
            parse_result(&body["result"]).map(Some)
        } else {
            Ok(None)
        }
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

    fn sample_result() -> Value {
        json!({
            "place_id": "ChIJP3Sa8ziYEmsRUKgyFmh9AQM",
            "formatted_address": "123 Main St, Sydney NSW 2000, Australia",
            "geometry": {"location": {"lat": -33.8688, "lng": 151.2093}},
            "types": ["street_address"],
            "address_components": [
                {"long_name": "123", "short_name": "123", "types": ["street_number"]},
                {"long_name": "Main Street", "short_name": "Main St", "types": ["route"]},
                {"long_name": "Sydney", "short_name": "Sydney", "types": ["locality", "political"]},
                {"long_name": "New South Wales", "short_name": "NSW",
                 "types": ["administrative_area_level_1", "political"]},
                {"long_name": "Australia", "short_name": "au", "types": ["country", "political"]},
                {"long_name": "2000", "short_name": "2000", "types": ["postal_code"]}
            ]
        })
    }

    #[test]
    fn parses_result_components() {
        let result = parse_result(&sample_result()).unwrap();
        assert_eq!(result.street_number.as_deref(), Some("123"));
        assert_eq!(result.street_name.as_deref(), Some("Main Street"));
        assert_eq!(result.city.as_deref(), Some("Sydney"));
        assert_eq!(result.state_code.as_deref(), Some("NSW"));
        assert_eq!(result.country_code.as_deref(), Some("AU"));
        assert_eq!(result.postal_code.as_deref(), Some("2000"));
        assert_eq!(result.place_types, vec!["street_address"]);
    }

    #[test]
    fn zero_results_is_empty_success() {
        assert!(!check_vendor_status(&json!({"status": "ZERO_RESULTS"})).unwrap());
    }

    #[test]
    fn request_denied_maps_to_invalid_credentials() {
        assert!(matches!(
            check_vendor_status(&json!({"status": "REQUEST_DENIED"})),
            Err(GeocodeError::InvalidCredentials)
        ));
    }

    #[test]
    fn over_query_limit_maps_to_rate_limited() {
        assert!(matches!(
            check_vendor_status(&json!({"status": "OVER_QUERY_LIMIT"})),
            Err(GeocodeError::RateLimited)
        ));
    }
}
