//! `LocationIQ` geocoder adapter.
//!
//! `LocationIQ` serves Nominatim-shaped responses with an API key passed
//! in the query string. Place identifiers are emitted as
//! `"liq:{place_id}"` using the numeric id from the response; there is
//! no lookup-by-id endpoint, so `place_details` reports an
//! unsupported-operation error and the failover chain advances.
//!
//! See <https://locationiq.com/docs>

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    AutocompleteOptions, GeocodeError, GeocodingProvider, GeocodingResult, HTTP_TIMEOUT,
    Suggestion, ValidationResult, check_status, normalize,
};

/// Default `LocationIQ` API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://us1.locationiq.com/v1";

/// `LocationIQ` provider.
pub struct LocationIqProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl LocationIqProvider {
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

    async fn get_array(
        &self,
        path: &str,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<Vec<Value>, GeocodeError> {
        let url = format!("{}{path}", self.base_url);
        params.push(("key", self.api_key.clone()));
        params.push(("format", "json".to_string()));

        let resp = self.client.get(&url).query(&params).send().await?;

        // LocationIQ reports "no results" as a 404 with an error body.
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        check_status("locationiq", resp.status())?;

        let body: Value = resp.json().await?;
        body.as_array().cloned().ok_or_else(|| GeocodeError::Parse {
            message: "LocationIQ response is not an array".to_string(),
        })
    }
}

/// Parses one Nominatim-shaped result object.
fn parse_result(entry: &Value) -> Result<GeocodingResult, GeocodeError> {
    let latitude = entry["lat"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing lat in LocationIQ response".to_string(),
        })?;

    let longitude = entry["lon"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing lon in LocationIQ response".to_string(),
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
        provider: "locationiq".to_string(),
        ..GeocodingResult::default()
    };

    if entry["address"].is_object() {
        normalize::apply_nominatim_address(&mut result, &entry["address"]);
    }

    Ok(result)
}

/// Builds the `"liq:{place_id}"` identifier.
fn place_id(entry: &Value) -> Option<String> {
    entry["place_id"]
        .as_str()
        .map(|id| format!("liq:{id}"))
        .or_else(|| entry["place_id"].as_i64().map(|id| format!("liq:{id}")))
}

#[async_trait]
impl GeocodingProvider for LocationIqProvider {
    fn name(&self) -> &str {
        "locationiq"
    }

    async fn geocode(&self, address: &str) -> Result<Option<GeocodingResult>, GeocodeError> {
        let results = self
            .get_array(
                "/search",
                vec![
                    ("q", address.to_string()),
                    ("addressdetails", "1".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
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
                ("key", self.api_key.clone()),
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("format", "json".to_string()),
                ("addressdetails", "1".to_string()),
            ])
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status("locationiq", resp.status())?;

        let body: Value = resp.json().await?;
        parse_result(&body).map(Some)
    }

    async fn autocomplete(
        &self,
        input: &str,
        options: &AutocompleteOptions,
    ) -> Result<Vec<Suggestion>, GeocodeError> {
        let mut params = vec![("q", input.to_string()), ("limit", "5".to_string())];
        if let Some(first) = options.country_codes().first() {
            params.push(("countrycodes", first.clone()));
        }

        let results = self.get_array("/autocomplete", params).await?;

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
        _place_id: &str,
    ) -> Result<Option<GeocodingResult>, GeocodeError> {
        Err(GeocodeError::Provider {
            message: "LocationIQ has no place lookup endpoint".to_string(),
        })
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

    #[test]
    fn parses_result_with_numeric_place_id() {
        let entry = json!({
            "place_id": 321_654,
            "lat": "-33.8688",
            "lon": "151.2093",
            "display_name": "123, Main Street, Sydney",
            "type": "house",
            "address": {
                "house_number": "123",
                "road": "Main Street",
                "city": "Sydney",
                "country_code": "au"
            }
        });

        let result = parse_result(&entry).unwrap();
        assert_eq!(result.place_id.as_deref(), Some("liq:321654"));
        assert_eq!(result.country_code.as_deref(), Some("AU"));
        assert_eq!(result.provider, "locationiq");
    }

    #[test]
    fn parse_fails_without_coordinates() {
        assert!(parse_result(&json!({"display_name": "x"})).is_err());
    }
}
