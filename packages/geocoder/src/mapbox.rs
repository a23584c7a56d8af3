//! Mapbox Geocoding v6 adapter.
//!
//! Forward search at `/forward`, reverse at `/reverse`, token in the
//! query string. Country restriction comes from `country:XX` component
//! entries joined by comma.
//!
//! Geocoding v6 has **no retrieve endpoint**: `place_details` re-issues
//! a forward query using the opaque `mapbox_id` as the search string.
//! That works only when the id happens to match a searchable string and
//! may silently return nothing for otherwise-opaque ids — a known
//! weakness of the vendor API, kept as-is.
//!
//! See <https://docs.mapbox.com/api/search/geocoding/>

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    AutocompleteOptions, GeocodeError, GeocodingProvider, GeocodingResult, HTTP_TIMEOUT,
    Suggestion, ValidationResult, check_status, normalize,
};

/// Default Mapbox Geocoding v6 endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.mapbox.com/search/geocode/v6";

/// Mapbox provider.
pub struct MapboxProvider {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl MapboxProvider {
    /// Creates a provider with the given access token.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: String, access_token: String) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url,
            access_token,
        })
    }

    async fn forward(
        &self,
        query: &str,
        limit: &str,
        country_codes: &[String],
    ) -> Result<Vec<Value>, GeocodeError> {
        let url = format!("{}/forward", self.base_url);
        let mut params = vec![
            ("q", query.to_string()),
            ("access_token", self.access_token.clone()),
            ("limit", limit.to_string()),
        ];
        if !country_codes.is_empty() {
            params.push(("country", country_codes.join(",")));
        }

        let resp = self.client.get(&url).query(&params).send().await?;
        check_status("mapbox", resp.status())?;

        let body: Value = resp.json().await?;
        features(&body)
    }
}

/// Extracts the `features` array from a v6 response body.
fn features(body: &Value) -> Result<Vec<Value>, GeocodeError> {
    body["features"]
        .as_array()
        .cloned()
        .ok_or_else(|| GeocodeError::Parse {
            message: "Mapbox response missing 'features' array".to_string(),
        })
}

/// Maps the v6 `match_code.confidence` label onto `[0, 1]`.
fn confidence(props: &Value) -> Option<f64> {
    match props.pointer("/match_code/confidence").and_then(Value::as_str)? {
        "exact" => Some(1.0),
        "high" => Some(0.9),
        "medium" => Some(0.7),
        "low" => Some(0.4),
        _ => None,
    }
}

/// Parses one v6 feature into the canonical schema.
fn parse_feature(feature: &Value) -> Result<GeocodingResult, GeocodeError> {
    let props = &feature["properties"];

    let latitude = props
        .pointer("/coordinates/latitude")
        .and_then(Value::as_f64)
        .or_else(|| {
            feature
                .pointer("/geometry/coordinates/1")
                .and_then(Value::as_f64)
        })
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing latitude in Mapbox feature".to_string(),
        })?;

    let longitude = props
        .pointer("/coordinates/longitude")
        .and_then(Value::as_f64)
        .or_else(|| {
            feature
                .pointer("/geometry/coordinates/0")
                .and_then(Value::as_f64)
        })
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing longitude in Mapbox feature".to_string(),
        })?;

    let context = &props["context"];
    let state_name = context
        .pointer("/region/name")
        .and_then(Value::as_str);

    let result = GeocodingResult {
        formatted_address: props["full_address"]
            .as_str()
            .or_else(|| props["name"].as_str())
            .unwrap_or_default()
            .to_string(),
        latitude,
        longitude,
        street_number: context
            .pointer("/address/address_number")
            .and_then(Value::as_str)
            .map(String::from),
        street_name: context
            .pointer("/address/street_name")
            .and_then(Value::as_str)
            .or_else(|| context.pointer("/street/name").and_then(Value::as_str))
            .map(String::from),
        city: context
            .pointer("/place/name")
            .and_then(Value::as_str)
            .or_else(|| context.pointer("/locality/name").and_then(Value::as_str))
            .map(String::from),
        district: context
            .pointer("/neighborhood/name")
            .and_then(Value::as_str)
            .map(String::from),
        state_code: normalize::state_code_or_name(
            context
                .pointer("/region/region_code")
                .and_then(Value::as_str),
            state_name,
        ),
        state_name: state_name.map(String::from),
        country_name: context
            .pointer("/country/name")
            .and_then(Value::as_str)
            .map(String::from),
        country_code: normalize::country_code(
            context
                .pointer("/country/country_code")
                .and_then(Value::as_str),
        ),
        postal_code: context
            .pointer("/postcode/name")
            .and_then(Value::as_str)
            .map(String::from),
        place_id: props["mapbox_id"].as_str().map(String::from),
        place_types: props["feature_type"]
            .as_str()
            .map(|t| vec![t.to_string()])
            .unwrap_or_default(),
        confidence: confidence(props),
        provider: "mapbox".to_string(),
    };

    Ok(result)
}

#[async_trait]
impl GeocodingProvider for MapboxProvider {
    fn name(&self) -> &str {
        "mapbox"
    }

    async fn geocode(&self, address: &str) -> Result<Option<GeocodingResult>, GeocodeError> {
        let results = self.forward(address, "1", &[]).await?;
        results.first().map(parse_feature).transpose()
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
                ("longitude", longitude.to_string()),
                ("latitude", latitude.to_string()),
                ("access_token", self.access_token.clone()),
            ])
            .send()
            .await?;
        check_status("mapbox", resp.status())?;

        let body: Value = resp.json().await?;
        let results = features(&body)?;
        results.first().map(parse_feature).transpose()
    }

    async fn autocomplete(
        &self,
        input: &str,
        options: &AutocompleteOptions,
    ) -> Result<Vec<Suggestion>, GeocodeError> {
        let results = self
            .forward(input, "5", &options.country_codes())
            .await?;

        Ok(results
            .iter()
            .filter_map(|feature| {
                let parsed = parse_feature(feature).ok()?;
                Some(Suggestion {
                    description: parsed.formatted_address,
                    place_id: parsed.place_id,
                    place_types: parsed.place_types,
                })
            })
            .collect())
    }

    async fn place_details(
        &self,
        place_id: &str,
    ) -> Result<Option<GeocodingResult>, GeocodeError> {
        // v6 has no retrieve endpoint; the forward query below only
        // resolves ids that happen to be searchable strings.
        let results = self.forward(place_id, "1", &[]).await?;
        results.first().map(parse_feature).transpose()
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

    fn sample_feature() -> Value {
        json!({
            "properties": {
                "mapbox_id": "dXJuOm1ieGFkcjpl",
                "feature_type": "address",
                "full_address": "123 Main Street, Sydney New South Wales 2000, Australia",
                "coordinates": {"longitude": 151.2093, "latitude": -33.8688},
                "match_code": {"confidence": "exact"},
                "context": {
                    "address": {"address_number": "123", "street_name": "Main Street"},
                    "place": {"name": "Sydney"},
                    "region": {"name": "New South Wales", "region_code": "NSW"},
                    "postcode": {"name": "2000"},
                    "country": {"name": "Australia", "country_code": "au"}
                }
            }
        })
    }

    #[test]
    fn parses_v6_feature() {
        let result = parse_feature(&sample_feature()).unwrap();
        assert!((result.latitude - -33.8688).abs() < 1e-9);
        assert_eq!(result.street_number.as_deref(), Some("123"));
        assert_eq!(result.state_code.as_deref(), Some("NSW"));
        assert_eq!(result.country_code.as_deref(), Some("AU"));
        assert_eq!(result.place_id.as_deref(), Some("dXJuOm1ieGFkcjpl"));
        assert_eq!(result.confidence, Some(1.0));
    }

    #[test]
    fn falls_back_to_geometry_coordinates() {
        let feature = json!({
            "geometry": {"coordinates": [151.0, -33.0]},
            "properties": {"full_address": "somewhere"}
        });
        let result = parse_feature(&feature).unwrap();
        assert!((result.longitude - 151.0).abs() < 1e-9);
    }

    #[test]
    fn confidence_labels_mapped() {
        let props = json!({"match_code": {"confidence": "medium"}});
        assert_eq!(confidence(&props), Some(0.7));
        assert_eq!(confidence(&json!({})), None);
    }
}
