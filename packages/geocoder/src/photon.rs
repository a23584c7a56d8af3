//! Photon geocoder adapter (komoot's OSM-backed search).
//!
//! Photon serves `GeoJSON` `FeatureCollection` responses from `/api`
//! (forward search and autocomplete) and `/reverse`. It is keyless; the
//! instance URL comes from `PHOTON_URL`.
//!
//! Photon has no server-side country filter on all deployments, so
//! country restriction is applied client-side by filtering the returned
//! features. There is no lookup-by-id endpoint; `place_details` reports
//! an unsupported-operation error, which advances the failover chain.
//!
//! See <https://github.com/komoot/photon>

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    AutocompleteOptions, GeocodeError, GeocodingProvider, GeocodingResult, HTTP_TIMEOUT,
    Suggestion, ValidationResult, check_status, normalize,
};

/// Default public Photon endpoint.
pub const DEFAULT_BASE_URL: &str = "https://photon.komoot.io";

/// Photon provider.
pub struct PhotonProvider {
    client: reqwest::Client,
    base_url: String,
}

impl PhotonProvider {
    /// Creates a provider against the given Photon instance.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: String) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self { client, base_url })
    }

    async fn search(
        &self,
        query: &str,
        limit: &str,
        language: Option<&str>,
    ) -> Result<Vec<Value>, GeocodeError> {
        let url = format!("{}/api", self.base_url);
        let mut params = vec![("q", query.to_string()), ("limit", limit.to_string())];
        if let Some(lang) = language {
            params.push(("lang", lang.to_string()));
        }

        let resp = self.client.get(&url).query(&params).send().await?;
        check_status("photon", resp.status())?;

        let body: Value = resp.json().await?;
        features(&body)
    }
}

/// Extracts the `features` array from a `FeatureCollection` body.
fn features(body: &Value) -> Result<Vec<Value>, GeocodeError> {
    body["features"]
        .as_array()
        .cloned()
        .ok_or_else(|| GeocodeError::Parse {
            message: "Photon response missing 'features' array".to_string(),
        })
}

/// Parses one `GeoJSON` feature into the canonical schema.
fn parse_feature(feature: &Value) -> Result<GeocodingResult, GeocodeError> {
    let coords = feature
        .pointer("/geometry/coordinates")
        .and_then(Value::as_array)
        .ok_or_else(|| GeocodeError::Parse {
            message: "Feature missing geometry.coordinates".to_string(),
        })?;

    if coords.len() < 2 {
        return Err(GeocodeError::Parse {
            message: "coordinates array has fewer than 2 elements".to_string(),
        });
    }

    let longitude = coords[0].as_f64().ok_or_else(|| GeocodeError::Parse {
        message: "longitude is not a number".to_string(),
    })?;
    let latitude = coords[1].as_f64().ok_or_else(|| GeocodeError::Parse {
        message: "latitude is not a number".to_string(),
    })?;

    let props = &feature["properties"];

    let street_name = props["street"]
        .as_str()
        .or_else(|| props["name"].as_str())
        .map(String::from);

    let result = GeocodingResult {
        formatted_address: formatted_address(props),
        latitude,
        longitude,
        street_number: props["housenumber"].as_str().map(String::from),
        street_name,
        city: props["city"].as_str().map(String::from),
        district: props["district"].as_str().map(String::from),
        state_name: props["state"].as_str().map(String::from),
        state_code: normalize::state_code_or_name(None, props["state"].as_str()),
        country_name: props["country"].as_str().map(String::from),
        country_code: normalize::country_code(props["countrycode"].as_str()),
        postal_code: props["postcode"].as_str().map(String::from),
        place_id: place_id(props),
        place_types: props["type"]
            .as_str()
            .map(|t| vec![t.to_string()])
            .unwrap_or_default(),
        confidence: None,
        provider: "photon".to_string(),
    };

    Ok(result)
}

/// Builds the `"photon:{osm_type}:{osm_id}"` identifier.
fn place_id(props: &Value) -> Option<String> {
    let osm_type = props["osm_type"].as_str()?;
    let osm_id = props["osm_id"].as_i64()?;
    Some(format!("photon:{osm_type}:{osm_id}"))
}

/// Assembles a display address from Photon properties, which carry no
/// pre-formatted label.
fn formatted_address(props: &Value) -> String {
    let mut parts: Vec<String> = Vec::new();

    let street = match (props["housenumber"].as_str(), props["street"].as_str()) {
        (Some(number), Some(street)) => Some(format!("{number} {street}")),
        (None, Some(street)) => Some(street.to_string()),
        _ => props["name"].as_str().map(String::from),
    };
    if let Some(street) = street {
        parts.push(street);
    }

    for key in ["city", "state", "postcode", "country"] {
        if let Some(value) = props[key].as_str() {
            if !value.is_empty() {
                parts.push(value.to_string());
            }
        }
    }

    parts.join(", ")
}

/// Keeps only features whose country code matches one of `codes`
/// (case-insensitive). An empty filter keeps everything.
fn filter_by_country(features: Vec<Value>, codes: &[String]) -> Vec<Value> {
    if codes.is_empty() {
        return features;
    }

    features
        .into_iter()
        .filter(|feature| {
            feature
                .pointer("/properties/countrycode")
                .and_then(Value::as_str)
                .is_some_and(|code| codes.iter().any(|want| want.eq_ignore_ascii_case(code)))
        })
        .collect()
}

#[async_trait]
impl GeocodingProvider for PhotonProvider {
    fn name(&self) -> &str {
        "photon"
    }

    async fn geocode(&self, address: &str) -> Result<Option<GeocodingResult>, GeocodeError> {
        let results = self.search(address, "1", None).await?;
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
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
            ])
            .send()
            .await?;
        check_status("photon", resp.status())?;

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
            .search(input, "10", options.language.as_deref())
            .await?;
        let results = filter_by_country(results, &options.country_codes());

        Ok(results
            .iter()
            .take(5)
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
        _place_id: &str,
    ) -> Result<Option<GeocodingResult>, GeocodeError> {
        Err(GeocodeError::Provider {
            message: "Photon has no place lookup endpoint".to_string(),
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

    fn sample_feature() -> Value {
        json!({
            "geometry": {"coordinates": [151.2093, -33.8688]},
            "properties": {
                "osm_type": "N",
                "osm_id": 42,
                "housenumber": "123",
                "street": "Main Street",
                "city": "Sydney",
                "state": "New South Wales",
                "country": "Australia",
                "countrycode": "AU",
                "postcode": "2000",
                "type": "house"
            }
        })
    }

    #[test]
    fn parses_feature() {
        let result = parse_feature(&sample_feature()).unwrap();
        assert!((result.longitude - 151.2093).abs() < 1e-9);
        assert_eq!(result.place_id.as_deref(), Some("photon:N:42"));
        assert_eq!(result.country_code.as_deref(), Some("AU"));
        assert_eq!(
            result.formatted_address,
            "123 Main Street, Sydney, New South Wales, 2000, Australia"
        );
    }

    #[test]
    fn state_code_falls_back_to_state_name() {
        let result = parse_feature(&sample_feature()).unwrap();
        assert_eq!(result.state_code.as_deref(), Some("New South Wales"));
    }

    #[test]
    fn country_filter_drops_mismatches() {
        let features = vec![sample_feature()];
        assert!(filter_by_country(features.clone(), &["nz".to_string()]).is_empty());
        assert_eq!(filter_by_country(features, &["au".to_string()]).len(), 1);
    }

    #[test]
    fn missing_features_array_is_parse_error() {
        assert!(features(&json!({})).is_err());
    }
}
