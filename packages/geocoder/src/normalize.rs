//! Shared normalization rules for mapping provider responses onto the
//! canonical component set.
//!
//! Nominatim, `LocationIQ`, and Photon all return OSM-flavored address
//! objects with slightly different key sets; the helpers here centralize
//! the mapping so every adapter applies the same rules:
//!
//! - country codes are always uppercased (ISO 3166-1 alpha-2)
//! - the state code falls back to the long name when no code is supplied
//! - locality is the first non-empty of city / town / village

use serde_json::Value;

use crate::GeocodingResult;

/// Returns the first non-empty string among the given keys of an address
/// object.
#[must_use]
pub fn first_non_empty(address: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| address[*key].as_str())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(String::from)
}

/// Uppercases an ISO country code, dropping empty input.
#[must_use]
pub fn country_code(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_uppercase)
}

/// Picks the state code, falling back to the long name when the provider
/// supplies no code.
#[must_use]
pub fn state_code_or_name(code: Option<&str>, name: Option<&str>) -> Option<String> {
    code.map(str::trim)
        .filter(|value| !value.is_empty())
        .or_else(|| name.map(str::trim).filter(|value| !value.is_empty()))
        .map(String::from)
}

/// Fills the component fields of a result from a Nominatim-shaped
/// `address` object (as returned by Nominatim and `LocationIQ` with
/// `addressdetails=1`).
pub fn apply_nominatim_address(result: &mut GeocodingResult, address: &Value) {
    result.street_number = first_non_empty(address, &["house_number"]);
    result.street_name = first_non_empty(address, &["road", "pedestrian", "footway"]);
    result.city = first_non_empty(address, &["city", "town", "village"]);
    result.district = first_non_empty(address, &["suburb", "neighbourhood", "city_district"]);
    result.state_name = first_non_empty(address, &["state", "province", "region"]);
    result.state_code = state_code_or_name(
        address["ISO3166-2-lvl4"]
            .as_str()
            .and_then(|iso| iso.rsplit('-').next()),
        result.state_name.as_deref(),
    );
    result.country_name = first_non_empty(address, &["country"]);
    result.country_code = country_code(address["country_code"].as_str());
    result.postal_code = first_non_empty(address, &["postcode"]);
}

/// Issues found by completeness-based address validation.
///
/// A result missing a street number or street name is still returned by
/// geocode operations; validation is where deliverability is judged.
#[must_use]
pub fn validation_issues(result: &GeocodingResult) -> Vec<String> {
    let mut issues = Vec::new();

    if result.street_number.is_none() {
        issues.push("Missing street number".to_string());
    }
    if result.street_name.is_none() {
        issues.push("Missing street name".to_string());
    }
    if result.city.is_none() {
        issues.push("Missing city".to_string());
    }
    if result.postal_code.is_none() {
        issues.push("Missing postal code".to_string());
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn locality_prefers_city_over_town_and_village() {
        let address = json!({"city": "Sydney", "town": "Ignored", "village": "Ignored"});
        assert_eq!(
            first_non_empty(&address, &["city", "town", "village"]),
            Some("Sydney".to_string())
        );

        let address = json!({"town": "Katoomba", "village": "Ignored"});
        assert_eq!(
            first_non_empty(&address, &["city", "town", "village"]),
            Some("Katoomba".to_string())
        );
    }

    #[test]
    fn country_code_uppercased() {
        assert_eq!(country_code(Some("au")), Some("AU".to_string()));
        assert_eq!(country_code(Some("  ")), None);
        assert_eq!(country_code(None), None);
    }

    #[test]
    fn state_code_falls_back_to_name() {
        assert_eq!(
            state_code_or_name(Some("NSW"), Some("New South Wales")),
            Some("NSW".to_string())
        );
        assert_eq!(
            state_code_or_name(None, Some("New South Wales")),
            Some("New South Wales".to_string())
        );
        assert_eq!(state_code_or_name(None, None), None);
    }

    #[test]
    fn nominatim_address_mapping() {
        let mut result = GeocodingResult::default();
        let address = json!({
            "house_number": "123",
            "road": "Main Street",
            "city": "Sydney",
            "suburb": "Haymarket",
            "state": "New South Wales",
            "ISO3166-2-lvl4": "AU-NSW",
            "country": "Australia",
            "country_code": "au",
            "postcode": "2000"
        });

        apply_nominatim_address(&mut result, &address);

        assert_eq!(result.street_number.as_deref(), Some("123"));
        assert_eq!(result.street_name.as_deref(), Some("Main Street"));
        assert_eq!(result.city.as_deref(), Some("Sydney"));
        assert_eq!(result.district.as_deref(), Some("Haymarket"));
        assert_eq!(result.state_code.as_deref(), Some("NSW"));
        assert_eq!(result.state_name.as_deref(), Some("New South Wales"));
        assert_eq!(result.country_code.as_deref(), Some("AU"));
        assert_eq!(result.postal_code.as_deref(), Some("2000"));
    }

    #[test]
    fn validation_issues_for_incomplete_result() {
        let result = GeocodingResult {
            city: Some("Sydney".to_string()),
            postal_code: Some("2000".to_string()),
            ..GeocodingResult::default()
        };
        let issues = validation_issues(&result);
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().any(|issue| issue.contains("street number")));
    }
}
