//! Deterministic cache key derivation.
//!
//! Each operation derives a canonical key, then its SHA-256 hex hash —
//! the column used for index lookup; the raw key is stored alongside for
//! diagnostics. Canonicalization is deterministic and locale-free so
//! equivalent inputs share a key across encodings.

use std::fmt::Write as _;

use geotag_geocoder::AutocompleteOptions;
use sha2::{Digest, Sha256};

/// Normalizes a free-form address: lowercase, trim, collapse runs of
/// whitespace to a single space.
#[must_use]
pub fn normalize_address(address: &str) -> String {
    address
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical key for a forward geocode.
#[must_use]
pub fn geocode_key(address: &str) -> String {
    format!("geocode:{}", normalize_address(address))
}

/// Canonical key for a reverse geocode.
///
/// Coordinates are rounded to six decimals (~0.1 m) so neighboring
/// calls share a key.
#[must_use]
pub fn reverse_key(latitude: f64, longitude: f64) -> String {
    format!("reverse:{latitude:.6},{longitude:.6}")
}

/// Canonical key for an autocomplete query.
///
/// Optional fields are appended in fixed order, only when non-empty.
/// Whitespace inside the option values is preserved.
#[must_use]
pub fn autocomplete_key(input: &str, options: &AutocompleteOptions) -> String {
    let mut key = format!("autocomplete:{}", normalize_address(input));

    if let Some(components) = options.components.as_deref().filter(|c| !c.is_empty()) {
        write!(key, ":comp:{components}").unwrap();
    }
    if let Some(language) = options.language.as_deref().filter(|l| !l.is_empty()) {
        write!(key, ":lang:{language}").unwrap();
    }
    if !options.types.is_empty() {
        write!(key, ":types:{}", options.types.join(",")).unwrap();
    }

    key
}

/// Canonical key for a place details lookup. Provider ids are opaque and
/// case-significant, so no normalization is applied.
#[must_use]
pub fn place_details_key(place_id: &str) -> String {
    format!("place_details:{place_id}")
}

/// SHA-256 hex hash of a canonical key.
#[must_use]
pub fn key_hash(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_collapses_case_and_whitespace() {
        assert_eq!(
            geocode_key("  123   Main St  "),
            geocode_key("123 main st")
        );
        assert_eq!(
            key_hash(&geocode_key("  123 Main St  ")),
            key_hash(&geocode_key("123 main st"))
        );
    }

    #[test]
    fn reverse_key_rounds_to_six_decimals() {
        assert_eq!(
            reverse_key(40.123_456_78, -74.123_456_78),
            "reverse:40.123457,-74.123457"
        );
    }

    #[test]
    fn neighboring_reverse_calls_share_a_key() {
        assert_eq!(
            reverse_key(40.123_456_71, -74.123_456_71),
            reverse_key(40.123_456_69, -74.123_456_69)
        );
    }

    #[test]
    fn autocomplete_key_appends_options_in_fixed_order() {
        let options = AutocompleteOptions {
            components: Some("country:AU".to_string()),
            language: Some("en".to_string()),
            types: vec!["address".to_string(), "poi".to_string()],
            session_token: None,
        };
        assert_eq!(
            autocomplete_key("Main St", &options),
            "autocomplete:main st:comp:country:AU:lang:en:types:address,poi"
        );
    }

    #[test]
    fn autocomplete_key_skips_empty_options() {
        let options = AutocompleteOptions {
            components: Some(String::new()),
            ..AutocompleteOptions::default()
        };
        assert_eq!(autocomplete_key("Main St", &options), "autocomplete:main st");
    }

    #[test]
    fn place_details_key_preserves_case() {
        assert_eq!(
            place_details_key("ChIJP3Sa8ziYEmsR"),
            "place_details:ChIJP3Sa8ziYEmsR"
        );
        assert_ne!(
            key_hash(&place_details_key("ABC")),
            key_hash(&place_details_key("abc"))
        );
    }

    #[test]
    fn hash_is_sha256_hex() {
        let hash = key_hash("geocode:123 main st");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
