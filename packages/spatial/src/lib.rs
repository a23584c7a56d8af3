#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Spherical geometry primitives used by the places store.
//!
//! Nearby searches run in two phases: a cheap bounding-box prefilter in
//! SQL, then an exact great-circle refinement with [`haversine_km`]. The
//! bounding box intentionally over-approximates (it is a rectangle on a
//! sphere); the haversine pass drops the corners.
//!
//! Also provides [`geohash`] encoding for the `geohash` column on places.

/// Mean Earth radius in kilometers, as used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometers per degree of latitude (and of longitude at the equator).
pub const KM_PER_DEGREE: f64 = 111.0;

/// A geographic bounding box in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Western longitude boundary.
    pub west: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Northern latitude boundary.
    pub north: f64,
}

impl BoundingBox {
    /// Computes the bounding box that encloses a circle of `radius_km`
    /// around the given point.
    ///
    /// Longitude degrees shrink with latitude, so the east/west delta is
    /// scaled by `cos(latitude)`. Near the poles the cosine approaches
    /// zero; the delta is clamped so the box stays finite.
    #[must_use]
    pub fn around(latitude: f64, longitude: f64, radius_km: f64) -> Self {
        let lat_delta = radius_km / KM_PER_DEGREE;
        let cos_lat = latitude.to_radians().cos().max(1e-6);
        let lng_delta = radius_km / (KM_PER_DEGREE * cos_lat);

        Self {
            west: (longitude - lng_delta).max(-180.0),
            south: (latitude - lat_delta).max(-90.0),
            east: (longitude + lng_delta).min(180.0),
            north: (latitude + lat_delta).min(90.0),
        }
    }

    /// Returns `true` if the point lies inside the box (inclusive).
    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.south
            && latitude <= self.north
            && longitude >= self.west
            && longitude <= self.east
    }
}

/// Great-circle distance between two points in kilometers, on a sphere of
/// radius [`EARTH_RADIUS_KM`].
#[must_use]
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Base-32 alphabet used by the geohash encoding (no a, i, l, o).
const GEOHASH_BASE32: &[u8] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Maximum geohash precision stored on a place.
pub const GEOHASH_MAX_PRECISION: usize = 12;

/// Encodes a coordinate as a geohash cell identifier.
///
/// `precision` is the number of output characters and is clamped to
/// [`GEOHASH_MAX_PRECISION`]. Longitude and latitude bits are interleaved
/// starting with longitude, per the standard encoding.
#[must_use]
pub fn geohash(latitude: f64, longitude: f64, precision: usize) -> String {
    let precision = precision.clamp(1, GEOHASH_MAX_PRECISION);

    let mut lat_range = (-90.0f64, 90.0f64);
    let mut lng_range = (-180.0f64, 180.0f64);

    let mut hash = String::with_capacity(precision);
    let mut bit = 0u8;
    let mut char_bits = 0u8;
    let mut even = true;

    while hash.len() < precision {
        let range = if even { &mut lng_range } else { &mut lat_range };
        let value = if even { longitude } else { latitude };
        let mid = f64::midpoint(range.0, range.1);

        char_bits <<= 1;
        if value >= mid {
            char_bits |= 1;
            range.0 = mid;
        } else {
            range.1 = mid;
        }

        even = !even;
        bit += 1;

        if bit == 5 {
            hash.push(GEOHASH_BASE32[char_bits as usize] as char);
            bit = 0;
            char_bits = 0;
        }
    }

    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_zero_for_same_point() {
        assert!(haversine_km(-33.8688, 151.2093, -33.8688, 151.2093) < 1e-9);
    }

    #[test]
    fn haversine_sydney_cbd_block() {
        // ~0.15 km between two points in the Sydney CBD
        let d = haversine_km(-33.8688, 151.2093, -33.8700, 151.2100);
        assert!(d > 0.1 && d < 0.2, "distance was {d}");
    }

    #[test]
    fn haversine_sydney_to_san_francisco() {
        // Known distance is roughly 11,940 km
        let d = haversine_km(-33.8688, 151.2093, 37.7749, -122.4194);
        assert!((d - 11_940.0).abs() < 100.0, "distance was {d}");
    }

    #[test]
    fn bounding_box_contains_center() {
        let bbox = BoundingBox::around(-33.8688, 151.2093, 5.0);
        assert!(bbox.contains(-33.8688, 151.2093));
        assert!(bbox.south < -33.8688 && bbox.north > -33.8688);
    }

    #[test]
    fn bounding_box_excludes_distant_point() {
        let bbox = BoundingBox::around(-33.8688, 151.2093, 5.0);
        assert!(!bbox.contains(37.7749, -122.4194));
    }

    #[test]
    fn bounding_box_widens_with_latitude() {
        let equator = BoundingBox::around(0.0, 0.0, 10.0);
        let arctic = BoundingBox::around(70.0, 0.0, 10.0);
        let equator_width = equator.east - equator.west;
        let arctic_width = arctic.east - arctic.west;
        assert!(arctic_width > equator_width);
    }

    #[test]
    fn bounding_box_clamps_at_poles() {
        let bbox = BoundingBox::around(89.99, 0.0, 50.0);
        assert!(bbox.north <= 90.0);
    }

    #[test]
    fn geohash_known_value() {
        // Reference value for Råbjerg Mile, Denmark
        assert_eq!(geohash(57.64911, 10.40744, 11), "u4pruydqqvj");
    }

    #[test]
    fn geohash_prefix_property() {
        let long = geohash(-33.8688, 151.2093, 12);
        let short = geohash(-33.8688, 151.2093, 6);
        assert!(long.starts_with(&short));
        assert_eq!(long.len(), 12);
    }

    #[test]
    fn geohash_precision_clamped() {
        assert_eq!(geohash(0.0, 0.0, 40).len(), GEOHASH_MAX_PRECISION);
    }
}
