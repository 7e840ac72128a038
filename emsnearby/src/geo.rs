//! Coordinates and great-circle distance.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS 84 coordinate pair, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees, positive north.
    pub latitude: f64,
    /// Longitude in degrees, positive east.
    pub longitude: f64,
}

impl Coordinates {
    /// Create a coordinate pair from degrees.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to `other` in kilometers, by the
    /// haversine formula.
    ///
    /// `NaN` coordinates propagate to the result; records with missing
    /// coordinates must be rejected before calling.
    #[must_use]
    pub fn haversine_km(&self, other: &Self) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_KM * c
    }

    /// Convert to a [`geo_types::Point`] (x = longitude, y = latitude).
    #[must_use]
    #[cfg(feature = "geo-types")]
    pub fn point(&self) -> geo_types::Point<f64> {
        geo_types::point! { x: self.longitude, y: self.latitude }
    }
}

#[cfg(test)]
mod tests {
    use super::Coordinates;

    const LONDON: Coordinates = Coordinates::new(51.5074, -0.1278);
    const PARIS: Coordinates = Coordinates::new(48.8566, 2.3522);
    const BERLIN: Coordinates = Coordinates::new(52.52, 13.405);

    #[test]
    fn london_to_paris() {
        let distance = LONDON.haversine_km(&PARIS);
        assert!(
            (distance - 344.0).abs() < 10.0,
            "expected ~344 km, got {distance}"
        );
    }

    #[test]
    fn symmetric() {
        assert!((LONDON.haversine_km(&PARIS) - PARIS.haversine_km(&LONDON)).abs() < 1e-9);
    }

    #[test]
    fn zero_to_self() {
        assert_eq!(PARIS.haversine_km(&PARIS), 0.0);
    }

    #[test]
    fn triangle_inequality() {
        let direct = LONDON.haversine_km(&BERLIN);
        let via_paris = LONDON.haversine_km(&PARIS) + PARIS.haversine_km(&BERLIN);
        assert!(direct <= via_paris + 1e-6);
    }

    #[test]
    fn hundredth_of_a_degree_on_the_equator() {
        // 0.01° of longitude on the equator is ~1.112 km
        let origin = Coordinates::new(0.0, 0.0);
        let distance = origin.haversine_km(&Coordinates::new(0.0, 0.01));
        assert!((distance - 1.112).abs() < 0.01, "got {distance}");
    }

    #[test]
    fn nan_propagates() {
        let origin = Coordinates::new(f64::NAN, 0.0);
        assert!(origin.haversine_km(&PARIS).is_nan());
    }
}
