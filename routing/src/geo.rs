use thiserror::Error;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Error, PartialEq)]
pub enum GeoError {
    #[error("latitude {} is outside [-90, 90]", _0)]
    InvalidLatitude(f64),
    #[error("longitude {} is outside [-180, 180]", _0)]
    InvalidLongitude(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub lat: f64,
    pub lng: f64,
}

impl Point {
    /// Validated constructor for coordinates coming off the wire.
    pub fn checked(lat: f64, lng: f64) -> Result<Self, GeoError> {
        if !(-90.0..=90.0).contains(&lat) || !lat.is_finite() {
            return Err(GeoError::InvalidLatitude(lat));
        }
        if !(-180.0..=180.0).contains(&lng) || !lng.is_finite() {
            return Err(GeoError::InvalidLongitude(lng));
        }
        Ok(Self { lat, lng })
    }
}

/// Great-circle distance in kilometers.
pub fn haversine_km(a: Point, b: Point) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_for_identical_points() {
        let p = Point { lat: 12.97, lng: 77.59 };
        assert_eq!(haversine_km(p, p), 0.0);
    }

    #[test]
    fn one_degree_of_longitude_at_the_equator() {
        let a = Point { lat: 0.0, lng: 0.0 };
        let b = Point { lat: 0.0, lng: 1.0 };
        let d = haversine_km(a, b);
        // 2 * pi * 6371 / 360
        assert!((d - 111.195).abs() < 0.01, "got {}", d);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = Point { lat: 19.07, lng: 72.87 };
        let b = Point { lat: 28.61, lng: 77.20 };
        assert!((haversine_km(a, b) - haversine_km(b, a)).abs() < 1e-9);
    }

    #[test]
    fn checked_rejects_out_of_range_coordinates() {
        assert_eq!(
            Point::checked(91.0, 0.0),
            Err(GeoError::InvalidLatitude(91.0))
        );
        assert_eq!(
            Point::checked(0.0, -181.0),
            Err(GeoError::InvalidLongitude(-181.0))
        );
        assert!(Point::checked(-90.0, 180.0).is_ok());
    }
}
