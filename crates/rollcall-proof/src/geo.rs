/// Mean Earth radius used for great-circle distances.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters between two WGS84 points given in degrees.
pub fn distance_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Latitude reached by moving `meters` due north from `lat`.
pub fn offset_north(lat: f64, meters: f64) -> f64 {
    lat + (meters / EARTH_RADIUS_M).to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_point_is_zero() {
        assert_eq!(distance_m(31.23, 121.47, 31.23, 121.47), 0.0);
    }

    #[test]
    fn north_offset_matches_distance() {
        let lat = offset_north(31.23, 150.0);
        let d = distance_m(31.23, 121.47, lat, 121.47);
        assert!((d - 150.0).abs() < 0.01, "got {d}");
    }

    #[test]
    fn one_degree_of_longitude_at_equator() {
        let d = distance_m(0.0, 0.0, 0.0, 1.0);
        assert!((d - 111_194.93).abs() < 1.0, "got {d}");
    }
}
