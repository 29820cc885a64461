//! Great-circle helpers for route geometry.

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two WGS84 points, in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Initial great-circle bearing from point 1 to point 2, degrees in `[0, 360)`.
pub fn initial_bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Smallest absolute difference between two headings, in `[0, 180]`.
pub fn angular_difference_deg(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(360.0);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn woods_hole_to_vineyard_haven() {
        let d = haversine_km(41.5234, -70.6693, 41.4535, -70.6036);
        assert!((8.0..12.0).contains(&d), "distance was {d}");

        let b = initial_bearing_deg(41.5234, -70.6693, 41.4535, -70.6036);
        assert!((135.0..155.0).contains(&b), "bearing was {b}");
    }

    #[test]
    fn hyannis_to_nantucket() {
        let d = haversine_km(41.6362, -70.2826, 41.2835, -70.0995);
        assert!((40.0..48.0).contains(&d), "distance was {d}");
    }

    #[test]
    fn angular_difference_wraps() {
        assert_eq!(angular_difference_deg(350.0, 10.0), 20.0);
        assert_eq!(angular_difference_deg(10.0, 350.0), 20.0);
        assert_eq!(angular_difference_deg(0.0, 180.0), 180.0);
        assert_eq!(angular_difference_deg(90.0, 90.0), 0.0);
    }
}
