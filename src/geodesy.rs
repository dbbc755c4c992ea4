//! Great-circle helpers over WGS84 lat/lon in degrees.

use geo::{HaversineDistance, Point};

use crate::types::{LocationFix, RoutePoint};

/// Haversine distance in meters between two lat/lon pairs (degrees).
///
/// Uses the mean Earth radius; good to well under a meter at workout scale.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    // geo points are (x = lon, y = lat)
    let a = Point::new(lon1, lat1);
    let b = Point::new(lon2, lat2);
    a.haversine_distance(&b)
}

pub fn fix_distance_m(from: &LocationFix, to: &LocationFix) -> f64 {
    haversine_m(from.latitude, from.longitude, to.latitude, to.longitude)
}

/// Total length of a polyline in kilometers.
pub fn route_length_km(route: &[RoutePoint]) -> f64 {
    route
        .windows(2)
        .map(|w| haversine_m(w[0].latitude, w[0].longitude, w[1].latitude, w[1].longitude))
        .sum::<f64>()
        / 1000.0
}

/// Latitude in [-90, 90] and longitude in [-180, 180], both finite.
pub fn is_valid_coordinate(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
}
