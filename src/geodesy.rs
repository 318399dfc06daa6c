pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometres (spherical law of cosines).
pub fn distance(lat0: f64, lon0: f64, lat1: f64, lon1: f64) -> f64 {
    if lat0 == lat1 && lon0 == lon1 {
        return 0.0;
    }

    let (lat0, lon0) = (lat0.to_radians(), lon0.to_radians());
    let (lat1, lon1) = (lat1.to_radians(), lon1.to_radians());

    let cos_angle = lat0.sin() * lat1.sin() + lat0.cos() * lat1.cos() * (lon1 - lon0).cos();
    // Rounding can push nearby points just past 1.0
    cos_angle.clamp(-1.0, 1.0).acos() * EARTH_RADIUS_KM
}

/// Initial great-circle bearing from point 0 to point 1, clockwise from north.
/// Coincident points give 0.
pub fn bearing(lat0: f64, lon0: f64, lat1: f64, lon1: f64) -> f64 {
    if lat0 == lat1 && lon0 == lon1 {
        return 0.0;
    }

    let (lat0, lon0) = (lat0.to_radians(), lon0.to_radians());
    let (lat1, lon1) = (lat1.to_radians(), lon1.to_radians());

    let y = (lon1 - lon0).sin() * lat1.cos();
    let x = lat0.cos() * lat1.sin() - lat0.sin() * lat1.cos() * (lon1 - lon0).cos();
    let deg = y.atan2(x).to_degrees().rem_euclid(360.0);

    if deg >= 360.0 {
        0.0
    } else {
        deg
    }
}
