use crate::error::{Error, Result};
use crate::models::{LatLon, NormalizedPoint, RouteHints, RoutePoint};
use crate::plan::TimeWindow;

pub const EARTH_RADIUS_NM: f64 = 3440.065;

/// Great-circle distance in nautical miles.
pub fn haversine_nm(a: LatLon, b: LatLon) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_NM * h.sqrt().min(1.0).asin()
}

/// Initial bearing from `a` to `b`, degrees clockwise from true north.
pub fn bearing_deg(a: LatLon, b: LatLon) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlon = (b.lon - a.lon).to_radians();
    let x = dlon.sin() * lat2.cos();
    let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    (x.atan2(y).to_degrees() + 360.0) % 360.0
}

/// Minimal circular difference between two bearings, in [0, 180].
pub fn angle_diff_deg(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    if d > 180.0 {
        360.0 - d
    } else {
        d
    }
}

/// Wrap a longitude into [-180, 180).
pub fn normalize_lon(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Linear in latitude; longitude takes the short way, across the antimeridian if need be.
fn interpolate(a: LatLon, b: LatLon, frac: f64) -> LatLon {
    let dlon = normalize_lon(b.lon - a.lon);
    LatLon::new(a.lat + frac * (b.lat - a.lat), normalize_lon(a.lon + frac * dlon))
}

/// Resample `route` into `samples` points evenly spaced along its length.
///
/// Point `k` sits at `total * k / (samples - 1)` and is stamped with
/// `window.sample_time(k, samples)`; spatial and temporal spacing are
/// independent. A single sample is the final vertex at the window start.
/// Vertex hints are carried over with [`RouteHints::between`].
pub fn normalize(route: &[RoutePoint], samples: usize, window: &TimeWindow) -> Result<Vec<NormalizedPoint>> {
    if route.len() < 2 {
        return Err(Error::validation("route needs at least two vertices"));
    }
    if samples == 0 {
        return Err(Error::validation("sample count must be positive"));
    }

    let mut cum = Vec::with_capacity(route.len());
    cum.push(0.0);
    for pair in route.windows(2) {
        let last = cum[cum.len() - 1];
        cum.push(last + haversine_nm(pair[0].position(), pair[1].position()));
    }
    let total = cum[cum.len() - 1];
    if total <= 0.0 {
        return Err(Error::validation("route has zero length"));
    }

    let targets: Vec<f64> = if samples == 1 {
        vec![total]
    } else {
        (0..samples)
            .map(|k| total * k as f64 / (samples - 1) as f64)
            .collect()
    };

    let mut positions = Vec::with_capacity(samples);
    let mut seg = 0;
    for &target in &targets {
        while seg < route.len() - 2 && cum[seg + 1] < target {
            seg += 1;
        }
        let seg_len = cum[seg + 1] - cum[seg];
        let frac = if seg_len > 0.0 {
            ((target - cum[seg]) / seg_len).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let (a, b) = (&route[seg], &route[seg + 1]);
        let hints = RouteHints::between(&a.hints, &b.hints, frac);
        positions.push((interpolate(a.position(), b.position(), frac), target, seg, hints));
    }

    let points = positions
        .iter()
        .enumerate()
        .map(|(k, (pos, dist, seg, hints))| {
            let (pos, dist, seg) = (*pos, *dist, *seg);
            let heading = if k + 1 < positions.len() {
                bearing_deg(pos, positions[k + 1].0)
            } else if k > 0 {
                bearing_deg(positions[k - 1].0, pos)
            } else {
                bearing_deg(route[seg].position(), route[seg + 1].position())
            };
            let time = window.sample_time(k, samples);
            NormalizedPoint {
                index: k,
                lat: pos.lat,
                lon: pos.lon,
                cum_dist_nm: dist,
                heading_deg: heading,
                time,
                t_local: window.local_string(time),
                hints: hints.clone(),
            }
        })
        .collect();

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Waterway;
    use crate::plan::{parse_timestamp, parse_timezone};

    fn vertices(coords: &[(f64, f64)]) -> Vec<RoutePoint> {
        coords.iter().map(|&(lat, lon)| RoutePoint::new(lat, lon)).collect()
    }

    fn window() -> TimeWindow {
        let tz = parse_timezone("UTC").unwrap();
        TimeWindow {
            start: parse_timestamp("2026-05-01 08:00", tz).unwrap(),
            end: parse_timestamp("2026-05-01 12:00", tz).unwrap(),
            tz,
        }
    }

    // =========================================================================
    // Geo helpers
    // =========================================================================

    #[test]
    fn test_haversine_one_arcminute_is_one_nm() {
        let d = haversine_nm(LatLon::new(0.0, 0.0), LatLon::new(1.0 / 60.0, 0.0));
        assert!((d - 1.0).abs() < 0.01, "{}", d);
    }

    #[test]
    fn test_bearing_cardinal() {
        let o = LatLon::new(0.0, 0.0);
        assert!((bearing_deg(o, LatLon::new(1.0, 0.0)) - 0.0).abs() < 1e-9);
        assert!((bearing_deg(o, LatLon::new(0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!((bearing_deg(o, LatLon::new(-1.0, 0.0)) - 180.0).abs() < 1e-9);
        assert!((bearing_deg(o, LatLon::new(0.0, -1.0)) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_angle_diff_wraps() {
        assert_eq!(angle_diff_deg(350.0, 10.0), 20.0);
        assert_eq!(angle_diff_deg(10.0, 350.0), 20.0);
        assert_eq!(angle_diff_deg(0.0, 180.0), 180.0);
        assert_eq!(angle_diff_deg(-90.0, 90.0), 180.0);
    }

    // =========================================================================
    // normalize
    // =========================================================================

    #[test]
    fn test_two_vertex_route_yields_requested_samples() {
        let route = vertices(&[(40.0, -74.0), (40.0 + 5.0 / 60.0, -74.0)]);
        let points = normalize(&route, 12, &window()).unwrap();
        assert_eq!(points.len(), 12);
        assert!((points[0].cum_dist_nm - 0.0).abs() < 1e-9);
        assert!((points[11].cum_dist_nm - haversine_nm(route[0].position(), route[1].position())).abs() < 1e-9);
        assert!((points[11].lat - route[1].lat).abs() < 1e-9);
    }

    #[test]
    fn test_monotonic_distance_and_time() {
        let route = vertices(&[
            (40.0, -74.0),
            (40.05, -73.95),
            (40.05, -73.90),
            (40.10, -73.80),
        ]);
        for samples in [2, 3, 7, 25] {
            let points = normalize(&route, samples, &window()).unwrap();
            assert_eq!(points.len(), samples);
            for pair in points.windows(2) {
                assert!(pair[1].cum_dist_nm > pair[0].cum_dist_nm);
                assert!(pair[1].time > pair[0].time);
            }
        }
    }

    #[test]
    fn test_multi_segment_points_stay_on_route() {
        let route = vertices(&[
            (0.0, 0.0),
            (0.0, 1.0),
            (1.0, 1.0),
        ]);
        let points = normalize(&route, 3, &window()).unwrap();
        // Middle sample lands on the corner, both legs are ~60 nm
        assert!((points[1].lat - 0.0).abs() < 0.01);
        assert!((points[1].lon - 1.0).abs() < 0.01);
        assert!((points[0].heading_deg - 90.0).abs() < 1.0);
        assert!((points[2].heading_deg - 0.0).abs() < 1.0);
    }

    #[test]
    fn test_single_sample_is_final_point_at_start() {
        let route = vertices(&[(40.0, -74.0), (40.1, -74.0)]);
        let w = window();
        let points = normalize(&route, 1, &w).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].lat, 40.1);
        assert_eq!(points[0].time, w.start);
    }

    #[test]
    fn test_zero_length_route_rejected() {
        let route = vertices(&[(40.0, -74.0), (40.0, -74.0)]);
        assert!(matches!(normalize(&route, 4, &window()), Err(Error::Validation(_))));
    }

    #[test]
    fn test_single_vertex_rejected() {
        let route = vertices(&[(40.0, -74.0)]);
        assert!(matches!(normalize(&route, 4, &window()), Err(Error::Validation(_))));
    }

    #[test]
    fn test_local_strings_attached() {
        let route = vertices(&[(40.0, -74.0), (40.1, -74.0)]);
        let points = normalize(&route, 4, &window()).unwrap();
        assert_eq!(points[1].t_local, "2026-05-01 09:00 UTC");
    }

    #[test]
    fn test_hints_follow_the_route() {
        let mut route = vertices(&[(40.0, -74.0), (40.1, -74.0)]);
        route[0].hints.depth_m = Some(2.0);
        route[0].hints.name = Some("Dock".into());
        route[1].hints.depth_m = Some(8.0);
        route[1].hints.waterway = Some(Waterway::Coastal);

        let points = normalize(&route, 4, &window()).unwrap();
        let depths: Vec<f64> = points.iter().map(|p| p.hints.depth_m.unwrap()).collect();
        for (d, expected) in depths.iter().zip([2.0, 4.0, 6.0, 8.0]) {
            assert!((d - expected).abs() < 1e-6, "{:?}", depths);
        }
        assert_eq!(points[0].hints.name.as_deref(), Some("Dock"));
        assert_eq!(points[0].hints.waterway, None);
        assert_eq!(points[3].hints.waterway, Some(Waterway::Coastal));
    }

    // =========================================================================
    // Antimeridian
    // =========================================================================

    #[test]
    fn test_normalize_lon() {
        assert_eq!(normalize_lon(0.0), 0.0);
        assert_eq!(normalize_lon(190.0), -170.0);
        assert_eq!(normalize_lon(-190.0), 170.0);
        assert_eq!(normalize_lon(180.0), -180.0);
    }

    #[test]
    fn test_leg_across_antimeridian_takes_short_way() {
        let route = vertices(&[(-17.0, 179.5), (-17.0, -179.5)]);
        let points = normalize(&route, 5, &window()).unwrap();
        // ~57 nm leg, not the ~20,000 nm way round
        assert!(points[4].cum_dist_nm < 60.0, "{}", points[4].cum_dist_nm);
        for p in &points {
            assert!(p.lon.abs() >= 179.5 - 1e-9, "{}", p.lon);
            assert!((p.heading_deg - 90.0).abs() < 1.0, "{}", p.heading_deg);
        }
        assert!((points[2].lon.abs() - 180.0).abs() < 1e-9);
        assert!((points[4].lon - -179.5).abs() < 1e-9);
    }
}
