//! Polyline resampling and interpolation.

use crate::geo::GeoPoint;

/// Reduces `path` to exactly `target_count` evenly spaced points.
///
/// Paths already at or below the target are returned unchanged. Index `i` of
/// the output is `round(i * (len - 1) / (target_count - 1))`, so for
/// `target_count >= 2` the first and last input points are always kept.
pub fn resample(path: &[GeoPoint], target_count: usize) -> Vec<GeoPoint> {
    if path.len() <= target_count {
        return path.to_vec();
    }

    match target_count {
        0 => Vec::new(),
        1 => vec![path[0]],
        _ => {
            let last = path.len() - 1;
            let step = last as f64 / (target_count - 1) as f64;
            (0..target_count)
                .map(|i| {
                    let index = ((i as f64) * step).round() as usize;
                    path[index.min(last)]
                })
                .collect()
        }
    }
}

/// Subdivides every segment of `path` into `steps_per_segment` points.
///
/// Each segment contributes its start point plus the intermediate points at
/// `t = j / steps_per_segment`; the final endpoint is appended once.
pub fn interpolate(path: &[GeoPoint], steps_per_segment: usize) -> Vec<GeoPoint> {
    if path.len() < 2 {
        return path.to_vec();
    }

    let steps = steps_per_segment.max(1);
    let mut points = Vec::with_capacity((path.len() - 1) * steps + 1);

    for pair in path.windows(2) {
        let (from, to) = (&pair[0], &pair[1]);
        for j in 0..steps {
            points.push(from.lerp(to, j as f64 / steps as f64));
        }
    }

    if let Some(last) = path.last() {
        points.push(*last);
    }

    points
}

/// Shapes `path` into exactly `count` points.
///
/// Long paths are resampled; short ones are first densified along their
/// segments so that even a two-point straight line animates smoothly.
pub fn fit(path: &[GeoPoint], count: usize) -> Vec<GeoPoint> {
    if path.len() < 2 || path.len() >= count {
        return resample(path, count);
    }

    let segments = path.len() - 1;
    let per_segment = (count - 1 + segments - 1) / segments;
    resample(&interpolate(path, per_segment), count)
}

/// Two-point path used when no drivable route is available.
pub fn straight_line(from: GeoPoint, to: GeoPoint) -> Vec<GeoPoint> {
    vec![from, to]
}
