//! Visiting order for a last-mile batch.

use crate::geo::{haversine_distance, GeoPoint};

/// Greedy nearest-neighbour tour from `start` over `stops`.
///
/// Returns indices into `stops` in visiting order. Each step picks the
/// closest unvisited stop to the current position; on equal distance the
/// earlier stop wins. This is a heuristic, not an optimal tour.
pub fn greedy_order(start: &GeoPoint, stops: &[GeoPoint]) -> Vec<usize> {
    let mut remaining: Vec<usize> = (0..stops.len()).collect();
    let mut order = Vec::with_capacity(stops.len());
    let mut current = *start;

    while !remaining.is_empty() {
        let mut best = 0;
        let mut best_distance = f64::INFINITY;
        for (slot, &stop) in remaining.iter().enumerate() {
            let distance = haversine_distance(&current, &stops[stop]);
            if distance < best_distance {
                best = slot;
                best_distance = distance;
            }
        }

        let next = remaining.remove(best);
        order.push(next);
        current = stops[next];
    }

    order
}
