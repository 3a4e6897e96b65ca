//! Ramer–Douglas–Peucker polyline simplification.

use glam::DVec2;

/// Perpendicular distance from `p` to the segment (a, b).
fn segment_distance(p: DVec2, a: DVec2, b: DVec2) -> f64 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < 1e-18 {
        return (p - a).length();
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).length()
}

fn rdp_recurse(points: &[DVec2], tolerance: f64, keep: &mut [bool], lo: usize, hi: usize) {
    if hi <= lo + 1 {
        return;
    }
    let (a, b) = (points[lo], points[hi]);
    let mut max_dist = 0.0;
    let mut max_idx = lo;
    for i in lo + 1..hi {
        let d = segment_distance(points[i], a, b);
        if d > max_dist {
            max_dist = d;
            max_idx = i;
        }
    }
    if max_dist > tolerance {
        keep[max_idx] = true;
        rdp_recurse(points, tolerance, keep, lo, max_idx);
        rdp_recurse(points, tolerance, keep, max_idx, hi);
    }
}

/// Simplify an ordered polyline, keeping every point farther than
/// `tolerance` from the chord of its span. Endpoints always survive.
pub fn simplify_rdp(points: &[DVec2], tolerance: f64) -> Vec<DVec2> {
    if points.len() <= 2 {
        return points.to_vec();
    }
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;
    rdp_recurse(points, tolerance, &mut keep, 0, points.len() - 1);
    points
        .iter()
        .zip(keep.iter())
        .filter_map(|(&p, &k)| k.then_some(p))
        .collect()
}
