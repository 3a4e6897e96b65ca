//! Integer rasterization: Bresenham lines and convex scanline fill.

use glam::DVec2;

use crate::grid::ByteMask;

/// 8-connected Bresenham line; writes 255 into the mask. Endpoints outside
/// the mask are skipped cell-by-cell rather than clipped.
pub fn draw_line(mask: &mut ByteMask, x0: i64, y0: i64, x1: i64, y1: i64) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);
    let size = mask.size as i64;

    loop {
        if x >= 0 && y >= 0 && x < size && y < size {
            mask.set(x as usize, y as usize);
        }
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// True if `p` lies inside (or on the boundary of) the convex polygon given
/// by `vertices` in consistent winding order.
pub fn point_in_convex(vertices: &[DVec2], p: DVec2) -> bool {
    if vertices.len() < 3 {
        return false;
    }
    let mut sign = 0.0f64;
    for i in 0..vertices.len() {
        let a = vertices[i];
        let b = vertices[(i + 1) % vertices.len()];
        let cross = (b - a).perp_dot(p - a);
        if cross.abs() < 1e-12 {
            continue;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}

/// Scanline-fill a convex polygon (vertices in order, pixel coordinates)
/// over a `size`×`size` grid, invoking `visit(x, y)` for every covered
/// cell. Rows are sampled at their centres (y + 0.5); the bounding box is
/// clamped to the grid.
pub fn fill_convex_polygon(vertices: &[DVec2], size: usize, mut visit: impl FnMut(usize, usize)) {
    if vertices.len() < 3 {
        return;
    }

    let min_y = vertices.iter().map(|v| v.y).fold(f64::INFINITY, f64::min);
    let max_y = vertices.iter().map(|v| v.y).fold(f64::NEG_INFINITY, f64::max);

    let y_lo = (min_y.floor().max(0.0)) as i64;
    let y_hi = (max_y.ceil().min(size as f64 - 1.0)) as i64;
    if y_hi < y_lo {
        return;
    }

    let mut xs: Vec<f64> = Vec::with_capacity(8);
    for y in y_lo..=y_hi {
        let yc = y as f64 + 0.5;
        xs.clear();
        for i in 0..vertices.len() {
            let a = vertices[i];
            let b = vertices[(i + 1) % vertices.len()];
            let (lo, hi) = if a.y <= b.y { (a, b) } else { (b, a) };
            // Half-open span so a vertex shared by two edges counts once.
            if yc >= lo.y && yc < hi.y {
                let t = (yc - lo.y) / (hi.y - lo.y);
                xs.push(lo.x + t * (hi.x - lo.x));
            }
        }
        if xs.len() < 2 {
            continue;
        }
        xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        for pair in xs.chunks(2) {
            if pair.len() < 2 {
                break;
            }
            let x_lo = (pair[0].round().max(0.0)) as i64;
            let x_hi = (pair[1].round().min(size as f64 - 1.0)) as i64;
            for x in x_lo..=x_hi {
                visit(x as usize, y as usize);
            }
        }
    }
}
