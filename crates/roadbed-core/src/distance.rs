//! Exact Euclidean distance transform (Felzenszwalb–Huttenlocher).
//!
//! Linear-time per row/column via the lower envelope of parabolas. The 1D
//! pass reuses caller scratch, so the 2D transform allocates per thread,
//! never per row.

use rayon::prelude::*;

use crate::error::{DeformError, Result};
use crate::grid::ByteMask;

const INF: f64 = 1e20;

/// 1D squared-distance transform of `f` into `d`. `v` and `z` are scratch
/// of length ≥ n and n + 1.
fn dt_1d(f: &[f64], d: &mut [f64], v: &mut [usize], z: &mut [f64]) {
    let n = f.len();
    let mut k = 0usize;
    v[0] = 0;
    z[0] = -INF;
    z[1] = INF;

    let intersect = |q: usize, p: usize| -> f64 {
        ((f[q] + (q * q) as f64) - (f[p] + (p * p) as f64)) / (2.0 * (q as f64 - p as f64))
    };

    for q in 1..n {
        let mut s = intersect(q, v[k]);
        while s <= z[k] {
            k -= 1;
            s = intersect(q, v[k]);
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = INF;
    }

    k = 0;
    for q in 0..n {
        while z[k + 1] < q as f64 {
            k += 1;
        }
        let dq = q as f64 - v[k] as f64;
        d[q] = dq * dq + f[v[k]];
    }
}

struct Scratch {
    d: Vec<f64>,
    v: Vec<usize>,
    z: Vec<f64>,
}

impl Scratch {
    fn new(n: usize) -> Self {
        Self {
            d: vec![0.0; n],
            v: vec![0; n],
            z: vec![0.0; n + 1],
        }
    }
}

fn transform_rows(grid: &mut [f64], width: usize) {
    grid.par_chunks_mut(width)
        .for_each_init(|| Scratch::new(width), |scratch, row| {
            dt_1d(row, &mut scratch.d[..width], &mut scratch.v, &mut scratch.z);
            row.copy_from_slice(&scratch.d[..width]);
        });
}

fn transpose(src: &[f64], width: usize, height: usize, dst: &mut [f64]) {
    dst.par_chunks_mut(height)
        .enumerate()
        .for_each(|(x, col)| {
            for (y, out) in col.iter_mut().enumerate() {
                *out = src[y * width + x];
            }
        });
}

/// Exact squared Euclidean distance (in pixels²) to the nearest foreground
/// cell, for every cell. Fails on empty shapes.
pub fn edt_squared(foreground: &[bool], width: usize, height: usize) -> Result<Vec<f64>> {
    if width < 1 || height < 1 {
        return Err(DeformError::InvalidShape { width, height });
    }
    debug_assert_eq!(foreground.len(), width * height);

    let mut grid: Vec<f64> = foreground
        .iter()
        .map(|&fg| if fg { 0.0 } else { INF })
        .collect();

    // Row pass, then the identical pass over columns via transposition.
    transform_rows(&mut grid, width);

    let mut t = vec![0.0f64; width * height];
    transpose(&grid, width, height, &mut t);
    transform_rows(&mut t, height);
    transpose(&t, height, width, &mut grid);

    Ok(grid)
}

/// Per-pixel distance in metres to the nearest foreground pixel of `mask`.
/// Cells with no foreground anywhere report a huge finite distance.
pub fn distance_field_m(mask: &ByteMask, mpp: f64) -> Result<Vec<f32>> {
    let fg: Vec<bool> = mask.data.iter().map(|&v| v > 127).collect();
    let sq = edt_squared(&fg, mask.size, mask.size)?;
    Ok(sq.iter().map(|&d| (d.sqrt() * mpp) as f32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(foreground: &[bool], width: usize, height: usize) -> Vec<f64> {
        let mut out = vec![INF; width * height];
        for y in 0..height {
            for x in 0..width {
                let mut best = INF;
                for fy in 0..height {
                    for fx in 0..width {
                        if foreground[fy * width + fx] {
                            let dx = x as f64 - fx as f64;
                            let dy = y as f64 - fy as f64;
                            best = best.min(dx * dx + dy * dy);
                        }
                    }
                }
                out[y * width + x] = best;
            }
        }
        out
    }

    /// Deterministic pseudo-random mask, no RNG dependency.
    fn scatter_mask(width: usize, height: usize, salt: u64) -> Vec<bool> {
        (0..width * height)
            .map(|i| {
                let mut h = (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ salt;
                h ^= h >> 33;
                h.wrapping_mul(0xFF51_AFD7_ED55_8CCD) % 13 == 0
            })
            .collect()
    }

    #[test]
    fn matches_brute_force_on_scattered_masks() {
        for (w, h, salt) in [(17usize, 9usize, 1u64), (32, 32, 7), (64, 33, 42)] {
            let fg = scatter_mask(w, h, salt);
            if !fg.iter().any(|&b| b) {
                continue;
            }
            let fast = edt_squared(&fg, w, h).unwrap();
            let slow = brute_force(&fg, w, h);
            for i in 0..fast.len() {
                assert!(
                    (fast[i] - slow[i]).abs() < 1e-6,
                    "mismatch at {i}: fast={} slow={} ({w}x{h}, salt {salt})",
                    fast[i],
                    slow[i]
                );
            }
        }
    }

    #[test]
    fn single_seed_gives_radial_distances() {
        let w = 11;
        let mut fg = vec![false; w * w];
        fg[5 * w + 5] = true;
        let d = edt_squared(&fg, w, w).unwrap();
        assert_eq!(d[5 * w + 5], 0.0);
        assert_eq!(d[5 * w + 6], 1.0);
        assert_eq!(d[6 * w + 6], 2.0);
        assert_eq!(d[0], 50.0);
    }

    #[test]
    fn zero_shape_is_rejected() {
        assert!(edt_squared(&[], 0, 5).is_err());
        assert!(edt_squared(&[], 5, 0).is_err());
    }

    #[test]
    fn metres_scale_with_mpp() {
        let mut mask = ByteMask::new(8);
        mask.set(0, 0);
        let d = distance_field_m(&mask, 2.0).unwrap();
        assert!((d[0]).abs() < 1e-6);
        assert!((d[3] - 6.0).abs() < 1e-4, "3 px at 2 m/px should be 6 m, got {}", d[3]);
    }
}
