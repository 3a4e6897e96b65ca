//! Per-spline target elevation computation.
//!
//! For every cross-section: a robust (median) transverse sample of the
//! original terrain, then iterative relaxation to the longitudinal slope
//! cap, then an optional 1D low-pass along the spline (prefix-sum box or
//! zero-phase Butterworth), then an optional lerp of the whole network
//! toward its mean elevation.

use glam::DVec2;
use log::{debug, info};

use crate::grid::HeightGrid;
use crate::network::RoadNetwork;
use crate::params::RoadParams;

/// Relaxation iteration cap; convergence usually takes far fewer passes.
const MAX_RELAX_ITER: usize = 200;

#[derive(Debug, Default, Clone, Copy)]
pub struct ElevationStats {
    pub sections_sampled: usize,
    /// Worst-case relaxation iterations across all splines.
    pub relax_iterations_max: usize,
    pub filtered_splines: usize,
}

/// Median of a scratch buffer; leaves the buffer reordered.
fn median(buf: &mut [f64]) -> f64 {
    let mid = buf.len() / 2;
    let (_, m, _) = buf.select_nth_unstable_by(mid, |a, b| a.partial_cmp(b).unwrap());
    *m
}

/// Transverse sample count across the road width: roughly one per pixel,
/// odd so the centre is included.
fn transverse_sample_count(width_m: f64, mpp: f64) -> usize {
    let k = ((width_m / mpp).round() as usize).clamp(3, 33);
    if k % 2 == 0 {
        k + 1
    } else {
        k
    }
}

/// Prefix-sum box filter with reflective boundaries.
fn box_filter(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    if window <= 1 || n < 2 {
        return values.to_vec();
    }
    let half = window / 2;

    // Reflected padding: index -i maps to i, index n-1+i maps to n-1-i.
    let reflect = |i: isize| -> f64 {
        let n = n as isize;
        let j = if i < 0 { -i } else if i >= n { 2 * n - 2 - i } else { i };
        values[j.clamp(0, n - 1) as usize]
    };

    let padded: Vec<f64> = (-(half as isize)..(n + half) as isize).map(reflect).collect();
    let mut prefix = Vec::with_capacity(padded.len() + 1);
    prefix.push(0.0);
    for &v in &padded {
        prefix.push(prefix.last().unwrap() + v);
    }

    (0..n)
        .map(|i| {
            // values[i] sits at padded[i + half]; window spans ±half.
            let lo = i;
            let hi = i + 2 * half + 1;
            (prefix[hi] - prefix[lo]) / window as f64
        })
        .collect()
}

/// One second-order (or degenerate first-order) IIR section.
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    fn run(&self, data: &mut [f64]) {
        let (mut x1, mut x2, mut y1, mut y2) = (0.0, 0.0, 0.0, 0.0);
        for v in data.iter_mut() {
            let x0 = *v;
            let y0 = self.b0 * x0 + self.b1 * x1 + self.b2 * x2 - self.a1 * y1 - self.a2 * y2;
            x2 = x1;
            x1 = x0;
            y2 = y1;
            y1 = y0;
            *v = y0;
        }
    }
}

/// Butterworth low-pass as cascaded second-order sections (RBJ bilinear
/// design). `cutoff` is in cycles per sample, (0, 0.5).
fn design_butterworth(order: u32, cutoff: f64) -> Vec<Biquad> {
    let order = order.clamp(1, 8);
    let fc = cutoff.clamp(0.005, 0.4);
    let mut sections = Vec::new();

    let w0 = 2.0 * std::f64::consts::PI * fc;
    let (sin_w0, cos_w0) = w0.sin_cos();

    let pairs = order / 2;
    for k in 0..pairs {
        // Pole-pair quality factors of the analog Butterworth prototype.
        let theta = std::f64::consts::PI * (2.0 * k as f64 + 1.0) / (2.0 * order as f64);
        let q = 1.0 / (2.0 * theta.sin());
        let alpha = sin_w0 / (2.0 * q);
        let a0 = 1.0 + alpha;
        sections.push(Biquad {
            b0: (1.0 - cos_w0) / 2.0 / a0,
            b1: (1.0 - cos_w0) / a0,
            b2: (1.0 - cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        });
    }

    if order % 2 == 1 {
        // First-order section via the bilinear transform.
        let wa = (std::f64::consts::PI * fc).tan();
        let b = wa / (1.0 + wa);
        sections.push(Biquad {
            b0: b,
            b1: b,
            b2: 0.0,
            a1: (wa - 1.0) / (wa + 1.0),
            a2: 0.0,
        });
    }

    sections
}

/// Zero-phase filtering: odd-reflection padding, forward pass, backward
/// pass, unpad. Mirrors the forward–backward scheme of scipy's filtfilt.
fn filtfilt(sections: &[Biquad], values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 4 {
        return values.to_vec();
    }
    let pad = (3 * (2 * sections.len() + 1)).min(n - 1);

    let mut work = Vec::with_capacity(n + 2 * pad);
    for i in (1..=pad).rev() {
        work.push(2.0 * values[0] - values[i]);
    }
    work.extend_from_slice(values);
    for i in 1..=pad {
        work.push(2.0 * values[n - 1] - values[n - 1 - i]);
    }

    for s in sections {
        s.run(&mut work);
    }
    work.reverse();
    for s in sections {
        s.run(&mut work);
    }
    work.reverse();

    work[pad..pad + n].to_vec()
}

/// Longitudinal slope relaxation over (elevation, position) pairs of the
/// non-excluded sections, in order. Returns the iteration count used.
fn relax_slope(elev: &mut [f64], centers: &[DVec2], max_slope_deg: f64) -> usize {
    let tan_max = max_slope_deg.to_radians().tan();
    for iter in 0..MAX_RELAX_ITER {
        let mut changed = false;
        for i in 0..elev.len().saturating_sub(1) {
            let d = (centers[i + 1] - centers[i]).length();
            if d < 1e-9 {
                continue;
            }
            let diff = elev[i + 1] - elev[i];
            if diff.abs() / d > tan_max + 1e-12 {
                let excess = (diff.abs() - tan_max * d) / 2.0;
                let sign = diff.signum();
                elev[i] += sign * excess;
                elev[i + 1] -= sign * excess;
                changed = true;
            }
        }
        if !changed {
            return iter + 1;
        }
    }
    MAX_RELAX_ITER
}

fn low_pass(params: &RoadParams, values: &[f64]) -> Vec<f64> {
    if params.use_butterworth_filter {
        let cutoff = 1.0 / params.smoothing_window_size.max(2) as f64;
        let sections = design_butterworth(params.butterworth_filter_order, cutoff);
        filtfilt(&sections, values)
    } else {
        box_filter(values, params.smoothing_window_size)
    }
}

/// Compute target elevations for every non-excluded cross-section.
pub fn compute_target_elevations(network: &mut RoadNetwork, h0: &HeightGrid) -> ElevationStats {
    let mut stats = ElevationStats::default();
    let RoadNetwork { splines, sections } = network;

    let mut sample_buf: Vec<f64> = Vec::with_capacity(33);

    for spline in splines.iter() {
        let secs = &mut sections[spline.section_start..spline.section_end];

        // 1. Robust transverse sampling.
        for cs in secs.iter_mut() {
            cs.original_elevation = h0.sample_world_clamped(cs.center) as f64;
            if cs.excluded {
                continue;
            }
            let k = transverse_sample_count(cs.road_width_m, h0.mpp);
            sample_buf.clear();
            for j in 0..k {
                let frac = j as f64 / (k - 1) as f64 * 2.0 - 1.0;
                let pos = cs.center + cs.normal * (frac * cs.half_width());
                sample_buf.push(h0.sample_world_clamped(pos) as f64);
            }
            cs.target_elevation = median(&mut sample_buf);
            stats.sections_sampled += 1;
        }

        // 2. Longitudinal slope cap over the non-excluded subsequence.
        let active: Vec<usize> = (0..secs.len()).filter(|&i| !secs[i].excluded).collect();
        if active.len() >= 2 {
            let mut elev: Vec<f64> = active.iter().map(|&i| secs[i].target_elevation).collect();
            let centers: Vec<DVec2> = active.iter().map(|&i| secs[i].center).collect();
            let iters = relax_slope(&mut elev, &centers, spline.params.road_max_slope_deg);
            stats.relax_iterations_max = stats.relax_iterations_max.max(iters);

            // 3. 1D low-pass along the spline.
            let filtered = low_pass(&spline.params, &elev);
            for (&i, &e) in active.iter().zip(filtered.iter()) {
                secs[i].target_elevation = e;
            }
            stats.filtered_splines += 1;
        }
    }

    // 4. Global leveling toward the network-wide mean.
    let leveling_active = splines.iter().any(|s| s.params.global_leveling_strength > 0.0);
    if leveling_active {
        let (sum, count) = sections
            .iter()
            .filter(|cs| !cs.excluded && cs.target_elevation.is_finite())
            .fold((0.0f64, 0usize), |(s, c), cs| (s + cs.target_elevation, c + 1));
        if count > 0 {
            let mean = sum / count as f64;
            for spline in splines.iter() {
                let strength = spline.params.global_leveling_strength;
                if strength <= 0.0 {
                    continue;
                }
                for cs in &mut sections[spline.section_start..spline.section_end] {
                    if !cs.excluded && cs.target_elevation.is_finite() {
                        cs.target_elevation += (mean - cs.target_elevation) * strength;
                    }
                }
            }
            debug!("global leveling toward mean {mean:.2} m");
        }
    }

    info!(
        "elevation pass: {} section(s) sampled, worst relaxation {} iteration(s)",
        stats.sections_sampled, stats.relax_iterations_max
    );
    stats
}
