//! Post-processing 2D smoothing around roads.
//!
//! Splines are grouped by their smoothing parameter tuple; each group
//! smooths inside a disk-dilated mask around its cross-sections. A global
//! already-smoothed mask is subtracted before and OR-ed after each group
//! (first writer wins), so junction areas shared between groups are never
//! smoothed twice. Group masks are expanded to cover junctions with other
//! groups so no seam is left unsmoothed.

use log::info;
use rayon::prelude::*;

use crate::grid::HeightGrid;
use crate::network::RoadNetwork;
use crate::params::SmoothingType;

/// Groups sharing a junction within this distance both extend their masks
/// over it.
const GROUP_JUNCTION_RADIUS_M: f64 = 15.0;

/// Grouping key: the full smoothing parameter tuple. Floats are keyed by
/// their bit patterns, which is exact for values round-tripped through the
/// parameter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GroupKey {
    smoothing_type: SmoothingType,
    kernel_size: usize,
    sigma_bits: u64,
    iterations: u32,
    road_width_bits: u64,
    mask_extension_bits: u64,
}

impl GroupKey {
    fn of(spline: &crate::network::RoadSpline) -> Self {
        let ps = &spline.params.post_smoothing;
        Self {
            smoothing_type: ps.smoothing_type,
            kernel_size: ps.kernel_size,
            sigma_bits: ps.sigma.to_bits(),
            iterations: ps.iterations,
            road_width_bits: spline.params.road_width_m.to_bits(),
            mask_extension_bits: ps.mask_extension_m.to_bits(),
        }
    }
}

struct Group {
    key: GroupKey,
    spline_ids: Vec<u32>,
    mask: Vec<bool>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SmoothStats {
    pub groups: usize,
    pub smoothed_pixels: u64,
}

fn stamp_disk(mask: &mut [bool], size: usize, cx: f64, cy: f64, radius_px: f64) {
    let r = radius_px.max(0.0);
    let x0 = ((cx - r).floor().max(0.0)) as usize;
    let x1 = ((cx + r).ceil().min(size as f64 - 1.0)) as usize;
    let y0 = ((cy - r).floor().max(0.0)) as usize;
    let y1 = ((cy + r).ceil().min(size as f64 - 1.0)) as usize;
    let r_sq = r * r;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            if dx * dx + dy * dy <= r_sq {
                mask[y * size + x] = true;
            }
        }
    }
}

/// Disk radius of a group's mask, metres.
fn group_radius_m(network: &RoadNetwork, group: &Group) -> f64 {
    group
        .spline_ids
        .iter()
        .map(|&id| {
            let p = &network.spline(id).params;
            p.half_width() + p.post_smoothing.mask_extension_m
        })
        .fold(0.0, f64::max)
}

fn build_group_masks(network: &RoadNetwork, groups: &mut [Group], size: usize, mpp: f64) {
    for group in groups.iter_mut() {
        for &id in &group.spline_ids {
            let p = &network.spline(id).params;
            let radius_px = (p.half_width() + p.post_smoothing.mask_extension_m) / mpp;
            for cs in network.sections_of(id) {
                if cs.excluded {
                    continue;
                }
                stamp_disk(&mut group.mask, size, cs.center.x / mpp, cs.center.y / mpp, radius_px);
            }
        }
    }
}

/// Expand both groups' masks over junction areas they share, so neither
/// leaves an unsmoothed seam at a cross-group junction.
fn expand_masks_at_shared_junctions(network: &RoadNetwork, groups: &mut [Group], size: usize, mpp: f64) {
    let mut stamps: Vec<(usize, glam::DVec2)> = Vec::new();

    for gi in 0..groups.len() {
        for gj in gi + 1..groups.len() {
            for &a_id in &groups[gi].spline_ids {
                for &b_id in &groups[gj].spline_ids {
                    let a = network.spline(a_id);
                    let b = network.spline(b_id);
                    let a_ends = [a.start_point, a.end_point];
                    let b_ends = [b.start_point, b.end_point];

                    // Endpoint-to-endpoint.
                    for &pa in &a_ends {
                        for &pb in &b_ends {
                            if (pa - pb).length() <= GROUP_JUNCTION_RADIUS_M {
                                let p = (pa + pb) * 0.5;
                                stamps.push((gi, p));
                                stamps.push((gj, p));
                            }
                        }
                    }
                    // Endpoint onto the other spline's interior.
                    for (&pa, other) in
                        a_ends.iter().map(|p| (p, b_id)).chain(b_ends.iter().map(|p| (p, a_id)))
                    {
                        for cs in network.sections_of(other) {
                            if !cs.excluded
                                && (cs.center - pa).length() <= GROUP_JUNCTION_RADIUS_M
                            {
                                stamps.push((gi, pa));
                                stamps.push((gj, pa));
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    for (gidx, p) in stamps {
        let radius_px = group_radius_m(network, &groups[gidx]) / mpp;
        stamp_disk(&mut groups[gidx].mask, size, p.x / mpp, p.y / mpp, radius_px);
    }
}

/// Precomputed square kernel for Gaussian weighting.
fn gaussian_kernel(kernel_size: usize, sigma: f64) -> Vec<f64> {
    let half = (kernel_size / 2) as i64;
    let mut k = Vec::with_capacity(kernel_size * kernel_size);
    for dy in -half..=half {
        for dx in -half..=half {
            let d_sq = (dx * dx + dy * dy) as f64;
            k.push((-d_sq / (2.0 * sigma * sigma)).exp());
        }
    }
    k
}

#[allow(clippy::too_many_arguments)]
fn filtered_value(
    src: &[f32],
    size: usize,
    x: usize,
    y: usize,
    smoothing_type: SmoothingType,
    kernel_size: usize,
    kernel: &[f64],
    sigma: f64,
) -> f32 {
    let half = (kernel_size / 2) as i64;
    let center = src[y * size + x] as f64;
    let mut sum = 0.0f64;
    let mut weight = 0.0f64;

    for dy in -half..=half {
        for dx in -half..=half {
            let nx = x as i64 + dx;
            let ny = y as i64 + dy;
            if nx < 0 || ny < 0 || nx >= size as i64 || ny >= size as i64 {
                continue;
            }
            let v = src[ny as usize * size + nx as usize] as f64;
            let w = match smoothing_type {
                SmoothingType::Box => 1.0,
                SmoothingType::Gaussian => {
                    kernel[((dy + half) * (2 * half + 1) + (dx + half)) as usize]
                }
                SmoothingType::Bilateral => {
                    let spatial =
                        kernel[((dy + half) * (2 * half + 1) + (dx + half)) as usize];
                    let sigma_r = sigma / 2.0;
                    let dh = v - center;
                    spatial * (-(dh * dh) / (2.0 * sigma_r * sigma_r)).exp()
                }
            };
            sum += w * v;
            weight += w;
        }
    }

    if weight > 0.0 {
        (sum / weight) as f32
    } else {
        src[y * size + x]
    }
}

/// Run the grouped post-processing smoother over `heights` in place.
pub fn post_process_smoothing(heights: &mut HeightGrid, network: &RoadNetwork) -> SmoothStats {
    let size = heights.size;
    let mpp = heights.mpp;

    // Stable grouping: splines in id order, groups in first-seen order.
    let mut groups: Vec<Group> = Vec::new();
    for spline in &network.splines {
        if !spline.params.post_smoothing.enabled {
            continue;
        }
        let key = GroupKey::of(spline);
        match groups.iter_mut().find(|g| g.key == key) {
            Some(g) => g.spline_ids.push(spline.id),
            None => groups.push(Group {
                key,
                spline_ids: vec![spline.id],
                mask: vec![false; size * size],
            }),
        }
    }
    if groups.is_empty() {
        return SmoothStats::default();
    }

    build_group_masks(network, &mut groups, size, mpp);
    expand_masks_at_shared_junctions(network, &mut groups, size, mpp);

    let mut stats = SmoothStats {
        groups: groups.len(),
        smoothed_pixels: 0,
    };
    let mut already_smoothed = vec![false; size * size];

    for group in &mut groups {
        // First writer wins at junctions between groups.
        for (m, &done) in group.mask.iter_mut().zip(already_smoothed.iter()) {
            if done {
                *m = false;
            }
        }
        let active = group.mask.iter().filter(|&&m| m).count();
        if active == 0 {
            continue;
        }

        let first = network.spline(group.spline_ids[0]);
        let ps = first.params.post_smoothing;
        let kernel = gaussian_kernel(ps.kernel_size, ps.sigma);

        for _ in 0..ps.iterations {
            let src = heights.data.clone();
            let mask = &group.mask;
            heights
                .data
                .par_chunks_mut(size)
                .enumerate()
                .for_each(|(y, row)| {
                    for (x, out) in row.iter_mut().enumerate() {
                        if mask[y * size + x] {
                            *out = filtered_value(
                                &src,
                                size,
                                x,
                                y,
                                ps.smoothing_type,
                                ps.kernel_size,
                                &kernel,
                                ps.sigma,
                            );
                        }
                    }
                });
        }

        stats.smoothed_pixels += active as u64;
        for (done, &m) in already_smoothed.iter_mut().zip(group.mask.iter()) {
            *done |= m;
        }
    }

    info!(
        "post smoothing: {} group(s), {} pixel(s)",
        stats.groups, stats.smoothed_pixels
    );
    stats
}
