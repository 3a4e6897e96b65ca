//! Protected blending of road target elevations into the terrain.
//!
//! Per owned pixel: core pixels pin to the target elevation; blend-zone
//! pixels transition toward the original terrain through the material's
//! blend function, clamped by the transverse side-slope cap; pixels inside
//! a higher-priority road's protection buffer take that road's elevation
//! instead. Data-parallel over rows; all inputs are read-only views.

use glam::DVec2;
use log::info;
use rayon::prelude::*;

use crate::elevmap::ElevationArtifacts;
use crate::grid::HeightGrid;
use crate::index::{ProtectionIndex, SplineSectionIndex};
use crate::network::RoadNetwork;

/// Height changes below this are not committed.
const COMMIT_THRESHOLD_M: f64 = 0.001;

#[derive(Debug, Default, Clone, Copy)]
pub struct BlendStats {
    pub core_pixels: u64,
    pub blended_pixels: u64,
    /// Pixels where the side-slope cap overrode the blend function.
    pub slope_capped_pixels: u64,
    /// Pixels taken by a higher-priority road's protection buffer.
    pub protected_pixels: u64,
    /// Malformed inputs skipped (NaN targets, missing sections).
    pub skipped_pixels: u64,
}

fn add(a: BlendStats, b: BlendStats) -> BlendStats {
    BlendStats {
        core_pixels: a.core_pixels + b.core_pixels,
        blended_pixels: a.blended_pixels + b.blended_pixels,
        slope_capped_pixels: a.slope_capped_pixels + b.slope_capped_pixels,
        protected_pixels: a.protected_pixels + b.protected_pixels,
        skipped_pixels: a.skipped_pixels + b.skipped_pixels,
    }
}

#[allow(clippy::too_many_arguments)]
fn blend_row(
    y: usize,
    row: &mut [f32],
    h0: &HeightGrid,
    network: &RoadNetwork,
    elevmap: &ElevationArtifacts,
    spline_index: &SplineSectionIndex,
    protection_index: &ProtectionIndex,
    distance_field: Option<&[f32]>,
    mpp: f64,
) -> BlendStats {
    let mut stats = BlendStats::default();
    let size = h0.size;
    let sections = &network.sections;

    for x in 0..size {
        let i = y * size + x;
        let owner_id = elevmap.owners[i];
        if owner_id < 0 {
            continue;
        }
        let target = elevmap.elevations[i] as f64;
        if !target.is_finite() {
            stats.skipped_pixels += 1;
            continue;
        }

        let owner = network.spline(owner_id as u32);
        let half = owner.params.half_width();
        // The rasterized core includes the edge buffer; pin the whole
        // protected polygon to the target so buffer rings are never
        // re-blended toward the terrain.
        let pinned = owner.params.protection_radius();
        let blend_range = elevmap.blend_ranges[i] as f64;
        let pos = DVec2::new(x as f64 * mpp, y as f64 * mpp);

        // Perpendicular distance to the owner's centreline, measured via
        // the nearest owner section's normal.
        let search = owner.params.influence_radius() + mpp * 2.0;
        let Some(cs_idx) =
            spline_index.find_nearest_for_spline(pos, owner_id as u32, search, sections)
        else {
            stats.skipped_pixels += 1;
            continue;
        };
        let cs = &sections[cs_idx as usize];
        if cs.normal.length_squared() < 0.5 {
            stats.skipped_pixels += 1;
            continue;
        }
        let d_owner = (pos - cs.center).dot(cs.normal).abs();
        let d_global = distance_field.map_or(d_owner, |df| df[i] as f64);
        let eff = d_owner.min(d_global);

        let original = h0.data[i] as f64;
        let new_height = if eff <= pinned {
            stats.core_pixels += 1;
            target
        } else if d_owner <= half + blend_range {
            // A higher-priority road whose protection buffer reaches this
            // pixel dictates the height outright.
            let mut protected: Option<f64> = None;
            for cand in protection_index.candidates(pos) {
                if cand.priority <= owner.priority {
                    continue;
                }
                if let Some(pi) = spline_index.find_nearest_for_spline(
                    pos,
                    cand.spline_id,
                    cand.protection_radius,
                    sections,
                ) {
                    let pcs = &sections[pi as usize];
                    let e = {
                        let banked = pcs.elevation_at(pos);
                        if banked.is_finite() {
                            banked
                        } else {
                            pcs.target_elevation
                        }
                    };
                    if e.is_finite() {
                        protected = Some(e);
                        break;
                    }
                }
            }

            match protected {
                Some(e) => {
                    stats.protected_pixels += 1;
                    e
                }
                None => {
                    let t = ((d_owner - half) / blend_range.max(1e-9)).clamp(0.0, 1.0);
                    let f = owner.params.blend_function.apply(t);
                    let blended = target * (1.0 - f) + original * f;

                    // Side-slope cap: never drop/rise faster than the
                    // transverse limit on the way back to the terrain.
                    let tan_side = owner.params.side_max_slope_deg.to_radians().tan();
                    let max_delta = (d_owner - half) * tan_side;
                    let delta = original - target;
                    if (blended - target).abs() <= max_delta + 1e-9 {
                        stats.blended_pixels += 1;
                        blended
                    } else {
                        stats.slope_capped_pixels += 1;
                        target + delta.signum() * delta.abs().min(max_delta)
                    }
                }
            }
        } else {
            continue;
        };

        if (new_height - row[x] as f64).abs() > COMMIT_THRESHOLD_M {
            row[x] = new_height as f32;
        }
    }

    stats
}

/// Apply the protected blend. `out` must start as a copy of `h0`.
pub fn apply_protected_blend(
    h0: &HeightGrid,
    network: &RoadNetwork,
    elevmap: &ElevationArtifacts,
    spline_index: &SplineSectionIndex,
    protection_index: &ProtectionIndex,
    distance_field: Option<&[f32]>,
    out: &mut HeightGrid,
) -> BlendStats {
    let size = h0.size;
    let stats = out
        .data
        .par_chunks_mut(size)
        .enumerate()
        .map(|(y, row)| {
            blend_row(
                y,
                row,
                h0,
                network,
                elevmap,
                spline_index,
                protection_index,
                distance_field,
                h0.mpp,
            )
        })
        .reduce(BlendStats::default, add);

    info!(
        "blend pass: {} core, {} blended, {} slope-capped, {} protected, {} skipped",
        stats.core_pixels,
        stats.blended_pixels,
        stats.slope_capped_pixels,
        stats.protected_pixels,
        stats.skipped_pixels
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elevmap::build_elevation_map;
    use crate::index::{ProtectionIndex, SectionIndex, SplineSectionIndex, DEFAULT_CELL_PX};
    use crate::network::{build_network, RoadMaterial, RoadSource};
    use crate::params::{BlendFunction, RoadParams};
    use crate::protect::build_protection;

    fn run_blend(grid: &HeightGrid, net: &RoadNetwork) -> (HeightGrid, BlendStats) {
        let size = grid.size;
        let prot = build_protection(net, size, grid.mpp);
        let idx = SectionIndex::build(net, DEFAULT_CELL_PX, grid.mpp);
        let sp_idx = SplineSectionIndex::build(net, DEFAULT_CELL_PX, grid.mpp);
        let prot_idx = ProtectionIndex::build(net, DEFAULT_CELL_PX, grid.mpp);
        let emap = build_elevation_map(net, &prot, &idx, None, size, grid.mpp);
        let mut out = grid.clone();
        let stats = apply_protected_blend(grid, net, &emap, &sp_idx, &prot_idx, None, &mut out);
        (out, stats)
    }

    fn flat_road(width: f64, blend: f64) -> RoadMaterial {
        RoadMaterial {
            name: "r".into(),
            source: RoadSource::Polylines(vec![vec![
                DVec2::new(32.0, 128.0),
                DVec2::new(224.0, 128.0),
            ]]),
            category: "residential".into(),
            priority: 0,
            params: RoadParams {
                road_width_m: width,
                terrain_affected_range_m: blend,
                road_edge_protection_buffer_m: 0.0,
                blend_function: BlendFunction::Cosine,
                ..RoadParams::default()
            },
        }
    }

    #[test]
    fn core_pins_blend_decays_outside_untouched() {
        // Tilted terrain, level road target.
        let grid = HeightGrid::from_fn(256, 1.0, |_x, y| 10.0 + 0.1 * y as f32);
        let mut net = build_network(&vec![flat_road(8.0, 10.0)], &grid).unwrap();
        let level = 10.0 + 0.1 * 128.0;
        for cs in &mut net.sections {
            cs.target_elevation = level as f64;
        }

        let (out, stats) = run_blend(&grid, &net);
        assert!(stats.core_pixels > 0);
        assert!(stats.blended_pixels > 0);

        for x in [64usize, 128, 200] {
            // Core: |y − 128| ≤ 4 ⇒ exactly the road level.
            for y in 125..=131 {
                let h = out.get(x, y);
                assert!(
                    (h - level).abs() < 1e-3,
                    "core pixel ({x},{y}) at {h}, want {level}"
                );
            }
            // Outside influence (> 14 m): identical to the original.
            for y in [100usize, 156] {
                assert_eq!(out.get(x, y), grid.get(x, y), "({x},{y}) must be untouched");
            }
            // Blend zone: between road level and terrain, monotonic in y
            // above the road.
            let mut prev = level;
            for y in 132..=142 {
                let h = out.get(x, y);
                let terrain = grid.get(x, y);
                assert!(
                    h >= prev - 1e-4 && h <= terrain + 1e-4,
                    "blend pixel ({x},{y}) = {h} not between road {prev} and terrain {terrain}"
                );
                prev = h;
            }
        }
    }

    #[test]
    fn side_slope_cap_limits_the_wall() {
        // Road target far below the terrain, narrow blend: the blend
        // function alone would cliff; the cap must hold the radial slope.
        let grid = HeightGrid::from_fn(256, 1.0, |_x, _y| 60.0);
        let mut road = flat_road(8.0, 6.0);
        road.params.side_max_slope_deg = 30.0;
        let mut net = build_network(&vec![road], &grid).unwrap();
        for cs in &mut net.sections {
            cs.target_elevation = 20.0;
        }

        let (out, stats) = run_blend(&grid, &net);
        assert!(stats.slope_capped_pixels > 0, "cap should engage on a 40 m wall");

        let tan_cap = 30.0f64.to_radians().tan();
        let x = 128usize;
        for y in 128..142 {
            let h_in = out.get(x, y) as f64;
            let h_out = out.get(x, y + 1) as f64;
            let slope = (h_out - h_in).abs() / 1.0;
            // Inside the blend annulus the radial slope stays capped; at
            // the outer edge the envelope meets the terrain in one visible
            // step (accepted behaviour for too-narrow blend ranges).
            let d_in = (y as f64 - 128.0).abs();
            let d_out = (y as f64 + 1.0 - 128.0).abs();
            if d_in > 4.0 && d_out <= 10.0 {
                assert!(
                    slope <= tan_cap + 1e-3,
                    "radial slope {slope:.3} at y={y} exceeds cap {tan_cap:.3}"
                );
            }
        }
    }

    #[test]
    fn buffer_ring_is_pinned_to_the_target() {
        // With an edge buffer, the whole rasterized protection polygon
        // stays at the road target instead of re-blending toward terrain.
        let grid = HeightGrid::from_fn(256, 1.0, |_x, _y| 30.0);
        let mut road = flat_road(8.0, 10.0);
        road.params.road_edge_protection_buffer_m = 2.0;
        let mut net = build_network(&vec![road], &grid).unwrap();
        for cs in &mut net.sections {
            cs.target_elevation = 25.0;
        }
        let (out, _) = run_blend(&grid, &net);
        // 4 m half width + 2 m buffer: y = 133 (5 m off axis) is pinned.
        let h = out.get(128, 133);
        assert!((h - 25.0).abs() < 1e-3, "buffer ring pixel at {h}, want 25");
    }

    #[test]
    fn higher_priority_protection_wins_inside_buffer() {
        // Narrow road A (priority 0) crossed T-style by road B (priority 1)
        // whose protection buffer overhangs A's blend zone near the
        // junction. Raster policy (empty tags) so A keeps owning pixels
        // that are marginally closer to its own sections.
        let grid = HeightGrid::from_fn(256, 1.0, |_x, _y| 30.0);
        let a = RoadMaterial {
            name: "a".into(),
            source: RoadSource::Polylines(vec![vec![
                DVec2::new(32.0, 128.0),
                DVec2::new(224.0, 128.0),
            ]]),
            category: String::new(),
            priority: 0,
            params: RoadParams {
                road_width_m: 2.0,
                terrain_affected_range_m: 10.0,
                road_edge_protection_buffer_m: 0.0,
                ..RoadParams::default()
            },
        };
        let b = RoadMaterial {
            name: "b".into(),
            source: RoadSource::Polylines(vec![vec![
                DVec2::new(128.0, 131.0),
                DVec2::new(128.0, 224.0),
            ]]),
            category: String::new(),
            priority: 1,
            params: RoadParams {
                road_width_m: 6.0,
                terrain_affected_range_m: 10.0,
                road_edge_protection_buffer_m: 2.0,
                ..RoadParams::default()
            },
        };
        let mut net = build_network(&vec![a, b], &grid).unwrap();
        let range_a = net.splines[0].section_range();
        for cs in &mut net.sections[range_a] {
            cs.target_elevation = 25.0;
        }
        let range_b = net.splines[1].section_range();
        for cs in &mut net.sections[range_b] {
            cs.target_elevation = 35.0;
        }

        let (out, stats) = run_blend(&grid, &net);
        assert!(
            stats.protected_pixels > 0,
            "B's buffer must claim pixels inside A's blend zone"
        );

        // Deep inside B's core.
        let h = out.get(128, 140);
        assert!((h - 35.0).abs() < 1e-3, "B core at (128,140) = {h}");

        // (130, 130): 2 m from A's centreline (A's blend zone, A-owned
        // because A's sections are nearer) but within 5 m of B's first
        // sections, so B's protection dictates 35 m.
        let h = out.get(130, 130);
        assert!(
            (h - 35.0).abs() < 1e-3,
            "pixel (130,130) inside B's buffer should take B's elevation, got {h}"
        );
    }
}
