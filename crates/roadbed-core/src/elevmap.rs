//! Per-pixel target elevation assignment.
//!
//! Core pixels copy straight from the protection builder. Blend-zone
//! pixels interpolate from nearby cross-sections with inverse-distance
//! weights under one of two policies: vector-derived splines blend across
//! everything in radius; raster-derived splines restrict to arc-length
//! neighbours (±2 local_index) of the nearest section, because
//! skeleton-derived normals are noisy and distant parts of the same spline
//! can be geometrically close (hairpins).

use glam::DVec2;
use log::info;
use rayon::prelude::*;

use crate::index::SectionIndex;
use crate::network::RoadNetwork;
use crate::protect::ProtectionArtifacts;

/// Candidate cap for the in-radius interpolation buffer. Pixels near very
/// dense networks simply use the nearest candidates that fit.
const MAX_CANDIDATES: usize = 96;

pub struct ElevationArtifacts {
    pub size: usize,
    /// Interpolated target elevation; NaN where unassigned.
    pub elevations: Vec<f32>,
    /// Owning spline id; −1 where unassigned.
    pub owners: Vec<i32>,
    /// Owner blend range, metres.
    pub blend_ranges: Vec<f32>,
    /// Distance to the owner's nearest section; the strictly-closer write guard.
    pub distances: Vec<f32>,
    pub early_rejected: u64,
    pub interpolated: u64,
}

/// Slack added to the early-reject threshold to absorb centreline
/// rasterization error and cross-section spacing, so skipping by the
/// distance field can never drop a pixel the exact path would keep.
fn early_reject_slack(network: &RoadNetwork, mpp: f64) -> f64 {
    let max_interval = network
        .splines
        .iter()
        .map(|s| s.params.cross_section_interval_m)
        .fold(0.0, f64::max);
    mpp + max_interval
}

struct RowOutput<'a> {
    elevations: &'a mut [f32],
    owners: &'a mut [i32],
    blend_ranges: &'a mut [f32],
    distances: &'a mut [f32],
}

struct RowCounters {
    early_rejected: u64,
    interpolated: u64,
}

#[allow(clippy::too_many_arguments)]
fn assign_row(
    y: usize,
    out: RowOutput<'_>,
    network: &RoadNetwork,
    index: &SectionIndex,
    distance_field: Option<&[f32]>,
    size: usize,
    mpp: f64,
    max_influence: f64,
    reject_threshold: f64,
) -> RowCounters {
    let mut counters = RowCounters {
        early_rejected: 0,
        interpolated: 0,
    };
    let sections = &network.sections;
    let mut buf = [0u32; MAX_CANDIDATES];

    for x in 0..size {
        // Core pixels were copied in the sequential pass.
        if out.distances[x] == 0.0 {
            continue;
        }

        if let Some(df) = distance_field {
            if df[y * size + x] as f64 > reject_threshold {
                counters.early_rejected += 1;
                continue;
            }
        }

        let pos = DVec2::new(x as f64 * mpp, y as f64 * mpp);
        let Some(nearest_idx) = index.find_nearest(pos, sections) else {
            continue;
        };
        let nearest = &sections[nearest_idx as usize];
        let nearest_spline = network.spline(nearest.spline_id);

        let (owner_idx, elevation) = if nearest_spline.is_vector_source() {
            // Vector policy: every section in radius, inverse-square
            // weights; the dominant owner is the highest-priority
            // candidate, ties broken by distance.
            let n = index.fill_within_radius(pos, max_influence, sections, &mut buf);
            if n == 0 {
                continue;
            }
            let mut wsum = 0.0f64;
            let mut esum = 0.0f64;
            let mut dominant: Option<(u32, i32, f64)> = None;
            for &ci in &buf[..n] {
                let cs = &sections[ci as usize];
                if !cs.has_valid_target() {
                    continue;
                }
                let e = {
                    let banked = cs.elevation_at(pos);
                    if banked.is_finite() {
                        banked
                    } else {
                        cs.target_elevation
                    }
                };
                let d_sq = (cs.center - pos).length_squared();
                let w = 1.0 / d_sq.max(0.01);
                wsum += w;
                esum += w * e;
                let better = match dominant {
                    None => true,
                    Some((_, pr, dd)) => cs.priority > pr || (cs.priority == pr && d_sq < dd),
                };
                if better {
                    dominant = Some((ci, cs.priority, d_sq));
                }
            }
            let Some((ci, _, _)) = dominant else { continue };
            if wsum <= 0.0 {
                continue;
            }
            (ci, esum / wsum)
        } else {
            // Raster policy: only arc-length neighbours of the nearest
            // section on the same spline.
            let lo = nearest_spline.section_start;
            let hi = nearest_spline.section_end;
            let center = nearest_idx as usize;
            let mut wsum = 0.0f64;
            let mut esum = 0.0f64;
            for ci in center.saturating_sub(2)..(center + 3).min(hi) {
                if ci < lo {
                    continue;
                }
                let cs = &sections[ci];
                if cs.excluded || !cs.has_valid_target() {
                    continue;
                }
                let e = {
                    let banked = cs.elevation_at(pos);
                    if banked.is_finite() {
                        banked
                    } else {
                        cs.target_elevation
                    }
                };
                let d_sq = (cs.center - pos).length_squared();
                let delta = (ci as i64 - center as i64).unsigned_abs() as f64;
                let w = (1.0 / (1.0 + delta)) * (1.0 / d_sq.max(0.01));
                wsum += w;
                esum += w * e;
            }
            if wsum <= 0.0 {
                continue;
            }
            (nearest_idx, esum / wsum)
        };

        let owner_cs = &sections[owner_idx as usize];
        let owner_spline = network.spline(owner_cs.spline_id);
        let nearest_distance = (owner_cs.center - pos).length();
        if nearest_distance > owner_spline.params.influence_radius() {
            continue;
        }

        // First writer wins only while strictly closer.
        if (nearest_distance as f32) < out.distances[x] {
            out.elevations[x] = elevation as f32;
            out.owners[x] = owner_cs.spline_id as i32;
            out.blend_ranges[x] = owner_spline.params.terrain_affected_range_m as f32;
            out.distances[x] = nearest_distance as f32;
            counters.interpolated += 1;
        }
    }

    counters
}

/// Build the per-pixel (elevation, owner, blend range, distance) map.
pub fn build_elevation_map(
    network: &RoadNetwork,
    protection: &ProtectionArtifacts,
    index: &SectionIndex,
    distance_field: Option<&[f32]>,
    size: usize,
    mpp: f64,
) -> ElevationArtifacts {
    let mut elevations = vec![f32::NAN; size * size];
    let mut owners = vec![-1i32; size * size];
    let mut blend_ranges = vec![0.0f32; size * size];
    let mut distances = vec![f32::INFINITY; size * size];

    // Core copy: protection pixels are authoritative and closest by
    // definition.
    for i in 0..size * size {
        if protection.mask[i] && protection.owner[i] >= 0 {
            elevations[i] = protection.elevation[i];
            owners[i] = protection.owner[i];
            blend_ranges[i] =
                network.spline(protection.owner[i] as u32).params.terrain_affected_range_m as f32;
            distances[i] = 0.0;
        }
    }

    let max_influence = network.max_half_width() + network.max_blend_range();
    let reject_threshold = max_influence + early_reject_slack(network, mpp);

    let (early_rejected, interpolated) = elevations
        .par_chunks_mut(size)
        .zip(owners.par_chunks_mut(size))
        .zip(blend_ranges.par_chunks_mut(size))
        .zip(distances.par_chunks_mut(size))
        .enumerate()
        .map(|(y, (((erow, orow), brow), drow))| {
            let c = assign_row(
                y,
                RowOutput {
                    elevations: erow,
                    owners: orow,
                    blend_ranges: brow,
                    distances: drow,
                },
                network,
                index,
                distance_field,
                size,
                mpp,
                max_influence,
                reject_threshold,
            );
            (c.early_rejected, c.interpolated)
        })
        .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

    info!(
        "elevation map: {interpolated} blend pixel(s) interpolated, {early_rejected} early-rejected"
    );

    ElevationArtifacts {
        size,
        elevations,
        owners,
        blend_ranges,
        distances,
        early_rejected,
        interpolated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::distance_field_m;
    use crate::grid::{ByteMask, HeightGrid};
    use crate::index::{SectionIndex, DEFAULT_CELL_PX};
    use crate::morphology::draw_line;
    use crate::network::{build_network, RoadMaterial, RoadSource};
    use crate::params::RoadParams;
    use crate::protect::build_protection;

    fn straight_network(category: &str) -> (HeightGrid, RoadNetwork) {
        let grid = HeightGrid::new(256, 1.0, 10.0);
        let mats = vec![RoadMaterial {
            name: "r".into(),
            source: RoadSource::Polylines(vec![vec![
                DVec2::new(32.0, 128.0),
                DVec2::new(224.0, 128.0),
            ]]),
            category: category.into(),
            priority: 0,
            params: RoadParams {
                road_width_m: 8.0,
                terrain_affected_range_m: 10.0,
                ..RoadParams::default()
            },
        }];
        let mut net = build_network(&mats, &grid).unwrap();
        for cs in &mut net.sections {
            cs.target_elevation = 50.0;
        }
        (grid, net)
    }

    fn centerline_field(net: &RoadNetwork, size: usize, mpp: f64) -> Vec<f32> {
        let mut mask = ByteMask::new(size);
        for spline in &net.splines {
            let secs = &net.sections[spline.section_range()];
            for pair in secs.windows(2) {
                let a = pair[0].center / mpp;
                let b = pair[1].center / mpp;
                draw_line(
                    &mut mask,
                    a.x.round() as i64,
                    a.y.round() as i64,
                    b.x.round() as i64,
                    b.y.round() as i64,
                );
            }
        }
        distance_field_m(&mask, mpp).unwrap()
    }

    #[test]
    fn core_pixels_copy_protection_values() {
        let (_grid, net) = straight_network("residential");
        let prot = build_protection(&net, 256, 1.0);
        let idx = SectionIndex::build(&net, DEFAULT_CELL_PX, 1.0);
        let art = build_elevation_map(&net, &prot, &idx, None, 256, 1.0);

        let i = 128 * 256 + 128;
        assert_eq!(art.owners[i], 0);
        assert_eq!(art.distances[i], 0.0);
        assert!((art.elevations[i] - 50.0).abs() < 1e-4);
    }

    #[test]
    fn blend_zone_pixels_get_owner_and_elevation() {
        let (_grid, net) = straight_network("residential");
        let prot = build_protection(&net, 256, 1.0);
        let idx = SectionIndex::build(&net, DEFAULT_CELL_PX, 1.0);
        let art = build_elevation_map(&net, &prot, &idx, None, 256, 1.0);

        // 8 m off axis: outside the 4 m core + 0.5 buffer, inside 14 m reach.
        let i = 136 * 256 + 128;
        assert_eq!(art.owners[i], 0);
        assert!(art.distances[i] > 0.0 && art.distances[i] <= 14.0);
        assert!(
            (art.elevations[i] - 50.0).abs() < 0.5,
            "uniform targets must interpolate to themselves, got {}",
            art.elevations[i]
        );
    }

    #[test]
    fn pixels_beyond_influence_stay_unassigned() {
        let (_grid, net) = straight_network("residential");
        let prot = build_protection(&net, 256, 1.0);
        let idx = SectionIndex::build(&net, DEFAULT_CELL_PX, 1.0);
        let art = build_elevation_map(&net, &prot, &idx, None, 256, 1.0);

        let i = 160 * 256 + 128; // 32 m off axis
        assert_eq!(art.owners[i], -1);
        assert!(art.elevations[i].is_nan());
    }

    #[test]
    fn distance_field_changes_nothing_but_speed() {
        for category in ["residential", ""] {
            let (_grid, net) = straight_network(category);
            let prot = build_protection(&net, 256, 1.0);
            let idx = SectionIndex::build(&net, DEFAULT_CELL_PX, 1.0);

            let df = centerline_field(&net, 256, 1.0);
            let with = build_elevation_map(&net, &prot, &idx, Some(&df), 256, 1.0);
            let without = build_elevation_map(&net, &prot, &idx, None, 256, 1.0);

            assert!(with.early_rejected > 0, "the field must actually reject pixels");
            for i in 0..with.elevations.len() {
                let (a, b) = (with.elevations[i], without.elevations[i]);
                assert!(
                    (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits(),
                    "pixel {i} differs with the distance field: {a} vs {b} (category '{category}')"
                );
                assert_eq!(with.owners[i], without.owners[i], "owner differs at {i}");
            }
        }
    }

    #[test]
    fn raster_policy_keeps_hairpin_legs_independent() {
        // A tight U: two parallel legs 12 m apart, connected at the right.
        // Raster-derived (empty tag), so interpolation must stay within
        // ±2 local indices of the nearest section: a pixel near the lower
        // leg must not see the upper leg's elevations.
        let grid = HeightGrid::new(256, 1.0, 10.0);
        let mats = vec![RoadMaterial {
            name: "u".into(),
            source: RoadSource::Polylines(vec![vec![
                DVec2::new(40.0, 100.0),
                DVec2::new(180.0, 100.0),
                DVec2::new(190.0, 106.0),
                DVec2::new(180.0, 112.0),
                DVec2::new(40.0, 112.0),
            ]]),
            category: String::new(), // forced raster policy
            priority: 0,
            params: RoadParams {
                road_width_m: 4.0,
                terrain_affected_range_m: 5.0,
                ..RoadParams::default()
            },
        }];
        let mut net = build_network(&mats, &grid).unwrap();
        // Lower leg at 20 m, upper leg at 80 m, ramp in between.
        for cs in &mut net.sections {
            let t = (cs.center.y - 100.0) / 12.0;
            cs.target_elevation = 20.0 + t.clamp(0.0, 1.0) * 60.0;
        }

        let prot = build_protection(&net, 256, 1.0);
        let idx = SectionIndex::build(&net, DEFAULT_CELL_PX, 1.0);
        let art = build_elevation_map(&net, &prot, &idx, None, 256, 1.0);

        // A pixel just under the lower leg: its elevation must track the
        // lower leg (≈20 m), not average in the 80 m upper leg.
        let i = 97 * 256 + 100;
        assert!(art.owners[i] >= 0, "pixel should be in the lower leg's blend zone");
        assert!(
            art.elevations[i] < 30.0,
            "upper leg bled across the hairpin: {}",
            art.elevations[i]
        );
    }
}
