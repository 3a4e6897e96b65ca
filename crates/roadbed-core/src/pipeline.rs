//! Pipeline orchestrator: runs all deformation stages in order.
//!
//! Stages are sequential; parallelism lives inside the pixel passes. Each
//! stage consumes read-only artifacts from earlier stages and produces its
//! own; the orchestrator owns every artifact and drops it after its last
//! consumer.

use std::time::Instant;

use log::{debug, info};

use crate::blend::{apply_protected_blend, BlendStats};
use crate::distance::distance_field_m;
use crate::elevation::{compute_target_elevations, ElevationStats};
use crate::elevmap::build_elevation_map;
use crate::error::{check_terrain_size, Result};
use crate::grid::{ByteMask, HeightGrid};
use crate::index::{ProtectionIndex, SectionIndex, SplineSectionIndex, DEFAULT_CELL_PX};
use crate::junction::{detect_junctions, harmonize_junctions, Junction, JunctionGlobals};
use crate::morphology::draw_line;
use crate::network::{build_network, RoadMaterial, RoadNetwork};
use crate::protect::build_protection;
use crate::smooth::{post_process_smoothing, SmoothStats};
use crate::validate::{fix_presave_anomalies, PresaveReport};

/// Pipeline-level configuration. Everything per-road lives in
/// [`crate::params::RoadParams`].
#[derive(Debug, Clone)]
pub struct DeformConfig {
    /// Ceiling of the height encoding, metres. The pre-save validator
    /// repairs cells at or above this.
    pub max_height_m: f32,
    /// Fallback fill for cells with no usable neighbourhood or median.
    pub presave_default_m: f32,
    /// Build a centreline distance field for early rejection and
    /// diagnostics. Disabling changes nothing but speed.
    pub use_distance_field: bool,
    pub junction_globals: JunctionGlobals,
}

impl Default for DeformConfig {
    fn default() -> Self {
        Self {
            max_height_m: 1024.0,
            presave_default_m: 0.23,
            use_distance_field: true,
            junction_globals: JunctionGlobals::default(),
        }
    }
}

/// Counters surfaced to the caller; every recovered anomaly ends up here.
#[derive(Debug, Default, Clone)]
pub struct DeformStats {
    pub splines: usize,
    pub sections: usize,
    pub junctions: usize,
    pub harmonized_sections: usize,
    pub elevation: ElevationStats,
    pub protection_core_pixels: usize,
    pub protection_overwrites: u64,
    pub elevmap_interpolated: u64,
    pub elevmap_early_rejected: u64,
    pub blend: BlendStats,
    pub smoothing: SmoothStats,
    pub presave: PresaveReport,
    pub elapsed_ms: u64,
}

/// Full output of one deformation run. Diagnostic layers are kept so
/// callers can render debug overlays.
#[derive(Debug)]
pub struct DeformResult {
    pub heightmap: HeightGrid,
    pub network: RoadNetwork,
    pub junctions: Vec<Junction>,
    /// Union of all road cores (plus buffers).
    pub protection_mask: Vec<bool>,
    /// Owning spline id per pixel; −1 where unowned.
    pub ownership: Vec<i32>,
    /// Metres to the nearest road centreline, when enabled.
    pub distance_field: Option<Vec<f32>>,
    pub stats: DeformStats,
}

/// Rasterize every spline's centreline (section centre to section centre)
/// into a binary mask for the distance field.
fn rasterize_centerlines(network: &RoadNetwork, size: usize, mpp: f64) -> ByteMask {
    let mut mask = ByteMask::new(size);
    for spline in &network.splines {
        let secs = &network.sections[spline.section_range()];
        for pair in secs.windows(2) {
            if pair[0].excluded || pair[1].excluded {
                continue;
            }
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
    mask
}

/// Run the full road-aware deformation over `h0`.
///
/// Stage order:
///   1. Network build (raster extraction / vector conversion)
///   2. Centreline distance field
///   3. Target elevation profiles
///   4. Junction detection + harmonization
///   5. Spatial indices
///   6. Protection mask & ownership
///   7. Per-pixel elevation map
///   8. Protected blend
///   9. Post-processing smoothing
///  10. Pre-save repair
pub fn deform_heightmap(
    h0: &HeightGrid,
    materials: &[RoadMaterial],
    config: &DeformConfig,
) -> Result<DeformResult> {
    check_terrain_size(h0.size)?;
    let started = Instant::now();
    let size = h0.size;
    let mpp = h0.mpp;

    let mut network = build_network(materials, h0)?;
    if network.is_empty() {
        info!("no splines extracted from any material; returning the terrain unchanged");
        return Ok(DeformResult {
            heightmap: h0.clone(),
            network,
            junctions: Vec::new(),
            protection_mask: vec![false; size * size],
            ownership: vec![-1; size * size],
            distance_field: None,
            stats: DeformStats::default(),
        });
    }

    let distance_field = if config.use_distance_field {
        let mask = rasterize_centerlines(&network, size, mpp);
        Some(distance_field_m(&mask, mpp)?)
    } else {
        None
    };
    debug!("distance field: {}", if distance_field.is_some() { "built" } else { "skipped" });

    let elevation_stats = compute_target_elevations(&mut network, h0);

    let junctions = detect_junctions(&network, &config.junction_globals);
    let harmonized = harmonize_junctions(&mut network, &junctions, &config.junction_globals);

    // Index cells must cover the widest influence reach so the 3×3
    // nearest-section search cannot miss.
    let cell_px = DEFAULT_CELL_PX.max((network.max_influence_radius() / mpp).ceil());
    let section_index = SectionIndex::build(&network, cell_px, mpp);
    let spline_index = SplineSectionIndex::build(&network, cell_px, mpp);
    let protection_index = ProtectionIndex::build(&network, cell_px, mpp);

    let protection = build_protection(&network, size, mpp);

    let elevmap = build_elevation_map(
        &network,
        &protection,
        &section_index,
        distance_field.as_deref(),
        size,
        mpp,
    );

    let mut heightmap = h0.clone();
    let blend_stats = apply_protected_blend(
        h0,
        &network,
        &elevmap,
        &spline_index,
        &protection_index,
        distance_field.as_deref(),
        &mut heightmap,
    );

    let smoothing = post_process_smoothing(&mut heightmap, &network);

    let presave = fix_presave_anomalies(&mut heightmap, config.max_height_m, config.presave_default_m);

    let stats = DeformStats {
        splines: network.splines.len(),
        sections: network.sections.len(),
        junctions: junctions.len(),
        harmonized_sections: harmonized,
        elevation: elevation_stats,
        protection_core_pixels: protection.core_pixels,
        protection_overwrites: protection.overwrites,
        elevmap_interpolated: elevmap.interpolated,
        elevmap_early_rejected: elevmap.early_rejected,
        blend: blend_stats,
        smoothing,
        presave,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        "deformation finished: {} spline(s), {} core / {} blended pixel(s), {} ms",
        stats.splines, stats.blend.core_pixels, stats.blend.blended_pixels, stats.elapsed_ms
    );

    Ok(DeformResult {
        heightmap,
        network,
        junctions,
        protection_mask: protection.mask,
        ownership: protection.owner,
        distance_field,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeformError;
    use crate::network::RoadSource;
    use crate::params::RoadParams;
    use glam::DVec2;

    fn tilted_grid() -> HeightGrid {
        HeightGrid::from_fn(256, 1.0, |_x, y| 10.0 + 0.1 * y as f32)
    }

    fn straight_material(width: f64, blend: f64, priority: i32) -> RoadMaterial {
        RoadMaterial {
            name: "road".into(),
            source: RoadSource::Polylines(vec![vec![
                DVec2::new(32.0, 128.0),
                DVec2::new(224.0, 128.0),
            ]]),
            category: "residential".into(),
            priority,
            params: RoadParams {
                road_width_m: width,
                terrain_affected_range_m: blend,
                road_edge_protection_buffer_m: 0.0,
                ..RoadParams::default()
            },
        }
    }

    #[test]
    fn unsupported_size_fails_before_running() {
        let grid = HeightGrid::new(100, 1.0, 0.0);
        let err = deform_heightmap(&grid, &[], &DeformConfig::default()).unwrap_err();
        assert!(matches!(err, DeformError::UnsupportedSize(100)));
    }

    #[test]
    fn empty_network_is_a_no_op() {
        let grid = tilted_grid();
        let result = deform_heightmap(&grid, &[], &DeformConfig::default()).unwrap();
        assert_eq!(result.heightmap.data, grid.data);
        assert_eq!(result.stats.splines, 0);
        assert!(result.junctions.is_empty());
    }

    /// Straight road over a south–north tilt: the road levels at the
    /// centreline height, the tilt survives outside the influence band,
    /// and the blend annulus respects the side-slope cap.
    #[test]
    fn straight_road_on_a_tilt() {
        let grid = tilted_grid();
        let level = 10.0 + 0.1 * 128.0;
        let result =
            deform_heightmap(&grid, &[straight_material(8.0, 10.0, 0)], &DeformConfig::default())
                .unwrap();
        let out = &result.heightmap;

        let tan_side = 30.0f64.to_radians().tan();
        for x in (40..=216).step_by(8) {
            for y in 125..=131 {
                let h = out.get(x, y);
                assert!(
                    (h - level).abs() <= 1e-3,
                    "core pixel ({x},{y}) = {h}, want {level}"
                );
            }
            for y in [100usize, 112, 144, 156] {
                assert_eq!(
                    out.get(x, y),
                    grid.get(x, y),
                    "({x},{y}) outside the 14 m band must be untouched"
                );
            }
            for y in 128..145 {
                let slope = (out.get(x, y + 1) as f64 - out.get(x, y) as f64).abs();
                assert!(
                    slope <= tan_side + 1e-3,
                    "radial slope {slope:.4} at ({x},{y}) exceeds the side cap"
                );
            }
        }
    }

    /// Two crossing roads with distinct priorities: the higher priority
    /// owns the shared pixels and keeps its own profile through the
    /// intersection.
    #[test]
    fn crossing_priorities_are_deterministic() {
        let grid = tilted_grid();
        let mut a = straight_material(8.0, 10.0, 0);
        a.params.junctions.enabled = false;
        let mut b = RoadMaterial {
            name: "major".into(),
            source: RoadSource::Polylines(vec![vec![
                DVec2::new(128.0, 32.0),
                DVec2::new(128.0, 224.0),
            ]]),
            category: "primary".into(),
            priority: 1,
            params: RoadParams {
                road_width_m: 6.0,
                terrain_affected_range_m: 10.0,
                road_edge_protection_buffer_m: 0.0,
                junctions: crate::params::JunctionSettings {
                    enabled: false,
                    ..Default::default()
                },
                ..RoadParams::default()
            },
        };
        b.params.road_max_slope_deg = 45.0; // keep the 0.1 tilt profile as-is

        let result = deform_heightmap(&grid, &[a, b], &DeformConfig::default()).unwrap();

        // Intersection core is owned by B (id 1).
        let own = |x: usize, y: usize| result.ownership[y * 256 + x];
        assert_eq!(own(128, 128), 1, "intersection centre must belong to the major road");
        assert_eq!(own(64, 128), 0);
        assert_eq!(own(128, 64), 1);
        assert!(result.stats.protection_overwrites > 0);

        // B keeps its longitudinal profile through the crossing: its
        // target follows the tilt, so at y = 136 the core sits near the
        // terrain height there, not at A's level.
        let b_level = 10.0 + 0.1 * 136.0;
        let h = result.heightmap.get(128, 136);
        assert!(
            (h - b_level).abs() < 0.2,
            "B's core at (128,136) = {h}, want ≈ {b_level}"
        );
    }

    /// A raster mask road goes through the whole pipeline: extraction,
    /// elevation, blending.
    #[test]
    fn raster_mask_end_to_end() {
        let grid = tilted_grid();
        let mask = ByteMask::from_fn(256, |x, y| {
            (48..=208).contains(&x) && (126..=130).contains(&y)
        });
        let material = RoadMaterial {
            name: "gravel".into(),
            source: RoadSource::Mask(mask),
            category: String::new(),
            priority: 0,
            params: RoadParams {
                road_width_m: 6.0,
                terrain_affected_range_m: 8.0,
                ..RoadParams::default()
            },
        };
        let result = deform_heightmap(&grid, &[material], &DeformConfig::default()).unwrap();
        assert_eq!(result.stats.splines, 1);
        assert!(result.stats.blend.core_pixels > 0);

        // Mid-road pixels settle near the centreline terrain height.
        let level = 10.0 + 0.1 * 128.0;
        for x in (80..=176).step_by(16) {
            let h = result.heightmap.get(x, 128);
            assert!(
                (h - level).abs() < 0.5,
                "raster road centre at ({x},128) = {h}, want ≈ {level}"
            );
        }
    }

    /// The distance field is a pure accelerator: outputs are bit-identical
    /// with and without it.
    #[test]
    fn distance_field_does_not_change_the_result() {
        let grid = tilted_grid();
        let with_field = deform_heightmap(
            &grid,
            &[straight_material(8.0, 10.0, 0)],
            &DeformConfig::default(),
        )
        .unwrap();
        let without_field = deform_heightmap(
            &grid,
            &[straight_material(8.0, 10.0, 0)],
            &DeformConfig {
                use_distance_field: false,
                ..DeformConfig::default()
            },
        )
        .unwrap();

        assert!(with_field.stats.elevmap_early_rejected > 0);
        for i in 0..with_field.heightmap.data.len() {
            assert_eq!(
                with_field.heightmap.data[i].to_bits(),
                without_field.heightmap.data[i].to_bits(),
                "pixel {i} differs"
            );
        }
    }

    /// Final output postconditions: no NaN, no negatives, nothing at or
    /// above the height ceiling.
    #[test]
    fn output_is_always_presave_clean() {
        let grid = tilted_grid();
        let result =
            deform_heightmap(&grid, &[straight_material(8.0, 12.0, 0)], &DeformConfig::default())
                .unwrap();
        for &v in &result.heightmap.data {
            assert!(v.is_finite() && v >= 0.0 && v < 1024.0);
        }
    }
}
