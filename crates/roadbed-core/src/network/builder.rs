//! Road network construction from raster masks and vector polylines.
//!
//! Raster materials run the full extraction chain (threshold → thinning →
//! path tracing → densify → simplify); vector materials enter at the
//! world-conversion step. Both end in the same spline and cross-section
//! materialization, so everything downstream sees one unified network.

use glam::DVec2;
use log::{debug, info};

use crate::error::{DeformError, Result};
use crate::grid::{ByteMask, HeightGrid};
use crate::morphology::thinning::BinaryRaster;
use crate::morphology::{simplify_rdp, thin_zhang_suen, trace_skeleton_paths};
use crate::params::RoadParams;
use crate::spline::SplineCurve;

use super::{CrossSection, RoadNetwork, RoadSpline};

/// Where a material's geometry comes from.
pub enum RoadSource {
    /// Binary layer mask; foreground is the painted road area.
    Mask(ByteMask),
    /// Already-resolved centerline polylines in terrain pixel coordinates.
    Polylines(Vec<Vec<DVec2>>),
}

/// One road material: a geometry source plus the parameter block every
/// spline extracted from it will carry.
pub struct RoadMaterial {
    pub name: String,
    pub source: RoadSource,
    /// Source category for vector materials (e.g. an OSM highway value).
    /// Ignored for raster materials, whose splines carry an empty tag.
    pub category: String,
    pub priority: i32,
    pub params: RoadParams,
}

/// Insert intermediate points so no two consecutive points are farther
/// apart than `max_spacing`.
fn densify(points: &[DVec2], max_spacing: f64) -> Vec<DVec2> {
    let mut out = Vec::with_capacity(points.len());
    for w in points.windows(2) {
        let (a, b) = (w[0], w[1]);
        out.push(a);
        let dist = (b - a).length();
        if dist > max_spacing {
            let extra = (dist / max_spacing).ceil() as usize;
            for k in 1..extra {
                out.push(a.lerp(b, k as f64 / extra as f64));
            }
        }
    }
    if let Some(&last) = points.last() {
        out.push(last);
    }
    out
}

/// Extract centreline polylines (pixel coordinates) from a raster mask.
fn extract_mask_polylines(mask: &ByteMask, params: &RoadParams) -> Vec<Vec<DVec2>> {
    let mut raster = BinaryRaster::from_threshold(&mask.data, mask.size, mask.size);
    thin_zhang_suen(&mut raster);
    let paths = trace_skeleton_paths(&raster, params.min_path_length_px.max(2));

    paths
        .into_iter()
        .filter_map(|path| {
            let pts: Vec<DVec2> = path
                .iter()
                .map(|&(x, y)| DVec2::new(x as f64, y as f64))
                .collect();
            let dense = densify(&pts, params.densify_max_spacing_px);
            let simple = simplify_rdp(&dense, params.simplify_tolerance_px);
            (simple.len() >= 2).then_some(simple)
        })
        .collect()
}

fn validate_polyline(poly: &[DVec2], material: &str, size: usize) -> Result<()> {
    if poly.len() < 2 {
        return Err(DeformError::DegeneratePolyline {
            material: material.to_string(),
            points: poly.len(),
        });
    }
    let bound = size as f64;
    for p in poly {
        if !p.x.is_finite() || !p.y.is_finite() || p.x < 0.0 || p.y < 0.0 || p.x >= bound || p.y >= bound {
            return Err(DeformError::PointOutOfBounds {
                material: material.to_string(),
                x: p.x,
                y: p.y,
                size,
            });
        }
    }
    Ok(())
}

/// Materialize one spline and its cross-sections from world-space control
/// points. Returns None for degenerate (zero-length) geometry.
fn materialize_spline(
    id: u32,
    material: &RoadMaterial,
    source_tag: String,
    control_points: Vec<DVec2>,
    grid: &HeightGrid,
    sections: &mut Vec<CrossSection>,
) -> Option<RoadSpline> {
    let params = &material.params;
    let curve = SplineCurve::fit(&control_points, params.spline_tension, params.spline_continuity);
    if curve.length() < params.cross_section_interval_m {
        debug!(
            "dropping zero-length spline candidate in material '{}' ({} control points)",
            material.name,
            control_points.len()
        );
        return None;
    }

    let section_start = sections.len();
    let world_extent = grid.size as f64 * grid.mpp;
    let samples = curve.sample_points_at_interval(params.cross_section_interval_m);
    for (k, s) in samples.iter().enumerate() {
        let in_bounds = s.point.x >= 0.0
            && s.point.y >= 0.0
            && s.point.x < world_extent
            && s.point.y < world_extent;
        sections.push(CrossSection {
            spline_id: id,
            local_index: k as u32,
            center: s.point,
            tangent: s.tangent,
            normal: s.normal,
            road_width_m: params.road_width_m,
            blend_range_m: params.terrain_affected_range_m,
            target_elevation: f64::NAN,
            original_elevation: f64::NAN,
            priority: material.priority,
            excluded: !in_bounds,
            banking: None,
        });
    }

    Some(RoadSpline {
        id,
        material_name: material.name.clone(),
        source_tag,
        priority: material.priority,
        total_length: curve.length(),
        start_point: curve.start_point(),
        end_point: curve.end_point(),
        control_points,
        curve,
        params: params.clone(),
        section_start,
        section_end: sections.len(),
    })
}

/// Build the unified network. Splines appear in stable material order;
/// cross-sections in (spline id, local_index) order. An all-empty result
/// is not an error: the pipeline treats it as a no-op.
pub fn build_network(materials: &[RoadMaterial], grid: &HeightGrid) -> Result<RoadNetwork> {
    let mut network = RoadNetwork::default();
    let mut next_id = 0u32;

    for material in materials {
        material.params.validate()?;

        let (polylines_px, source_tag) = match &material.source {
            RoadSource::Mask(mask) => {
                if mask.size != grid.size {
                    return Err(DeformError::MaskSizeMismatch {
                        material: material.name.clone(),
                        expected: grid.size,
                        found: mask.size,
                    });
                }
                (extract_mask_polylines(mask, &material.params), String::new())
            }
            RoadSource::Polylines(polys) => {
                for poly in polys {
                    validate_polyline(poly, &material.name, grid.size)?;
                }
                // The tag passes through verbatim; an empty tag opts the
                // material into the conservative raster interpolation policy.
                (polys.clone(), material.category.clone())
            }
        };

        let before = network.splines.len();
        for poly in polylines_px {
            let world: Vec<DVec2> = poly.iter().map(|&p| grid.px_to_world(p)).collect();
            if let Some(spline) = materialize_spline(
                next_id,
                material,
                source_tag.clone(),
                world,
                grid,
                &mut network.sections,
            ) {
                network.splines.push(spline);
                next_id += 1;
            }
        }
        debug!(
            "material '{}': {} spline(s), priority {}",
            material.name,
            network.splines.len() - before,
            material.priority
        );
    }

    info!(
        "road network: {} spline(s), {} cross-section(s)",
        network.splines.len(),
        network.sections.len()
    );
    Ok(network)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RoadParams;

    fn grid_256() -> HeightGrid {
        HeightGrid::new(256, 1.0, 10.0)
    }

    fn vector_material(name: &str, polys: Vec<Vec<DVec2>>) -> RoadMaterial {
        RoadMaterial {
            name: name.to_string(),
            source: RoadSource::Polylines(polys),
            category: "residential".to_string(),
            priority: 0,
            params: RoadParams::default(),
        }
    }

    #[test]
    fn vector_material_builds_one_spline() {
        let grid = grid_256();
        let mats = vec![vector_material(
            "asphalt",
            vec![vec![DVec2::new(32.0, 128.0), DVec2::new(224.0, 128.0)]],
        )];
        let net = build_network(&mats, &grid).unwrap();
        assert_eq!(net.splines.len(), 1);
        let s = &net.splines[0];
        assert!(s.is_vector_source());
        assert_eq!(s.source_tag, "residential");
        assert!((s.total_length - 192.0).abs() < 0.5, "length {}", s.total_length);

        let secs = net.sections_of(0);
        assert!(!secs.is_empty());
        for (i, cs) in secs.iter().enumerate() {
            assert_eq!(cs.local_index as usize, i);
            assert!(cs.target_elevation.is_nan());
        }
        // Horizontal line: tangent +X, normal +Y throughout.
        for cs in secs {
            assert!((cs.tangent - DVec2::X).length() < 1e-6);
            assert!((cs.normal - DVec2::Y).length() < 1e-6);
        }
    }

    #[test]
    fn raster_material_extracts_centerline() {
        let grid = grid_256();
        // A 5-px-thick horizontal bar through y = 128.
        let mask = ByteMask::from_fn(256, |x, y| (40..=216).contains(&x) && (126..=130).contains(&y));
        let mats = vec![RoadMaterial {
            name: "dirt".to_string(),
            source: RoadSource::Mask(mask),
            category: String::new(),
            priority: 0,
            params: RoadParams::default(),
        }];
        let net = build_network(&mats, &grid).unwrap();
        assert_eq!(net.splines.len(), 1, "one bar, one spline");
        let s = &net.splines[0];
        assert!(!s.is_vector_source());
        assert!(s.source_tag.is_empty());
        // Extracted centreline should run near y = 128 for most of its span.
        for cs in net.sections_of(0) {
            assert!(
                (cs.center.y - 128.0).abs() <= 2.5,
                "centreline strayed to {:?}",
                cs.center
            );
        }
    }

    #[test]
    fn mask_size_mismatch_is_fatal() {
        let grid = grid_256();
        let mats = vec![RoadMaterial {
            name: "bad".to_string(),
            source: RoadSource::Mask(ByteMask::new(128)),
            category: String::new(),
            priority: 0,
            params: RoadParams::default(),
        }];
        let err = build_network(&mats, &grid).unwrap_err();
        assert!(matches!(err, DeformError::MaskSizeMismatch { .. }));
    }

    #[test]
    fn short_polyline_is_fatal() {
        let grid = grid_256();
        let mats = vec![vector_material("stub", vec![vec![DVec2::new(5.0, 5.0)]])];
        assert!(build_network(&mats, &grid).is_err());
    }

    #[test]
    fn out_of_bounds_polyline_is_fatal() {
        let grid = grid_256();
        let mats = vec![vector_material(
            "oob",
            vec![vec![DVec2::new(0.0, 0.0), DVec2::new(300.0, 0.0)]],
        )];
        assert!(build_network(&mats, &grid).is_err());
    }

    #[test]
    fn empty_mask_gives_empty_network() {
        let grid = grid_256();
        let mats = vec![RoadMaterial {
            name: "blank".to_string(),
            source: RoadSource::Mask(ByteMask::new(256)),
            category: String::new(),
            priority: 0,
            params: RoadParams::default(),
        }];
        let net = build_network(&mats, &grid).unwrap();
        assert!(net.is_empty());
    }

    #[test]
    fn ids_are_stable_across_materials() {
        let grid = grid_256();
        let mats = vec![
            vector_material("a", vec![vec![DVec2::new(10.0, 10.0), DVec2::new(100.0, 10.0)]]),
            vector_material("b", vec![vec![DVec2::new(10.0, 50.0), DVec2::new(100.0, 50.0)]]),
        ];
        let net = build_network(&mats, &grid).unwrap();
        assert_eq!(net.splines.len(), 2);
        assert_eq!(net.splines[0].id, 0);
        assert_eq!(net.splines[1].id, 1);
        assert_eq!(net.splines[0].material_name, "a");
        // Flat list is contiguous per spline.
        assert_eq!(net.splines[0].section_end, net.splines[1].section_start);
    }
}
