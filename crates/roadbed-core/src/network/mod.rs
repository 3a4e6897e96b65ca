//! The unified road network: parameterized splines plus their materialized
//! cross-sections. Built once per run; later stages only ever mutate
//! cross-section target elevations.
pub mod builder;

use glam::DVec2;

use crate::params::RoadParams;
use crate::spline::SplineCurve;

pub use builder::{build_network, RoadMaterial, RoadSource};

/// Target elevations below this are treated as unset/garbage.
pub const MIN_VALID_ELEVATION: f64 = -1000.0;

/// Transverse tilt of a cross-section: elevation offsets applied at the
/// left and right road edges, interpolated linearly across the width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Banking {
    pub left_edge_m: f64,
    pub right_edge_m: f64,
}

/// A transverse slice of a road, centred on its spline.
#[derive(Debug, Clone)]
pub struct CrossSection {
    pub spline_id: u32,
    /// 0-based position along the owning spline, monotonic with arc length.
    pub local_index: u32,
    /// World metres.
    pub center: DVec2,
    /// Unit direction of travel.
    pub tangent: DVec2,
    /// Unit, tangent rotated +90°.
    pub normal: DVec2,
    /// Effective paved width, metres.
    pub road_width_m: f64,
    /// Effective blend range beyond the road edge, metres.
    pub blend_range_m: f64,
    /// NaN until the elevation pass runs; then finite and above
    /// [`MIN_VALID_ELEVATION`].
    pub target_elevation: f64,
    /// Terrain sample under the centre before deformation.
    pub original_elevation: f64,
    pub priority: i32,
    /// Excluded sections are ignored by ownership and elevation passes.
    pub excluded: bool,
    pub banking: Option<Banking>,
}

impl CrossSection {
    #[inline]
    pub fn half_width(&self) -> f64 {
        self.road_width_m / 2.0
    }

    #[inline]
    pub fn has_valid_target(&self) -> bool {
        self.target_elevation.is_finite() && self.target_elevation > MIN_VALID_ELEVATION
    }

    /// Target elevation at a world position near this section, applying the
    /// banking tilt across the width when present.
    pub fn elevation_at(&self, pos: DVec2) -> f64 {
        match self.banking {
            None => self.target_elevation,
            Some(b) => {
                let lateral = (pos - self.center).dot(self.normal);
                let frac = (lateral / self.half_width()).clamp(-1.0, 1.0);
                let offset = b.left_edge_m + (frac + 1.0) * 0.5 * (b.right_edge_m - b.left_edge_m);
                self.target_elevation + offset
            }
        }
    }
}

/// Per-pixel elevation over the trapezoid between two consecutive sections.
/// Projects onto the centre segment and applies the edge tilts linearly;
/// without banking this is the plain average of the two targets.
pub fn segment_elevation_at(a: &CrossSection, b: &CrossSection, pos: DVec2) -> f64 {
    if a.banking.is_none() && b.banking.is_none() {
        return (a.target_elevation + b.target_elevation) * 0.5;
    }

    let seg = b.center - a.center;
    let len_sq = seg.length_squared();
    let t = if len_sq > 1e-12 {
        ((pos - a.center).dot(seg) / len_sq).clamp(0.0, 1.0)
    } else {
        0.5
    };

    let base = a.target_elevation + t * (b.target_elevation - a.target_elevation);
    let normal = {
        let n = a.normal.lerp(b.normal, t);
        if n.length_squared() > 1e-12 {
            n.normalize()
        } else {
            a.normal
        }
    };
    let half = (a.half_width() + b.half_width()) * 0.5;
    if half < 1e-9 {
        return base;
    }

    let bank_a = a.banking.unwrap_or(Banking { left_edge_m: 0.0, right_edge_m: 0.0 });
    let bank_b = b.banking.unwrap_or(Banking { left_edge_m: 0.0, right_edge_m: 0.0 });
    let left = bank_a.left_edge_m + t * (bank_b.left_edge_m - bank_a.left_edge_m);
    let right = bank_a.right_edge_m + t * (bank_b.right_edge_m - bank_a.right_edge_m);

    let along = a.center + seg * t;
    let lateral = (pos - along).dot(normal);
    let frac = (lateral / half).clamp(-1.0, 1.0);
    base + left + (frac + 1.0) * 0.5 * (right - left)
}

/// A road spline with its parameter block and cross-section span.
#[derive(Debug, Clone)]
pub struct RoadSpline {
    pub id: u32,
    pub material_name: String,
    /// Empty for raster-derived splines, the source category for
    /// vector-derived ones. Selects the blend-zone interpolation policy.
    pub source_tag: String,
    pub priority: i32,
    pub params: RoadParams,
    /// World metres.
    pub control_points: Vec<DVec2>,
    pub curve: SplineCurve,
    pub total_length: f64,
    pub start_point: DVec2,
    pub end_point: DVec2,
    /// Contiguous span of this spline's sections in the network's flat list.
    pub section_start: usize,
    pub section_end: usize,
}

impl RoadSpline {
    #[inline]
    pub fn is_vector_source(&self) -> bool {
        !self.source_tag.is_empty()
    }

    #[inline]
    pub fn section_range(&self) -> std::ops::Range<usize> {
        self.section_start..self.section_end
    }
}

/// All splines of a run plus the flat, (spline, local_index)-ordered
/// cross-section list.
#[derive(Debug, Clone, Default)]
pub struct RoadNetwork {
    pub splines: Vec<RoadSpline>,
    pub sections: Vec<CrossSection>,
}

impl RoadNetwork {
    pub fn is_empty(&self) -> bool {
        self.splines.is_empty()
    }

    pub fn spline(&self, id: u32) -> &RoadSpline {
        &self.splines[id as usize]
    }

    pub fn sections_of(&self, id: u32) -> &[CrossSection] {
        let s = &self.splines[id as usize];
        &self.sections[s.section_start..s.section_end]
    }

    /// Largest half width across the network, metres.
    pub fn max_half_width(&self) -> f64 {
        self.splines
            .iter()
            .map(|s| s.params.half_width())
            .fold(0.0, f64::max)
    }

    /// Largest blend range across the network, metres.
    pub fn max_blend_range(&self) -> f64 {
        self.splines
            .iter()
            .map(|s| s.params.terrain_affected_range_m)
            .fold(0.0, f64::max)
    }

    /// Largest half width + blend range: the outer influence reach used by
    /// the early-reject test.
    pub fn max_influence_radius(&self) -> f64 {
        self.splines
            .iter()
            .map(|s| s.params.influence_radius())
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_section(center: DVec2, normal: DVec2, target: f64) -> CrossSection {
        CrossSection {
            spline_id: 0,
            local_index: 0,
            center,
            tangent: normal.perp() * -1.0,
            normal,
            road_width_m: 8.0,
            blend_range_m: 10.0,
            target_elevation: target,
            original_elevation: target,
            priority: 0,
            excluded: false,
            banking: None,
        }
    }

    #[test]
    fn elevation_without_banking_is_flat_across_width() {
        let cs = flat_section(DVec2::new(10.0, 10.0), DVec2::Y, 42.0);
        for lateral in [-4.0, -1.0, 0.0, 2.5, 4.0] {
            let pos = cs.center + cs.normal * lateral;
            assert_eq!(cs.elevation_at(pos), 42.0);
        }
    }

    #[test]
    fn banking_tilts_linearly_between_edges() {
        let mut cs = flat_section(DVec2::ZERO, DVec2::Y, 100.0);
        cs.banking = Some(Banking { left_edge_m: -1.0, right_edge_m: 1.0 });

        let left = cs.elevation_at(cs.center - cs.normal * cs.half_width());
        let mid = cs.elevation_at(cs.center);
        let right = cs.elevation_at(cs.center + cs.normal * cs.half_width());
        assert!((left - 99.0).abs() < 1e-9, "left edge: {left}");
        assert!((mid - 100.0).abs() < 1e-9, "centre: {mid}");
        assert!((right - 101.0).abs() < 1e-9, "right edge: {right}");
    }

    #[test]
    fn segment_elevation_defaults_to_average() {
        let a = flat_section(DVec2::new(0.0, 0.0), DVec2::Y, 10.0);
        let b = flat_section(DVec2::new(4.0, 0.0), DVec2::Y, 20.0);
        let e = segment_elevation_at(&a, &b, DVec2::new(1.0, 0.5));
        assert!((e - 15.0).abs() < 1e-9, "plain pairs average their targets, got {e}");
    }

    #[test]
    fn invalid_targets_are_detected() {
        let mut cs = flat_section(DVec2::ZERO, DVec2::Y, f64::NAN);
        assert!(!cs.has_valid_target());
        cs.target_elevation = -5000.0;
        assert!(!cs.has_valid_target());
        cs.target_elevation = 0.0;
        assert!(cs.has_valid_target());
    }
}
