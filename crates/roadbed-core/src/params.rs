use serde::{Deserialize, Serialize};

use crate::error::{DeformError, Result};

/// Shape of the core→terrain transition across the blend zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BlendFunction {
    Linear,
    #[default]
    Cosine,
    /// Smoothstep.
    Cubic,
    /// Smootherstep.
    Quintic,
}

impl BlendFunction {
    /// Evaluate the transition at t ∈ [0, 1]; 0 = road target, 1 = terrain.
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            BlendFunction::Linear => t,
            BlendFunction::Cosine => 0.5 - 0.5 * (t * std::f64::consts::PI).cos(),
            BlendFunction::Cubic => t * t * (3.0 - 2.0 * t),
            BlendFunction::Quintic => t * t * t * (t * (t * 6.0 - 15.0) + 10.0),
        }
    }
}

/// 2D filter applied by the post-processing smoother.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SmoothingType {
    #[default]
    Gaussian,
    Box,
    Bilateral,
}

/// Post-processing smoothing block, grouped per identical tuple across
/// splines before application.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostSmoothing {
    pub enabled: bool,
    pub smoothing_type: SmoothingType,
    /// Odd, ≥ 3.
    pub kernel_size: usize,
    pub sigma: f64,
    /// Extension of the smoothed region beyond the road half width, metres.
    pub mask_extension_m: f64,
    /// 1–8 rounds.
    pub iterations: u32,
}

impl Default for PostSmoothing {
    fn default() -> Self {
        Self {
            enabled: false,
            smoothing_type: SmoothingType::Gaussian,
            kernel_size: 5,
            sigma: 1.5,
            mask_extension_m: 2.0,
            iterations: 1,
        }
    }
}

/// Junction harmonization block. When `use_global_settings` is set, the
/// pipeline-level radii override the per-material ones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JunctionSettings {
    pub enabled: bool,
    pub use_global_settings: bool,
    pub detection_radius_m: f64,
    pub blend_distance_m: f64,
}

impl Default for JunctionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            use_global_settings: false,
            detection_radius_m: 10.0,
            blend_distance_m: 30.0,
        }
    }
}

/// Per-spline parameter block. One instance per road material; every spline
/// extracted from that material carries a copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoadParams {
    /// Full paved width, metres. ≥ 1.
    pub road_width_m: f64,
    /// Blend distance beyond the road edge, metres. ≥ 0.
    pub terrain_affected_range_m: f64,
    /// Arc-length step between cross-sections, metres. > 0; ≤ mpp/2 recommended.
    pub cross_section_interval_m: f64,
    /// Longitudinal slope cap, degrees, (0, 45].
    pub road_max_slope_deg: f64,
    /// Transverse slope cap, degrees, (0, 89).
    pub side_max_slope_deg: f64,
    /// Extra protected margin outside the road edge, metres. ≥ 0.
    pub road_edge_protection_buffer_m: f64,
    pub blend_function: BlendFunction,
    /// 1D low-pass window over cross-section elevations. Odd, ≥ 1.
    pub smoothing_window_size: usize,
    /// Zero-phase Butterworth instead of the prefix-sum box filter.
    pub use_butterworth_filter: bool,
    /// Butterworth order, 1–8.
    pub butterworth_filter_order: u32,
    /// Lerp of each target elevation toward the network mean, [0, 1].
    pub global_leveling_strength: f64,
    /// Spline corner tightness, [0, 1].
    pub spline_tension: f64,
    /// Spline corner continuity, [−1, 1].
    pub spline_continuity: f64,
    /// Raster extraction: max spacing between traced points, pixels.
    pub densify_max_spacing_px: f64,
    /// Raster extraction: RDP tolerance, pixels.
    pub simplify_tolerance_px: f64,
    /// Raster extraction: skeleton paths shorter than this are dropped.
    pub min_path_length_px: usize,
    pub post_smoothing: PostSmoothing,
    pub junctions: JunctionSettings,
}

impl Default for RoadParams {
    fn default() -> Self {
        Self {
            road_width_m: 6.0,
            terrain_affected_range_m: 8.0,
            cross_section_interval_m: 0.5,
            road_max_slope_deg: 8.0,
            side_max_slope_deg: 30.0,
            road_edge_protection_buffer_m: 0.5,
            blend_function: BlendFunction::Cosine,
            smoothing_window_size: 5,
            use_butterworth_filter: false,
            butterworth_filter_order: 2,
            global_leveling_strength: 0.0,
            spline_tension: 0.0,
            spline_continuity: 0.0,
            densify_max_spacing_px: 2.0,
            simplify_tolerance_px: 1.5,
            min_path_length_px: 10,
            post_smoothing: PostSmoothing::default(),
            junctions: JunctionSettings::default(),
        }
    }
}

impl RoadParams {
    #[inline]
    pub fn half_width(&self) -> f64 {
        self.road_width_m / 2.0
    }

    /// Radius of the protected region around the centreline: half width
    /// plus the edge buffer.
    #[inline]
    pub fn protection_radius(&self) -> f64 {
        self.half_width() + self.road_edge_protection_buffer_m
    }

    /// Outer influence radius: half width plus blend range.
    #[inline]
    pub fn influence_radius(&self) -> f64 {
        self.half_width() + self.terrain_affected_range_m
    }

    pub fn validate(&self) -> Result<()> {
        fn check(ok: bool, name: &'static str, value: f64, constraint: &'static str) -> Result<()> {
            if ok {
                Ok(())
            } else {
                Err(DeformError::InvalidParameter { name, value, constraint })
            }
        }

        check(self.road_width_m >= 1.0, "road_width_m", self.road_width_m, ">= 1.0")?;
        check(
            self.terrain_affected_range_m >= 0.0,
            "terrain_affected_range_m",
            self.terrain_affected_range_m,
            ">= 0.0",
        )?;
        check(
            self.cross_section_interval_m > 0.0,
            "cross_section_interval_m",
            self.cross_section_interval_m,
            "> 0.0",
        )?;
        check(
            self.road_max_slope_deg > 0.0 && self.road_max_slope_deg <= 45.0,
            "road_max_slope_deg",
            self.road_max_slope_deg,
            "in (0, 45]",
        )?;
        check(
            self.side_max_slope_deg > 0.0 && self.side_max_slope_deg < 89.0,
            "side_max_slope_deg",
            self.side_max_slope_deg,
            "in (0, 89)",
        )?;
        check(
            self.road_edge_protection_buffer_m >= 0.0,
            "road_edge_protection_buffer_m",
            self.road_edge_protection_buffer_m,
            ">= 0.0",
        )?;
        check(
            self.smoothing_window_size >= 1 && self.smoothing_window_size % 2 == 1,
            "smoothing_window_size",
            self.smoothing_window_size as f64,
            "odd, >= 1",
        )?;
        check(
            (1..=8).contains(&self.butterworth_filter_order),
            "butterworth_filter_order",
            self.butterworth_filter_order as f64,
            "in [1, 8]",
        )?;
        check(
            (0.0..=1.0).contains(&self.global_leveling_strength),
            "global_leveling_strength",
            self.global_leveling_strength,
            "in [0, 1]",
        )?;
        check(
            (0.0..=1.0).contains(&self.spline_tension),
            "spline_tension",
            self.spline_tension,
            "in [0, 1]",
        )?;
        check(
            (-1.0..=1.0).contains(&self.spline_continuity),
            "spline_continuity",
            self.spline_continuity,
            "in [-1, 1]",
        )?;
        check(
            self.densify_max_spacing_px > 0.0,
            "densify_max_spacing_px",
            self.densify_max_spacing_px,
            "> 0.0",
        )?;
        check(
            self.simplify_tolerance_px >= 0.0,
            "simplify_tolerance_px",
            self.simplify_tolerance_px,
            ">= 0.0",
        )?;

        let ps = &self.post_smoothing;
        check(
            ps.kernel_size >= 3 && ps.kernel_size % 2 == 1,
            "post_smoothing.kernel_size",
            ps.kernel_size as f64,
            "odd, >= 3",
        )?;
        check(ps.sigma > 0.0, "post_smoothing.sigma", ps.sigma, "> 0.0")?;
        check(
            ps.mask_extension_m >= 0.0,
            "post_smoothing.mask_extension_m",
            ps.mask_extension_m,
            ">= 0.0",
        )?;
        check(
            (1..=8).contains(&ps.iterations),
            "post_smoothing.iterations",
            ps.iterations as f64,
            "in [1, 8]",
        )?;

        let j = &self.junctions;
        check(
            j.detection_radius_m >= 0.0,
            "junctions.detection_radius_m",
            j.detection_radius_m,
            ">= 0.0",
        )?;
        check(
            j.blend_distance_m > 0.0,
            "junctions.blend_distance_m",
            j.blend_distance_m,
            "> 0.0",
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(RoadParams::default().validate().is_ok());
    }

    #[test]
    fn narrow_road_rejected() {
        let p = RoadParams {
            road_width_m: 0.5,
            ..RoadParams::default()
        };
        assert!(p.validate().is_err());
    }

    #[test]
    fn even_smoothing_window_rejected() {
        let p = RoadParams {
            smoothing_window_size: 4,
            ..RoadParams::default()
        };
        assert!(p.validate().is_err());
    }

    #[test]
    fn blend_functions_hit_endpoints() {
        for f in [
            BlendFunction::Linear,
            BlendFunction::Cosine,
            BlendFunction::Cubic,
            BlendFunction::Quintic,
        ] {
            assert!(f.apply(0.0).abs() < 1e-12, "{f:?} at 0");
            assert!((f.apply(1.0) - 1.0).abs() < 1e-12, "{f:?} at 1");
            let mid = f.apply(0.5);
            assert!((0.0..=1.0).contains(&mid), "{f:?} at 0.5 gave {mid}");
        }
    }

    #[test]
    fn params_roundtrip_through_json() {
        let p = RoadParams::default();
        let json = serde_json::to_string(&p).unwrap();
        let back: RoadParams = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
