//! Protection mask and ownership builder.
//!
//! Rasterizes the road core as a chain of trapezoids, one per consecutive
//! cross-section pair, into a pixel-ownership map. Higher priority always
//! wins a contested pixel; equal priority keeps the first writer, which
//! together with the per-spline local_index ordering makes the result
//! independent of inter-spline processing order.

use glam::DVec2;
use log::info;

use crate::morphology::fill_convex_polygon;
use crate::network::{segment_elevation_at, CrossSection, RoadNetwork};

/// Per-pixel outputs of the core rasterization.
pub struct ProtectionArtifacts {
    pub size: usize,
    /// True where any road core (plus edge buffer) covers the pixel.
    pub mask: Vec<bool>,
    /// Owning spline id; −1 where unowned.
    pub owner: Vec<i32>,
    /// Core target elevation; NaN where unowned.
    pub elevation: Vec<f32>,
    /// Owner priority; i32::MIN where unowned.
    pub priority: Vec<i32>,
    /// Pixels taken over by a higher-priority spline.
    pub overwrites: u64,
    /// Pixel elevations skipped because the pair produced a non-finite value.
    pub skipped_invalid: u64,
    pub core_pixels: usize,
}

impl ProtectionArtifacts {
    fn new(size: usize) -> Self {
        Self {
            size,
            mask: vec![false; size * size],
            owner: vec![-1; size * size],
            elevation: vec![f32::NAN; size * size],
            priority: vec![i32::MIN; size * size],
            overwrites: 0,
            skipped_invalid: 0,
            core_pixels: 0,
        }
    }
}

/// Corners of the core trapezoid between two sections, world metres.
fn core_quad(a: &CrossSection, b: &CrossSection, buffer: f64) -> [DVec2; 4] {
    let ra = a.half_width() + buffer;
    let rb = b.half_width() + buffer;
    [
        a.center - a.normal * ra,
        a.center + a.normal * ra,
        b.center + b.normal * rb,
        b.center - b.normal * rb,
    ]
}

/// Rasterize every spline's core into the ownership artifacts. Splines are
/// processed in stable id order; sections in local_index order so
/// consecutive trapezoids meet edge-to-edge.
pub fn build_protection(network: &RoadNetwork, size: usize, mpp: f64) -> ProtectionArtifacts {
    let mut art = ProtectionArtifacts::new(size);

    for spline in &network.splines {
        let buffer = spline.params.road_edge_protection_buffer_m;
        let priority = spline.priority;
        let secs = &network.sections[spline.section_range()];

        for pair in secs.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if a.excluded || b.excluded || !a.has_valid_target() || !b.has_valid_target() {
                continue;
            }

            let quad_px: Vec<DVec2> = core_quad(a, b, buffer)
                .iter()
                .map(|&w| w / mpp)
                .collect();

            fill_convex_polygon(&quad_px, size, |x, y| {
                let i = y * size + x;
                let current = art.priority[i];
                if art.owner[i] >= 0 && priority <= current {
                    // Mark coverage even when ownership is kept.
                    art.mask[i] = true;
                    return;
                }

                let world = DVec2::new(x as f64 * mpp, y as f64 * mpp);
                let elevation = segment_elevation_at(a, b, world);
                if !elevation.is_finite() {
                    art.skipped_invalid += 1;
                    return;
                }

                if art.owner[i] >= 0 {
                    art.overwrites += 1;
                } else {
                    art.core_pixels += 1;
                }
                art.mask[i] = true;
                art.owner[i] = spline.id as i32;
                art.elevation[i] = elevation as f32;
                art.priority[i] = priority;
            });
        }
    }

    info!(
        "protection mask: {} core pixel(s), {} overwrite(s)",
        art.core_pixels, art.overwrites
    );
    art
}
