//! Junction detection and elevation harmonization.
//!
//! Junctions are found by pairwise endpoint comparison: end-to-end when two
//! splines' endpoints meet, T when an endpoint lands on another spline's
//! interior. Harmonization pulls every nearby cross-section's target
//! elevation toward a distance-weighted junction average, so meeting roads
//! agree on a height instead of fighting over the shared pixels.

use glam::DVec2;
use log::info;

use crate::network::{RoadNetwork, RoadSpline};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JunctionKind {
    EndToEnd,
    Tee,
}

#[derive(Debug, Clone, Copy)]
pub struct Junction {
    pub position: DVec2,
    pub spline_a: u32,
    pub spline_b: u32,
    pub kind: JunctionKind,
}

/// Pipeline-level radii, applied to materials that opt into
/// `use_global_settings`.
#[derive(Debug, Clone, Copy)]
pub struct JunctionGlobals {
    pub detection_radius_m: f64,
    pub blend_distance_m: f64,
}

impl Default for JunctionGlobals {
    fn default() -> Self {
        Self {
            detection_radius_m: 10.0,
            blend_distance_m: 30.0,
        }
    }
}

fn effective(spline: &RoadSpline, globals: &JunctionGlobals) -> (bool, f64, f64) {
    let j = &spline.params.junctions;
    if j.use_global_settings {
        (j.enabled, globals.detection_radius_m, globals.blend_distance_m)
    } else {
        (j.enabled, j.detection_radius_m, j.blend_distance_m)
    }
}

/// Detection radius and blend distance for a spline pair: the larger of
/// the two effective settings. Harmonization requires both sides enabled.
fn pair_settings(a: &RoadSpline, b: &RoadSpline, globals: &JunctionGlobals) -> Option<(f64, f64)> {
    let (ea, ra, ba) = effective(a, globals);
    let (eb, rb, bb) = effective(b, globals);
    (ea && eb).then_some((ra.max(rb), ba.max(bb)))
}

/// Nearest interior (non-endpoint) section of `spline` to `pos`, if any
/// lies within `radius`.
fn interior_section_within(
    network: &RoadNetwork,
    spline: &RoadSpline,
    pos: DVec2,
    radius: f64,
) -> Option<DVec2> {
    let secs = network.sections_of(spline.id);
    if secs.len() < 3 {
        return None;
    }
    let mut best: Option<(f64, DVec2)> = None;
    for cs in &secs[1..secs.len() - 1] {
        if cs.excluded {
            continue;
        }
        let d = (cs.center - pos).length();
        if d <= radius && best.map_or(true, |(bd, _)| d < bd) {
            best = Some((d, cs.center));
        }
    }
    best.map(|(_, p)| p)
}

/// Detect every end-to-end and T junction across the network, including
/// cross-material pairs.
pub fn detect_junctions(network: &RoadNetwork, globals: &JunctionGlobals) -> Vec<Junction> {
    let mut junctions = Vec::new();

    for i in 0..network.splines.len() {
        for j in i + 1..network.splines.len() {
            let a = &network.splines[i];
            let b = &network.splines[j];
            let Some((radius, _)) = pair_settings(a, b, globals) else {
                continue;
            };

            let a_ends = [a.start_point, a.end_point];
            let b_ends = [b.start_point, b.end_point];

            let mut end_to_end = false;
            for &pa in &a_ends {
                for &pb in &b_ends {
                    if (pa - pb).length() <= radius {
                        junctions.push(Junction {
                            position: (pa + pb) * 0.5,
                            spline_a: a.id,
                            spline_b: b.id,
                            kind: JunctionKind::EndToEnd,
                        });
                        end_to_end = true;
                    }
                }
            }
            if end_to_end {
                continue;
            }

            // T: an endpoint of one spline against the other's interior.
            for &pa in &a_ends {
                if let Some(hit) = interior_section_within(network, b, pa, radius) {
                    junctions.push(Junction {
                        position: (pa + hit) * 0.5,
                        spline_a: a.id,
                        spline_b: b.id,
                        kind: JunctionKind::Tee,
                    });
                }
            }
            for &pb in &b_ends {
                if let Some(hit) = interior_section_within(network, a, pb, radius) {
                    junctions.push(Junction {
                        position: (pb + hit) * 0.5,
                        spline_a: a.id,
                        spline_b: b.id,
                        kind: JunctionKind::Tee,
                    });
                }
            }
        }
    }

    info!("junction detection: {} junction(s)", junctions.len());
    junctions
}

/// Harmonize target elevations around each junction in a single pass.
/// Returns the number of cross-section adjustments applied.
pub fn harmonize_junctions(
    network: &mut RoadNetwork,
    junctions: &[Junction],
    globals: &JunctionGlobals,
) -> usize {
    let mut adjusted = 0usize;

    for junction in junctions {
        let a = &network.splines[junction.spline_a as usize];
        let b = &network.splines[junction.spline_b as usize];
        let Some((_, blend)) = pair_settings(a, b, globals) else {
            continue;
        };
        let spans = [a.section_range(), b.section_range()];

        // Weighted junction elevation over the affected sections.
        let (mut wsum, mut esum) = (0.0f64, 0.0f64);
        for span in spans.clone() {
            for cs in &network.sections[span] {
                if cs.excluded || !cs.has_valid_target() {
                    continue;
                }
                let w = (1.0 - (cs.center - junction.position).length() / blend).clamp(0.0, 1.0);
                if w > 0.0 {
                    wsum += w;
                    esum += w * cs.target_elevation;
                }
            }
        }
        if wsum <= 0.0 {
            continue;
        }
        let junction_elevation = esum / wsum;

        for span in spans {
            for cs in &mut network.sections[span] {
                if cs.excluded || !cs.has_valid_target() {
                    continue;
                }
                let w = (1.0 - (cs.center - junction.position).length() / blend).clamp(0.0, 1.0);
                if w > 0.0 {
                    cs.target_elevation += (junction_elevation - cs.target_elevation) * w;
                    adjusted += 1;
                }
            }
        }
    }

    info!("junction harmonization: {adjusted} section adjustment(s)");
    adjusted
}
