//! Pre-save sweep over the final heightmap: repairs NaN/inf, negatives,
//! saturated cells, and isolated spikes before the result leaves the
//! pipeline. Repairs read from a snapshot so a bad cell never contaminates
//! its neighbours' replacements.

use log::{info, warn};

use crate::grid::HeightGrid;

/// Cells at or above this fraction of max height with a much lower
/// neighbourhood are treated as spikes.
const SPIKE_FRACTION: f32 = 0.99;
const SPIKE_NEIGHBOURHOOD_FRACTION: f32 = 0.5;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PresaveReport {
    pub nan_or_inf: usize,
    pub negative: usize,
    pub saturated: usize,
    pub spikes: usize,
    /// Cells whose 3×3 neighbourhood had no valid cells and fell back to
    /// the global median (or the configured default).
    pub fallback_replacements: usize,
}

impl PresaveReport {
    pub fn total(&self) -> usize {
        self.nan_or_inf + self.negative + self.saturated + self.spikes
    }
}

#[inline]
fn is_valid(v: f32, max_height: f32) -> bool {
    v.is_finite() && v >= 0.0 && v < max_height
}

/// Mean of the valid 3×3 neighbours of (x, y), excluding the centre.
fn neighbourhood_mean(src: &[f32], size: usize, x: usize, y: usize, max_height: f32) -> Option<f32> {
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for dy in -1i64..=1 {
        for dx in -1i64..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = x as i64 + dx;
            let ny = y as i64 + dy;
            if nx < 0 || ny < 0 || nx >= size as i64 || ny >= size as i64 {
                continue;
            }
            let v = src[ny as usize * size + nx as usize];
            if is_valid(v, max_height) {
                sum += v as f64;
                count += 1;
            }
        }
    }
    (count > 0).then(|| (sum / count as f64) as f32)
}

fn global_median(src: &[f32], max_height: f32) -> Option<f32> {
    let mut valid: Vec<f32> = src.iter().cloned().filter(|&v| is_valid(v, max_height)).collect();
    if valid.is_empty() {
        return None;
    }
    let mid = valid.len() / 2;
    let (_, m, _) = valid.select_nth_unstable_by(mid, |a, b| a.partial_cmp(b).unwrap());
    Some(*m)
}

/// Repair every anomalous cell in place. Returns the anomaly counts.
pub fn fix_presave_anomalies(
    heights: &mut HeightGrid,
    max_height: f32,
    default_fill: f32,
) -> PresaveReport {
    let size = heights.size;
    let src = heights.data.clone();
    let mut report = PresaveReport::default();
    let mut median: Option<Option<f32>> = None;

    for y in 0..size {
        for x in 0..size {
            let i = y * size + x;
            let v = src[i];

            let navg = neighbourhood_mean(&src, size, x, y, max_height);
            let anomaly = if !v.is_finite() {
                report.nan_or_inf += 1;
                true
            } else if v < 0.0 {
                report.negative += 1;
                true
            } else if v >= max_height {
                report.saturated += 1;
                true
            } else if v >= SPIKE_FRACTION * max_height
                && navg.is_some_and(|a| a < SPIKE_NEIGHBOURHOOD_FRACTION * max_height)
            {
                report.spikes += 1;
                true
            } else {
                false
            };

            if !anomaly {
                continue;
            }

            let replacement = match navg {
                Some(a) => a,
                None => {
                    report.fallback_replacements += 1;
                    *median
                        .get_or_insert_with(|| global_median(&src, max_height))
                        .as_ref()
                        .unwrap_or(&default_fill)
                }
            };
            heights.data[i] = replacement;
        }
    }

    if report.total() > 0 {
        warn!(
            "pre-save repair: {} nan/inf, {} negative, {} saturated, {} spike(s)",
            report.nan_or_inf, report.negative, report.saturated, report.spikes
        );
    } else {
        info!("pre-save validation: clean");
    }
    report
}
