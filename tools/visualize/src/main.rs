//! Diagnostic visualizer — runs a demo deformation and writes five PNG
//! debug images to data/debug/. Not part of the main pipeline.

use std::fs;
use std::path::Path;

use glam::DVec2;
use roadbed_core::network::{RoadMaterial, RoadSource};
use roadbed_core::{deform_heightmap, DeformConfig, HeightGrid, RoadParams};

const S: usize = 512;

// ── Colour helpers ────────────────────────────────────────────────────────────

/// Normalised elevation → grayscale hillshade.
fn shade(v: f32, min: f32, range: f32) -> [u8; 3] {
    let c = (((v - min) / range).clamp(0.0, 1.0) * 255.0) as u8;
    [c, c, c]
}

/// Spline id → distinct RGB colour.
fn owner_color(id: i32) -> [u8; 3] {
    match id {
        -1 => [30, 30, 30],
        0 => [220, 60, 60],  // red
        1 => [70, 130, 180], // steel blue
        2 => [60, 180, 90],  // green
        3 => [230, 160, 40], // amber
        _ => [160, 80, 200], // purple for the rest
    }
}

/// Distance (m) → white-to-blue heatmap, saturating at `max_m`.
fn distance_color(d: f32, max_m: f32) -> [u8; 3] {
    let t = (d / max_m).clamp(0.0, 1.0);
    let lo = (255.0 * t) as u8;
    [lo, lo, 255]
}

fn save_rgb(path: &Path, pixels: impl Fn(usize, usize) -> [u8; 3]) {
    let mut img = image::RgbImage::new(S as u32, S as u32);
    for y in 0..S {
        for x in 0..S {
            let [r, g, b] = pixels(x, y);
            // PNG rows are top-origin; the pipeline is bottom-origin.
            img.put_pixel(x as u32, (S - 1 - y) as u32, image::Rgb([r, g, b]));
        }
    }
    img.save(path).expect("failed to save debug image");
    println!("Wrote {}", path.display());
}

// ── Demo scene ────────────────────────────────────────────────────────────────

fn demo_materials() -> Vec<RoadMaterial> {
    let minor = RoadParams {
        road_width_m: 7.0,
        terrain_affected_range_m: 12.0,
        ..RoadParams::default()
    };
    let major = RoadParams {
        road_width_m: 10.0,
        terrain_affected_range_m: 16.0,
        road_edge_protection_buffer_m: 1.5,
        ..RoadParams::default()
    };

    vec![
        RoadMaterial {
            name: "valley_road".into(),
            source: RoadSource::Polylines(vec![vec![
                DVec2::new(40.0, 120.0),
                DVec2::new(200.0, 180.0),
                DVec2::new(360.0, 160.0),
                DVec2::new(470.0, 250.0),
            ]]),
            category: "secondary".into(),
            priority: 0,
            params: minor,
        },
        RoadMaterial {
            name: "ridge_road".into(),
            source: RoadSource::Polylines(vec![vec![
                DVec2::new(260.0, 40.0),
                DVec2::new(280.0, 200.0),
                DVec2::new(240.0, 380.0),
                DVec2::new(300.0, 470.0),
            ]]),
            category: "primary".into(),
            priority: 1,
            params: major,
        },
    ]
}

/// Rolling demo terrain: two broad sine hills plus a diagonal tilt.
fn demo_terrain() -> HeightGrid {
    HeightGrid::from_fn(S, 1.0, |x, y| {
        let fx = x as f32 / S as f32;
        let fy = y as f32 / S as f32;
        40.0 + 18.0 * (fx * 6.0).sin() * (fy * 5.0).cos() + 25.0 * (fx + fy)
    })
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    let h0 = demo_terrain();
    println!("Running road deformation ({S}×{S})…");
    let result = deform_heightmap(&h0, &demo_materials(), &DeformConfig::default())
        .expect("demo deformation failed");
    println!(
        "{} spline(s), {} junction(s), {} ms",
        result.stats.splines, result.stats.junctions, result.stats.elapsed_ms
    );

    let out_dir = Path::new("data/debug");
    fs::create_dir_all(out_dir).expect("cannot create data/debug/");

    let min = result.heightmap.min_elevation();
    let range = (result.heightmap.max_elevation() - min).max(1.0);

    // ── 1. heightmap_before.png ──────────────────────────────────────────────
    save_rgb(&out_dir.join("heightmap_before.png"), |x, y| {
        shade(h0.get(x, y), min, range)
    });

    // ── 2. heightmap_after.png (road cores outlined in red) ──────────────────
    save_rgb(&out_dir.join("heightmap_after.png"), |x, y| {
        let i = y * S + x;
        let on_core = result.protection_mask[i];
        let edge = on_core
            && [(1i64, 0i64), (-1, 0), (0, 1), (0, -1)].iter().any(|&(dx, dy)| {
                let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                nx >= 0
                    && ny >= 0
                    && (nx as usize) < S
                    && (ny as usize) < S
                    && !result.protection_mask[ny as usize * S + nx as usize]
            });
        if edge {
            [220, 40, 40]
        } else {
            shade(result.heightmap.get(x, y), min, range)
        }
    });

    // ── 3. ownership.png ─────────────────────────────────────────────────────
    save_rgb(&out_dir.join("ownership.png"), |x, y| {
        owner_color(result.ownership[y * S + x])
    });

    // ── 4. distance_field.png ────────────────────────────────────────────────
    if let Some(df) = &result.distance_field {
        save_rgb(&out_dir.join("distance_field.png"), |x, y| {
            distance_color(df[y * S + x], 60.0)
        });
    }

    // ── 5. junctions.png (markers on the shaded result) ──────────────────────
    save_rgb(&out_dir.join("junctions.png"), |x, y| {
        let p = DVec2::new(x as f64, y as f64);
        let near_junction = result
            .junctions
            .iter()
            .any(|j| (j.position - p).length() < 6.0);
        if near_junction {
            [255, 220, 0]
        } else {
            shade(result.heightmap.get(x, y), min, range)
        }
    });

    println!("Done.");
}
