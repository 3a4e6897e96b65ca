//! Heightmap and layer-mask image I/O.
//!
//! PNGs are top-origin; the core is bottom-origin. Both directions flip Y
//! here so nothing else in the pipeline ever sees image orientation.

use std::path::Path;

use anyhow::{bail, Context, Result};
use roadbed_core::{ByteMask, HeightGrid};

/// Load a 16-bit grayscale heightmap PNG into metres:
/// `H[y][x] = pixel / 65535 · max_height + base`, Y flipped.
pub fn load_heightmap(path: &Path, mpp: f64, max_height: f32, base: f32) -> Result<HeightGrid> {
    let img = image::open(path).with_context(|| format!("loading heightmap {}", path.display()))?;
    let (w, h) = (img.width() as usize, img.height() as usize);
    if w != h {
        bail!("heightmap {} is {}x{}, must be square", path.display(), w, h);
    }

    let luma = img.into_luma16();
    let mut grid = HeightGrid::new(w, mpp, 0.0);
    for y in 0..h {
        let src_y = h - 1 - y;
        for x in 0..w {
            let px = luma.get_pixel(x as u32, src_y as u32).0[0];
            grid.set(x, y, px as f32 / 65535.0 * max_height + base);
        }
    }
    Ok(grid)
}

/// Write the bottom-origin height grid as a top-origin 16-bit PNG.
pub fn save_heightmap(grid: &HeightGrid, path: &Path, max_height: f32, base: f32) -> Result<()> {
    let size = grid.size;
    let mut img = image::ImageBuffer::<image::Luma<u16>, Vec<u16>>::new(size as u32, size as u32);
    for y in 0..size {
        let dst_y = size - 1 - y;
        for x in 0..size {
            let norm = ((grid.get(x, y) - base) / max_height).clamp(0.0, 1.0);
            img.put_pixel(x as u32, dst_y as u32, image::Luma([(norm * 65535.0) as u16]));
        }
    }
    img.save(path)
        .with_context(|| format!("writing heightmap {}", path.display()))?;
    Ok(())
}

/// Load an 8-bit grayscale layer mask (foreground > 127), Y flipped, and
/// check it against the terrain size.
pub fn load_mask(path: &Path, expected_size: usize) -> Result<ByteMask> {
    let img = image::open(path).with_context(|| format!("loading mask {}", path.display()))?;
    let (w, h) = (img.width() as usize, img.height() as usize);
    if w != expected_size || h != expected_size {
        bail!(
            "mask {} is {}x{}, terrain is {}x{}",
            path.display(),
            w,
            h,
            expected_size,
            expected_size
        );
    }

    let luma = img.into_luma8();
    let mut mask = ByteMask::new(expected_size);
    for y in 0..expected_size {
        let src_y = expected_size - 1 - y;
        for x in 0..expected_size {
            mask.data[y * expected_size + x] = luma.get_pixel(x as u32, src_y as u32).0[0];
        }
    }
    Ok(mask)
}
