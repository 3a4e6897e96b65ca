//! The JSON run description: terrain scale plus the road material list.
//!
//! Polyline coordinates are bottom-origin terrain pixels, matching the
//! core's internal convention (images are flipped at the I/O boundary).

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use glam::DVec2;
use roadbed_core::network::{RoadMaterial, RoadSource};
use roadbed_core::pipeline::DeformConfig;
use roadbed_core::RoadParams;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct RunFile {
    /// Metres per pixel.
    pub mpp: f64,
    #[serde(default = "default_max_height")]
    pub max_height_m: f32,
    #[serde(default)]
    pub terrain_base_m: f32,
    #[serde(default = "default_true")]
    pub use_distance_field: bool,
    pub materials: Vec<MaterialEntry>,
}

fn default_max_height() -> f32 {
    1024.0
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MaterialEntry {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    /// Source category tag; empty selects the raster interpolation policy.
    #[serde(default)]
    pub category: String,
    /// Path to an 8-bit layer mask PNG, relative to the run file.
    #[serde(default)]
    pub mask: Option<PathBuf>,
    /// Centreline polylines in bottom-origin pixel coordinates.
    #[serde(default)]
    pub polylines: Option<Vec<Vec<[f64; 2]>>>,
    #[serde(default)]
    pub params: RoadParams,
}

impl RunFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading run file {}", path.display()))?;
        let run: RunFile = serde_json::from_str(&text)
            .with_context(|| format!("parsing run file {}", path.display()))?;
        if run.mpp <= 0.0 {
            bail!("mpp must be positive, got {}", run.mpp);
        }
        if run.materials.is_empty() {
            bail!("run file lists no materials");
        }
        Ok(run)
    }

    pub fn config(&self) -> DeformConfig {
        DeformConfig {
            max_height_m: self.max_height_m,
            use_distance_field: self.use_distance_field,
            ..DeformConfig::default()
        }
    }

    /// Resolve material entries into core materials, loading mask images
    /// relative to the run file's directory.
    pub fn materials(&self, run_dir: &Path, terrain_size: usize) -> Result<Vec<RoadMaterial>> {
        let mut out = Vec::with_capacity(self.materials.len());
        for entry in &self.materials {
            let source = match (&entry.mask, &entry.polylines) {
                (Some(mask_path), None) => {
                    let full = run_dir.join(mask_path);
                    RoadSource::Mask(crate::imageio::load_mask(&full, terrain_size)?)
                }
                (None, Some(polys)) => RoadSource::Polylines(
                    polys
                        .iter()
                        .map(|poly| poly.iter().map(|&[x, y]| DVec2::new(x, y)).collect())
                        .collect(),
                ),
                (Some(_), Some(_)) => {
                    bail!("material '{}' has both a mask and polylines", entry.name)
                }
                (None, None) => {
                    bail!("material '{}' has neither a mask nor polylines", entry.name)
                }
            };
            out.push(RoadMaterial {
                name: entry.name.clone(),
                source,
                category: entry.category.clone(),
                priority: entry.priority,
                params: entry.params.clone(),
            });
        }
        Ok(out)
    }
}
