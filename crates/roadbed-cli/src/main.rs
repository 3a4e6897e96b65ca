//! Offline pipeline runner: heightmap PNG in, deformed heightmap PNG out.
//!
//! Implements the caller side of the core's boundary contracts — image
//! decoding, Y flips, and the JSON run description. The core itself never
//! touches a file.

mod imageio;
mod runfile;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};

use roadbed_core::deform_heightmap;
use runfile::RunFile;

#[derive(Parser, Debug)]
#[command(name = "roadbed", about = "Road-aware heightmap deformation runner")]
struct Args {
    /// JSON run description (terrain scale + road materials).
    run_file: PathBuf,

    /// Input 16-bit grayscale heightmap PNG.
    #[arg(short = 'i', long)]
    heightmap: PathBuf,

    /// Output heightmap PNG.
    #[arg(short = 'o', long, default_value = "heightmap_out.png")]
    output: PathBuf,

    /// Verbose logging (repeat for debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    simple_logger::SimpleLogger::new()
        .with_level(level)
        .init()
        .context("initializing logger")?;

    let run = RunFile::load(&args.run_file)?;
    let run_dir = args
        .run_file
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    info!("loading heightmap {}", args.heightmap.display());
    let h0 = imageio::load_heightmap(
        &args.heightmap,
        run.mpp,
        run.max_height_m,
        run.terrain_base_m,
    )?;
    info!("terrain {}x{} at {} m/px", h0.size, h0.size, h0.mpp);

    let materials = run.materials(&run_dir, h0.size)?;
    let config = run.config();

    let result = deform_heightmap(&h0, &materials, &config)?;

    let s = &result.stats;
    info!(
        "done in {} ms: {} spline(s), {} section(s), {} junction(s)",
        s.elapsed_ms, s.splines, s.sections, s.junctions
    );
    info!(
        "pixels: {} core, {} blended, {} slope-capped, {} protected, {} repaired",
        s.blend.core_pixels,
        s.blend.blended_pixels,
        s.blend.slope_capped_pixels,
        s.blend.protected_pixels,
        s.presave.total()
    );

    imageio::save_heightmap(&result.heightmap, &args.output, run.max_height_m, run.terrain_base_m)?;
    info!("wrote {}", args.output.display());

    Ok(())
}
