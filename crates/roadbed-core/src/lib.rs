//! Road-aware heightmap deformation for BeamNG-scale terrains.
//!
//! Takes a square heightmap plus road materials (binary raster masks or
//! resolved vector polylines) and produces a terrain where roads are
//! locally level across their width, follow a smoothed longitudinal
//! profile, blend into the surrounding terrain with shaped embankments,
//! and respect priority where roads overlap.
//!
//! The crate is pure CPU: image decoding, georeferencing, OSM resolution,
//! and container formats belong to callers. Entry point:
//! [`pipeline::deform_heightmap`].

pub mod blend;
pub mod distance;
pub mod elevation;
pub mod elevmap;
pub mod error;
pub mod grid;
pub mod index;
pub mod junction;
pub mod morphology;
pub mod network;
pub mod params;
pub mod pipeline;
pub mod protect;
pub mod smooth;
pub mod spline;
pub mod validate;

pub use error::{DeformError, Result, ALLOWED_SIZES};
pub use grid::{ByteMask, HeightGrid};
pub use network::{build_network, RoadMaterial, RoadNetwork, RoadSource};
pub use params::{BlendFunction, RoadParams, SmoothingType};
pub use pipeline::{deform_heightmap, DeformConfig, DeformResult, DeformStats};
