//! Binary-raster morphology and integer geometry: skeletonization, path
//! tracing, polyline simplification, and scanline/line rasterization.
//! These are the leaves the road network builder is assembled from.
pub mod raster;
pub mod simplify;
pub mod thinning;
pub mod trace;

pub use raster::{draw_line, fill_convex_polygon, point_in_convex};
pub use simplify::simplify_rdp;
pub use thinning::thin_zhang_suen;
pub use trace::trace_skeleton_paths;
