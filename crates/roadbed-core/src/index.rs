//! Uniform-grid spatial indices over cross-section centres.
//!
//! All three indices hash world positions into fixed-size cells
//! (32 pixels by default). They are built sequentially before the parallel
//! pixel passes and are read-only afterwards. The radius queries exist in
//! a streaming form and a buffer-filling form; the latter is what the
//! per-pixel hot loops use, so it must not allocate.

use glam::DVec2;
use rustc_hash::FxHashMap;

use crate::network::{CrossSection, RoadNetwork};

/// Default index cell edge, pixels.
pub const DEFAULT_CELL_PX: f64 = 32.0;

#[inline]
fn cell_of(pos: DVec2, cell_m: f64) -> (i32, i32) {
    ((pos.x / cell_m).floor() as i32, (pos.y / cell_m).floor() as i32)
}

/// Flat index: cell → cross-section indices (into the network's flat list).
pub struct SectionIndex {
    cells: FxHashMap<(i32, i32), Vec<u32>>,
    cell_m: f64,
}

impl SectionIndex {
    /// Index every non-excluded cross-section.
    pub fn build(network: &RoadNetwork, cell_px: f64, mpp: f64) -> Self {
        let cell_m = cell_px * mpp;
        let mut cells: FxHashMap<(i32, i32), Vec<u32>> = FxHashMap::default();
        for (i, cs) in network.sections.iter().enumerate() {
            if cs.excluded {
                continue;
            }
            cells.entry(cell_of(cs.center, cell_m)).or_default().push(i as u32);
        }
        Self { cells, cell_m }
    }

    /// Nearest section to `pos`, searching the 3×3 cell neighbourhood.
    pub fn find_nearest(&self, pos: DVec2, sections: &[CrossSection]) -> Option<u32> {
        let (cx, cy) = cell_of(pos, self.cell_m);
        let mut best: Option<(u32, f64)> = None;
        for dy in -1..=1 {
            for dx in -1..=1 {
                if let Some(bucket) = self.cells.get(&(cx + dx, cy + dy)) {
                    for &i in bucket {
                        let d = (sections[i as usize].center - pos).length_squared();
                        if best.map_or(true, |(_, bd)| d < bd) {
                            best = Some((i, d));
                        }
                    }
                }
            }
        }
        best.map(|(i, _)| i)
    }

    /// Streaming radius query: invokes `visit(index, distance)` for every
    /// section within `radius` of `pos`.
    pub fn for_each_within_radius(
        &self,
        pos: DVec2,
        radius: f64,
        sections: &[CrossSection],
        mut visit: impl FnMut(u32, f64),
    ) {
        let reach = (radius / self.cell_m).ceil() as i32 + 1;
        let (cx, cy) = cell_of(pos, self.cell_m);
        let r_sq = radius * radius;
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                if let Some(bucket) = self.cells.get(&(cx + dx, cy + dy)) {
                    for &i in bucket {
                        let d_sq = (sections[i as usize].center - pos).length_squared();
                        if d_sq <= r_sq {
                            visit(i, d_sq.sqrt());
                        }
                    }
                }
            }
        }
    }

    /// Buffer-filling radius query: writes matching indices into `out`
    /// (stopping at its capacity) and returns the count written.
    pub fn fill_within_radius(
        &self,
        pos: DVec2,
        radius: f64,
        sections: &[CrossSection],
        out: &mut [u32],
    ) -> usize {
        let mut n = 0usize;
        let reach = (radius / self.cell_m).ceil() as i32 + 1;
        let (cx, cy) = cell_of(pos, self.cell_m);
        let r_sq = radius * radius;
        'outer: for dy in -reach..=reach {
            for dx in -reach..=reach {
                if let Some(bucket) = self.cells.get(&(cx + dx, cy + dy)) {
                    for &i in bucket {
                        let d_sq = (sections[i as usize].center - pos).length_squared();
                        if d_sq <= r_sq {
                            if n == out.len() {
                                break 'outer;
                            }
                            out[n] = i;
                            n += 1;
                        }
                    }
                }
            }
        }
        n
    }
}

/// Per-spline index: (spline id, cell) → cross-section indices.
pub struct SplineSectionIndex {
    cells: FxHashMap<(u32, i32, i32), Vec<u32>>,
    cell_m: f64,
}

impl SplineSectionIndex {
    pub fn build(network: &RoadNetwork, cell_px: f64, mpp: f64) -> Self {
        let cell_m = cell_px * mpp;
        let mut cells: FxHashMap<(u32, i32, i32), Vec<u32>> = FxHashMap::default();
        for (i, cs) in network.sections.iter().enumerate() {
            if cs.excluded {
                continue;
            }
            let (cx, cy) = cell_of(cs.center, cell_m);
            cells.entry((cs.spline_id, cx, cy)).or_default().push(i as u32);
        }
        Self { cells, cell_m }
    }

    /// Nearest section of one specific spline within `radius` of `pos`.
    pub fn find_nearest_for_spline(
        &self,
        pos: DVec2,
        spline_id: u32,
        radius: f64,
        sections: &[CrossSection],
    ) -> Option<u32> {
        let reach = (radius / self.cell_m).ceil() as i32 + 1;
        let (cx, cy) = cell_of(pos, self.cell_m);
        let r_sq = radius * radius;
        let mut best: Option<(u32, f64)> = None;
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                if let Some(bucket) = self.cells.get(&(spline_id, cx + dx, cy + dy)) {
                    for &i in bucket {
                        let d_sq = (sections[i as usize].center - pos).length_squared();
                        if d_sq <= r_sq && best.map_or(true, |(_, bd)| d_sq < bd) {
                            best = Some((i, d_sq));
                        }
                    }
                }
            }
        }
        best.map(|(i, _)| i)
    }
}

/// One spline whose protection zone touches a cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtectionCandidate {
    pub spline_id: u32,
    pub priority: i32,
    /// Half width + edge buffer, metres.
    pub protection_radius: f64,
    pub half_width: f64,
}

/// Cell → splines whose protection zones touch it. Gives the blender an
/// O(1) "is a higher-priority road protecting this pixel" lookup.
pub struct ProtectionIndex {
    cells: FxHashMap<(i32, i32), Vec<ProtectionCandidate>>,
    cell_m: f64,
}

impl ProtectionIndex {
    pub fn build(network: &RoadNetwork, cell_px: f64, mpp: f64) -> Self {
        let cell_m = cell_px * mpp;
        let mut cells: FxHashMap<(i32, i32), Vec<ProtectionCandidate>> = FxHashMap::default();

        for spline in &network.splines {
            let candidate = ProtectionCandidate {
                spline_id: spline.id,
                priority: spline.priority,
                protection_radius: spline.params.protection_radius(),
                half_width: spline.params.half_width(),
            };
            let r = candidate.protection_radius;
            for cs in &network.sections[spline.section_range()] {
                if cs.excluded {
                    continue;
                }
                let (x0, y0) = cell_of(cs.center - DVec2::splat(r), cell_m);
                let (x1, y1) = cell_of(cs.center + DVec2::splat(r), cell_m);
                for cy in y0..=y1 {
                    for cx in x0..=x1 {
                        let bucket = cells.entry((cx, cy)).or_default();
                        if !bucket.iter().any(|c| c.spline_id == spline.id) {
                            bucket.push(candidate);
                        }
                    }
                }
            }
        }

        Self { cells, cell_m }
    }

    /// Candidates whose protection zone touches the cell containing `pos`.
    pub fn candidates(&self, pos: DVec2) -> &[ProtectionCandidate] {
        self.cells
            .get(&cell_of(pos, self.cell_m))
            .map_or(&[], |v| v.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::HeightGrid;
    use crate::network::{build_network, RoadMaterial, RoadSource};
    use crate::params::RoadParams;

    fn two_road_network() -> RoadNetwork {
        let grid = HeightGrid::new(256, 1.0, 0.0);
        let mats = vec![
            RoadMaterial {
                name: "a".into(),
                source: RoadSource::Polylines(vec![vec![
                    DVec2::new(10.0, 100.0),
                    DVec2::new(200.0, 100.0),
                ]]),
                category: "primary".into(),
                priority: 0,
                params: RoadParams::default(),
            },
            RoadMaterial {
                name: "b".into(),
                source: RoadSource::Polylines(vec![vec![
                    DVec2::new(100.0, 10.0),
                    DVec2::new(100.0, 200.0),
                ]]),
                category: "secondary".into(),
                priority: 3,
                params: RoadParams::default(),
            },
        ];
        build_network(&mats, &grid).unwrap()
    }

    #[test]
    fn nearest_finds_the_obvious_section() {
        let net = two_road_network();
        let idx = SectionIndex::build(&net, DEFAULT_CELL_PX, 1.0);
        let near = idx
            .find_nearest(DVec2::new(50.0, 101.0), &net.sections)
            .expect("something nearby");
        let cs = &net.sections[near as usize];
        assert_eq!(cs.spline_id, 0);
        assert!((cs.center.y - 100.0).abs() < 1e-6);
        assert!((cs.center.x - 50.0).abs() <= 0.5, "nearest at {:?}", cs.center);
    }

    #[test]
    fn radius_query_forms_agree() {
        let net = two_road_network();
        let idx = SectionIndex::build(&net, DEFAULT_CELL_PX, 1.0);
        let pos = DVec2::new(100.0, 100.0);

        let mut streamed = Vec::new();
        idx.for_each_within_radius(pos, 5.0, &net.sections, |i, _| streamed.push(i));

        let mut buf = [0u32; 128];
        let n = idx.fill_within_radius(pos, 5.0, &net.sections, &mut buf);

        let mut a = streamed.clone();
        let mut b = buf[..n].to_vec();
        a.sort_unstable();
        b.sort_unstable();
        assert_eq!(a, b, "streaming and buffer-filling queries must agree");
        assert!(!a.is_empty());
    }

    #[test]
    fn buffer_fill_respects_capacity() {
        let net = two_road_network();
        let idx = SectionIndex::build(&net, DEFAULT_CELL_PX, 1.0);
        let mut buf = [0u32; 3];
        let n = idx.fill_within_radius(DVec2::new(100.0, 100.0), 30.0, &net.sections, &mut buf);
        assert_eq!(n, 3, "must stop at the buffer capacity");
    }

    #[test]
    fn spline_scoped_search_ignores_other_splines() {
        let net = two_road_network();
        let idx = SplineSectionIndex::build(&net, DEFAULT_CELL_PX, 1.0);
        // Near road b's centreline, but ask for road a.
        let found = idx
            .find_nearest_for_spline(DVec2::new(100.0, 150.0), 0, 80.0, &net.sections)
            .expect("road a within 80 m");
        assert_eq!(net.sections[found as usize].spline_id, 0);
        // And a radius too small to reach road a finds nothing.
        assert!(idx
            .find_nearest_for_spline(DVec2::new(100.0, 150.0), 0, 10.0, &net.sections)
            .is_none());
    }

    #[test]
    fn protection_candidates_cover_the_core() {
        let net = two_road_network();
        let idx = ProtectionIndex::build(&net, DEFAULT_CELL_PX, 1.0);
        let on_b = idx.candidates(DVec2::new(100.0, 150.0));
        assert!(
            on_b.iter().any(|c| c.spline_id == 1 && c.priority == 3),
            "road b must protect its own centreline cell: {on_b:?}"
        );
    }
}
