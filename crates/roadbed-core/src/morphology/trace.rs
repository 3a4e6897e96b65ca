//! Ordered path extraction from a thinned skeleton.
//!
//! Endpoints (exactly one foreground neighbour) are preferred walk starts;
//! branch nodes (three or more neighbours) terminate paths so every arm of
//! a junction is emitted separately. Pure cycles are walked from an
//! arbitrary pixel. Paths shorter than `min_path_length` are dropped.

use super::thinning::BinaryRaster;

const OFFSETS: [(i64, i64); 8] = [
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
];

struct Tracer<'a> {
    raster: &'a BinaryRaster,
    degree: Vec<u8>,
    visited: Vec<bool>,
}

impl<'a> Tracer<'a> {
    fn new(raster: &'a BinaryRaster) -> Self {
        let mut degree = vec![0u8; raster.data.len()];
        for y in 0..raster.height as i64 {
            for x in 0..raster.width as i64 {
                if raster.at(x, y) == 0 {
                    continue;
                }
                let d = OFFSETS
                    .iter()
                    .filter(|&&(dx, dy)| raster.at(x + dx, y + dy) == 1)
                    .count() as u8;
                degree[y as usize * raster.width + x as usize] = d;
            }
        }
        Self {
            raster,
            degree,
            visited: vec![false; raster.data.len()],
        }
    }

    #[inline]
    fn idx(&self, x: i64, y: i64) -> usize {
        y as usize * self.raster.width + x as usize
    }

    #[inline]
    fn is_branch(&self, x: i64, y: i64) -> bool {
        self.degree[self.idx(x, y)] >= 3
    }

    /// Walk from `start` (already part of `path`), never stepping back onto
    /// `prev`. Terminates on a branch node, a dead end, or a visited pixel.
    fn walk(&mut self, mut prev: (i64, i64), mut cur: (i64, i64), path: &mut Vec<(u32, u32)>) {
        loop {
            if !self.is_branch(cur.0, cur.1) {
                let idx = self.idx(cur.0, cur.1);
                self.visited[idx] = true;
            }
            path.push((cur.0 as u32, cur.1 as u32));

            if self.is_branch(cur.0, cur.1) {
                return;
            }

            let mut next = None;
            for &(dx, dy) in &OFFSETS {
                let (nx, ny) = (cur.0 + dx, cur.1 + dy);
                if (nx, ny) == prev || self.raster.at(nx, ny) == 0 {
                    continue;
                }
                if self.is_branch(nx, ny) || !self.visited[self.idx(nx, ny)] {
                    next = Some((nx, ny));
                    break;
                }
            }

            match next {
                Some(n) => {
                    prev = cur;
                    cur = n;
                }
                None => return,
            }
        }
    }
}

/// Extract every skeleton arm as an ordered pixel sequence.
pub fn trace_skeleton_paths(raster: &BinaryRaster, min_path_length: usize) -> Vec<Vec<(u32, u32)>> {
    let mut tr = Tracer::new(raster);
    let mut paths: Vec<Vec<(u32, u32)>> = Vec::new();

    let w = raster.width as i64;
    let h = raster.height as i64;

    // Pass 1: walks starting at endpoints.
    for y in 0..h {
        for x in 0..w {
            let i = tr.idx(x, y);
            if raster.at(x, y) == 1 && tr.degree[i] == 1 && !tr.visited[i] {
                let mut path = Vec::new();
                tr.walk((-1, -1), (x, y), &mut path);
                paths.push(path);
            }
        }
    }

    // Pass 2: branch-to-branch arms not reachable from any endpoint.
    for y in 0..h {
        for x in 0..w {
            if raster.at(x, y) == 0 || !tr.is_branch(x, y) {
                continue;
            }
            for &(dx, dy) in &OFFSETS {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w || ny >= h {
                    continue;
                }
                let ni = tr.idx(nx, ny);
                if raster.at(nx, ny) == 1 && !tr.is_branch(nx, ny) && !tr.visited[ni] {
                    let mut path = vec![(x as u32, y as u32)];
                    tr.walk((x, y), (nx, ny), &mut path);
                    paths.push(path);
                }
            }
        }
    }

    // Pass 3: pure cycles (no endpoints, no branches).
    for y in 0..h {
        for x in 0..w {
            let i = tr.idx(x, y);
            if raster.at(x, y) == 1 && tr.degree[i] == 2 && !tr.visited[i] {
                let mut path = Vec::new();
                tr.walk((-1, -1), (x, y), &mut path);
                paths.push(path);
            }
        }
    }

    paths.retain(|p| p.len() >= min_path_length);
    paths
}
