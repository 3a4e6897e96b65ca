//! Zhang–Suen skeletonization of a binary mask.

/// One-byte-per-cell working raster: 0 = background, 1 = foreground.
pub struct BinaryRaster {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl BinaryRaster {
    pub fn from_threshold(bytes: &[u8], width: usize, height: usize) -> Self {
        Self {
            data: bytes.iter().map(|&v| u8::from(v > 127)).collect(),
            width,
            height,
        }
    }

    #[inline]
    pub fn at(&self, x: i64, y: i64) -> u8 {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            0
        } else {
            self.data[y as usize * self.width + x as usize]
        }
    }
}

/// The 8 neighbours P2..P9 of (x, y) in clockwise order starting north.
/// North is y + 1 (bottom-origin grids).
#[inline]
fn neighbours(r: &BinaryRaster, x: i64, y: i64) -> [u8; 8] {
    [
        r.at(x, y + 1),     // P2 N
        r.at(x + 1, y + 1), // P3 NE
        r.at(x + 1, y),     // P4 E
        r.at(x + 1, y - 1), // P5 SE
        r.at(x, y - 1),     // P6 S
        r.at(x - 1, y - 1), // P7 SW
        r.at(x - 1, y),     // P8 W
        r.at(x - 1, y + 1), // P9 NW
    ]
}

/// Number of 0→1 transitions reading P2..P9 cyclically.
#[inline]
fn transitions(n: &[u8; 8]) -> u32 {
    let mut count = 0;
    for i in 0..8 {
        if n[i] == 0 && n[(i + 1) % 8] == 1 {
            count += 1;
        }
    }
    count
}

/// Iterative Zhang–Suen thinning. Reduces foreground regions to an
/// 8-connected one-pixel-wide skeleton; terminates when a full pair of
/// sub-iterations removes no pixels.
pub fn thin_zhang_suen(raster: &mut BinaryRaster) {
    let mut to_clear: Vec<usize> = Vec::new();

    loop {
        let mut removed = 0usize;

        for sub in 0..2 {
            to_clear.clear();

            for y in 0..raster.height as i64 {
                for x in 0..raster.width as i64 {
                    if raster.at(x, y) == 0 {
                        continue;
                    }
                    let n = neighbours(raster, x, y);
                    let b: u32 = n.iter().map(|&v| v as u32).sum();
                    if !(2..=6).contains(&b) {
                        continue;
                    }
                    if transitions(&n) != 1 {
                        continue;
                    }
                    let (p2, p4, p6, p8) = (n[0], n[2], n[4], n[6]);
                    let guards_hold = if sub == 0 {
                        p2 * p4 * p6 == 0 && p4 * p6 * p8 == 0
                    } else {
                        p2 * p4 * p8 == 0 && p2 * p6 * p8 == 0
                    };
                    if guards_hold {
                        to_clear.push(y as usize * raster.width + x as usize);
                    }
                }
            }

            for &i in &to_clear {
                raster.data[i] = 0;
            }
            removed += to_clear.len();
        }

        if removed == 0 {
            break;
        }
    }
}
