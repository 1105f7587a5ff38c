//! 8-connected flood-fill island statistics over a decoded greyscale layer.

use crate::error::{Error, Result};
use smallvec::SmallVec;

/// Most islands in a resin layer mask are small blobs; inline a handful of
/// flood-fill frontier pixels before the stack spills to the heap.
const STACK_INLINE_CAPACITY: usize = 32;

/// Aggregated solid-area statistics for one layer.
///
/// Invariant: `area_count == 0` implies every other field is zero (see
/// [`AreaStats::default`]).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaStats {
    pub total_solid_area: f64,
    pub largest_area: f64,
    pub smallest_area: f64,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub area_count: u32,
}

impl Default for AreaStats {
    fn default() -> Self {
        AreaStats {
            total_solid_area: 0.0,
            largest_area: 0.0,
            smallest_area: 0.0,
            min_x: 0,
            min_y: 0,
            max_x: 0,
            max_y: 0,
            area_count: 0,
        }
    }
}

const NEIGHBOURS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// A packed bitset over `width * height` pixel indices, one bit per pixel.
struct VisitedSet {
    words: Vec<u64>,
}

impl VisitedSet {
    fn new(pixel_count: usize) -> Self {
        VisitedSet {
            words: vec![0u64; pixel_count.div_ceil(64)],
        }
    }

    #[inline]
    fn is_visited(&self, idx: usize) -> bool {
        self.words[idx >> 6] & (1u64 << (idx & 63)) != 0
    }

    #[inline]
    fn mark(&mut self, idx: usize) {
        self.words[idx >> 6] |= 1u64 << (idx & 63);
    }
}

/// Compute 8-connected island statistics for a decoded greyscale layer.
///
/// `pixels` is row-major, `width * height` bytes; a pixel is solid iff it is
/// nonzero. `x_pixel_size_mm` / `y_pixel_size_mm` convert a pixel count into
/// physical area.
pub fn compute_area_stats(
    pixels: &[u8],
    width: u32,
    height: u32,
    x_pixel_size_mm: f64,
    y_pixel_size_mm: f64,
) -> Result<AreaStats> {
    if width == 0 || height == 0 {
        return Err(Error::invalid("compute_area_stats: zero dimension"));
    }
    let pixel_count = width as usize * height as usize;
    if pixels.len() != pixel_count {
        return Err(Error::invalid(format!(
            "compute_area_stats: pixel buffer length {} does not match {}x{}",
            pixels.len(),
            width,
            height
        )));
    }

    let pixel_area = x_pixel_size_mm * y_pixel_size_mm;
    let mut visited = VisitedSet::new(pixel_count);
    let mut stack: SmallVec<[(u32, u32); STACK_INLINE_CAPACITY]> = SmallVec::new();

    let mut stats = AreaStats::default();
    let mut min_x = width;
    let mut min_y = height;
    let mut max_x = 0u32;
    let mut max_y = 0u32;

    for y in 0..height {
        let row = y as usize * width as usize;
        for x in 0..width {
            let root_idx = row + x as usize;
            if pixels[root_idx] == 0 || visited.is_visited(root_idx) {
                continue;
            }

            let mut island_pixels: u64 = 0;
            stack.clear();
            stack.push((x, y));
            visited.mark(root_idx);
            island_pixels += 1;
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);

            while let Some((cx, cy)) = stack.pop() {
                for (dx, dy) in NEIGHBOURS {
                    let nx = cx as i64 + dx as i64;
                    let ny = cy as i64 + dy as i64;
                    if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                        continue;
                    }
                    let (nx, ny) = (nx as u32, ny as u32);
                    let n_idx = ny as usize * width as usize + nx as usize;
                    if pixels[n_idx] == 0 || visited.is_visited(n_idx) {
                        continue;
                    }

                    visited.mark(n_idx);
                    stack.push((nx, ny));
                    island_pixels += 1;

                    min_x = min_x.min(nx);
                    max_x = max_x.max(nx);
                    min_y = min_y.min(ny);
                    max_y = max_y.max(ny);
                }
            }

            let island_area = island_pixels as f64 * pixel_area;
            stats.total_solid_area += island_area;
            if island_area > stats.largest_area {
                stats.largest_area = island_area;
            }
            // First island wins ties: only replace `smallest_area` while
            // this is the first island seen, or a strictly smaller one.
            if stats.area_count == 0 || island_area < stats.smallest_area {
                stats.smallest_area = island_area;
            }
            stats.area_count += 1;
        }
    }

    if stats.area_count == 0 {
        return Ok(AreaStats::default());
    }

    stats.min_x = min_x;
    stats.min_y = min_y;
    stats.max_x = max_x;
    stats.max_y = max_y;
    Ok(stats)
}
