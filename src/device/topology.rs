//! Pixel topologies and the fallback heuristic for devices that don't say

/// A device at least this elongated (long side / short side) is taken for a strip
pub const STRIP_ASPECT_THRESHOLD: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// One line of pixels along the device's width
    Strip,
    /// Row-major grid; serpentine reverses every odd row
    Matrix {
        columns: u32,
        rows: u32,
        serpentine: bool,
    },
}

impl Topology {
    /// Matrix with enough rows to hold `pixel_count`
    pub fn matrix(pixel_count: u32, columns: u32, serpentine: bool) -> Self {
        let columns = columns.max(1);
        Topology::Matrix {
            columns,
            rows: pixel_count.div_ceil(columns).max(1),
            serpentine,
        }
    }
}

/// Grid cell `(col, row)` for pixel `index`
pub fn grid_cell(index: u32, columns: u32, serpentine: bool) -> (u32, u32) {
    let columns = columns.max(1);
    let row = index / columns;
    let col = index % columns;
    if serpentine && row % 2 == 1 {
        (columns - 1 - col, row)
    } else {
        (col, row)
    }
}

/// Integer square root, if `n` is a perfect square
pub fn exact_sqrt(n: u32) -> Option<u32> {
    let root = (n as f64).sqrt().round() as u32;
    (root.checked_mul(root) == Some(n)).then_some(root)
}

/// Guess a topology from pixel count and footprint when no segment width is configured
///
/// - one pixel or fewer: strip
/// - degenerate short side, or aspect >= [`STRIP_ASPECT_THRESHOLD`]: strip
/// - otherwise a matrix; columns are the exact square root when there is one,
///   else `round(sqrt(pixel_count * width / height))`, clamped to `[1, pixel_count]`
pub fn infer_topology(pixel_count: u32, width: f64, height: f64) -> Topology {
    if pixel_count <= 1 {
        return Topology::Strip;
    }
    let (long, short) = if width.abs() >= height.abs() {
        (width.abs(), height.abs())
    } else {
        (height.abs(), width.abs())
    };
    if !(short > 0.0) || long / short >= STRIP_ASPECT_THRESHOLD {
        return Topology::Strip;
    }

    let columns = exact_sqrt(pixel_count).unwrap_or_else(|| {
        let aspect = width.abs() / height.abs();
        ((pixel_count as f64 * aspect).sqrt().round() as u32).clamp(1, pixel_count)
    });
    Topology::matrix(pixel_count, columns, false)
}
