//! Device pixel mapper: composited buffer -> per-device RGB bytes
//!
//! Pixels are spread edge to edge across the device footprint. Offsets are
//! taken from the device center, rotated with the device, and sampled at the
//! nearest buffer pixel, clamped to the buffer.

use kurbo::{Point, Vec2};

use super::{grid_cell, Device, Topology};
use crate::display::PixelBuffer;
use crate::geometry::Bounds;

/// Spacing between `count` samples spread over `extent`; a lone sample sits on the center line
fn spread(extent: f64, count: u32, index: u32) -> f64 {
    if count <= 1 {
        0.0
    } else {
        -extent / 2.0 + index as f64 * (extent / (count - 1) as f64)
    }
}

/// Center-relative, unrotated offset of pixel `index`
pub fn local_offset(topology: Topology, pixel_count: u32, width: f64, height: f64, index: u32) -> Vec2 {
    match topology {
        Topology::Strip => Vec2::new(spread(width, pixel_count, index), 0.0),
        Topology::Matrix {
            columns,
            rows,
            serpentine,
        } => {
            let (col, row) = grid_cell(index, columns, serpentine);
            Vec2::new(spread(width, columns, col), spread(height, rows, row))
        }
    }
}

/// Nearest buffer pixel for a world point, clamped into `width x height`
pub fn sample_index(world: Point, bounds: &Bounds, width: u32, height: u32) -> (u32, u32) {
    let rel = world - bounds.origin();
    (clamp_axis(rel.x, width), clamp_axis(rel.y, height))
}

fn clamp_axis(v: f64, extent: u32) -> u32 {
    let max = extent.saturating_sub(1) as f64;
    // NaN falls through to 0
    v.round().clamp(0.0, max).max(0.0) as u32
}

/// Buffer sample point for every pixel of `device`, in pixel-index order
pub fn sample_points<'a>(
    device: &'a Device,
    bounds: &'a Bounds,
    width: u32,
    height: u32,
) -> impl Iterator<Item = (u32, u32)> + 'a {
    let topology = device.topology();
    let to_world = device.placement.center_to_world();
    let (w, h) = (device.placement.width, device.placement.height);
    (0..device.pixel_count).map(move |i| {
        let offset = local_offset(topology, device.pixel_count, w, h, i);
        sample_index(to_world * offset.to_point(), bounds, width, height)
    })
}

/// Overwrite `out` with the device's RGB triples in physical pixel order
pub fn map_device(device: &Device, buffer: &PixelBuffer, bounds: &Bounds, out: &mut Vec<u8>) {
    out.clear();
    out.reserve(device.frame_len());
    for (x, y) in sample_points(device, bounds, buffer.width(), buffer.height()) {
        let c = buffer.get_pixel(x as i64, y as i64);
        out.extend_from_slice(&[c.r, c.g, c.b]);
    }
}
