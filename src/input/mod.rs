//! Input router: world-space pointer events to the topmost region that wants them
//!
//! Works on a registry snapshot, so only the producer's own lock is taken
//! while a handler runs.

use kurbo::{Point, Vec2};

use crate::regions::Region;

/// A pan/zoom/rotate gesture in world units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gesture {
    pub pan_x: f64,
    pub pan_y: f64,
    /// Multiplicative, 1.0 = unchanged
    pub zoom: f64,
    /// Degrees, clockwise
    pub rotation: f64,
}

impl Default for Gesture {
    fn default() -> Self {
        Self {
            pan_x: 0.0,
            pan_y: 0.0,
            zoom: 1.0,
            rotation: 0.0,
        }
    }
}

/// Regions containing `world`, frontmost first, with the point in each region's local space
fn hits(regions: &[Region], world: Point) -> impl Iterator<Item = (&Region, Point)> {
    regions.iter().rev().filter_map(move |region| {
        let local = region.placement().world_to_local(world);
        region.placement().contains_local(local).then_some((region, local))
    })
}

/// Frontmost region under `world`, regardless of whether it handles input
pub fn hit_test(regions: &[Region], world: Point) -> Option<&Region> {
    hits(regions, world).next().map(|(region, _)| region)
}

/// Deliver a touch; stops at the first region reporting it handled
pub fn route_touch(regions: &[Region], world: Point) -> bool {
    for (region, local) in hits(regions, world) {
        match region.producer().touch(local.x, local.y) {
            Ok(true) => {
                tracing::debug!(region = %region.id(), x = local.x, y = local.y, "touch handled");
                return true;
            }
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(region = %region.id(), error = %err, "touch handler failed");
            }
        }
    }
    false
}

/// Deliver a gesture centred on `target`. Pan is re-expressed in each region's rotated frame.
pub fn route_transform(regions: &[Region], target: Point, gesture: Gesture) -> bool {
    let pan = Vec2::new(gesture.pan_x, gesture.pan_y);
    for (region, _) in hits(regions, target) {
        let local_pan = region.placement().world_vector_to_local(pan);
        match region
            .producer()
            .transform(local_pan.x, local_pan.y, gesture.zoom, gesture.rotation)
        {
            Ok(true) => return true,
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(region = %region.id(), error = %err, "transform handler failed");
            }
        }
    }
    false
}
