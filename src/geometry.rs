//! World-space geometry: rotated rectangles and the padded render bounds
//!
//! World space is y-down. A positive rotation turns a placement clockwise on
//! screen about its own center, the same convention the canvas uses.

use kurbo::{Affine, Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// Padding added on every side of the render bounds, in world units
pub const BOUNDS_PADDING: f64 = 100.0;

/// Tolerance for inclusive edge tests after a round trip through a rotation
pub const GEOMETRY_EPSILON: f64 = 1e-6;

/// Largest side of the canvas buffer, in pixels. Also bounds every placement
/// corner, in world units, on both sides of the origin.
pub const MAX_CANVAS_DIM: u32 = 4096;

/// An axis-aligned rectangle rotated about its own center
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Degrees, clockwise, about the center
    #[serde(default)]
    pub rotation: f64,
}

impl Placement {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            rotation: 0.0,
        }
    }

    pub fn with_rotation(mut self, degrees: f64) -> Self {
        self.rotation = degrees;
        self
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.rotation.is_finite()
    }

    /// Why this placement cannot be drawn or sampled, if it cannot
    pub fn problem(&self) -> Option<&'static str> {
        if !self.is_finite() {
            return Some("placement has a non-finite field");
        }
        let limit = MAX_CANVAS_DIM as f64;
        if self
            .corners()
            .iter()
            .any(|c| c.x.abs() > limit || c.y.abs() > limit)
        {
            return Some("placement reaches past the canvas size limit");
        }
        None
    }

    /// The unrotated rectangle in local space, top-left at the origin
    pub fn local_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }

    /// Local space (top-left origin) to world space
    ///
    /// Translate to the top-left, then rotate about the center.
    pub fn local_to_world(&self) -> Affine {
        Affine::rotate_about(self.rotation.to_radians(), self.center())
            * Affine::translate((self.x, self.y))
    }

    /// Center-relative offsets to world space
    pub fn center_to_world(&self) -> Affine {
        Affine::translate(self.center().to_vec2()) * Affine::rotate(self.rotation.to_radians())
    }

    /// World point back into local space
    pub fn world_to_local(&self, world: Point) -> Point {
        // Rotation + translation only, so the inverse always exists
        self.local_to_world().inverse() * world
    }

    /// World-space vector expressed in this placement's rotated frame
    pub fn world_vector_to_local(&self, v: Vec2) -> Vec2 {
        (Affine::rotate(-self.rotation.to_radians()) * v.to_point()).to_vec2()
    }

    /// Inclusive containment test for a local-space point
    pub fn contains_local(&self, local: Point) -> bool {
        contains_inclusive(self.local_rect(), local)
    }

    /// The four rotated corners in world space, clockwise from top-left
    pub fn corners(&self) -> [Point; 4] {
        let hw = self.width / 2.0;
        let hh = self.height / 2.0;
        let to_world = self.center_to_world();
        [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)].map(|(x, y)| to_world * Point::new(x, y))
    }
}

/// Inclusive point-in-rect with [`GEOMETRY_EPSILON`] slack on every edge
#[inline]
pub fn contains_inclusive(rect: Rect, p: Point) -> bool {
    p.x >= rect.x0 - GEOMETRY_EPSILON
        && p.x <= rect.x1 + GEOMETRY_EPSILON
        && p.y >= rect.y0 - GEOMETRY_EPSILON
        && p.y <= rect.y1 + GEOMETRY_EPSILON
}

/// Padded world-space extent of everything drawn or sampled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Buffer pixel (0, 0) sits at this world point
    pub fn origin(&self) -> Point {
        Point::new(self.min_x, self.min_y)
    }

    /// Buffer dimensions in pixels, between 1x1 and `MAX_CANVAS_DIM` per side
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            ceil_extent(self.max_x - self.min_x),
            ceil_extent(self.max_y - self.min_y),
        )
    }

    pub fn contains(&self, p: Point, eps: f64) -> bool {
        p.x >= self.min_x - eps
            && p.x <= self.max_x + eps
            && p.y >= self.min_y - eps
            && p.y <= self.max_y + eps
    }

    fn around(p: Point) -> Self {
        Self {
            min_x: p.x,
            min_y: p.y,
            max_x: p.x,
            max_y: p.y,
        }
    }

    fn include(&mut self, p: Point) {
        self.min_x = self.min_x.min(p.x);
        self.min_y = self.min_y.min(p.y);
        self.max_x = self.max_x.max(p.x);
        self.max_y = self.max_y.max(p.y);
    }

    fn pad(mut self, padding: f64) -> Self {
        self.min_x -= padding;
        self.min_y -= padding;
        self.max_x += padding;
        self.max_y += padding;
        self
    }
}

fn ceil_extent(extent: f64) -> u32 {
    if extent.is_finite() && extent >= 1.0 {
        extent.ceil().min(MAX_CANVAS_DIM as f64) as u32
    } else {
        1
    }
}

/// Minimal padded box around the base canvas plus every device and region
///
/// Pure and idempotent. Placements with non-finite fields are ignored.
pub fn recompute<'a, D, R>(base_width: f64, base_height: f64, devices: D, regions: R) -> Bounds
where
    D: IntoIterator<Item = &'a Placement>,
    R: IntoIterator<Item = &'a Placement>,
{
    recompute_padded(base_width, base_height, devices, regions, BOUNDS_PADDING)
}

pub fn recompute_padded<'a, D, R>(
    base_width: f64,
    base_height: f64,
    devices: D,
    regions: R,
    padding: f64,
) -> Bounds
where
    D: IntoIterator<Item = &'a Placement>,
    R: IntoIterator<Item = &'a Placement>,
{
    let mut bounds = Bounds::around(Point::ORIGIN);
    bounds.include(Point::new(base_width.max(0.0), base_height.max(0.0)));

    for placement in devices.into_iter().chain(regions) {
        if !placement.is_finite() {
            continue;
        }
        for corner in placement.corners() {
            bounds.include(corner);
        }
    }

    bounds.pad(padding)
}
