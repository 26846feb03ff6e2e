//! Compositor: paints every region into the shared buffer through a
//! save/restore transform stack.
//!
//! Rasterization works backwards: each candidate buffer pixel is mapped into
//! local space and tested against the primitive and every active clip. Rotated
//! regions therefore come out hole-free.
//!
//! A buffer pixel owns the unit cell centered on it, the same cell the device
//! mapper rounds a sample into. Clips keep every pixel whose cell may reach
//! into them, so a region always covers each sample taken inside it.

use kurbo::{Affine, Point, Rect, Vec2};

use crate::animation::FrameInfo;
use crate::display::{Color, PixelBuffer};
use crate::geometry::{contains_inclusive, Bounds, GEOMETRY_EPSILON};
use crate::regions::Region;

/// Below this the current transform is treated as non-invertible
const MIN_DETERMINANT: f64 = 1e-12;

#[derive(Debug, Clone, Copy)]
struct Clip {
    /// Buffer space to the space the clip was declared in
    to_local: Affine,
    /// Declared rect grown by the local extent of half a buffer cell
    rect: Rect,
    /// Buffer-space bounding box of the clip, grown by half a cell
    bbox: Rect,
}

/// Half a buffer cell measured along each local axis
fn half_cell(to_local: Affine) -> (f64, f64) {
    let [a, b, c, d, _, _] = to_local.as_coeffs();
    (0.5 * (a.abs() + c.abs()), 0.5 * (b.abs() + d.abs()))
}

#[derive(Debug, Clone)]
struct CanvasState {
    /// Current local space to buffer pixels
    transform: Affine,
    clips: Vec<Clip>,
    /// Set once a clip under a degenerate transform empties the drawable area
    empty: bool,
}

/// Drawing surface handed to animations
///
/// All coordinates are in the current local space. `save`/`restore` push and
/// pop the transform and clip together.
pub struct Canvas<'a> {
    buffer: &'a mut PixelBuffer,
    state: CanvasState,
    stack: Vec<CanvasState>,
}

impl<'a> Canvas<'a> {
    /// `base` maps world coordinates to buffer pixels
    pub fn new(buffer: &'a mut PixelBuffer, base: Affine) -> Self {
        Self {
            buffer,
            state: CanvasState {
                transform: base,
                clips: Vec::new(),
                empty: false,
            },
            stack: Vec::new(),
        }
    }

    /// Canvas whose world origin sits at the bounds origin
    pub fn for_bounds(buffer: &'a mut PixelBuffer, bounds: &Bounds) -> Self {
        Self::new(buffer, Affine::translate(-bounds.origin().to_vec2()))
    }

    // ------------------------------------------------------------------------
    // State stack
    // ------------------------------------------------------------------------

    /// Push the current state; returns the depth to hand to [`Canvas::restore_to_count`]
    pub fn save(&mut self) -> usize {
        let depth = self.stack.len();
        self.stack.push(self.state.clone());
        depth
    }

    /// Pop one saved state. Unbalanced restores are ignored.
    pub fn restore(&mut self) {
        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
    }

    /// Pop until exactly `depth` saved states remain
    pub fn restore_to_count(&mut self, depth: usize) {
        while self.stack.len() > depth {
            self.restore();
        }
    }

    pub fn save_count(&self) -> usize {
        self.stack.len()
    }

    /// Current local space to buffer pixels
    pub fn transform(&self) -> Affine {
        self.state.transform
    }

    pub fn concat(&mut self, affine: Affine) {
        self.state.transform = self.state.transform * affine;
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.concat(Affine::translate(Vec2::new(dx, dy)));
    }

    /// Rotate by `degrees` (clockwise) about the local origin
    pub fn rotate(&mut self, degrees: f64) {
        self.concat(Affine::rotate(degrees.to_radians()));
    }

    pub fn rotate_about(&mut self, degrees: f64, cx: f64, cy: f64) {
        self.concat(Affine::rotate_about(degrees.to_radians(), Point::new(cx, cy)));
    }

    pub fn scale(&mut self, sx: f64, sy: f64) {
        self.concat(Affine::scale_non_uniform(sx, sy));
    }

    /// Intersect the drawable area with `rect` in the current local space
    ///
    /// Pixels whose cell touches the rect stay drawable, so edges are widened
    /// by up to half a buffer cell.
    pub fn clip_rect(&mut self, rect: Rect) {
        let rect = rect.abs();
        match invert(self.state.transform) {
            Some(to_local) => {
                let (mx, my) = half_cell(to_local);
                self.state.clips.push(Clip {
                    to_local,
                    rect: rect.inflate(mx, my),
                    bbox: self.state.transform.transform_rect_bbox(rect).inflate(0.5, 0.5),
                });
            }
            None => self.state.empty = true,
        }
    }

    // ------------------------------------------------------------------------
    // Drawing
    // ------------------------------------------------------------------------

    /// Fill the whole clip area
    pub fn fill(&mut self, color: Color) {
        self.raster(None, |_| Some(color));
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Color) {
        let rect = rect.abs();
        self.raster(Some(rect), |p| contains_inclusive(rect, p).then_some(color));
    }

    pub fn fill_circle(&mut self, cx: f64, cy: f64, radius: f64, color: Color) {
        if radius < 0.0 {
            return;
        }
        let center = Point::new(cx, cy);
        let bbox = Rect::new(cx - radius, cy - radius, cx + radius, cy + radius);
        let limit = radius + GEOMETRY_EPSILON;
        self.raster(Some(bbox), |p| (p.distance(center) <= limit).then_some(color));
    }

    /// Per-pixel shader over the clip area, called with local coordinates.
    /// Returning None leaves the pixel untouched.
    pub fn shade(&mut self, mut shader: impl FnMut(f64, f64) -> Option<Color>) {
        self.raster(None, |p| shader(p.x, p.y));
    }

    /// Visit every buffer pixel inside the clips (and inside `local_bounds`,
    /// if given), handing the paint callback its local-space position
    fn raster(&mut self, local_bounds: Option<Rect>, mut paint: impl FnMut(Point) -> Option<Color>) {
        if self.state.empty {
            return;
        }
        let Some(to_local) = invert(self.state.transform) else {
            return;
        };

        let max_x = (self.buffer.width() - 1) as f64;
        let max_y = (self.buffer.height() - 1) as f64;
        let mut area = Rect::new(0.0, 0.0, max_x, max_y);
        if let Some(bounds) = local_bounds {
            area = intersect(area, self.state.transform.transform_rect_bbox(bounds));
        }
        for clip in &self.state.clips {
            area = intersect(area, clip.bbox);
        }

        let x0 = (area.x0 - GEOMETRY_EPSILON).ceil().max(0.0);
        let y0 = (area.y0 - GEOMETRY_EPSILON).ceil().max(0.0);
        let x1 = (area.x1 + GEOMETRY_EPSILON).floor().min(max_x);
        let y1 = (area.y1 + GEOMETRY_EPSILON).floor().min(max_y);
        if !(x0 <= x1 && y0 <= y1) {
            return;
        }

        let clips = &self.state.clips;
        for py in y0 as i64..=y1 as i64 {
            for px in x0 as i64..=x1 as i64 {
                let p = Point::new(px as f64, py as f64);
                if !clips.iter().all(|c| contains_inclusive(c.rect, c.to_local * p)) {
                    continue;
                }
                if let Some(color) = paint(to_local * p) {
                    self.buffer.set_pixel(px, py, color);
                }
            }
        }
    }
}

fn invert(affine: Affine) -> Option<Affine> {
    (affine.determinant().abs() > MIN_DETERMINANT).then(|| affine.inverse())
}

/// Rect intersection that keeps inverted edges so emptiness stays detectable
fn intersect(a: Rect, b: Rect) -> Rect {
    Rect::new(a.x0.max(b.x0), a.y0.max(b.y0), a.x1.min(b.x1), a.y1.min(b.y1))
}

// ============================================================================
// Frame compositing
// ============================================================================

/// Timing fed to every producer for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameClock {
    pub dt: f32,
    pub elapsed: f32,
    pub frame: u64,
}

/// Outcome of one compositing pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeReport {
    pub painted: usize,
    /// Ids of regions whose producer failed this frame
    pub failed: Vec<String>,
}

/// Clear the buffer to black and paint every region in z-order
///
/// Each region gets its own save/restore pair, so a producer that errors,
/// panics, or leaves its own saves unbalanced cannot leak state into the next.
pub fn composite<'r>(
    buffer: &mut PixelBuffer,
    bounds: &Bounds,
    regions: impl IntoIterator<Item = &'r Region>,
    clock: FrameClock,
) -> CompositeReport {
    buffer.clear(Color::BLACK);
    let mut canvas = Canvas::for_bounds(buffer, bounds);
    let mut report = CompositeReport::default();

    for region in regions {
        let placement = region.placement();
        let depth = canvas.save();
        canvas.concat(placement.local_to_world());
        canvas.clip_rect(placement.local_rect());

        let frame = FrameInfo {
            width: placement.width,
            height: placement.height,
            dt: clock.dt,
            elapsed: clock.elapsed,
            frame: clock.frame,
        };
        let outcome = region.producer().paint(&mut canvas, &frame);
        canvas.restore_to_count(depth);

        match outcome {
            Ok(()) => report.painted += 1,
            Err(err) => {
                tracing::warn!(region = %region.id(), error = %err, "region skipped this frame");
                report.failed.push(region.id().to_string());
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{Animation, Producer, Solid};
    use crate::geometry::{recompute_padded, Placement};

    const NO_DEVICES: [Placement; 0] = [];

    fn world_canvas(buffer: &mut PixelBuffer) -> Canvas<'_> {
        Canvas::new(buffer, Affine::IDENTITY)
    }

    #[test]
    fn fill_rect_is_edge_inclusive() {
        let mut buf = PixelBuffer::with_size(10, 10);
        let mut canvas = world_canvas(&mut buf);
        canvas.fill_rect(Rect::new(2.0, 2.0, 4.0, 3.0), Color::RED);
        assert_eq!(buf.get_pixel(2, 2), Color::RED);
        assert_eq!(buf.get_pixel(4, 3), Color::RED);
        assert_eq!(buf.get_pixel(5, 3), Color::BLACK);
        assert_eq!(buf.get_pixel(1, 2), Color::BLACK);
    }

    #[test]
    fn clip_limits_fill() {
        let mut buf = PixelBuffer::with_size(10, 10);
        let mut canvas = world_canvas(&mut buf);
        canvas.clip_rect(Rect::new(0.0, 0.0, 3.0, 3.0));
        canvas.fill(Color::GREEN);
        assert_eq!(buf.get_pixel(3, 3), Color::GREEN);
        assert_eq!(buf.get_pixel(4, 0), Color::BLACK);
    }

    #[test]
    fn clip_keeps_pixels_whose_cell_touches_it() {
        let mut buf = PixelBuffer::with_size(10, 10);
        let mut canvas = world_canvas(&mut buf);
        canvas.clip_rect(Rect::new(2.3, 2.3, 5.6, 5.6));
        canvas.fill(Color::GREEN);
        // Cells centered on 2 and 6 overlap the fractional edges
        assert_eq!(buf.get_pixel(2, 2), Color::GREEN);
        assert_eq!(buf.get_pixel(6, 6), Color::GREEN);
        assert_eq!(buf.get_pixel(1, 2), Color::BLACK);
        assert_eq!(buf.get_pixel(7, 6), Color::BLACK);
    }

    #[test]
    fn restore_drops_clip_and_transform() {
        let mut buf = PixelBuffer::with_size(10, 10);
        let mut canvas = world_canvas(&mut buf);
        let depth = canvas.save();
        canvas.translate(5.0, 5.0);
        canvas.clip_rect(Rect::new(0.0, 0.0, 1.0, 1.0));
        canvas.save();
        canvas.rotate(45.0);
        canvas.restore_to_count(depth);
        assert_eq!(canvas.save_count(), 0);
        assert_eq!(canvas.transform(), Affine::IDENTITY);
        canvas.fill(Color::BLUE);
        assert_eq!(buf.get_pixel(0, 0), Color::BLUE);
        assert_eq!(buf.get_pixel(9, 9), Color::BLUE);
    }

    #[test]
    fn unbalanced_restore_is_harmless() {
        let mut buf = PixelBuffer::with_size(2, 2);
        let mut canvas = world_canvas(&mut buf);
        canvas.restore();
        canvas.fill(Color::WHITE);
        assert_eq!(buf.get_pixel(1, 1), Color::WHITE);
    }

    #[test]
    fn rotated_fill_has_no_holes() {
        let mut buf = PixelBuffer::with_size(100, 100);
        let mut canvas = world_canvas(&mut buf);
        canvas.rotate_about(30.0, 50.0, 50.0);
        canvas.fill_rect(Rect::new(20.0, 20.0, 80.0, 80.0), Color::WHITE);
        // The inscribed circle of the rotated square is always covered
        for y in 0..100 {
            for x in 0..100 {
                let d = Point::new(x as f64, y as f64).distance(Point::new(50.0, 50.0));
                if d < 29.0 {
                    assert_eq!(buf.get_pixel(x, y), Color::WHITE, "hole at {x},{y}");
                }
            }
        }
        // Corners of the buffer stay untouched
        assert_eq!(buf.get_pixel(0, 0), Color::BLACK);
    }

    #[test]
    fn degenerate_scale_draws_nothing() {
        let mut buf = PixelBuffer::with_size(4, 4);
        let mut canvas = world_canvas(&mut buf);
        canvas.scale(0.0, 1.0);
        canvas.fill(Color::RED);
        canvas.clip_rect(Rect::new(0.0, 0.0, 1.0, 1.0));
        canvas.fill(Color::RED);
        assert!(buf.as_bytes().chunks(4).all(|p| p[1..] == [0, 0, 0]));
    }

    #[test]
    fn fill_circle_covers_center_only_within_radius() {
        let mut buf = PixelBuffer::with_size(20, 20);
        let mut canvas = world_canvas(&mut buf);
        canvas.fill_circle(10.0, 10.0, 3.0, Color::RED);
        assert_eq!(buf.get_pixel(10, 10), Color::RED);
        assert_eq!(buf.get_pixel(13, 10), Color::RED);
        assert_eq!(buf.get_pixel(13, 13), Color::BLACK);
    }

    #[test]
    fn shade_sees_local_coordinates() {
        let mut buf = PixelBuffer::with_size(20, 20);
        let mut canvas = world_canvas(&mut buf);
        canvas.translate(5.0, 5.0);
        canvas.clip_rect(Rect::new(0.0, 0.0, 2.0, 2.0));
        let mut seen = Vec::new();
        canvas.shade(|x, y| {
            seen.push((x, y));
            None
        });
        assert_eq!(seen.len(), 9);
        assert!(seen.contains(&(0.0, 0.0)));
        assert!(seen.contains(&(2.0, 2.0)));
    }

    struct Failing;

    impl Animation for Failing {
        fn paint(&mut self, canvas: &mut Canvas<'_>, _frame: &FrameInfo) -> anyhow::Result<()> {
            // Leave the stack unbalanced and a bogus transform behind
            canvas.save();
            canvas.scale(1000.0, 1000.0);
            anyhow::bail!("out of paint")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct Panicking;

    impl Animation for Panicking {
        fn paint(&mut self, canvas: &mut Canvas<'_>, _frame: &FrameInfo) -> anyhow::Result<()> {
            canvas.translate(1e6, 1e6);
            panic!("producer exploded");
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    #[test]
    fn broken_producers_do_not_affect_later_regions() {
        let regions = vec![
            Region::new("bad", Placement::new(0.0, 0.0, 10.0, 10.0), Producer::new(Failing)),
            Region::new("worse", Placement::new(0.0, 0.0, 10.0, 10.0), Producer::new(Panicking)),
            Region::new(
                "good",
                Placement::new(0.0, 0.0, 10.0, 10.0),
                Producer::new(Solid::new(Color::GREEN)),
            ),
        ];
        let bounds = recompute_padded(10.0, 10.0, &NO_DEVICES, regions.iter().map(Region::placement), 0.0);
        let mut buf = PixelBuffer::with_size(10, 10);
        let report = composite(&mut buf, &bounds, &regions, FrameClock::default());

        assert_eq!(report.painted, 1);
        assert_eq!(report.failed, vec!["bad".to_string(), "worse".to_string()]);
        assert_eq!(buf.get_pixel(0, 0), Color::GREEN);
        assert_eq!(buf.get_pixel(9, 9), Color::GREEN);
    }

    #[test]
    fn later_regions_paint_on_top() {
        let regions = vec![
            Region::new(
                "back",
                Placement::new(0.0, 0.0, 10.0, 10.0),
                Producer::new(Solid::new(Color::RED)),
            ),
            Region::new(
                "front",
                Placement::new(5.0, 0.0, 5.0, 10.0),
                Producer::new(Solid::new(Color::BLUE)),
            ),
        ];
        let bounds = recompute_padded(10.0, 10.0, &NO_DEVICES, regions.iter().map(Region::placement), 0.0);
        let mut buf = PixelBuffer::with_size(11, 11);
        composite(&mut buf, &bounds, &regions, FrameClock::default());
        assert_eq!(buf.get_pixel(2, 5), Color::RED);
        assert_eq!(buf.get_pixel(7, 5), Color::BLUE);
    }

    #[test]
    fn rotated_region_is_clipped_to_its_footprint() {
        let placement = Placement::new(40.0, 40.0, 20.0, 20.0).with_rotation(45.0);
        let regions = vec![Region::new(
            "diamond",
            placement,
            Producer::new(Solid::new(Color::WHITE)),
        )];
        let bounds = recompute_padded(100.0, 100.0, &NO_DEVICES, [&placement], 0.0);
        let mut buf = PixelBuffer::with_size(101, 101);
        composite(&mut buf, &bounds, &regions, FrameClock::default());
        // Center is lit, the unrotated corner falls outside the diamond
        assert_eq!(buf.get_pixel(50, 50), Color::WHITE);
        assert_eq!(buf.get_pixel(41, 41), Color::BLACK);
        // The diamond's tip reaches past the unrotated edge
        assert_eq!(buf.get_pixel(50, 37), Color::WHITE);
    }

    #[test]
    fn rotated_region_covers_the_nearest_pixel_of_every_inner_point() {
        for degrees in [30.0, 45.0, 137.0] {
            let placement = Placement::new(20.3, 31.7, 41.9, 17.2).with_rotation(degrees);
            let regions = vec![Region::new(
                "white",
                placement,
                Producer::new(Solid::new(Color::WHITE)),
            )];
            let bounds = recompute_padded(100.0, 100.0, &NO_DEVICES, [&placement], 2.0);
            let (w, h) = bounds.pixel_size();
            let mut buf = PixelBuffer::with_size(w, h);
            composite(&mut buf, &bounds, &regions, FrameClock::default());

            let to_world = placement.local_to_world();
            for i in 0..=40 {
                for j in 0..=20 {
                    let local = Point::new(
                        placement.width * i as f64 / 40.0,
                        placement.height * j as f64 / 20.0,
                    );
                    let rel = to_world * local - bounds.origin();
                    let (x, y) = (rel.x.round() as i64, rel.y.round() as i64);
                    assert_eq!(buf.get_pixel(x, y), Color::WHITE, "{degrees} deg at {local:?}");
                }
            }
        }
    }
}
