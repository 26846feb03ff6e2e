use super::Color;

// ============================================================================
// Utility Functions
// ============================================================================

/// Alpha blend a single color channel
/// Uses fast approximation: (x + 1 + (x >> 8)) >> 8 instead of x / 255
#[inline]
fn blend_channel(src: u8, dst: u8, alpha: u16) -> u8 {
    let result = src as u16 * alpha + dst as u16 * (255 - alpha);
    ((result + 1 + (result >> 8)) >> 8) as u8
}

/// Write ABGR pixel to slice (RGBA8888 little-endian byte order)
#[inline]
fn write_pixel(dest: &mut [u8], color: Color) {
    dest[0] = 255; // A
    dest[1] = color.b;
    dest[2] = color.g;
    dest[3] = color.r;
}

// ============================================================================
// PixelBuffer
// ============================================================================

/// RGBA8888 pixel buffer backing the shared canvas
///
/// Pixel `(x, y)` stands for the world point `origin + (x, y)`; the origin
/// itself lives with the render bounds, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl PixelBuffer {
    /// Create a pixel buffer, clamping each dimension to at least 1
    pub fn with_size(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let mut buffer = Self {
            pixels: vec![0; width as usize * height as usize * 4],
            width,
            height,
        };
        buffer.clear(Color::BLACK);
        buffer
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Check if coordinates are within bounds
    #[inline]
    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && x < self.width as i64 && y >= 0 && y < self.height as i64
    }

    /// Calculate byte offset for pixel at (x, y)
    #[inline]
    fn pixel_index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// Reallocate when the requested size differs; returns true if it did
    ///
    /// The new allocation starts black. Zero-sized requests clamp to 1x1.
    pub fn ensure_size(&mut self, width: u32, height: u32) -> bool {
        let width = width.max(1);
        let height = height.max(1);
        if width == self.width && height == self.height {
            return false;
        }
        *self = Self::with_size(width, height);
        true
    }

    /// Clear to a solid color
    pub fn clear(&mut self, color: Color) {
        let pixel = [255, color.b, color.g, color.r];
        for chunk in self.pixels.chunks_exact_mut(4) {
            chunk.copy_from_slice(&pixel);
        }
    }

    /// Write a pixel, alpha blending when the color is translucent (bounds checked)
    #[inline]
    pub fn set_pixel(&mut self, x: i64, y: i64, color: Color) {
        if !self.in_bounds(x, y) {
            return;
        }
        let idx = self.pixel_index(x as u32, y as u32);
        match color.a {
            0 => {}
            255 => write_pixel(&mut self.pixels[idx..idx + 4], color),
            a => {
                let alpha = a as u16;
                self.pixels[idx] = 255; // A - always opaque
                self.pixels[idx + 1] = blend_channel(color.b, self.pixels[idx + 1], alpha);
                self.pixels[idx + 2] = blend_channel(color.g, self.pixels[idx + 2], alpha);
                self.pixels[idx + 3] = blend_channel(color.r, self.pixels[idx + 3], alpha);
            }
        }
    }

    /// Read a pixel; out-of-range reads return black
    #[inline]
    pub fn get_pixel(&self, x: i64, y: i64) -> Color {
        self.try_pixel(x, y).unwrap_or(Color::BLACK)
    }

    /// Read a pixel, or None if out of bounds
    #[inline]
    pub fn try_pixel(&self, x: i64, y: i64) -> Option<Color> {
        if !self.in_bounds(x, y) {
            return None;
        }
        let idx = self.pixel_index(x as u32, y as u32);
        Some(Color::rgb(
            self.pixels[idx + 3], // R
            self.pixels[idx + 2], // G
            self.pixels[idx + 1], // B
        ))
    }

    /// Raw ABGR bytes, row-major, for texture upload
    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    /// Bytes per row
    pub fn pitch(&self) -> usize {
        self.width as usize * 4
    }
}
