use serde::{Deserialize, Serialize};

/// 8-bit RGBA color. Alpha only matters while compositing; devices get RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(default = "opaque")]
    pub a: u8,
}

fn opaque() -> u8 {
    255
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 255, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    pub const fn rgb_tuple(self) -> (u8, u8, u8) {
        (self.r, self.g, self.b)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl From<(u8, u8, u8)> for Color {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self::rgb(r, g, b)
    }
}

/// HSV to RGB color conversion
/// h: 0-360, s: 0-1, v: 0-1
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Color {
    let h = h.rem_euclid(360.0);
    let c = v * s;
    let h_prime = h / 60.0;
    let x = c * (1.0 - ((h_prime % 2.0) - 1.0).abs());
    let m = v - c;

    let (r1, g1, b1) = match h_prime as i32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    Color::rgb(
        ((r1 + m) * 255.0) as u8,
        ((g1 + m) * 255.0) as u8,
        ((b1 + m) * 255.0) as u8,
    )
}

/// Linear interpolation between two colors, alpha included
#[inline]
pub fn lerp_color(c1: Color, c2: Color, t: f32) -> Color {
    let t = t.clamp(0.0, 1.0);
    let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t) as u8;
    Color::rgba(
        mix(c1.r, c2.r),
        mix(c1.g, c2.g),
        mix(c1.b, c2.b),
        mix(c1.a, c2.a),
    )
}

/// Rainbow palette around the hue wheel
pub fn make_palette(size: usize) -> Vec<Color> {
    (0..size)
        .map(|i| {
            let t = i as f32 / size as f32;
            hsv_to_rgb(t * 360.0, 0.8, 0.9)
        })
        .collect()
}

/// Stretch a short list of key colors into a smooth lookup table
pub fn expand_palette(keys: &[Color], size: usize) -> Vec<Color> {
    match keys {
        [] => make_palette(size),
        [only] => vec![*only; size],
        _ => (0..size)
            .map(|i| {
                let pos = i as f32 / size.max(1) as f32 * keys.len() as f32;
                let idx = pos as usize % keys.len();
                let next = (idx + 1) % keys.len();
                lerp_color(keys[idx], keys[next], pos.fract())
            })
            .collect(),
    }
}
