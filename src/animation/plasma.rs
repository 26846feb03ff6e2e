//! Classic sine plasma, sampled in region-local coordinates so it turns with
//! its region.

use super::{Animation, AnimationSpec, Capabilities, FrameInfo, Param, ParamKind};
use crate::compositor::Canvas;
use crate::display::{expand_palette, make_palette, Color};

const PALETTE_SIZE: usize = 256;

pub struct Plasma {
    time: f32,
    speed: f32,
    palette_keys: Vec<Color>,
    palette: Vec<Color>,
    sin_table: Vec<f32>,
}

impl Plasma {
    pub fn new() -> Self {
        // Pre-compute sine table for speed
        let sin_table: Vec<f32> = (0..256)
            .map(|i| (i as f32 * std::f32::consts::TAU / 256.0).sin())
            .collect();

        Self {
            time: 0.0,
            speed: 1.0,
            palette_keys: Vec::new(),
            palette: make_palette(PALETTE_SIZE),
            sin_table,
        }
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_palette(mut self, keys: &[Color]) -> Self {
        self.set_palette(keys.to_vec());
        self
    }

    fn set_palette(&mut self, keys: Vec<Color>) {
        self.palette = expand_palette(&keys, PALETTE_SIZE);
        self.palette_keys = keys;
    }

    #[inline]
    fn fast_sin(sin_table: &[f32], x: f32) -> f32 {
        let idx = ((x * 40.74) as i32 & 255) as usize;
        sin_table[idx]
    }

    fn color_at(&self, x: f32, y: f32) -> Color {
        let t = self.time;
        let table = &self.sin_table;

        // Classic plasma formula - sum of sines at different frequencies
        let v1 = Self::fast_sin(table, x * 0.02 + t);
        let v2 = Self::fast_sin(table, y * 0.03 + t * 0.5);
        let v3 = Self::fast_sin(table, (x + y) * 0.02 + t * 0.7);
        let v4 = Self::fast_sin(table, (x * x + y * y).sqrt() * 0.03 + t);

        let v = (v1 + v2 + v3 + v4 + 4.0) / 8.0; // Normalize to 0-1
        let idx = (v * (PALETTE_SIZE - 1) as f32) as usize;
        self.palette[idx.min(PALETTE_SIZE - 1)]
    }
}

impl Default for Plasma {
    fn default() -> Self {
        Self::new()
    }
}

impl Animation for Plasma {
    fn paint(&mut self, canvas: &mut Canvas<'_>, frame: &FrameInfo) -> anyhow::Result<()> {
        self.time += frame.dt * self.speed;
        canvas.shade(|x, y| Some(self.color_at(x as f32, y as f32)));
        Ok(())
    }

    fn name(&self) -> &str {
        "Plasma"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            palette: true,
            speed: true,
            ..Capabilities::default()
        }
    }

    fn param(&self, kind: ParamKind) -> Option<Param> {
        match kind {
            ParamKind::Speed => Some(Param::Speed(self.speed)),
            ParamKind::Palette => Some(Param::Palette(self.palette_keys.clone())),
            _ => None,
        }
    }

    fn set_param(&mut self, param: Param) -> bool {
        match param {
            Param::Speed(speed) if speed.is_finite() => {
                self.speed = speed;
                true
            }
            Param::Palette(keys) => {
                self.set_palette(keys);
                true
            }
            _ => false,
        }
    }

    fn spec(&self) -> Option<AnimationSpec> {
        Some(AnimationSpec::Plasma {
            speed: self.speed,
            palette: self.palette_keys.clone(),
        })
    }
}
