//! Ripples: expanding rings dropped by touches and, optionally, by "rain"
//!
//! Rings are drawn translucent, so regions underneath show through.

use super::{Animation, AnimationSpec, Capabilities, FrameInfo, Param, ParamKind};
use crate::compositor::Canvas;
use crate::display::Color;
use crate::util::Rng;

const MAX_RINGS: usize = 32;
const RING_LIFETIME: f32 = 2.5; // seconds
const RING_GROWTH: f32 = 120.0; // local units per second at speed 1
const RING_WIDTH: f32 = 14.0;
const MIN_GROWTH_SCALE: f64 = 0.1;
const MAX_GROWTH_SCALE: f64 = 10.0;

struct Ring {
    x: f32,
    y: f32,
    age: f32,
}

pub struct Ripples {
    color: Color,
    speed: f32,
    growth_scale: f32,
    rain_interval: f32,
    until_rain: f32,
    rings: Vec<Ring>,
    rng: Rng,
}

impl Ripples {
    pub fn new(color: Color) -> Self {
        Self {
            color,
            speed: 1.0,
            growth_scale: 1.0,
            rain_interval: 0.0,
            until_rain: 0.0,
            rings: Vec::with_capacity(MAX_RINGS),
            rng: Rng::new(0xD20F),
        }
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    /// Drop a ring every `interval` seconds on average; 0 disables
    pub fn with_rain(mut self, interval: f32) -> Self {
        self.rain_interval = interval.max(0.0);
        self.until_rain = self.rain_interval;
        self
    }

    pub fn ring_count(&self) -> usize {
        self.rings.len()
    }

    fn drop_ring(&mut self, x: f32, y: f32) {
        if self.rings.len() == MAX_RINGS {
            self.rings.remove(0);
        }
        self.rings.push(Ring { x, y, age: 0.0 });
    }

    fn advance(&mut self, frame: &FrameInfo) {
        let dt = frame.dt * self.speed;
        for ring in &mut self.rings {
            ring.age += dt;
        }
        self.rings.retain(|r| r.age < RING_LIFETIME);

        if self.rain_interval > 0.0 {
            self.until_rain -= frame.dt;
            if self.until_rain <= 0.0 {
                let x = self.rng.range_f32(0.0, frame.width as f32);
                let y = self.rng.range_f32(0.0, frame.height as f32);
                self.drop_ring(x, y);
                self.until_rain = self
                    .rng
                    .range_f32(self.rain_interval * 0.5, self.rain_interval * 1.5);
            }
        }
    }

    fn intensity_at(&self, x: f32, y: f32) -> f32 {
        let growth = RING_GROWTH * self.growth_scale;
        self.rings
            .iter()
            .map(|ring| {
                let radius = ring.age * growth;
                let dist = ((x - ring.x).powi(2) + (y - ring.y).powi(2)).sqrt();
                let band = 1.0 - (dist - radius).abs() / RING_WIDTH;
                let fade = 1.0 - ring.age / RING_LIFETIME;
                band.max(0.0) * fade
            })
            .fold(0.0, f32::max)
    }
}

impl Animation for Ripples {
    fn paint(&mut self, canvas: &mut Canvas<'_>, frame: &FrameInfo) -> anyhow::Result<()> {
        self.advance(frame);
        if self.rings.is_empty() {
            return Ok(());
        }
        let color = self.color;
        canvas.shade(|x, y| {
            let intensity = self.intensity_at(x as f32, y as f32);
            (intensity > 0.0).then(|| color.with_alpha((intensity * 255.0) as u8))
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "Ripples"
    }

    fn on_touch(&mut self, x: f64, y: f64) -> bool {
        self.drop_ring(x as f32, y as f32);
        true
    }

    fn on_transform(&mut self, _pan_x: f64, _pan_y: f64, zoom: f64, _rotation: f64) -> bool {
        if !zoom.is_finite() || zoom <= 0.0 {
            return false;
        }
        let scaled = (self.growth_scale as f64 * zoom).clamp(MIN_GROWTH_SCALE, MAX_GROWTH_SCALE);
        self.growth_scale = scaled as f32;
        true
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            primary_color: true,
            speed: true,
            ..Capabilities::default()
        }
    }

    fn param(&self, kind: ParamKind) -> Option<Param> {
        match kind {
            ParamKind::PrimaryColor => Some(Param::PrimaryColor(self.color)),
            ParamKind::Speed => Some(Param::Speed(self.speed)),
            _ => None,
        }
    }

    fn set_param(&mut self, param: Param) -> bool {
        match param {
            Param::PrimaryColor(color) => {
                self.color = color;
                true
            }
            Param::Speed(speed) if speed.is_finite() => {
                self.speed = speed;
                true
            }
            _ => false,
        }
    }

    fn spec(&self) -> Option<AnimationSpec> {
        Some(AnimationSpec::Ripples {
            color: self.color,
            speed: self.speed,
            rain_interval: self.rain_interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(dt: f32) -> FrameInfo {
        FrameInfo {
            width: 100.0,
            height: 100.0,
            dt,
            elapsed: 0.0,
            frame: 0,
        }
    }

    #[test]
    fn touches_drop_rings_that_expire() {
        let mut ripples = Ripples::new(Color::WHITE);
        assert!(ripples.on_touch(10.0, 10.0));
        assert_eq!(ripples.ring_count(), 1);
        ripples.advance(&frame(RING_LIFETIME + 0.1));
        assert_eq!(ripples.ring_count(), 0);
    }

    #[test]
    fn ring_is_brightest_on_its_radius() {
        let mut ripples = Ripples::new(Color::WHITE);
        ripples.on_touch(0.0, 0.0);
        ripples.advance(&frame(0.5));
        let radius = 0.5 * RING_GROWTH;
        let on = ripples.intensity_at(radius, 0.0);
        let off = ripples.intensity_at(radius + RING_WIDTH * 2.0, 0.0);
        assert!(on > 0.5, "{on}");
        assert_eq!(off, 0.0);
    }

    #[test]
    fn ring_count_is_capped() {
        let mut ripples = Ripples::new(Color::WHITE);
        for i in 0..(MAX_RINGS + 5) {
            ripples.on_touch(i as f64, 0.0);
        }
        assert_eq!(ripples.ring_count(), MAX_RINGS);
    }

    #[test]
    fn rain_drops_rings_on_its_own() {
        let mut ripples = Ripples::new(Color::WHITE).with_rain(0.1);
        for _ in 0..10 {
            ripples.advance(&frame(0.1));
        }
        assert!(ripples.ring_count() > 0);
    }

    #[test]
    fn zoom_scales_growth_within_limits() {
        let mut ripples = Ripples::new(Color::WHITE);
        assert!(ripples.on_transform(0.0, 0.0, 1000.0, 0.0));
        assert_eq!(ripples.growth_scale, MAX_GROWTH_SCALE as f32);
        assert!(!ripples.on_transform(0.0, 0.0, 0.0, 0.0));
    }
}
