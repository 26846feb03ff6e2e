//! Letterboxed placement of the canvas inside a preview window

/// Where the canvas lands inside a window, aspect preserved and centered
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Window pixels per buffer pixel
    pub scale: f64,
}

impl Viewport {
    pub fn fit(window_w: u32, window_h: u32, buffer_w: u32, buffer_h: u32) -> Self {
        let (ww, wh) = (window_w.max(1) as f64, window_h.max(1) as f64);
        let (bw, bh) = (buffer_w.max(1) as f64, buffer_h.max(1) as f64);
        let scale = (ww / bw).min(wh / bh);
        let (width, height) = (bw * scale, bh * scale);
        Self {
            x: (ww - width) / 2.0,
            y: (wh - height) / 2.0,
            width,
            height,
            scale,
        }
    }

    /// Window pixel to buffer pixel; None in the letterbox bars
    pub fn to_buffer(&self, wx: f64, wy: f64) -> Option<(f64, f64)> {
        let (dx, dy) = (wx - self.x, wy - self.y);
        if dx < 0.0 || dy < 0.0 || dx > self.width || dy > self.height {
            return None;
        }
        Some((dx / self.scale, dy / self.scale))
    }
}
