//! Shared utilities

use std::collections::VecDeque;
use std::time::Instant;

/// Simple deterministic RNG using xorshift64
/// Good for animations that need reproducible randomness without external dependencies
pub struct Rng {
    state: u64,
}

impl Rng {
    /// Create a new RNG with the given seed
    pub fn new(seed: u64) -> Self {
        Self { state: seed.max(1) } // Ensure non-zero
    }

    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Get a random f32 in [0, 1)
    #[inline]
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() & 0xFFFFFF) as f32 / 0x1000000 as f32
    }

    /// Get a random f32 in [min, max)
    #[inline]
    pub fn range_f32(&mut self, min: f32, max: f32) -> f32 {
        min + self.next_f32() * (max - min)
    }
}

// ============================================================================
// FPS Counter
// ============================================================================

/// Frame timing with a rolling window, used by the frame scheduler's stats log
pub struct FpsCounter {
    frame_times: VecDeque<f32>,
    last_frame: Instant,
    sample_count: usize,
}

impl FpsCounter {
    pub fn new(sample_count: usize) -> Self {
        Self {
            frame_times: VecDeque::with_capacity(sample_count),
            last_frame: Instant::now(),
            sample_count: sample_count.max(1),
        }
    }

    /// Call once per frame. Returns (delta_time, average_fps)
    pub fn tick(&mut self) -> (f32, f32) {
        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.record(dt);
        (dt, self.avg_fps())
    }

    /// Push an externally measured frame time
    pub fn record(&mut self, dt: f32) {
        self.frame_times.push_back(dt);
        if self.frame_times.len() > self.sample_count {
            self.frame_times.pop_front();
        }
    }

    pub fn avg_fps(&self) -> f32 {
        let avg_dt = self.avg_frame_time_ms() / 1000.0;
        if avg_dt > 0.0 {
            1.0 / avg_dt
        } else {
            0.0
        }
    }

    pub fn avg_frame_time_ms(&self) -> f32 {
        let avg_dt: f32 =
            self.frame_times.iter().sum::<f32>() / self.frame_times.len().max(1) as f32;
        avg_dt * 1000.0
    }

    /// Get min/max FPS from sample window
    pub fn min_max_fps(&self) -> (f32, f32) {
        if self.frame_times.is_empty() {
            return (0.0, 0.0);
        }
        let min_dt = self.frame_times.iter().copied().fold(f32::INFINITY, f32::min);
        let max_dt = self.frame_times.iter().copied().fold(0.0, f32::max);
        let max_fps = if min_dt > 0.0 { 1.0 / min_dt } else { 0.0 };
        let min_fps = if max_dt > 0.0 { 1.0 / max_dt } else { 0.0 };
        (min_fps, max_fps)
    }

    pub fn frame_count(&self) -> usize {
        self.frame_times.len()
    }
}
