//! Frame scheduler: compose -> map -> send -> publish, at a fixed interval
//!
//! Runs on its own thread. Sends and preview publication happen after the
//! engine lock is released, so a slow network never holds up layout edits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::engine::{DeviceFrames, Engine, EngineConfig};
use crate::error::{EngineError, EngineResult};
use crate::transport::Transport;
use crate::util::FpsCounter;

/// Frames in the rolling timing window
const STATS_WINDOW: usize = 120;
/// How often timing stats are logged
const STATS_PERIOD: Duration = Duration::from_secs(5);

pub struct FrameScheduler {
    engine: Engine,
    transport: Arc<dyn Transport>,
    interval: Duration,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FrameScheduler {
    pub fn new(engine: Engine, transport: Arc<dyn Transport>) -> Self {
        Self {
            engine,
            transport,
            interval: EngineConfig::default().frame_interval(),
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// stopped -> running. Calling it while running does nothing.
    pub fn start(&mut self) -> EngineResult<()> {
        if self.thread.is_some() {
            return Ok(());
        }
        self.running.store(true, Ordering::Release);

        let engine = self.engine.clone();
        let transport = Arc::clone(&self.transport);
        let running = Arc::clone(&self.running);
        let interval = self.interval;
        let spawned = thread::Builder::new()
            .name("ledwall-frames".into())
            .spawn(move || frame_loop(&engine, transport.as_ref(), interval, &running));

        match spawned {
            Ok(handle) => {
                self.thread = Some(handle);
                tracing::info!(interval_ms = interval.as_millis() as u64, "frame scheduler started");
                Ok(())
            }
            Err(err) => {
                self.running.store(false, Ordering::Release);
                Err(EngineError::Spawn(err))
            }
        }
    }

    /// running -> stopped. The in-flight frame finishes before this returns.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                tracing::warn!("frame thread panicked");
            }
            tracing::info!("frame scheduler stopped");
        }
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn frame_loop(engine: &Engine, transport: &dyn Transport, interval: Duration, running: &AtomicBool) {
    let mut frames = DeviceFrames::new();
    let mut fps = FpsCounter::new(STATS_WINDOW);
    let mut last_stats = Instant::now();

    while running.load(Ordering::Acquire) {
        let started = Instant::now();
        let (dt, avg_fps) = fps.tick();

        let rendered = engine.render_frame(dt, &mut frames);
        deliver(transport, &frames);
        engine.publish_preview(rendered.preview);

        if last_stats.elapsed() >= STATS_PERIOD {
            let (min_fps, max_fps) = fps.min_max_fps();
            tracing::info!(
                avg_fps,
                min_fps,
                max_fps,
                frame_ms = fps.avg_frame_time_ms(),
                devices = frames.len(),
                "frame timing"
            );
            last_stats = Instant::now();
        }

        // park_timeout can wake early; keep sleeping until the deadline or a stop
        let deadline = started + interval;
        while running.load(Ordering::Acquire) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::park_timeout(deadline - now);
        }
    }
}

/// Send every mapped device buffer; failures are logged and dropped.
/// Returns how many sends succeeded.
pub fn deliver(transport: &dyn Transport, frames: &DeviceFrames) -> usize {
    let mut sent = 0;
    for (device, frame) in frames.iter() {
        if frame.bytes.is_empty() {
            continue;
        }
        match transport.send(frame.target, &frame.bytes) {
            Ok(()) => sent += 1,
            Err(err) => {
                tracing::debug!(device, target = %frame.target, error = %err, "frame dropped");
            }
        }
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::AnimationSpec;
    use crate::device::Device;
    use crate::display::Color;
    use crate::geometry::Placement;
    use std::io;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
    }

    impl Transport for Recording {
        fn send(&self, addr: SocketAddr, payload: &[u8]) -> io::Result<()> {
            self.sent.lock().unwrap().push((addr, payload.to_vec()));
            Ok(())
        }
    }

    struct Unreachable;

    impl Transport for Unreachable {
        fn send(&self, _addr: SocketAddr, _payload: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        }
    }

    fn engine_with_device() -> Engine {
        let engine = Engine::new(&EngineConfig::default().with_base(10.0, 10.0));
        engine
            .add_device(Device::new(
                "d",
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                3,
                Placement::new(0.0, 0.0, 10.0, 0.0),
            ))
            .unwrap();
        engine
            .add_region_spec(
                "r",
                Placement::new(0.0, 0.0, 10.0, 10.0),
                &AnimationSpec::Solid { color: Color::BLUE },
            )
            .unwrap();
        engine
    }

    fn wait_for(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn runs_until_stopped() {
        let engine = engine_with_device();
        let transport = Arc::new(Recording::default());
        let mut scheduler = FrameScheduler::new(engine.clone(), transport.clone())
            .with_interval(Duration::from_millis(5));

        assert!(!scheduler.is_running());
        scheduler.start().unwrap();
        scheduler.start().unwrap();
        assert!(scheduler.is_running());

        wait_for(|| transport.sent.lock().unwrap().len() >= 3);
        scheduler.stop();
        assert!(!scheduler.is_running());

        let sent = transport.sent.lock().unwrap();
        let count = sent.len();
        let (addr, bytes) = &sent[0];
        assert_eq!(addr.port(), crate::transport::DEFAULT_PIXEL_PORT);
        assert_eq!(bytes, &[0, 0, 255].repeat(3));
        drop(sent);

        assert!(engine.latest_preview().is_some());
        thread::sleep(Duration::from_millis(30));
        assert_eq!(transport.sent.lock().unwrap().len(), count);
    }

    #[test]
    fn failed_sends_do_not_stall_the_loop() {
        let engine = engine_with_device();
        let mut scheduler = FrameScheduler::new(engine.clone(), Arc::new(Unreachable))
            .with_interval(Duration::from_millis(2));
        scheduler.start().unwrap();
        wait_for(|| engine.frame_count() >= 5);
        scheduler.stop();
    }

    #[test]
    fn deliver_counts_successes_and_skips_empty_devices() {
        let engine = engine_with_device();
        engine
            .add_device(Device::new(
                "empty",
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                0,
                Placement::new(0.0, 0.0, 1.0, 1.0),
            ))
            .unwrap();
        let mut frames = DeviceFrames::new();
        engine.render_frame(0.0, &mut frames);
        let transport = Recording::default();
        assert_eq!(deliver(&transport, &frames), 1);
        assert_eq!(deliver(&Unreachable, &frames), 0);
    }

    #[test]
    fn drop_stops_the_thread() {
        let engine = engine_with_device();
        {
            let mut scheduler = FrameScheduler::new(engine.clone(), Arc::new(Recording::default()))
                .with_interval(Duration::from_millis(1));
            scheduler.start().unwrap();
            wait_for(|| engine.frame_count() >= 1);
        }
        let frozen = engine.frame_count();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(engine.frame_count(), frozen);
    }
}
