//! The engine: every piece of shared canvas state behind one lock
//!
//! Region and device mutations, bounds recompute, and the whole
//! compose + map step all run under the same `Mutex`. Nothing mutable leaves
//! it; callers get snapshots (region lists, device lists, preview copies).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use kurbo::Point;

use crate::animation::{AnimationSpec, Capabilities, Param, ParamKind, Producer};
use crate::compositor::{composite, CompositeReport, FrameClock};
use crate::device::{map_device, Device};
use crate::display::PixelBuffer;
use crate::error::{EngineError, EngineResult};
use crate::geometry::{recompute_padded, Bounds, Placement, BOUNDS_PADDING, MAX_CANVAS_DIM};
use crate::input::{self, Gesture};
use crate::installation::{Installation, RegionConfig};
use crate::regions::{Region, RegionRegistry};
use crate::transport::DEFAULT_PIXEL_PORT;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub base_width: f64,
    pub base_height: f64,
    /// World units added around everything drawn or sampled
    pub padding: f64,
    pub target_fps: u32,
    /// Pixel protocol port for devices that don't set their own
    pub port: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_width: 1000.0,
            base_height: 1000.0,
            padding: BOUNDS_PADDING,
            target_fps: 30,
            port: DEFAULT_PIXEL_PORT,
        }
    }
}

impl EngineConfig {
    pub fn with_base(mut self, width: f64, height: f64) -> Self {
        self.base_width = width;
        self.base_height = height;
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.target_fps = fps;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Fixed scheduler interval, 33 ms at the default 30 FPS
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.target_fps.max(1)))
    }
}

// ============================================================================
// Frame outputs
// ============================================================================

/// Bytes mapped for one device, plus where to send them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFrame {
    pub target: SocketAddr,
    pub bytes: Vec<u8>,
}

/// Per-device byte buffers, owned by whoever drives frames and reused across them
#[derive(Debug, Default)]
pub struct DeviceFrames {
    frames: HashMap<String, DeviceFrame>,
}

impl DeviceFrames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, device_id: &str) -> Option<&DeviceFrame> {
        self.frames.get(device_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DeviceFrame)> {
        self.frames.iter().map(|(id, frame)| (id.as_str(), frame))
    }

    /// Map every device, dropping buffers of devices that are gone
    fn refill(&mut self, devices: &[Device], buffer: &PixelBuffer, bounds: &Bounds, port: u16) {
        self.frames
            .retain(|id, _| devices.iter().any(|d| &d.id == id));
        for device in devices {
            let target = device.socket_addr(port);
            if !self.frames.contains_key(&device.id) {
                self.frames.insert(
                    device.id.clone(),
                    DeviceFrame {
                        target,
                        bytes: Vec::with_capacity(device.frame_len()),
                    },
                );
            }
            if let Some(frame) = self.frames.get_mut(&device.id) {
                frame.target = target;
                map_device(device, buffer, bounds, &mut frame.bytes);
            }
        }
    }
}

/// Read-only copy of the composited canvas
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewFrame {
    pub buffer: PixelBuffer,
    /// World position of buffer pixel (0, 0)
    pub origin_x: f64,
    pub origin_y: f64,
    pub frame: u64,
}

impl PreviewFrame {
    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// Buffer pixel coordinates to world space
    pub fn to_world(&self, px: f64, py: f64) -> Point {
        Point::new(self.origin_x + px, self.origin_y + py)
    }
}

/// Result of [`Engine::render_frame`]
#[derive(Debug)]
pub struct RenderedFrame {
    pub report: CompositeReport,
    pub preview: PreviewFrame,
}

// ============================================================================
// Engine
// ============================================================================

struct EngineState {
    name: String,
    base_width: f64,
    base_height: f64,
    padding: f64,
    port: u16,
    devices: Vec<Device>,
    regions: RegionRegistry,
    bounds: Bounds,
    buffer: PixelBuffer,
    clock: FrameClock,
}

impl EngineState {
    /// Recompute bounds and resize the buffer before anything can sample it
    fn refresh_bounds(&mut self) {
        let bounds = recompute_padded(
            self.base_width,
            self.base_height,
            self.devices.iter().map(|d| &d.placement),
            self.regions.placements(),
            self.padding,
        );
        if bounds != self.bounds {
            tracing::debug!(
                min_x = bounds.min_x,
                min_y = bounds.min_y,
                max_x = bounds.max_x,
                max_y = bounds.max_y,
                "render bounds changed"
            );
        }
        self.bounds = bounds;
        let (w, h) = bounds.pixel_size();
        if self.buffer.ensure_size(w, h) {
            tracing::debug!(width = w, height = h, "canvas buffer reallocated");
        }
    }

    fn device_mut(&mut self, id: &str) -> EngineResult<&mut Device> {
        self.devices
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| EngineError::UnknownDevice(id.to_string()))
    }

    fn producer(&self, region: &str) -> EngineResult<Producer> {
        self.regions
            .get(region)
            .map(|r| r.producer().clone())
            .ok_or_else(|| EngineError::UnknownRegion(region.to_string()))
    }
}

struct PreviewHub {
    subscribers: Vec<Sender<Arc<PreviewFrame>>>,
    latest: Option<Arc<PreviewFrame>>,
}

struct Shared {
    state: Mutex<EngineState>,
    preview: Mutex<PreviewHub>,
}

/// Handle to the shared canvas. Clones refer to the same engine.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

fn check_placement(id: &str, placement: &Placement) -> EngineResult<()> {
    match placement.problem() {
        None => Ok(()),
        Some(reason) => Err(EngineError::invalid_geometry(id, reason)),
    }
}

fn check_base_canvas(width: f64, height: f64) -> EngineResult<()> {
    let limit = MAX_CANVAS_DIM as f64;
    if width.is_finite() && height.is_finite() && width <= limit && height <= limit {
        Ok(())
    } else {
        Err(EngineError::invalid_geometry(
            "base canvas",
            format!("{width} x {height}"),
        ))
    }
}

fn check_unique_devices(devices: &[Device]) -> EngineResult<()> {
    for (i, device) in devices.iter().enumerate() {
        device.validate()?;
        if devices[..i].iter().any(|d| d.id == device.id) {
            return Err(EngineError::DuplicateDevice(device.id.clone()));
        }
    }
    Ok(())
}

/// Collect regions into a fresh registry. On failure every producer built so
/// far, the rejected one included, is torn down.
fn stage_regions(regions: impl IntoIterator<Item = Region>) -> EngineResult<RegionRegistry> {
    let mut staged = RegionRegistry::new();
    for region in regions {
        let producer = region.producer().clone();
        if let Err(err) = staged.add(region) {
            producer.teardown();
            staged.clear();
            return Err(err);
        }
    }
    Ok(staged)
}

impl Engine {
    pub fn new(config: &EngineConfig) -> Self {
        let mut state = EngineState {
            name: "untitled".to_string(),
            base_width: config.base_width,
            base_height: config.base_height,
            padding: config.padding,
            port: config.port,
            devices: Vec::new(),
            regions: RegionRegistry::new(),
            bounds: Bounds {
                min_x: 0.0,
                min_y: 0.0,
                max_x: 0.0,
                max_y: 0.0,
            },
            buffer: PixelBuffer::with_size(1, 1),
            clock: FrameClock::default(),
        };
        state.refresh_bounds();
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                preview: Mutex::new(PreviewHub {
                    subscribers: Vec::new(),
                    latest: None,
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        // Producer panics are caught before they can unwind through the lock
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_preview(&self) -> MutexGuard<'_, PreviewHub> {
        self.shared
            .preview
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------------
    // Regions
    // ------------------------------------------------------------------------

    /// Register a region on top of all others
    pub fn add_region(
        &self,
        id: impl Into<String>,
        placement: Placement,
        producer: Producer,
    ) -> EngineResult<()> {
        let id = id.into();
        check_placement(&id, &placement)?;
        let name = producer.name();
        let mut state = self.lock();
        state.regions.add(Region::new(id.clone(), placement, producer))?;
        state.refresh_bounds();
        tracing::info!(region = %id, animation = %name, "region added");
        Ok(())
    }

    /// Register a region running one of the built-in animations
    pub fn add_region_spec(
        &self,
        id: impl Into<String>,
        placement: Placement,
        spec: &AnimationSpec,
    ) -> EngineResult<()> {
        self.add_region(id, placement, Producer::from_box(spec.build()))
    }

    pub fn update_region(&self, id: &str, placement: Placement) -> EngineResult<()> {
        check_placement(id, &placement)?;
        let mut state = self.lock();
        state.regions.update(id, placement)?;
        state.refresh_bounds();
        tracing::debug!(region = %id, ?placement, "region moved");
        Ok(())
    }

    /// Tear the region's producer down and forget it
    pub fn remove_region(&self, id: &str) -> EngineResult<()> {
        let mut state = self.lock();
        state.regions.remove(id)?;
        state.refresh_bounds();
        tracing::info!(region = %id, "region removed");
        Ok(())
    }

    pub fn bring_to_front(&self, id: &str) -> EngineResult<()> {
        self.lock().regions.bring_to_front(id)
    }

    /// Back-to-front snapshot
    pub fn regions(&self) -> Vec<Region> {
        self.lock().regions.snapshot()
    }

    // ------------------------------------------------------------------------
    // Devices
    // ------------------------------------------------------------------------

    pub fn add_device(&self, device: Device) -> EngineResult<()> {
        device.validate()?;
        let mut state = self.lock();
        if state.devices.iter().any(|d| d.id == device.id) {
            return Err(EngineError::DuplicateDevice(device.id));
        }
        tracing::info!(device = %device.id, address = %device.address, pixels = device.pixel_count, "device added");
        state.devices.push(device);
        state.refresh_bounds();
        Ok(())
    }

    /// Insert or replace by id. Returns true if the device is new.
    pub fn upsert_device(&self, device: Device) -> EngineResult<bool> {
        device.validate()?;
        let mut state = self.lock();
        let inserted = match state.devices.iter_mut().find(|d| d.id == device.id) {
            Some(existing) => {
                *existing = device;
                false
            }
            None => {
                state.devices.push(device);
                true
            }
        };
        state.refresh_bounds();
        Ok(inserted)
    }

    pub fn update_device_placement(&self, id: &str, placement: Placement) -> EngineResult<()> {
        check_placement(id, &placement)?;
        let mut state = self.lock();
        state.device_mut(id)?.placement = placement;
        state.refresh_bounds();
        tracing::debug!(device = %id, ?placement, "device moved");
        Ok(())
    }

    /// `segment_width`: None to infer, Some(0) for a strip, Some(n) for n columns
    pub fn set_device_topology(
        &self,
        id: &str,
        segment_width: Option<u32>,
        serpentine: bool,
    ) -> EngineResult<()> {
        let mut state = self.lock();
        let device = state.device_mut(id)?;
        device.segment_width = segment_width;
        device.serpentine = serpentine;
        Ok(())
    }

    pub fn remove_device(&self, id: &str) -> EngineResult<Device> {
        let mut state = self.lock();
        let idx = state
            .devices
            .iter()
            .position(|d| d.id == id)
            .ok_or_else(|| EngineError::UnknownDevice(id.to_string()))?;
        let device = state.devices.remove(idx);
        state.refresh_bounds();
        tracing::info!(device = %id, "device removed");
        Ok(device)
    }

    /// Replace the whole device list
    pub fn set_devices(&self, devices: Vec<Device>) -> EngineResult<()> {
        check_unique_devices(&devices)?;
        let mut state = self.lock();
        state.devices = devices;
        state.refresh_bounds();
        Ok(())
    }

    pub fn devices(&self) -> Vec<Device> {
        self.lock().devices.clone()
    }

    pub fn set_base_canvas(&self, width: f64, height: f64) -> EngineResult<()> {
        check_base_canvas(width, height)?;
        let mut state = self.lock();
        state.base_width = width;
        state.base_height = height;
        state.refresh_bounds();
        Ok(())
    }

    pub fn bounds(&self) -> Bounds {
        self.lock().bounds
    }

    // ------------------------------------------------------------------------
    // Producer parameters
    // ------------------------------------------------------------------------

    pub fn region_capabilities(&self, id: &str) -> EngineResult<Capabilities> {
        Ok(self.lock().producer(id)?.capabilities())
    }

    pub fn region_param(&self, id: &str, kind: ParamKind) -> EngineResult<Option<Param>> {
        let producer = self.lock().producer(id)?;
        if !producer.capabilities().supports(kind) {
            return Err(EngineError::UnsupportedParam {
                region: id.to_string(),
                kind,
            });
        }
        Ok(producer.param(kind))
    }

    /// Returns whether the producer accepted the value
    pub fn set_region_param(&self, id: &str, param: Param) -> EngineResult<bool> {
        let producer = self.lock().producer(id)?;
        let kind = param.kind();
        if !producer.capabilities().supports(kind) {
            return Err(EngineError::UnsupportedParam {
                region: id.to_string(),
                kind,
            });
        }
        Ok(producer.set_param(param))
    }

    // ------------------------------------------------------------------------
    // Frames
    // ------------------------------------------------------------------------

    /// Composite every region and map every device, all under the lock
    ///
    /// `frames` is refilled in place; sending and preview publication are
    /// left to the caller so they happen after the lock is released.
    pub fn render_frame(&self, dt: f32, frames: &mut DeviceFrames) -> RenderedFrame {
        let mut guard = self.lock();
        let state = &mut *guard;

        state.clock.dt = dt;
        state.clock.elapsed += dt;
        state.clock.frame += 1;

        let report = composite(&mut state.buffer, &state.bounds, &state.regions, state.clock);
        frames.refill(&state.devices, &state.buffer, &state.bounds, state.port);

        let origin = state.bounds.origin();
        let preview = PreviewFrame {
            buffer: state.buffer.clone(),
            origin_x: origin.x,
            origin_y: origin.y,
            frame: state.clock.frame,
        };
        tracing::trace!(frame = state.clock.frame, painted = report.painted, "frame rendered");
        RenderedFrame { report, preview }
    }

    /// Hand a rendered preview to every subscriber and keep it as the latest
    pub fn publish_preview(&self, preview: PreviewFrame) {
        let preview = Arc::new(preview);
        let mut hub = self.lock_preview();
        hub.subscribers
            .retain(|tx| tx.send(Arc::clone(&preview)).is_ok());
        hub.latest = Some(preview);
    }

    pub fn subscribe_preview(&self) -> Receiver<Arc<PreviewFrame>> {
        let (tx, rx) = mpsc::channel();
        self.lock_preview().subscribers.push(tx);
        rx
    }

    pub fn latest_preview(&self) -> Option<Arc<PreviewFrame>> {
        self.lock_preview().latest.clone()
    }

    pub fn frame_count(&self) -> u64 {
        self.lock().clock.frame
    }

    // ------------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------------

    /// Touch at a world point. The engine lock is only held for the snapshot.
    pub fn route_touch(&self, world_x: f64, world_y: f64) -> bool {
        let regions = self.regions();
        input::route_touch(&regions, Point::new(world_x, world_y))
    }

    /// Id of the frontmost region under a world point, handler or not
    pub fn region_at(&self, world_x: f64, world_y: f64) -> Option<String> {
        let regions = self.regions();
        input::hit_test(&regions, Point::new(world_x, world_y)).map(|r| r.id().to_string())
    }

    pub fn route_transform(&self, target_x: f64, target_y: f64, gesture: Gesture) -> bool {
        let regions = self.regions();
        input::route_transform(&regions, Point::new(target_x, target_y), gesture)
    }

    // ------------------------------------------------------------------------
    // Installations
    // ------------------------------------------------------------------------

    /// Replace the whole layout. Existing producers are torn down.
    ///
    /// Everything is validated before anything changes.
    pub fn apply_installation(&self, installation: &Installation) -> EngineResult<()> {
        check_base_canvas(installation.base_width, installation.base_height)?;
        check_unique_devices(&installation.devices)?;
        for region in &installation.regions {
            check_placement(&region.id, &region.placement)?;
        }
        let staged = stage_regions(installation.regions.iter().map(|config| {
            Region::new(
                config.id.clone(),
                config.placement,
                Producer::from_box(config.animation.build()),
            )
        }))?;

        let mut state = self.lock();
        state.regions.clear();
        state.regions = staged;
        state.devices = installation.devices.clone();
        state.name = installation.name.clone();
        state.base_width = installation.base_width;
        state.base_height = installation.base_height;
        state.refresh_bounds();
        tracing::info!(
            installation = %installation.name,
            devices = state.devices.len(),
            regions = state.regions.len(),
            "installation applied"
        );
        Ok(())
    }

    /// Current layout as an installation. Regions without a built-in animation are left out.
    pub fn export_installation(&self) -> Installation {
        let (mut installation, regions) = {
            let state = self.lock();
            let mut installation =
                Installation::new(state.name.clone(), state.base_width, state.base_height);
            installation.devices = state.devices.clone();
            (installation, state.regions.snapshot())
        };
        for region in regions {
            match region.producer().spec() {
                Some(animation) => installation.regions.push(RegionConfig {
                    id: region.id().to_string(),
                    placement: *region.placement(),
                    animation,
                }),
                None => {
                    tracing::debug!(region = %region.id(), "region has no serializable animation; skipped");
                }
            }
        }
        installation
    }
}
