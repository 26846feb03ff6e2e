//! Animation producers: the opaque painters bound to regions
//!
//! A producer only ever sees its region's local space, `[0, width] x [0, height]`
//! with the origin at the region's top-left. Placement, rotation and every other
//! region are invisible to it.

mod plasma;
mod ripples;
mod solid;

pub use plasma::Plasma;
pub use ripples::Ripples;
pub use solid::Solid;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::compositor::Canvas;
use crate::display::Color;
use crate::error::ProducerError;

/// Per-frame information handed to [`Animation::paint`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    /// Local width of the region
    pub width: f64,
    /// Local height of the region
    pub height: f64,
    /// Seconds since the previous frame
    pub dt: f32,
    /// Seconds since the engine started rendering
    pub elapsed: f32,
    pub frame: u64,
}

/// Trait for everything that paints into a region
pub trait Animation: Send {
    /// Paint one frame into the canvas' local space
    fn paint(&mut self, canvas: &mut Canvas<'_>, frame: &FrameInfo) -> anyhow::Result<()>;

    /// Name for logs and UI
    fn name(&self) -> &str;

    /// Pointer press in local coordinates. Return true if handled.
    fn on_touch(&mut self, _x: f64, _y: f64) -> bool {
        false
    }

    /// Pan/zoom/rotate gesture, pan already in the region's frame
    fn on_transform(&mut self, _pan_x: f64, _pan_y: f64, _zoom: f64, _rotation: f64) -> bool {
        false
    }

    /// Release timers, buffers, listeners. Called exactly once, before drop.
    fn teardown(&mut self) {}

    /// Which parameters the editing UI may read and write
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn param(&self, _kind: ParamKind) -> Option<Param> {
        None
    }

    /// Returns false if the parameter was not applied
    fn set_param(&mut self, _param: Param) -> bool {
        false
    }

    /// Serializable description of the current state, if this is a built-in
    fn spec(&self) -> Option<AnimationSpec> {
        None
    }
}

// ============================================================================
// Capabilities & parameters
// ============================================================================

/// Parameters a producer exposes to editing UI. Not consumed by the render path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub primary_color: bool,
    pub secondary_color: bool,
    pub palette: bool,
    pub speed: bool,
    pub text: bool,
}

impl Capabilities {
    pub fn supports(&self, kind: ParamKind) -> bool {
        match kind {
            ParamKind::PrimaryColor => self.primary_color,
            ParamKind::SecondaryColor => self.secondary_color,
            ParamKind::Palette => self.palette,
            ParamKind::Speed => self.speed,
            ParamKind::Text => self.text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    PrimaryColor,
    SecondaryColor,
    Palette,
    Speed,
    Text,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParamKind::PrimaryColor => "primary color",
            ParamKind::SecondaryColor => "secondary color",
            ParamKind::Palette => "palette",
            ParamKind::Speed => "speed",
            ParamKind::Text => "text",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Param {
    PrimaryColor(Color),
    SecondaryColor(Color),
    Palette(Vec<Color>),
    Speed(f32),
    Text(String),
}

impl Param {
    pub fn kind(&self) -> ParamKind {
        match self {
            Param::PrimaryColor(_) => ParamKind::PrimaryColor,
            Param::SecondaryColor(_) => ParamKind::SecondaryColor,
            Param::Palette(_) => ParamKind::Palette,
            Param::Speed(_) => ParamKind::Speed,
            Param::Text(_) => ParamKind::Text,
        }
    }
}

// ============================================================================
// Built-in specs
// ============================================================================

fn default_speed() -> f32 {
    1.0
}

/// Serializable recipe for the built-in animations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnimationSpec {
    Solid {
        color: Color,
    },
    Plasma {
        #[serde(default = "default_speed")]
        speed: f32,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        palette: Vec<Color>,
    },
    Ripples {
        color: Color,
        #[serde(default = "default_speed")]
        speed: f32,
        /// Seconds between automatic drops; 0 disables them
        #[serde(default)]
        rain_interval: f32,
    },
}

impl AnimationSpec {
    pub fn build(&self) -> Box<dyn Animation> {
        match self {
            AnimationSpec::Solid { color } => Box::new(Solid::new(*color)),
            AnimationSpec::Plasma { speed, palette } => {
                Box::new(Plasma::new().with_speed(*speed).with_palette(palette))
            }
            AnimationSpec::Ripples {
                color,
                speed,
                rain_interval,
            } => Box::new(
                Ripples::new(*color)
                    .with_speed(*speed)
                    .with_rain(*rain_interval),
            ),
        }
    }
}

// ============================================================================
// Producer handle
// ============================================================================

struct Slot {
    animation: Box<dyn Animation>,
    torn_down: bool,
}

/// Shared, lockable handle to one animation
///
/// Cloning is cheap; clones refer to the same animation. Every call is
/// panic-isolated, and `teardown` runs at most once across all clones.
#[derive(Clone)]
pub struct Producer {
    slot: Arc<Mutex<Slot>>,
    capabilities: Capabilities,
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl Producer {
    pub fn new(animation: impl Animation + 'static) -> Self {
        Self::from_box(Box::new(animation))
    }

    /// Capabilities are captured here, at registration time
    pub fn from_box(animation: Box<dyn Animation>) -> Self {
        let capabilities = animation.capabilities();
        Self {
            slot: Arc::new(Mutex::new(Slot {
                animation,
                torn_down: false,
            })),
            capabilities,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // Panics are caught inside the guard, so poison only follows a panic in here
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the live animation, converting panics into errors
    fn call<T>(&self, f: impl FnOnce(&mut dyn Animation) -> T) -> Result<T, ProducerError> {
        let mut slot = self.lock();
        if slot.torn_down {
            return Err(ProducerError::TornDown);
        }
        let animation = slot.animation.as_mut();
        panic::catch_unwind(AssertUnwindSafe(|| f(animation))).map_err(ProducerError::from_panic)
    }

    pub fn name(&self) -> String {
        self.lock().animation.name().to_string()
    }

    pub(crate) fn paint(&self, canvas: &mut Canvas<'_>, frame: &FrameInfo) -> Result<(), ProducerError> {
        self.call(|a| a.paint(canvas, frame))?
            .map_err(ProducerError::Failed)
    }

    pub(crate) fn touch(&self, x: f64, y: f64) -> Result<bool, ProducerError> {
        self.call(|a| a.on_touch(x, y))
    }

    pub(crate) fn transform(
        &self,
        pan_x: f64,
        pan_y: f64,
        zoom: f64,
        rotation: f64,
    ) -> Result<bool, ProducerError> {
        self.call(|a| a.on_transform(pan_x, pan_y, zoom, rotation))
    }

    /// Tear the animation down; later calls become no-ops. Returns true the first time.
    pub(crate) fn teardown(&self) -> bool {
        let mut slot = self.lock();
        if slot.torn_down {
            return false;
        }
        slot.torn_down = true;
        let animation = slot.animation.as_mut();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| animation.teardown())) {
            tracing::warn!(error = %ProducerError::from_panic(payload), "animation teardown panicked");
        }
        true
    }

    pub fn param(&self, kind: ParamKind) -> Option<Param> {
        self.call(|a| a.param(kind)).ok().flatten()
    }

    pub fn set_param(&self, param: Param) -> bool {
        self.call(|a| a.set_param(param)).unwrap_or(false)
    }

    pub fn spec(&self) -> Option<AnimationSpec> {
        self.call(|a| a.spec()).ok().flatten()
    }

    pub fn is_torn_down(&self) -> bool {
        self.lock().torn_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        teardowns: Arc<AtomicUsize>,
    }

    impl Animation for Counting {
        fn paint(&mut self, _canvas: &mut Canvas<'_>, _frame: &FrameInfo) -> anyhow::Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "counting"
        }

        fn on_touch(&mut self, x: f64, _y: f64) -> bool {
            if x < 0.0 {
                panic!("negative touch");
            }
            true
        }

        fn teardown(&mut self) {
            self.teardowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn teardown_runs_once_across_clones() {
        let count = Arc::new(AtomicUsize::new(0));
        let producer = Producer::new(Counting {
            teardowns: Arc::clone(&count),
        });
        let clone = producer.clone();
        assert!(producer.teardown());
        assert!(!clone.teardown());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(clone.is_torn_down());
        assert!(matches!(clone.touch(1.0, 1.0), Err(ProducerError::TornDown)));
    }

    #[test]
    fn panics_become_errors_and_the_handle_stays_usable() {
        let producer = Producer::new(Counting {
            teardowns: Arc::new(AtomicUsize::new(0)),
        });
        assert!(matches!(
            producer.touch(-1.0, 0.0),
            Err(ProducerError::Panicked(msg)) if msg.contains("negative")
        ));
        assert!(producer.touch(1.0, 0.0).unwrap());
    }

    #[test]
    fn default_capabilities_are_empty() {
        let producer = Producer::new(Counting {
            teardowns: Arc::new(AtomicUsize::new(0)),
        });
        assert_eq!(producer.capabilities(), Capabilities::default());
        assert_eq!(producer.param(ParamKind::Speed), None);
        assert!(!producer.set_param(Param::Speed(2.0)));
        assert_eq!(producer.spec(), None);
    }

    #[test]
    fn capabilities_gate_by_kind() {
        let caps = Capabilities {
            speed: true,
            ..Capabilities::default()
        };
        assert!(caps.supports(ParamKind::Speed));
        assert!(!caps.supports(ParamKind::Text));
        assert_eq!(Param::Text("hi".into()).kind(), ParamKind::Text);
    }

    #[test]
    fn specs_round_trip_through_json() {
        let json = r#"{"kind":"ripples","color":{"r":0,"g":128,"b":255}}"#;
        let spec: AnimationSpec = serde_json::from_str(json).unwrap();
        assert_eq!(
            spec,
            AnimationSpec::Ripples {
                color: Color::rgb(0, 128, 255),
                speed: 1.0,
                rain_interval: 0.0
            }
        );
        assert_eq!(spec.build().spec(), Some(spec));
    }

    #[test]
    fn params_serialize_with_kind_tag() {
        let p: Param = serde_json::from_str(r#"{"kind":"speed","value":2.5}"#).unwrap();
        assert_eq!(p, Param::Speed(2.5));
    }
}
