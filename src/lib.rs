//! ledwall: one shared virtual canvas, many animations, many LED controllers
//!
//! Regions paint into the canvas through a save/restore transform stack; every
//! device samples the composited result at its own rotated pixel positions and
//! gets its bytes over UDP once per frame.

pub mod animation;
pub mod compositor;
pub mod device;
pub mod display;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod input;
pub mod installation;
pub mod mqtt;
pub mod regions;
pub mod scheduler;
pub mod transport;
pub mod util;

pub use animation::{Animation, AnimationSpec, Capabilities, FrameInfo, Param, ParamKind, Producer};
pub use compositor::Canvas;
pub use device::{Device, Topology};
pub use display::{Color, PixelBuffer};
pub use engine::{DeviceFrame, DeviceFrames, Engine, EngineConfig, PreviewFrame};
pub use error::{EngineError, EngineResult, ProducerError};
pub use geometry::{Bounds, Placement};
pub use input::Gesture;
pub use installation::Installation;
pub use regions::Region;
pub use scheduler::FrameScheduler;
pub use transport::{Transport, UdpTransport, DEFAULT_PIXEL_PORT};
