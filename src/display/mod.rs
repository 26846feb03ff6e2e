mod color;
mod pixel_buffer;
#[cfg(feature = "preview")]
mod preview;
mod viewport;

pub use color::{expand_palette, hsv_to_rgb, lerp_color, make_palette, Color};
pub use pixel_buffer::PixelBuffer;
#[cfg(feature = "preview")]
pub use preview::{PreviewEvent, PreviewTarget, PreviewWindow, DEFAULT_HEIGHT, DEFAULT_WIDTH};
pub use viewport::Viewport;
