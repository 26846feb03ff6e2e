//! SDL2 preview window for the composited canvas

use kurbo::Point;
use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::mouse::MouseButton;
use sdl2::pixels::{Color as SdlColor, PixelFormatEnum};
use sdl2::rect::Rect as SdlRect;
use sdl2::render::{Canvas, Texture, TextureCreator};
use sdl2::video::{Window, WindowContext};
use sdl2::EventPump;

use super::Viewport;
use crate::engine::PreviewFrame;

pub const DEFAULT_WIDTH: u32 = 960;
pub const DEFAULT_HEIGHT: u32 = 720;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewEvent {
    Quit,
    /// Left click, window coordinates
    Click { x: i32, y: i32 },
}

pub struct PreviewWindow {
    canvas: Canvas<Window>,
    event_pump: EventPump,
}

/// Streaming texture sized to the latest frame
pub struct PreviewTarget<'a> {
    creator: &'a TextureCreator<WindowContext>,
    texture: Option<Texture<'a>>,
    width: u32,
    height: u32,
}

impl PreviewWindow {
    /// Open a resizable window with VSync
    pub fn open(
        title: &str,
        width: u32,
        height: u32,
    ) -> Result<(Self, TextureCreator<WindowContext>), String> {
        let sdl_context = sdl2::init()?;
        let video_subsystem = sdl_context.video()?;

        let window = video_subsystem
            .window(title, width, height)
            .position_centered()
            .resizable()
            .build()
            .map_err(|e| e.to_string())?;

        let canvas = window
            .into_canvas()
            .accelerated()
            .present_vsync()
            .build()
            .map_err(|e| e.to_string())?;

        let texture_creator = canvas.texture_creator();
        let event_pump = sdl_context.event_pump()?;

        Ok((
            Self {
                canvas,
                event_pump,
            },
            texture_creator,
        ))
    }

    fn viewport(&self, frame: &PreviewFrame) -> Viewport {
        let (w, h) = self.canvas.output_size().unwrap_or((1, 1));
        Viewport::fit(w, h, frame.width(), frame.height())
    }

    pub fn present(
        &mut self,
        target: &mut PreviewTarget<'_>,
        frame: &PreviewFrame,
    ) -> Result<(), String> {
        let texture = target.prepare(frame.width(), frame.height())?;
        texture
            .update(None, frame.buffer.as_bytes(), frame.buffer.pitch())
            .map_err(|e| e.to_string())?;

        let vp = self.viewport(frame);
        let dest = SdlRect::new(
            vp.x.round() as i32,
            vp.y.round() as i32,
            vp.width.round().max(1.0) as u32,
            vp.height.round().max(1.0) as u32,
        );
        self.canvas.set_draw_color(SdlColor::RGB(16, 16, 16));
        self.canvas.clear();
        self.canvas.copy(texture, None, Some(dest))?;
        self.canvas.present();
        Ok(())
    }

    /// Window coordinates to world space through the frame's origin
    pub fn window_to_world(&self, frame: &PreviewFrame, x: i32, y: i32) -> Option<Point> {
        let (bx, by) = self.viewport(frame).to_buffer(x as f64, y as f64)?;
        Some(frame.to_world(bx, by))
    }

    pub fn poll_events(&mut self) -> Vec<PreviewEvent> {
        let mut events = Vec::new();

        for event in self.event_pump.poll_iter() {
            match event {
                Event::Quit { .. }
                | Event::KeyDown {
                    keycode: Some(Keycode::Escape),
                    ..
                } => events.push(PreviewEvent::Quit),
                Event::MouseButtonDown {
                    x,
                    y,
                    mouse_btn: MouseButton::Left,
                    ..
                } => events.push(PreviewEvent::Click { x, y }),
                _ => {}
            }
        }

        events
    }
}

impl<'a> PreviewTarget<'a> {
    pub fn new(creator: &'a TextureCreator<WindowContext>) -> Self {
        Self {
            creator,
            texture: None,
            width: 0,
            height: 0,
        }
    }

    /// Texture matching the frame size, recreated when the bounds change
    fn prepare(&mut self, width: u32, height: u32) -> Result<&mut Texture<'a>, String> {
        if self.texture.is_none() || (self.width, self.height) != (width, height) {
            let texture = self
                .creator
                .create_texture_streaming(PixelFormatEnum::RGBA8888, width, height)
                .map_err(|e| e.to_string())?;
            tracing::debug!(width, height, "preview texture recreated");
            self.width = width;
            self.height = height;
            self.texture = Some(texture);
        }
        self.texture
            .as_mut()
            .ok_or_else(|| "preview texture missing".to_string())
    }
}
