//! SDL2 window for the sprite viewer
//!
//! Everything is composited in software into a [`PixelBuffer`], which is then
//! streamed into a single window-sized texture each frame.

mod pixel_buffer;

pub use pixel_buffer::PixelBuffer;

use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::mouse::MouseButton;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, Texture, TextureCreator};
use sdl2::video::{Window, WindowContext};
use sdl2::EventPump;

pub const DEFAULT_WIDTH: u32 = 640;
pub const DEFAULT_HEIGHT: u32 = 480;

pub struct Display {
    canvas: Canvas<Window>,
    event_pump: EventPump,
}

/// Streaming texture the pixel buffer is uploaded into
pub struct RenderTarget<'a> {
    texture: Texture<'a>,
}

/// Input the viewer reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Quit,
    KeyDown(Keycode),
    Click { x: i32, y: i32 },
}

impl Display {
    /// Create a window of the given size.
    /// vsync=true: locked to monitor refresh (typically 60fps)
    /// vsync=false: uncapped framerate
    pub fn with_options(
        title: &str,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> Result<(Self, TextureCreator<WindowContext>), String> {
        let sdl_context = sdl2::init()?;
        let video_subsystem = sdl_context.video()?;

        let window = video_subsystem
            .window(title, width, height)
            .position_centered()
            .build()
            .map_err(|e| e.to_string())?;

        let mut canvas_builder = window.into_canvas().accelerated();
        if vsync {
            canvas_builder = canvas_builder.present_vsync();
        }
        let canvas = canvas_builder.build().map_err(|e| e.to_string())?;

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

    pub fn present(&mut self, target: &mut RenderTarget, buffer: &PixelBuffer) -> Result<(), String> {
        target
            .texture
            .update(None, buffer.as_bytes(), (buffer.width() * 4) as usize)
            .map_err(|e| e.to_string())?;

        self.canvas.copy(&target.texture, None, None)?;
        self.canvas.present();
        Ok(())
    }

    pub fn poll_events(&mut self) -> Vec<InputEvent> {
        self.event_pump
            .poll_iter()
            .filter_map(|event| match event {
                Event::Quit { .. } => Some(InputEvent::Quit),
                Event::KeyDown {
                    keycode: Some(k), ..
                } => Some(InputEvent::KeyDown(k)),
                Event::MouseButtonDown {
                    x,
                    y,
                    mouse_btn: MouseButton::Left,
                    ..
                } => Some(InputEvent::Click { x, y }),
                _ => None,
            })
            .collect()
    }
}

impl<'a> RenderTarget<'a> {
    /// Create a streaming render target matching the pixel buffer layout
    pub fn with_size(
        texture_creator: &'a TextureCreator<WindowContext>,
        width: u32,
        height: u32,
    ) -> Result<Self, String> {
        let texture = texture_creator
            .create_texture_streaming(PixelFormatEnum::RGBA8888, width, height)
            .map_err(|e| e.to_string())?;
        Ok(Self { texture })
    }
}
