mod config;
mod defeat;
pub mod transform;

pub use config::{ConfigError, EffectConfig, LINE_PITCH_MAX, LINE_PITCH_MIN, SPEED_MAX, SPEED_MIN};
pub use defeat::{
    enable_all, CompletionListener, DefeatEffect, EffectError, Stage, BREAKDOWN_SECONDS,
    WHITEOUT_SECONDS,
};

use crate::display::PixelBuffer;

/// Trait for per-sprite effects driven by the frame loop
pub trait Effect {
    /// Update effect state (called each frame)
    /// - dt: delta time in seconds
    fn update(&mut self, dt: f32);

    /// Draw the sprite with its top-left corner at (x, y)
    fn render(&self, buffer: &mut PixelBuffer, x: i32, y: i32);

    /// Effect name for UI/debugging
    fn name(&self) -> &str;
}
