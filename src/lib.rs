//! Sprite "defeat" effect.
//!
//! A sprite is recolored toward purple, washed out to white, broken apart
//! along staggered diagonal stripes and faded to nothing, one frame tick at a
//! time. [`effects::DefeatEffect`] is the state machine; the pixel math lives in
//! [`effects::transform`]; [`scheduler::Scheduler`] staggers the dissolve.
//!
//! The SDL2 viewer in `main.rs` drives three sprites with it.

pub mod display;
pub mod effects;
pub mod image;
pub mod mqtt;
pub mod scheduler;
pub mod util;

pub use effects::{DefeatEffect, Effect, EffectConfig, EffectError, Stage};
pub use image::{Image, Rgba};
