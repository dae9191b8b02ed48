//! Tunables for the defeat effect
//!
//! Values are clamped into their valid ranges when the config is built, so a
//! bad file or a bad caller can never make the effect fail at runtime.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

pub const SPEED_MIN: f32 = 0.1;
pub const SPEED_MAX: f32 = 2.0;
pub const LINE_PITCH_MIN: u32 = 4;
pub const LINE_PITCH_MAX: u32 = 10;

/// Errors that can occur while loading a config file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Immutable effect tunables
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEffectConfig")]
pub struct EffectConfig {
    speed: f32,
    whiteout_start_alpha: u8,
    whiteout_end_alpha: u8,
    line_brightness_threshold: u8,
    line_pitch: u32,
}

impl EffectConfig {
    /// Build a config, clamping every value into range
    pub fn new(
        speed: f32,
        whiteout_start_alpha: u8,
        whiteout_end_alpha: u8,
        line_brightness_threshold: u8,
        line_pitch: u32,
    ) -> Self {
        Self {
            speed: clamp_speed(speed),
            whiteout_start_alpha,
            whiteout_end_alpha,
            line_brightness_threshold,
            line_pitch: clamp_pitch(line_pitch as i64),
        }
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Save to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Playback speed multiplier (0.1 - 2.0)
    #[inline]
    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Per-pixel alpha after recolor, and the overlay alpha the whiteout starts from
    #[inline]
    pub fn whiteout_start_alpha(&self) -> u8 {
        self.whiteout_start_alpha
    }

    /// Overlay alpha reached right before the dissolve
    #[inline]
    pub fn whiteout_end_alpha(&self) -> u8 {
        self.whiteout_end_alpha
    }

    /// Pixels at or below this brightness keep their color (outlines)
    #[inline]
    pub fn line_brightness_threshold(&self) -> u8 {
        self.line_brightness_threshold
    }

    /// Pitch of the diagonal dissolve stripes (4 - 10)
    #[inline]
    pub fn line_pitch(&self) -> u32 {
        self.line_pitch
    }
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            whiteout_start_alpha: 0xCC,
            whiteout_end_alpha: 0x20,
            line_brightness_threshold: 0x32,
            line_pitch: 6,
        }
    }
}

/// On-disk shape: wide integer types so out-of-range values clamp instead of
/// failing to parse
#[derive(Deserialize)]
#[serde(default)]
struct RawEffectConfig {
    speed: f32,
    whiteout_start_alpha: i64,
    whiteout_end_alpha: i64,
    line_brightness_threshold: i64,
    line_pitch: i64,
}

impl Default for RawEffectConfig {
    fn default() -> Self {
        let d = EffectConfig::default();
        Self {
            speed: d.speed,
            whiteout_start_alpha: d.whiteout_start_alpha.into(),
            whiteout_end_alpha: d.whiteout_end_alpha.into(),
            line_brightness_threshold: d.line_brightness_threshold.into(),
            line_pitch: d.line_pitch.into(),
        }
    }
}

impl From<RawEffectConfig> for EffectConfig {
    fn from(raw: RawEffectConfig) -> Self {
        Self {
            speed: clamp_speed(raw.speed),
            whiteout_start_alpha: clamp_byte("whiteout_start_alpha", raw.whiteout_start_alpha),
            whiteout_end_alpha: clamp_byte("whiteout_end_alpha", raw.whiteout_end_alpha),
            line_brightness_threshold: clamp_byte(
                "line_brightness_threshold",
                raw.line_brightness_threshold,
            ),
            line_pitch: clamp_pitch(raw.line_pitch),
        }
    }
}

fn clamp_speed(speed: f32) -> f32 {
    let clamped = if speed.is_nan() {
        EffectConfig::default().speed
    } else {
        speed.clamp(SPEED_MIN, SPEED_MAX)
    };
    if clamped != speed {
        warn!(requested = speed, used = clamped, "speed out of range, clamped");
    }
    clamped
}

fn clamp_pitch(pitch: i64) -> u32 {
    let clamped = pitch.clamp(LINE_PITCH_MIN as i64, LINE_PITCH_MAX as i64);
    if clamped != pitch {
        warn!(requested = pitch, used = clamped, "line_pitch out of range, clamped");
    }
    clamped as u32
}

fn clamp_byte(field: &str, value: i64) -> u8 {
    let clamped = value.clamp(0, 255);
    if clamped != value {
        warn!(field, requested = value, used = clamped, "byte value out of range, clamped");
    }
    clamped as u8
}
