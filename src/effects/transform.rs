//! Per-pixel transforms behind the defeat effect
//!
//! Every function here mutates the buffer in place. Whoever displays the
//! image has to re-upload or re-composite it afterward.

use crate::image::{Image, Rgba};

/// Purple the recolor blends toward, scaled by pixel brightness
pub const DEFEAT_PURPLE: (u8, u8, u8) = (0xEE, 0x66, 0xFF);

/// Scale one channel of the target color by brightness `v` (truncating)
#[inline]
fn scale_channel(target: u8, v: u8) -> u8 {
    (target as u16 * v as u16 / 255) as u8
}

/// Remap a single pixel. Transparent pixels come back unchanged.
#[inline]
pub fn recolor_pixel(c: Rgba, threshold: u8, alpha: u8) -> Rgba {
    if c.a == 0 {
        return c;
    }
    let v = c.brightness();
    if v > threshold {
        Rgba::new(
            scale_channel(DEFEAT_PURPLE.0, v),
            scale_channel(DEFEAT_PURPLE.1, v),
            scale_channel(DEFEAT_PURPLE.2, v),
            alpha,
        )
    } else {
        // Dark pixels are the outline, keep their color
        Rgba { a: alpha, ..c }
    }
}

/// Brightness-based purple remap over the whole image.
///
/// Pixels brighter than `threshold` become [`DEFEAT_PURPLE`] scaled by their
/// brightness; the rest keep their color. Every visible pixel gets `alpha`.
pub fn recolor(image: &mut Image, threshold: u8, alpha: u8) {
    for px in image.pixels_mut() {
        *px = recolor_pixel(*px, threshold, alpha);
    }
}

/// Erase one diagonal stripe.
///
/// For each band of `line_pitch` rows starting at `y`, column `x` targets row
/// offset `p = x mod line_pitch + step`, pulled back by `line_pitch` whenever
/// `p + y > line_pitch`. On later bands that pull-back lands in the band above.
/// Positions outside the buffer are skipped.
///
/// Running every stripe leaves part of the top row (and of the last band)
/// visible, e.g. 6 of 32 pixels on 8×4 with pitch 4.
pub fn dissolve_stripe(image: &mut Image, step: u32, line_pitch: u32) {
    if line_pitch == 0 {
        return;
    }
    let width = i64::from(image.width());
    let height = i64::from(image.height());
    let pitch = i64::from(line_pitch);
    let step = i64::from(step);
    let pixels = image.pixels_mut();

    for y in (0..height).step_by(line_pitch as usize) {
        for x in 0..width {
            let mut p = x % pitch + step;
            if p + y > pitch {
                p -= pitch;
            }
            let pos = x + p * width + y * width;
            if let Some(px) = usize::try_from(pos).ok().and_then(|i| pixels.get_mut(i)) {
                px.a = 0;
            }
        }
    }
}

/// Overlay alpha for a linear whiteout ramp from `start` to `end` over `total`
/// seconds, sampled at `now`.
///
/// The fade amount is rounded half to even. Returns `None` when the fade
/// amount is negative (an `end` above `start`) or not representable, in which
/// case the overlay should be left as it is.
pub fn whiteout_alpha(now: f32, total: f32, start: u8, end: u8) -> Option<u8> {
    if total <= 0.0 {
        return None;
    }
    let white = now * ((start as f32 - end as f32) / total);
    if white >= 0.0 && white < 255.5 {
        Some(start.saturating_sub(white.round_ties_even() as u8))
    } else {
        None
    }
}
