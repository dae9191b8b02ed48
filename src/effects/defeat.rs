//! Defeat effect state machine
//!
//! Turns a sprite purple, washes it out, breaks it apart along diagonal
//! stripes and fades what is left to transparent:
//!
//! ```text
//! Idle -> Recolor -> WhiteoutIn -> Dissolve -> Final -> Done
//!   \-> Unavailable (no usable source image)
//! ```
//!
//! Instant stages (Recolor, Final) run in the same tick as the stage before
//! them. Timed stages clamp their clock to the stage duration; time left over
//! in the tick that finishes a timed stage is dropped.

use super::config::EffectConfig;
use super::transform::{dissolve_stripe, recolor, whiteout_alpha};
use super::Effect;
use crate::display::PixelBuffer;
use crate::image::{Image, Rgba};
use crate::scheduler::Scheduler;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Whiteout length at speed 1.0
pub const WHITEOUT_SECONDS: f32 = 0.5;
/// Dissolve length at speed 1.0
pub const BREAKDOWN_SECONDS: f32 = 1.0;

/// Overlay once the effect has finished
const CLEAR_OVERLAY: Rgba = Rgba::new(0xFF, 0xFF, 0xFF, 0x00);

/// Relative slack on the stage clock, so frame steps that add up to the
/// duration finish the stage despite f32 rounding
const CLOCK_TOLERANCE: f32 = 1e-4;

/// Errors reported when arming an effect
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EffectError {
    #[error("no source image with pixel data to apply the effect to")]
    InvalidImage,
}

/// Effect stages, in the only order they can be visited
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Idle,
    Recolor,
    WhiteoutIn,
    Dissolve,
    Final,
    Done,
    Unavailable,
}

impl Stage {
    /// Done and Unavailable never do any more work
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Unavailable)
    }
}

/// One deferred dissolve pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DissolveTask {
    stripe: u32,
    line_pitch: u32,
}

/// What the stage loop does after a handler ran
enum Tick {
    /// Stay in the current stage until the next tick
    Wait,
    /// Instant stage done, run the next stage with the same dt
    Instant,
    /// Timed stage done, run the next stage without carrying time over
    Finished,
}

/// Called once per armed cycle with the fully processed image
pub type CompletionListener = Box<dyn FnMut(&Image)>;

/// The defeat effect for a single sprite
pub struct DefeatEffect {
    name: String,
    config: EffectConfig,
    source: Option<Image>,
    image: Option<Image>,
    overlay: Rgba,
    stage: Stage,
    enabled: bool,
    // Clock of the current timed stage
    elapsed: f32,
    duration: f32,
    stripes: Scheduler<DissolveTask>,
    dirty: bool,
    listeners: Vec<CompletionListener>,
}

impl DefeatEffect {
    /// Create an unarmed effect. `advance` does nothing until [`DefeatEffect::arm`].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: EffectConfig::default(),
            source: None,
            image: None,
            overlay: Rgba::WHITE,
            stage: Stage::Idle,
            enabled: false,
            elapsed: 0.0,
            duration: 0.0,
            stripes: Scheduler::new(),
            dirty: false,
            listeners: Vec::new(),
        }
    }

    /// Start a fresh cycle on `source`.
    ///
    /// Drops anything left from a previous cycle (pending stripes included) and
    /// disables the effect. Without a usable image the effect becomes
    /// [`Stage::Unavailable`] and will never run.
    pub fn arm(&mut self, source: Option<&Image>, config: EffectConfig) -> Result<(), EffectError> {
        self.config = config;
        self.clear_cycle();
        self.enabled = false;

        match source.filter(|img| !img.is_empty()) {
            Some(img) => {
                debug!(
                    effect = %self.name,
                    width = img.width(),
                    height = img.height(),
                    "armed"
                );
                self.source = Some(img.clone());
                self.stage = Stage::Idle;
                Ok(())
            },
            None => {
                warn!(effect = %self.name, "no usable source image, effect unavailable");
                self.source = None;
                self.stage = Stage::Unavailable;
                Err(EffectError::InvalidImage)
            },
        }
    }

    /// Abandon the current cycle. Pending stripes are dropped and no completion
    /// is reported for it. An armed effect goes back to Idle, disabled.
    pub fn reset(&mut self) {
        self.clear_cycle();
        self.enabled = false;
        if self.source.is_some() {
            self.stage = Stage::Idle;
        }
    }

    fn clear_cycle(&mut self) {
        self.stripes.clear();
        self.image = None;
        self.overlay = Rgba::WHITE;
        self.elapsed = 0.0;
        self.duration = 0.0;
        self.dirty = true;
    }

    /// Register a completion listener. Listeners survive re-arming.
    pub fn on_completed(&mut self, listener: impl FnMut(&Image) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[inline]
    pub fn config(&self) -> &EffectConfig {
        &self.config
    }

    /// Tint to apply over the displayed image
    #[inline]
    pub fn overlay(&self) -> Rgba {
        self.overlay
    }

    /// The processed image, once the recolor has run
    #[inline]
    pub fn image(&self) -> Option<&Image> {
        self.image.as_ref()
    }

    /// What should be on screen right now: the processed image, or the
    /// untouched source before the effect starts
    pub fn display_image(&self) -> Option<&Image> {
        self.image.as_ref().or(self.source.as_ref())
    }

    /// True once after the image on screen changed outside the timed stages
    /// (arm, reset, recolor, a stripe, the final clear)
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Dissolve stripes still waiting for their time
    #[inline]
    pub fn pending_tasks(&self) -> usize {
        self.stripes.len()
    }

    /// Overall progress in 0.0..=1.0 across the timed stages
    pub fn progress(&self) -> f32 {
        let total = WHITEOUT_SECONDS + BREAKDOWN_SECONDS;
        let frac = if self.duration > 0.0 {
            (self.elapsed / self.duration).clamp(0.0, 1.0)
        } else {
            0.0
        };
        match self.stage {
            Stage::Idle | Stage::Recolor | Stage::Unavailable => 0.0,
            Stage::WhiteoutIn => frac * WHITEOUT_SECONDS / total,
            Stage::Dissolve => (WHITEOUT_SECONDS + frac * BREAKDOWN_SECONDS) / total,
            Stage::Final | Stage::Done => 1.0,
        }
    }

    /// Run one tick. Does nothing unless armed, enabled and not finished.
    pub fn advance(&mut self, dt: f32) {
        if !self.enabled || self.stage.is_terminal() || self.source.is_none() {
            return;
        }
        let mut dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        loop {
            let tick = match self.stage {
                Stage::Idle => {
                    self.enter(Stage::Recolor);
                    Tick::Instant
                },
                Stage::Recolor => self.run_recolor(),
                Stage::WhiteoutIn => self.run_whiteout_in(dt),
                Stage::Dissolve => self.run_dissolve(dt),
                Stage::Final => self.run_final(),
                Stage::Done | Stage::Unavailable => Tick::Wait,
            };
            match tick {
                Tick::Wait => break,
                Tick::Instant => {},
                Tick::Finished => dt = 0.0,
            }
        }
    }

    fn enter(&mut self, stage: Stage) {
        debug_assert!(stage > self.stage, "stage {:?} -> {:?}", self.stage, stage);
        debug!(effect = %self.name, from = ?self.stage, to = ?stage, "stage");
        self.stage = stage;
        self.elapsed = 0.0;
        self.duration = 0.0;
    }

    fn run_recolor(&mut self) -> Tick {
        let Some(source) = &self.source else {
            self.stage = Stage::Unavailable;
            return Tick::Wait;
        };
        let mut image = source.clone();
        recolor(
            &mut image,
            self.config.line_brightness_threshold(),
            self.config.whiteout_start_alpha(),
        );
        self.image = Some(image);
        self.dirty = true;

        self.enter(Stage::WhiteoutIn);
        self.duration = WHITEOUT_SECONDS / self.config.speed();
        Tick::Instant
    }

    fn run_whiteout_in(&mut self, dt: f32) -> Tick {
        let finished = self.step_clock(dt);
        self.apply_whiteout(
            self.config.whiteout_start_alpha(),
            self.config.whiteout_end_alpha(),
        );
        if !finished {
            return Tick::Wait;
        }
        self.begin_dissolve();
        Tick::Finished
    }

    fn begin_dissolve(&mut self) {
        self.enter(Stage::Dissolve);
        self.duration = BREAKDOWN_SECONDS / self.config.speed();

        let line_pitch = self.config.line_pitch();
        let time_pitch = self.duration / line_pitch as f32;
        self.stripes.clear();
        for stripe in 0..line_pitch {
            self.stripes
                .schedule(time_pitch * stripe as f32, DissolveTask { stripe, line_pitch });
        }
    }

    fn run_dissolve(&mut self, dt: f32) -> Tick {
        // Stripes first, so the last tick of the stage sees every stripe that came due
        for task in self.stripes.advance(dt) {
            self.apply_stripe(task);
        }

        let finished = self.step_clock(dt);
        self.apply_whiteout(self.config.whiteout_end_alpha(), 0x00);
        if !finished {
            return Tick::Wait;
        }

        // Rounding can leave a stripe a hair past the stage end
        for task in self.stripes.drain() {
            self.apply_stripe(task);
        }
        self.enter(Stage::Final);
        Tick::Finished
    }

    fn run_final(&mut self) -> Tick {
        self.overlay = CLEAR_OVERLAY;
        self.dirty = true;
        self.enter(Stage::Done);

        if let Some(image) = &self.image {
            info!(
                effect = %self.name,
                remaining = image.visible_count(),
                "defeat effect completed"
            );
            for listener in &mut self.listeners {
                listener(image);
            }
        }
        Tick::Wait
    }

    /// Advance the stage clock; true once it reaches the stage duration
    fn step_clock(&mut self, dt: f32) -> bool {
        self.elapsed += dt;
        if self.elapsed + CLOCK_TOLERANCE * self.duration >= self.duration {
            self.elapsed = self.duration;
            true
        } else {
            false
        }
    }

    fn apply_whiteout(&mut self, start: u8, end: u8) {
        if let Some(alpha) = whiteout_alpha(self.elapsed, self.duration, start, end) {
            self.overlay = Rgba::new(0xFF, 0xFF, 0xFF, alpha);
        }
    }

    fn apply_stripe(&mut self, task: DissolveTask) {
        if let Some(image) = &mut self.image {
            debug!(effect = %self.name, stripe = task.stripe, "dissolve stripe");
            dissolve_stripe(image, task.stripe, task.line_pitch);
            self.dirty = true;
        }
    }
}

impl Effect for DefeatEffect {
    fn update(&mut self, dt: f32) {
        self.advance(dt);
    }

    fn render(&self, buffer: &mut PixelBuffer, x: i32, y: i32) {
        if let Some(image) = self.display_image() {
            buffer.draw_image_tinted(image, x, y, self.overlay);
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Enable every effect at once, the way a single button press starts all of
/// them. Returns how many effects were switched on.
pub fn enable_all<'a, I>(effects: I) -> usize
where
    I: IntoIterator<Item = &'a mut DefeatEffect>,
{
    let mut count = 0;
    for effect in effects {
        if !effect.is_enabled() {
            effect.set_enabled(true);
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn sprite() -> Image {
        let mut img = Image::filled(8, 8, Rgba::opaque(200, 200, 200));
        // Transparent corner and a dark outline pixel
        img.set(0, 0, Rgba::TRANSPARENT);
        img.set(1, 0, Rgba::opaque(0x20, 0x20, 0x20));
        img
    }

    fn config(speed: f32, pitch: u32) -> EffectConfig {
        EffectConfig::new(speed, 0xCC, 0x20, 0x32, pitch)
    }

    fn armed(speed: f32, pitch: u32) -> DefeatEffect {
        let mut fx = DefeatEffect::new("test");
        fx.arm(Some(&sprite()), config(speed, pitch)).unwrap();
        fx.set_enabled(true);
        fx
    }

    fn count_completions(fx: &mut DefeatEffect) -> Rc<Cell<u32>> {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        fx.on_completed(move |_| c.set(c.get() + 1));
        count
    }

    #[test]
    fn test_arm_without_image_is_unavailable() {
        let mut fx = DefeatEffect::new("missing");
        let completed = count_completions(&mut fx);
        assert_eq!(fx.arm(None, EffectConfig::default()), Err(EffectError::InvalidImage));
        assert_eq!(fx.stage(), Stage::Unavailable);

        fx.set_enabled(true);
        for _ in 0..10 {
            fx.advance(0.5);
        }
        assert_eq!(fx.stage(), Stage::Unavailable);
        assert!(fx.image().is_none());
        assert_eq!(completed.get(), 0);
    }

    #[test]
    fn test_arm_with_empty_image_is_unavailable() {
        let mut fx = DefeatEffect::new("empty");
        let empty = Image::new(0, 4);
        assert_eq!(
            fx.arm(Some(&empty), EffectConfig::default()),
            Err(EffectError::InvalidImage)
        );
        assert_eq!(fx.stage(), Stage::Unavailable);
    }

    #[test]
    fn test_disabled_effect_does_nothing() {
        let mut fx = armed(1.0, 4);
        fx.set_enabled(false);
        fx.advance(1.0);
        assert_eq!(fx.stage(), Stage::Idle);
        assert!(fx.image().is_none());
        assert_eq!(fx.overlay(), Rgba::WHITE);
    }

    #[test]
    fn test_unarmed_effect_does_nothing() {
        let mut fx = DefeatEffect::new("unarmed");
        fx.set_enabled(true);
        fx.advance(1.0);
        assert_eq!(fx.stage(), Stage::Idle);
    }

    #[test]
    fn test_first_tick_recolors_and_starts_whiteout() {
        let mut fx = armed(1.0, 4);
        fx.take_dirty();
        fx.advance(0.0);
        assert_eq!(fx.stage(), Stage::WhiteoutIn);
        assert!(fx.take_dirty());

        let img = fx.image().unwrap();
        assert_eq!(img.get(0, 0), Some(Rgba::TRANSPARENT));
        assert_eq!(img.get(1, 0), Some(Rgba::new(0x20, 0x20, 0x20, 0xCC)));
        assert_eq!(img.get(4, 4), Some(Rgba::new(186, 80, 200, 0xCC)));
        assert_eq!(fx.overlay(), Rgba::new(0xFF, 0xFF, 0xFF, 0xCC));
    }

    #[test]
    fn test_whiteout_overlay_ramps_down() {
        let mut fx = armed(1.0, 4);
        fx.advance(0.25);
        assert_eq!(fx.stage(), Stage::WhiteoutIn);
        assert_eq!(fx.overlay().a, 0xCC - 86);
    }

    #[test]
    fn test_whiteout_finishes_after_half_second_in_small_steps() {
        let mut fx = armed(1.0, 4);
        let mut transitions = 0;
        let mut prev = fx.stage();
        for _ in 0..4 {
            fx.advance(0.125);
            if prev == Stage::WhiteoutIn && fx.stage() == Stage::Dissolve {
                transitions += 1;
            }
            prev = fx.stage();
        }
        assert_eq!(fx.stage(), Stage::Dissolve);
        assert_eq!(transitions, 1);
        assert_eq!(fx.overlay().a, 0x20);
    }

    #[test]
    fn test_whiteout_finishes_after_uneven_splits() {
        for n in [3u32, 5, 7, 10, 13, 30, 60, 100] {
            let mut fx = armed(1.0, 4);
            let mut transitions = 0;
            for i in 0..n {
                let before = fx.stage();
                fx.advance(0.5 / n as f32);
                if before == Stage::WhiteoutIn && fx.stage() == Stage::Dissolve {
                    transitions += 1;
                }
                if i + 1 < n {
                    assert_eq!(fx.stage(), Stage::WhiteoutIn, "n = {} tick {}", n, i);
                }
            }
            assert_eq!(fx.stage(), Stage::Dissolve, "n = {}", n);
            assert_eq!(transitions, 1, "n = {}", n);
            assert_eq!(fx.overlay().a, 0x20);
        }
    }

    #[test]
    fn test_dissolve_finishes_after_frame_sized_steps() {
        for n in [7u32, 60, 144] {
            let mut fx = armed(1.0, 6);
            let count = count_completions(&mut fx);
            fx.advance(0.5);
            for _ in 0..n {
                fx.advance(1.0 / n as f32);
            }
            assert_eq!(fx.stage(), Stage::Done, "n = {}", n);
            assert_eq!(count.get(), 1);
            assert_eq!(fx.pending_tasks(), 0);
        }
    }

    #[test]
    fn test_final_marks_dirty() {
        let mut fx = armed(1.0, 4);
        fx.advance(0.5);
        fx.advance(0.5);
        fx.take_dirty();
        fx.advance(0.5);
        assert_eq!(fx.stage(), Stage::Done);
        assert!(fx.take_dirty());
        assert!(!fx.take_dirty());
    }

    #[test]
    fn test_whiteout_finishes_in_one_large_step() {
        let mut fx = armed(1.0, 4);
        fx.advance(0.5);
        assert_eq!(fx.stage(), Stage::Dissolve);
    }

    #[test]
    fn test_speed_scales_stage_durations() {
        let mut fx = armed(2.0, 4);
        fx.advance(0.125);
        assert_eq!(fx.stage(), Stage::WhiteoutIn);
        fx.advance(0.125);
        assert_eq!(fx.stage(), Stage::Dissolve);
        fx.advance(0.5);
        assert_eq!(fx.stage(), Stage::Done);
    }

    #[test]
    fn test_dissolve_fires_stripes_on_schedule() {
        let mut fx = armed(1.0, 4);
        fx.advance(0.5);
        assert_eq!(fx.stage(), Stage::Dissolve);
        // Stripe 0 is due immediately
        assert_eq!(fx.pending_tasks(), 3);
        assert_eq!(fx.image().unwrap().get(4, 0).unwrap().a, 0);

        fx.advance(0.25);
        assert_eq!(fx.pending_tasks(), 2);
        assert_eq!(fx.overlay().a, 0x20 - 8);

        fx.advance(0.25);
        assert_eq!(fx.pending_tasks(), 1);
        assert_eq!(fx.overlay().a, 0x20 - 16);
    }

    #[test]
    fn test_completion_fires_once_with_dissolved_image() {
        let mut fx = armed(1.0, 4);
        let count = count_completions(&mut fx);
        let captured: Rc<RefCell<Option<Image>>> = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&captured);
        fx.on_completed(move |img| *slot.borrow_mut() = Some(img.clone()));

        for _ in 0..12 {
            fx.advance(0.125);
        }
        assert_eq!(fx.stage(), Stage::Done);
        assert_eq!(count.get(), 1);
        assert_eq!(fx.overlay(), Rgba::new(0xFF, 0xFF, 0xFF, 0));
        assert_eq!(fx.pending_tasks(), 0);

        // Every stripe ran; what is left is the part the diagonal never reaches
        let img = captured.borrow().clone().unwrap();
        assert_eq!(img.visible_count(), 24);
        assert_eq!(img.get(4, 0).unwrap().a, 0);
        assert_eq!(img.get(1, 0).unwrap().a, 0xCC);
        assert_eq!(fx.image(), Some(&img));

        for _ in 0..5 {
            fx.advance(1.0);
        }
        assert_eq!(count.get(), 1);
        assert_eq!(fx.stage(), Stage::Done);
    }

    #[test]
    fn test_stages_only_move_forward() {
        let mut fx = armed(1.5, 7);
        let mut seen = vec![fx.stage()];
        for i in 0..40 {
            fx.advance(0.01 + (i % 3) as f32 * 0.02);
            seen.push(fx.stage());
        }
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{:?}", seen);
        assert_eq!(fx.stage(), Stage::Done);
    }

    #[test]
    fn test_reset_drops_pending_stripes_and_completion() {
        let mut fx = armed(1.0, 4);
        let count = count_completions(&mut fx);
        fx.advance(0.5);
        fx.advance(0.25);
        assert!(fx.pending_tasks() > 0);

        fx.reset();
        assert_eq!(fx.pending_tasks(), 0);
        assert_eq!(fx.stage(), Stage::Idle);
        assert!(!fx.is_enabled());
        assert!(fx.image().is_none());

        fx.advance(5.0);
        assert_eq!(count.get(), 0);
        assert_eq!(fx.stage(), Stage::Idle);
    }

    #[test]
    fn test_rearm_runs_a_new_cycle() {
        let mut fx = armed(2.0, 5);
        let count = count_completions(&mut fx);
        fx.advance(1.0);
        fx.advance(1.0);
        assert_eq!(count.get(), 1);

        fx.arm(Some(&sprite()), config(2.0, 5)).unwrap();
        assert_eq!(fx.stage(), Stage::Idle);
        assert_eq!(fx.overlay(), Rgba::WHITE);
        fx.set_enabled(true);
        fx.advance(1.0);
        fx.advance(1.0);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_bad_dt_is_ignored() {
        let mut fx = armed(1.0, 4);
        fx.advance(-3.0);
        fx.advance(f32::NAN);
        assert_eq!(fx.stage(), Stage::WhiteoutIn);
        assert_eq!(fx.progress(), 0.0);
    }

    #[test]
    fn test_progress_spans_timed_stages() {
        let mut fx = armed(1.0, 4);
        assert_eq!(fx.progress(), 0.0);
        fx.advance(0.5);
        assert!((fx.progress() - 1.0 / 3.0).abs() < 1e-6);
        fx.advance(0.5);
        assert!((fx.progress() - 2.0 / 3.0).abs() < 1e-6);
        fx.advance(0.5);
        assert_eq!(fx.progress(), 1.0);
    }

    #[test]
    fn test_enable_all_fans_out() {
        let img = sprite();
        let mut effects: Vec<DefeatEffect> = (0..3)
            .map(|i| {
                let mut fx = DefeatEffect::new(format!("sprite{}", i));
                fx.arm(Some(&img), EffectConfig::default()).unwrap();
                fx
            })
            .collect();
        effects[1].set_enabled(true);

        assert_eq!(enable_all(effects.iter_mut()), 2);
        assert!(effects.iter().all(DefeatEffect::is_enabled));
    }

    #[test]
    fn test_render_draws_display_image() {
        let mut fx = armed(1.0, 4);
        let mut buffer = PixelBuffer::with_size(16, 16);
        fx.render(&mut buffer, 2, 2);
        assert_eq!(buffer.get_pixel(6, 6), Some((200, 200, 200)));

        for _ in 0..4 {
            fx.advance(1.0);
        }
        buffer.clear(0, 0, 0);
        fx.render(&mut buffer, 2, 2);
        assert_eq!(buffer.get_pixel(6, 6), Some((0, 0, 0)));
        assert_eq!(fx.name(), "test");
    }
}
