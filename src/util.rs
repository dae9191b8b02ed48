//! Shared utilities

use std::collections::VecDeque;
use std::time::Instant;

/// Longest frame step handed to the effects. Dragging the window or a debugger
/// pause should not skip whole stages.
pub const MAX_FRAME_DT: f32 = 0.1;

/// Frame clock with a rolling FPS average
pub struct FrameClock {
    frame_times: VecDeque<f32>,
    last_frame: Instant,
    sample_count: usize,
}

impl FrameClock {
    /// Create a new clock with specified sample window
    pub fn new(sample_count: usize) -> Self {
        Self {
            frame_times: VecDeque::with_capacity(sample_count),
            last_frame: Instant::now(),
            sample_count: sample_count.max(1),
        }
    }

    /// Call at the start of each frame.
    /// Returns (delta_time clamped to MAX_FRAME_DT, average_fps)
    pub fn tick(&mut self) -> (f32, f32) {
        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.record(dt)
    }

    fn record(&mut self, dt: f32) -> (f32, f32) {
        self.frame_times.push_back(dt);
        if self.frame_times.len() > self.sample_count {
            self.frame_times.pop_front();
        }

        let avg_dt: f32 =
            self.frame_times.iter().sum::<f32>() / self.frame_times.len().max(1) as f32;
        let avg_fps = if avg_dt > 0.0 { 1.0 / avg_dt } else { 0.0 };

        (dt.min(MAX_FRAME_DT), avg_fps)
    }
}
