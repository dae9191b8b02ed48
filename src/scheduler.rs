//! Delayed task dispatch driven by the frame clock
//!
//! Tasks are plain values handed back to the caller once their delay has
//! elapsed. There is no thread and no timer: the owner advances the clock with
//! the same `dt` it feeds its own update, and acts on whatever comes due.

/// A pending task with its due time
#[derive(Debug, Clone)]
struct Entry<T> {
    due: f32,
    task: T,
}

/// Polled scheduler for deferred tasks
///
/// A task scheduled with delay `d` is returned by the first [`Scheduler::advance`]
/// call after which the cumulative elapsed time is `>= d`, exactly once. Tasks
/// due in the same call come back ordered by delay, ties in scheduling order.
/// Pending tasks are dropped with the scheduler.
#[derive(Debug, Clone)]
pub struct Scheduler<T> {
    // Sorted by due time; equal times stay in insertion order
    pending: Vec<Entry<T>>,
    elapsed: f32,
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            elapsed: 0.0,
        }
    }

    /// Schedule `task` to fire `delay` seconds from the current clock
    pub fn schedule(&mut self, delay: f32, task: T) {
        let delay = if delay.is_finite() { delay.max(0.0) } else { 0.0 };
        let entry = Entry {
            due: self.elapsed + delay,
            task,
        };

        // Insert after every entry due at or before this one
        let at = self.pending.partition_point(|e| e.due <= entry.due);
        self.pending.insert(at, entry);
    }

    /// Move the clock forward and return every task that came due
    pub fn advance(&mut self, dt: f32) -> Vec<T> {
        if dt.is_finite() && dt > 0.0 {
            self.elapsed += dt;
        }
        let due = self.pending.partition_point(|e| e.due <= self.elapsed);
        self.pending.drain(..due).map(|e| e.task).collect()
    }

    /// Remove every pending task in firing order, regardless of the clock
    pub fn drain(&mut self) -> Vec<T> {
        self.pending.drain(..).map(|e| e.task).collect()
    }

    /// Cancel everything and rewind the clock
    pub fn clear(&mut self) {
        self.pending.clear();
        self.elapsed = 0.0;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Cumulative time fed through [`Scheduler::advance`]
    #[inline]
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}
