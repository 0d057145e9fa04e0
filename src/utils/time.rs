//! Frame timing.

use std::time::{Duration, Instant};

/// Timer for tracking frame timing and elapsed time.
pub struct Timer {
    start_time: Instant,
    last_update: Instant,
    /// Time since last tick
    pub delta: Duration,
    /// Total elapsed time since creation
    pub elapsed: Duration,
    /// Total number of ticks
    pub frame_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Creates a new timer starting from now.
    #[must_use]
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            last_update: now,
            delta: Duration::ZERO,
            elapsed: Duration::ZERO,
            frame_count: 0,
        }
    }

    /// Updates the timer (called by the frame pump each frame).
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta = now - self.last_update;
        self.elapsed = now - self.start_time;
        self.last_update = now;
        self.frame_count += 1;
    }

    #[must_use]
    pub fn dt_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }
}

/// Fixed-timestep accumulator decoupling simulation ticks from the
/// variable render framerate.
pub struct FixedTimestep {
    fixed_dt: f32,
    accumulator: f32,
    /// Per-frame input clamp, so a long hitch cannot trigger a spiral of
    /// catch-up steps.
    max_frame_dt: f32,
}

impl FixedTimestep {
    #[must_use]
    pub fn new(fixed_dt: f32) -> Self {
        Self {
            fixed_dt,
            accumulator: 0.0,
            max_frame_dt: fixed_dt * 8.0,
        }
    }

    #[inline]
    #[must_use]
    pub fn fixed_dt(&self) -> f32 {
        self.fixed_dt
    }

    /// Feeds frame time in; returns how many fixed steps to run now.
    pub fn advance(&mut self, dt: f32) -> u32 {
        self.accumulator += dt.clamp(0.0, self.max_frame_dt);
        let steps = (self.accumulator / self.fixed_dt) as u32;
        self.accumulator -= steps as f32 * self.fixed_dt;
        steps
    }

    /// Fraction of the way into the next fixed step (0..1), the blend
    /// factor for visual interpolation.
    #[must_use]
    pub fn alpha(&self) -> f32 {
        (self.accumulator / self.fixed_dt).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_counts_ticks() {
        let mut timer = Timer::new();
        timer.tick();
        timer.tick();
        assert_eq!(timer.frame_count, 2);
        assert!(timer.elapsed >= timer.delta);
        assert!(timer.dt_seconds() >= 0.0);
    }

    #[test]
    fn fixed_timestep_accumulates_whole_steps() {
        let mut ts = FixedTimestep::new(0.02);
        assert_eq!(ts.advance(0.01), 0);
        assert_eq!(ts.advance(0.01), 1);
        assert!(ts.alpha() < 1e-5);

        assert_eq!(ts.advance(0.05), 2);
        assert!((ts.alpha() - 0.5).abs() < 1e-3);
    }

    #[test]
    fn fixed_timestep_clamps_hitches() {
        let mut ts = FixedTimestep::new(0.02);
        // A two-second hitch must not produce a hundred catch-up steps.
        assert!(ts.advance(2.0) <= 8);
    }
}
