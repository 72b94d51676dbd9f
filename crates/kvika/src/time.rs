//! Frame timing and the fixed-timestep accumulator.
//!
//! The [`Time`] resource is advanced by [`Game::step`](crate::Game::step)
//! with a caller-supplied delta, so the whole clock is deterministic and
//! headless-testable. Fixed steps are drained through
//! [`consume_fixed_step`](Time::consume_fixed_step) before the variable
//! phase runs.

/// Frame timing resource. Lives in the world's resources; advanced once
/// per frame.
#[derive(Clone, Copy)]
pub struct Time {
    /// Duration of the previous frame, seconds.
    delta: f32,
    /// Total simulated time, seconds.
    elapsed: f64,
    /// The fixed step, seconds.
    fixed_dt: f32,
    /// Unconsumed simulated time awaiting fixed steps.
    accumulator: f64,
    /// Frame counter.
    frame_count: u64,
    /// Upper bound on fixed steps per frame, so one slow frame cannot
    /// trigger a spiral of catch-up work.
    max_fixed_steps: u32,
}

impl Time {
    /// A clock ticking fixed updates at `fixed_hz`.
    pub fn new(fixed_hz: f32) -> Self {
        Self {
            delta: 0.0,
            elapsed: 0.0,
            fixed_dt: 1.0 / fixed_hz,
            accumulator: 0.0,
            frame_count: 0,
            max_fixed_steps: 8,
        }
    }

    /// Advance by one frame's delta. Negative deltas clamp to zero.
    pub fn advance(&mut self, dt: f32) {
        let dt = dt.max(0.0);
        self.delta = dt;
        self.elapsed += f64::from(dt);
        self.frame_count += 1;
        let ceiling = f64::from(self.fixed_dt) * f64::from(self.max_fixed_steps);
        self.accumulator = (self.accumulator + f64::from(dt)).min(ceiling);
    }

    /// Take one fixed step out of the accumulator if a full step is
    /// available. Drain in a loop before the variable-rate phase.
    pub fn consume_fixed_step(&mut self) -> bool {
        let step = f64::from(self.fixed_dt);
        if self.accumulator >= step {
            self.accumulator -= step;
            true
        } else {
            false
        }
    }

    /// Previous frame's delta in seconds.
    pub fn delta_secs(&self) -> f32 {
        self.delta
    }

    /// The fixed step in seconds.
    pub fn fixed_delta_secs(&self) -> f32 {
        self.fixed_dt
    }

    /// Total simulated time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed
    }

    /// Number of frames stepped so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Estimated FPS based on the last frame's delta.
    pub fn fps(&self) -> f32 {
        if self.delta > 0.0 {
            1.0 / self.delta
        } else {
            0.0
        }
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new(60.0)
    }
}
