use crate::net::{TICK_RATE, Tick};

/// Seconds per simulation tick.
pub const TICK_DT: f32 = 1.0 / TICK_RATE as f32;

/// Turns wall-clock deltas into whole fixed steps.
pub struct FixedTimestep {
    dt: f32,
    accumulator: f32,
}

impl FixedTimestep {
    pub fn new(tick_rate: u32) -> Self {
        Self {
            dt: 1.0 / tick_rate as f32,
            accumulator: 0.0,
        }
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    /// Deltas above 250 ms are clamped so a stall does not trigger a burst of catch-up ticks.
    pub fn accumulate(&mut self, delta: f32) {
        self.accumulator += delta.min(0.25);
    }

    pub fn consume_tick(&mut self) -> bool {
        if self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            true
        } else {
            false
        }
    }
}

impl Default for FixedTimestep {
    fn default() -> Self {
        Self::new(TICK_RATE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("tick counter exhausted at {0}")]
pub struct TickOverflow(pub Tick);

/// Monotonic tick counter owned by one side of the connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickClock {
    current: Tick,
}

impl TickClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(current: Tick) -> Self {
        Self { current }
    }

    pub fn current(&self) -> Tick {
        self.current
    }

    /// Moves to the next tick and returns it. The first call yields 1.
    pub fn advance(&mut self) -> Result<Tick, TickOverflow> {
        self.current = self
            .current
            .checked_add(1)
            .ok_or(TickOverflow(self.current))?;
        Ok(self.current)
    }
}
