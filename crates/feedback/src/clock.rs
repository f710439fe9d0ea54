//! Frame clocks feeding the pipeline's elapsed time.

use std::time::{Duration, Instant};

/// Elapsed time and frame number for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTick {
    pub elapsed: Duration,
    pub frame_index: u64,
}

impl FrameTick {
    pub fn new(elapsed: Duration, frame_index: u64) -> Self {
        Self {
            elapsed,
            frame_index,
        }
    }
}

/// Abstraction over where frame times originate from.
pub trait FrameClock {
    /// Restarts from zero.
    fn reset(&mut self);
    /// Produces the tick for the next frame.
    fn tick(&mut self) -> FrameTick;
}

/// Wall clock, used by the interactive preview.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
    frame: u64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            frame: 0,
        }
    }
}

impl FrameClock for SystemClock {
    fn reset(&mut self) {
        self.origin = Instant::now();
        self.frame = 0;
    }

    fn tick(&mut self) -> FrameTick {
        let tick = FrameTick::new(self.origin.elapsed(), self.frame);
        self.frame = self.frame.saturating_add(1);
        tick
    }
}

/// Advances by a constant step per frame so headless renders are
/// reproducible.
#[derive(Debug, Clone, Copy)]
pub struct FixedStepClock {
    step: Duration,
    frame: u64,
}

impl FixedStepClock {
    pub fn new(step: Duration) -> Self {
        Self { step, frame: 0 }
    }
}

impl FrameClock for FixedStepClock {
    fn reset(&mut self) {
        self.frame = 0;
    }

    fn tick(&mut self) -> FrameTick {
        let frames = u32::try_from(self.frame).unwrap_or(u32::MAX);
        let tick = FrameTick::new(self.step.saturating_mul(frames), self.frame);
        self.frame = self.frame.saturating_add(1);
        tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_step_clock_advances_linearly() {
        let mut clock = FixedStepClock::new(Duration::from_millis(16));
        let ticks: Vec<_> = (0..3).map(|_| clock.tick()).collect();
        assert_eq!(ticks[0], FrameTick::new(Duration::ZERO, 0));
        assert_eq!(ticks[2], FrameTick::new(Duration::from_millis(32), 2));

        clock.reset();
        assert_eq!(clock.tick().frame_index, 0);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let mut clock = SystemClock::new();
        let first = clock.tick();
        let second = clock.tick();
        assert!(second.elapsed >= first.elapsed);
        assert_eq!(second.frame_index, 1);
    }
}
