//! Per-question countdown.
//!
//! The countdown itself is plain state: the async engine owns the ticking
//! task and feeds ticks back in. Every `arm`/`disarm` bumps the generation,
//! and a tick carrying an older generation is ignored, so a ticker that was
//! cancelled but still had a tick in flight can never fire against the
//! question the learner has since moved to.

/// Default seconds allowed per question in a timed session.
pub const DEFAULT_QUESTION_SECONDS: u32 = 30;

/// Identifies one arming of the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerGeneration(u64);

/// Result of feeding one tick into the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The tick belongs to a cancelled arming, or the countdown is idle.
    Stale,
    /// Seconds left after this tick.
    Running(u32),
    /// The countdown just reached zero and is now idle.
    Expired,
}

#[derive(Debug, Clone)]
pub struct Countdown {
    duration: u32,
    remaining: u32,
    generation: u64,
    armed: bool,
}

impl Countdown {
    pub fn new(duration_secs: u32) -> Self {
        let duration = duration_secs.max(1);
        Self {
            duration,
            remaining: duration,
            generation: 0,
            armed: false,
        }
    }

    /// Restart from the full duration, cancelling any earlier arming.
    pub fn arm(&mut self) -> TimerGeneration {
        self.generation += 1;
        self.remaining = self.duration;
        self.armed = true;
        TimerGeneration(self.generation)
    }

    pub fn disarm(&mut self) {
        if self.armed {
            self.generation += 1;
            self.armed = false;
        }
        self.remaining = self.duration;
    }

    pub fn tick(&mut self, generation: TimerGeneration) -> Tick {
        if !self.armed || generation.0 != self.generation {
            return Tick::Stale;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.armed = false;
            Tick::Expired
        } else {
            Tick::Running(self.remaining)
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// The live generation, if the countdown is armed.
    pub fn generation(&self) -> Option<TimerGeneration> {
        self.armed.then_some(TimerGeneration(self.generation))
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new(DEFAULT_QUESTION_SECONDS)
    }
}
