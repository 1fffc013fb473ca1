use std::time::{Duration, Instant};

/// Time budget for one dispatch, measured from a fixed start.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    /// Start the clock. `None` never expires.
    pub fn start(budget: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn budget(&self) -> Option<Duration> {
        self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left, or `None` without a budget. Zero once expired.
    pub fn remaining(&self) -> Option<Duration> {
        self.budget
            .map(|budget| budget.saturating_sub(self.started.elapsed()))
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|remaining| remaining.is_zero())
    }

    /// The instant the budget runs out, for use with tokio timers.
    pub fn expires_at(&self) -> Option<tokio::time::Instant> {
        self.budget
            .map(|budget| tokio::time::Instant::from_std(self.started + budget))
    }
}
