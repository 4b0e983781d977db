use std::collections::VecDeque;
use std::time::Duration;

/// Rolling history of step-pass durations.
#[derive(Debug, Clone)]
pub struct FrameTimer {
    history: VecDeque<Duration>,
    capacity: usize,
}

impl FrameTimer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record one pass, evicting the oldest once full.
    pub fn record(&mut self, elapsed: Duration) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(elapsed);
    }

    pub fn last(&self) -> Duration {
        self.history.back().copied().unwrap_or_default()
    }

    pub fn average(&self) -> Duration {
        if self.history.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.history.iter().sum();
        total / self.history.len() as u32
    }

    pub fn max(&self) -> Duration {
        self.history.iter().copied().max().unwrap_or_default()
    }

    pub fn min(&self) -> Duration {
        self.history.iter().copied().min().unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.history.len()
    }
}
