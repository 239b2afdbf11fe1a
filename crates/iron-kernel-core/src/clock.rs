//! Deterministic logical clock.

use crate::types::LogicalTimestamp;

/// Produces monotonically increasing [`LogicalTimestamp`]s.
///
/// `tick` bumps the logical counter; `advance_to` moves the time component
/// forward and resets the counter. The clock never goes backwards.
#[derive(Debug, Clone, Default)]
pub struct LogicalClock {
    current: LogicalTimestamp,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start at a given timestamp.
    pub fn starting_at(ts: LogicalTimestamp) -> Self {
        Self { current: ts }
    }

    pub fn now(&self) -> LogicalTimestamp {
        self.current
    }

    /// Advance the logical component and return the new timestamp.
    pub fn tick(&mut self) -> LogicalTimestamp {
        self.current = self.current.next_logical();
        self.current
    }

    /// Move to `time:0` if `time` is ahead of the clock, otherwise tick.
    pub fn advance_to(&mut self, time: u64) -> LogicalTimestamp {
        if time > self.current.time {
            self.current = LogicalTimestamp::new(time, 0);
            self.current
        } else {
            self.tick()
        }
    }

    /// Fold in an externally observed timestamp.
    pub fn observe(&mut self, ts: LogicalTimestamp) {
        if ts > self.current {
            self.current = ts;
        }
    }
}
