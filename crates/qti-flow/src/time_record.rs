use std::time::Duration;

/// Accumulated time spent in one item ref.
///
/// `enter`/`exit` pairs add up; while entered, `elapsed` includes the
/// running interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRecord {
    accumulated: Duration,
    entered_at: Option<Duration>,
}

impl TimeRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an interval. Entering twice keeps the first timestamp.
    pub fn enter(&mut self, now: Duration) {
        if self.entered_at.is_none() {
            self.entered_at = Some(now);
        }
    }

    /// Close the running interval, if any.
    pub fn exit(&mut self, now: Duration) {
        if let Some(start) = self.entered_at.take() {
            self.accumulated += now.saturating_sub(start);
        }
    }

    pub fn is_entered(&self) -> bool {
        self.entered_at.is_some()
    }

    pub fn elapsed(&self, now: Duration) -> Duration {
        match self.entered_at {
            Some(start) => self.accumulated + now.saturating_sub(start),
            None => self.accumulated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_intervals_accumulate() {
        let mut record = TimeRecord::new();
        record.enter(secs(10));
        record.exit(secs(15));
        record.enter(secs(20));
        assert_eq!(record.elapsed(secs(22)), secs(7));
        record.exit(secs(23));
        assert_eq!(record.elapsed(secs(100)), secs(8));
        assert!(!record.is_entered());
    }

    #[test]
    fn test_exit_without_enter_is_noop() {
        let mut record = TimeRecord::new();
        record.exit(secs(5));
        assert_eq!(record.elapsed(secs(5)), Duration::ZERO);
    }

    #[test]
    fn test_double_enter_keeps_first() {
        let mut record = TimeRecord::new();
        record.enter(secs(1));
        record.enter(secs(4));
        record.exit(secs(6));
        assert_eq!(record.elapsed(secs(6)), secs(5));
    }
}
