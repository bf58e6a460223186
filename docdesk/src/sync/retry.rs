use std::time::Duration;

/// Bounded re-fetch schedule used after a sibling-name conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictRetry {
    attempts: u32,
    delay: Duration,
}

impl Default for ConflictRetry {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(200))
    }
}

impl ConflictRetry {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    pub fn immediate(attempts: u32) -> Self {
        Self::new(attempts, Duration::ZERO)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Delay before re-fetch number `attempt` (0-based). The first re-fetch runs right away.
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        if attempt > self.attempts {
            None
        } else if attempt == 0 {
            Some(Duration::ZERO)
        } else {
            Some(self.delay)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_refetch_is_immediate_then_fixed_delay() {
        let retry = ConflictRetry::new(2, Duration::from_millis(200));
        assert_eq!(retry.delay_before(0), Some(Duration::ZERO));
        assert_eq!(retry.delay_before(1), Some(Duration::from_millis(200)));
        assert_eq!(retry.delay_before(2), Some(Duration::from_millis(200)));
        assert_eq!(retry.delay_before(3), None);
    }

    #[test]
    fn zero_attempts_still_refetches_once() {
        let retry = ConflictRetry::immediate(0);
        assert_eq!(retry.delay_before(0), Some(Duration::ZERO));
        assert_eq!(retry.delay_before(1), None);
    }
}
