//! Reconnect backoff

use std::time::Duration;

/// Exponential reconnect delay
///
/// Each call to [`next_delay`](Self::next_delay) returns the current delay
/// and doubles it for the following attempt, up to the maximum.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay before the next attempt; advances the backoff
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Delay the next attempt would use, without advancing
    pub fn peek(&self) -> Duration {
        self.current
    }

    /// Start over from the initial delay
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_doubles_and_caps() {
        let mut backoff = ReconnectBackoff::default();
        let delays: Vec<_> = (0..8).map(|_| backoff.next_delay()).collect();

        assert_eq!(
            delays,
            vec![secs(1), secs(2), secs(4), secs(8), secs(16), secs(30), secs(30), secs(30)]
        );
    }

    #[test]
    fn test_reset() {
        let mut backoff = ReconnectBackoff::default();
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.peek(), secs(4));

        backoff.reset();
        assert_eq!(backoff.next_delay(), secs(1));
    }

    #[test]
    fn test_initial_above_max_is_clamped() {
        let mut backoff = ReconnectBackoff::new(secs(60), secs(30));
        assert_eq!(backoff.next_delay(), secs(30));
        assert_eq!(backoff.next_delay(), secs(30));
    }
}
