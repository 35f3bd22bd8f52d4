use std::time::Duration;

/// Delay schedule between restart attempts of one stage.
pub struct RestartBackoff {
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    current_delay: Duration,
    attempt: u32,
    max_retries: u32,
    jitter: bool,
}

impl RestartBackoff {
    /// `max_attempts` counts every start attempt, the first one included.
    pub fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay: base,
            max_delay: max,
            multiplier: 2.0,
            current_delay: base,
            attempt: 0,
            max_retries: max_attempts.saturating_sub(1),
            jitter: true,
        }
    }

    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Delay before the next retry, or `None` once retries are used up.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_retries {
            return None;
        }

        self.attempt += 1;

        let delay = if self.attempt == 1 {
            self.base_delay.min(self.max_delay)
        } else {
            let multiplied = self.current_delay.as_secs_f64() * self.multiplier;
            Duration::from_secs_f64(multiplied.min(self.max_delay.as_secs_f64()))
        };

        self.current_delay = delay;

        if self.jitter {
            let jitter_factor = 0.5 + rand::random::<f64>() * 0.5;
            Some(Duration::from_secs_f64(delay.as_secs_f64() * jitter_factor))
        } else {
            Some(delay)
        }
    }

    pub fn retries(&self) -> u32 {
        self.attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_up_to_cap() {
        let mut backoff = RestartBackoff::new(Duration::from_millis(500), Duration::from_millis(1500), 5)
            .with_jitter(false);
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(500)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(1000)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(1500)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(1500)));
        assert_eq!(backoff.next_delay(), None);
        assert!(backoff.is_exhausted());
    }

    #[test]
    fn test_three_attempts_means_two_retries() {
        let mut backoff = RestartBackoff::new(Duration::from_millis(100), Duration::from_secs(1), 3);
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
        assert_eq!(backoff.retries(), 2);
    }

    #[test]
    fn test_jitter_stays_within_half() {
        let mut backoff = RestartBackoff::new(Duration::from_secs(2), Duration::from_secs(2), 10);
        for _ in 0..9 {
            let delay = backoff.next_delay().unwrap();
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_secs(2));
        }
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let mut backoff = RestartBackoff::new(Duration::from_millis(100), Duration::from_secs(1), 1);
        assert!(backoff.next_delay().is_none());
    }
}
