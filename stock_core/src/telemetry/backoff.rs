use std::time::Duration;

/// Reconnect delay: `base` after a success, doubled on every failure and
/// capped at `cap`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        let cap = cap.max(base);
        Self {
            base,
            cap,
            current: base,
        }
    }

    /// Delay to wait before the next attempt.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Return the delay for this failure and double it for the next one.
    pub fn next_delay(&mut self) -> Duration {
        let d = self.current;
        self.current = self.current.saturating_mul(2).min(self.cap);
        d
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_then_caps() {
        let mut b = Backoff::new(Duration::from_secs(5), Duration::from_secs(30));
        let secs: Vec<u64> = (0..6).map(|_| b.next_delay().as_secs()).collect();
        assert_eq!(secs, vec![5, 10, 20, 30, 30, 30]);
        b.reset();
        assert_eq!(b.current(), Duration::from_secs(5));
    }

    #[test]
    fn cap_below_base_is_raised() {
        let mut b = Backoff::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(b.next_delay(), Duration::from_secs(5));
        assert_eq!(b.next_delay(), Duration::from_secs(5));
    }

    use proptest::prelude::*;

    proptest! {
        // Delays never decrease, never exceed the cap, and each is at most
        // twice the previous one.
        #[test]
        fn delays_monotone_and_capped(base in 1u64..60, cap in 1u64..600, n in 1usize..40) {
            let mut b = Backoff::new(Duration::from_secs(base), Duration::from_secs(cap));
            let cap = cap.max(base);
            let mut prev = 0u64;
            for _ in 0..n {
                let d = b.next_delay().as_secs();
                prop_assert!(d >= prev);
                prop_assert!(d <= cap);
                prop_assert!(prev == 0 || d <= prev * 2);
                prev = d;
            }
        }
    }
}
