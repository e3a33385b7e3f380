//! Per-bit settle-window debouncer.
//!
//! A raw level change is only reported once the new level has been observed
//! continuously for the settle window. Each signal keeps its own window, so a
//! ringing rail does not delay an unrelated input.

use core::time::Duration;

use super::SignalMask;
use crate::timer::EngineInstant;

/// Settle window applied to power signals unless the board overrides it.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(20);

pub struct Debouncer<I, const N: usize> {
    stable: SignalMask,
    candidate: SignalMask,
    since: [Option<I>; N],
    settle: Duration,
}

impl<I, const N: usize> Debouncer<I, N>
where
    I: EngineInstant,
{
    /// Seeds the debouncer; the initial sample is trusted without a window.
    #[must_use]
    pub fn new(initial: SignalMask, _now: I, settle: Duration) -> Self {
        Self {
            stable: initial,
            candidate: initial,
            since: [None; N],
            settle,
        }
    }

    /// Feeds a logical sample taken at `now`.
    ///
    /// Returns the new stable mask when at least one bit settled.
    pub fn update(&mut self, sample: SignalMask, now: I) -> Option<SignalMask> {
        let previous = self.stable;
        let mut stable = self.stable;

        for index in 0..N {
            let raw = sample.is_set(index);
            if raw == self.stable.is_set(index) {
                self.since[index] = None;
                continue;
            }

            let restarted = raw != self.candidate.is_set(index);
            let started = match self.since[index] {
                Some(started) if !restarted => started,
                _ => {
                    self.since[index] = Some(now);
                    now
                }
            };

            if now >= started + self.settle {
                stable = stable.with(index, raw);
                self.since[index] = None;
            }
        }

        self.candidate = sample;
        self.stable = stable;
        (stable != previous).then_some(stable)
    }

    /// Last settled mask.
    #[must_use]
    pub const fn stable(&self) -> SignalMask {
        self.stable
    }

    /// Returns `true` while any bit is inside its settle window.
    #[must_use]
    pub fn settling(&self) -> bool {
        self.since.iter().any(Option::is_some)
    }
}

#[cfg(test)]
mod tests {
    use core::ops::Add;

    use super::*;
    use crate::telemetry::TelemetryInstant;

    #[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
    struct MockInstant(u64);

    impl MockInstant {
        fn millis(value: u64) -> Self {
            Self(value * 1_000)
        }
    }

    impl Add<Duration> for MockInstant {
        type Output = Self;

        fn add(self, rhs: Duration) -> Self::Output {
            Self(self.0 + rhs.as_micros() as u64)
        }
    }

    impl TelemetryInstant for MockInstant {
        fn saturating_duration_since(&self, earlier: Self) -> Duration {
            Duration::from_micros(self.0.saturating_sub(earlier.0))
        }
    }

    fn debouncer() -> Debouncer<MockInstant, 4> {
        Debouncer::new(
            SignalMask::EMPTY,
            MockInstant::millis(0),
            Duration::from_millis(20),
        )
    }

    #[test]
    fn reports_change_after_settle_window() {
        let mut debouncer = debouncer();
        let high = SignalMask::bit(0);

        assert_eq!(debouncer.update(high, MockInstant::millis(0)), None);
        assert_eq!(debouncer.update(high, MockInstant::millis(10)), None);
        assert!(debouncer.settling());
        assert_eq!(debouncer.update(high, MockInstant::millis(20)), Some(high));
        assert_eq!(debouncer.stable(), high);
        assert!(!debouncer.settling());
    }

    #[test]
    fn bounce_restarts_window() {
        let mut debouncer = debouncer();
        let high = SignalMask::bit(1);

        debouncer.update(high, MockInstant::millis(0));
        debouncer.update(SignalMask::EMPTY, MockInstant::millis(5));
        debouncer.update(high, MockInstant::millis(10));
        assert_eq!(debouncer.update(high, MockInstant::millis(25)), None);
        assert_eq!(debouncer.update(high, MockInstant::millis(30)), Some(high));
    }

    #[test]
    fn bits_settle_independently() {
        let mut debouncer = debouncer();

        debouncer.update(SignalMask::bit(0), MockInstant::millis(0));
        debouncer.update(SignalMask::from_bits(0b11), MockInstant::millis(15));
        assert_eq!(
            debouncer.update(SignalMask::from_bits(0b11), MockInstant::millis(20)),
            Some(SignalMask::bit(0))
        );
        assert_eq!(
            debouncer.update(SignalMask::from_bits(0b11), MockInstant::millis(35)),
            Some(SignalMask::from_bits(0b11))
        );
    }

    #[test]
    fn short_glitch_is_rejected() {
        let mut debouncer = Debouncer::<MockInstant, 4>::new(
            SignalMask::bit(2),
            MockInstant::millis(0),
            Duration::from_millis(20),
        );

        debouncer.update(SignalMask::EMPTY, MockInstant::millis(1));
        debouncer.update(SignalMask::bit(2), MockInstant::millis(3));
        assert_eq!(debouncer.update(SignalMask::bit(2), MockInstant::millis(40)), None);
        assert_eq!(debouncer.stable(), SignalMask::bit(2));
    }
}
