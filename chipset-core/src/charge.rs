//! Charge-readiness gate consulted on the G3->S5 edge.

use core::fmt;
use core::time::Duration;

use crate::timer::Clock;

/// Narrow view of the charge subsystem.
pub trait ChargeGate {
    /// `true` while the battery or charger cannot yet sustain power-on.
    fn prevent_power_on(&mut self) -> bool;

    /// `true` when the charge subsystem wants the system to stay down.
    fn want_shutdown(&mut self) -> bool;
}

/// Poll cadence and bound for [`may_power_on`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChargePolicy {
    pub interval: Duration,
    pub tries: u16,
}

impl ChargePolicy {
    /// 100 ms polls, 40 tries: four seconds total.
    pub const DEFAULT: Self = Self::new(Duration::from_millis(100), 40);

    pub const fn new(interval: Duration, tries: u16) -> Self {
        Self { interval, tries }
    }

    /// Longest time [`may_power_on`] can wait.
    #[must_use]
    pub fn bound(&self) -> Duration {
        self.interval * u32::from(self.tries)
    }
}

impl Default for ChargePolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Outcome of a charge-readiness check.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChargeVerdict {
    Ready,
    /// The gate still blocked power-on when the poll bound ran out.
    Inhibited,
    /// The charge subsystem asked to stay down.
    ShutdownRequested,
}

impl ChargeVerdict {
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, ChargeVerdict::Ready)
    }
}

impl fmt::Display for ChargeVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChargeVerdict::Ready => f.write_str("ready"),
            ChargeVerdict::Inhibited => f.write_str("charger not ready"),
            ChargeVerdict::ShutdownRequested => f.write_str("battery too low"),
        }
    }
}

/// Polls `gate` until it allows power-on or the policy bound runs out.
pub async fn may_power_on<C, G>(clock: &mut C, gate: &mut G, policy: ChargePolicy) -> ChargeVerdict
where
    C: Clock,
    G: ChargeGate + ?Sized,
{
    let mut tries = 0;
    let ready = loop {
        if !gate.prevent_power_on() {
            break true;
        }
        if tries >= policy.tries {
            break false;
        }
        clock.delay(policy.interval).await;
        tries += 1;
    };

    if gate.want_shutdown() {
        ChargeVerdict::ShutdownRequested
    } else if ready {
        ChargeVerdict::Ready
    } else {
        ChargeVerdict::Inhibited
    }
}

/// Gate that never blocks; boards without a charger use it.
#[derive(Copy, Clone, Debug, Default)]
pub struct AlwaysReady;

impl ChargeGate for AlwaysReady {
    fn prevent_power_on(&mut self) -> bool {
        false
    }

    fn want_shutdown(&mut self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use core::ops::Add;

    use super::*;
    use crate::telemetry::TelemetryInstant;

    #[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
    struct MockInstant(u64);

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

    struct MockClock(MockInstant);

    impl Clock for MockClock {
        type Instant = MockInstant;

        fn now(&self) -> MockInstant {
            self.0
        }

        async fn delay(&mut self, duration: Duration) {
            self.0 = self.0 + duration;
        }
    }

    struct CountdownGate {
        blocked_polls: Option<u16>,
        low_battery: bool,
        polls: u16,
    }

    impl ChargeGate for CountdownGate {
        fn prevent_power_on(&mut self) -> bool {
            self.polls += 1;
            match self.blocked_polls {
                Some(limit) => self.polls <= limit,
                None => true,
            }
        }

        fn want_shutdown(&mut self) -> bool {
            self.low_battery
        }
    }

    fn check(blocked_polls: Option<u16>, low_battery: bool) -> (ChargeVerdict, MockInstant) {
        let mut clock = MockClock(MockInstant(0));
        let mut gate = CountdownGate {
            blocked_polls,
            low_battery,
            polls: 0,
        };
        let verdict = embassy_futures::block_on(may_power_on(
            &mut clock,
            &mut gate,
            ChargePolicy::DEFAULT,
        ));
        (verdict, clock.0)
    }

    #[test]
    fn ready_gate_returns_immediately() {
        assert_eq!(check(Some(0), false), (ChargeVerdict::Ready, MockInstant(0)));
    }

    #[test]
    fn waits_for_charger_initialisation() {
        assert_eq!(
            check(Some(3), false),
            (ChargeVerdict::Ready, MockInstant(300_000))
        );
    }

    #[test]
    fn gives_up_after_bound() {
        let (verdict, elapsed) = check(None, false);
        assert_eq!(verdict, ChargeVerdict::Inhibited);
        assert_eq!(elapsed, MockInstant(4_000_000));
        assert_eq!(ChargePolicy::DEFAULT.bound(), Duration::from_secs(4));
    }

    #[test]
    fn low_battery_overrides_ready() {
        assert_eq!(check(Some(0), true).0, ChargeVerdict::ShutdownRequested);
    }
}
