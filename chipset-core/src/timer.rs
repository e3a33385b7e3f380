//! Monotonic time abstractions and deferred timer slots.
//!
//! The engine never reads a platform clock directly. Firmware wraps the
//! Embassy instant, the simulator uses a virtual microsecond counter, and unit
//! tests use a bare `u64` newtype.

use core::ops::Add;
use core::time::Duration;

use crate::telemetry::TelemetryInstant;

/// Instant bound shared by every time-aware component.
pub trait EngineInstant:
    TelemetryInstant + Ord + Add<Duration, Output = Self> + core::fmt::Debug
{
}

impl<T> EngineInstant for T where
    T: TelemetryInstant + Ord + Add<Duration, Output = T> + core::fmt::Debug
{
}

/// Source of time plus the ability to suspend the calling task.
#[allow(async_fn_in_trait)]
pub trait Clock {
    type Instant: EngineInstant;

    /// Returns the current monotonic instant.
    fn now(&self) -> Self::Instant;

    /// Suspends the caller for exactly `duration`.
    async fn delay(&mut self, duration: Duration);
}

/// Single cancelable deadline.
///
/// Arming an armed slot replaces the previous deadline; a cancelled slot never
/// fires. Expiry is consumed by [`DeferredSlot::take_expired`] so each arming
/// fires at most once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeferredSlot<I> {
    deadline: Option<I>,
}

impl<I> DeferredSlot<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    /// Creates an idle slot.
    #[must_use]
    pub const fn new() -> Self {
        Self { deadline: None }
    }

    /// Arms the slot to fire `after` from `now`.
    pub fn arm(&mut self, now: I, after: Duration) {
        self.deadline = Some(now + after);
    }

    /// Arms the slot at an absolute deadline.
    pub fn arm_at(&mut self, deadline: I) {
        self.deadline = Some(deadline);
    }

    /// Clears the slot. Returns `true` when a deadline was pending.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    /// Returns the pending deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<I> {
        self.deadline
    }

    /// Returns `true` while a deadline is pending.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Returns `true` when the deadline passed, without consuming it.
    #[must_use]
    pub fn is_expired(&self, now: I) -> bool {
        matches!(self.deadline, Some(deadline) if now >= deadline)
    }

    /// Consumes the deadline when it has passed.
    pub fn take_expired(&mut self, now: I) -> bool {
        if self.is_expired(now) {
            self.deadline = None;
            true
        } else {
            false
        }
    }
}

impl<I> Default for DeferredSlot<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the earliest of two optional deadlines.
#[must_use]
pub fn earliest<I: Ord>(lhs: Option<I>, rhs: Option<I>) -> Option<I> {
    match (lhs, rhs) {
        (Some(a), Some(b)) => Some(if a <= b { a } else { b }),
        (Some(a), None) => Some(a),
        (None, other) => other,
    }
}
