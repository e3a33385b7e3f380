//! Power event catalog and the bounded event log shared by firmware and host
//! targets.
//!
//! Every state change, timeout and ignored request the engine observes is
//! captured as a [`PowerEvent`]. Events encode to compact numeric codes for
//! transport over diagnostics channels and render as short human-readable
//! lines for the console `siglog` command.

use core::{fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::charge::ChargeVerdict;
use crate::events::ApLine;
use crate::hooks::ChipsetHook;
use crate::power::{PowerState, ShutdownReason};
use crate::signals::SignalMask;

/// Identifier used when tracking emitted events.
pub type EventId = u32;

/// Number of entries the signal log retains.
pub const SIGNAL_LOG_CAPACITY: usize = 24;

/// Trait implemented by monotonic instant wrappers used for telemetry tracking.
pub trait TelemetryInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Discriminated power events shared across all targets.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerEvent {
    StateChanged {
        from: PowerState,
        to: PowerState,
    },
    SignalsChanged {
        mask: SignalMask,
    },
    SignalTimeout {
        state: PowerState,
        want: SignalMask,
        got: SignalMask,
    },
    EdgeRetry {
        state: PowerState,
        attempt: u8,
    },
    PowerOnInhibited(ChargeVerdict),
    ShutdownForced(ShutdownReason),
    ResetRequested(ShutdownReason),
    RailsLost(PowerState),
    HookFired(ChipsetHook),
    ApEdgeIgnored(ApLine),
    ForcingPmicOff,
    ForceResetReleased,
    SysjumpResume(PowerState),
    /// A held button asked for a battery cutoff the board cannot do.
    CutoffUnavailable,
}

impl PowerEvent {
    const STATE_CHANGED_CODE: u16 = 0x0001;
    const SIGNALS_CHANGED_CODE: u16 = 0x0002;
    const SIGNAL_TIMEOUT_CODE: u16 = 0x0003;
    const EDGE_RETRY_CODE: u16 = 0x0004;
    const POWER_ON_INHIBITED_CODE: u16 = 0x0005;
    const SHUTDOWN_FORCED_CODE: u16 = 0x0006;
    const RESET_REQUESTED_CODE: u16 = 0x0007;
    const RAILS_LOST_CODE: u16 = 0x0008;
    const FORCING_PMIC_OFF_CODE: u16 = 0x0009;
    const FORCE_RESET_RELEASED_CODE: u16 = 0x000A;
    const SYSJUMP_RESUME_CODE: u16 = 0x000B;
    const CUTOFF_UNAVAILABLE_CODE: u16 = 0x000C;
    const HOOK_FIRED_BASE: u16 = 0x0010;
    const AP_EDGE_IGNORED_BASE: u16 = 0x0020;

    /// Encodes the event kind into a compact transport-friendly discriminant.
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        match self {
            PowerEvent::StateChanged { .. } => Self::STATE_CHANGED_CODE,
            PowerEvent::SignalsChanged { .. } => Self::SIGNALS_CHANGED_CODE,
            PowerEvent::SignalTimeout { .. } => Self::SIGNAL_TIMEOUT_CODE,
            PowerEvent::EdgeRetry { .. } => Self::EDGE_RETRY_CODE,
            PowerEvent::PowerOnInhibited(_) => Self::POWER_ON_INHIBITED_CODE,
            PowerEvent::ShutdownForced(_) => Self::SHUTDOWN_FORCED_CODE,
            PowerEvent::ResetRequested(_) => Self::RESET_REQUESTED_CODE,
            PowerEvent::RailsLost(_) => Self::RAILS_LOST_CODE,
            PowerEvent::ForcingPmicOff => Self::FORCING_PMIC_OFF_CODE,
            PowerEvent::ForceResetReleased => Self::FORCE_RESET_RELEASED_CODE,
            PowerEvent::SysjumpResume(_) => Self::SYSJUMP_RESUME_CODE,
            PowerEvent::CutoffUnavailable => Self::CUTOFF_UNAVAILABLE_CODE,
            PowerEvent::HookFired(hook) => Self::HOOK_FIRED_BASE + hook.as_index() as u16,
            PowerEvent::ApEdgeIgnored(line) => Self::AP_EDGE_IGNORED_BASE + line.as_index() as u16,
        }
    }

    /// Returns `true` for events worth surfacing at warning level.
    #[must_use]
    pub const fn is_fault(self) -> bool {
        matches!(
            self,
            PowerEvent::SignalTimeout { .. }
                | PowerEvent::PowerOnInhibited(_)
                | PowerEvent::RailsLost(_)
                | PowerEvent::ForcingPmicOff
                | PowerEvent::CutoffUnavailable
        )
    }
}

impl fmt::Display for PowerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerEvent::StateChanged { from, to } => write!(f, "state {from} -> {to}"),
            PowerEvent::SignalsChanged { mask } => write!(f, "signals {mask}"),
            PowerEvent::SignalTimeout { state, want, got } => {
                write!(f, "timeout in {state}: want {want} got {got}")
            }
            PowerEvent::EdgeRetry { state, attempt } => write!(f, "retry {state} #{attempt}"),
            PowerEvent::PowerOnInhibited(verdict) => write!(f, "power-up inhibited ({verdict})"),
            PowerEvent::ShutdownForced(reason) => write!(f, "force shutdown ({reason})"),
            PowerEvent::ResetRequested(reason) => write!(f, "reset request ({reason})"),
            PowerEvent::RailsLost(state) => write!(f, "rails lost in {state}"),
            PowerEvent::HookFired(hook) => write!(f, "hook {hook}"),
            PowerEvent::ApEdgeIgnored(line) => write!(f, "ignored {line} edge"),
            PowerEvent::ForcingPmicOff => f.write_str("forcing PMIC off"),
            PowerEvent::ForceResetReleased => f.write_str("PMIC force reset released"),
            PowerEvent::SysjumpResume(state) => write!(f, "sysjump resume in {state}"),
            PowerEvent::CutoffUnavailable => f.write_str("battery cutoff unavailable"),
        }
    }
}

/// Event record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EventRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: PowerEvent,
}

/// Records power events into a fixed-size ring buffer.
pub struct EventLog<TInstant, const CAPACITY: usize = SIGNAL_LOG_CAPACITY>
where
    TInstant: Copy,
{
    ring: HistoryBuf<EventRecord<TInstant>, CAPACITY>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> EventLog<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    /// Creates an empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Records an event and returns its identifier.
    pub fn record(&mut self, event: PowerEvent, timestamp: TInstant) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(EventRecord {
            id,
            timestamp,
            event,
        });

        id
    }

    /// Returns an iterator over the recorded events in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, EventRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent record, if available.
    pub fn latest(&self) -> Option<&EventRecord<TInstant>> {
        self.ring.recent()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Total number of events ever recorded, including evicted ones.
    #[must_use]
    pub const fn total(&self) -> EventId {
        self.next_event_id
    }

    /// Drops all retained records. Identifiers keep counting.
    pub fn clear(&mut self) {
        self.ring.clear();
    }
}

impl<TInstant, const CAPACITY: usize> Default for EventLog<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
    struct MicrosInstant(u64);

    impl TelemetryInstant for MicrosInstant {
        fn saturating_duration_since(&self, earlier: Self) -> Duration {
            Duration::from_micros(self.0.saturating_sub(earlier.0))
        }
    }

    #[test]
    fn log_keeps_most_recent_entries() {
        let mut log = EventLog::<MicrosInstant, 4>::new();
        for step in 0..6_u64 {
            log.record(
                PowerEvent::SignalsChanged {
                    mask: SignalMask::from_bits(step as u32),
                },
                MicrosInstant(step),
            );
        }

        assert_eq!(log.len(), 4);
        assert_eq!(log.total(), 6);
        let first = log.oldest_first().next().expect("oldest record");
        assert_eq!(first.id, 2);
        assert_eq!(log.latest().expect("latest record").timestamp, MicrosInstant(5));
    }

    #[test]
    fn event_codes_are_distinct_per_payload_kind() {
        let hooks = [
            PowerEvent::HookFired(ChipsetHook::PreInit),
            PowerEvent::HookFired(ChipsetHook::HardOff),
        ];
        assert_ne!(hooks[0].to_raw(), hooks[1].to_raw());
        assert_eq!(
            PowerEvent::StateChanged {
                from: PowerState::G3,
                to: PowerState::G3S5
            }
            .to_raw(),
            0x0001
        );
        assert_eq!(
            PowerEvent::ApEdgeIgnored(ApLine::Watchdog).to_raw(),
            0x0020
        );
    }

    #[test]
    fn renders_state_change() {
        let mut buffer = heapless::String::<48>::new();
        let event = PowerEvent::StateChanged {
            from: PowerState::S5,
            to: PowerState::S5S3,
        };
        core::fmt::write(&mut buffer, format_args!("{event}")).expect("fits");
        assert_eq!(buffer.as_str(), "state S5 -> S5->S3");
        assert!(!event.is_fault());
        assert!(PowerEvent::RailsLost(PowerState::S0).is_fault());
    }
}
