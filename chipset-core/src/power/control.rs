//! Control surface other modules use to drive the chipset.

use core::time::Duration;

use super::{PowerState, ShutdownReason, StateMask};
use crate::button::ButtonEdge;
use crate::events::{HostCommand, LidEvent};
use crate::signals::SignalMask;

/// Control API consumed by collaborators.
pub trait ChipsetControl {
    /// Forces the chipset to G3 regardless of what the AP wants.
    fn force_shutdown(&mut self, reason: ShutdownReason);

    /// Cold-resets the AP, booting it if it is off.
    fn request_reset(&mut self, reason: ShutdownReason);

    /// Requests a boot from an off state.
    fn exit_hard_off(&mut self);

    fn current_state(&self) -> PowerState;

    /// Returns `true` when the chipset is in one of the states in `mask`.
    fn is_state(&self, mask: StateMask) -> bool {
        self.current_state().in_state(mask)
    }

    /// Returns `true` when the chipset is in, or heading to, a state in `mask`.
    fn is_or_transitioning_to(&self, mask: StateMask) -> bool {
        self.current_state().in_or_transitioning_to(mask)
    }
}

/// Messages other tasks post to the chipset task.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChipsetRequest {
    ForceShutdown(ShutdownReason),
    RequestReset(ShutdownReason),
    ExitHardOff,
    Lid(LidEvent),
    Button(ButtonEdge),
    /// Simulated press held for the given time.
    PressButton(Duration),
    /// The charge subsystem changed; a blocked boot may be retried.
    ChargeStateChanged,
    /// S5 inactivity before dropping to G3; `None` stays in S5.
    SetS5Timeout(Option<Duration>),
    /// Input changes that get logged.
    SetDebugMask(SignalMask),
    Host(HostCommand),
}
