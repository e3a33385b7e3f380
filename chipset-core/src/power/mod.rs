//! Power states, engine flags and the pure transition function.
//!
//! [`next_state`] decides where a steady state goes given a signal snapshot
//! and the engine flags; it has no side effects so it can be exercised
//! exhaustively. The side-effecting edges live in [`engine`].

use core::fmt;

use crate::board::{InterruptSet, PowerMasks};
use crate::signals::SignalMask;

pub mod control;
pub mod engine;

pub use control::{ChipsetControl, ChipsetRequest};
pub use engine::{ChipsetEngine, PowerInfo, StepOutcome};

/// Consecutive re-attempts of one edge before falling back toward G3.
pub const RETRY_LIMIT: u8 = 1;

/// Chipset power state. Transitional states are named after their edge.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PowerState {
    G3,
    S5,
    S3,
    S0,
    G3S5,
    S5S3,
    S3S0,
    S0S3,
    S3S5,
    S5G3,
}

impl PowerState {
    pub const ALL: [PowerState; 10] = [
        PowerState::G3,
        PowerState::S5,
        PowerState::S3,
        PowerState::S0,
        PowerState::G3S5,
        PowerState::S5S3,
        PowerState::S3S0,
        PowerState::S0S3,
        PowerState::S3S5,
        PowerState::S5G3,
    ];

    /// Numeric code reported by `powerinfo`. Code 2 is reserved for S4.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            PowerState::G3 => 0,
            PowerState::S5 => 1,
            PowerState::S3 => 3,
            PowerState::S0 => 4,
            PowerState::G3S5 => 5,
            PowerState::S5S3 => 6,
            PowerState::S3S0 => 7,
            PowerState::S0S3 => 8,
            PowerState::S3S5 => 9,
            PowerState::S5G3 => 10,
        }
    }

    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PowerState::G3),
            1 => Some(PowerState::S5),
            3 => Some(PowerState::S3),
            4 => Some(PowerState::S0),
            5 => Some(PowerState::G3S5),
            6 => Some(PowerState::S5S3),
            7 => Some(PowerState::S3S0),
            8 => Some(PowerState::S0S3),
            9 => Some(PowerState::S3S5),
            10 => Some(PowerState::S5G3),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            PowerState::G3 => "G3",
            PowerState::S5 => "S5",
            PowerState::S3 => "S3",
            PowerState::S0 => "S0",
            PowerState::G3S5 => "G3->S5",
            PowerState::S5S3 => "S5->S3",
            PowerState::S3S0 => "S3->S0",
            PowerState::S0S3 => "S0->S3",
            PowerState::S3S5 => "S3->S5",
            PowerState::S5G3 => "S5->G3",
        }
    }

    #[must_use]
    pub const fn is_transitional(self) -> bool {
        !matches!(
            self,
            PowerState::G3 | PowerState::S5 | PowerState::S3 | PowerState::S0
        )
    }

    /// Steady state an edge starts from; steady states map to themselves.
    #[must_use]
    pub const fn origin(self) -> Self {
        match self {
            PowerState::G3 | PowerState::G3S5 => PowerState::G3,
            PowerState::S5 | PowerState::S5S3 | PowerState::S5G3 => PowerState::S5,
            PowerState::S3 | PowerState::S3S0 | PowerState::S3S5 => PowerState::S3,
            PowerState::S0 | PowerState::S0S3 => PowerState::S0,
        }
    }

    /// Every state bit a caller must accept for this state to match.
    const fn required(self) -> StateMask {
        match self {
            PowerState::G3 => StateMask::HARD_OFF,
            PowerState::G3S5 | PowerState::S5G3 => StateMask::ANY_OFF,
            PowerState::S5 => StateMask::SOFT_OFF,
            PowerState::S5S3 | PowerState::S3S5 => {
                StateMask::SOFT_OFF.union(StateMask::SUSPEND)
            }
            PowerState::S3 => StateMask::SUSPEND,
            PowerState::S3S0 | PowerState::S0S3 => StateMask::SUSPEND.union(StateMask::ON),
            PowerState::S0 => StateMask::ON,
        }
    }

    /// Bit for the steady state this state is in or heading toward.
    const fn heading(self) -> StateMask {
        match self {
            PowerState::G3 | PowerState::S5G3 => StateMask::HARD_OFF,
            PowerState::S5 | PowerState::G3S5 | PowerState::S3S5 => StateMask::SOFT_OFF,
            PowerState::S3 | PowerState::S5S3 | PowerState::S0S3 => StateMask::SUSPEND,
            PowerState::S0 | PowerState::S3S0 => StateMask::ON,
        }
    }

    /// Returns `true` when every bit this state needs is in `mask`.
    ///
    /// Transitional states only match callers that accept both ends.
    #[must_use]
    pub const fn in_state(self, mask: StateMask) -> bool {
        mask.contains(self.required())
    }

    /// Returns `true` when the state is in, or heading toward, a state in `mask`.
    #[must_use]
    pub const fn in_or_transitioning_to(self, mask: StateMask) -> bool {
        mask.intersects(self.heading())
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Coarse chipset state classes used by collaborators.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct StateMask(u8);

impl StateMask {
    pub const HARD_OFF: Self = Self(1 << 0);
    pub const SOFT_OFF: Self = Self(1 << 1);
    pub const SUSPEND: Self = Self(1 << 2);
    pub const ON: Self = Self(1 << 3);
    pub const ANY_OFF: Self = Self(Self::HARD_OFF.0 | Self::SOFT_OFF.0);

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// Why the chipset was forced down or reset.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ShutdownReason {
    /// Power button held past the force-off threshold.
    Button,
    /// Charge gate refused power-on.
    BatteryInhibit,
    /// Rails failed to come up while resuming.
    Wait,
    /// Operator console.
    Console,
    /// Host command.
    HostCommand,
    /// AP asked through its request lines.
    ApRequest,
    /// AP watchdog fired.
    ApWatchdog,
    /// Rail-good dropped while the chipset was on.
    RailLost,
}

impl ShutdownReason {
    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            ShutdownReason::Button => 0x01,
            ShutdownReason::BatteryInhibit => 0x02,
            ShutdownReason::Wait => 0x03,
            ShutdownReason::Console => 0x04,
            ShutdownReason::HostCommand => 0x05,
            ShutdownReason::ApRequest => 0x06,
            ShutdownReason::ApWatchdog => 0x07,
            ShutdownReason::RailLost => 0x08,
        }
    }

    #[must_use]
    pub const fn from_raw(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(ShutdownReason::Button),
            0x02 => Some(ShutdownReason::BatteryInhibit),
            0x03 => Some(ShutdownReason::Wait),
            0x04 => Some(ShutdownReason::Console),
            0x05 => Some(ShutdownReason::HostCommand),
            0x06 => Some(ShutdownReason::ApRequest),
            0x07 => Some(ShutdownReason::ApWatchdog),
            0x08 => Some(ShutdownReason::RailLost),
            _ => None,
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ShutdownReason::Button => "button",
            ShutdownReason::BatteryInhibit => "battery-inhibit",
            ShutdownReason::Wait => "wait",
            ShutdownReason::Console => "console",
            ShutdownReason::HostCommand => "host-command",
            ShutdownReason::ApRequest => "ap-request",
            ShutdownReason::ApWatchdog => "ap-watchdog",
            ShutdownReason::RailLost => "rail-lost",
        };
        f.write_str(label)
    }
}

/// Why the controller itself (re)started, as reported by the platform.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ResetCause {
    /// Cold power-on; the AP is booted automatically.
    PowerOn,
    /// External reset pin, typically after a battery cutoff; also boots.
    ResetPin,
    /// Reset with the AP-off flag; the chipset stays down.
    ApOff,
    /// Same-image warm restart; state is re-derived from live signals.
    Sysjump,
}

impl ResetCause {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ResetCause::PowerOn => "power-on",
            ResetCause::ResetPin => "reset-pin",
            ResetCause::ApOff => "ap-off",
            ResetCause::Sysjump => "sysjump",
        }
    }
}

/// Sticky engine flags. Mutated only by the engine.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct EngineFlags {
    /// Something wants G3 regardless of the AP.
    pub forcing_shutdown: bool,
    /// An automatic power-on is owed.
    pub boot_pending: bool,
    /// The charge gate refused the last attempt; wait for a fresh trigger.
    pub boot_inhibited: bool,
    /// Boot again once G3 is reached.
    pub reboot_at_g3: bool,
    /// PMIC was already down on entering S3->S5.
    pub ap_shutdown: bool,
    /// Re-attempts of the current edge.
    pub retry_count: u8,
    /// AP interrupts currently enabled.
    pub armed: InterruptSet,
    pub last_reason: Option<ShutdownReason>,
}

/// Inputs to [`next_state`].
#[derive(Copy, Clone, Debug)]
pub struct TransitionInputs {
    pub signals: SignalMask,
    pub masks: PowerMasks,
    pub flags: EngineFlags,
    /// The S5 inactivity deadline passed.
    pub inactivity_expired: bool,
}

impl TransitionInputs {
    const fn pmic_up(&self) -> bool {
        self.signals.intersects(self.masks.pmic)
    }
}

/// Next state for a steady state. Transitional states map to themselves;
/// their outcome depends on the edge they run.
#[must_use]
pub fn next_state(state: PowerState, inputs: &TransitionInputs) -> PowerState {
    let flags = &inputs.flags;
    let signals = inputs.signals;
    let masks = &inputs.masks;

    match state {
        PowerState::G3 => {
            if inputs.pmic_up() {
                PowerState::S5G3
            } else if flags.boot_pending && !flags.boot_inhibited && !flags.forcing_shutdown {
                PowerState::G3S5
            } else {
                PowerState::G3
            }
        }
        PowerState::S5 => {
            if flags.ap_shutdown && !inputs.pmic_up() {
                PowerState::S5G3
            } else if flags.forcing_shutdown || flags.reboot_at_g3 {
                if !inputs.pmic_up() || inputs.inactivity_expired {
                    PowerState::S5G3
                } else {
                    PowerState::S5
                }
            } else if flags.boot_pending {
                PowerState::S5S3
            } else if inputs.inactivity_expired {
                PowerState::S5G3
            } else {
                PowerState::S5
            }
        }
        PowerState::S3 => {
            if !signals.contains(masks.pgood_s3) || flags.forcing_shutdown {
                PowerState::S3S5
            } else if !signals.intersects(masks.suspend) {
                PowerState::S3S0
            } else {
                PowerState::S3
            }
        }
        PowerState::S0 => {
            if !signals.contains(masks.pgood_s0)
                || flags.forcing_shutdown
                || signals.intersects(masks.suspend)
            {
                PowerState::S0S3
            } else {
                PowerState::S0
            }
        }
        transitional => transitional,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PMIC: SignalMask = SignalMask::bit(0);
    const SUSPEND: SignalMask = SignalMask::bit(2);

    const MASKS: PowerMasks = PowerMasks {
        pmic: PMIC,
        standby: SignalMask::bit(1),
        pgood_s3: PMIC,
        pgood_s0: PMIC,
        suspend: SUSPEND,
    };

    fn inputs(signals: SignalMask, flags: EngineFlags) -> TransitionInputs {
        TransitionInputs {
            signals,
            masks: MASKS,
            flags,
            inactivity_expired: false,
        }
    }

    #[test]
    fn codes_round_trip_and_skip_s4() {
        for state in PowerState::ALL {
            assert_eq!(PowerState::from_code(state.code()), Some(state));
        }
        assert_eq!(PowerState::from_code(2), None);
    }

    #[test]
    fn state_masks_follow_transition_rules() {
        assert!(PowerState::G3.in_state(StateMask::HARD_OFF));
        assert!(!PowerState::G3S5.in_state(StateMask::HARD_OFF));
        assert!(PowerState::G3S5.in_state(StateMask::ANY_OFF));
        assert!(PowerState::S3S0.in_state(StateMask::SUSPEND.union(StateMask::ON)));
        assert!(PowerState::S3S0.in_or_transitioning_to(StateMask::ON));
        assert!(PowerState::S3S5.in_or_transitioning_to(StateMask::ANY_OFF));
        assert!(!PowerState::S5S3.in_or_transitioning_to(StateMask::ANY_OFF));
    }

    #[test]
    fn g3_boots_only_when_pending_and_not_inhibited() {
        let mut flags = EngineFlags {
            boot_pending: true,
            ..EngineFlags::default()
        };
        assert_eq!(
            next_state(PowerState::G3, &inputs(SignalMask::EMPTY, flags)),
            PowerState::G3S5
        );

        flags.boot_inhibited = true;
        assert_eq!(
            next_state(PowerState::G3, &inputs(SignalMask::EMPTY, flags)),
            PowerState::G3
        );
    }

    #[test]
    fn g3_with_live_pmic_heads_back_down() {
        assert_eq!(
            next_state(PowerState::G3, &inputs(PMIC, EngineFlags::default())),
            PowerState::S5G3
        );
    }

    #[test]
    fn forcing_wins_over_boot_request_in_s5() {
        let flags = EngineFlags {
            boot_pending: true,
            forcing_shutdown: true,
            ..EngineFlags::default()
        };
        assert_eq!(
            next_state(PowerState::S5, &inputs(SignalMask::EMPTY, flags)),
            PowerState::S5G3
        );
        assert_eq!(next_state(PowerState::S5, &inputs(PMIC, flags)), PowerState::S5);
    }

    #[test]
    fn s5_waits_for_inactivity() {
        let mut state_inputs = inputs(SignalMask::EMPTY, EngineFlags::default());
        assert_eq!(next_state(PowerState::S5, &state_inputs), PowerState::S5);
        state_inputs.inactivity_expired = true;
        assert_eq!(next_state(PowerState::S5, &state_inputs), PowerState::S5G3);
    }

    #[test]
    fn s3_and_s0_follow_rails_and_suspend() {
        let flags = EngineFlags::default();
        assert_eq!(
            next_state(PowerState::S3, &inputs(PMIC, flags)),
            PowerState::S3S0
        );
        assert_eq!(
            next_state(PowerState::S3, &inputs(PMIC.union(SUSPEND), flags)),
            PowerState::S3
        );
        assert_eq!(
            next_state(PowerState::S3, &inputs(SUSPEND, flags)),
            PowerState::S3S5
        );
        assert_eq!(next_state(PowerState::S0, &inputs(PMIC, flags)), PowerState::S0);
        assert_eq!(
            next_state(PowerState::S0, &inputs(SignalMask::EMPTY, flags)),
            PowerState::S0S3
        );
    }

    #[test]
    fn transitional_states_are_left_to_the_engine() {
        for state in PowerState::ALL.into_iter().filter(|s| s.is_transitional()) {
            assert_eq!(
                next_state(state, &inputs(SignalMask::EMPTY, EngineFlags::default())),
                state
            );
        }
    }
}
