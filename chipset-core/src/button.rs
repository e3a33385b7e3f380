//! Power-button escalation state machine.
//!
//! The button is debounced upstream; this module owns timing only. It never
//! touches the engine directly: every entry point returns the actions the
//! caller must apply, which keeps the escalation cascade testable in
//! isolation.

use core::fmt;
use core::time::Duration;

use heapless::Vec;

use crate::power::{PowerState, StateMask};
use crate::timer::{DeferredSlot, EngineInstant, earliest};

/// Most actions a single button event can produce.
pub const MAX_BUTTON_ACTIONS: usize = 4;

/// Actions produced by the button state machine.
pub type ButtonActions = Vec<ButtonAction, MAX_BUTTON_ACTIONS>;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ButtonAction {
    /// Press the AP's power key.
    AssertPowerKey,
    /// Release the AP's power key.
    ReleasePowerKey,
    /// Request a boot from an off state.
    ExitHardOff,
    ForceShutdown,
    RequestReset,
    CutOffBattery,
}

impl fmt::Display for ButtonAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ButtonAction::AssertPowerKey => "power-key down",
            ButtonAction::ReleasePowerKey => "power-key up",
            ButtonAction::ExitHardOff => "exit hard off",
            ButtonAction::ForceShutdown => "force shutdown",
            ButtonAction::RequestReset => "cold reset",
            ButtonAction::CutOffBattery => "battery cutoff",
        };
        f.write_str(label)
    }
}

/// Debounced button transition delivered to the engine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ButtonEdge {
    Pressed,
    Released,
}

/// Hold thresholds, all measured from the press instant.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ButtonThresholds {
    /// Key pulse sent to a running AP when pulse mode is enabled.
    pub pulse: Duration,
    /// Minimum key press seen by the AP when the press woke it from off.
    pub was_off_stretch: Duration,
    pub force_off: Duration,
    pub reset: Duration,
    /// `None` on boards without a battery disconnect.
    pub cutoff: Option<Duration>,
}

impl ButtonThresholds {
    pub const DEFAULT: Self = Self {
        pulse: Duration::from_millis(32),
        was_off_stretch: Duration::from_millis(500),
        force_off: Duration::from_secs(4),
        reset: Duration::from_secs(10),
        cutoff: Some(Duration::from_secs(20)),
    };
}

impl Default for ButtonThresholds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Next escalation stage waiting on its threshold.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Stage {
    ForceOff,
    Reset,
    Cutoff,
}

pub struct PowerButton<I> {
    thresholds: ButtonThresholds,
    pulse_enabled: bool,
    pressed_at: Option<I>,
    next_stage: Option<Stage>,
    escalation: DeferredSlot<I>,
    key_release: DeferredSlot<I>,
    key_asserted: bool,
    /// Once `key_release` fires, keep the key down until the button is released.
    key_follows_button: bool,
}

impl<I> PowerButton<I>
where
    I: EngineInstant,
{
    #[must_use]
    pub const fn new(thresholds: ButtonThresholds) -> Self {
        Self {
            thresholds,
            pulse_enabled: true,
            pressed_at: None,
            next_stage: None,
            escalation: DeferredSlot::new(),
            key_release: DeferredSlot::new(),
            key_asserted: false,
            key_follows_button: false,
        }
    }

    /// Handles a debounced press while the chipset is in `state`.
    ///
    /// Presses during a transitional state are ignored and produce nothing.
    pub fn on_press(&mut self, now: I, state: PowerState) -> ButtonActions {
        let mut actions = ButtonActions::new();
        if self.pressed_at.is_some() || state.is_transitional() {
            return actions;
        }

        self.pressed_at = Some(now);
        self.next_stage = Some(Stage::ForceOff);
        self.escalation.arm(now, self.thresholds.force_off);

        if state.in_state(StateMask::ANY_OFF) {
            push(&mut actions, ButtonAction::ExitHardOff);
            self.key_release.arm(now, self.thresholds.was_off_stretch);
            self.key_follows_button = true;
        } else if self.pulse_enabled {
            self.key_release.arm(now, self.thresholds.pulse);
            self.key_follows_button = false;
        } else {
            self.key_release.cancel();
            self.key_follows_button = true;
        }

        if !self.key_asserted {
            self.key_asserted = true;
            push(&mut actions, ButtonAction::AssertPowerKey);
        }
        actions
    }

    /// Handles a debounced release. Cancels every pending escalation stage.
    pub fn on_release(&mut self, _now: I) -> ButtonActions {
        let mut actions = ButtonActions::new();
        if self.pressed_at.take().is_none() {
            return actions;
        }

        self.escalation.cancel();
        self.next_stage = None;

        if self.key_asserted && !self.key_release.is_armed() {
            self.key_asserted = false;
            push(&mut actions, ButtonAction::ReleasePowerKey);
        }
        actions
    }

    /// Fires whatever deadlines passed by `now`.
    pub fn on_deadline(&mut self, now: I) -> ButtonActions {
        let mut actions = ButtonActions::new();

        if self.key_release.take_expired(now)
            && self.key_asserted
            && !(self.key_follows_button && self.pressed_at.is_some())
        {
            self.key_asserted = false;
            push(&mut actions, ButtonAction::ReleasePowerKey);
        }

        while self.escalation.take_expired(now) {
            let (Some(stage), Some(pressed_at)) = (self.next_stage, self.pressed_at) else {
                break;
            };
            let (action, next) = match stage {
                Stage::ForceOff => (
                    ButtonAction::ForceShutdown,
                    Some((Stage::Reset, self.thresholds.reset)),
                ),
                Stage::Reset => (
                    ButtonAction::RequestReset,
                    self.thresholds.cutoff.map(|after| (Stage::Cutoff, after)),
                ),
                Stage::Cutoff => (ButtonAction::CutOffBattery, None),
            };
            push(&mut actions, action);

            self.next_stage = next.map(|(stage, _)| stage);
            if let Some((_, after)) = next {
                self.escalation.arm_at(pressed_at + after);
            }
        }
        actions
    }

    /// Drops a force-off stage that has not fired yet, moving the held
    /// press on to the reset stage. Returns whether one was pending.
    pub fn skip_force_off(&mut self) -> bool {
        let (Some(Stage::ForceOff), Some(pressed_at)) = (self.next_stage, self.pressed_at) else {
            return false;
        };
        self.next_stage = Some(Stage::Reset);
        self.escalation.arm_at(pressed_at + self.thresholds.reset);
        true
    }

    /// Earliest pending deadline.
    #[must_use]
    pub fn deadline(&self) -> Option<I> {
        earliest(self.key_release.deadline(), self.escalation.deadline())
    }

    #[must_use]
    pub const fn is_pressed(&self) -> bool {
        self.pressed_at.is_some()
    }

    #[must_use]
    pub const fn next_stage(&self) -> Option<Stage> {
        self.next_stage
    }

    #[must_use]
    pub const fn pulse_enabled(&self) -> bool {
        self.pulse_enabled
    }

    pub fn set_pulse_enabled(&mut self, enabled: bool) {
        self.pulse_enabled = enabled;
    }

    /// Reverts pulse mode to its default.
    pub fn reset_pulse(&mut self) {
        self.pulse_enabled = true;
    }
}

fn push(actions: &mut ButtonActions, action: ButtonAction) {
    // Capacity covers the longest cascade a single call can emit.
    let _ = actions.push(action);
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

    fn button() -> PowerButton<MockInstant> {
        PowerButton::new(ButtonThresholds::DEFAULT)
    }

    #[test]
    fn press_while_off_wakes_and_stretches_key() {
        let mut button = button();
        let actions = button.on_press(MockInstant::millis(0), PowerState::G3);
        assert_eq!(
            actions.as_slice(),
            &[ButtonAction::ExitHardOff, ButtonAction::AssertPowerKey]
        );

        // Quick tap: the key stays down until the stretch ends.
        assert!(button.on_release(MockInstant::millis(40)).is_empty());
        assert!(button.on_deadline(MockInstant::millis(499)).is_empty());
        assert_eq!(
            button.on_deadline(MockInstant::millis(500)).as_slice(),
            &[ButtonAction::ReleasePowerKey]
        );
    }

    #[test]
    fn pulse_mode_sends_short_key_press() {
        let mut button = button();
        assert_eq!(
            button.on_press(MockInstant::millis(0), PowerState::S0).as_slice(),
            &[ButtonAction::AssertPowerKey]
        );
        assert_eq!(button.deadline(), Some(MockInstant::millis(32)));
        assert_eq!(
            button.on_deadline(MockInstant::millis(32)).as_slice(),
            &[ButtonAction::ReleasePowerKey]
        );
        assert!(button.on_release(MockInstant::millis(100)).is_empty());
    }

    #[test]
    fn key_follows_button_with_pulse_disabled() {
        let mut button = button();
        button.set_pulse_enabled(false);
        button.on_press(MockInstant::millis(0), PowerState::S0);
        assert!(button.on_deadline(MockInstant::millis(1_000)).is_empty());
        assert_eq!(
            button.on_release(MockInstant::millis(1_200)).as_slice(),
            &[ButtonAction::ReleasePowerKey]
        );

        button.reset_pulse();
        assert!(button.pulse_enabled());
    }

    #[test]
    fn presses_during_transitions_are_ignored() {
        let mut button = button();
        assert!(button.on_press(MockInstant::millis(0), PowerState::S5S3).is_empty());
        assert!(!button.is_pressed());
        assert!(button.on_release(MockInstant::millis(10)).is_empty());
    }

    #[test]
    fn escalation_fires_each_stage_at_its_threshold() {
        let mut button = button();
        button.on_press(MockInstant::millis(0), PowerState::S0);
        button.on_deadline(MockInstant::millis(32));

        assert!(button.on_deadline(MockInstant::millis(3_999)).is_empty());
        assert_eq!(
            button.on_deadline(MockInstant::millis(4_000)).as_slice(),
            &[ButtonAction::ForceShutdown]
        );
        assert!(button.on_deadline(MockInstant::millis(9_999)).is_empty());
        assert_eq!(
            button.on_deadline(MockInstant::millis(10_000)).as_slice(),
            &[ButtonAction::RequestReset]
        );
        assert_eq!(button.next_stage(), Some(Stage::Cutoff));
        assert_eq!(
            button.on_deadline(MockInstant::millis(20_000)).as_slice(),
            &[ButtonAction::CutOffBattery]
        );
        assert_eq!(button.next_stage(), None);
        assert_eq!(button.deadline(), None);
    }

    #[test]
    fn release_cancels_remaining_stages() {
        let mut button = button();
        button.on_press(MockInstant::millis(0), PowerState::S0);
        button.on_deadline(MockInstant::millis(4_000));
        button.on_release(MockInstant::millis(5_000));

        assert!(button.on_deadline(MockInstant::millis(10_000)).is_empty());
        assert_eq!(button.deadline(), None);

        // A new press starts the cascade from scratch.
        button.on_press(MockInstant::millis(20_000), PowerState::S0);
        button.on_deadline(MockInstant::millis(20_032));
        assert!(button.on_deadline(MockInstant::millis(23_999)).is_empty());
        assert_eq!(
            button.on_deadline(MockInstant::millis(24_000)).as_slice(),
            &[ButtonAction::ForceShutdown]
        );
    }

    #[test]
    fn skipping_force_off_keeps_the_reset_stage() {
        let mut button = button();
        button.on_press(MockInstant::millis(0), PowerState::S0);
        button.on_deadline(MockInstant::millis(32));

        assert!(button.skip_force_off());
        assert!(!button.skip_force_off());
        assert_eq!(button.next_stage(), Some(Stage::Reset));
        assert!(button.on_deadline(MockInstant::millis(4_000)).is_empty());
        assert_eq!(
            button.on_deadline(MockInstant::millis(10_000)).as_slice(),
            &[ButtonAction::RequestReset]
        );
    }

    #[test]
    fn late_deadline_catches_up_in_order() {
        let mut button = button();
        button.on_press(MockInstant::millis(0), PowerState::S3);
        let actions = button.on_deadline(MockInstant::millis(10_500));
        assert_eq!(
            actions.as_slice(),
            &[
                ButtonAction::ReleasePowerKey,
                ButtonAction::ForceShutdown,
                ButtonAction::RequestReset
            ]
        );
    }
}
