//! Virtual-time model of the reference board.
//!
//! The PMIC, standby regulator and AP are reduced to a few timed rules, good
//! enough to exercise every engine edge on the host. Time only moves when the
//! engine delays or a caller calls [`SimBoard::advance`], in 1 ms ticks, and
//! inputs pass through the same debouncer the firmware uses.

use core::fmt;
use core::ops::Add;
use core::time::Duration;

use heapless::HistoryBuf;

use crate::board::reference::{PowerInput, PowerOutput, PROFILE};
use crate::board::{Board, BoardProfile, ChipsetInterrupt, InterruptSet};
use crate::charge::ChargeGate;
use crate::hooks::ChipsetHook;
use crate::sequences::LineDriver;
use crate::signals::debounce::DEFAULT_SETTLE;
use crate::signals::{LineAction, OutputLevels, SignalMask, SignalReader, SignalSource};
use crate::telemetry::{PowerEvent, TelemetryInstant};
use crate::timer::Clock;

const TICK: Duration = Duration::from_millis(1);

/// Shortest power-key press the PMIC accepts.
pub const PMIC_MIN_PRESS: Duration = Duration::from_millis(20);
/// PMIC power-good delay after an accepted press.
pub const PMIC_RAMP: Duration = Duration::from_millis(5);
/// PMIC shutdown delay after a watchdog edge.
pub const PMIC_WATCHDOG_DELAY: Duration = Duration::from_millis(2);
/// Power-key hold after which a running PMIC turns itself off.
pub const PMIC_LONG_PRESS: Duration = Duration::from_secs(8);
/// Time the AP needs out of reset before it reports running.
pub const AP_BOOT_TIME: Duration = Duration::from_millis(10);

/// Microseconds since simulation start.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SimInstant(u64);

impl SimInstant {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis * 1_000)
    }

    #[must_use]
    pub const fn as_micros(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(micros))
    }
}

impl TelemetryInstant for SimInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for SimInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.0 / 1_000_000, (self.0 / 1_000) % 1_000)
    }
}

/// Fault and behavior knobs for the physical model.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SimKnobs {
    /// PMIC ignores power-key presses.
    pub pmic_dead: bool,
    /// PMIC power-good drops while the PMIC is running.
    pub rail_fault: bool,
    /// PMIC power-good stays asserted whatever the PMIC does.
    pub rails_stuck: bool,
    /// Standby regulator never reports good.
    pub standby_dead: bool,
    /// Holding the power key turns a running PMIC off.
    pub long_press_off: bool,
    /// AP stays in its suspend state even when running.
    pub ap_suspended: bool,
    pub ap_watchdog: bool,
    pub warm_reset_request: bool,
    pub shutdown_request: bool,
    /// Board has no battery disconnect.
    pub no_cutoff: bool,
}

impl SimKnobs {
    pub const DEFAULT: Self = Self {
        pmic_dead: false,
        rail_fault: false,
        rails_stuck: false,
        standby_dead: false,
        long_press_off: true,
        ap_suspended: false,
        ap_watchdog: false,
        warm_reset_request: false,
        shutdown_request: false,
        no_cutoff: false,
    };
}

impl Default for SimKnobs {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Physical state behind the board pins.
#[derive(Clone, Debug)]
struct World {
    knobs: SimKnobs,
    outputs: OutputLevels,
    pmic_on: bool,
    pmic_on_at: Option<SimInstant>,
    pmic_off_at: Option<SimInstant>,
    key_down_since: Option<SimInstant>,
    ap_released_at: Option<SimInstant>,
}

impl World {
    fn new(pmic_on: bool) -> Self {
        Self {
            knobs: SimKnobs::DEFAULT,
            outputs: OutputLevels::idle(PROFILE.outputs),
            pmic_on,
            pmic_on_at: None,
            pmic_off_at: None,
            key_down_since: None,
            ap_released_at: None,
        }
    }

    fn asserted(&self, line: PowerOutput) -> bool {
        self.outputs.is_asserted(line)
    }

    fn standby_good(&self) -> bool {
        self.asserted(PowerOutput::EnPp1800S5L) && !self.knobs.standby_dead
    }

    fn drive(&mut self, now: SimInstant, line: PowerOutput, action: LineAction) {
        let was = self.asserted(line);
        self.outputs.apply(line, action);
        let is = action.is_assert();
        if was == is {
            return;
        }

        match line {
            PowerOutput::PmicEnOdl if is => self.key_down_since = Some(now),
            PowerOutput::PmicEnOdl => {
                let held = self
                    .key_down_since
                    .take()
                    .map(|since| now.saturating_duration_since(since));
                let accepted = held.is_some_and(|held| held >= PMIC_MIN_PRESS);
                if accepted
                    && !self.pmic_on
                    && !self.knobs.pmic_dead
                    && self.standby_good()
                    && !self.asserted(PowerOutput::PmicForceResetOdl)
                {
                    self.pmic_on_at = Some(now + PMIC_RAMP);
                }
            }
            PowerOutput::PmicForceResetOdl if is => self.power_off(),
            PowerOutput::PmicWatchdogL if is && self.pmic_on => {
                self.pmic_off_at = Some(now + PMIC_WATCHDOG_DELAY);
            }
            PowerOutput::ApSysRstL if !is => self.ap_released_at = Some(now),
            PowerOutput::ApSysRstL => self.ap_released_at = None,
            _ => {}
        }
    }

    fn power_off(&mut self) {
        self.pmic_on = false;
        self.pmic_on_at = None;
        self.pmic_off_at = None;
    }

    fn tick(&mut self, now: SimInstant) {
        if self.pmic_on_at.is_some_and(|at| now >= at) {
            self.pmic_on_at = None;
            self.pmic_on = true;
        }
        if self.pmic_off_at.is_some_and(|at| now >= at) {
            self.power_off();
        }
        if self.pmic_on && !self.standby_good() {
            self.power_off();
        }
        if self.pmic_on
            && self.knobs.long_press_off
            && self
                .key_down_since
                .is_some_and(|since| now.saturating_duration_since(since) >= PMIC_LONG_PRESS)
        {
            self.power_off();
        }
    }

    fn ap_running(&self, now: SimInstant) -> bool {
        self.pmic_on
            && self
                .ap_released_at
                .is_some_and(|at| now.saturating_duration_since(at) >= AP_BOOT_TIME)
    }

    /// Logical input levels.
    fn inputs(&self, now: SimInstant) -> SignalMask {
        let running = self.ap_running(now);
        [
            (
                PowerInput::PmicPwrGood,
                (self.pmic_on || self.knobs.rails_stuck) && !self.knobs.rail_fault,
            ),
            (PowerInput::Pp1800S5PwrGood, self.standby_good()),
            (PowerInput::ApInS3L, !running || self.knobs.ap_suspended),
            (PowerInput::ApEcWatchdogL, self.knobs.ap_watchdog),
            (PowerInput::WarmResetReq, running && self.knobs.warm_reset_request),
            (PowerInput::ApShutdownReqL, running && self.knobs.shutdown_request),
        ]
        .into_iter()
        .fold(SignalMask::EMPTY, |mask, (input, asserted)| {
            mask.with(input.as_index(), asserted)
        })
    }

    /// Pin levels as the MCU would sample them.
    fn raw_high(&self, now: SimInstant) -> u32 {
        let logical = self.inputs(now);
        PROFILE
            .inputs
            .iter()
            .enumerate()
            .fold(0, |raw, (index, spec)| {
                let action = LineAction::from_asserted(logical.is_set(index));
                if spec.polarity.level_for(action) {
                    raw | (1 << index)
                } else {
                    raw
                }
            })
    }
}

/// Output change captured by the simulator.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DriveRecord {
    pub at: SimInstant,
    pub line: PowerOutput,
    pub action: LineAction,
}

/// Knob change applied once virtual time reaches it.
type ScheduledFault = (SimInstant, fn(&mut SimKnobs));

/// Reference board running against the physical model.
pub struct SimBoard {
    profile: &'static BoardProfile<PowerOutput>,
    now: SimInstant,
    world: World,
    scheduled: Option<ScheduledFault>,
    reader: SignalReader<SimInstant, { PowerInput::COUNT }>,
    interrupts: InterruptSet,
    drives: HistoryBuf<DriveRecord, 128>,
    hooks: HistoryBuf<(SimInstant, ChipsetHook), 64>,
    events: HistoryBuf<(SimInstant, PowerEvent), 128>,
    power_key: HistoryBuf<(SimInstant, bool), 32>,
    battery_cut: bool,
}

impl SimBoard {
    /// Board with every rail down.
    #[must_use]
    pub fn new() -> Self {
        Self::with_pmic(false)
    }

    /// Board whose PMIC is already running, as after a warm restart or an
    /// EC reset with the AP left up.
    #[must_use]
    pub fn with_pmic(pmic_on: bool) -> Self {
        let world = World::new(pmic_on);
        let now = SimInstant::ZERO;
        let reader = SignalReader::new(PROFILE.inputs, world.raw_high(now), now, DEFAULT_SETTLE);
        Self {
            profile: &PROFILE,
            now,
            world,
            scheduled: None,
            reader,
            interrupts: InterruptSet::EMPTY,
            drives: HistoryBuf::new(),
            hooks: HistoryBuf::new(),
            events: HistoryBuf::new(),
            power_key: HistoryBuf::new(),
            battery_cut: false,
        }
    }

    /// Board caught mid-run with the AP booted and the outputs matching S0.
    #[must_use]
    pub fn running() -> Self {
        let mut board = Self::with_pmic(true);
        for (line, action) in [
            (PowerOutput::EnPp1800S5L, LineAction::Assert),
            (PowerOutput::PmicWatchdogL, LineAction::Deassert),
            (PowerOutput::ApSysRstL, LineAction::Deassert),
        ] {
            board.world.drive(SimInstant::ZERO, line, action);
        }
        board.world.ap_released_at = Some(SimInstant::ZERO);
        board.now = SimInstant::ZERO + AP_BOOT_TIME;
        board.reader = SignalReader::new(
            PROFILE.inputs,
            board.world.raw_high(board.now),
            board.now,
            DEFAULT_SETTLE,
        );
        board
    }

    /// Same pins under a different profile, e.g. with other power-good masks.
    #[must_use]
    pub fn with_profile(mut self, profile: &'static BoardProfile<PowerOutput>) -> Self {
        self.profile = profile;
        self
    }

    /// Applies `change` to the knobs once virtual time reaches `at`, which
    /// lets a fault land in the middle of an engine wait.
    pub fn schedule_fault(&mut self, at: SimInstant, change: fn(&mut SimKnobs)) {
        self.scheduled = Some((at, change));
    }

    pub fn knobs_mut(&mut self) -> &mut SimKnobs {
        &mut self.world.knobs
    }

    #[must_use]
    pub fn knobs(&self) -> SimKnobs {
        self.world.knobs
    }

    /// Moves virtual time forward in 1 ms ticks.
    pub fn advance(&mut self, duration: Duration) {
        let end = self.now + duration;
        while self.now < end {
            self.now = self.now + TICK;
            let now = self.now;
            if let Some((_, change)) = self.scheduled.take_if(|(at, _)| *at <= now) {
                change(&mut self.world.knobs);
            }
            self.world.tick(self.now);
            let raw = self.world.raw_high(self.now);
            let _ = self.reader.update(raw, self.now);
        }
    }

    #[must_use]
    pub fn pmic_on(&self) -> bool {
        self.world.pmic_on
    }

    #[must_use]
    pub fn ap_running(&self) -> bool {
        self.world.ap_running(self.now)
    }

    #[must_use]
    pub fn output(&self, line: PowerOutput) -> bool {
        self.world.asserted(line)
    }

    #[must_use]
    pub fn interrupts(&self) -> InterruptSet {
        self.interrupts
    }

    #[must_use]
    pub fn battery_cut(&self) -> bool {
        self.battery_cut
    }

    /// Power-key presses and releases seen by the AP.
    pub fn power_key_log(&self) -> impl Iterator<Item = (SimInstant, bool)> + '_ {
        self.power_key.oldest_ordered().copied()
    }

    pub fn drives(&self) -> impl Iterator<Item = DriveRecord> + '_ {
        self.drives.oldest_ordered().copied()
    }

    pub fn hooks(&self) -> impl Iterator<Item = ChipsetHook> + '_ {
        self.hooks.oldest_ordered().map(|(_, hook)| *hook)
    }

    pub fn events(&self) -> impl Iterator<Item = (SimInstant, PowerEvent)> + '_ {
        self.events.oldest_ordered().copied()
    }

    /// Forgets captured drives, hooks and events.
    pub fn clear_logs(&mut self) {
        self.drives.clear();
        self.hooks.clear();
        self.events.clear();
        self.power_key.clear();
    }
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimBoard {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        self.now
    }

    async fn delay(&mut self, duration: Duration) {
        self.advance(duration);
    }
}

impl SignalSource for SimBoard {
    fn read_mask(&mut self) -> SignalMask {
        self.reader.read_mask()
    }
}

impl LineDriver for SimBoard {
    type Line = PowerOutput;

    fn drive(&mut self, line: PowerOutput, action: LineAction) {
        self.world.drive(self.now, line, action);
        self.drives.write(DriveRecord {
            at: self.now,
            line,
            action,
        });
    }
}

impl Board for SimBoard {
    fn profile(&self) -> &'static BoardProfile<PowerOutput> {
        self.profile
    }

    fn set_interrupt(&mut self, irq: ChipsetInterrupt, enabled: bool) {
        let set = InterruptSet::of(&[irq]);
        self.interrupts = if enabled {
            self.interrupts.union(set)
        } else {
            self.interrupts.without(set)
        };
    }

    fn notify(&mut self, hook: ChipsetHook) {
        self.hooks.write((self.now, hook));
    }

    fn record(&mut self, at: SimInstant, event: PowerEvent) {
        self.events.write((at, event));
    }

    fn power_key(&mut self, asserted: bool) {
        self.power_key.write((self.now, asserted));
    }

    fn cut_off_battery(&mut self) -> bool {
        if self.world.knobs.no_cutoff {
            return false;
        }
        self.battery_cut = true;
        true
    }
}

/// Charger model: allows power-on after a number of polls, or never.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SimCharger {
    ready_after: Option<u32>,
    polls: u32,
    want_shutdown: bool,
}

impl SimCharger {
    #[must_use]
    pub const fn ready() -> Self {
        Self::ready_after(0)
    }

    /// Blocks the first `polls` readiness checks.
    #[must_use]
    pub const fn ready_after(polls: u32) -> Self {
        Self {
            ready_after: Some(polls),
            polls: 0,
            want_shutdown: false,
        }
    }

    #[must_use]
    pub const fn never() -> Self {
        Self {
            ready_after: None,
            polls: 0,
            want_shutdown: false,
        }
    }

    /// Readiness checks seen so far.
    #[must_use]
    pub const fn polls(&self) -> u32 {
        self.polls
    }

    /// Battery charged: the next check passes.
    pub fn charge(&mut self) {
        self.ready_after = Some(0);
        self.polls = 0;
    }

    pub fn set_want_shutdown(&mut self, want: bool) {
        self.want_shutdown = want;
    }
}

impl ChargeGate for SimCharger {
    fn prevent_power_on(&mut self) -> bool {
        self.polls = self.polls.saturating_add(1);
        self.ready_after.is_none_or(|after| self.polls <= after)
    }

    fn want_shutdown(&mut self) -> bool {
        self.want_shutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pmic_starts_on_a_long_enough_press() {
        let mut board = SimBoard::new();
        board.drive(PowerOutput::EnPp1800S5L, LineAction::Assert);
        board.drive(PowerOutput::PmicEnOdl, LineAction::Assert);
        board.advance(Duration::from_millis(10));
        board.drive(PowerOutput::PmicEnOdl, LineAction::Deassert);
        board.advance(Duration::from_millis(50));
        assert!(!board.pmic_on(), "10 ms press is too short");

        board.drive(PowerOutput::PmicEnOdl, LineAction::Assert);
        board.advance(Duration::from_millis(50));
        board.drive(PowerOutput::PmicEnOdl, LineAction::Deassert);
        board.advance(Duration::from_millis(4));
        assert!(!board.pmic_on());
        board.advance(Duration::from_millis(1));
        assert!(board.pmic_on());
    }

    #[test]
    fn inputs_are_debounced() {
        let mut board = SimBoard::new();
        board.drive(PowerOutput::EnPp1800S5L, LineAction::Assert);
        let standby = PowerInput::Pp1800S5PwrGood.mask();
        board.advance(Duration::from_millis(19));
        assert!(!board.read_mask().contains(standby));
        board.advance(Duration::from_millis(2));
        assert!(board.read_mask().contains(standby));
    }

    #[test]
    fn watchdog_edge_kills_running_pmic() {
        let mut board = SimBoard::running();
        assert!(board.pmic_on());
        board.drive(PowerOutput::PmicWatchdogL, LineAction::Assert);
        board.advance(Duration::from_millis(2));
        assert!(!board.pmic_on());
    }

    #[test]
    fn charger_counts_polls() {
        let mut charger = SimCharger::ready_after(2);
        assert!(charger.prevent_power_on());
        assert!(charger.prevent_power_on());
        assert!(!charger.prevent_power_on());
        assert_eq!(charger.polls(), 3);
        assert!(SimCharger::never().prevent_power_on());
    }
}
