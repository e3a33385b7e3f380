//! The chipset power engine.
//!
//! One task owns the engine. Each [`ChipsetEngine::step`] services expired
//! deadlines, samples the board, and then either runs the edge for a
//! transitional state to completion or evaluates the steady state. Requests
//! from other tasks only mutate flags; the next step acts on them.

use core::fmt;
use core::time::Duration;

use super::{
    ChipsetControl, ChipsetRequest, EngineFlags, PowerState, RETRY_LIMIT, ResetCause,
    ShutdownReason, StateMask, TransitionInputs, next_state,
};
use crate::board::{Board, InterruptSet};
use crate::button::{ButtonAction, ButtonActions, ButtonEdge, ButtonThresholds, PowerButton};
use crate::charge::{ChargeGate, ChargePolicy, may_power_on};
use crate::events::{
    ApEdgeContext, ApEdgeVerdict, ApLine, ENABLE_PULSE, HostCommand, LidEvent, classify_ap_edge,
};
use crate::hooks::ChipsetHook;
use crate::persist::{ButtonJumpState, ChipsetJumpState};
use crate::sequences::{Edge, LineDriver, resting_levels, run_sequence};
use crate::signals::{
    LineAction, MatchKind, OutputLevels, SIGNAL_POLL_INTERVAL, SignalMask, WaitTimeout,
};
use crate::telemetry::{EventLog, PowerEvent};
use crate::timer::{Clock, DeferredSlot, earliest};

/// Result of a single [`ChipsetEngine::step`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StepOutcome<I> {
    /// An edge ran or a steady state handed off to one.
    Transitioned { from: PowerState, to: PowerState },
    /// Nothing to do until an input changes, a request arrives or `wake_at`.
    Idle { wake_at: Option<I> },
}

/// Snapshot reported by the `powerinfo` console command.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PowerInfo {
    pub state: PowerState,
    pub signals: SignalMask,
    pub flags: EngineFlags,
    pub outputs: OutputLevels,
}

impl fmt::Display for PowerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "power state {} = {}, in {}",
            self.state.code(),
            self.state,
            self.signals
        )
    }
}

pub struct ChipsetEngine<B: Board, G: ChargeGate> {
    board: B,
    gate: G,
    charge_policy: ChargePolicy,
    state: PowerState,
    flags: EngineFlags,
    outputs: OutputLevels,
    signals: SignalMask,
    debug_mask: SignalMask,
    /// The hold-off table is applied and must be undone before the next edge.
    holding_off: bool,
    /// S3S5 gave up on the rails; `shutdown-complete` waits for G3.
    shutdown_complete_owed: bool,
    s5_timeout: Option<Duration>,
    inactivity: DeferredSlot<B::Instant>,
    force_release: DeferredSlot<B::Instant>,
    console_release: DeferredSlot<B::Instant>,
    button: PowerButton<B::Instant>,
    log: EventLog<B::Instant>,
    last_shutdown_at: Option<B::Instant>,
}

impl<B, G> ChipsetEngine<B, G>
where
    B: Board,
    G: ChargeGate,
{
    #[must_use]
    pub fn new(board: B, gate: G) -> Self {
        let profile = board.profile();
        Self {
            board,
            gate,
            charge_policy: ChargePolicy::DEFAULT,
            state: PowerState::G3,
            flags: EngineFlags::default(),
            outputs: OutputLevels::idle(profile.outputs),
            signals: SignalMask::EMPTY,
            debug_mask: SignalMask::from_bits(u32::MAX),
            holding_off: false,
            shutdown_complete_owed: false,
            s5_timeout: profile.timings.s5_inactivity,
            inactivity: DeferredSlot::new(),
            force_release: DeferredSlot::new(),
            console_release: DeferredSlot::new(),
            button: PowerButton::new(ButtonThresholds::DEFAULT),
            log: EventLog::new(),
            last_shutdown_at: None,
        }
    }

    #[must_use]
    pub fn with_charge_policy(mut self, policy: ChargePolicy) -> Self {
        self.charge_policy = policy;
        self
    }

    #[must_use]
    pub fn with_button_thresholds(mut self, thresholds: ButtonThresholds) -> Self {
        self.button = PowerButton::new(thresholds);
        self
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn gate_mut(&mut self) -> &mut G {
        &mut self.gate
    }

    /// Gives the board and gate back, as a warm restart does.
    pub fn into_parts(self) -> (B, G) {
        (self.board, self.gate)
    }

    #[must_use]
    pub const fn state(&self) -> PowerState {
        self.state
    }

    #[must_use]
    pub const fn flags(&self) -> &EngineFlags {
        &self.flags
    }

    #[must_use]
    pub const fn outputs(&self) -> OutputLevels {
        self.outputs
    }

    #[must_use]
    pub const fn s5_timeout(&self) -> Option<Duration> {
        self.s5_timeout
    }

    #[must_use]
    pub const fn debug_mask(&self) -> SignalMask {
        self.debug_mask
    }

    #[must_use]
    pub const fn button(&self) -> &PowerButton<B::Instant> {
        &self.button
    }

    #[must_use]
    pub const fn log(&self) -> &EventLog<B::Instant> {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// When the chipset last reached G3.
    #[must_use]
    pub const fn last_shutdown_at(&self) -> Option<B::Instant> {
        self.last_shutdown_at
    }

    #[must_use]
    pub fn power_info(&self) -> PowerInfo {
        PowerInfo {
            state: self.state,
            signals: self.signals,
            flags: self.flags,
            outputs: self.outputs,
        }
    }

    /// State worth carrying across a warm restart.
    #[must_use]
    pub fn jump_state(&self) -> (ChipsetJumpState, ButtonJumpState) {
        (
            ChipsetJumpState { state: self.state },
            ButtonJumpState {
                pulse_enabled: self.button.pulse_enabled(),
            },
        )
    }

    /// Picks the initial state from the reset cause and the live signals,
    /// then drives every output to the level that state implies.
    ///
    /// `hint` is the state saved before a warm restart; it is only believed
    /// when the signals agree with it.
    pub fn init(
        &mut self,
        cause: ResetCause,
        hint: Option<ChipsetJumpState>,
        button: Option<ButtonJumpState>,
    ) -> PowerState {
        let profile = self.board.profile();
        let now = self.board.now();
        self.signals = self.board.read_mask();
        let pmic_up = self.pmic_up(self.signals);

        let state = match cause {
            ResetCause::Sysjump => {
                if let Some(saved) = button {
                    self.button.set_pulse_enabled(saved.pulse_enabled);
                }
                self.resume_state(hint.map(|saved| saved.state))
            }
            ResetCause::ApOff => {
                if pmic_up {
                    self.flags.forcing_shutdown = true;
                }
                Self::off_state(pmic_up)
            }
            ResetCause::PowerOn | ResetCause::ResetPin => {
                self.flags.boot_pending = true;
                Self::off_state(pmic_up)
            }
        };

        self.outputs = resting_levels(profile.outputs, &profile.tables, state);
        for spec in profile.outputs {
            let action = LineAction::from_asserted(self.outputs.is_asserted(spec.line));
            self.board.drive(spec.line, action);
        }

        self.state = state;
        if state == PowerState::S5 {
            self.arm_inactivity(now);
        }
        state
    }

    const fn off_state(pmic_up: bool) -> PowerState {
        if pmic_up {
            PowerState::S5
        } else {
            PowerState::G3
        }
    }

    fn resume_state(&mut self, hint: Option<PowerState>) -> PowerState {
        let profile = self.board.profile();
        let masks = profile.masks;
        let signals = self.signals;
        let suspended = signals.intersects(masks.suspend);

        let state = if signals.contains(masks.pgood_s0) && !suspended {
            self.arm(profile.edge_interrupts.all_on());
            PowerState::S0
        } else if hint == Some(PowerState::S3) && signals.contains(masks.pgood_s3) && suspended {
            self.arm(profile.edge_interrupts.s5s3);
            PowerState::S3
        } else {
            return Self::off_state(self.pmic_up(signals));
        };

        let now = self.board.now();
        self.record(now, PowerEvent::SysjumpResume(state));
        state
    }

    /// Runs one scheduling pass.
    pub async fn step(&mut self) -> StepOutcome<B::Instant> {
        self.service_deadlines().await;
        let now = self.board.now();
        self.sample(now);

        let from = self.state;
        let to = if from.is_transitional() {
            self.run_edge(from).await
        } else {
            self.evaluate(now).await
        };

        if from.is_transitional() || to != from {
            self.enter(from, to);
            StepOutcome::Transitioned { from, to }
        } else {
            StepOutcome::Idle {
                wake_at: self.wake_at(),
            }
        }
    }

    /// Earliest deadline the engine is waiting on.
    #[must_use]
    pub fn wake_at(&self) -> Option<B::Instant> {
        [
            self.force_release.deadline(),
            self.console_release.deadline(),
            self.button.deadline(),
        ]
        .into_iter()
        .fold(self.inactivity.deadline(), earliest)
    }

    /// Applies a request posted by another task.
    pub fn handle_request(&mut self, request: ChipsetRequest) {
        let now = self.board.now();
        match request {
            ChipsetRequest::ForceShutdown(reason) => self.force_shutdown(reason),
            ChipsetRequest::RequestReset(reason) => self.request_reset(reason),
            ChipsetRequest::ExitHardOff => self.exit_hard_off(),
            ChipsetRequest::Lid(LidEvent::Opened) => {
                if self.state.in_state(StateMask::ANY_OFF) {
                    self.exit_hard_off();
                }
            }
            ChipsetRequest::Lid(LidEvent::Closed) => {}
            ChipsetRequest::Button(ButtonEdge::Pressed) => {
                let actions = self.button.on_press(now, self.state);
                self.apply_button(actions);
            }
            ChipsetRequest::Button(ButtonEdge::Released) => {
                self.console_release.cancel();
                let actions = self.button.on_release(now);
                self.apply_button(actions);
            }
            ChipsetRequest::PressButton(hold) => {
                let actions = self.button.on_press(now, self.state);
                if self.button.is_pressed() {
                    self.console_release.arm(now, hold);
                }
                self.apply_button(actions);
            }
            ChipsetRequest::ChargeStateChanged => self.flags.boot_inhibited = false,
            ChipsetRequest::SetS5Timeout(timeout) => {
                self.s5_timeout = timeout;
                if self.state == PowerState::S5 {
                    self.inactivity.cancel();
                    self.arm_inactivity(now);
                }
            }
            ChipsetRequest::SetDebugMask(mask) => self.debug_mask = mask,
            ChipsetRequest::Host(HostCommand::ConfigPowerButton { flags }) => {
                self.button.set_pulse_enabled(flags & ENABLE_PULSE != 0);
            }
        }
    }

    async fn service_deadlines(&mut self) {
        let now = self.board.now();
        if self.force_release.take_expired(now) {
            self.run_table(Edge::ForceRelease).await;
            self.record(now, PowerEvent::ForceResetReleased);
        }
        if self.console_release.take_expired(now) {
            let actions = self.button.on_release(now);
            self.apply_button(actions);
        }
        let actions = self.button.on_deadline(now);
        self.apply_button(actions);
    }

    fn apply_button(&mut self, actions: ButtonActions) {
        for action in actions {
            match action {
                ButtonAction::AssertPowerKey => self.board.power_key(true),
                ButtonAction::ReleasePowerKey => self.board.power_key(false),
                ButtonAction::ExitHardOff => self.exit_hard_off_button(),
                ButtonAction::ForceShutdown => self.force_shutdown(ShutdownReason::Button),
                ButtonAction::RequestReset => self.request_reset(ShutdownReason::Button),
                ButtonAction::CutOffBattery => {
                    if !self.board.cut_off_battery() {
                        let now = self.board.now();
                        self.record(now, PowerEvent::CutoffUnavailable);
                    }
                }
            }
        }
    }

    /// Boot request from the power button. Unlike lid or console requests,
    /// a press also overrides a forced shutdown still pending in S5.
    fn exit_hard_off_button(&mut self) {
        if self.state.in_state(StateMask::ANY_OFF) {
            self.flags.forcing_shutdown = false;
        }
        self.exit_hard_off();
    }

    fn sample(&mut self, now: B::Instant) {
        let signals = self.board.read_mask();
        let previous = self.signals;
        let changed = signals.changed(previous);
        if changed.is_empty() {
            return;
        }

        self.signals = signals;
        if changed.intersects(self.debug_mask) {
            self.record(now, PowerEvent::SignalsChanged { mask: signals });
        }
        self.check_ap_edges(now, previous, signals);
    }

    fn check_ap_edges(&mut self, now: B::Instant, previous: SignalMask, signals: SignalMask) {
        let profile = self.board.profile();
        for line in ApLine::ALL {
            let asserted = signals.intersection(line.mask(&profile.ap_lines));
            if asserted.without(previous).is_empty() {
                continue;
            }

            let context = ApEdgeContext::new(
                signals,
                self.flags.armed,
                self.outputs,
                &profile.masks,
                &profile.ap_lines,
            );
            match classify_ap_edge(line, &context) {
                ApEdgeVerdict::Ignore(_) => self.record(now, PowerEvent::ApEdgeIgnored(line)),
                ApEdgeVerdict::Reset(reason) => self.request_reset(reason),
                ApEdgeVerdict::Shutdown(reason) => self.force_shutdown(reason),
            }
        }
    }

    async fn evaluate(&mut self, now: B::Instant) -> PowerState {
        let masks = self.board.profile().masks;
        let inputs = TransitionInputs {
            signals: self.signals,
            masks,
            flags: self.flags,
            inactivity_expired: self.inactivity.is_expired(now),
        };
        let next = next_state(self.state, &inputs);

        match self.state {
            PowerState::S5
                if next == PowerState::S5
                    && (self.flags.forcing_shutdown || self.flags.reboot_at_g3)
                    && !self.holding_off =>
            {
                // Keep the PMIC from restarting while the inactivity timer runs.
                self.run_table(Edge::HoldOff).await;
                self.holding_off = true;
            }
            PowerState::S3 | PowerState::S0
                if next != self.state
                    && !self.flags.forcing_shutdown
                    && !self.signals.contains(self.pgood_for(self.state)) =>
            {
                // Latch it so a board whose S0 rails fail alone cannot resume.
                self.record(now, PowerEvent::RailsLost(self.state));
                self.force_shutdown(ShutdownReason::RailLost);
            }
            _ => {}
        }
        next
    }

    fn pgood_for(&self, state: PowerState) -> SignalMask {
        let masks = self.board.profile().masks;
        if state == PowerState::S0 {
            masks.pgood_s0
        } else {
            masks.pgood_s3
        }
    }

    async fn run_edge(&mut self, state: PowerState) -> PowerState {
        match state {
            PowerState::G3S5 => self.edge_g3s5().await,
            PowerState::S5S3 => self.edge_s5s3().await,
            PowerState::S3S0 => self.edge_s3s0().await,
            PowerState::S0S3 => self.edge_s0s3().await,
            PowerState::S3S5 => self.edge_s3s5().await,
            PowerState::S5G3 => self.edge_s5g3().await,
            steady => steady,
        }
    }

    async fn edge_g3s5(&mut self) -> PowerState {
        let verdict = may_power_on(&mut self.board, &mut self.gate, self.charge_policy).await;
        if !verdict.is_ready() {
            let now = self.board.now();
            self.flags.boot_inhibited = true;
            self.flags.last_reason = Some(ShutdownReason::BatteryInhibit);
            self.record(now, PowerEvent::PowerOnInhibited(verdict));
            return PowerState::G3;
        }

        let profile = self.board.profile();
        self.force_release.cancel();
        self.run_table(Edge::G3S5).await;
        match self
            .wait(profile.masks.standby, MatchKind::AllSet, profile.timings.standby_timeout)
            .await
        {
            Ok(()) => PowerState::S5,
            Err(_) => self.retry_or(PowerState::G3S5, PowerState::S5G3),
        }
    }

    async fn edge_s5s3(&mut self) -> PowerState {
        let profile = self.board.profile();
        let masks = profile.masks;
        self.flags.boot_pending = false;
        self.notify(ChipsetHook::PreInit);
        self.release_hold();

        let live = self.board.read_mask();
        if !self.pmic_up(live) {
            self.run_table(Edge::PmicPulse).await;
        }
        if self
            .wait(masks.pgood_s3, MatchKind::AllSet, profile.timings.pgood_timeout)
            .await
            .is_err()
        {
            return self.retry_or(PowerState::S5S3, PowerState::S5G3);
        }

        self.run_table(Edge::S5S3).await;
        self.arm(profile.edge_interrupts.s5s3);
        self.notify(ChipsetHook::Startup);
        PowerState::S3
    }

    async fn edge_s3s0(&mut self) -> PowerState {
        let profile = self.board.profile();
        let masks = profile.masks;
        self.run_table(Edge::S3S0).await;
        match self
            .wait_guarded(masks.pgood_s0, masks.pgood_s3, profile.timings.resume_timeout)
            .await
        {
            Ok(()) => {}
            Err(ResumeFailure::Timeout) => {
                self.force_shutdown(ShutdownReason::Wait);
                return PowerState::S0S3;
            }
            Err(ResumeFailure::RailsLost) => {
                let now = self.board.now();
                self.record(now, PowerEvent::RailsLost(PowerState::S3S0));
                self.force_shutdown(ShutdownReason::RailLost);
                return PowerState::S0S3;
            }
        }

        self.arm(profile.edge_interrupts.s3s0);
        self.notify(ChipsetHook::Resume);
        PowerState::S0
    }

    async fn edge_s0s3(&mut self) -> PowerState {
        let profile = self.board.profile();
        self.notify(ChipsetHook::Suspend);
        self.run_table(Edge::S0S3).await;
        self.disarm(profile.edge_interrupts.s3s0);

        // A press still held here was waiting on the force-off stage.
        if self.button.is_pressed() && self.button.skip_force_off() {
            self.force_shutdown(ShutdownReason::Button);
        }
        PowerState::S3
    }

    async fn edge_s3s5(&mut self) -> PowerState {
        let profile = self.board.profile();
        let masks = profile.masks;
        let live = self.board.read_mask();
        if !self.pmic_up(live) {
            self.flags.ap_shutdown = true;
        }
        self.flags.forcing_shutdown = false;

        self.notify(ChipsetHook::Shutdown);
        self.disarm(profile.edge_interrupts.all_on());
        self.run_table(Edge::S3S5).await;
        if self
            .wait(masks.pgood_s3, MatchKind::AllClear, profile.timings.rails_off_timeout)
            .await
            .is_ok()
        {
            self.notify(ChipsetHook::ShutdownComplete);
        } else {
            // Rails refused to drop; S5 has to finish the job.
            self.flags.forcing_shutdown = true;
            self.shutdown_complete_owed = true;
        }
        PowerState::S5
    }

    async fn edge_s5g3(&mut self) -> PowerState {
        let profile = self.board.profile();
        let masks = profile.masks;
        self.release_hold();

        let live = self.board.read_mask();
        if self.pmic_up(live) {
            let now = self.board.now();
            self.record(now, PowerEvent::ForcingPmicOff);
            self.run_table(Edge::ForceOff).await;
            let now = self.board.now();
            self.force_release
                .arm(now, profile.timings.force_release_after);

            if self
                .wait(masks.pmic, MatchKind::AllClear, profile.timings.s5g3_off_timeout)
                .await
                .is_err()
                && self.flags.retry_count < RETRY_LIMIT
            {
                return self.retry_or(PowerState::S5G3, PowerState::G3);
            }
        }

        self.run_table(Edge::S5G3).await;
        PowerState::G3
    }

    fn retry_or(&mut self, edge: PowerState, fallback: PowerState) -> PowerState {
        if self.flags.retry_count >= RETRY_LIMIT {
            // Abandon the boot; a fresh trigger starts over.
            self.flags.boot_pending = false;
            return fallback;
        }
        self.flags.retry_count += 1;
        let now = self.board.now();
        self.record(
            now,
            PowerEvent::EdgeRetry {
                state: edge,
                attempt: self.flags.retry_count,
            },
        );
        edge
    }

    fn enter(&mut self, from: PowerState, to: PowerState) {
        let now = self.board.now();
        self.state = to;
        if to == from {
            return;
        }

        self.flags.retry_count = 0;
        self.record(now, PowerEvent::StateChanged { from, to });

        if from == PowerState::S5 {
            self.inactivity.cancel();
        }
        if to == PowerState::S5 {
            self.arm_inactivity(now);
        }
        if to == PowerState::G3 && from != PowerState::G3 {
            self.flags.forcing_shutdown = false;
            self.flags.ap_shutdown = false;
            if self.flags.reboot_at_g3 {
                self.flags.reboot_at_g3 = false;
                self.flags.boot_pending = true;
                self.flags.boot_inhibited = false;
            }

            // A refused power-on never raised a rail, and live rails send
            // G3 straight back to S5G3.
            let live = self.board.read_mask();
            if from != PowerState::G3S5 && !self.pmic_up(live) {
                if core::mem::take(&mut self.shutdown_complete_owed) {
                    self.notify(ChipsetHook::ShutdownComplete);
                }
                self.last_shutdown_at = Some(now);
                self.notify(ChipsetHook::HardOff);
            }
        }
    }

    fn arm_inactivity(&mut self, now: B::Instant) {
        if let Some(timeout) = self.s5_timeout {
            self.inactivity.arm(now, timeout);
        }
    }

    async fn wait(
        &mut self,
        want: SignalMask,
        kind: MatchKind,
        timeout: Duration,
    ) -> Result<(), WaitTimeout> {
        let result = self.board.wait_for(want, kind, timeout).await;
        if let Err(timeout) = result {
            let now = self.board.now();
            self.record(
                now,
                PowerEvent::SignalTimeout {
                    state: self.state,
                    want: timeout.want,
                    got: timeout.got,
                },
            );
        }
        result
    }

    /// Waits for every rail in `want` while every rail in `guard` holds.
    async fn wait_guarded(
        &mut self,
        want: SignalMask,
        guard: SignalMask,
        timeout: Duration,
    ) -> Result<(), ResumeFailure> {
        let deadline = self.board.now() + timeout;
        loop {
            let live = self.board.read_mask();
            if !live.contains(guard) {
                return Err(ResumeFailure::RailsLost);
            }
            if live.contains(want) {
                return Ok(());
            }
            let now = self.board.now();
            if now >= deadline {
                self.record(
                    now,
                    PowerEvent::SignalTimeout {
                        state: self.state,
                        want,
                        got: live,
                    },
                );
                return Err(ResumeFailure::Timeout);
            }
            self.board.delay(SIGNAL_POLL_INTERVAL).await;
        }
    }

    async fn run_table(&mut self, edge: Edge) {
        let table = self.board.profile().tables.table(edge);
        let mut driver = TrackedDriver {
            board: &mut self.board,
            outputs: &mut self.outputs,
        };
        run_sequence(&mut driver, table).await;
    }

    /// Undoes the hold-off table.
    fn release_hold(&mut self) {
        if !self.holding_off {
            return;
        }
        self.holding_off = false;
        for step in self.board.profile().tables.hold_off {
            let action = step.action.inverse();
            self.outputs.apply(step.line, action);
            self.board.drive(step.line, action);
        }
    }

    fn notify(&mut self, hook: ChipsetHook) {
        let now = self.board.now();
        self.record(now, PowerEvent::HookFired(hook));
        if hook.resets_button_pulse() {
            self.button.reset_pulse();
        }
        self.board.notify(hook);
    }

    fn arm(&mut self, set: InterruptSet) {
        for irq in set.iter() {
            if !self.flags.armed.contains(irq) {
                self.board.set_interrupt(irq, true);
            }
        }
        self.flags.armed = self.flags.armed.union(set);
    }

    fn disarm(&mut self, set: InterruptSet) {
        for irq in set.iter() {
            if self.flags.armed.contains(irq) {
                self.board.set_interrupt(irq, false);
            }
        }
        self.flags.armed = self.flags.armed.without(set);
    }

    fn pmic_up(&self, signals: SignalMask) -> bool {
        signals.intersects(self.board.profile().masks.pmic)
    }

    fn record(&mut self, at: B::Instant, event: PowerEvent) {
        self.log.record(event, at);
        self.board.record(at, event);
    }
}

impl<B, G> ChipsetControl for ChipsetEngine<B, G>
where
    B: Board,
    G: ChargeGate,
{
    fn force_shutdown(&mut self, reason: ShutdownReason) {
        if matches!(self.state, PowerState::G3 | PowerState::S5G3) {
            return;
        }
        let now = self.board.now();
        self.flags.forcing_shutdown = true;
        self.flags.boot_pending = false;
        self.flags.last_reason = Some(reason);
        self.record(now, PowerEvent::ShutdownForced(reason));
    }

    fn request_reset(&mut self, reason: ShutdownReason) {
        let now = self.board.now();
        self.flags.last_reason = Some(reason);
        self.record(now, PowerEvent::ResetRequested(reason));

        if self.state.in_or_transitioning_to(StateMask::ANY_OFF) {
            self.flags.boot_pending = true;
            self.flags.boot_inhibited = false;
        } else {
            self.flags.reboot_at_g3 = true;
            self.flags.forcing_shutdown = true;
        }
    }

    fn exit_hard_off(&mut self) {
        if !matches!(
            self.state,
            PowerState::G3 | PowerState::S5G3 | PowerState::S5
        ) {
            return;
        }
        // A pending forced shutdown still wins; the boot follows from G3.
        self.flags.boot_pending = true;
        self.flags.boot_inhibited = false;
    }

    fn current_state(&self) -> PowerState {
        self.state
    }
}

/// Why a guarded resume wait gave up.
enum ResumeFailure {
    Timeout,
    RailsLost,
}

/// Runs tables against the board while mirroring levels into the engine.
struct TrackedDriver<'a, B> {
    board: &'a mut B,
    outputs: &'a mut OutputLevels,
}

impl<B: Board> Clock for TrackedDriver<'_, B> {
    type Instant = B::Instant;

    fn now(&self) -> Self::Instant {
        self.board.now()
    }

    async fn delay(&mut self, duration: Duration) {
        self.board.delay(duration).await;
    }
}

impl<B: Board> LineDriver for TrackedDriver<'_, B> {
    type Line = B::Line;

    fn drive(&mut self, line: Self::Line, action: LineAction) {
        self.outputs.apply(line, action);
        self.board.drive(line, action);
    }
}
