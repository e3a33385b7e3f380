mod support;

use core::time::Duration;

use chipset_core::board::reference::{PowerInput, PowerOutput};
use chipset_core::board::ChipsetInterrupt;
use chipset_core::button::{ButtonEdge, Stage};
use chipset_core::charge::ChargePolicy;
use chipset_core::events::LidEvent;
use chipset_core::hooks::ChipsetHook;
use chipset_core::persist::{ButtonJumpState, ChipsetJumpState, JumpTags};
use chipset_core::power::{ChipsetEngine, ChipsetRequest, PowerState, ResetCause, ShutdownReason};
use chipset_core::sim::{SimBoard, SimCharger, SimInstant};
use chipset_core::telemetry::PowerEvent;
use chipset_core::timer::Clock;

use support::*;

#[test]
fn lid_open_boots_from_g3_to_s0() {
    let mut engine = ChipsetEngine::new(SimBoard::new(), SimCharger::ready_after(3))
        .with_charge_policy(ChargePolicy::new(Duration::from_millis(10), 40));
    engine.init(ResetCause::ApOff, None, None);
    assert_eq!(engine.state(), PowerState::G3);

    engine.handle_request(ChipsetRequest::Lid(LidEvent::Opened));
    assert!(run_until_state(&mut engine, PowerState::S0, Duration::from_secs(2)));

    assert_eq!(engine.gate_mut().polls(), 4, "gate passed within 50 ms");
    assert_eq!(
        states_entered(&engine),
        [
            PowerState::G3S5,
            PowerState::S5,
            PowerState::S5S3,
            PowerState::S3,
            PowerState::S3S0,
            PowerState::S0,
        ]
    );
    assert_eq!(
        hooks(&engine),
        [ChipsetHook::PreInit, ChipsetHook::Startup, ChipsetHook::Resume]
    );
    assert!(engine.board().ap_running());
}

#[test]
fn rail_loss_in_s0_falls_to_s5_without_coming_back() {
    let mut engine = resumed_in_s0();
    engine.board_mut().knobs_mut().rail_fault = true;

    assert!(run_until_state(&mut engine, PowerState::S5, Duration::from_secs(1)));
    assert_eq!(
        states_entered(&engine),
        [PowerState::S0S3, PowerState::S3, PowerState::S3S5, PowerState::S5]
    );
    assert_eq!(
        hooks(&engine)
            .iter()
            .filter(|hook| **hook == ChipsetHook::Shutdown)
            .count(),
        1
    );
    assert!(events(&engine).contains(&PowerEvent::RailsLost(PowerState::S0)));
    assert_eq!(engine.flags().last_reason, Some(ShutdownReason::RailLost));

    run_for(&mut engine, Duration::from_secs(1));
    assert!(!states_entered(&engine).contains(&PowerState::S0));
}

#[test]
fn charge_gate_timeout_leaves_boot_pending_in_g3() {
    let mut engine = cold_boot(SimCharger::never());
    let start = engine.board().now();

    run_for(&mut engine, Duration::from_secs(5));

    assert_eq!(engine.state(), PowerState::G3);
    assert!(engine.flags().boot_pending);
    assert!(engine.flags().boot_inhibited);
    assert_eq!(engine.flags().last_reason, Some(ShutdownReason::BatteryInhibit));
    assert!(engine.gate_mut().polls() >= 40);
    assert!(asserted_lines(&engine).iter().all(|line| !matches!(
        line,
        PowerOutput::EnPp1800S5L | PowerOutput::PmicEnOdl
    )));
    assert!(!engine.board().pmic_on());
    assert!(hooks(&engine).is_empty(), "no rail ever came up");
    assert!(engine.last_shutdown_at().is_none());

    let inhibited_at = engine
        .board()
        .events()
        .find(|(_, event)| matches!(event, PowerEvent::PowerOnInhibited(_)))
        .map(|(at, _)| at)
        .expect("inhibit recorded");
    assert!(inhibited_at >= start + ChargePolicy::DEFAULT.bound());

    // A fresh trigger once the battery is charged boots normally.
    engine.gate_mut().charge();
    engine.handle_request(ChipsetRequest::ChargeStateChanged);
    assert!(run_until_state(&mut engine, PowerState::S0, Duration::from_secs(2)));
}

#[test]
fn held_button_escalates_from_force_off_to_cold_reset() {
    let mut engine = resumed_in_s0();
    let pressed_at = engine.board().now();
    engine.handle_request(ChipsetRequest::Button(ButtonEdge::Pressed));

    run_for(&mut engine, Duration::from_millis(10_500));
    engine.handle_request(ChipsetRequest::Button(ButtonEdge::Released));

    let log: Vec<(SimInstant, PowerEvent)> = engine.board().events().collect();
    let forced = log
        .iter()
        .find(|(_, event)| *event == PowerEvent::ShutdownForced(ShutdownReason::Button))
        .map(|(at, _)| *at);
    let reset = log
        .iter()
        .find(|(_, event)| *event == PowerEvent::ResetRequested(ShutdownReason::Button))
        .map(|(at, _)| *at);

    assert_eq!(forced, Some(pressed_at + Duration::from_secs(4)));
    assert_eq!(reset, Some(pressed_at + Duration::from_secs(10)));
    assert!(!engine.board().battery_cut());

    let entered = states_entered(&engine);
    let s5 = entered
        .iter()
        .position(|state| *state == PowerState::S5)
        .expect("forced down to S5");
    assert!(entered[s5..].contains(&PowerState::S5S3), "reset boots again");

    assert!(run_until_state(&mut engine, PowerState::S0, Duration::from_secs(2)));
}

#[test]
fn button_held_into_suspend_forces_shutdown_at_once() {
    let mut engine = resumed_in_s0();
    let pressed_at = engine.board().now();
    engine.handle_request(ChipsetRequest::Button(ButtonEdge::Pressed));
    engine.board_mut().knobs_mut().ap_suspended = true;

    assert!(run_until_state(&mut engine, PowerState::S3S5, Duration::from_secs(1)));
    assert_eq!(
        states_entered(&engine),
        [PowerState::S0S3, PowerState::S3, PowerState::S3S5]
    );
    let forced = engine
        .board()
        .events()
        .find(|(_, event)| *event == PowerEvent::ShutdownForced(ShutdownReason::Button))
        .map(|(at, _)| at)
        .expect("forced on reaching S3");
    assert!(forced < pressed_at + Duration::from_millis(100));
    assert_eq!(engine.button().next_stage(), Some(Stage::Reset));
}

#[test]
fn cutoff_on_a_board_without_one_is_logged() {
    let mut engine = resumed_in_s0();
    engine.board_mut().knobs_mut().no_cutoff = true;
    engine.handle_request(ChipsetRequest::Button(ButtonEdge::Pressed));

    run_for(&mut engine, Duration::from_millis(20_500));

    assert!(!engine.board().battery_cut());
    assert!(events(&engine).contains(&PowerEvent::CutoffUnavailable));
}

#[test]
fn warm_restart_in_s0_resumes_without_sequencing() {
    let mut board = SimBoard::running();
    board.clear_logs();
    let mut engine = ChipsetEngine::new(board, SimCharger::ready());

    let mut tags = JumpTags::<16>::new();
    ChipsetJumpState {
        state: PowerState::S0,
    }
    .save(&mut tags)
    .expect("room for state");
    ButtonJumpState {
        pulse_enabled: false,
    }
    .save(&mut tags)
    .expect("room for button");
    let tags = JumpTags::<16>::decode(tags.as_bytes()).expect("valid blob");

    let state = engine.init(
        ResetCause::Sysjump,
        ChipsetJumpState::restore(&tags),
        ButtonJumpState::restore(&tags),
    );

    assert_eq!(state, PowerState::S0);
    assert!(!engine.button().pulse_enabled());
    assert!(hooks(&engine).is_empty());
    assert!(!asserted_lines(&engine).contains(&PowerOutput::PmicEnOdl));
    assert!(engine.board().ap_running());
    for irq in [
        ChipsetInterrupt::ApWatchdog,
        ChipsetInterrupt::WarmReset,
        ChipsetInterrupt::ApShutdown,
    ] {
        assert!(engine.board().interrupts().contains(irq));
        assert!(engine.flags().armed.contains(irq));
    }
    assert_eq!(events(&engine), [PowerEvent::SysjumpResume(PowerState::S0)]);

    run_for(&mut engine, Duration::from_millis(200));
    assert_eq!(engine.state(), PowerState::S0);
    assert!(states_entered(&engine).is_empty());
}

#[test]
fn warm_restart_trusts_signals_over_the_hint() {
    let mut board = SimBoard::new();
    board.advance(Duration::from_millis(50));
    let mut engine = ChipsetEngine::new(board, SimCharger::ready());

    let state = engine.init(
        ResetCause::Sysjump,
        Some(ChipsetJumpState {
            state: PowerState::S0,
        }),
        None,
    );

    assert_eq!(state, PowerState::G3);
    assert!(engine.board().interrupts().is_empty());
    assert!(!engine.flags().boot_pending);
}

#[test]
fn warm_restart_in_s3_rearms_only_suspend_interrupts() {
    let mut board = SimBoard::running();
    board.knobs_mut().ap_suspended = true;
    board.advance(Duration::from_millis(30));
    let mut engine = ChipsetEngine::new(board, SimCharger::ready());

    let state = engine.init(
        ResetCause::Sysjump,
        Some(ChipsetJumpState {
            state: PowerState::S3,
        }),
        None,
    );

    assert_eq!(state, PowerState::S3);
    assert!(engine.flags().armed.contains(ChipsetInterrupt::ApWatchdog));
    assert!(!engine.flags().armed.contains(ChipsetInterrupt::WarmReset));
    assert!(engine.power_info().signals.contains(PowerInput::ApInS3L.mask()));
}
