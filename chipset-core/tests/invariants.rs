mod support;

use core::time::Duration;

use chipset_core::board::reference::{
    MASKS, OUTPUTS, PROFILE, PowerInput, PowerOutput, TABLES,
};
use chipset_core::board::{BoardProfile, PowerMasks};
use chipset_core::button::{ButtonAction, ButtonThresholds, PowerButton, Stage};
use chipset_core::hooks::ChipsetHook;
use chipset_core::persist::ChipsetJumpState;
use chipset_core::power::{
    ChipsetControl, ChipsetEngine, ChipsetRequest, PowerState, RETRY_LIMIT, ResetCause,
    ShutdownReason, StepOutcome,
};
use chipset_core::sequences::resting_levels;
use chipset_core::signals::{SignalMask, SignalSource};
use chipset_core::sim::{SimBoard, SimCharger, SimInstant};
use chipset_core::telemetry::PowerEvent;
use chipset_core::timer::Clock;
use embassy_futures::block_on;

use support::*;

#[test]
fn s0_is_only_entered_with_every_rail_good() {
    let mut engine = cold_boot(SimCharger::ready());
    let mut entered_s0 = 0;

    for _ in 0..3_000 {
        match block_on(engine.step()) {
            StepOutcome::Transitioned {
                to: PowerState::S0, ..
            } => {
                entered_s0 += 1;
                let live = engine.board_mut().read_mask();
                assert!(live.contains(MASKS.pgood_s0), "S0 entered with {live}");
            }
            StepOutcome::Transitioned { .. } => {}
            StepOutcome::Idle { .. } => engine.board_mut().advance(TICK),
        }
    }
    assert_eq!(entered_s0, 1);
}

#[test]
fn dead_rails_never_reach_s3() {
    let mut engine = cold_boot(SimCharger::ready());
    engine.board_mut().knobs_mut().rail_fault = true;

    run_for(&mut engine, Duration::from_secs(3));

    let entered = states_entered(&engine);
    assert!(!entered.contains(&PowerState::S3));
    assert!(!entered.contains(&PowerState::S0));
    assert_eq!(engine.state(), PowerState::G3);
    assert!(!hooks(&engine).contains(&ChipsetHook::Startup));
}

#[test]
fn hooks_fire_in_edge_order_through_a_full_cycle() {
    let mut engine = cold_boot(SimCharger::ready());
    assert!(run_until_state(&mut engine, PowerState::S0, Duration::from_secs(2)));

    engine.handle_request(ChipsetRequest::ForceShutdown(ShutdownReason::Console));
    assert!(run_until_state(&mut engine, PowerState::G3, Duration::from_secs(15)));

    assert_eq!(
        hooks(&engine),
        [
            ChipsetHook::PreInit,
            ChipsetHook::Startup,
            ChipsetHook::Resume,
            ChipsetHook::Suspend,
            ChipsetHook::Shutdown,
            ChipsetHook::ShutdownComplete,
            ChipsetHook::HardOff,
        ]
    );
    assert!(engine.last_shutdown_at().is_some());
    assert!(!engine.board().pmic_on());
}

#[test]
fn force_shutdown_is_a_no_op_in_g3() {
    let mut engine = parked(SimCharger::ready());
    let flags = *engine.flags();
    let before = engine.log().total();

    engine.force_shutdown(ShutdownReason::Console);
    engine.force_shutdown(ShutdownReason::Console);

    assert_eq!(*engine.flags(), flags);
    assert_eq!(engine.log().total(), before);
    run_for(&mut engine, Duration::from_millis(100));
    assert_eq!(engine.state(), PowerState::G3);
    assert!(states_entered(&engine).is_empty());
}

#[test]
fn force_shutdown_is_a_no_op_while_dropping_to_g3() {
    let mut engine = cold_boot(SimCharger::ready());
    assert!(run_until_state(&mut engine, PowerState::S0, Duration::from_secs(2)));
    engine.force_shutdown(ShutdownReason::Console);
    assert!(run_until_state(&mut engine, PowerState::S5G3, Duration::from_secs(15)));

    let flags = *engine.flags();
    let before = engine.log().total();
    engine.force_shutdown(ShutdownReason::Console);
    engine.force_shutdown(ShutdownReason::Button);
    assert_eq!(*engine.flags(), flags);
    assert_eq!(engine.log().total(), before);

    assert!(run_until_state(&mut engine, PowerState::G3, Duration::from_secs(1)));
}

#[test]
fn failed_edges_retry_once_then_fall_back() {
    let mut engine = cold_boot(SimCharger::ready());
    engine.board_mut().knobs_mut().standby_dead = true;

    run_for(&mut engine, Duration::from_secs(2));

    let retries: Vec<PowerEvent> = events(&engine)
        .into_iter()
        .filter(|event| matches!(event, PowerEvent::EdgeRetry { .. }))
        .collect();
    assert_eq!(
        retries,
        [PowerEvent::EdgeRetry {
            state: PowerState::G3S5,
            attempt: RETRY_LIMIT,
        }]
    );
    let timeouts = events(&engine)
        .iter()
        .filter(|event| matches!(event, PowerEvent::SignalTimeout { .. }))
        .count();
    assert_eq!(timeouts, usize::from(RETRY_LIMIT) + 1);
    assert_eq!(engine.state(), PowerState::G3);
    assert!(!engine.board().output(PowerOutput::EnPp1800S5L));
}

#[test]
fn s5s3_gives_up_after_one_retry_when_the_pmic_stays_dark() {
    let mut engine = cold_boot(SimCharger::ready());
    engine.board_mut().knobs_mut().pmic_dead = true;

    run_for(&mut engine, Duration::from_secs(3));

    let entered = states_entered(&engine);
    assert_eq!(
        entered,
        [
            PowerState::G3S5,
            PowerState::S5,
            PowerState::S5S3,
            PowerState::S5G3,
            PowerState::G3,
        ]
    );
    assert!(events(&engine).contains(&PowerEvent::EdgeRetry {
        state: PowerState::S5S3,
        attempt: 1,
    }));
}

#[test]
fn escalation_stages_fire_once_each_in_order() {
    let mut button: PowerButton<SimInstant> = PowerButton::new(ButtonThresholds::DEFAULT);
    let start = SimInstant::from_millis(100);
    button.on_press(start, PowerState::S0);

    let mut fired = Vec::new();
    let mut now = start;
    while now < start + Duration::from_secs(25) {
        now = now + Duration::from_millis(250);
        for action in button.on_deadline(now) {
            if !matches!(
                action,
                ButtonAction::AssertPowerKey | ButtonAction::ReleasePowerKey
            ) {
                fired.push((now, action));
            }
        }
    }

    assert_eq!(
        fired,
        [
            (start + Duration::from_secs(4), ButtonAction::ForceShutdown),
            (start + Duration::from_secs(10), ButtonAction::RequestReset),
            (start + Duration::from_secs(20), ButtonAction::CutOffBattery),
        ]
    );
    assert_eq!(button.next_stage(), None);
}

#[test]
fn releasing_cancels_pending_stages() {
    let mut button: PowerButton<SimInstant> = PowerButton::new(ButtonThresholds::DEFAULT);
    let start = SimInstant::ZERO;
    button.on_press(start, PowerState::S0);
    assert_eq!(button.next_stage(), Some(Stage::ForceOff));

    let _ = button.on_deadline(start + Duration::from_secs(5));
    assert_eq!(button.next_stage(), Some(Stage::Reset));

    let _ = button.on_release(start + Duration::from_secs(6));
    assert_eq!(button.next_stage(), None);
    assert!(button.on_deadline(start + Duration::from_secs(30)).is_empty());
}

/// Steps `engine` for `duration`. Whenever the chipset sits in G3 or S5,
/// every line the S5->S3 and S3->S0 tables switch must be at its off level.
/// Returns how many steps were checked.
fn run_checking_off_levels(engine: &mut Engine, duration: Duration) -> usize {
    let end = engine.board().now() + duration;
    let mut checked = 0;
    while engine.board().now() < end {
        let state = engine.state();
        if matches!(state, PowerState::G3 | PowerState::S5) {
            let resting = resting_levels(&OUTPUTS, &TABLES, state);
            for step in TABLES.s5s3.iter().chain(TABLES.s3s0) {
                let level = engine.board().output(step.line);
                assert_eq!(level, resting.is_asserted(step.line), "{:?} in {state}", step.line);
                assert_ne!(level, step.action.is_assert(), "{:?} still on in {state}", step.line);
                assert_eq!(engine.outputs().is_asserted(step.line), level);
            }
            checked += 1;
        }
        if let StepOutcome::Idle { .. } = block_on(engine.step()) {
            engine.board_mut().advance(TICK);
        }
    }
    checked
}

#[test]
fn switched_lines_rest_whenever_the_chipset_is_off() {
    let scenarios: [(&str, fn() -> Engine); 8] = [
        ("console shutdown", || {
            let mut engine = resumed_in_s0();
            engine.handle_request(ChipsetRequest::ForceShutdown(ShutdownReason::Console));
            engine
        }),
        ("console reset", || {
            let mut engine = resumed_in_s0();
            engine.handle_request(ChipsetRequest::RequestReset(ShutdownReason::Console));
            engine
        }),
        ("rail loss", || {
            let mut engine = resumed_in_s0();
            engine.board_mut().knobs_mut().rail_fault = true;
            engine
        }),
        ("ap shutdown request", || {
            let mut engine = resumed_in_s0();
            engine.board_mut().knobs_mut().shutdown_request = true;
            engine
        }),
        ("stuck rails", || {
            let mut engine = resumed_in_s0();
            engine.board_mut().knobs_mut().rails_stuck = true;
            engine.handle_request(ChipsetRequest::ForceShutdown(ShutdownReason::Console));
            engine
        }),
        ("dead pmic", || {
            let mut engine = cold_boot(SimCharger::ready());
            engine.board_mut().knobs_mut().pmic_dead = true;
            engine
        }),
        ("dead standby", || {
            let mut engine = cold_boot(SimCharger::ready());
            engine.board_mut().knobs_mut().standby_dead = true;
            engine
        }),
        ("ap-off reset", || {
            let mut engine = ChipsetEngine::new(SimBoard::with_pmic(true), SimCharger::ready());
            engine.init(ResetCause::ApOff, None, None);
            engine
        }),
    ];

    for (name, setup) in scenarios {
        let mut engine = setup();
        let checked = run_checking_off_levels(&mut engine, Duration::from_secs(15));
        assert!(checked > 0, "{name}: never reached G3 or S5");
    }
}

#[test]
fn shutdown_complete_waits_for_rails_that_refuse_to_drop() {
    let mut engine = resumed_in_s0();
    engine.board_mut().knobs_mut().rails_stuck = true;
    engine.handle_request(ChipsetRequest::ForceShutdown(ShutdownReason::Console));

    assert!(run_until_state(&mut engine, PowerState::S5, Duration::from_secs(1)));
    assert_eq!(hooks(&engine), [ChipsetHook::Suspend, ChipsetHook::Shutdown]);
    assert!(engine.flags().forcing_shutdown);

    // S5 and S5G3 keep trying while the rails read good.
    run_for(&mut engine, Duration::from_secs(15));
    assert!(!hooks(&engine).contains(&ChipsetHook::ShutdownComplete));
    assert!(!hooks(&engine).contains(&ChipsetHook::HardOff));
    assert!(engine.last_shutdown_at().is_none());

    engine.board_mut().knobs_mut().rails_stuck = false;
    assert!(run_until(&mut engine, Duration::from_secs(3), |engine| {
        hooks(engine).contains(&ChipsetHook::HardOff)
    }));
    assert_eq!(
        hooks(&engine),
        [
            ChipsetHook::Suspend,
            ChipsetHook::Shutdown,
            ChipsetHook::ShutdownComplete,
            ChipsetHook::HardOff,
        ]
    );
    assert_eq!(engine.state(), PowerState::G3);
    assert!(engine.last_shutdown_at().is_some());
}

const STANDBY_GOOD: SignalMask = PowerInput::Pp1800S5PwrGood.mask();

/// Reference pins with the S3 rails on standby and the S0 rails on the PMIC.
static SPLIT_RAILS: BoardProfile<PowerOutput> = BoardProfile {
    masks: PowerMasks {
        pgood_s3: STANDBY_GOOD,
        pgood_s0: STANDBY_GOOD.union(PowerInput::PmicPwrGood.mask()),
        ..MASKS
    },
    ..PROFILE
};

fn resumed_with_split_rails() -> Engine {
    let board = SimBoard::running().with_profile(&SPLIT_RAILS);
    let mut engine = ChipsetEngine::new(board, SimCharger::ready());
    let state = engine.init(
        ResetCause::Sysjump,
        Some(ChipsetJumpState {
            state: PowerState::S0,
        }),
        None,
    );
    assert_eq!(state, PowerState::S0);
    engine.board_mut().clear_logs();
    engine
}

#[test]
fn losing_s0_rails_alone_never_resumes() {
    let mut engine = resumed_with_split_rails();
    engine.board_mut().knobs_mut().rail_fault = true;

    assert!(run_until_state(&mut engine, PowerState::G3, Duration::from_secs(2)));
    assert_eq!(
        states_entered(&engine),
        [
            PowerState::S0S3,
            PowerState::S3,
            PowerState::S3S5,
            PowerState::S5,
            PowerState::S5G3,
            PowerState::G3,
        ]
    );
    assert!(events(&engine).contains(&PowerEvent::RailsLost(PowerState::S0)));
    assert!(events(&engine).contains(&PowerEvent::ShutdownForced(ShutdownReason::RailLost)));
    assert_eq!(
        hooks(&engine),
        [
            ChipsetHook::Suspend,
            ChipsetHook::Shutdown,
            ChipsetHook::ShutdownComplete,
            ChipsetHook::HardOff,
        ]
    );
}

#[test]
fn rail_loss_during_resume_aborts_the_wait() {
    let mut engine = resumed_with_split_rails();
    engine.board_mut().knobs_mut().ap_suspended = true;
    assert!(run_until_state(&mut engine, PowerState::S3, Duration::from_secs(1)));

    // Resume with the S0 rail dead, then lose standby partway through.
    let start = engine.board().now();
    let knobs = engine.board_mut().knobs_mut();
    knobs.rail_fault = true;
    knobs.ap_suspended = false;
    engine
        .board_mut()
        .schedule_fault(start + Duration::from_millis(300), |knobs| {
            knobs.standby_dead = true;
        });

    assert!(run_until_state(&mut engine, PowerState::S3S0, Duration::from_millis(100)));
    assert!(run_until_state(&mut engine, PowerState::S0S3, Duration::from_millis(500)));
    assert!(engine.board().now() < start + Duration::from_millis(500));

    assert!(events(&engine).contains(&PowerEvent::RailsLost(PowerState::S3S0)));
    assert_eq!(engine.flags().last_reason, Some(ShutdownReason::RailLost));
    assert!(!events(&engine).iter().any(|event| matches!(
        event,
        PowerEvent::SignalTimeout {
            state: PowerState::S3S0,
            ..
        }
    )));
    assert!(!states_entered(&engine).contains(&PowerState::S0));
}
