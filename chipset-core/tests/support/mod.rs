#![allow(dead_code)]

use core::time::Duration;

use chipset_core::board::reference::PowerOutput;
use chipset_core::hooks::ChipsetHook;
use chipset_core::power::engine::{ChipsetEngine, StepOutcome};
use chipset_core::power::{PowerState, ResetCause};
use chipset_core::sim::{SimBoard, SimCharger};
use chipset_core::telemetry::PowerEvent;
use chipset_core::timer::Clock;
use embassy_futures::block_on;

pub type Engine = ChipsetEngine<SimBoard, SimCharger>;

/// Idle steps advance virtual time by this much.
pub const TICK: Duration = Duration::from_millis(1);

/// Engine on an unpowered board after a cold power-on.
pub fn cold_boot(charger: SimCharger) -> Engine {
    let mut engine = ChipsetEngine::new(SimBoard::new(), charger);
    engine.init(ResetCause::PowerOn, None, None);
    engine
}

/// Engine on an unpowered board with nothing pending.
pub fn parked(charger: SimCharger) -> Engine {
    let mut engine = ChipsetEngine::new(SimBoard::new(), charger);
    engine.init(ResetCause::ApOff, None, None);
    engine
}

/// Engine that picked up a running AP across a warm restart.
pub fn resumed_in_s0() -> Engine {
    let mut engine = ChipsetEngine::new(SimBoard::running(), SimCharger::ready());
    let state = engine.init(
        ResetCause::Sysjump,
        Some(chipset_core::persist::ChipsetJumpState {
            state: PowerState::S0,
        }),
        None,
    );
    assert_eq!(state, PowerState::S0);
    engine.board_mut().clear_logs();
    engine
}

/// Steps the engine until `done` holds or `limit` of virtual time passes.
pub fn run_until(engine: &mut Engine, limit: Duration, mut done: impl FnMut(&Engine) -> bool) -> bool {
    let end = engine.board().now() + limit;
    let mut transitions = 0u32;
    while engine.board().now() < end {
        if done(engine) {
            return true;
        }
        match block_on(engine.step()) {
            StepOutcome::Idle { .. } => engine.board_mut().advance(TICK),
            StepOutcome::Transitioned { .. } => {
                transitions += 1;
                assert!(transitions < 10_000, "engine cycling without time passing");
            }
        }
    }
    done(engine)
}

pub fn run_until_state(engine: &mut Engine, state: PowerState, limit: Duration) -> bool {
    run_until(engine, limit, |engine| engine.state() == state)
}

pub fn run_for(engine: &mut Engine, duration: Duration) {
    run_until(engine, duration, |_| false);
}

/// Every state the engine entered, in order, from the board's event capture.
pub fn states_entered(engine: &Engine) -> Vec<PowerState> {
    engine
        .board()
        .events()
        .filter_map(|(_, event)| match event {
            PowerEvent::StateChanged { to, .. } => Some(to),
            _ => None,
        })
        .collect()
}

pub fn hooks(engine: &Engine) -> Vec<ChipsetHook> {
    engine.board().hooks().collect()
}

pub fn events(engine: &Engine) -> Vec<PowerEvent> {
    engine.board().events().map(|(_, event)| event).collect()
}

/// Output lines driven to asserted since the last capture reset.
pub fn asserted_lines(engine: &Engine) -> Vec<PowerOutput> {
    engine
        .board()
        .drives()
        .filter(|record| record.action.is_assert())
        .map(|record| record.line)
        .collect()
}
