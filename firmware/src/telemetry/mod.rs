//! Power event logging.
//!
//! Every event the engine reports is mirrored into the console's signal log
//! and emitted on defmt (or stdout on the host) with its timestamp, so RTT
//! captures show the same sequence the `siglog` command does.

use chipset_core::hooks::ChipsetHook;
use chipset_core::power::PowerState;
use chipset_core::telemetry::PowerEvent;

use crate::instant::FirmwareInstant;
use crate::status;

/// Records `event` and emits a log line.
pub fn record(event: PowerEvent, timestamp: FirmwareInstant) {
    status::record_event(event, timestamp);
    emit_event(event, timestamp.as_micros());
}

/// Logs a collaborator hook as it is delivered.
pub fn hook(hook: ChipsetHook, timestamp: FirmwareInstant) {
    emit_hook(hook, timestamp.as_micros());
}

/// Logs the reset cause and the state the engine picked at boot.
pub fn boot(cause: &'static str, state: PowerState) {
    emit_boot(cause, state);
}

#[cfg(target_os = "none")]
fn emit_event(event: PowerEvent, timestamp_us: u64) {
    if event.is_fault() {
        defmt::warn!(
            "telemetry:power t={}us code={=u16:#x} {}",
            timestamp_us,
            event.to_raw(),
            defmt::Display2Format(&event)
        );
    } else {
        defmt::info!(
            "telemetry:power t={}us code={=u16:#x} {}",
            timestamp_us,
            event.to_raw(),
            defmt::Display2Format(&event)
        );
    }
}

#[cfg(not(target_os = "none"))]
fn emit_event(event: PowerEvent, timestamp_us: u64) {
    println!(
        "telemetry:power t={}us code={:#06x} {}",
        timestamp_us,
        event.to_raw(),
        event
    );
}

#[cfg(target_os = "none")]
fn emit_hook(hook: ChipsetHook, timestamp_us: u64) {
    defmt::debug!(
        "telemetry:hook t={}us {}",
        timestamp_us,
        defmt::Display2Format(&hook)
    );
}

#[cfg(not(target_os = "none"))]
fn emit_hook(hook: ChipsetHook, timestamp_us: u64) {
    println!("telemetry:hook t={timestamp_us}us {hook}");
}

#[cfg(target_os = "none")]
fn emit_boot(cause: &'static str, state: PowerState) {
    defmt::info!(
        "chipset: reset cause {} -> {}",
        cause,
        defmt::Display2Format(&state)
    );
}

#[cfg(not(target_os = "none"))]
fn emit_boot(cause: &'static str, state: PowerState) {
    println!("chipset: reset cause {cause} -> {state}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chipset_core::power::ShutdownReason;

    #[test]
    fn recorded_events_reach_the_console_log() {
        let event = PowerEvent::ShutdownForced(ShutdownReason::HostCommand);
        record(event, FirmwareInstant::from_micros(42));

        let mut found = false;
        status::visit_events(&mut |entry| {
            found |= entry.event == event;
        });
        assert!(found);
    }
}
