//! Shared status storage for the firmware target.
//!
//! The chipset task publishes a snapshot after every step and mirrors engine
//! events into a log here, so the console can answer `powerinfo` and `siglog`
//! without touching the engine.

use core::cell::RefCell;
use core::time::Duration;

use chipset_core::power::PowerInfo;
use chipset_core::signals::SignalMask;
use chipset_core::telemetry::{EventLog, EventRecord, PowerEvent};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use crate::instant::FirmwareInstant;

/// Engine view the console reads.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StatusSnapshot {
    pub info: PowerInfo,
    pub debug_mask: SignalMask,
    pub s5_timeout: Option<Duration>,
    pub pulse_enabled: bool,
}

static SNAPSHOT: Mutex<CriticalSectionRawMutex, RefCell<Option<StatusSnapshot>>> =
    Mutex::new(RefCell::new(None));
static EVENT_LOG: Mutex<CriticalSectionRawMutex, RefCell<EventLog<FirmwareInstant>>> =
    Mutex::new(RefCell::new(EventLog::new()));

/// Replaces the published snapshot.
pub fn publish(snapshot: StatusSnapshot) {
    SNAPSHOT.lock(|cell| *cell.borrow_mut() = Some(snapshot));
}

/// Latest snapshot; `None` until the chipset task has run once.
pub fn snapshot() -> Option<StatusSnapshot> {
    SNAPSHOT.lock(|cell| *cell.borrow())
}

/// Appends an engine event to the console log.
pub fn record_event(event: PowerEvent, timestamp: FirmwareInstant) {
    EVENT_LOG.lock(|cell| {
        cell.borrow_mut().record(event, timestamp);
    });
}

/// Visits the console log, oldest first.
pub fn visit_events(visit: &mut dyn FnMut(&EventRecord<FirmwareInstant>)) {
    EVENT_LOG.lock(|cell| {
        for record in cell.borrow().oldest_first() {
            visit(record);
        }
    });
}

pub fn clear_events() {
    EVENT_LOG.lock(|cell| cell.borrow_mut().clear());
}
