//! Console target that forwards to the chipset task.

use core::fmt;
use core::time::Duration;

use chipset_core::board::reference::PROFILE;
use chipset_core::console::commands::ConsoleTarget;
use chipset_core::persist::{ButtonJumpState, ChipsetJumpState, JumpDataError};
use chipset_core::power::{ChipsetRequest, EngineFlags, PowerInfo, PowerState};
use chipset_core::signals::{InputSpec, OutputLevels, SignalMask};
use chipset_core::telemetry::EventRecord;
use embassy_sync::channel::TrySendError;

use super::REQUESTS;
use crate::instant::FirmwareInstant;
use crate::jump;
use crate::status::{self, StatusSnapshot};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsoleError {
    /// The request queue is full.
    Busy,
    /// The chipset task has not published a snapshot yet.
    NotReady,
    Jump(JumpDataError),
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::Busy => f.write_str("chipset busy, try again"),
            ConsoleError::NotReady => f.write_str("chipset not ready"),
            ConsoleError::Jump(error) => write!(f, "sysjump failed: {error}"),
        }
    }
}

pub struct ChannelTarget;

/// Published snapshot, or the cold-boot defaults before the first publish.
fn snapshot() -> StatusSnapshot {
    status::snapshot().unwrap_or(StatusSnapshot {
        info: PowerInfo {
            state: PowerState::G3,
            signals: SignalMask::EMPTY,
            flags: EngineFlags::default(),
            outputs: OutputLevels::idle(PROFILE.outputs),
        },
        debug_mask: SignalMask::EMPTY,
        s5_timeout: PROFILE.timings.s5_inactivity,
        pulse_enabled: true,
    })
}

impl ConsoleTarget for ChannelTarget {
    type Instant = FirmwareInstant;
    type Error = ConsoleError;

    fn now(&self) -> FirmwareInstant {
        FirmwareInstant::now()
    }

    fn power_info(&self) -> PowerInfo {
        snapshot().info
    }

    fn inputs(&self) -> &'static [InputSpec] {
        PROFILE.inputs
    }

    fn debug_mask(&self) -> SignalMask {
        snapshot().debug_mask
    }

    fn s5_timeout(&self) -> Option<Duration> {
        snapshot().s5_timeout
    }

    fn pulse_enabled(&self) -> bool {
        snapshot().pulse_enabled
    }

    fn submit(&mut self, request: ChipsetRequest) -> Result<(), ConsoleError> {
        REQUESTS.try_send(request).map_err(|TrySendError::Full(_)| {
            defmt::warn!("console: request queue full");
            ConsoleError::Busy
        })
    }

    fn sysjump(&mut self) -> Result<(), ConsoleError> {
        let snapshot = status::snapshot().ok_or(ConsoleError::NotReady)?;
        jump::sysjump(
            ChipsetJumpState {
                state: snapshot.info.state,
            },
            ButtonJumpState {
                pulse_enabled: snapshot.pulse_enabled,
            },
        )
        .map_err(ConsoleError::Jump)
    }

    fn visit_log(&self, visit: &mut dyn FnMut(&EventRecord<FirmwareInstant>)) {
        status::visit_events(visit);
    }

    fn clear_log(&mut self) {
        status::clear_events();
    }
}
