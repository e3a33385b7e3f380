//! External event sources other than the power button: lid, AP request lines
//! and host commands.

use core::fmt;

use crate::board::{ApLines, ChipsetInterrupt, InterruptSet, PowerMasks};
use crate::power::ShutdownReason;
use crate::signals::{OutputLevels, OutputLine, SignalMask};

/// Lid switch transitions.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LidEvent {
    Opened,
    Closed,
}

/// AP request lines the engine watches for edges.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ApLine {
    Watchdog,
    WarmReset,
    ShutdownRequest,
}

impl ApLine {
    pub const ALL: [ApLine; 3] = [ApLine::Watchdog, ApLine::WarmReset, ApLine::ShutdownRequest];

    pub const fn as_index(self) -> usize {
        match self {
            ApLine::Watchdog => 0,
            ApLine::WarmReset => 1,
            ApLine::ShutdownRequest => 2,
        }
    }

    /// Interrupt that must be armed for this line's edges to count.
    #[must_use]
    pub const fn interrupt(self) -> ChipsetInterrupt {
        match self {
            ApLine::Watchdog => ChipsetInterrupt::ApWatchdog,
            ApLine::WarmReset => ChipsetInterrupt::WarmReset,
            ApLine::ShutdownRequest => ChipsetInterrupt::ApShutdown,
        }
    }

    /// Input bits backing this line.
    #[must_use]
    pub fn mask<O: 'static>(self, lines: &ApLines<O>) -> SignalMask {
        match self {
            ApLine::Watchdog => lines.watchdog,
            ApLine::WarmReset => lines.warm_reset,
            ApLine::ShutdownRequest => lines.shutdown,
        }
    }
}

impl fmt::Display for ApLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApLine::Watchdog => f.write_str("watchdog"),
            ApLine::WarmReset => f.write_str("warm-reset"),
            ApLine::ShutdownRequest => f.write_str("shutdown-request"),
        }
    }
}

/// Why an AP edge was discarded.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IgnoreReason {
    /// Interrupt is disarmed for the current state.
    NotArmed,
    /// PMIC is down; the line fell because the AP lost power.
    PowerDown,
    /// The EC itself is holding the AP in reset.
    EcIssued,
}

/// What to do with an AP edge.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ApEdgeVerdict {
    Ignore(IgnoreReason),
    Reset(ShutdownReason),
    Shutdown(ShutdownReason),
}

/// Everything [`classify_ap_edge`] looks at.
#[derive(Copy, Clone, Debug)]
pub struct ApEdgeContext {
    pub signals: SignalMask,
    pub armed: InterruptSet,
    /// Any EC reset output is currently asserted.
    pub ec_driving_reset: bool,
    pub pmic: SignalMask,
    pub watchdog: SignalMask,
}

impl ApEdgeContext {
    /// Builds the context from live signals and the engine's output levels.
    #[must_use]
    pub fn new<O: OutputLine>(
        signals: SignalMask,
        armed: InterruptSet,
        outputs: OutputLevels,
        masks: &PowerMasks,
        lines: &ApLines<O>,
    ) -> Self {
        let ec_driving_reset = lines
            .ec_reset_outputs
            .iter()
            .any(|line| outputs.is_asserted(*line));
        Self {
            signals,
            armed,
            ec_driving_reset,
            pmic: masks.pmic,
            watchdog: lines.watchdog,
        }
    }
}

/// Classifies a newly asserted AP line.
///
/// A watchdog edge counts only while its interrupt is armed and the PMIC is
/// up. Reset and shutdown requests are additionally dropped while the EC
/// drives a reset output or the watchdog is asserted, since both make the AP
/// lines move without the AP asking for anything.
#[must_use]
pub fn classify_ap_edge(line: ApLine, context: &ApEdgeContext) -> ApEdgeVerdict {
    if !context.armed.contains(line.interrupt()) {
        return ApEdgeVerdict::Ignore(IgnoreReason::NotArmed);
    }
    if !context.signals.intersects(context.pmic) {
        return ApEdgeVerdict::Ignore(IgnoreReason::PowerDown);
    }

    match line {
        ApLine::Watchdog => ApEdgeVerdict::Reset(ShutdownReason::ApWatchdog),
        ApLine::WarmReset | ApLine::ShutdownRequest
            if context.ec_driving_reset || context.signals.intersects(context.watchdog) =>
        {
            ApEdgeVerdict::Ignore(IgnoreReason::EcIssued)
        }
        ApLine::WarmReset => ApEdgeVerdict::Reset(ShutdownReason::ApRequest),
        ApLine::ShutdownRequest => ApEdgeVerdict::Shutdown(ShutdownReason::ApRequest),
    }
}

/// Host command flag enabling the power-button pulse toward the AP.
pub const ENABLE_PULSE: u8 = 1 << 0;

/// Commands arriving from the host interface.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HostCommand {
    ConfigPowerButton { flags: u8 },
}
