//! Board binding interface.
//!
//! The engine is generic over [`Board`]; everything platform specific (pins,
//! tables, timings, how hooks fan out) sits behind it. A board is injected
//! once at startup and owned by the engine from then on.

use core::time::Duration;

use crate::hooks::ChipsetHook;
use crate::sequences::{LineDriver, SequenceTables};
use crate::signals::{self, InputSpec, MatchKind, OutputSpec, SignalMask, SignalSource, WaitTimeout};
use crate::telemetry::PowerEvent;

pub mod reference;

/// AP-facing interrupts the engine arms and disarms around edges.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChipsetInterrupt {
    /// AP watchdog line.
    ApWatchdog,
    /// AP warm-reset request line.
    WarmReset,
    /// AP shutdown request line.
    ApShutdown,
    /// AP suspend status line.
    ApSuspend,
}

impl ChipsetInterrupt {
    pub const ALL: [ChipsetInterrupt; 4] = [
        ChipsetInterrupt::ApWatchdog,
        ChipsetInterrupt::WarmReset,
        ChipsetInterrupt::ApShutdown,
        ChipsetInterrupt::ApSuspend,
    ];

    const fn bit(self) -> u8 {
        match self {
            ChipsetInterrupt::ApWatchdog => 1 << 0,
            ChipsetInterrupt::WarmReset => 1 << 1,
            ChipsetInterrupt::ApShutdown => 1 << 2,
            ChipsetInterrupt::ApSuspend => 1 << 3,
        }
    }
}

/// Set of [`ChipsetInterrupt`]s.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct InterruptSet(u8);

impl InterruptSet {
    pub const EMPTY: Self = Self(0);

    /// Builds a set from a list in `const` context.
    #[must_use]
    pub const fn of(interrupts: &[ChipsetInterrupt]) -> Self {
        let mut bits = 0;
        let mut index = 0;
        while index < interrupts.len() {
            bits |= interrupts[index].bit();
            index += 1;
        }
        Self(bits)
    }

    #[must_use]
    pub const fn contains(self, irq: ChipsetInterrupt) -> bool {
        self.0 & irq.bit() != 0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates the members in declaration order.
    pub fn iter(self) -> impl Iterator<Item = ChipsetInterrupt> {
        ChipsetInterrupt::ALL
            .into_iter()
            .filter(move |irq| self.contains(*irq))
    }
}

/// Signal groups the engine checks, as masks over the board's input table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PowerMasks {
    /// PMIC power-good.
    pub pmic: SignalMask,
    /// Standby supplies good after G3->S5.
    pub standby: SignalMask,
    /// Everything that must be good to stay in S3.
    pub pgood_s3: SignalMask,
    /// Everything that must be good to stay in S0.
    pub pgood_s0: SignalMask,
    /// AP reports suspend.
    pub suspend: SignalMask,
}

/// Timeouts and hold times for the board's edges.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PowerTimings {
    /// Standby supplies after the G3->S5 table.
    pub standby_timeout: Duration,
    /// S3 rails after the PMIC pulse.
    pub pgood_timeout: Duration,
    /// S0 rails after the S3->S0 table.
    pub resume_timeout: Duration,
    /// Rails dropping after the S3->S5 table.
    pub rails_off_timeout: Duration,
    /// How long the PMIC force-reset line stays asserted.
    pub force_release_after: Duration,
    /// Rails dropping after a forced PMIC reset.
    pub s5g3_off_timeout: Duration,
    /// Default S5 inactivity before dropping to G3; `None` waits forever.
    pub s5_inactivity: Option<Duration>,
}

impl PowerTimings {
    pub const DEFAULT: Self = Self {
        standby_timeout: Duration::from_millis(100),
        pgood_timeout: Duration::from_millis(300),
        resume_timeout: Duration::from_secs(1),
        rails_off_timeout: Duration::from_millis(200),
        force_release_after: Duration::from_secs(10),
        s5g3_off_timeout: Duration::from_secs(1),
        s5_inactivity: Some(Duration::from_secs(10)),
    };
}

/// Interrupts armed once an edge completes and disarmed when it is undone.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EdgeInterrupts {
    pub s5s3: InterruptSet,
    pub s3s0: InterruptSet,
}

impl EdgeInterrupts {
    /// Everything a warm restart straight into S0 must re-arm.
    #[must_use]
    pub const fn all_on(&self) -> InterruptSet {
        self.s5s3.union(self.s3s0)
    }
}

/// AP request lines and the EC outputs that make them fire on their own.
#[derive(Copy, Clone, Debug)]
pub struct ApLines<O: 'static> {
    pub watchdog: SignalMask,
    pub warm_reset: SignalMask,
    pub shutdown: SignalMask,
    /// Outputs that hold the AP or PMIC in reset while asserted.
    pub ec_reset_outputs: &'static [O],
}

/// Everything the engine knows about a board, as `const` data.
#[derive(Copy, Clone, Debug)]
pub struct BoardProfile<O: 'static> {
    pub name: &'static str,
    pub inputs: &'static [InputSpec],
    pub outputs: &'static [OutputSpec<O>],
    pub tables: SequenceTables<O>,
    pub masks: PowerMasks,
    pub timings: PowerTimings,
    pub edge_interrupts: EdgeInterrupts,
    pub ap_lines: ApLines<O>,
}

/// Platform binding the engine is generic over.
#[allow(async_fn_in_trait)]
pub trait Board: SignalSource + LineDriver + Sized {
    /// Static description of the board.
    fn profile(&self) -> &'static BoardProfile<Self::Line>;

    /// Blocks until `want` matches or `timeout` elapses.
    ///
    /// Boards with edge interrupts may override the default polling loop.
    async fn wait_for(
        &mut self,
        want: SignalMask,
        kind: MatchKind,
        timeout: Duration,
    ) -> Result<(), WaitTimeout> {
        signals::wait_for(self, want, kind, timeout).await
    }

    /// Enables or disables an AP interrupt source.
    fn set_interrupt(&mut self, irq: ChipsetInterrupt, enabled: bool) {
        let _ = (irq, enabled);
    }

    /// Delivers a collaborator hook.
    fn notify(&mut self, hook: ChipsetHook);

    /// Mirrors an engine event to the platform log sink.
    fn record(&mut self, at: Self::Instant, event: PowerEvent) {
        let _ = (at, event);
    }

    /// Presses or releases the AP's view of the power key.
    fn power_key(&mut self, asserted: bool) {
        let _ = asserted;
    }

    /// Disconnects the battery. Returns `false` when unsupported.
    fn cut_off_battery(&mut self) -> bool {
        false
    }
}
