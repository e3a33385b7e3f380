//! Sequence tables and the table executor.
//!
//! A board describes every power edge as plain data: an ordered list of
//! [`SequenceStep`]s, each driving one output line and then waiting for its
//! settle delay. The executor runs a table strictly in order and never looks
//! at rail feedback; callers that need a rail good wait on its signal
//! separately.

use core::fmt;
use core::time::Duration;

use crate::power::PowerState;
use crate::signals::{LineAction, OutputLevels, OutputLine, OutputSpec};
use crate::timer::Clock;

/// Longest table a board may declare for a single edge.
pub const MAX_SEQUENCE_STEPS: usize = 8;

/// Single output action plus the settle delay that follows it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SequenceStep<O> {
    pub line: O,
    pub action: LineAction,
    pub delay: Duration,
}

impl<O> SequenceStep<O> {
    pub const fn new(line: O, action: LineAction, delay: Duration) -> Self {
        Self {
            line,
            action,
            delay,
        }
    }

    /// Asserts `line`, then waits `delay_ms` milliseconds.
    pub const fn assert(line: O, delay_ms: u64) -> Self {
        Self::new(line, LineAction::Assert, Duration::from_millis(delay_ms))
    }

    /// Deasserts `line`, then waits `delay_ms` milliseconds.
    pub const fn deassert(line: O, delay_ms: u64) -> Self {
        Self::new(line, LineAction::Deassert, Duration::from_millis(delay_ms))
    }
}

/// Edge identifiers, one per table in [`SequenceTables`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Edge {
    G3S5,
    PmicPulse,
    S5S3,
    S3S0,
    S0S3,
    S3S5,
    S5G3,
    HoldOff,
    ForceOff,
    ForceRelease,
}

impl Edge {
    pub const ALL: [Edge; 10] = [
        Edge::G3S5,
        Edge::PmicPulse,
        Edge::S5S3,
        Edge::S3S0,
        Edge::S0S3,
        Edge::S3S5,
        Edge::S5G3,
        Edge::HoldOff,
        Edge::ForceOff,
        Edge::ForceRelease,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Edge::G3S5 => "g3s5",
            Edge::PmicPulse => "pmic-pulse",
            Edge::S5S3 => "s5s3",
            Edge::S3S0 => "s3s0",
            Edge::S0S3 => "s0s3",
            Edge::S3S5 => "s3s5",
            Edge::S5G3 => "s5g3",
            Edge::HoldOff => "hold-off",
            Edge::ForceOff => "force-off",
            Edge::ForceRelease => "force-release",
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Board-supplied tables for every edge the engine drives.
#[derive(Copy, Clone, Debug)]
pub struct SequenceTables<O: 'static> {
    /// Standby supplies up, leaving hard off.
    pub g3s5: &'static [SequenceStep<O>],
    /// PMIC power-key pulse issued when the PMIC is not yet up.
    pub pmic_pulse: &'static [SequenceStep<O>],
    pub s5s3: &'static [SequenceStep<O>],
    pub s3s0: &'static [SequenceStep<O>],
    pub s0s3: &'static [SequenceStep<O>],
    pub s3s5: &'static [SequenceStep<O>],
    pub s5g3: &'static [SequenceStep<O>],
    /// Held in S5 while a forced shutdown waits for the PMIC to drop.
    pub hold_off: &'static [SequenceStep<O>],
    /// Last-resort PMIC reset when rails stay up entering G3.
    pub force_off: &'static [SequenceStep<O>],
    /// Undoes `force_off` once its hold time elapsed.
    pub force_release: &'static [SequenceStep<O>],
}

impl<O> SequenceTables<O> {
    #[must_use]
    pub const fn table(&self, edge: Edge) -> &'static [SequenceStep<O>] {
        match edge {
            Edge::G3S5 => self.g3s5,
            Edge::PmicPulse => self.pmic_pulse,
            Edge::S5S3 => self.s5s3,
            Edge::S3S0 => self.s3s0,
            Edge::S0S3 => self.s0s3,
            Edge::S3S5 => self.s3s5,
            Edge::S5G3 => self.s5g3,
            Edge::HoldOff => self.hold_off,
            Edge::ForceOff => self.force_off,
            Edge::ForceRelease => self.force_release,
        }
    }

    /// Length of the longest table; checked against [`MAX_SEQUENCE_STEPS`] in
    /// `const` context by board definitions.
    #[must_use]
    pub const fn longest(&self) -> usize {
        let mut longest = 0;
        let mut index = 0;
        while index < Edge::ALL.len() {
            let len = self.table(Edge::ALL[index]).len();
            if len > longest {
                longest = len;
            }
            index += 1;
        }
        longest
    }
}

/// Sum of the settle delays in `table`.
#[must_use]
pub fn total_delay<O>(table: &[SequenceStep<O>]) -> Duration {
    table.iter().map(|step| step.delay).sum()
}

/// Drives board output lines.
pub trait LineDriver {
    type Line: OutputLine;

    /// Sets `line` to the logical level implied by `action`.
    fn drive(&mut self, line: Self::Line, action: LineAction);
}

/// Runs `table` in declared order, sleeping each step's delay before moving on.
pub async fn run_sequence<D>(driver: &mut D, table: &[SequenceStep<D::Line>])
where
    D: Clock + LineDriver,
{
    for step in table {
        driver.drive(step.line, step.action);
        if !step.delay.is_zero() {
            driver.delay(step.delay).await;
        }
    }
}

/// Output levels a steady state implies, starting from the idle levels.
///
/// Transitional states report the levels of the state they leave. The PMIC
/// pulse table is skipped because it returns its line to idle.
#[must_use]
pub fn resting_levels<O: OutputLine>(
    outputs: &[OutputSpec<O>],
    tables: &SequenceTables<O>,
    state: PowerState,
) -> OutputLevels {
    let depth = match state.origin() {
        PowerState::S5 => 1,
        PowerState::S3 => 2,
        PowerState::S0 => 3,
        _ => 0,
    };

    [tables.g3s5, tables.s5s3, tables.s3s0]
        .iter()
        .take(depth)
        .flat_map(|table| table.iter())
        .fold(OutputLevels::idle(outputs), |levels, step| {
            levels.with(step.line, step.action)
        })
}
