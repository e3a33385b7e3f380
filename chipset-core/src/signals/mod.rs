//! Power signal tables and the debounced signal reader.
//!
//! Boards declare their inputs as a `'static` slice of [`InputSpec`]; an
//! input's position in that slice is its bit in every [`SignalMask`]. Outputs
//! are declared the same way through [`OutputSpec`] and addressed by a
//! board-defined enum implementing [`OutputLine`].

use core::fmt;
use core::time::Duration;

use crate::timer::{Clock, EngineInstant};

pub mod debounce;

pub use debounce::{DEFAULT_SETTLE, Debouncer};

/// Largest signal table a board may declare.
pub const MAX_SIGNALS: usize = 32;

/// Interval between samples while waiting on a signal.
pub const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Bitmask of asserted logical input signals.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct SignalMask(u32);

impl SignalMask {
    pub const EMPTY: Self = Self(0);

    /// Wraps raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Mask with only `index` set.
    #[must_use]
    pub const fn bit(index: usize) -> Self {
        Self(1 << index)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` when every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` when `self` and `other` share at least one bit.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn is_set(self, index: usize) -> bool {
        self.0 & (1 << index) != 0
    }

    #[must_use]
    pub const fn with(self, index: usize, set: bool) -> Self {
        if set {
            Self(self.0 | (1 << index))
        } else {
            Self(self.0 & !(1 << index))
        }
    }

    /// Bits that differ between two snapshots.
    #[must_use]
    pub const fn changed(self, other: Self) -> Self {
        Self(self.0 ^ other.0)
    }
}

impl fmt::Debug for SignalMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignalMask({:#06x})", self.0)
    }
}

impl fmt::Display for SignalMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// Electrical polarity of a line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Polarity {
    ActiveHigh,
    ActiveLow,
}

impl Polarity {
    /// Converts a physical level into the logical asserted flag.
    #[must_use]
    pub const fn is_asserted(self, level_high: bool) -> bool {
        match self {
            Polarity::ActiveHigh => level_high,
            Polarity::ActiveLow => !level_high,
        }
    }

    /// Physical level that corresponds to the logical action.
    #[must_use]
    pub const fn level_for(self, action: LineAction) -> bool {
        match (self, action) {
            (Polarity::ActiveHigh, LineAction::Assert)
            | (Polarity::ActiveLow, LineAction::Deassert) => true,
            (Polarity::ActiveHigh, LineAction::Deassert)
            | (Polarity::ActiveLow, LineAction::Assert) => false,
        }
    }
}

/// Metadata describing how an input signal is routed on the board.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct InputSpec {
    pub name: &'static str,
    pub pin: &'static str,
    pub polarity: Polarity,
}

impl InputSpec {
    pub const fn new(name: &'static str, pin: &'static str, polarity: Polarity) -> Self {
        Self {
            name,
            pin,
            polarity,
        }
    }
}

/// Logical action applied to an output line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LineAction {
    Assert,
    Deassert,
}

impl LineAction {
    #[must_use]
    pub const fn is_assert(self) -> bool {
        matches!(self, LineAction::Assert)
    }

    #[must_use]
    pub const fn from_asserted(asserted: bool) -> Self {
        if asserted {
            LineAction::Assert
        } else {
            LineAction::Deassert
        }
    }

    /// Opposite action, used to undo a held step.
    #[must_use]
    pub const fn inverse(self) -> Self {
        match self {
            LineAction::Assert => LineAction::Deassert,
            LineAction::Deassert => LineAction::Assert,
        }
    }
}

impl fmt::Display for LineAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineAction::Assert => f.write_str("assert"),
            LineAction::Deassert => f.write_str("deassert"),
        }
    }
}

/// Board output identifier.
pub trait OutputLine: Copy + Eq + fmt::Debug + 'static {
    /// Deterministic index into the board's output table.
    fn index(self) -> usize;
}

/// Metadata describing how an output line is routed on the board.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OutputSpec<O> {
    pub line: O,
    pub name: &'static str,
    pub pin: &'static str,
    pub polarity: Polarity,
    /// Level the line rests at while the chipset is hard off.
    pub idle: LineAction,
}

impl<O> OutputSpec<O> {
    pub const fn new(
        line: O,
        name: &'static str,
        pin: &'static str,
        polarity: Polarity,
        idle: LineAction,
    ) -> Self {
        Self {
            line,
            name,
            pin,
            polarity,
            idle,
        }
    }
}

/// Logical levels of every output, one bit per output index (1 == asserted).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct OutputLevels(u32);

impl OutputLevels {
    /// Levels every output rests at while hard off.
    #[must_use]
    pub fn idle<O: OutputLine>(outputs: &[OutputSpec<O>]) -> Self {
        outputs.iter().fold(Self(0), |levels, spec| {
            levels.with(spec.line, spec.idle)
        })
    }

    #[must_use]
    pub fn with<O: OutputLine>(self, line: O, action: LineAction) -> Self {
        let bit = 1 << line.index();
        if action.is_assert() {
            Self(self.0 | bit)
        } else {
            Self(self.0 & !bit)
        }
    }

    pub fn apply<O: OutputLine>(&mut self, line: O, action: LineAction) {
        *self = self.with(line, action);
    }

    #[must_use]
    pub fn is_asserted<O: OutputLine>(self, line: O) -> bool {
        self.0 & (1 << line.index()) != 0
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

/// How a wait compares the live mask against the wanted bits.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MatchKind {
    /// Every wanted bit is asserted.
    AllSet,
    /// At least one wanted bit is deasserted.
    AnyClear,
    /// Every wanted bit is deasserted.
    AllClear,
}

impl MatchKind {
    #[must_use]
    pub const fn matches(self, live: SignalMask, want: SignalMask) -> bool {
        match self {
            MatchKind::AllSet => live.contains(want),
            MatchKind::AnyClear => !live.contains(want),
            MatchKind::AllClear => !live.intersects(want),
        }
    }
}

/// The wanted signals did not reach the requested level in time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WaitTimeout {
    pub want: SignalMask,
    pub kind: MatchKind,
    pub got: SignalMask,
}

impl fmt::Display for WaitTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timeout waiting for {:?} of {} (have {})",
            self.kind, self.want, self.got
        )
    }
}

/// Anything that can report a debounced signal snapshot.
///
/// Interrupt-driven and polled inputs both surface here; callers never learn
/// which mechanism produced an edge.
pub trait SignalSource: Clock {
    /// Samples the inputs and returns the debounced snapshot.
    fn read_mask(&mut self) -> SignalMask;
}

/// Polls `source` until the wanted signals match or `timeout` elapses.
///
/// # Errors
///
/// Returns [`WaitTimeout`] with the last snapshot when the deadline passes.
pub async fn wait_for<S>(
    source: &mut S,
    want: SignalMask,
    kind: MatchKind,
    timeout: Duration,
) -> Result<(), WaitTimeout>
where
    S: SignalSource,
{
    let deadline = source.now() + timeout;
    loop {
        let live = source.read_mask();
        if kind.matches(live, want) {
            return Ok(());
        }
        if source.now() >= deadline {
            return Err(WaitTimeout {
                want,
                kind,
                got: live,
            });
        }
        source.delay(SIGNAL_POLL_INTERVAL).await;
    }
}

/// Converts raw pin levels into a debounced logical snapshot.
pub struct SignalReader<I, const N: usize> {
    inputs: &'static [InputSpec],
    debouncer: Debouncer<I, N>,
}

impl<I, const N: usize> SignalReader<I, N>
where
    I: EngineInstant,
{
    /// Creates a reader seeded with the first raw sample.
    ///
    /// `raw_high` carries one bit per input, set when the pin reads high.
    #[must_use]
    pub fn new(inputs: &'static [InputSpec], raw_high: u32, now: I, settle: Duration) -> Self {
        let logical = logical_mask(inputs, raw_high);
        Self {
            inputs,
            debouncer: Debouncer::new(logical, now, settle),
        }
    }

    /// Feeds a raw sample. Returns the new stable snapshot when it changed.
    pub fn update(&mut self, raw_high: u32, now: I) -> Option<SignalMask> {
        let logical = logical_mask(self.inputs, raw_high);
        self.debouncer.update(logical, now)
    }

    /// Last debounced snapshot.
    #[must_use]
    pub fn read_mask(&self) -> SignalMask {
        self.debouncer.stable()
    }

    /// Input metadata backing this reader.
    #[must_use]
    pub fn inputs(&self) -> &'static [InputSpec] {
        self.inputs
    }
}

/// Applies per-input polarity to a raw level mask.
#[must_use]
pub fn logical_mask(inputs: &[InputSpec], raw_high: u32) -> SignalMask {
    inputs
        .iter()
        .enumerate()
        .fold(SignalMask::EMPTY, |mask, (index, spec)| {
            let high = raw_high & (1 << index) != 0;
            mask.with(index, spec.polarity.is_asserted(high))
        })
}

/// Renders the names of the set bits, space separated.
pub struct MaskNames<'a> {
    pub inputs: &'a [InputSpec],
    pub mask: SignalMask,
}

impl fmt::Display for MaskNames<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (index, spec) in self.inputs.iter().enumerate() {
            if self.mask.is_set(index) {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(spec.name)?;
                first = false;
            }
        }
        if first {
            f.write_str("-")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUTS: [InputSpec; 3] = [
        InputSpec::new("PGOOD", "PA0", Polarity::ActiveHigh),
        InputSpec::new("SUSPEND_L", "PA1", Polarity::ActiveLow),
        InputSpec::new("WDOG_L", "PA2", Polarity::ActiveLow),
    ];

    #[test]
    fn polarity_maps_levels() {
        assert!(Polarity::ActiveHigh.is_asserted(true));
        assert!(Polarity::ActiveLow.is_asserted(false));
        assert!(Polarity::ActiveLow.level_for(LineAction::Deassert));
        assert!(!Polarity::ActiveLow.level_for(LineAction::Assert));
    }

    #[test]
    fn logical_mask_applies_polarity() {
        // PGOOD high, SUSPEND_L high (deasserted), WDOG_L low (asserted).
        let mask = logical_mask(&INPUTS, 0b011);
        assert_eq!(mask, SignalMask::from_bits(0b101));
    }

    #[test]
    fn match_kinds_compare_masks() {
        let want = SignalMask::from_bits(0b11);
        assert!(MatchKind::AllSet.matches(SignalMask::from_bits(0b111), want));
        assert!(!MatchKind::AllSet.matches(SignalMask::from_bits(0b01), want));
        assert!(MatchKind::AnyClear.matches(SignalMask::from_bits(0b01), want));
        assert!(!MatchKind::AllClear.matches(SignalMask::from_bits(0b01), want));
        assert!(MatchKind::AllClear.matches(SignalMask::from_bits(0b100), want));
    }

    #[test]
    fn mask_names_lists_asserted_inputs() {
        let names = MaskNames {
            inputs: &INPUTS,
            mask: SignalMask::from_bits(0b101),
        };
        let mut buffer = heapless::String::<32>::new();
        core::fmt::write(&mut buffer, format_args!("{names}")).expect("fits");
        assert_eq!(buffer.as_str(), "PGOOD WDOG_L");
    }
}
