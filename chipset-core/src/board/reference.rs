//! Reference board: an ARM SoC with a single PMIC behind one power key.
//!
//! The PMIC is started by pulsing its enable line, held off by keeping that
//! line asserted, and killed outright through its force-reset line. The AP is
//! held in reset until its rails are good.

use core::time::Duration;

use super::{
    ApLines, BoardProfile, ChipsetInterrupt, EdgeInterrupts, InterruptSet, PowerMasks,
    PowerTimings,
};
use crate::sequences::{MAX_SEQUENCE_STEPS, SequenceStep, SequenceTables};
use crate::signals::{InputSpec, LineAction, OutputLine, OutputSpec, Polarity, SignalMask};

/// Logical inputs; the discriminant is the signal-mask bit.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerInput {
    PmicPwrGood,
    Pp1800S5PwrGood,
    ApInS3L,
    ApEcWatchdogL,
    WarmResetReq,
    ApShutdownReqL,
}

impl PowerInput {
    pub const COUNT: usize = 6;

    pub const ALL: [PowerInput; Self::COUNT] = [
        PowerInput::PmicPwrGood,
        PowerInput::Pp1800S5PwrGood,
        PowerInput::ApInS3L,
        PowerInput::ApEcWatchdogL,
        PowerInput::WarmResetReq,
        PowerInput::ApShutdownReqL,
    ];

    pub const fn as_index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn mask(self) -> SignalMask {
        SignalMask::bit(self.as_index())
    }
}

/// Logical outputs; the discriminant is the output-level bit.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerOutput {
    PmicEnOdl,
    PmicForceResetOdl,
    EnPp1800S5L,
    PmicWatchdogL,
    ApSysRstL,
}

impl PowerOutput {
    pub const COUNT: usize = 5;

    pub const ALL: [PowerOutput; Self::COUNT] = [
        PowerOutput::PmicEnOdl,
        PowerOutput::PmicForceResetOdl,
        PowerOutput::EnPp1800S5L,
        PowerOutput::PmicWatchdogL,
        PowerOutput::ApSysRstL,
    ];
}

impl OutputLine for PowerOutput {
    fn index(self) -> usize {
        self as usize
    }
}

pub const INPUTS: [InputSpec; PowerInput::COUNT] = [
    InputSpec::new("PMIC_PWR_GOOD", "PA0", Polarity::ActiveHigh),
    InputSpec::new("PP1800_S5_PGOOD", "PA1", Polarity::ActiveHigh),
    InputSpec::new("AP_IN_S3_L", "PA6", Polarity::ActiveLow),
    InputSpec::new("AP_EC_WATCHDOG_L", "PA7", Polarity::ActiveLow),
    InputSpec::new("WARM_RESET_REQ", "PB0", Polarity::ActiveHigh),
    InputSpec::new("AP_SHUTDOWN_REQ_L", "PB1", Polarity::ActiveLow),
];

pub const OUTPUTS: [OutputSpec<PowerOutput>; PowerOutput::COUNT] = [
    OutputSpec::new(
        PowerOutput::PmicEnOdl,
        "PMIC_EN_ODL",
        "PA2",
        Polarity::ActiveLow,
        LineAction::Deassert,
    ),
    OutputSpec::new(
        PowerOutput::PmicForceResetOdl,
        "PMIC_FORCE_RESET_ODL",
        "PA3",
        Polarity::ActiveLow,
        LineAction::Deassert,
    ),
    OutputSpec::new(
        PowerOutput::EnPp1800S5L,
        "EN_PP1800_S5_L",
        "PA4",
        Polarity::ActiveLow,
        LineAction::Deassert,
    ),
    OutputSpec::new(
        PowerOutput::PmicWatchdogL,
        "PMIC_WATCHDOG_L",
        "PA5",
        Polarity::ActiveLow,
        LineAction::Assert,
    ),
    OutputSpec::new(
        PowerOutput::ApSysRstL,
        "AP_SYS_RST_L",
        "PB2",
        Polarity::ActiveLow,
        LineAction::Assert,
    ),
];

/// Width of the PMIC power-key pulse.
pub const PMIC_EN_PULSE_MS: u64 = 50;

const G3S5: [SequenceStep<PowerOutput>; 2] = [
    SequenceStep::deassert(PowerOutput::PmicForceResetOdl, 0),
    SequenceStep::assert(PowerOutput::EnPp1800S5L, 0),
];

const PMIC_PULSE: [SequenceStep<PowerOutput>; 3] = [
    SequenceStep::deassert(PowerOutput::PmicEnOdl, PMIC_EN_PULSE_MS),
    SequenceStep::assert(PowerOutput::PmicEnOdl, PMIC_EN_PULSE_MS),
    SequenceStep::deassert(PowerOutput::PmicEnOdl, 0),
];

const S5S3: [SequenceStep<PowerOutput>; 2] = [
    // Release the PMIC watchdog, then the AP.
    SequenceStep::deassert(PowerOutput::PmicWatchdogL, 0),
    SequenceStep::deassert(PowerOutput::ApSysRstL, 2),
];

const S3S5: [SequenceStep<PowerOutput>; 2] = [
    SequenceStep::assert(PowerOutput::ApSysRstL, 0),
    // PMIC debounces its watchdog input for about 1.6 ms.
    SequenceStep::assert(PowerOutput::PmicWatchdogL, 3),
];

const S5G3: [SequenceStep<PowerOutput>; 2] = [
    SequenceStep::deassert(PowerOutput::PmicEnOdl, 0),
    SequenceStep::deassert(PowerOutput::EnPp1800S5L, 0),
];

const HOLD_OFF: [SequenceStep<PowerOutput>; 1] = [SequenceStep::assert(PowerOutput::PmicEnOdl, 0)];

const FORCE_OFF: [SequenceStep<PowerOutput>; 1] =
    [SequenceStep::assert(PowerOutput::PmicForceResetOdl, 5)];

const FORCE_RELEASE: [SequenceStep<PowerOutput>; 1] =
    [SequenceStep::deassert(PowerOutput::PmicForceResetOdl, 0)];

pub const TABLES: SequenceTables<PowerOutput> = SequenceTables {
    g3s5: &G3S5,
    pmic_pulse: &PMIC_PULSE,
    s5s3: &S5S3,
    s3s0: &[],
    s0s3: &[],
    s3s5: &S3S5,
    s5g3: &S5G3,
    hold_off: &HOLD_OFF,
    force_off: &FORCE_OFF,
    force_release: &FORCE_RELEASE,
};

const PMIC_MASK: SignalMask = PowerInput::PmicPwrGood.mask();

pub const MASKS: PowerMasks = PowerMasks {
    pmic: PMIC_MASK,
    standby: PowerInput::Pp1800S5PwrGood.mask(),
    pgood_s3: PMIC_MASK,
    pgood_s0: PMIC_MASK,
    suspend: PowerInput::ApInS3L.mask(),
};

pub const TIMINGS: PowerTimings = PowerTimings {
    standby_timeout: Duration::from_millis(100),
    ..PowerTimings::DEFAULT
};

pub const PROFILE: BoardProfile<PowerOutput> = BoardProfile {
    name: "reference",
    inputs: &INPUTS,
    outputs: &OUTPUTS,
    tables: TABLES,
    masks: MASKS,
    timings: TIMINGS,
    edge_interrupts: EdgeInterrupts {
        s5s3: InterruptSet::of(&[ChipsetInterrupt::ApWatchdog]),
        s3s0: InterruptSet::of(&[ChipsetInterrupt::WarmReset, ChipsetInterrupt::ApShutdown]),
    },
    ap_lines: ApLines {
        watchdog: PowerInput::ApEcWatchdogL.mask(),
        warm_reset: PowerInput::WarmResetReq.mask(),
        shutdown: PowerInput::ApShutdownReqL.mask(),
        ec_reset_outputs: &[PowerOutput::PmicWatchdogL, PowerOutput::ApSysRstL],
    },
};

const fn outputs_in_order() -> bool {
    let mut index = 0;
    while index < OUTPUTS.len() {
        if OUTPUTS[index].line as usize != index {
            return false;
        }
        index += 1;
    }
    true
}

const fn table_lines_declared(table: &[SequenceStep<PowerOutput>]) -> bool {
    let mut index = 0;
    while index < table.len() {
        if table[index].line as usize >= PowerOutput::COUNT {
            return false;
        }
        index += 1;
    }
    true
}

const _: () = assert!(INPUTS.len() == PowerInput::ALL.len());
const _: () = assert!(PowerInput::ALL[PowerInput::COUNT - 1].as_index() == PowerInput::COUNT - 1);
const _: () = assert!(PowerInput::COUNT <= crate::signals::MAX_SIGNALS);
const _: () = assert!(outputs_in_order());
const _: () = assert!(TABLES.longest() <= MAX_SEQUENCE_STEPS);
const _: () = assert!(
    table_lines_declared(&G3S5)
        && table_lines_declared(&PMIC_PULSE)
        && table_lines_declared(&S5S3)
        && table_lines_declared(&S3S5)
        && table_lines_declared(&S5G3)
        && table_lines_declared(&HOLD_OFF)
        && table_lines_declared(&FORCE_OFF)
        && table_lines_declared(&FORCE_RELEASE)
);
