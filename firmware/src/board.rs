//! STM32G0 binding of the reference board.
//!
//! Inputs are polled GPIOs fed through the shared debouncer; outputs are
//! open-drain so a released line floats to the board's pull-up. The extra
//! power-key line gives the AP its view of the physical button.

#![cfg(target_os = "none")]

use core::time::Duration;

use chipset_core::board::reference::{PROFILE, PowerInput, PowerOutput};
use chipset_core::board::{Board, BoardProfile, ChipsetInterrupt, InterruptSet};
use chipset_core::hooks::{ChipsetHook, HookRegistry, RegistryFull};
use chipset_core::sequences::LineDriver;
use chipset_core::signals::debounce::DEFAULT_SETTLE;
use chipset_core::signals::{LineAction, SignalMask, SignalReader, SignalSource};
use chipset_core::telemetry::PowerEvent;
use chipset_core::timer::Clock;
use embassy_stm32::gpio::{Input, OutputOpenDrain};
use embassy_time::Timer;

use crate::instant::{FirmwareInstant, to_embassy};
use crate::telemetry;

const HOOK_SLOTS: usize = 4;

pub struct Stm32Board<'d> {
    inputs: [Input<'d>; PowerInput::COUNT],
    outputs: [OutputOpenDrain<'d>; PowerOutput::COUNT],
    power_key: OutputOpenDrain<'d>,
    reader: SignalReader<FirmwareInstant, { PowerInput::COUNT }>,
    hooks: HookRegistry<HOOK_SLOTS>,
    armed: InterruptSet,
}

impl<'d> Stm32Board<'d> {
    /// `inputs` and `outputs` follow the order of the reference tables.
    pub fn new(
        inputs: [Input<'d>; PowerInput::COUNT],
        outputs: [OutputOpenDrain<'d>; PowerOutput::COUNT],
        power_key: OutputOpenDrain<'d>,
    ) -> Self {
        let raw = raw_levels(&inputs);
        let reader = SignalReader::new(PROFILE.inputs, raw, FirmwareInstant::now(), DEFAULT_SETTLE);
        Self {
            inputs,
            outputs,
            power_key,
            reader,
            hooks: HookRegistry::new(),
            armed: InterruptSet::EMPTY,
        }
    }

    /// Registers a listener for a chipset hook.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryFull`] when every slot is taken.
    pub fn register_hook(&mut self, hook: ChipsetHook, listener: fn()) -> Result<(), RegistryFull> {
        self.hooks.register(hook, listener)
    }
}

fn raw_levels(inputs: &[Input<'_>]) -> u32 {
    inputs
        .iter()
        .enumerate()
        .fold(0, |raw, (index, pin)| {
            if pin.is_high() { raw | (1 << index) } else { raw }
        })
}

impl Clock for Stm32Board<'_> {
    type Instant = FirmwareInstant;

    fn now(&self) -> FirmwareInstant {
        FirmwareInstant::now()
    }

    async fn delay(&mut self, duration: Duration) {
        Timer::after(to_embassy(duration)).await;
    }
}

impl SignalSource for Stm32Board<'_> {
    fn read_mask(&mut self) -> SignalMask {
        let raw = raw_levels(&self.inputs);
        let _ = self.reader.update(raw, FirmwareInstant::now());
        self.reader.read_mask()
    }
}

impl LineDriver for Stm32Board<'_> {
    type Line = PowerOutput;

    fn drive(&mut self, line: PowerOutput, action: LineAction) {
        let spec = &PROFILE.outputs[line as usize];
        let pin = &mut self.outputs[line as usize];
        if spec.polarity.level_for(action) {
            pin.set_high();
        } else {
            pin.set_low();
        }
    }
}

impl Board for Stm32Board<'_> {
    fn profile(&self) -> &'static BoardProfile<PowerOutput> {
        &PROFILE
    }

    fn set_interrupt(&mut self, irq: ChipsetInterrupt, enabled: bool) {
        let set = InterruptSet::of(&[irq]);
        self.armed = if enabled {
            self.armed.union(set)
        } else {
            self.armed.without(set)
        };
        defmt::debug!(
            "chipset: {} {}",
            defmt::Debug2Format(&irq),
            if enabled { "armed" } else { "disarmed" }
        );
    }

    fn notify(&mut self, hook: ChipsetHook) {
        telemetry::hook(hook, FirmwareInstant::now());
        self.hooks.notify(hook);
    }

    fn record(&mut self, at: FirmwareInstant, event: PowerEvent) {
        telemetry::record(event, at);
    }

    fn power_key(&mut self, asserted: bool) {
        // Open drain, active low.
        if asserted {
            self.power_key.set_low();
        } else {
            self.power_key.set_high();
        }
    }
}
