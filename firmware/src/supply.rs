//! Supply-voltage charge gate.
//!
//! The reference board has no charger IC; the only thing that can stop a
//! boot is a sagging 3.3 V input. VDD is inferred from the internal voltage
//! reference against its factory calibration, then classified against the
//! [`SupplyThresholds`].

use chipset_core::charge::ChargeGate;

/// VREFINT calibration was taken with VDDA at 3.0 V.
pub const VREFINT_CAL_MV: u32 = 3_000;

/// Brown-out limits in millivolts.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SupplyThresholds {
    /// Below this the AP may not be powered on.
    pub boot_mv: u16,
    /// Below this the supply is failing and the system should stay down.
    pub critical_mv: u16,
}

impl SupplyThresholds {
    pub const DEFAULT: Self = Self {
        boot_mv: 3_100,
        critical_mv: 2_900,
    };
}

/// Converts a raw VREFINT reading into VDD millivolts.
#[must_use]
pub fn vdd_millivolts(calibration: u16, reading: u16) -> Option<u16> {
    if reading == 0 {
        return None;
    }
    let millivolts = VREFINT_CAL_MV * u32::from(calibration) / u32::from(reading);
    u16::try_from(millivolts).ok()
}

/// Source of VDD samples.
pub trait SupplyMonitor {
    fn sample_millivolts(&mut self) -> Option<u16>;
}

/// [`ChargeGate`] backed by a [`SupplyMonitor`].
pub struct SupplyGate<M> {
    monitor: M,
    thresholds: SupplyThresholds,
}

impl<M: SupplyMonitor> SupplyGate<M> {
    pub const fn new(monitor: M, thresholds: SupplyThresholds) -> Self {
        Self {
            monitor,
            thresholds,
        }
    }

    fn sample(&mut self) -> Option<u16> {
        self.monitor.sample_millivolts()
    }
}

impl<M: SupplyMonitor> ChargeGate for SupplyGate<M> {
    fn prevent_power_on(&mut self) -> bool {
        // An unreadable supply never blocks the boot.
        self.sample()
            .is_some_and(|millivolts| millivolts < self.thresholds.boot_mv)
    }

    fn want_shutdown(&mut self) -> bool {
        self.sample()
            .is_some_and(|millivolts| millivolts < self.thresholds.critical_mv)
    }
}

#[cfg(target_os = "none")]
pub use hw::VrefintAdc;

#[cfg(target_os = "none")]
mod hw {
    use core::ptr;

    use embassy_stm32::adc::{Adc, SampleTime, VrefInt};
    use embassy_stm32::peripherals::ADC1;

    use super::{SupplyMonitor, vdd_millivolts};

    /// Factory-programmed calibration constant sampled at 3.0 V.
    const VREFINT_CAL_ADDR: *const u16 = 0x1FFF_75AA as *const u16;

    fn read_vrefint_calibration() -> u16 {
        // SAFETY: fixed, always-readable system-memory address on STM32G0.
        unsafe { ptr::read_volatile(VREFINT_CAL_ADDR) }
    }

    /// Embassy ADC wrapper that produces successive VREFINT samples.
    pub struct VrefintAdc<'d> {
        adc: Adc<'d, ADC1>,
        channel: VrefInt,
        calibration: u16,
        discard_next: bool,
    }

    impl<'d> VrefintAdc<'d> {
        /// Constructs a new helper and enables the internal voltage reference.
        pub fn new(mut adc: Adc<'d, ADC1>) -> Self {
            adc.set_sample_time(SampleTime::CYCLES160_5);
            let channel = adc.enable_vrefint();
            Self {
                adc,
                channel,
                calibration: read_vrefint_calibration(),
                discard_next: true,
            }
        }
    }

    impl SupplyMonitor for VrefintAdc<'_> {
        fn sample_millivolts(&mut self) -> Option<u16> {
            // The first conversion after enabling VREFINT is unsettled.
            if self.discard_next {
                let _ = self.adc.blocking_read(&mut self.channel);
                self.discard_next = false;
            }
            let reading = self.adc.blocking_read(&mut self.channel);
            vdd_millivolts(self.calibration, reading)
        }
    }
}
