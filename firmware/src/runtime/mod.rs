use chipset_core::board::reference::{PowerInput, PowerOutput};
use chipset_core::hooks::ChipsetHook;
use chipset_core::power::{ChipsetEngine, ChipsetRequest};
use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::adc::Adc;
use embassy_stm32::gpio::{Input, Level, OutputOpenDrain, Pull, Speed};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use static_cell::StaticCell;

use crate::board::Stm32Board;
use crate::jump;
use crate::supply::{SupplyGate, SupplyThresholds, VrefintAdc};
use crate::telemetry;
use crate::usb;

mod chipset_task;
mod console_target;
mod usb_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

/// Depth of the request queue feeding the chipset task.
pub const REQUEST_QUEUE_DEPTH: usize = 8;

pub(super) type RequestQueue =
    Channel<CriticalSectionRawMutex, ChipsetRequest, REQUEST_QUEUE_DEPTH>;

pub(super) static REQUESTS: RequestQueue = Channel::new();
pub(super) static USB_STORAGE: StaticCell<usb::UsbDeviceStorage> = StaticCell::new();

pub(super) type FirmwareEngine =
    ChipsetEngine<Stm32Board<'static>, SupplyGate<VrefintAdc<'static>>>;

fn log_rails_up() {
    defmt::info!("chipset: AP rails up");
}

fn log_rails_down() {
    defmt::info!("chipset: AP rails down");
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA1,
        PA2,
        PA3,
        PA4,
        PA5,
        PA6,
        PA7,
        PB0,
        PB1,
        PB2,
        PB3,
        ADC1,
        USB,
        PA11,
        PA12,
        ..
    } = hal::init(config);

    let boot = jump::boot_context();

    // Order matches `PowerInput::ALL`.
    let inputs: [Input<'static>; PowerInput::COUNT] = [
        Input::new(PA0, Pull::None),
        Input::new(PA1, Pull::None),
        Input::new(PA6, Pull::Up),
        Input::new(PA7, Pull::Up),
        Input::new(PB0, Pull::Down),
        Input::new(PB1, Pull::Up),
    ];
    // Released until the engine picks the resting levels. Order matches
    // `PowerOutput::ALL`.
    let outputs: [OutputOpenDrain<'static>; PowerOutput::COUNT] = [
        OutputOpenDrain::new(PA2, Level::High, Speed::Low),
        OutputOpenDrain::new(PA3, Level::High, Speed::Low),
        OutputOpenDrain::new(PA4, Level::High, Speed::Low),
        OutputOpenDrain::new(PA5, Level::High, Speed::Low),
        OutputOpenDrain::new(PB2, Level::High, Speed::Low),
    ];
    let power_key = OutputOpenDrain::new(PB3, Level::High, Speed::Low);

    let mut board = Stm32Board::new(inputs, outputs, power_key);
    board
        .register_hook(ChipsetHook::Startup, log_rails_up)
        .expect("hook registration");
    board
        .register_hook(ChipsetHook::ShutdownComplete, log_rails_down)
        .expect("hook registration");

    let gate = SupplyGate::new(VrefintAdc::new(Adc::new(ADC1)), SupplyThresholds::DEFAULT);
    let mut engine = FirmwareEngine::new(board, gate);
    let state = engine.init(boot.cause, boot.chipset, boot.button);
    telemetry::boot(boot.cause.label(), state);

    spawner
        .spawn(chipset_task::run(engine))
        .expect("failed to spawn chipset task");

    spawner
        .spawn(usb_task::run(USB, PA12, PA11))
        .expect("failed to spawn USB task");

    core::future::pending::<()>().await;
}
