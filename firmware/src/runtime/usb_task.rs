use embassy_futures::join::join;
use embassy_futures::select::{Either, select};
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_usb::class::cdc_acm::{ControlChanged, Receiver, Sender};
use embassy_usb::driver::EndpointError;
use heapless::String;

use super::USB_STORAGE;
use super::console_target::ChannelTarget;
use crate::console::ConsoleSession;
use crate::usb::{self, UsbDeviceStrings};

/// Room for the longest reply (`help` or a full `siglog`).
const OUTPUT_CAPACITY: usize = 2048;

type Output = String<OUTPUT_CAPACITY>;

embassy_stm32::bind_interrupts!(struct UsbIrqs {
    USB_UCPD1_2 => embassy_stm32::usb::InterruptHandler<hal::peripherals::USB>;
});

#[embassy_executor::task]
pub async fn run(
    usb: Peri<'static, hal::peripherals::USB>,
    dp: Peri<'static, hal::peripherals::PA12>,
    dm: Peri<'static, hal::peripherals::PA11>,
) -> ! {
    let storage = USB_STORAGE.init(usb::UsbDeviceStorage::new());
    let driver = embassy_stm32::usb::Driver::new(usb, UsbIrqs, dp, dm);

    let usb::UsbConsoleDevice {
        mut device,
        console,
    } = usb::UsbConsoleDevice::new(driver, storage, UsbDeviceStrings::default());

    join(
        device.run(),
        run_console(console.sender, console.receiver, console.control),
    )
    .await;
    loop {
        core::future::pending::<()>().await;
    }
}

async fn run_console<D>(
    mut sender: Sender<'static, D>,
    mut receiver: Receiver<'static, D>,
    control: ControlChanged<'static>,
) -> !
where
    D: embassy_usb::driver::Driver<'static>,
{
    let mut session = ConsoleSession::new(ChannelTarget);
    let mut ingress = [0u8; usb::MAX_PACKET_SIZE as usize];
    let mut output = Output::new();

    loop {
        join(receiver.wait_connection(), sender.wait_connection()).await;
        wait_for_dtr(&control, &sender).await;

        defmt::info!("usb: console connected");
        output.clear();
        if session.on_connect(&mut output).is_err() {
            defmt::warn!("usb: console output truncated");
        }

        loop {
            if flush(&mut sender, &mut output).await.is_err() {
                break;
            }

            match select(receiver.read_packet(&mut ingress), control.control_changed()).await {
                Either::First(Ok(count)) => {
                    if session.ingest(&ingress[..count], &mut output).is_err() {
                        defmt::warn!("usb: console output truncated");
                    }
                }
                Either::First(Err(EndpointError::Disabled)) => {
                    defmt::warn!("usb: console interface disabled");
                    break;
                }
                Either::First(Err(_)) => {
                    defmt::warn!("usb: console read error");
                }
                Either::Second(()) => {
                    if !sender.dtr() {
                        defmt::warn!("usb: console host dropped DTR");
                        break;
                    }
                }
            }
        }

        session.on_disconnect();
    }
}

/// Sends `output` in packet-sized chunks and clears it.
async fn flush<D>(sender: &mut Sender<'static, D>, output: &mut Output) -> Result<(), EndpointError>
where
    D: embassy_usb::driver::Driver<'static>,
{
    let packet = usize::from(usb::MAX_PACKET_SIZE);
    let bytes = output.as_bytes();
    for chunk in bytes.chunks(packet) {
        sender.write_packet(chunk).await?;
    }
    // A full final packet needs a zero-length packet to end the transfer.
    if !bytes.is_empty() && bytes.len() % packet == 0 {
        sender.write_packet(&[]).await?;
    }
    output.clear();
    Ok(())
}

async fn wait_for_dtr<D>(control: &ControlChanged<'static>, sender: &Sender<'static, D>)
where
    D: embassy_usb::driver::Driver<'static>,
{
    while !sender.dtr() {
        control.control_changed().await;
    }
}
