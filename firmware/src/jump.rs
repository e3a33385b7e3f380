//! Warm-restart handoff and reset-cause detection.
//!
//! Before a sysjump the console stages the engine's jump tags in a RAM area
//! the runtime never initialises, then resets the core. The next boot finds
//! the magic word, consumes the tags and resumes instead of cold booting.

#![cfg(target_os = "none")]

use core::mem::MaybeUninit;
use core::ptr::{self, addr_of_mut};

use chipset_core::persist::{ButtonJumpState, ChipsetJumpState, JumpDataError, JumpTags};
use chipset_core::power::ResetCause;
use embassy_stm32::pac;

/// "JUMP" in ASCII.
const JUMP_MAGIC: u32 = 0x4a55_4d50;
pub const JUMP_CAPACITY: usize = 32;

pub type FirmwareJumpTags = JumpTags<JUMP_CAPACITY>;

#[repr(C)]
struct JumpArea {
    magic: u32,
    len: u32,
    bytes: [u8; JUMP_CAPACITY],
}

#[unsafe(link_section = ".uninit.JUMP_AREA")]
static mut JUMP_AREA: MaybeUninit<JumpArea> = MaybeUninit::uninit();

/// What the previous image left behind.
pub struct BootContext {
    pub cause: ResetCause,
    pub chipset: Option<ChipsetJumpState>,
    pub button: Option<ButtonJumpState>,
}

/// Stores the tags and resets the core.
///
/// # Errors
///
/// Returns [`JumpDataError`] when the state does not fit; nothing is reset.
pub fn sysjump(chipset: ChipsetJumpState, button: ButtonJumpState) -> Result<(), JumpDataError> {
    let mut tags = FirmwareJumpTags::new();
    chipset.save(&mut tags)?;
    button.save(&mut tags)?;

    let encoded = tags.as_bytes();
    let mut bytes = [0; JUMP_CAPACITY];
    bytes[..encoded.len()].copy_from_slice(encoded);
    let area = JumpArea {
        magic: JUMP_MAGIC,
        len: u32::try_from(encoded.len()).map_err(|_| JumpDataError::Oversize)?,
        bytes,
    };
    // SAFETY: single writer; the core resets immediately afterwards.
    unsafe {
        ptr::write_volatile(addr_of_mut!(JUMP_AREA).cast::<JumpArea>(), area);
    }
    cortex_m::asm::dsb();
    cortex_m::peripheral::SCB::sys_reset();
}

/// Determines why this image started and consumes any staged jump tags.
pub fn boot_context() -> BootContext {
    // SAFETY: read once at boot before any other task runs.
    let area = unsafe { ptr::read_volatile(addr_of_mut!(JUMP_AREA).cast::<JumpArea>()) };
    // SAFETY: `magic` is the first field of the `repr(C)` area. Clearing it
    // makes the tags single-use.
    unsafe {
        ptr::write_volatile(addr_of_mut!(JUMP_AREA).cast::<u32>(), 0);
    }

    let csr = pac::RCC.csr().read();
    let pin_reset = csr.pinrstf() && !csr.pwrrstf();
    pac::RCC.csr().modify(|w| w.set_rmvf(true));

    if area.magic == JUMP_MAGIC {
        let len = usize::try_from(area.len).unwrap_or(usize::MAX);
        let tags = area
            .bytes
            .get(..len)
            .and_then(|bytes| FirmwareJumpTags::decode(bytes).ok());
        if let Some(tags) = tags {
            return BootContext {
                cause: ResetCause::Sysjump,
                chipset: ChipsetJumpState::restore(&tags),
                button: ButtonJumpState::restore(&tags),
            };
        }
        defmt::warn!("jump: discarding corrupt tags");
    }

    BootContext {
        cause: if pin_reset {
            ResetCause::ResetPin
        } else {
            ResetCause::PowerOn
        },
        chipset: None,
        button: None,
    }
}
