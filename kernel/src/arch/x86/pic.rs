//! 8259 PIC remap and EOI, via the `pic8259` crate. Remapped to vectors
//! 32-47 so they do not collide with CPU exception vectors 0-31 or the
//! syscall vector 0x80.

use pic8259::ChainedPics;
use spin::Mutex;

pub const PIC_1_OFFSET: u8 = 32;
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

pub static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

/// Remaps the PICs and masks every line except IRQ0 (timer) and IRQ1
/// (keyboard) -- this core has no other driven hardware interrupts.
///
/// # Safety
/// Must run once during early boot with interrupts disabled.
pub unsafe fn init() {
    unsafe {
        PICS.lock().initialize();
        PICS.lock().write_masks(0b1111_1100, 0b1111_1111);
    }
}

#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum Irq {
    Timer = PIC_1_OFFSET,
    Keyboard = PIC_1_OFFSET + 1,
}

/// Signals end-of-interrupt for `irq` so the PIC delivers further
/// interrupts on that (and lower-priority) line.
pub fn end_of_interrupt(irq: Irq) {
    unsafe {
        PICS.lock().notify_end_of_interrupt(irq as u8);
    }
}
