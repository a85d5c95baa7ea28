//! PIT (8254) programmed for a 100 Hz (10 ms) tick, the external timer
//! source the scheduler and context-switch machinery consume.

use core::sync::atomic::{AtomicU64, Ordering};

use super::pic::{self, Irq};

const PIT_FREQUENCY_HZ: u32 = 1_193_182;
const TARGET_HZ: u32 = 100;
const PIT_CHANNEL0: u16 = 0x40;
const PIT_COMMAND: u16 = 0x43;

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Programs PIT channel 0 for `TARGET_HZ` and unmasks IRQ0.
///
/// # Safety
/// Must run once during early boot, after the PIC has been remapped.
pub unsafe fn init() {
    let divisor = (PIT_FREQUENCY_HZ / TARGET_HZ) as u16;
    unsafe {
        super::outb(PIT_COMMAND, 0x36); // channel 0, lobyte/hibyte, mode 3 (square wave)
        super::outb(PIT_CHANNEL0, (divisor & 0xFF) as u8);
        super::outb(PIT_CHANNEL0, (divisor >> 8) as u8);
    }
}

/// Monotone tick counter; one tick = 10 ms. Read by `sched::scheduler` to
/// decide which sleepers have woken (`wake_tick <= ticks`).
pub fn get_ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Converts a millisecond duration into an absolute wake tick.
pub fn ms_to_ticks(ms: u64) -> u64 {
    ms.div_ceil(10)
}

/// Invoked from the IRQ0 entry stub's C handler body before `schedule()`
/// runs; the tick increment happens-before the subsequent `schedule()`
/// invocation.
pub fn on_tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
    pic::end_of_interrupt(Irq::Timer);
}
