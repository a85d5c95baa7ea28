//! Interrupt Descriptor Table: CPU exception vectors, IRQ0/IRQ1, and the
//! `int 0x80` syscall gate.

use core::mem::size_of;

use lazy_static::lazy_static;

use super::context::{irq0_entry, syscall_entry};

const GATE_INTERRUPT_RING0: u8 = 0x8E; // present, DPL0, 32-bit interrupt gate
const GATE_INTERRUPT_RING3: u8 = 0xEE; // present, DPL3, 32-bit interrupt gate

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

impl IdtEntry {
    const fn missing() -> Self {
        Self {
            offset_low: 0,
            selector: 0,
            zero: 0,
            type_attr: 0,
            offset_high: 0,
        }
    }

    fn new(handler: u32, attr: u8) -> Self {
        Self {
            offset_low: (handler & 0xFFFF) as u16,
            selector: super::gdt::KERNEL_CODE_SELECTOR,
            zero: 0,
            type_attr: attr,
            offset_high: ((handler >> 16) & 0xFFFF) as u16,
        }
    }
}

#[repr(C, packed)]
struct IdtPointer {
    limit: u16,
    base: u32,
}

const EXCEPTION_NAMES: [&str; 20] = [
    "divide-by-zero",
    "debug",
    "non-maskable-interrupt",
    "breakpoint",
    "overflow",
    "bound-range-exceeded",
    "invalid-opcode",
    "device-not-available",
    "double-fault",
    "coprocessor-segment-overrun",
    "invalid-tss",
    "segment-not-present",
    "stack-segment-fault",
    "general-protection-fault",
    "page-fault",
    "reserved",
    "x87-floating-point",
    "alignment-check",
    "machine-check",
    "simd-floating-point",
];

lazy_static! {
    static ref IDT: [IdtEntry; 256] = {
        let mut idt = [IdtEntry::missing(); 256];
        for (vector, entry) in idt.iter_mut().enumerate().take(20) {
            *entry = IdtEntry::new(exception_handler_addr(vector), GATE_INTERRUPT_RING0);
        }
        idt[32] = IdtEntry::new(irq0_entry as u32, GATE_INTERRUPT_RING0);
        idt[33] = IdtEntry::new(super::keyboard::irq1_entry as u32, GATE_INTERRUPT_RING0);
        idt[0x80] = IdtEntry::new(syscall_entry as u32, GATE_INTERRUPT_RING3);
        idt
    };
}

/// Returns the address of the exception stub for `vector`. Exceptions do not
/// need the full TrapFrame machinery since they never resume through
/// `schedule` in this core -- a ring-3 exception halts rather than being
/// delivered back to the faulting process -- so each is a tiny naked stub
/// that pushes the vector number and calls `fatal_exception`.
fn exception_handler_addr(vector: usize) -> u32 {
    EXCEPTION_STUBS[vector] as u32
}

macro_rules! exception_stub {
    ($name:ident, $vector:literal) => {
        #[unsafe(naked)]
        unsafe extern "C" fn $name() -> ! {
            core::arch::naked_asm!(
                "push {vector}",
                "call {handler}",
                vector = const $vector,
                handler = sym fatal_exception,
            )
        }
    };
}

exception_stub!(exc_0, 0);
exception_stub!(exc_1, 1);
exception_stub!(exc_2, 2);
exception_stub!(exc_3, 3);
exception_stub!(exc_4, 4);
exception_stub!(exc_5, 5);
exception_stub!(exc_6, 6);
exception_stub!(exc_7, 7);
exception_stub!(exc_8, 8);
exception_stub!(exc_9, 9);
exception_stub!(exc_10, 10);
exception_stub!(exc_11, 11);
exception_stub!(exc_12, 12);
exception_stub!(exc_13, 13);
exception_stub!(exc_14, 14);
exception_stub!(exc_15, 15);
exception_stub!(exc_16, 16);
exception_stub!(exc_17, 17);
exception_stub!(exc_18, 18);
exception_stub!(exc_19, 19);

type ExceptionStub = unsafe extern "C" fn() -> !;
static EXCEPTION_STUBS: [ExceptionStub; 20] = [
    exc_0, exc_1, exc_2, exc_3, exc_4, exc_5, exc_6, exc_7, exc_8, exc_9, exc_10, exc_11, exc_12,
    exc_13, exc_14, exc_15, exc_16, exc_17, exc_18, exc_19,
];

/// Kernel invariant violations (ring 0 exceptions) and ring-3 hardware
/// exceptions are both fatal in this core: print the vector name through
/// the debug/serial port and halt with interrupts disabled. A future
/// version could terminate only the offending process on a ring-3
/// exception; this core does not.
extern "C" fn fatal_exception(vector: u32) -> ! {
    let name = EXCEPTION_NAMES
        .get(vector as usize)
        .copied()
        .unwrap_or("unknown");
    log::error!("[IDT] fatal exception {} ({}), halting", vector, name);
    crate::arch::x86::halt_loop();
}

/// Loads the IDT. Must run once during early boot, after the GDT/TSS.
///
/// # Safety
/// Must be called with interrupts disabled, exactly once.
pub unsafe fn init() {
    let idt = &*IDT;
    let pointer = IdtPointer {
        limit: (size_of::<[IdtEntry; 256]>() - 1) as u16,
        base: idt.as_ptr() as u32,
    };
    unsafe {
        core::arch::asm!("lidt [{0}]", in(reg) &pointer, options(nostack));
    }
}
