//! Global Descriptor Table and Task State Segment.
//!
//! i386 has no `SYSCALL`/`SYSRET`; ring transitions go through `int 0x80`
//! and IRQ gates, which rely on the TSS only for `esp0` (the ring-0 stack
//! pointer loaded on a ring 3 -> ring 0 transition). `gdt::set_kernel_stack`
//! is called by the scheduler (C5) on every `schedule()` before returning
//! to a process that may re-enter ring 0 from ring 3.

use core::{cell::UnsafeCell, mem::size_of};

use lazy_static::lazy_static;

/// Wraps the TSS in an `UnsafeCell` so its address is exactly the struct's
/// address (a `spin::Mutex` would insert a lock field ahead of it, which
/// would make the GDT's TSS descriptor point at the wrong offset). Safe to
/// mutate through a raw pointer because `set_kernel_stack` only ever runs
/// with interrupts disabled, on the single CPU this kernel supports.
struct TssCell(UnsafeCell<Tss>);
// SAFETY: accessed only with interrupts disabled on a single CPU.
unsafe impl Sync for TssCell {}

/// Kernel code segment selector (ring 0).
pub const KERNEL_CODE_SELECTOR: u16 = 0x08;
/// Kernel data segment selector (ring 0).
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;
/// User code segment selector, RPL 3.
pub const USER_CODE_SELECTOR: u16 = 0x18 | 3;
/// User data segment selector, RPL 3.
pub const USER_DATA_SELECTOR: u16 = 0x20 | 3;
/// TSS selector.
pub const TSS_SELECTOR: u16 = 0x28;

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct GdtEntry {
    limit_low: u16,
    base_low: u16,
    base_mid: u8,
    access: u8,
    granularity: u8,
    base_high: u8,
}

impl GdtEntry {
    const fn null() -> Self {
        Self {
            limit_low: 0,
            base_low: 0,
            base_mid: 0,
            access: 0,
            granularity: 0,
            base_high: 0,
        }
    }

    const fn new(base: u32, limit: u32, access: u8, granularity: u8) -> Self {
        Self {
            limit_low: (limit & 0xFFFF) as u16,
            base_low: (base & 0xFFFF) as u16,
            base_mid: ((base >> 16) & 0xFF) as u8,
            access,
            granularity: (((limit >> 16) & 0x0F) as u8) | (granularity & 0xF0),
            base_high: ((base >> 24) & 0xFF) as u8,
        }
    }
}

/// Task State Segment, i386 layout. Only `esp0`/`ss0` are used by this
/// kernel (no hardware task switching); the rest is zeroed and present
/// only because the processor requires a validly-sized TSS descriptor.
#[repr(C, packed)]
pub struct Tss {
    prev_tss: u32,
    pub esp0: u32,
    pub ss0: u32,
    esp1: u32,
    ss1: u32,
    esp2: u32,
    ss2: u32,
    cr3: u32,
    eip: u32,
    eflags: u32,
    eax: u32,
    ecx: u32,
    edx: u32,
    ebx: u32,
    esp: u32,
    ebp: u32,
    esi: u32,
    edi: u32,
    es: u32,
    cs: u32,
    ss: u32,
    ds: u32,
    fs: u32,
    gs: u32,
    ldt: u32,
    trap: u16,
    iomap_base: u16,
}

impl Tss {
    const fn new() -> Self {
        Self {
            prev_tss: 0,
            esp0: 0,
            ss0: KERNEL_DATA_SELECTOR as u32,
            esp1: 0,
            ss1: 0,
            esp2: 0,
            ss2: 0,
            cr3: 0,
            eip: 0,
            eflags: 0,
            eax: 0,
            ecx: 0,
            edx: 0,
            ebx: 0,
            esp: 0,
            ebp: 0,
            esi: 0,
            edi: 0,
            es: 0,
            cs: 0,
            ss: 0,
            ds: 0,
            fs: 0,
            gs: 0,
            ldt: 0,
            trap: 0,
            iomap_base: size_of::<Tss>() as u16,
        }
    }
}

static TSS: TssCell = TssCell(UnsafeCell::new(Tss::new()));

#[repr(C, packed)]
struct GdtPointer {
    limit: u16,
    base: u32,
}

lazy_static! {
    static ref GDT: [GdtEntry; 6] = {
        let tss_addr = TSS.0.get() as u32;
        [
            GdtEntry::null(),
            GdtEntry::new(0, 0xFFFFF, 0x9A, 0xC0), // 0x08 kernel code
            GdtEntry::new(0, 0xFFFFF, 0x92, 0xC0), // 0x10 kernel data
            GdtEntry::new(0, 0xFFFFF, 0xFA, 0xC0), // 0x18 user code, DPL 3
            GdtEntry::new(0, 0xFFFFF, 0xF2, 0xC0), // 0x20 user data, DPL 3
            GdtEntry::new(tss_addr, size_of::<Tss>() as u32 - 1, 0x89, 0x00), // 0x28 TSS
        ]
    };
}

/// Loads the GDT and TSS. Must run once during early boot before any
/// `int 0x80` or IRQ gate can fire.
///
/// # Safety
/// Must be called exactly once, with interrupts disabled, before the IDT is
/// loaded.
pub unsafe fn init() {
    let gdt = &*GDT;
    let pointer = GdtPointer {
        limit: (size_of::<[GdtEntry; 6]>() - 1) as u16,
        base: gdt.as_ptr() as u32,
    };
    unsafe {
        core::arch::asm!(
            "lgdt [{ptr}]",
            "mov ax, {kdata:x}",
            "mov ds, ax",
            "mov es, ax",
            "mov fs, ax",
            "mov gs, ax",
            "mov ss, ax",
            "push {kcode}",
            "lea eax, [2f]",
            "push eax",
            "retf",
            "2:",
            ptr = in(reg) &pointer,
            kdata = const KERNEL_DATA_SELECTOR,
            kcode = const KERNEL_CODE_SELECTOR as u32,
            out("eax") _,
        );
        core::arch::asm!("ltr {0:x}", in(reg) TSS_SELECTOR, options(nostack, nomem));
    }
}

/// Sets `TSS.esp0` to `stack_top`, the top of the process's kernel stack
/// that will become ring 0's stack pointer on the next ring 3 -> ring 0
/// transition. Called by the scheduler on every `schedule()`.
pub fn set_kernel_stack(stack_top: u32) {
    // SAFETY: interrupts are disabled for the duration of `schedule()`, the
    // only caller, and this is a single-CPU kernel.
    unsafe {
        (*TSS.0.get()).esp0 = stack_top;
    }
}
