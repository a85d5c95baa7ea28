//! The TrapFrame layout and the two naked-asm entry stubs (IRQ0, `int 0x80`)
//! that implement the `schedule(esp) -> esp` hinge.
//!
//! This is the entirety of the context-switch machinery described in the
//! spec: there is no separate "switch contexts" routine. Both stubs build an
//! identical on-stack `TrapFrame`, call the safe Rust `schedule` function
//! with the current `esp`, reload whatever `esp` it returns, and `iret`.
//! Preserving the interrupted process's kernel `esp` in its PCB before
//! handing back a different one is `sched::scheduler`'s sole obligation;
//! this module only guarantees the memory layout both sides agree on.

use core::arch::naked_asm;

/// On-kernel-stack record reflecting the exact push order of the entry
/// stubs below: `pusha`'s eight GP registers, the four segment registers
/// this kernel tracks, then the processor-pushed `{EIP, CS, EFLAGS, user
/// ESP, user SS}` that `iret` consumes. The kernel stack top must hold one
/// of these for the interrupted user context before `schedule()` runs.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TrapFrame {
    // Pushed last (by `pusha`), so these sit at the lowest addresses --
    // `pusha`'s own push order is eax,ecx,edx,ebx,esp,ebp,esi,edi, and since
    // the stack grows down the last-pushed register (edi) is at the lowest
    // address. `popa` restores these and explicitly discards `esp_dummy`.
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp_dummy: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,

    // Segment registers, pushed ds,es,fs,gs (so gs is pushed last / sits
    // lowest of the four).
    pub gs: u32,
    pub fs: u32,
    pub es: u32,
    pub ds: u32,

    // Pushed by the CPU itself on interrupt entry.
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub user_esp: u32,
    pub user_ss: u32,
}

const _: () = assert!(core::mem::size_of::<TrapFrame>() == 68);

impl TrapFrame {
    /// Builds the trap frame for a brand-new process about to start at
    /// `entry` with `user_esp` as its initial stack pointer.
    pub fn init(entry: u32, user_esp: u32) -> Self {
        Self {
            edi: 0,
            esi: 0,
            ebp: 0,
            esp_dummy: 0,
            ebx: 0,
            edx: 0,
            ecx: 0,
            eax: 0,
            gs: crate::arch::x86::gdt::USER_DATA_SELECTOR as u32,
            fs: crate::arch::x86::gdt::USER_DATA_SELECTOR as u32,
            es: crate::arch::x86::gdt::USER_DATA_SELECTOR as u32,
            ds: crate::arch::x86::gdt::USER_DATA_SELECTOR as u32,
            eip: entry,
            cs: crate::arch::x86::gdt::USER_CODE_SELECTOR as u32,
            eflags: 0x202, // IF set, reserved bit 1 set
            user_esp,
            user_ss: crate::arch::x86::gdt::USER_DATA_SELECTOR as u32,
        }
    }

    /// Syscall return-value register (EAX), per the C6 calling convention.
    pub fn set_return(&mut self, value: i32) {
        self.eax = value as u32;
    }

    /// Syscall number and first three arguments (EAX, EBX, ECX, EDX).
    pub fn syscall_args(&self) -> (u32, u32, u32, u32) {
        (self.eax, self.ebx, self.ecx, self.edx)
    }

    /// Rewinds `EIP` by the length of `int 0x80` (2 bytes) so the
    /// instruction re-executes on the next return to ring 3. Used by the
    /// syscall restart protocol: a syscall that would block rewinds and
    /// blocks the caller instead of returning, so it retries from scratch
    /// once woken.
    pub fn rewind_for_restart(&mut self) {
        self.eip -= 2;
    }
}

/// Common body shared by both entry stubs: given the frame-pointer already
/// on the stack, call `schedule`, reload the returned `esp`, and return to
/// ring 3. Written once as a macro because `#[naked]` functions cannot call
/// a shared naked subroutine without an extra (slow) `call`/`ret` through
/// the frame, and both stubs are on the hottest path in the kernel.
macro_rules! trap_entry_body {
    ($is_syscall:literal) => {
        concat!(
            "push ds\n",
            "push es\n",
            "push fs\n",
            "push gs\n",
            "pusha\n",
            "mov ax, 0x10\n", // KERNEL_DATA_SELECTOR
            "mov ds, ax\n",
            "mov es, ax\n",
            "mov eax, esp\n", // eax = frame pointer, before the two pushes below
            "push ", $is_syscall, "\n",
            "push eax\n",
            "call {schedule}\n",
            "add esp, 8\n",
            "mov esp, eax\n",
            "popa\n",
            "pop gs\n",
            "pop fs\n",
            "pop es\n",
            "pop ds\n",
            "iretd\n",
        )
    };
}

/// IRQ0 (PIT timer) entry point, installed in the IDT by `idt::init`.
/// Runs on every tick (100 Hz); `schedule_from_trap` performs the
/// round-robin rotation that keeps every ready process moving forward.
#[unsafe(naked)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn irq0_entry() -> ! {
    naked_asm!(
        trap_entry_body!("0"),
        schedule = sym crate::sched::scheduler::schedule_from_trap,
    )
}

/// `int 0x80` entry point, installed as a ring-3-callable interrupt gate.
/// Builds an identical `TrapFrame` and funnels through the same
/// `schedule_from_trap` hinge, which runs `syscall::dispatch` first (this
/// is the syscall path) and then performs the same round-robin rotation
/// every `schedule()` call does.
#[unsafe(naked)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn syscall_entry() -> ! {
    naked_asm!(
        trap_entry_body!("1"),
        schedule = sym crate::sched::scheduler::schedule_from_trap,
    )
}
