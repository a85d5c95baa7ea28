//! Nova kernel library.
//!
//! A small preemptive-multitasking kernel for i386: physical frame
//! allocation, two-level paging, per-process address spaces, a
//! round-robin scheduler, a POSIX-flavored syscall surface, pipes and
//! shared memory. `kernel_main` below is the Rust entry point, reached
//! from `arch::x86::boot::higher_half_start` once paging is live.

#![no_std]
#![cfg_attr(all(test, target_os = "none"), no_main)]
#![feature(custom_test_frameworks)]
#![cfg_attr(target_os = "none", feature(alloc_error_handler))]
#![cfg_attr(target_os = "none", test_runner(crate::test_framework::test_runner))]
#![cfg_attr(target_os = "none", reexport_test_harness_main = "test_main")]

extern crate alloc;

// Host builds (explicit `--target <host triple>`, overriding the default
// i686 target in `.cargo/config.toml`) link against the system allocator
// so ordinary `#[test]` functions can use `Vec`/`String`/`Box` without
// bringing up the kernel heap. Bare-metal builds use `mm::heap`'s
// `LockedHeap`, declared there so it sits next to the code that grows it.
#[cfg(not(target_os = "none"))]
extern crate std;
#[cfg(not(target_os = "none"))]
#[global_allocator]
static SYSTEM_ALLOCATOR: std::alloc::System = std::alloc::System;

#[macro_use]
pub mod print;

mod intrinsics;

pub mod arch;
pub mod error;
pub mod fd;
pub mod ipc;
pub mod mm;
pub mod process;
pub mod sched;
pub mod syscall;

mod test_framework;

pub use error::{ElfError, KernelError, KernelResult};
pub use test_framework::{exit_qemu, test_panic_handler, QemuExitCode, Testable};

#[cfg(all(test, target_os = "none"))]
#[no_mangle]
pub extern "C" fn _start() -> ! {
    test_main();
    loop {
        core::hint::spin_loop();
    }
}

#[cfg(all(test, target_os = "none"))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    test_framework::test_panic_handler(info)
}

/// Heap allocation error handler.
///
/// Panic is intentional: heap allocation failure in a no_std kernel is
/// unrecoverable. The `alloc_error_handler` ABI requires `-> !`.
#[cfg(target_os = "none")]
#[alloc_error_handler]
fn alloc_error_handler(layout: core::alloc::Layout) -> ! {
    panic!("allocation error: {:?}", layout);
}

/// Rust entry point, called from `arch::x86::boot::higher_half_start` with
/// the physical address of the Multiboot info block on the stack.
///
/// Brings the kernel up in documented order: architecture (GDT/IDT/PIC/
/// PIT), memory management (frame allocator, heap), the scheduler's idle
/// process, the syscall dispatcher, then the first real process, before
/// finally enabling interrupts and falling into the idle loop.
#[cfg(target_os = "none")]
#[unsafe(no_mangle)]
pub extern "C" fn kernel_main(multiboot_addr: u32) -> ! {
    // SAFETY: `multiboot_addr` is the physical address the boot loader
    // placed in EBX, forwarded by `_start`/`higher_half_start` untouched.
    let multiboot = unsafe { arch::x86::multiboot::parse(multiboot_addr) };
    arch::x86::multiboot::store(multiboot);

    // SAFETY: first and only call, before any other subsystem touches
    // interrupts, paging, or the heap.
    unsafe {
        arch::x86::init();
        mm::init(&multiboot);
    }

    log::info!("[BOOT] nova kernel up");

    sched::init();
    syscall::init();

    match process::loader::spawn_from_module(&multiboot, "init") {
        Ok(()) => log::info!("[BOOT] init process loaded"),
        Err(e) => panic!("failed to load init process: {}", e),
    }

    // Interrupts are enabled only once every subsystem the timer and
    // syscall handlers depend on (scheduler, process table) is live.
    arch::x86::enable_interrupts();

    arch::x86::halt_loop()
}
