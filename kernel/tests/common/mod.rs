//! Shared bring-up for the QEMU-exit integration test binaries.
//!
//! Each test binary is its own bootable image (`test_boot_entry!` in
//! `nova_kernel::arch::x86::boot` builds its `_start`), so each repeats the
//! same subsystem bring-up `kernel_main` does before running its own
//! assertions.

use nova_kernel::arch::x86::multiboot::MultibootInfo;
use nova_kernel::{arch, mm};

/// Brings up architecture and memory management from a real Multiboot info
/// block, mirroring `kernel_main`'s init order up to (not including) the
/// scheduler and the first process.
///
/// # Safety
/// Must be called at most once, as the very first thing the test binary's
/// entry point does.
pub unsafe fn init(multiboot_addr: u32) -> MultibootInfo {
    let multiboot = unsafe { arch::x86::multiboot::parse(multiboot_addr) };
    unsafe {
        arch::x86::init();
        mm::init(&multiboot);
    }
    multiboot
}
