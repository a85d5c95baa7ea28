//! Smoke test: the kernel reaches a running state and its core subsystems
//! answer basic queries.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use nova_kernel::{exit_qemu, serial_println, test_panic_handler, QemuExitCode};

mod common;

nova_kernel::test_boot_entry!(test_main);

extern "C" fn test_main(multiboot_addr: u32) -> ! {
    serial_println!("basic_boot: starting");

    // SAFETY: first thing this entry point does.
    let multiboot = unsafe { common::init(multiboot_addr) };

    assert!(
        multiboot.ram_regions().next().is_some(),
        "no RAM regions reported by the boot loader"
    );
    assert!(
        nova_kernel::mm::frame_allocator::free_count() > 0,
        "frame allocator has no free frames after init"
    );

    serial_println!("basic_boot: ok");
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}
