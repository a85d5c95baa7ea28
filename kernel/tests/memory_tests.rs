//! Memory management integration tests: frame allocation, the page-table
//! operator, and address-space creation/teardown.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use nova_kernel::mm::{frame_allocator, page_table, vas, FRAME_SIZE};
use nova_kernel::{exit_qemu, serial_println, test_panic_handler, QemuExitCode};

mod common;

nova_kernel::test_boot_entry!(test_main);

extern "C" fn test_main(multiboot_addr: u32) -> ! {
    serial_println!("memory_tests: starting");

    // SAFETY: first thing this entry point does.
    unsafe { common::init(multiboot_addr) };

    frame_alloc_free_roundtrip();
    frame_alloc_never_returns_duplicates();
    page_table_map_and_unmap();
    address_space_create_and_destroy();

    serial_println!("memory_tests: ok");
    exit_qemu(QemuExitCode::Success)
}

fn frame_alloc_free_roundtrip() {
    let before = frame_allocator::free_count();
    let frame = frame_allocator::alloc().expect("allocator has no free frames");
    assert_eq!(frame_allocator::free_count(), before - 1);
    frame_allocator::free(frame);
    assert_eq!(frame_allocator::free_count(), before);
    serial_println!("  frame_alloc_free_roundtrip: ok");
}

fn frame_alloc_never_returns_duplicates() {
    let a = frame_allocator::alloc().expect("frame a");
    let b = frame_allocator::alloc().expect("frame b");
    assert_ne!(a.0, b.0);
    frame_allocator::free(a);
    frame_allocator::free(b);
    serial_println!("  frame_alloc_never_returns_duplicates: ok");
}

fn page_table_map_and_unmap() {
    let pd = vas::create();
    let frame = frame_allocator::alloc().expect("frame for mapping");
    let vaddr = 0x4000_0000u32;

    page_table::map(pd, vaddr, frame.as_addr(), true, true);
    assert_eq!(page_table::get_phys_in(pd, vaddr), frame.as_addr());
    assert!(page_table::is_user_mapped(pd, vaddr, true));

    page_table::unmap(pd, vaddr);
    assert_eq!(page_table::get_phys_in(pd, vaddr), 0);

    vas::destroy(pd);
    serial_println!("  page_table_map_and_unmap: ok");
}

fn address_space_create_and_destroy() {
    let before = frame_allocator::free_count();
    let pd = vas::create();

    let frame = frame_allocator::alloc().expect("frame for user mapping");
    page_table::map(pd, 0x1000_0000, frame.as_addr(), true, true);

    vas::destroy(pd);

    // `destroy` frees every present user frame plus the page-table/directory
    // frames vas::create allocated, so the free count returns to baseline.
    assert_eq!(frame_allocator::free_count(), before);
    serial_println!("  address_space_create_and_destroy: ok");
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

const _: usize = FRAME_SIZE;
