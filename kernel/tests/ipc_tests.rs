//! IPC integration tests: pipe read/write/EOF semantics and shared-memory
//! attach/detach.

#![no_std]
#![no_main]

extern crate alloc;

use core::panic::PanicInfo;

use nova_kernel::fd::{read, write};
use nova_kernel::ipc::{pipe, shared_memory};
use nova_kernel::mm::vas;
use nova_kernel::{exit_qemu, serial_println, test_panic_handler, KernelError, QemuExitCode};

mod common;

nova_kernel::test_boot_entry!(test_main);

extern "C" fn test_main(multiboot_addr: u32) -> ! {
    serial_println!("ipc_tests: starting");

    // SAFETY: first thing this entry point does.
    unsafe { common::init(multiboot_addr) };

    pipe_write_then_read_roundtrips();
    pipe_read_on_empty_with_no_writers_is_eof();
    pipe_write_on_closed_readers_is_broken();
    shared_memory_attach_and_detach();

    serial_println!("ipc_tests: ok");
    exit_qemu(QemuExitCode::Success)
}

fn pipe_write_then_read_roundtrips() {
    let (read_desc, write_desc) = pipe::create();

    let n = write(write_desc, b"hello").expect("pipe write");
    assert_eq!(n, 5);

    let mut buf = [0u8; 5];
    let n = read(read_desc, &mut buf).expect("pipe read");
    assert_eq!(n, 5);
    assert_eq!(&buf, b"hello");

    // SAFETY: each description has exactly one reference, held by this
    // test; no FD table points at either.
    unsafe {
        pipe::close_read(read_desc);
        pipe::close_write(write_desc);
    }
    serial_println!("  pipe_write_then_read_roundtrips: ok");
}

fn pipe_read_on_empty_with_no_writers_is_eof() {
    let (read_desc, write_desc) = pipe::create();

    // SAFETY: sole reference to the write end, dropped before reading.
    unsafe { pipe::close_write(write_desc) };

    let mut buf = [0u8; 1];
    let n = read(read_desc, &mut buf).expect("read on an empty, writer-less pipe");
    assert_eq!(n, 0, "EOF must read as zero bytes, not an error");

    // SAFETY: sole reference to the read end.
    unsafe { pipe::close_read(read_desc) };
    serial_println!("  pipe_read_on_empty_with_no_writers_is_eof: ok");
}

fn pipe_write_on_closed_readers_is_broken() {
    let (read_desc, write_desc) = pipe::create();

    // SAFETY: sole reference to the read end.
    unsafe { pipe::close_read(read_desc) };

    let err = write(write_desc, b"x").expect_err("write past every reader must fail");
    assert!(matches!(err, KernelError::BrokenPipe));

    // SAFETY: sole reference to the write end.
    unsafe { pipe::close_write(write_desc) };
    serial_println!("  pipe_write_on_closed_readers_is_broken: ok");
}

fn shared_memory_attach_and_detach() {
    let id = shared_memory::shmget(FRAME_SIZE_HINT).expect("region allocation");
    let pd = vas::create();
    let mut attachments = alloc::vec::Vec::new();

    shared_memory::shmat(pd, &mut attachments, id, 0x5000_0000).expect("attach");
    assert_eq!(attachments.len(), 1);

    shared_memory::shmdt(pd, &mut attachments, 0x5000_0000, FRAME_SIZE_HINT).expect("detach");
    assert!(attachments.is_empty());

    vas::destroy(pd);
    serial_println!("  shared_memory_attach_and_detach: ok");
}

const FRAME_SIZE_HINT: usize = 4096;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}
