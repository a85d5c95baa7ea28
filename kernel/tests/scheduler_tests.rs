//! Scheduler integration tests: the ready/blocked queues' FIFO ordering,
//! and that bringing the scheduler up parks the kernel on the idle process.

#![no_std]
#![no_main]

extern crate alloc;

use core::panic::PanicInfo;

use nova_kernel::sched::{queue, scheduler};
use nova_kernel::{exit_qemu, serial_println, test_panic_handler, QemuExitCode};

mod common;

nova_kernel::test_boot_entry!(test_main);

extern "C" fn test_main(multiboot_addr: u32) -> ! {
    serial_println!("scheduler_tests: starting");

    // SAFETY: first thing this entry point does.
    unsafe { common::init(multiboot_addr) };

    ready_queue_is_fifo();
    blocked_queue_drains_only_woken();
    remove_drops_from_either_queue();

    scheduler::init();
    assert_eq!(
        scheduler::current_pid(),
        0,
        "the idle process must be PID 0"
    );

    serial_println!("scheduler_tests: ok");
    exit_qemu(QemuExitCode::Success)
}

fn ready_queue_is_fifo() {
    queue::push_ready(10);
    queue::push_ready(11);
    queue::push_ready(12);

    assert_eq!(queue::pop_ready(), Some(10));
    assert_eq!(queue::pop_ready(), Some(11));
    assert_eq!(queue::pop_ready(), Some(12));
    assert_eq!(queue::pop_ready(), None);
    serial_println!("  ready_queue_is_fifo: ok");
}

fn blocked_queue_drains_only_woken() {
    queue::push_blocked(20);
    queue::push_blocked(21);
    queue::push_blocked(22);

    let woken = queue::drain_blocked_where(|pid| pid != 21);
    assert_eq!(woken.len(), 2);
    assert!(woken.contains(&20));
    assert!(woken.contains(&22));

    // 21 is still blocked; clean it up before the next test reuses the id.
    let remaining = queue::drain_blocked_where(|pid| pid == 21);
    assert_eq!(remaining, alloc::vec![21]);
    serial_println!("  blocked_queue_drains_only_woken: ok");
}

fn remove_drops_from_either_queue() {
    queue::push_ready(30);
    queue::push_blocked(31);

    queue::remove(30);
    queue::remove(31);

    assert_eq!(queue::pop_ready(), None);
    assert_eq!(queue::drain_blocked_where(|_| true), alloc::vec![]);
    serial_println!("  remove_drops_from_either_queue: ok");
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}
