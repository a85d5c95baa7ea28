//! Process table integration tests: PID allocation, parent/child lookup,
//! and the fixed-size FD table's `fork`/`dup2`/`close` bookkeeping.

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use nova_kernel::fd::FdTable;
use nova_kernel::mm::vas;
use nova_kernel::process::{pcb::ProcState, table};
use nova_kernel::{exit_qemu, serial_println, test_panic_handler, QemuExitCode};

mod common;

nova_kernel::test_boot_entry!(test_main);

extern "C" fn test_main(multiboot_addr: u32) -> ! {
    serial_println!("process_tests: starting");

    // SAFETY: first thing this entry point does.
    unsafe { common::init(multiboot_addr) };

    pid_allocation_is_monotone();
    zombie_children_are_found_by_parent();
    fd_table_fork_shares_descriptions();
    fd_table_dup2_and_close();

    serial_println!("process_tests: ok");
    exit_qemu(QemuExitCode::Success)
}

fn spawn(parent: u32) -> u32 {
    let pd = vas::create();
    table::create(parent, pd, FdTable::new_with_standard_streams())
}

fn pid_allocation_is_monotone() {
    let a = spawn(0);
    let b = spawn(0);
    assert!(b > a, "PIDs must increase monotonically");
    table::remove(a);
    table::remove(b);
    serial_println!("  pid_allocation_is_monotone: ok");
}

fn zombie_children_are_found_by_parent() {
    let parent = spawn(0);
    let child = spawn(parent);

    assert!(table::has_child(parent));
    assert_eq!(table::find_zombie_child(parent), None);

    table::with(child, |p| p.state = ProcState::Zombie);
    assert_eq!(table::find_zombie_child(parent), Some(child));

    table::remove(child);
    table::remove(parent);
    serial_println!("  zombie_children_are_found_by_parent: ok");
}

fn fd_table_fork_shares_descriptions() {
    let parent = FdTable::new_with_standard_streams();
    let child = parent.fork_from();

    assert!(parent.get(1).is_some());
    assert!(child.get(1).is_some());
    assert_eq!(parent.get(1), child.get(1));
    serial_println!("  fd_table_fork_shares_descriptions: ok");
}

fn fd_table_dup2_and_close() {
    let mut fds = FdTable::new_with_standard_streams();
    let stdout = fds.get(1);

    fds.dup2(1, 5);
    assert_eq!(fds.get(5), stdout);

    fds.close(5);
    assert!(fds.get(5).is_none());
    serial_println!("  fd_table_dup2_and_close: ok");
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}
