//! Global process table: PID allocation and the map from PID to PCB.
//!
//! Process tree edges are `parent` scalars on each PCB, not pointers --
//! a zombie survives its parent's death because it's just an integer, not
//! a dangling reference.

use alloc::collections::BTreeMap;
use core::alloc::Layout;

use lazy_static::lazy_static;
use spin::Mutex;

use crate::fd::FdTable;
use crate::mm::heap;
use crate::mm::page_table::PageDirectory;

use super::pcb::{Pcb, ProcState, KERNEL_STACK_SIZE};

struct Table {
    processes: BTreeMap<u32, Pcb>,
    next_pid: u32,
}

lazy_static! {
    static ref TABLE: Mutex<Table> = Mutex::new(Table {
        processes: BTreeMap::new(),
        next_pid: 1,
    });
}

pub fn kernel_stack_layout() -> Layout {
    Layout::from_size_align(KERNEL_STACK_SIZE, 16).expect("kernel stack layout")
}

fn alloc_kernel_stack() -> *mut u8 {
    let stack = heap::kmalloc(kernel_stack_layout());
    assert!(!stack.is_null(), "out of memory allocating a kernel stack");
    stack
}

/// Creates a fresh PCB with a newly allocated kernel stack, assigns it the
/// next PID (monotone from 1), and inserts it into the table.
pub fn create(parent: u32, page_dir: PageDirectory, fds: FdTable) -> u32 {
    let mut table = TABLE.lock();
    let pid = table.next_pid;
    table.next_pid += 1;
    let stack = alloc_kernel_stack();
    table.processes.insert(pid, Pcb::new(pid, parent, page_dir, stack, fds));
    pid
}

/// Same as `create`, but pinned to PID 0 -- used exactly once, for the idle
/// process.
pub fn create_idle(page_dir: PageDirectory, fds: FdTable) -> u32 {
    let mut table = TABLE.lock();
    let stack = alloc_kernel_stack();
    table.processes.insert(0, Pcb::new(0, 0, page_dir, stack, fds));
    0
}

/// Removes and returns the PCB for `pid`. The caller is responsible for
/// releasing its address space and kernel stack.
pub fn remove(pid: u32) -> Option<Pcb> {
    TABLE.lock().processes.remove(&pid)
}

pub fn exists(pid: u32) -> bool {
    TABLE.lock().processes.contains_key(&pid)
}

/// Runs `f` against the PCB for `pid`, if it still exists.
pub fn with<R>(pid: u32, f: impl FnOnce(&mut Pcb) -> R) -> Option<R> {
    TABLE.lock().processes.get_mut(&pid).map(f)
}

/// First zombie child of `parent`, reaped by `waitpid`.
pub fn find_zombie_child(parent: u32) -> Option<u32> {
    TABLE
        .lock()
        .processes
        .values()
        .find(|p| p.parent == parent && p.state == ProcState::Zombie)
        .map(|p| p.pid)
}

pub fn has_child(parent: u32) -> bool {
    TABLE.lock().processes.values().any(|p| p.parent == parent)
}
