//! Process Control Block: everything the scheduler, syscall dispatcher, and
//! IPC layer need to know about one process.

use alloc::vec::Vec;

use crate::fd::FdTable;
use crate::ipc::shared_memory::ShmAttachment;
use crate::mm::page_table::PageDirectory;
use crate::mm::FRAME_SIZE;

pub const KERNEL_STACK_PAGES: usize = 2;
pub const KERNEL_STACK_SIZE: usize = KERNEL_STACK_PAGES * FRAME_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Ready,
    Running,
    Blocked,
    Zombie,
}

/// One process, owned by `process::table`'s map and indexed by `pid`.
pub struct Pcb {
    pub pid: u32,
    pub parent: u32,
    pub state: ProcState,
    /// Saved stack pointer into this process's own kernel stack. Valid
    /// whenever `state != Running`; the scheduler writes it on every
    /// `schedule()` call and reads it back to resume.
    pub kernel_esp: u32,
    pub page_dir: PageDirectory,
    /// Base of the `kmalloc`'d kernel stack, freed when the PCB is reaped.
    kernel_stack: *mut u8,
    pub heap_break: u32,
    /// Tick at which a `Blocked` sleeper becomes `Ready`. Unused otherwise.
    pub wake_tick: u64,
    pub exit_code: i32,
    pub fds: FdTable,
    pub shm_attachments: Vec<ShmAttachment>,
}

// SAFETY: every PCB is only ever touched by kernel code running with
// interrupts disabled (the "interrupts-off inside kernel" concurrency
// model); there is no real cross-thread access to guard against.
unsafe impl Send for Pcb {}

impl Pcb {
    pub(super) fn new(
        pid: u32,
        parent: u32,
        page_dir: PageDirectory,
        kernel_stack: *mut u8,
        fds: FdTable,
    ) -> Self {
        Self {
            pid,
            parent,
            state: ProcState::Ready,
            kernel_esp: 0,
            page_dir,
            kernel_stack,
            heap_break: 0,
            wake_tick: 0,
            exit_code: 0,
            fds,
            shm_attachments: Vec::new(),
        }
    }

    pub fn kernel_stack_base(&self) -> *mut u8 {
        self.kernel_stack
    }

    pub fn kernel_stack_top(&self) -> u32 {
        self.kernel_stack as u32 + KERNEL_STACK_SIZE as u32
    }
}
