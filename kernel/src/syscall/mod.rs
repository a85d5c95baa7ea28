//! Syscall dispatcher: the `int 0x80` side of the `schedule(esp) -> esp`
//! hinge. `sched::scheduler::schedule_from_trap` calls `dispatch` before
//! every reschedule when the trap came from a syscall.
//!
//! Every handler returns `KernelResult<isize>`. `WouldBlock` is not an
//! error the caller ever sees: the dispatcher rewinds `EIP` by the length
//! of `int 0x80` and blocks the caller instead of writing anything to
//! `EAX`, so the instruction re-executes from scratch once rescheduled.
//! Every other `Err` collapses to `-1`.

mod io;
mod memory;
mod process;
mod time;

use crate::arch::x86::context::TrapFrame;
use crate::mm::user_validation::validate_user_buffer;
use crate::sched::scheduler;
use crate::{KernelError, KernelResult};

const EXIT: u32 = 0;
const READ: u32 = 1;
const WRITE: u32 = 2;
const SLEEP: u32 = 3;
const SBRK: u32 = 4;
const SET_CURSOR: u32 = 5;
const SET_COLOR: u32 = 6;
const CLEAR: u32 = 7;
const GETPID: u32 = 8;
const EXEC: u32 = 9;
const FORK: u32 = 10;
const WAITPID: u32 = 11;
const PIPE: u32 = 12;
const CLOSE: u32 = 13;
const DUP2: u32 = 14;
const SHMGET: u32 = 15;
const SHMAT: u32 = 16;
const SHMDT: u32 = 17;

/// No-op: every piece of state a syscall handler touches (process table,
/// FD table, shared-memory table) is brought up by `sched::init`/`mm::init`
/// before this runs. Kept as the init-order placeholder `kernel_main`
/// expects for every subsystem it brings up explicitly.
pub fn init() {
    log::info!("[SYSCALL] dispatcher ready, {} calls wired", SHMDT + 1);
}

/// Validates a `[ptr, ptr+len)` user buffer against the calling process's
/// own address space. `None` means the pointer is bad; the caller should
/// fail the syscall with `-1` rather than ever dereferencing it.
fn user_buffer<'a>(ptr: u32, len: usize, need_write: bool) -> Option<&'a mut [u8]> {
    let pd = scheduler::with_current(|p| p.page_dir);
    if !validate_user_buffer(pd, ptr, len, need_write) {
        return None;
    }
    // SAFETY: `validate_user_buffer` just confirmed every page in this
    // range is present, user-accessible, and writable if requested, in the
    // page directory this process is running under.
    Some(unsafe { core::slice::from_raw_parts_mut(ptr as *mut u8, len) })
}

/// Reads a NUL-terminated string one page at a time, stopping at the first
/// unmapped page rather than assuming the whole string is contiguous in
/// one validated range up front.
fn user_cstr(ptr: u32) -> KernelResult<alloc::string::String> {
    use alloc::string::String;

    let pd = scheduler::with_current(|p| p.page_dir);
    let mut out = String::new();
    let mut addr = ptr;
    loop {
        let page = addr & !0xFFF;
        if !crate::mm::page_table::is_user_mapped(pd, page, false) {
            return Err(KernelError::InvalidAddress { addr: addr as usize });
        }
        let page_end = page + crate::mm::FRAME_SIZE as u32;
        while addr < page_end {
            // SAFETY: `page` was just confirmed present and user-readable.
            let byte = unsafe { *(addr as *const u8) };
            if byte == 0 {
                return Ok(out);
            }
            out.push(byte as char);
            addr += 1;
            if out.len() > 255 {
                return Err(KernelError::InvalidArgument {
                    name: "name",
                    value: "exceeds 255 bytes",
                });
            }
        }
    }
}

/// Entry point called from `schedule_from_trap` for every `int 0x80`.
pub fn dispatch(frame: &mut TrapFrame) {
    let (num, a0, a1, a2) = frame.syscall_args();
    let result = handle(num, a0, a1, a2);
    match result {
        Ok(value) => frame.set_return(value as i32),
        Err(KernelError::WouldBlock) => {
            frame.rewind_for_restart();
            scheduler::block_current();
        }
        Err(_) => frame.set_return(-1),
    }
}

fn handle(num: u32, a0: u32, a1: u32, a2: u32) -> KernelResult<isize> {
    match num {
        EXIT => process::sys_exit(a0 as i32),
        READ => io::sys_read(a0, a1, a2),
        WRITE => io::sys_write(a0, a1, a2),
        SLEEP => time::sys_sleep(a0),
        SBRK => memory::sys_sbrk(a0 as i32),
        SET_CURSOR => io::sys_set_cursor(a0, a1),
        SET_COLOR => io::sys_set_color(a0),
        CLEAR => io::sys_clear(),
        GETPID => process::sys_getpid(),
        EXEC => process::sys_exec(a0),
        FORK => process::sys_fork(),
        WAITPID => process::sys_waitpid(a0, a1),
        PIPE => io::sys_pipe(a0),
        CLOSE => io::sys_close(a0),
        DUP2 => io::sys_dup2(a0, a1),
        SHMGET => memory::sys_shmget(a0),
        SHMAT => memory::sys_shmat(a0, a1),
        SHMDT => memory::sys_shmdt(a0, a1),
        _ => Err(KernelError::InvalidArgument {
            name: "syscall number",
            value: "unrecognized",
        }),
    }
}
