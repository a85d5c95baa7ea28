//! Process lifecycle syscalls: thin wrappers over `sched::scheduler`'s
//! entry points and the ELF loader's `exec_current`.

use crate::sched::scheduler;
use crate::{KernelError, KernelResult};

pub fn sys_exit(code: i32) -> KernelResult<isize> {
    scheduler::exit_current(code);
    Ok(0)
}

pub fn sys_getpid() -> KernelResult<isize> {
    Ok(scheduler::current_pid() as isize)
}

pub fn sys_fork() -> KernelResult<isize> {
    scheduler::fork_current()
        .map(|pid| pid as isize)
        .ok_or(KernelError::ResourceExhausted {
            resource: "process table",
        })
}

/// `waitpid(-1, &code)`: only `-1` (any child) is accepted, matching the one
/// parent/one child-group wait this kernel supports. No zombie child yet is
/// a restart, not a failure; no children at all is an immediate error. A
/// null `code_ptr` is allowed (the caller doesn't care about the exit code);
/// any other bad pointer fails the call before the child is ever reaped.
pub fn sys_waitpid(pid_arg: u32, code_ptr: u32) -> KernelResult<isize> {
    if pid_arg as i32 != -1 {
        return Err(KernelError::InvalidArgument {
            name: "pid",
            value: "only -1 (any child) is supported",
        });
    }
    let code_buf = if code_ptr == 0 {
        None
    } else {
        Some(
            super::user_buffer(code_ptr, 4, true)
                .ok_or(KernelError::InvalidAddress { addr: code_ptr as usize })?,
        )
    };
    let ppid = scheduler::current_pid();
    if !crate::process::table::has_child(ppid) {
        return Err(KernelError::ProcessNotFound { pid: ppid });
    }
    match scheduler::waitpid_current() {
        Some((child, exit_code)) => {
            if let Some(buf) = code_buf {
                buf[0..4].copy_from_slice(&(exit_code as u32).to_le_bytes());
            }
            Ok(child as isize)
        }
        None => Err(KernelError::WouldBlock),
    }
}

pub fn sys_exec(name_ptr: u32) -> KernelResult<isize> {
    let name = super::user_cstr(name_ptr)?;
    crate::arch::x86::multiboot::with(|mb| crate::process::loader::exec_current(mb, &name))?;
    // `exec_current` already installed a fresh trap frame with `eax` zeroed;
    // the dispatcher writing this return value on top is a no-op.
    Ok(0)
}
