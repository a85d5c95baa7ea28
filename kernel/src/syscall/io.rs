//! File-descriptor and terminal syscalls: `read`/`write`/`close`/`dup2`/
//! `pipe` dispatch through `fd`/`ipc::pipe`; `set_cursor`/`set_color`/
//! `clear` go straight to the VGA driver.

use crate::arch::x86::vga;
use crate::sched::scheduler;
use crate::{fd, ipc::pipe, KernelError, KernelResult};

pub fn sys_read(fd_num: u32, buf_ptr: u32, len: u32) -> KernelResult<isize> {
    let buf = super::user_buffer(buf_ptr, len as usize, true)
        .ok_or(KernelError::InvalidAddress { addr: buf_ptr as usize })?;
    let desc = scheduler::with_current(|p| p.fds.get(fd_num as usize))
        .ok_or(KernelError::InvalidArgument { name: "fd", value: "not open" })?;
    fd::read(desc, buf).map(|n| n as isize)
}

pub fn sys_write(fd_num: u32, buf_ptr: u32, len: u32) -> KernelResult<isize> {
    let buf = super::user_buffer(buf_ptr, len as usize, false)
        .ok_or(KernelError::InvalidAddress { addr: buf_ptr as usize })?;
    let desc = scheduler::with_current(|p| p.fds.get(fd_num as usize))
        .ok_or(KernelError::InvalidArgument { name: "fd", value: "not open" })?;
    fd::write(desc, buf).map(|n| n as isize)
}

pub fn sys_close(fd_num: u32) -> KernelResult<isize> {
    scheduler::with_current(|p| p.fds.close(fd_num as usize));
    Ok(0)
}

pub fn sys_dup2(old_fd: u32, new_fd: u32) -> KernelResult<isize> {
    scheduler::with_current(|p| p.fds.dup2(old_fd as usize, new_fd as usize))
        .map(|fd| fd as isize)
        .ok_or(KernelError::InvalidArgument {
            name: "fd",
            value: "out of range or not open",
        })
}

/// `pipe(fds_ptr)`: writes the read end at `fds_ptr[0]` and the write end at
/// `fds_ptr[1]` as two little-endian `u32`s.
pub fn sys_pipe(fds_ptr: u32) -> KernelResult<isize> {
    let out = super::user_buffer(fds_ptr, 8, true)
        .ok_or(KernelError::InvalidAddress { addr: fds_ptr as usize })?;

    let (read_desc, write_desc) = pipe::create();
    let result = scheduler::with_current(|p| {
        let read_fd = p.fds.alloc_from(0);
        if read_fd < 0 {
            return None;
        }
        p.fds.install_new(read_fd as usize, read_desc);
        let write_fd = p.fds.alloc_from(read_fd as usize + 1);
        if write_fd < 0 {
            p.fds.close(read_fd as usize);
            return None;
        }
        p.fds.install_new(write_fd as usize, write_desc);
        Some((read_fd as u32, write_fd as u32))
    });

    match result {
        Some((read_fd, write_fd)) => {
            out[0..4].copy_from_slice(&read_fd.to_le_bytes());
            out[4..8].copy_from_slice(&write_fd.to_le_bytes());
            Ok(0)
        }
        None => Err(KernelError::ResourceExhausted {
            resource: "file descriptor table",
        }),
    }
}

pub fn sys_set_cursor(row: u32, col: u32) -> KernelResult<isize> {
    vga::set_cursor(row as usize, col as usize);
    Ok(0)
}

pub fn sys_set_color(color: u32) -> KernelResult<isize> {
    vga::set_color(color as u8);
    Ok(0)
}

pub fn sys_clear() -> KernelResult<isize> {
    vga::clear();
    Ok(0)
}
