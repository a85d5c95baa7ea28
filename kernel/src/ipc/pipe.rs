//! Anonymous pipes: a 4 KiB ring buffer shared between a read-end and a
//! write-end file description, created together by `pipe()` and torn down
//! once both ends are closed.

use alloc::boxed::Box;

use crate::fd::{FileDescription, FileKind};
use crate::{KernelError, KernelResult};

const CAPACITY: usize = 4096;

pub struct Pipe {
    buf: [u8; CAPACITY],
    head: usize,
    len: usize,
    readers: u32,
    writers: u32,
}

impl Pipe {
    const fn new() -> Self {
        Self {
            buf: [0; CAPACITY],
            head: 0,
            len: 0,
            readers: 0,
            writers: 0,
        }
    }

    fn push(&mut self, byte: u8) {
        let tail = (self.head + self.len) % CAPACITY;
        self.buf[tail] = byte;
        self.len += 1;
    }

    fn pop(&mut self) -> u8 {
        let byte = self.buf[self.head];
        self.head = (self.head + 1) % CAPACITY;
        self.len -= 1;
        byte
    }
}

/// Allocates a fresh pipe and its two end descriptions, each already
/// carrying the one reference its creating FD slot will hold.
pub fn create() -> (*mut FileDescription, *mut FileDescription) {
    let pipe = Box::into_raw(Box::new(Pipe::new()));
    // SAFETY: `pipe` was just allocated above; nothing else can reach it yet.
    unsafe {
        (*pipe).readers = 1;
        (*pipe).writers = 1;
    }
    let read_desc = Box::into_raw(Box::new(FileDescription {
        kind: FileKind::PipeRead,
        ref_count: 1,
        pipe,
    }));
    let write_desc = Box::into_raw(Box::new(FileDescription {
        kind: FileKind::PipeWrite,
        ref_count: 1,
        pipe,
    }));
    (read_desc, write_desc)
}

/// Reads through a pipe's read-end description.
///
/// `Ok(0)` once the buffer is drained and no writers remain (EOF).
/// `Err(WouldBlock)` when the buffer is empty but writers are still open --
/// the syscall dispatcher turns that into a restart.
pub fn read(desc: *mut FileDescription, buf: &mut [u8]) -> KernelResult<usize> {
    // SAFETY: `desc` is a live `PipeRead` description; `pipe` was set at
    // creation and outlives every description pointing at it.
    let pipe = unsafe { &mut *(*desc).pipe };
    if pipe.len == 0 {
        return if pipe.writers > 0 {
            Err(KernelError::WouldBlock)
        } else {
            Ok(0)
        };
    }
    let n = buf.len().min(pipe.len);
    for slot in buf[..n].iter_mut() {
        *slot = pipe.pop();
    }
    Ok(n)
}

/// Writes through a pipe's write-end description.
///
/// `Err(BrokenPipe)` once every reader has closed. `Err(WouldBlock)` when
/// the buffer is full.
pub fn write(desc: *mut FileDescription, buf: &[u8]) -> KernelResult<usize> {
    // SAFETY: see `read`.
    let pipe = unsafe { &mut *(*desc).pipe };
    if pipe.readers == 0 {
        return Err(KernelError::BrokenPipe);
    }
    let free = CAPACITY - pipe.len;
    if free == 0 {
        return Err(KernelError::WouldBlock);
    }
    let n = buf.len().min(free);
    for &b in &buf[..n] {
        pipe.push(b);
    }
    Ok(n)
}

/// Drops the read-end description, decrementing the pipe's reader count and
/// freeing the pipe once both ends are gone.
///
/// # Safety
/// `desc` must be a `PipeRead` description with no other references.
pub unsafe fn close_read(desc: *mut FileDescription) {
    // SAFETY: forwarded from the caller's contract.
    unsafe {
        let pipe = (*desc).pipe;
        (*pipe).readers -= 1;
        drop(Box::from_raw(desc));
        maybe_free(pipe);
    }
}

/// Drops the write-end description. See `close_read`.
///
/// # Safety
/// `desc` must be a `PipeWrite` description with no other references.
pub unsafe fn close_write(desc: *mut FileDescription) {
    // SAFETY: forwarded from the caller's contract.
    unsafe {
        let pipe = (*desc).pipe;
        (*pipe).writers -= 1;
        drop(Box::from_raw(desc));
        maybe_free(pipe);
    }
}

fn maybe_free(pipe: *mut Pipe) {
    // SAFETY: `pipe` is only freed once both `readers` and `writers` reach
    // zero, meaning no description anywhere still points at it.
    unsafe {
        if (*pipe).readers == 0 && (*pipe).writers == 0 {
            drop(Box::from_raw(pipe));
        }
    }
}
