//! Ready queue and blocked list: plain FIFO structures over PIDs, looked up
//! in `process::table` for the PCB itself.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use lazy_static::lazy_static;
use spin::Mutex;

pub struct Queues {
    ready: VecDeque<u32>,
    /// Sleeping or syscall-blocked PIDs. FIFO among equal wake ticks falls
    /// out of scanning this in insertion order.
    blocked: Vec<u32>,
}

lazy_static! {
    static ref QUEUES: Mutex<Queues> = Mutex::new(Queues {
        ready: VecDeque::new(),
        blocked: Vec::new(),
    });
}

pub fn push_ready(pid: u32) {
    QUEUES.lock().ready.push_back(pid);
}

pub fn pop_ready() -> Option<u32> {
    QUEUES.lock().ready.pop_front()
}

pub fn push_blocked(pid: u32) {
    QUEUES.lock().blocked.push(pid);
}

/// Removes and returns every blocked PID for which `wake(pid)` is true, in
/// the order they were inserted.
pub fn drain_blocked_where(mut wake: impl FnMut(u32) -> bool) -> Vec<u32> {
    let mut queues = QUEUES.lock();
    let mut woken = Vec::new();
    queues.blocked.retain(|&pid| {
        if wake(pid) {
            woken.push(pid);
            false
        } else {
            true
        }
    });
    woken
}

/// Drops `pid` from either queue, used when a blocked process is reaped or
/// otherwise removed without going through the normal wake path.
pub fn remove(pid: u32) {
    let mut queues = QUEUES.lock();
    queues.ready.retain(|&p| p != pid);
    queues.blocked.retain(|&p| p != pid);
}
