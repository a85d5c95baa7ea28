//! `sleep(ms)`: blocks the caller until at least `ms` milliseconds have
//! elapsed, via the scheduler's tick-based wake mechanism.

use crate::sched::scheduler;
use crate::KernelResult;

pub fn sys_sleep(ms: u32) -> KernelResult<isize> {
    scheduler::sleep_current(ms as u64);
    Ok(0)
}
