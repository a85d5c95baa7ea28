//! `sbrk` and the shared-memory syscalls (`shmget`/`shmat`/`shmdt`).

use crate::ipc::shared_memory;
use crate::mm::{frame_allocator, page_table, FrameNumber, FRAME_SIZE, KERNEL_SPACE_START};
use crate::sched::scheduler;
use crate::{KernelError, KernelResult};

/// Scratch VA for zeroing a freshly allocated heap page before mapping it
/// into the caller -- the frame may land anywhere in physical memory, not
/// just the boot-mapped low region.
const SCRATCH_VADDR: u32 = 0xCFFF_D000;

fn zero_frame(frame: FrameNumber) {
    let pd = page_table::current_directory();
    page_table::map(pd, SCRATCH_VADDR, frame.as_addr(), true, false);
    // SAFETY: `SCRATCH_VADDR` was just mapped to `frame` above and nothing
    // else observes it before the `unmap_nofree` below.
    unsafe {
        core::ptr::write_bytes(SCRATCH_VADDR as *mut u8, 0, FRAME_SIZE);
    }
    page_table::unmap_nofree(pd, SCRATCH_VADDR);
}

/// `sbrk(increment)`: grows (or, if negative, would shrink -- rejected) the
/// caller's heap break by `increment` bytes, mapping whole pages as needed,
/// and returns the break's value *before* the adjustment.
pub fn sys_sbrk(increment: i32) -> KernelResult<isize> {
    if increment < 0 {
        return Err(KernelError::InvalidArgument {
            name: "increment",
            value: "sbrk cannot shrink the heap",
        });
    }

    scheduler::with_current(|p| {
        let old_break = p.heap_break;
        let new_break = old_break
            .checked_add(increment as u32)
            .filter(|&b| b <= KERNEL_SPACE_START)
            .ok_or(KernelError::InvalidAddress {
                addr: old_break as usize,
            })?;

        let mut page = old_break & !0xFFF;
        // Always start mapping from the page boundary at or below
        // `old_break`, since a partially-mapped final page from a previous
        // call may need no new frame but later ones do.
        if page < old_break && page_table::get_phys_in(p.page_dir, page) != 0 {
            page += FRAME_SIZE as u32;
        }
        while page < new_break {
            let frame = frame_allocator::alloc().ok_or(KernelError::OutOfMemory {
                requested: FRAME_SIZE,
                available: frame_allocator::free_count() * FRAME_SIZE,
            })?;
            zero_frame(frame);
            page_table::map(p.page_dir, page, frame.as_addr(), true, true);
            page += FRAME_SIZE as u32;
        }

        p.heap_break = new_break;
        Ok(old_break as isize)
    })
}

pub fn sys_shmget(size: u32) -> KernelResult<isize> {
    shared_memory::shmget(size as usize).map(|id| id as isize)
}

pub fn sys_shmat(id: u32, vaddr: u32) -> KernelResult<isize> {
    scheduler::with_current(|p| {
        shared_memory::shmat(p.page_dir, &mut p.shm_attachments, id as usize, vaddr)
    })?;
    Ok(vaddr as isize)
}

pub fn sys_shmdt(vaddr: u32, size: u32) -> KernelResult<isize> {
    scheduler::with_current(|p| {
        shared_memory::shmdt(p.page_dir, &mut p.shm_attachments, vaddr, size as usize)
    })?;
    Ok(0)
}
