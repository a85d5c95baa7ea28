//! Kernel heap: a `linked_list_allocator::LockedHeap` whose backing pages
//! are mapped on demand, up to a fixed virtual-address cap reserved at
//! init time.
//!
//! The cap is carved out of the kernel's shared half of every address
//! space (above `KERNEL_VMA`). The page tables backing it live in the
//! boot page directory; because `vas::copy`/`vas::create` copy the boot
//! directory's kernel PDEs by value, any address space created after a
//! growth step picks up the new mapping automatically, and one created
//! before it is refreshed via `vas::sync_kernel_mappings`.

use linked_list_allocator::LockedHeap;

use super::{frame_allocator, page_table};
use crate::arch::x86::boot;

/// Virtual base of the kernel heap, chosen just past the kernel image's own
/// higher-half range.
const HEAP_START: u32 = 0xD000_0000;
/// Upper bound on heap growth (16 MiB).
const HEAP_MAX: u32 = 16 * 1024 * 1024;
/// Bytes mapped and handed to the allocator at boot.
const INITIAL_SIZE: u32 = 256 * 1024;
/// Bytes mapped per `grow` call once the initial region is exhausted.
const GROW_STEP: u32 = 256 * 1024;

#[cfg_attr(target_os = "none", global_allocator)]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

static mut MAPPED: u32 = 0;

fn boot_directory() -> page_table::PageDirectory {
    page_table::PageDirectory {
        phys: boot::boot_directory_phys(),
    }
}

/// Maps `INITIAL_SIZE` bytes of the heap range and hands that region to
/// the global allocator.
///
/// # Safety
/// Must run once, after `frame_allocator::init`, before any `alloc`/`Box`/
/// `Vec` use.
pub unsafe fn init() {
    map_more(INITIAL_SIZE);
    // SAFETY: `HEAP_START..+INITIAL_SIZE` was just mapped above and is
    // otherwise unused kernel address space.
    unsafe {
        ALLOCATOR
            .lock()
            .init(HEAP_START as *mut u8, INITIAL_SIZE as usize);
        MAPPED = INITIAL_SIZE;
    }
    log::info!(
        "[HEAP] {} KiB mapped, {} KiB reserved",
        INITIAL_SIZE / 1024,
        HEAP_MAX / 1024
    );
}

/// Maps up to `want` additional bytes starting at the current high-water
/// mark, stopping early if the frame allocator runs dry. Returns the
/// number of bytes actually mapped.
fn map_more(want: u32) -> u32 {
    // SAFETY: the kernel heap grows only while interrupts are disabled
    // (allocator code paths run with interrupts off inside the kernel).
    let mapped = unsafe { MAPPED };
    let want = want.min(HEAP_MAX.saturating_sub(mapped));
    let pd = boot_directory();
    let mut offset = 0u32;
    while offset < want {
        let frame = match frame_allocator::alloc() {
            Some(f) => f,
            None => break,
        };
        page_table::map(
            pd,
            HEAP_START + mapped + offset,
            frame.as_addr(),
            true,
            false,
        );
        offset += frame_allocator::FRAME_SIZE as u32;
    }
    offset
}

/// Maps `GROW_STEP` more bytes and extends the allocator. Called when an
/// allocation fails against the current arena. Returns `false` if the
/// heap is already at `HEAP_MAX` or out of physical memory.
fn grow() -> bool {
    let offset = map_more(GROW_STEP);
    if offset == 0 {
        return false;
    }
    // SAFETY: the mapped range is contiguous with the allocator's current
    // top, which `extend` requires.
    unsafe {
        ALLOCATOR.lock().extend(offset as usize);
        MAPPED += offset;
        log::info!("[HEAP] grew to {} KiB", MAPPED / 1024);
    }
    true
}

/// Allocates `layout`-compatible memory from the kernel heap, growing the
/// backing arena once and retrying on the first failure.
pub fn kmalloc(layout: core::alloc::Layout) -> *mut u8 {
    // SAFETY: delegates to the global allocator; retried once after growth.
    unsafe {
        let ptr = core::alloc::GlobalAlloc::alloc(&ALLOCATOR, layout);
        if !ptr.is_null() {
            return ptr;
        }
        if grow() {
            core::alloc::GlobalAlloc::alloc(&ALLOCATOR, layout)
        } else {
            core::ptr::null_mut()
        }
    }
}

/// Frees memory previously returned by `kmalloc`.
///
/// # Safety
/// `ptr`/`layout` must match a prior `kmalloc` call exactly, as required by
/// `GlobalAlloc::dealloc`.
pub unsafe fn kfree(ptr: *mut u8, layout: core::alloc::Layout) {
    // SAFETY: forwarded from the caller's contract.
    unsafe {
        core::alloc::GlobalAlloc::dealloc(&ALLOCATOR, ptr, layout);
    }
}
