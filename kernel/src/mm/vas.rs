//! Address-space manager: creates, clones, and destroys per-process page
//! directories, and keeps the shared kernel half of every directory in
//! sync as the kernel heap grows.

use super::{frame_allocator::FrameNumber, page_table, page_table::PageDirectory};
use crate::arch::x86::boot::{BOOT_MAPPED_BYTES, KERNEL_VMA};

/// First user-space PDE index; everything at or above this index is the
/// shared kernel half of every address space.
const KERNEL_PDE_START: usize = (KERNEL_VMA >> 22) as usize; // 768
const PDE_COUNT: usize = 1024;
const PRESENT: u32 = 1 << 0;
const PAGE_SIZE_4M: u32 = 1 << 7;

fn boot_directory() -> PageDirectory {
    PageDirectory {
        phys: crate::arch::x86::boot::boot_directory_phys(),
    }
}

fn dir_table(pd: PageDirectory) -> &'static mut [u32; PDE_COUNT] {
    assert!(pd.phys < BOOT_MAPPED_BYTES);
    // SAFETY: every `PageDirectory` in this kernel lives in a frame within
    // the boot-mapped low region, per the page-table operator's contract.
    unsafe { &mut *((pd.phys + KERNEL_VMA) as *mut [u32; PDE_COUNT]) }
}

fn alloc_directory_frame() -> PageDirectory {
    let frame = super::frame_allocator::alloc().expect("out of memory creating a page directory");
    let phys = frame.as_addr();
    assert!(
        phys < BOOT_MAPPED_BYTES,
        "page-directory frame {:#x} landed outside the boot-mapped region",
        phys
    );
    let pd = PageDirectory { phys };
    dir_table(pd).fill(0);
    pd
}

/// Creates a fresh address space: zeroed user half, kernel half copied by
/// value from the boot directory.
pub fn create() -> PageDirectory {
    let pd = alloc_directory_frame();
    sync_kernel_mappings(pd);
    pd
}

/// Re-copies the kernel PDEs (indices 768-1023) from the boot directory
/// into `pd`. Must be called after the kernel heap grows so that an older
/// address space a future context switch loads still sees the new tables.
pub fn sync_kernel_mappings(pd: PageDirectory) {
    let boot = dir_table(boot_directory());
    let dst = dir_table(pd);
    dst[KERNEL_PDE_START..].copy_from_slice(&boot[KERNEL_PDE_START..]);
}

/// Deep-clones `src`: every present user page is copied into a freshly
/// allocated frame in the new directory. Kernel PDEs are shared by
/// reference (same table/page frames as the source).
pub fn copy(src: PageDirectory) -> PageDirectory {
    let child = alloc_directory_frame();
    sync_kernel_mappings(child);

    let src_table = dir_table(src);
    for pdi in 0..KERNEL_PDE_START {
        let pde = src_table[pdi];
        if pde & PRESENT == 0 || pde & PAGE_SIZE_4M != 0 {
            continue;
        }
        let user = pde & (1 << 2) != 0;
        // SAFETY: `pde` names a page-table frame in the boot-mapped region,
        // the page-table operator's invariant for every present PDE.
        let src_pt = unsafe { &*((pde & !0xFFF) as *const u32 as *const [u32; PDE_COUNT]) };
        for pti in 0..PDE_COUNT {
            let pte = src_pt[pti];
            if pte & PRESENT == 0 {
                continue;
            }
            let writable = pte & (1 << 1) != 0;
            let src_frame = pte & !0xFFF;
            let dst_frame = super::frame_allocator::alloc()
                .expect("out of memory copying an address space")
                .as_addr();

            // SAFETY: `src_frame` is a present user page (mapped and
            // readable); `dst_frame` was just allocated and is writable
            // through the kernel's identity-plus-offset window as long as
            // it is below the boot-mapped limit, which PFA's lowest-first
            // policy guarantees while physical memory below that limit
            // remains free.
            unsafe {
                copy_frame(src_frame, dst_frame);
            }

            let vaddr = ((pdi as u32) << 22) | ((pti as u32) << 12);
            page_table::map(child, vaddr, dst_frame, writable, user);
        }
    }

    child
}

/// Copies one 4 KiB frame, identified by physical address, through the
/// boot-mapped identity-plus-offset window. Both addresses must be below
/// `BOOT_MAPPED_BYTES`.
///
/// # Safety
/// Caller must ensure `src` is a readable, fully-initialized page and
/// `dst` is exclusively owned by the caller for the duration of the copy.
unsafe fn copy_frame(src: u32, dst: u32) {
    assert!(src < BOOT_MAPPED_BYTES && dst < BOOT_MAPPED_BYTES);
    // SAFETY: both addresses are below the boot-mapped limit (asserted
    // above), so `+ KERNEL_VMA` resolves to a live kernel mapping; caller
    // upholds the rest.
    unsafe {
        let src_ptr = (src + KERNEL_VMA) as *const u8;
        let dst_ptr = (dst + KERNEL_VMA) as *mut u8;
        core::ptr::copy_nonoverlapping(src_ptr, dst_ptr, super::frame_allocator::FRAME_SIZE);
    }
}

/// Frees every present user frame and page-table frame in `pd`, then the
/// directory frame itself. Does not touch the kernel half (shared, owned
/// by the boot directory).
pub fn destroy(pd: PageDirectory) {
    let table = dir_table(pd);
    for pdi in 0..KERNEL_PDE_START {
        let pde = table[pdi];
        if pde & PRESENT == 0 || pde & PAGE_SIZE_4M != 0 {
            continue;
        }
        // SAFETY: see `copy`.
        let pt = unsafe { &*((pde & !0xFFF) as *const u32 as *const [u32; PDE_COUNT]) };
        for pte in pt.iter() {
            if pte & PRESENT != 0 {
                super::frame_allocator::free(FrameNumber::from_addr(pte & !0xFFF));
            }
        }
        super::frame_allocator::free(FrameNumber::from_addr(pde & !0xFFF));
    }
    super::frame_allocator::free(FrameNumber::from_addr(pd.phys));
}

/// Installs `pd` into the hardware page-directory-base register.
pub fn load(pd: PageDirectory) {
    page_table::load_directory(pd);
}
