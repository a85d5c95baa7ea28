//! Shared memory regions: a fixed table of up to 32 regions, each a run of
//! physical frames that any number of processes can map into their own
//! address space at a page-aligned virtual address of their choosing.
//!
//! A region is freed once every attaching process has detached (refcount
//! reaches zero), whether that happens through an explicit `shmdt` or
//! implicitly when a process exits.

use alloc::vec::Vec;

use spin::Mutex;

use crate::mm::{frame_allocator, page_table, FrameNumber, FRAME_SIZE, KERNEL_SPACE_START};
use crate::{KernelError, KernelResult};

const MAX_REGIONS: usize = 32;
const MAX_PAGES_PER_REGION: usize = 16;
pub const MAX_ATTACHMENTS_PER_PROCESS: usize = 8;

struct Region {
    frames: Vec<FrameNumber>,
    ref_count: usize,
}

static REGIONS: Mutex<[Option<Region>; MAX_REGIONS]> = Mutex::new([const { None }; MAX_REGIONS]);

/// Scratch virtual address used to zero a freshly allocated frame before it
/// is handed to a process, regardless of where in physical memory it
/// landed. Sits just below the kernel heap's reserved range.
const SCRATCH_VADDR: u32 = 0xCFFF_F000;

fn zero_frame(frame: FrameNumber) {
    let pd = page_table::current_directory();
    page_table::map(pd, SCRATCH_VADDR, frame.as_addr(), true, false);
    // SAFETY: `SCRATCH_VADDR` was just mapped to `frame` above, and nothing
    // else can observe it before the `unmap_nofree` below runs.
    unsafe {
        core::ptr::write_bytes(SCRATCH_VADDR as *mut u8, 0, FRAME_SIZE);
    }
    page_table::unmap_nofree(pd, SCRATCH_VADDR);
}

/// One process's record of a region it has mapped in, enough to unmap and
/// drop the reference on detach or exit.
#[derive(Debug, Clone, Copy)]
pub struct ShmAttachment {
    pub id: usize,
    pub vaddr: u32,
    pub pages: usize,
}

/// Allocates a new region of `size` bytes (rounded up to whole frames,
/// 1..=16 of them) and returns its id.
pub fn shmget(size: usize) -> KernelResult<usize> {
    if size == 0 {
        return Err(KernelError::InvalidArgument {
            name: "size",
            value: "zero",
        });
    }
    let pages = size.div_ceil(FRAME_SIZE);
    if pages > MAX_PAGES_PER_REGION {
        return Err(KernelError::InvalidArgument {
            name: "size",
            value: "exceeds the 16-page region limit",
        });
    }

    let mut regions = REGIONS.lock();
    let slot = regions
        .iter()
        .position(Option::is_none)
        .ok_or(KernelError::ResourceExhausted {
            resource: "shared memory regions",
        })?;

    let mut frames = Vec::with_capacity(pages);
    for _ in 0..pages {
        match frame_allocator::alloc() {
            Some(frame) => {
                zero_frame(frame);
                frames.push(frame);
            }
            None => {
                for frame in frames {
                    frame_allocator::free(frame);
                }
                return Err(KernelError::OutOfMemory {
                    requested: size,
                    available: frame_allocator::free_count() * FRAME_SIZE,
                });
            }
        }
    }

    regions[slot] = Some(Region {
        frames,
        ref_count: 0,
    });
    Ok(slot)
}

/// Maps region `id` into `pd` at `vaddr`, which must be page-aligned, land
/// entirely in user space, and not already appear among `attachments`
/// (capped at `MAX_ATTACHMENTS_PER_PROCESS`).
pub fn shmat(
    pd: page_table::PageDirectory,
    attachments: &mut Vec<ShmAttachment>,
    id: usize,
    vaddr: u32,
) -> KernelResult<()> {
    if id >= MAX_REGIONS {
        return Err(KernelError::InvalidArgument {
            name: "shmid",
            value: "out of range",
        });
    }
    if vaddr % FRAME_SIZE as u32 != 0 {
        return Err(KernelError::InvalidAddress {
            addr: vaddr as usize,
        });
    }
    if attachments.len() >= MAX_ATTACHMENTS_PER_PROCESS {
        return Err(KernelError::ResourceExhausted {
            resource: "shared memory attachments",
        });
    }

    let mut regions = REGIONS.lock();
    let region = regions[id]
        .as_mut()
        .ok_or(KernelError::InvalidArgument {
            name: "shmid",
            value: "no such region",
        })?;
    let size = region.frames.len() as u32 * FRAME_SIZE as u32;
    if vaddr.checked_add(size).is_none_or(|end| end > KERNEL_SPACE_START) {
        return Err(KernelError::InvalidAddress {
            addr: vaddr as usize,
        });
    }

    for (i, frame) in region.frames.iter().enumerate() {
        page_table::map(pd, vaddr + (i * FRAME_SIZE) as u32, frame.as_addr(), true, true);
    }
    region.ref_count += 1;
    attachments.push(ShmAttachment {
        id,
        vaddr,
        pages: region.frames.len(),
    });
    Ok(())
}

/// Unmaps the attachment at `vaddr` (which must match `size` exactly) from
/// `pd`, dropping the region's reference and freeing it once the last
/// attachment is gone.
pub fn shmdt(
    pd: page_table::PageDirectory,
    attachments: &mut Vec<ShmAttachment>,
    vaddr: u32,
    size: usize,
) -> KernelResult<()> {
    let index = attachments
        .iter()
        .position(|a| a.vaddr == vaddr)
        .ok_or(KernelError::InvalidAddress {
            addr: vaddr as usize,
        })?;
    let attachment = attachments[index];
    if size != attachment.pages * FRAME_SIZE {
        return Err(KernelError::InvalidArgument {
            name: "size",
            value: "does not match the attachment",
        });
    }

    detach_one(pd, attachment);
    attachments.remove(index);
    Ok(())
}

/// Unmaps and releases every attachment a process still holds, called from
/// `process::exit` so regions don't leak when a process dies without
/// calling `shmdt`.
pub fn detach_all(pd: page_table::PageDirectory, attachments: &mut Vec<ShmAttachment>) {
    for attachment in attachments.drain(..) {
        detach_one(pd, attachment);
    }
}

/// Physical address of the `index`-th frame backing region `id`. Used by
/// `fork` to re-point a child's copy of an inherited attachment at the
/// region's real frames instead of the private copies address-space
/// cloning would otherwise have made.
pub fn region_frame(id: usize, index: usize) -> u32 {
    REGIONS.lock()[id]
        .as_ref()
        .expect("region_frame called on a freed region")
        .frames[index]
        .as_addr()
}

/// Increments a region's refcount without touching any page table. Used by
/// `fork` when a child inherits an attachment: the mapping itself is fixed
/// up separately via `region_frame`, but the region's lifetime accounting
/// needs the extra reference regardless.
pub fn bump_region(id: usize) {
    if let Some(region) = REGIONS.lock()[id].as_mut() {
        region.ref_count += 1;
    }
}

fn detach_one(pd: page_table::PageDirectory, attachment: ShmAttachment) {
    for i in 0..attachment.pages {
        page_table::unmap_nofree(pd, attachment.vaddr + (i * FRAME_SIZE) as u32);
    }

    let mut regions = REGIONS.lock();
    if let Some(region) = regions[attachment.id].as_mut() {
        region.ref_count -= 1;
        if region.ref_count == 0 {
            for frame in region.frames.drain(..) {
                frame_allocator::free(frame);
            }
            regions[attachment.id] = None;
        }
    }
}
