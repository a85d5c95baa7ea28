//! Physical frame allocator: a single bitmap over the whole 4 GiB physical
//! address space, one bit per 4 KiB frame.
//!
//! Allocation is lowest-address-first. That is a contract higher layers
//! depend on, not just an optimization: page-table frames must land in the
//! boot-mapped low 8 MiB so the kernel can reach them through the identity
//! mapping, and lowest-first allocation is what makes that true in practice
//! as long as low memory has free frames.

use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::arch::x86::multiboot::MultibootInfo;

pub const FRAME_SIZE: usize = 4096;

const TOTAL_FRAMES: usize = 1 << 20; // 4 GiB / 4 KiB
const WORDS: usize = TOTAL_FRAMES / 64;

unsafe extern "C" {
    static __kernel_end_phys: u8;
}

const KERNEL_LMA: u32 = 0x0010_0000;

/// A physical frame number (physical address / 4096).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FrameNumber(pub u32);

impl FrameNumber {
    pub const fn as_addr(self) -> u32 {
        self.0 * FRAME_SIZE as u32
    }

    pub const fn from_addr(addr: u32) -> Self {
        Self(addr / FRAME_SIZE as u32)
    }
}

struct Bitmap {
    /// 1 = free, 0 = used.
    words: [u64; WORDS],
    free_frames: AtomicUsize,
    used_frames: AtomicUsize,
}

impl Bitmap {
    const fn empty() -> Self {
        Self {
            words: [0u64; WORDS],
            free_frames: AtomicUsize::new(0),
            used_frames: AtomicUsize::new(TOTAL_FRAMES),
        }
    }

    fn mark_free(&mut self, frame: usize) {
        let word = frame / 64;
        let bit = frame % 64;
        if self.words[word] & (1 << bit) == 0 {
            self.words[word] |= 1 << bit;
            *self.free_frames.get_mut() += 1;
            *self.used_frames.get_mut() -= 1;
        }
    }

    fn mark_used(&mut self, frame: usize) {
        let word = frame / 64;
        let bit = frame % 64;
        if self.words[word] & (1 << bit) != 0 {
            self.words[word] &= !(1 << bit);
            *self.free_frames.get_mut() -= 1;
            *self.used_frames.get_mut() += 1;
        }
    }

    /// Lowest-first: scan word by word, using the lowest set bit.
    fn alloc(&mut self) -> Option<usize> {
        for (i, word) in self.words.iter_mut().enumerate() {
            if *word != 0 {
                let bit = word.trailing_zeros() as usize;
                *word &= *word - 1; // clear lowest set bit
                self.free_frames.fetch_sub(1, Ordering::Relaxed);
                self.used_frames.fetch_add(1, Ordering::Relaxed);
                return Some(i * 64 + bit);
            }
        }
        None
    }

    fn free(&mut self, frame: usize) {
        let word = frame / 64;
        let bit = frame % 64;
        if self.words[word] & (1 << bit) != 0 {
            panic!("double free of physical frame {}", frame);
        }
        self.words[word] |= 1 << bit;
        self.free_frames.fetch_add(1, Ordering::Relaxed);
        self.used_frames.fetch_sub(1, Ordering::Relaxed);
    }
}

static BITMAP: Mutex<Bitmap> = Mutex::new(Bitmap::empty());

/// Marks RAM regions free, then re-marks the kernel image and any boot
/// modules as used, per the component's documented initialization order.
///
/// # Safety
/// Must run exactly once, before any other `mm` init step.
pub unsafe fn init(info: &MultibootInfo) {
    let mut bitmap = BITMAP.lock();

    for region in info.ram_regions() {
        let start_frame = (region.base / FRAME_SIZE as u32) as usize;
        let end = region.base.saturating_add(region.length);
        let end_frame = (end as usize / FRAME_SIZE).min(TOTAL_FRAMES);
        for f in start_frame..end_frame {
            bitmap.mark_free(f);
        }
    }

    // SAFETY: `__kernel_end_phys` is a linker-defined symbol; its address
    // (not its value) is the physical end of the kernel image.
    let kernel_end_phys = unsafe { &__kernel_end_phys as *const u8 as u32 };
    let kernel_start_frame = (KERNEL_LMA / FRAME_SIZE as u32) as usize;
    let kernel_end_frame = kernel_end_phys.div_ceil(FRAME_SIZE as u32) as usize;
    for f in kernel_start_frame..kernel_end_frame {
        bitmap.mark_used(f);
    }

    // Frame 0 is never handed out: it backs the BIOS data area and doubles
    // as a reliable "null frame" sentinel.
    bitmap.mark_used(0);

    for module in info.modules[..info.module_count].iter().flatten() {
        let start_frame = (module.start / FRAME_SIZE as u32) as usize;
        let end_frame = module.end.div_ceil(FRAME_SIZE as u32) as usize;
        for f in start_frame..end_frame.min(TOTAL_FRAMES) {
            bitmap.mark_used(f);
        }
    }

    log::info!(
        "[PFA] {} frames free, {} used",
        bitmap.free_frames.load(Ordering::Relaxed),
        bitmap.used_frames.load(Ordering::Relaxed)
    );
}

/// Allocates the lowest-addressed free frame.
pub fn alloc() -> Option<FrameNumber> {
    BITMAP.lock().alloc().map(|f| FrameNumber(f as u32))
}

/// Frees a previously allocated frame. Fatal (panics) on double-free or an
/// out-of-range frame number.
pub fn free(frame: FrameNumber) {
    let idx = frame.0 as usize;
    assert!(idx < TOTAL_FRAMES, "frame {} out of range", idx);
    BITMAP.lock().free(idx);
}

pub fn free_count() -> usize {
    BITMAP.lock().free_frames.load(Ordering::Relaxed)
}

pub fn used_count() -> usize {
    BITMAP.lock().used_frames.load(Ordering::Relaxed)
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn alloc_free_restores_free_count() {
        let mut bitmap = Bitmap::empty();
        bitmap.mark_free(10);
        bitmap.mark_free(11);
        let before = bitmap.free_frames.load(Ordering::Relaxed);
        let f = bitmap.alloc().expect("frame 10 or 11 should be available");
        bitmap.free(f);
        assert_eq!(bitmap.free_frames.load(Ordering::Relaxed), before);
    }

    #[test]
    fn alloc_is_lowest_first() {
        let mut bitmap = Bitmap::empty();
        bitmap.mark_free(5);
        bitmap.mark_free(3);
        bitmap.mark_free(70);
        assert_eq!(bitmap.alloc(), Some(3));
        assert_eq!(bitmap.alloc(), Some(5));
        assert_eq!(bitmap.alloc(), Some(70));
        assert_eq!(bitmap.alloc(), None);
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_panics() {
        let mut bitmap = Bitmap::empty();
        bitmap.mark_free(4);
        let f = bitmap.alloc().unwrap();
        bitmap.free(f);
        bitmap.free(f); // second free of the same frame must panic
    }

    #[test]
    fn allocations_are_distinct_until_freed() {
        let mut bitmap = Bitmap::empty();
        for i in 0..8 {
            bitmap.mark_free(i);
        }
        let mut seen = [false; 8];
        for _ in 0..8 {
            let f = bitmap.alloc().unwrap();
            assert!(!seen[f], "frame {} allocated twice", f);
            seen[f] = true;
        }
        assert_eq!(bitmap.alloc(), None);
    }
}
