//! ELF-32 i386 program loader: turns a boot module's bytes into a fresh
//! process with its own address space, user stack, and initial trap frame.

use crate::arch::x86::context::TrapFrame;
use crate::arch::x86::multiboot::MultibootInfo;
use crate::error::ElfError;
use crate::fd::FdTable;
use crate::mm::page_table::{self, PageDirectory};
use crate::mm::{frame_allocator, vas, FrameNumber, FRAME_SIZE, KERNEL_SPACE_START};
use crate::sched::scheduler;
use crate::{KernelError, KernelResult};

use super::table;

const EI_MAG: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELFCLASS32: u8 = 1;
const ELFDATA2LSB: u8 = 1;
const ET_EXEC: u16 = 2;
const EM_386: u16 = 3;
const PT_LOAD: u32 = 1;

const USER_STACK_PAGES: usize = 4;
const USER_STACK_TOP: u32 = 0xB000_0000;

struct ElfHeader {
    entry: u32,
    phoff: u32,
    phentsize: u16,
    phnum: u16,
}

struct ProgramHeader {
    p_type: u32,
    p_offset: u32,
    p_vaddr: u32,
    p_filesz: u32,
    p_memsz: u32,
}

fn read_u16(bytes: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([bytes[off], bytes[off + 1]])
}

fn read_u32(bytes: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
}

fn parse_header(bytes: &[u8]) -> Result<ElfHeader, ElfError> {
    if bytes.len() < 52 || bytes[0..4] != EI_MAG {
        return Err(ElfError::BadMagic);
    }
    if bytes[4] != ELFCLASS32 {
        return Err(ElfError::WrongClass);
    }
    if bytes[5] != ELFDATA2LSB {
        return Err(ElfError::WrongEndianness);
    }
    let e_type = read_u16(bytes, 16);
    if e_type != ET_EXEC {
        return Err(ElfError::WrongType);
    }
    let e_machine = read_u16(bytes, 18);
    if e_machine != EM_386 {
        return Err(ElfError::WrongMachine);
    }
    let phnum = read_u16(bytes, 44);
    if phnum == 0 {
        return Err(ElfError::NoProgramHeaders);
    }
    Ok(ElfHeader {
        entry: read_u32(bytes, 24),
        phoff: read_u32(bytes, 28),
        phentsize: read_u16(bytes, 42),
        phnum,
    })
}

fn program_header(bytes: &[u8], header: &ElfHeader, index: u16) -> ProgramHeader {
    let off = header.phoff as usize + index as usize * header.phentsize as usize;
    ProgramHeader {
        p_type: read_u32(bytes, off),
        p_offset: read_u32(bytes, off + 4),
        p_vaddr: read_u32(bytes, off + 8),
        p_filesz: read_u32(bytes, off + 16),
        p_memsz: read_u32(bytes, off + 20),
    }
}

/// Scratch VA used to copy bytes into a freshly allocated user page. The
/// destination frame may land anywhere in physical memory, not just the
/// boot-mapped low region `vas`/`page_table`'s internal bookkeeping relies
/// on, so it must go through a temporary mapping rather than a direct
/// `+ KERNEL_VMA` cast.
const SCRATCH_VADDR: u32 = 0xCFFF_E000;

fn write_user_page(frame: FrameNumber, page_off: u32, data: &[u8]) {
    let pd = page_table::current_directory();
    page_table::map(pd, SCRATCH_VADDR, frame.as_addr(), true, false);
    // SAFETY: `SCRATCH_VADDR` was just mapped to `frame` above and nothing
    // else observes it before the `unmap_nofree` below.
    unsafe {
        core::ptr::write_bytes(SCRATCH_VADDR as *mut u8, 0, FRAME_SIZE);
        let dst = (SCRATCH_VADDR + page_off) as *mut u8;
        core::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
    }
    page_table::unmap_nofree(pd, SCRATCH_VADDR);
}

/// Loads every `PT_LOAD` segment of `bytes` into `pd`, returning the initial
/// heap break: the page-aligned end address of the highest loaded segment.
fn load_segments(pd: PageDirectory, bytes: &[u8], header: &ElfHeader) -> KernelResult<u32> {
    let mut heap_break = 0u32;
    for i in 0..header.phnum {
        let ph = program_header(bytes, header, i);
        if ph.p_type != PT_LOAD {
            continue;
        }
        if ph.p_vaddr >= KERNEL_SPACE_START {
            return Err(ElfError::SegmentCrossesKernelBoundary.into());
        }
        let file_end = ph
            .p_offset
            .checked_add(ph.p_filesz)
            .ok_or(ElfError::SegmentExceedsFile)?;
        if file_end as usize > bytes.len() {
            return Err(ElfError::SegmentExceedsFile.into());
        }

        let seg_start = ph.p_vaddr & !0xFFF;
        let seg_end = (ph.p_vaddr + ph.p_memsz).div_ceil(FRAME_SIZE as u32) * FRAME_SIZE as u32;
        heap_break = heap_break.max(seg_end);

        let mut vaddr = seg_start;
        while vaddr < seg_end {
            let frame = frame_allocator::alloc().ok_or(KernelError::OutOfMemory {
                requested: FRAME_SIZE,
                available: frame_allocator::free_count() * FRAME_SIZE,
            })?;

            // Portion of this page, if any, that falls within the segment's
            // on-disk range [p_vaddr, p_vaddr + p_filesz); the rest of the
            // page is BSS, left zeroed by `write_user_page`.
            let page_lo = vaddr;
            let page_hi = vaddr + FRAME_SIZE as u32;
            let copy_lo = page_lo.max(ph.p_vaddr);
            let copy_hi = page_hi.min(ph.p_vaddr + ph.p_filesz);
            if copy_lo < copy_hi {
                let file_off = ph.p_offset + (copy_lo - ph.p_vaddr);
                let len = (copy_hi - copy_lo) as usize;
                write_user_page(
                    frame,
                    copy_lo - page_lo,
                    &bytes[file_off as usize..file_off as usize + len],
                );
            } else {
                write_user_page(frame, 0, &[]);
            }

            page_table::map(pd, vaddr, frame.as_addr(), true, true);
            vaddr += FRAME_SIZE as u32;
        }
    }
    Ok(heap_break)
}

fn build_user_stack(pd: PageDirectory) -> u32 {
    let stack_bottom = USER_STACK_TOP - (USER_STACK_PAGES * FRAME_SIZE) as u32;
    for i in 0..USER_STACK_PAGES {
        let frame = frame_allocator::alloc().expect("out of memory building a user stack");
        write_user_page(frame, 0, &[]);
        page_table::map(
            pd,
            stack_bottom + (i * FRAME_SIZE) as u32,
            frame.as_addr(),
            true,
            true,
        );
    }
    USER_STACK_TOP
}

/// Resolves `name` among the boot modules, builds a fresh process around
/// its ELF image, and registers it as ready to run. Used both for the
/// initial process at boot and for `exec` of a process replacing itself.
pub fn spawn_from_module(multiboot: &MultibootInfo, name: &str) -> KernelResult<()> {
    let module = multiboot.find_module(name).ok_or_else(|| no_such_module(name))?;
    let bytes = module.bytes();
    let header = parse_header(bytes)?;

    let pd = vas::create();
    let heap_break = load_segments(pd, bytes, &header)?;
    let user_esp = build_user_stack(pd);

    let pid = table::create(0, pd, FdTable::new_with_standard_streams());
    table::with(pid, |p| {
        p.heap_break = heap_break;
        let frame = TrapFrame::init(header.entry, user_esp);
        let frame_addr = p.kernel_stack_top() - core::mem::size_of::<TrapFrame>() as u32;
        // SAFETY: `frame_addr` lands within the kernel stack just allocated
        // for this PCB; nothing else has touched it yet.
        unsafe {
            *(frame_addr as *mut TrapFrame) = frame;
        }
        p.kernel_esp = frame_addr;
    });
    scheduler::spawn_ready(pid);
    Ok(())
}

/// Replaces the calling process's own address space and trap frame with a
/// freshly loaded image, in place -- the `exec` syscall. Releases the old
/// address space only after the new one has loaded successfully, so a
/// failed `exec` leaves the caller untouched.
pub fn exec_current(multiboot: &MultibootInfo, name: &str) -> KernelResult<()> {
    let module = multiboot.find_module(name).ok_or_else(|| no_such_module(name))?;
    let bytes = module.bytes();
    let header = parse_header(bytes)?;

    let new_pd = vas::create();
    let heap_break = match load_segments(new_pd, bytes, &header) {
        Ok(heap_break) => heap_break,
        Err(e) => {
            vas::destroy(new_pd);
            return Err(e);
        }
    };
    let user_esp = build_user_stack(new_pd);

    let pid = scheduler::current_pid();
    table::with(pid, |p| {
        let old_pd = p.page_dir;
        // Detach shared-memory regions first: `vas::destroy` frees every
        // present user frame unconditionally, and a shared region's frames
        // are not this process's to free.
        crate::ipc::shared_memory::detach_all(old_pd, &mut p.shm_attachments);
        vas::destroy(old_pd);

        p.page_dir = new_pd;
        p.heap_break = heap_break;

        let frame = TrapFrame::init(header.entry, user_esp);
        let frame_addr = p.kernel_stack_top() - core::mem::size_of::<TrapFrame>() as u32;
        // SAFETY: the caller's own kernel stack, exclusively owned while
        // the syscall that invoked `exec_current` is running.
        unsafe {
            *(frame_addr as *mut TrapFrame) = frame;
        }
        p.kernel_esp = frame_addr;
    });
    page_table::load_directory(new_pd);
    Ok(())
}

fn no_such_module(name: &str) -> KernelError {
    let mut name_buf = [0u8; 32];
    let len = name.len().min(32);
    name_buf[..len].copy_from_slice(&name.as_bytes()[..len]);
    KernelError::NoSuchModule {
        name: name_buf,
        name_len: len,
    }
}
