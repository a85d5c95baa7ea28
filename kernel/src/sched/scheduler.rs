//! The round-robin scheduler: the `schedule(esp) -> esp` hinge the IRQ0 and
//! `int 0x80` entry stubs call through, plus the handful of entry points
//! (`sleep_current`, `block_current`, `exit_current`, `fork_current`,
//! `waitpid_current`) syscall handlers use to change a process's state
//! before the next reschedule picks up the change.

use core::mem::size_of;
use core::sync::atomic::{AtomicU32, Ordering};

use alloc::vec::Vec;

use crate::arch::x86::context::TrapFrame;
use crate::arch::x86::{gdt, timer};
use crate::fd::FdTable;
use crate::ipc::shared_memory::{self, ShmAttachment};
use crate::mm::page_table::{self, PageDirectory};
use crate::mm::{frame_allocator, vas, FrameNumber, FRAME_SIZE};
use crate::process::pcb::ProcState;
use crate::process::table;

use super::queue;

static CURRENT: AtomicU32 = AtomicU32::new(0);

/// Idle process's trivial "program": `hlt` forever. Run at ring 3 like any
/// other process so it needs no special case in `schedule`'s iret path.
const IDLE_CODE: [u8; 3] = [0xF4, 0xEB, 0xFD]; // hlt; jmp $-3
const IDLE_CODE_VADDR: u32 = 0x0000_1000;
const IDLE_STACK_VADDR: u32 = 0x0000_2000;

pub fn current_pid() -> u32 {
    CURRENT.load(Ordering::Relaxed)
}

/// Runs `f` against the current process's PCB.
pub fn with_current<R>(f: impl FnOnce(&mut crate::process::pcb::Pcb) -> R) -> R {
    table::with(current_pid(), f).expect("current process missing from the table")
}

/// Brings up the scheduler: builds the idle process (PID 0) and makes it
/// `current`. Must run after `mm::init` and before interrupts are enabled.
pub fn init() {
    let pd = vas::create();

    let code_frame = frame_allocator::alloc().expect("out of memory building the idle process");
    write_frame_bytes(code_frame, &IDLE_CODE);
    page_table::map(pd, IDLE_CODE_VADDR, code_frame.as_addr(), false, true);

    let stack_frame = frame_allocator::alloc().expect("out of memory building the idle process");
    page_table::map(pd, IDLE_STACK_VADDR, stack_frame.as_addr(), true, true);

    let pid = table::create_idle(pd, FdTable::new_with_standard_streams());
    table::with(pid, |p| {
        let frame = TrapFrame::init(IDLE_CODE_VADDR, IDLE_STACK_VADDR + FRAME_SIZE as u32);
        let frame_addr = p.kernel_stack_top() - size_of::<TrapFrame>() as u32;
        // SAFETY: `frame_addr` lands within the kernel stack `table::create_idle`
        // just allocated for this PCB; nothing else has touched it yet.
        unsafe {
            *(frame_addr as *mut TrapFrame) = frame;
        }
        p.kernel_esp = frame_addr;
        p.state = ProcState::Running;
    });
    CURRENT.store(pid, Ordering::Relaxed);

    log::info!("[SCHED] idle process ready, pid {pid}");
}

/// Writes `bytes` into `frame`, valid as long as `frame` lands in the
/// boot-mapped low region -- true here since this runs during early boot
/// with almost all of physical memory still free and the allocator's
/// lowest-first policy in effect.
fn write_frame_bytes(frame: FrameNumber, bytes: &[u8]) {
    let phys = frame.as_addr();
    assert!(
        (phys as usize) < crate::arch::x86::boot::BOOT_MAPPED_BYTES as usize,
        "idle code frame landed outside the boot-mapped region"
    );
    // SAFETY: `phys` is below the boot-mapped limit, asserted above, so
    // `phys + KERNEL_VMA` is a live identity-plus-offset mapping.
    unsafe {
        let dst = (phys + crate::arch::x86::boot::KERNEL_VMA) as *mut u8;
        core::ptr::write_bytes(dst, 0, FRAME_SIZE);
        core::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
    }
}

/// Registers a freshly created process as runnable. Used by `fork` and the
/// initial-process loader.
pub fn spawn_ready(pid: u32) {
    table::with(pid, |p| p.state = ProcState::Ready);
    queue::push_ready(pid);
}

/// Called from the naked IRQ0/`int 0x80` entry stubs with the trap ESP and
/// whether this is a syscall trap. Dispatches the syscall (if any), ticks
/// the clock (if not), then always reschedules.
///
/// # Safety
/// `esp` must point at a valid `TrapFrame` just pushed by the calling stub.
#[unsafe(no_mangle)]
pub extern "C" fn schedule_from_trap(esp: u32, is_syscall: u32) -> u32 {
    if is_syscall != 0 {
        // SAFETY: forwarded from the caller's contract.
        let frame = unsafe { &mut *(esp as *mut TrapFrame) };
        crate::syscall::dispatch(frame);
    } else {
        timer::on_tick();
    }
    schedule(esp)
}

/// The `schedule(esp) -> esp` algorithm: save the interrupted process's
/// stack pointer, wake any sleepers whose tick has come, pick the next
/// ready process (falling back to idle), and point the hardware at it.
fn schedule(esp: u32) -> u32 {
    let prev = current_pid();
    let was_running = table::with(prev, |p| {
        p.kernel_esp = esp;
        let running = p.state == ProcState::Running;
        if running {
            p.state = ProcState::Ready;
        }
        running
    })
    .unwrap_or(false);
    if was_running {
        queue::push_ready(prev);
    }

    let ticks = timer::get_ticks();
    for pid in queue::drain_blocked_where(|pid| {
        table::with(pid, |p| p.wake_tick <= ticks).unwrap_or(false)
    }) {
        table::with(pid, |p| p.state = ProcState::Ready);
        queue::push_ready(pid);
    }

    let next = queue::pop_ready().unwrap_or(0);
    table::with(next, |p| p.state = ProcState::Running);
    CURRENT.store(next, Ordering::Relaxed);

    let (stack_top, page_dir) = table::with(next, |p| (p.kernel_stack_top(), p.page_dir)).unwrap();
    gdt::set_kernel_stack(stack_top);
    vas::load(page_dir);

    table::with(next, |p| p.kernel_esp).unwrap()
}

/// Blocks the current process until at least `ms` milliseconds have
/// elapsed.
pub fn sleep_current(ms: u64) {
    let wake = timer::get_ticks() + timer::ms_to_ticks(ms);
    block_until(wake);
}

/// Blocks the current process, to be retried (via syscall restart) on the
/// very next tick -- the uniform mechanism behind both "pipe not ready" and
/// "no zombie child yet" blocking.
pub fn block_current() {
    block_until(timer::get_ticks() + 1);
}

fn block_until(wake_tick: u64) {
    let pid = current_pid();
    table::with(pid, |p| {
        p.state = ProcState::Blocked;
        p.wake_tick = wake_tick;
    });
    queue::push_blocked(pid);
}

/// `exit(code)`: releases every resource the process owns except the PCB
/// and exit code itself, which survive until a parent `wait` reaps them.
pub fn exit_current(code: i32) {
    let pid = current_pid();
    table::with(pid, |p| {
        shared_memory::detach_all(p.page_dir, &mut p.shm_attachments);
        p.fds.close_all();
        vas::destroy(p.page_dir);
        p.exit_code = code;
        p.state = ProcState::Zombie;
    });
}

/// `fork()`: deep-clones the caller's address space and FD table, shares
/// (refcount-bumped) shared-memory attachments, and clones the trap frame
/// with the syscall-return register zeroed so the child sees a `0` return.
pub fn fork_current() -> Option<u32> {
    let ppid = current_pid();
    let (parent_pd, child_fds, parent_shm, parent_esp, parent): (
        PageDirectory,
        FdTable,
        Vec<ShmAttachment>,
        u32,
        u32,
    ) = table::with(ppid, |p| {
        (
            p.page_dir,
            p.fds.fork_from(),
            p.shm_attachments.clone(),
            p.kernel_esp,
            p.parent,
        )
    })?;
    let _ = parent;

    let child_pd = vas::copy(parent_pd);

    // `vas::copy` deep-clones every present user page, including the ones
    // backing shared-memory attachments. Re-point those at the region's
    // real frames (freeing the private copy `copy` made) so parent and
    // child keep seeing each other's writes, matching `region_frame`'s
    // contract.
    for att in &parent_shm {
        shared_memory::bump_region(att.id);
        for i in 0..att.pages {
            let vaddr = att.vaddr + (i * FRAME_SIZE) as u32;
            let stray = page_table::get_phys_in(child_pd, vaddr);
            if stray != 0 {
                frame_allocator::free(FrameNumber::from_addr(stray));
            }
            page_table::map(child_pd, vaddr, shared_memory::region_frame(att.id, i), true, true);
        }
    }

    let child_pid = table::create(ppid, child_pd, child_fds);

    // SAFETY: `parent_esp` is the live TrapFrame for the `int 0x80` this
    // call is handling.
    let mut frame = unsafe { *(parent_esp as *const TrapFrame) };
    frame.set_return(0);

    table::with(child_pid, |c| {
        c.shm_attachments = parent_shm;
        let frame_addr = c.kernel_stack_top() - size_of::<TrapFrame>() as u32;
        // SAFETY: within the freshly allocated, otherwise untouched kernel
        // stack for `child_pid`.
        unsafe {
            *(frame_addr as *mut TrapFrame) = frame;
        }
        c.kernel_esp = frame_addr;
    });

    spawn_ready(child_pid);
    Some(child_pid)
}

/// `waitpid(-1)`: reaps the first zombie child if one exists, otherwise
/// blocks the caller for a syscall restart on the next tick.
pub fn waitpid_current() -> Option<(u32, i32)> {
    let ppid = current_pid();
    let child = table::find_zombie_child(ppid)?;
    let pcb = table::remove(child)?;
    // SAFETY: the address space and FDs were already released in
    // `exit_current`; only the kernel stack remains to free.
    unsafe {
        crate::mm::heap::kfree(pcb.kernel_stack_base(), table::kernel_stack_layout());
    }
    Some((child, pcb.exit_code))
}
