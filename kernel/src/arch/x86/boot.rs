//! Multiboot v1 header and the 32-bit protected-mode entry stub.
//!
//! The boot loader (GRUB, or QEMU's `-kernel`) only needs to find the
//! Multiboot header in the first 8 KiB of the image and jump to `_start` in
//! 32-bit protected mode with a flat GDT. Everything else -- the boot page
//! directory mapping the low 8 MiB at both `0x00000000` and `KERNEL_VMA`,
//! and the jump into the higher half -- is this kernel's own bootstrap.

use core::arch::{global_asm, naked_asm};

/// Virtual address the kernel is linked at; see `link.ld`.
pub const KERNEL_VMA: u32 = 0xC000_0000;
/// Size of the boot-mapped low region: every page-table and page-directory
/// frame must land inside it, so the kernel can always reach it through the
/// identity-plus-offset mapping.
pub const BOOT_MAPPED_BYTES: u32 = 8 * 1024 * 1024;

const MULTIBOOT_MAGIC: u32 = 0x1BAD_B002;
const MULTIBOOT_FLAGS: u32 = 0x0000_0003; // align modules on page boundaries + provide mem info
const MULTIBOOT_CHECKSUM: u32 = (0u32)
    .wrapping_sub(MULTIBOOT_MAGIC)
    .wrapping_sub(MULTIBOOT_FLAGS);

global_asm!(
    ".section .multiboot_header, \"a\"",
    ".align 4",
    ".long {magic}",
    ".long {flags}",
    ".long {checksum}",
    magic = const MULTIBOOT_MAGIC,
    flags = const MULTIBOOT_FLAGS,
    checksum = const MULTIBOOT_CHECKSUM,
);

/// Entry point named in `link.ld`'s `ENTRY(_start)`.
///
/// Runs with paging disabled, a flat 32-bit GDT from the boot loader, and
/// EBX holding the physical address of the Multiboot info block (the
/// Multiboot calling convention). Builds a boot page directory mapping the
/// first 8 MiB of physical memory at both `0x00000000` (so this code keeps
/// executing across the paging-enable instruction) and `KERNEL_VMA` (so the
/// higher half the linker script placed everything at resolves), enables
/// paging, and jumps to `higher_half_start`.
///
/// Gated out under `cfg(test)` (the lib's own unit-test harness binary
/// defines its own `_start`) and under the `qemu-exit` feature (the
/// integration test binaries under `tests/` each build their own with
/// `test_boot_entry!` below instead of falling into `kernel_main`) -- a
/// binary can only define one `_start` symbol.
#[cfg(not(any(test, feature = "qemu-exit")))]
#[unsafe(naked)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _start() -> ! {
    naked_asm!(
        "mov esp, offset {stack} + {stack_size}",

        // Save the Multiboot info pointer (physical) across the page setup.
        "mov edi, ebx",

        // Build a boot page directory with two pairs of 4 MiB (PSE) entries
        // covering BOOT_MAPPED_BYTES (8 MiB): entries 0-1 (identity) and
        // entries KERNEL_VMA>>22..+2 (higher half), each pair mapping
        // physical [0, 8 MiB) at its respective base.
        "mov eax, offset {boot_pd}",
        "mov ecx, 0x00000083", // present | writable | page-size-4M, frame 0
        "mov [eax], ecx",
        "mov ecx, 0x00400083", // present | writable | page-size-4M, frame at 4 MiB
        "mov [eax + 4], ecx",
        "mov ecx, 0x00000083",
        "mov dword ptr [eax + {kernel_pde_offset}], ecx",
        "mov ecx, 0x00400083",
        "mov dword ptr [eax + {kernel_pde_offset} + 4], ecx",

        // Enable PSE (4 MiB pages) in CR4.
        "mov eax, cr4",
        "or eax, 0x00000010",
        "mov cr4, eax",

        // Load CR3 with the boot page directory's physical address
        // (identity-mapped at this point, so virtual == physical).
        "mov eax, offset {boot_pd}",
        "mov cr3, eax",

        // Enable paging (CR0.PG) and write-protect for ring-0 (CR0.WP).
        "mov eax, cr0",
        "or eax, 0x80010000",
        "mov cr0, eax",

        // Jump to the higher-half virtual address of the next stub.
        "mov eax, offset {higher_half}",
        "jmp eax",

        stack = sym BOOT_STACK,
        stack_size = const BOOT_STACK_SIZE,
        boot_pd = sym BOOT_PAGE_DIRECTORY,
        kernel_pde_offset = const ((KERNEL_VMA >> 22) * 4),
        higher_half = sym higher_half_start,
    )
}

/// Runs from the higher-half virtual address once paging is live. Tears
/// down the low identity mapping (no longer needed once execution has moved
/// above `KERNEL_VMA`) and hands off to the Rust entry point.
#[cfg(not(any(test, feature = "qemu-exit")))]
#[unsafe(naked)]
unsafe extern "C" fn higher_half_start() -> ! {
    naked_asm!(
        "mov dword ptr [{boot_pd}], 0",
        "mov dword ptr [{boot_pd} + 4], 0",
        "mov eax, cr3",
        "mov cr3, eax", // flush the TLB now that entry 0 is cleared
        "mov esp, offset {stack} + {stack_size}",
        "push edi", // multiboot info physical address, saved in _start
        "call {kernel_main}",
        "2: hlt",
        "jmp 2b",
        boot_pd = sym BOOT_PAGE_DIRECTORY,
        stack = sym BOOT_STACK,
        stack_size = const BOOT_STACK_SIZE,
        kernel_main = sym crate::kernel_main,
    )
}

/// 16 KiB boot stack, reused until the first process's kernel stack takes
/// over at the first `schedule()` call.
const BOOT_STACK_SIZE: usize = 16 * 1024;
#[repr(align(16))]
struct BootStack([u8; BOOT_STACK_SIZE]);
static mut BOOT_STACK: BootStack = BootStack([0; BOOT_STACK_SIZE]);

/// The boot page directory, 4 KiB aligned, identity-mapping the low 8 MiB
/// twice over (`0x0` and `KERNEL_VMA`) using 4 MiB (PSE) pages. Torn down
/// (low half only) by `higher_half_start` once execution is safely above
/// `KERNEL_VMA`; `mm::vas` builds the real per-process directories using
/// 4 KiB pages via the page-table operator, copying this directory's
/// kernel half into each one.
#[repr(align(4096))]
struct BootPageDirectory([u32; 1024]);
static mut BOOT_PAGE_DIRECTORY: BootPageDirectory = BootPageDirectory([0; 1024]);

/// Physical address of the boot page directory, the reference copy of the
/// kernel's shared page-directory entries that every process address space
/// is synced against.
pub fn boot_directory_phys() -> u32 {
    &raw const BOOT_PAGE_DIRECTORY as u32
}

/// Builds a `_start` for a QEMU-exit test binary: the same paging bring-up
/// as the real `_start`/`higher_half_start` pair, ending in a call to
/// `$entry(multiboot_addr)` instead of `kernel_main`. Each integration test
/// under `tests/` is its own bootable image and needs this in place of the
/// lib's own entry point, which the `qemu-exit` feature compiles out.
#[cfg(feature = "qemu-exit")]
#[macro_export]
macro_rules! test_boot_entry {
    ($entry:path) => {
        const _: extern "C" fn(u32) -> ! = $entry;

        #[unsafe(naked)]
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn _start() -> ! {
            core::arch::naked_asm!(
                "mov esp, offset {stack} + {stack_size}",
                "mov edi, ebx",
                "mov eax, offset {boot_pd}",
                "mov ecx, 0x00000083",
                "mov [eax], ecx",
                "mov ecx, 0x00400083",
                "mov [eax + 4], ecx",
                "mov ecx, 0x00000083",
                "mov dword ptr [eax + {kernel_pde_offset}], ecx",
                "mov ecx, 0x00400083",
                "mov dword ptr [eax + {kernel_pde_offset} + 4], ecx",
                "mov eax, cr4",
                "or eax, 0x00000010",
                "mov cr4, eax",
                "mov eax, offset {boot_pd}",
                "mov cr3, eax",
                "mov eax, cr0",
                "or eax, 0x80010000",
                "mov cr0, eax",
                "mov eax, offset {higher_half}",
                "jmp eax",
                stack = sym __TEST_BOOT_STACK,
                stack_size = const $crate::arch::x86::boot::TEST_BOOT_STACK_SIZE,
                boot_pd = sym __TEST_BOOT_PAGE_DIRECTORY,
                kernel_pde_offset = const $crate::arch::x86::boot::test_kernel_pde_offset(),
                higher_half = sym __test_higher_half_start,
            )
        }

        #[unsafe(naked)]
        unsafe extern "C" fn __test_higher_half_start() -> ! {
            core::arch::naked_asm!(
                "mov dword ptr [{boot_pd}], 0",
                "mov dword ptr [{boot_pd} + 4], 0",
                "mov eax, cr3",
                "mov cr3, eax",
                "mov esp, offset {stack} + {stack_size}",
                "push edi",
                "call {entry}",
                "2: hlt",
                "jmp 2b",
                boot_pd = sym __TEST_BOOT_PAGE_DIRECTORY,
                stack = sym __TEST_BOOT_STACK,
                stack_size = const $crate::arch::x86::boot::TEST_BOOT_STACK_SIZE,
                entry = sym $entry,
            )
        }

        #[repr(align(16))]
        struct __TestBootStack([u8; $crate::arch::x86::boot::TEST_BOOT_STACK_SIZE]);
        static mut __TEST_BOOT_STACK: __TestBootStack =
            __TestBootStack([0; $crate::arch::x86::boot::TEST_BOOT_STACK_SIZE]);

        #[repr(align(4096))]
        struct __TestBootPageDirectory([u32; 1024]);
        static mut __TEST_BOOT_PAGE_DIRECTORY: __TestBootPageDirectory =
            __TestBootPageDirectory([0; 1024]);
    };
}

#[cfg(feature = "qemu-exit")]
pub const TEST_BOOT_STACK_SIZE: usize = BOOT_STACK_SIZE;

#[cfg(feature = "qemu-exit")]
pub const fn test_kernel_pde_offset() -> u32 {
    (KERNEL_VMA >> 22) * 4
}
