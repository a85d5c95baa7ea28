//! Multiboot v1 info-block parsing: memory map entries seed the physical
//! frame allocator; the module list is how `exec` resolves a program
//! image by basename.

const FLAG_MEM: u32 = 1 << 0;
const FLAG_MMAP: u32 = 1 << 6;
const FLAG_MODS: u32 = 1 << 3;

#[repr(C)]
struct RawMultibootInfo {
    flags: u32,
    mem_lower: u32,
    mem_upper: u32,
    boot_device: u32,
    cmdline: u32,
    mods_count: u32,
    mods_addr: u32,
    _syms: [u32; 4],
    mmap_length: u32,
    mmap_addr: u32,
    // remaining fields (drives, config_table, ...) are unused by this core
}

#[repr(C)]
struct RawMmapEntry {
    size: u32,
    base_addr_low: u32,
    base_addr_high: u32,
    length_low: u32,
    length_high: u32,
    entry_type: u32,
}

#[repr(C)]
struct RawModule {
    mod_start: u32,
    mod_end: u32,
    cmdline: u32,
    _pad: u32,
}

/// A RAM region from the memory map, `type == 1` entries only.
#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion {
    pub base: u32,
    pub length: u32,
}

/// A boot module: a program image the loader placed in memory, named by
/// the last path segment of its command line.
#[derive(Debug, Clone, Copy)]
pub struct Module {
    pub start: u32,
    pub end: u32,
    pub name: [u8; 32],
    pub name_len: usize,
}

impl Module {
    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len]).unwrap_or("")
    }

    pub fn bytes(&self) -> &'static [u8] {
        // SAFETY: mod_start/mod_end come from the boot loader's module list
        // and describe a region the loader guarantees is mapped and static
        // for the kernel's lifetime (identity-mapped low memory).
        unsafe {
            core::slice::from_raw_parts(self.start as *const u8, (self.end - self.start) as usize)
        }
    }
}

const MAX_MODULES: usize = 16;

/// Parsed view of the Multiboot info block. Owns no heap allocation so it
/// can be built before the kernel heap exists.
#[derive(Clone, Copy)]
pub struct MultibootInfo {
    mmap_addr: u32,
    mmap_length: u32,
    pub modules: [Option<Module>; MAX_MODULES],
    pub module_count: usize,
}

/// Parses the Multiboot info block at physical address `info_phys` (mapped
/// 1:1 in the boot-mapped low region, so physical == low virtual here).
///
/// # Safety
/// `info_phys` must be the pointer the boot loader left in EBX, still
/// reachable through the boot-mapped identity region.
pub unsafe fn parse(info_phys: u32) -> MultibootInfo {
    // SAFETY: see function contract.
    let info = unsafe { &*(info_phys as *const RawMultibootInfo) };

    let (mmap_addr, mmap_length) = if info.flags & FLAG_MMAP != 0 {
        (info.mmap_addr, info.mmap_length)
    } else {
        (0, 0)
    };

    let mut modules = [None; MAX_MODULES];
    let mut module_count = 0;
    if info.flags & FLAG_MODS != 0 {
        let count = (info.mods_count as usize).min(MAX_MODULES);
        for i in 0..count {
            // SAFETY: mods_addr points at `mods_count` contiguous RawModule
            // entries, per the Multiboot v1 spec; `i < mods_count`.
            let raw = unsafe { &*((info.mods_addr as usize + i * 16) as *const RawModule) };
            if let Some(module) = parse_module(raw) {
                modules[module_count] = Some(module);
                module_count += 1;
            }
        }
    }
    let _ = info.flags & FLAG_MEM; // mem_lower/mem_upper are a coarse fallback; mmap is preferred

    MultibootInfo {
        mmap_addr,
        mmap_length,
        modules,
        module_count,
    }
}

fn parse_module(raw: &RawModule) -> Option<Module> {
    if raw.cmdline == 0 {
        return None;
    }
    // SAFETY: `cmdline` is a NUL-terminated C string physical pointer, per
    // the Multiboot v1 module entry layout; bounded scan below caps length.
    let cmdline = unsafe { core::ffi::CStr::from_ptr(raw.cmdline as *const core::ffi::c_char) };
    let Ok(cmdline) = cmdline.to_str() else {
        return None;
    };
    if cmdline.is_empty() {
        return None;
    }
    // Basename extraction: scan backward for the last '/'.
    let basename = match cmdline.rfind('/') {
        Some(idx) => &cmdline[idx + 1..],
        None => cmdline,
    };
    if basename.is_empty() || basename.len() > 32 {
        return None;
    }
    let mut name = [0u8; 32];
    name[..basename.len()].copy_from_slice(basename.as_bytes());
    Some(Module {
        start: raw.mod_start,
        end: raw.mod_end,
        name,
        name_len: basename.len(),
    })
}

impl MultibootInfo {
    /// Iterates RAM (`type == 1`) regions from the memory map.
    pub fn ram_regions(&self) -> impl Iterator<Item = MemoryRegion> + '_ {
        let mut offset = 0u32;
        core::iter::from_fn(move || {
            while offset < self.mmap_length {
                // SAFETY: offset stays within [0, mmap_length) and each
                // entry's `size` field lets us skip to the next one without
                // knowing the exact struct variant in advance.
                let entry = unsafe {
                    &*((self.mmap_addr + offset) as *const RawMmapEntry)
                };
                let entry_total = entry.size + 4;
                offset += entry_total;
                if entry.entry_type == 1 {
                    return Some(MemoryRegion {
                        base: entry.base_addr_low,
                        length: entry.length_low,
                    });
                }
            }
            None
        })
    }

    pub fn find_module(&self, name: &str) -> Option<&Module> {
        self.modules[..self.module_count]
            .iter()
            .filter_map(|m| m.as_ref())
            .find(|m| m.name() == name)
    }
}

static STORED: spin::Mutex<Option<MultibootInfo>> = spin::Mutex::new(None);

/// Saves a copy of `info` for later lookup by `exec`, which runs long after
/// `kernel_main`'s own parsed copy has gone out of scope.
pub fn store(info: MultibootInfo) {
    *STORED.lock() = Some(info);
}

/// Runs `f` against the stored Multiboot info. Panics if called before
/// `store`, which `kernel_main` does immediately after parsing.
pub fn with<R>(f: impl FnOnce(&MultibootInfo) -> R) -> R {
    let guard = STORED.lock();
    f(guard.as_ref().expect("multiboot info not stored yet"))
}
