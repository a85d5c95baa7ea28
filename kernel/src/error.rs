//! Kernel error types.
//!
//! `KernelError` never crosses the syscall ABI boundary directly -- the
//! dispatcher collapses every `Err` variant to `-1` before writing
//! `frame.eax` (see `syscall::dispatch`). The rich type exists so internal
//! call sites and log messages stay precise and so tests can assert on the
//! specific failure rather than a bare integer.

use core::fmt;

/// Main kernel error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    OutOfMemory {
        requested: usize,
        available: usize,
    },
    InvalidAddress {
        addr: usize,
    },
    UnmappedMemory {
        addr: usize,
    },
    ProcessNotFound {
        pid: u32,
    },
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
    InvalidArgument {
        name: &'static str,
        value: &'static str,
    },
    ResourceExhausted {
        resource: &'static str,
    },
    PermissionDenied {
        operation: &'static str,
    },
    /// The operation would need to block; the syscall dispatcher rewinds
    /// `EIP` and retries rather than ever writing this to `frame.eax`.
    WouldBlock,
    /// Write end closed with no readers, or read end closed with no writers.
    BrokenPipe,
    /// A singleton accessor was called before its module's `init()` ran.
    NotInitialized {
        subsystem: &'static str,
    },
    /// `exec` named a module the boot loader did not supply.
    NoSuchModule {
        name: [u8; 32],
        name_len: usize,
    },
    Elf(ElfError),
}

/// ELF-32 i386 loader validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfError {
    BadMagic,
    WrongClass,
    WrongEndianness,
    WrongType,
    WrongMachine,
    NoProgramHeaders,
    SegmentCrossesKernelBoundary,
    SegmentExceedsFile,
}

/// Result type alias for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory {
                requested,
                available,
            } => write!(
                f,
                "out of memory: requested {} bytes, {} available",
                requested, available
            ),
            Self::InvalidAddress { addr } => write!(f, "invalid address: 0x{:x}", addr),
            Self::UnmappedMemory { addr } => write!(f, "unmapped memory at 0x{:x}", addr),
            Self::ProcessNotFound { pid } => write!(f, "process {} not found", pid),
            Self::InvalidState { expected, actual } => {
                write!(f, "invalid state: expected {}, got {}", expected, actual)
            }
            Self::InvalidArgument { name, value } => {
                write!(f, "invalid argument '{}': {}", name, value)
            }
            Self::ResourceExhausted { resource } => write!(f, "resource exhausted: {}", resource),
            Self::PermissionDenied { operation } => {
                write!(f, "permission denied for operation: {}", operation)
            }
            Self::WouldBlock => write!(f, "operation would block"),
            Self::BrokenPipe => write!(f, "broken pipe"),
            Self::NotInitialized { subsystem } => {
                write!(f, "subsystem not initialized: {}", subsystem)
            }
            Self::NoSuchModule { name, name_len } => {
                let s = core::str::from_utf8(&name[..*name_len]).unwrap_or("?");
                write!(f, "no such module: {}", s)
            }
            Self::Elf(e) => write!(f, "ELF load error: {:?}", e),
        }
    }
}

impl From<ElfError> for KernelError {
    fn from(err: ElfError) -> Self {
        Self::Elf(err)
    }
}

/// Helper macro for easy error creation, mirroring the call-site shape of a
/// struct literal without repeating the enum path.
#[macro_export]
macro_rules! kernel_error {
    (OutOfMemory { requested: $req:expr, available: $avail:expr }) => {
        $crate::error::KernelError::OutOfMemory {
            requested: $req,
            available: $avail,
        }
    };
    (ProcessNotFound { pid: $pid:expr }) => {
        $crate::error::KernelError::ProcessNotFound { pid: $pid }
    };
    (InvalidArgument { $name:expr => $value:expr }) => {
        $crate::error::KernelError::InvalidArgument {
            name: $name,
            value: $value,
        }
    };
    ($variant:ident) => {
        $crate::error::KernelError::$variant
    };
}
