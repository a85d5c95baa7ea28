//! Inter-process communication: anonymous pipes and shared memory regions.
//!
//! Both are built on the memory-management primitives in `mm` and share its
//! error type; there is no separate IPC-specific error enum.

pub mod pipe;
pub mod shared_memory;
