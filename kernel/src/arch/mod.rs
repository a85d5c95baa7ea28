//! Architecture support. This core targets i386 only -- no 64-bit/long mode,
//! no SMP -- so there is a single `x86` module rather than a per-architecture
//! split.

pub mod x86;
