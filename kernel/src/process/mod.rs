//! Process control: the PCB, the global process table, and the ELF loader
//! used both for the initial process and for `exec`.
//!
//! Everything that changes a process's run state -- fork, exit, wait,
//! sleep, block -- lives in `sched::scheduler` instead, next to the
//! `schedule()` hinge those state changes feed into.

pub mod loader;
pub mod pcb;
pub mod table;
