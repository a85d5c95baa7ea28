//! Round-robin scheduling: the ready queue and the `schedule()` hinge that
//! every trap eventually calls through.

pub mod queue;
pub mod scheduler;

pub use scheduler::init;
