//! Regeneration server: the application context that wires presets, regions,
//! selections, the scheduler and persistence together, plus the timers and
//! directory layout the binary needs.

pub mod context;
pub mod platform;
pub mod timer;

pub use context::{BreakOutcome, RegenContext, ShutdownReport};
pub use platform::PlatformDirs;
pub use timer::IntervalTimer;

#[cfg(test)]
mod lifecycle_tests;
