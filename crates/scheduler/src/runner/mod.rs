//! Scheduler runner -- owns the worker pool and drives task state.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, constructors, the task API and accessors
//! - `dispatch`: tick, run loop and worker execution
//! - `outcome`: state transitions when a work unit reports back

mod core;
mod dispatch;
mod outcome;

pub use self::core::Scheduler;
