//! # basalt
//!
//! Kernel substrate: segment table, interrupt dispatch, preemptive
//! round-robin scheduling and the free-list kernel heap.
//!
//! The library builds for the bare-metal target and, under `cfg(test)`, for
//! the host so the pure parts (descriptor encoding, dispatch routing,
//! scheduling, chunk bookkeeping) can be unit tested.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
pub mod serial;

pub mod config;
pub mod interrupts;
pub mod kernel;
pub mod memory;
pub mod registry;
pub mod task;
pub mod time;
