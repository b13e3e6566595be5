//! Early x86_64 kernel bring-up.
//!
//! Builds the interrupt descriptor table, remaps the 8259 controllers,
//! programs the 8254 timer and checks the loader's boot information before
//! handing memory to the frame allocator.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod kernel;
pub mod logger;
pub mod paging;
pub mod port;
pub mod serial;
