//! Boundary to physical memory management.
//!
//! The boot sequence hands over the kernel span, the boot information span
//! and the memory map; this module turns them into a frame allocator and
//! adopts the loader's kernel mapping.

mod address_space;
mod error;
mod frame_allocator;
mod remap;

pub use address_space::AddressSpace;
pub use error::{PagingError, PagingResult};
pub use frame_allocator::EarlyFrameAllocator;
pub use remap::{remap_kernel, PagingState};
