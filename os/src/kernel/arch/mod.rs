//! Architecture-specific device drivers.

pub mod x86;
