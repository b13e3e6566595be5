//! Legacy x86 interrupt and timer chips.

pub mod pic;
pub mod pit;
