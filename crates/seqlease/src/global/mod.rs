//! Single-row counters for low-frequency identifiers.

mod allocator;
mod class;


pub use allocator::*;
pub use class::*;
