#![doc = include_str!("../README.md")]

mod common;
pub use common::*;
// Public re-export so downstream crates can reach the allocator through
// `seqlease_tonic_core::seqlease`.
pub use seqlease;
