#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod allocator;
mod bucket;
mod config;
mod error;
mod global;
mod pool;
mod section;
mod session;
mod store;
mod time;


pub use crate::allocator::*;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::global::*;
pub use crate::pool::*;
pub use crate::section::*;
pub use crate::session::*;
pub use crate::store::*;
pub use crate::time::*;
