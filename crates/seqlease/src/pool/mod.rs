//! A generic pool of reusable connections.
//!
//! ## Structure
//!
//! - [`ConnectionManager`]: opens, closes and health-checks connections.
//! - [`FnManager`]: a [`ConnectionManager`] assembled from closures.
//! - [`PoolConfig`]: idle/active limits and idle timeout.
//! - [`Pool`]: the pool itself.

mod config;
mod interface;
mod resource;

#[cfg(test)]
mod tests;

pub use config::*;
pub use interface::*;
pub use resource::*;
