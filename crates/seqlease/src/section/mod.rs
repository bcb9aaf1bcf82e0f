//! The range lease cache.
//!
//! Maps each coarse shard (`entity_key / shard_width`) to the `[min, max)`
//! range currently leased for it from the durable store.

mod range;
mod table;


pub use range::*;
pub use table::*;
