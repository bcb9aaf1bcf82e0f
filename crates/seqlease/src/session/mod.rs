//! Per-entity sequence cursors drawn from the shard leases.

mod cursor;
mod table;


pub use cursor::*;
pub use table::*;
