//! Cache-backed segment allocation.
//!
//! Ids for a business key come from two tiers:
//!
//! - a shared cache holding the current window `(cur, max]` per key, advanced
//!   only by the atomic [`INCR`] and [`REPL`] scripts, and
//! - a durable store holding one strictly increasing counter row per key,
//!   from which new windows are reserved under a row lock.
//!
//! [`SegmentAllocator`] drives both through the [`SegmentCache`] and
//! [`SegmentStore`] contracts. [`MemoryCache`] and [`MemoryStore`] are
//! in-process bindings of those contracts.

mod allocator;
mod cache;
mod script;
mod store;
mod types;

pub use allocator::*;
pub use cache::*;
pub use script::*;
pub use store::*;
pub use types::*;
