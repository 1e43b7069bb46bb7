//! Snowflake-style composite IDs.
//!
//! A [`SnowflakeComposer`] packs elapsed time, a reserved clock field, a
//! sequence, its machine id and a key-derived gene into one non-negative
//! `i64` according to a validated [`Layout`].

mod composer;
mod gene;
mod layout;
#[cfg(test)]
mod tests;

pub use composer::*;
pub use gene::*;
pub use layout::*;
