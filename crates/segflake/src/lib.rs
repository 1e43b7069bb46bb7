#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod codec;
mod error;
mod mutex;
mod registry;
mod segment;
mod snowflake;
mod status;
mod time;

pub use crate::codec::*;
pub use crate::error::*;
pub use crate::mutex::{Mutex, MutexGuard};
pub use crate::registry::*;
pub use crate::segment::*;
pub use crate::snowflake::*;
pub use crate::status::*;
pub use crate::time::*;
