#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod allocator;
mod counter;
mod error;
mod rand;
mod status;
mod store;

pub use crate::allocator::*;
pub use crate::counter::*;
pub use crate::error::*;
pub use crate::rand::*;
pub use crate::status::*;
pub use crate::store::*;
