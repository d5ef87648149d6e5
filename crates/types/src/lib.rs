#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![no_std]

extern crate alloc;

mod archive;
mod serialize;
mod table;

pub use archive::*;
pub use serialize::*;
pub use table::*;
