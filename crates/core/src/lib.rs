#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

mod fragment;
mod mesh;
mod storage;

pub use fragment::*;
pub use mesh::*;
pub use storage::*;
