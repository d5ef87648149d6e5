mod intervals;
mod large_array;

pub use intervals::*;
pub use large_array::*;
