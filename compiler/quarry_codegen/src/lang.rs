//! Structured control flow over [`CodeGen`](crate::CodeGen).
//!
//! These builders own the blocks and phis of one construct so callers never
//! wire loop headers, back edges or merge points by hand.

mod branch;
mod loops;
mod vector;

pub use branch::If;
pub use loops::{Loop, Range, VectorizedLoop};
pub use vector::Vector;
