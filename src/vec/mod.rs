//! The distributed block vector and its binary I/O.

pub mod bvec;
mod io;

pub use bvec::BVec;
