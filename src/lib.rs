//! # dofvec
//!
//! dofvec provides the distributed block vector used as the state and
//! residual vessel in parallel finite-element solvers. A block vector
//! partitions a set of nodes across processes; each node carries a fixed
//! number of scalar degrees of freedom (the block size). The crate supplies
//! the communication and index machinery that makes local scatter-writes,
//! gather-reads and global reductions composable behind a small numerical
//! API.
//!
//! ## Features
//! - BLAS-1 operations over the global partition (`norm`, `dot`, fused
//!   `mdot` with a single reduction, `axpy`, `axpby`, ...)
//! - Forward (owner → ghost) and reverse (ghost → owner) block scatter with
//!   explicit begin/end pairs and per-context state tracking
//! - Dependent nodes: negative ids expanding to weighted sums of real nodes
//! - Dirichlet boundary-condition application
//! - Process-count-independent binary file I/O and reproducible random fill
//! - Pluggable communicator backends: serial, intra-process threads, and
//!   MPI behind the `mpi-support` feature
//!
//! ## Usage
//! Add `dofvec` as a dependency in your `Cargo.toml` and enable features as
//! needed:
//!
//! ```toml
//! [dependencies]
//! dofvec = "0.1"
//! # Optional features:
//! # features = ["mpi-support"]
//! ```
//!
//! A vector is assembled from shared, immutable collaborators: a [`VarMap`]
//! (ownership ranges), an optional [`Distributor`] over an external
//! [`IndexSet`] (ghost exchange), an optional [`DepNodes`] table and an
//! optional [`BcMap`]. All are held by `Arc` and outlive every vector that
//! references them.
//!
//! [`VarMap`]: map::VarMap
//! [`Distributor`]: scatter::Distributor
//! [`IndexSet`]: map::IndexSet
//! [`DepNodes`]: map::DepNodes
//! [`BcMap`]: map::BcMap

pub mod comm;
pub mod error;
pub mod flops;
pub mod map;
pub mod scatter;
pub mod vec;

/// A convenient prelude importing the most-used types.
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::comm::{CommTag, Communicator, NoComm, ThreadComm, Wait};
    pub use crate::error::DofVecError;
    pub use crate::map::{BcMap, DepNodes, IndexSet, VarMap};
    pub use crate::scatter::{CtxState, Distributor, ScatterCtx, VecOp};
    pub use crate::vec::BVec;
}
