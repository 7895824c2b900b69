//! DofVecError: unified error type for the dofvec public APIs.
//!
//! All recoverable conditions are signaled through this enum; library code
//! never panics on bad sizes, absent indices, or misordered scatter phases.

use thiserror::Error;

use crate::scatter::CtxState;

/// Unified error type for dofvec operations.
#[derive(Debug, Error)]
pub enum DofVecError {
    /// A vector operation mixed operands of different local sizes.
    #[error("vector size mismatch: expected {expected} local entries, found {found}")]
    SizeMismatch { expected: usize, found: usize },
    /// The caller-provided value buffer does not match `n * bsize`.
    #[error("value buffer holds {found} scalars but {expected} are required")]
    ValueCountMismatch { expected: usize, found: usize },
    /// Block size must be positive.
    #[error("block size must be positive")]
    ZeroBlockSize,
    /// An owner range was rejected at construction.
    #[error("owner range must have one entry per rank plus one, start at zero and be non-decreasing")]
    InvalidOwnerRange,
    /// An index set was rejected at construction.
    #[error("index set must be strictly ascending and non-negative")]
    InvalidIndexSet,
    /// Binary search failed: the node is not in the external index set.
    #[error("node {0} is not in the external index set")]
    IndexNotFound(i64),
    /// A node id falls outside the global ownership range.
    #[error("node {id} is outside the global ownership range [0, {global})")]
    IndexOutOfRange { id: i64, global: i64 },
    /// A negative index decoded to a dependent node the table does not hold.
    #[error("dependent node {dep} is out of range (table holds {ndep})")]
    DepNodeOutOfRange { dep: usize, ndep: usize },
    /// The dependent-node CSR arrays are inconsistent.
    #[error("dependent-node table is malformed: {0}")]
    MalformedDepNodes(&'static str),
    /// A boundary-condition record carries more DoF indices than values.
    #[error("boundary condition lists {nvars} DoF indices but {nvals} values")]
    BcValueCountMismatch { nvars: usize, nvals: usize },
    /// A boundary-condition DoF index does not fit in the block.
    #[error("boundary-condition DoF index {var} is outside the block (bsize {bsize})")]
    BcVarOutOfRange { var: usize, bsize: usize },
    /// The operation needs a variable map but the vector was built bare.
    #[error("operation requires a variable map")]
    NoVarMap,
    /// A non-owned node was addressed on a vector without ghost storage.
    #[error("vector has no ghost storage; node {0} is not locally owned")]
    NoGhostStorage(i64),
    /// A dependent node was addressed on a vector without dependent storage.
    #[error("vector has no dependent-node storage; cannot address node {0}")]
    NoDepStorage(i64),
    /// A scatter phase was entered out of order.
    #[error("scatter context is {found:?} but {expected:?} is required")]
    ScatterState { expected: CtxState, found: CtxState },
    /// A peer exchange did not complete or delivered the wrong byte count.
    #[error("communication with rank {peer} failed: {reason}")]
    Comm { peer: usize, reason: String },
    /// Opening, reading or writing the vector file failed.
    #[error("failed to {op} `{path}`")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// The file header disagrees with the vector's global length.
    #[error("file `{path}` stores a vector of length {found}, expected {expected}")]
    FileLengthMismatch {
        path: String,
        expected: usize,
        found: usize,
    },
}
