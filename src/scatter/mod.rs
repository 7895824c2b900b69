//! Forward/reverse block scatter between owned and ghost storage.
//!
//! A [`Distributor`] precomputes, per peer, which owned node blocks must be
//! serialized and which ghost positions must be deposited; a [`ScatterCtx`]
//! wraps those plans with paired message buffers and in-flight requests so
//! several vectors can scatter over one distributor concurrently without
//! aliasing, each on its own context.

pub mod context;
pub mod distributor;

pub use context::ScatterCtx;
pub use distributor::Distributor;

use crate::comm::CommTag;

/// How incoming values combine with local storage.
///
/// Extend-only: downstream match arms must tolerate new variants.
#[non_exhaustive]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VecOp {
    /// Overwrite the destination block.
    Insert,
    /// Accumulate into the destination block.
    Add,
}

/// Phase of a scatter context.
///
/// ```text
/// Idle -> begin_forward -> Forward -> end_forward -> Idle
/// Idle -> begin_reverse -> Reverse -> end_reverse -> Idle
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CtxState {
    Idle,
    Forward,
    Reverse,
}

/// Tag pair for the two scatter directions of one context.
#[derive(Copy, Clone, Debug)]
pub struct ScatterTags {
    /// Tag used by owner-to-ghost traffic.
    pub forward: CommTag,
    /// Tag used by ghost-to-owner traffic.
    pub reverse: CommTag,
}

impl ScatterTags {
    /// Construct tags from a base, assigning deterministic offsets per
    /// direction.
    #[inline]
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            forward: base,
            reverse: base.offset(1),
        }
    }
}
