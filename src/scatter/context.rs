//! Per-operation scatter context: message buffers plus in-flight requests.

use crate::comm::Communicator;
use crate::error::DofVecError;
use crate::scatter::{CtxState, ScatterTags};

/// Buffer-and-request bundle scoped to one in-flight scatter.
///
/// A context belongs to the distributor that created it and carries the block
/// size it was created for. The send staging buffers are allocated once, at
/// creation, and reused by every scatter on this context.
pub struct ScatterCtx<C: Communicator> {
    pub(crate) bsize: usize,
    pub(crate) tags: ScatterTags,
    pub(crate) state: CtxState,
    /// One buffer per forward-send peer (owned blocks serialized to ghosts).
    pub(crate) fwd_send: Vec<Vec<f64>>,
    /// One buffer per reverse-send peer (ghost blocks returned to owners).
    pub(crate) rev_send: Vec<Vec<f64>>,
    pub(crate) send_reqs: Vec<C::SendHandle>,
    pub(crate) recv_reqs: Vec<C::RecvHandle>,
}

impl<C: Communicator> ScatterCtx<C> {
    pub(crate) fn new(
        bsize: usize,
        tags: ScatterTags,
        fwd_send_counts: &[usize],
        rev_send_counts: &[usize],
    ) -> Self {
        Self {
            bsize,
            tags,
            state: CtxState::Idle,
            fwd_send: fwd_send_counts
                .iter()
                .map(|&n| vec![0.0; bsize * n])
                .collect(),
            rev_send: rev_send_counts
                .iter()
                .map(|&n| vec![0.0; bsize * n])
                .collect(),
            send_reqs: Vec::new(),
            recv_reqs: Vec::new(),
        }
    }

    /// Block size this context was created for.
    #[inline]
    pub fn bsize(&self) -> usize {
        self.bsize
    }

    /// Current phase.
    #[inline]
    pub fn state(&self) -> CtxState {
        self.state
    }

    pub(crate) fn require(&self, expected: CtxState) -> Result<(), DofVecError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(DofVecError::ScatterState {
                expected,
                found: self.state,
            })
        }
    }
}
