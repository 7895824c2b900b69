//! Distributor: precomputed peer plans for forward and reverse block scatter.
//!
//! Construction is collective. Each rank groups its ghost ids by owner and
//! ships the request lists to the owning ranks, which record the owned node
//! offsets they must serialize per peer. Plans are node-granular; contexts
//! scale them by the block size.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use crate::comm::{wire, CommTag, Communicator, Wait};
use crate::error::DofVecError;
use crate::map::{IndexSet, VarMap};
use crate::scatter::{CtxState, ScatterCtx, ScatterTags, VecOp};

/// Node offsets exchanged with one peer.
#[derive(Clone, Debug)]
struct PeerPlan {
    rank: usize,
    /// Node-granular offsets: into the ghost array on the receive side,
    /// into the owned array on the send side.
    offsets: Vec<usize>,
}

/// Precomputed scatter plans between one [`VarMap`] and one external
/// [`IndexSet`].
pub struct Distributor<C: Communicator> {
    map: Arc<VarMap<C>>,
    ext: Arc<IndexSet>,
    base: CommTag,
    next_ctx: AtomicU16,
    /// Peers owning our ghosts; forward traffic arrives from them.
    recv_plan: Vec<PeerPlan>,
    /// Peers ghosting our owned nodes; forward traffic departs to them.
    send_plan: Vec<PeerPlan>,
}

impl<C: Communicator> Distributor<C> {
    /// Collectively build the scatter plans. `base` seeds the tag space for
    /// the plan exchange and for every context created later; distributors
    /// sharing a communicator must use distinct bases.
    pub fn new(
        map: Arc<VarMap<C>>,
        ext: Arc<IndexSet>,
        base: CommTag,
    ) -> Result<Self, DofVecError> {
        let comm = map.comm();
        let rank = comm.rank();
        let size = comm.size();

        // Group ghost positions by owning rank. The index set is ascending
        // and ownership ranges are contiguous, so each owner holds one run.
        let mut owners = Vec::with_capacity(ext.len());
        let mut counts = vec![0u32; size];
        for id in ext.iter() {
            let owner = map.find_owner(id)?;
            if owner == rank {
                // A locally-owned id has no business in the ghost set.
                return Err(DofVecError::InvalidIndexSet);
            }
            counts[owner] += 1;
            owners.push(owner);
        }
        let mut recv_plan = Vec::new();
        let mut pos = 0;
        while pos < owners.len() {
            let owner = owners[pos];
            let start = pos;
            while pos < owners.len() && owners[pos] == owner {
                pos += 1;
            }
            recv_plan.push(PeerPlan {
                rank: owner,
                offsets: (start..pos).collect(),
            });
        }

        // Tell every owner how many of its nodes we ghost, then exchange the
        // id lists themselves.
        let mut incoming = vec![0u32; size];
        comm.alltoall_u32(&counts, &mut incoming);

        let mut pending = Vec::new();
        for peer in 0..size {
            if peer != rank && incoming[peer] > 0 {
                let mut template = vec![0u8; incoming[peer] as usize * 8];
                pending.push((peer, comm.irecv(peer, base.as_u16(), &mut template)));
            }
        }
        for plan in &recv_plan {
            let ids: Vec<i64> = plan
                .offsets
                .iter()
                .map(|&k| ext.as_slice()[k])
                .collect();
            let _ = comm
                .isend(plan.rank, base.as_u16(), wire::cast_slice(&ids))
                .wait();
        }

        let (lo, _) = map.local_range();
        let mut send_plan = Vec::with_capacity(pending.len());
        for (peer, handle) in pending {
            let raw = handle.wait().ok_or_else(|| DofVecError::Comm {
                peer,
                reason: "ghost request list lost".into(),
            })?;
            let ids: Vec<i64> = wire::cast_slice_from(&raw);
            if ids.len() != incoming[peer] as usize {
                return Err(DofVecError::Comm {
                    peer,
                    reason: format!(
                        "expected {} requested ids, got {}",
                        incoming[peer],
                        ids.len()
                    ),
                });
            }
            let mut offsets = Vec::with_capacity(ids.len());
            for id in ids {
                if !map.owns(id) {
                    return Err(DofVecError::Comm {
                        peer,
                        reason: format!("rank {peer} requested non-owned node {id}"),
                    });
                }
                offsets.push((id - lo) as usize);
            }
            send_plan.push(PeerPlan {
                rank: peer,
                offsets,
            });
        }

        let dist = Self {
            map,
            ext,
            base,
            next_ctx: AtomicU16::new(0),
            recv_plan,
            send_plan,
        };
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        dist.debug_assert_invariants();
        Ok(dist)
    }

    #[cfg(any(debug_assertions, feature = "check-invariants"))]
    fn debug_assert_invariants(&self) {
        let dim = self.map.dim();
        for plan in &self.send_plan {
            assert!(
                plan.offsets.iter().all(|&off| off < dim),
                "send plan for rank {} addresses past the owned array",
                plan.rank
            );
        }
        let n_ext = self.ext.len();
        let mut covered = vec![false; n_ext];
        for plan in &self.recv_plan {
            for &off in &plan.offsets {
                assert!(off < n_ext && !covered[off], "ghost position multiply assigned");
                covered[off] = true;
            }
        }
        assert!(
            covered.iter().all(|&c| c),
            "every ghost position must have exactly one source peer"
        );
    }

    /// The ghost list this distributor serves (ascending).
    #[inline]
    pub fn indices(&self) -> &Arc<IndexSet> {
        &self.ext
    }

    /// Number of ghost nodes.
    #[inline]
    pub fn dim(&self) -> usize {
        self.ext.len()
    }

    /// The ownership map this distributor was built over.
    #[inline]
    pub fn var_map(&self) -> &Arc<VarMap<C>> {
        &self.map
    }

    /// Create a context for block size `bsize`.
    ///
    /// Collective in order: all ranks must create contexts on a distributor
    /// in the same sequence so the per-context tag pairs stay symmetric.
    pub fn create_ctx(&self, bsize: usize) -> Result<ScatterCtx<C>, DofVecError> {
        if bsize == 0 {
            return Err(DofVecError::ZeroBlockSize);
        }
        let k = self.next_ctx.fetch_add(1, Ordering::Relaxed);
        let tags = ScatterTags::from_base(self.base.offset(1 + 2 * k));
        let fwd_counts: Vec<usize> = self.send_plan.iter().map(|p| p.offsets.len()).collect();
        let rev_counts: Vec<usize> = self.recv_plan.iter().map(|p| p.offsets.len()).collect();
        Ok(ScatterCtx::new(bsize, tags, &fwd_counts, &rev_counts))
    }

    fn check_arrays(
        &self,
        ctx: &ScatterCtx<C>,
        owned_len: usize,
        ghost_len: usize,
    ) -> Result<(), DofVecError> {
        let want_owned = ctx.bsize * self.map.dim();
        if owned_len != want_owned {
            return Err(DofVecError::SizeMismatch {
                expected: want_owned,
                found: owned_len,
            });
        }
        let want_ghost = ctx.bsize * self.ext.len();
        if ghost_len != want_ghost {
            return Err(DofVecError::SizeMismatch {
                expected: want_ghost,
                found: ghost_len,
            });
        }
        Ok(())
    }

    /// Post receives for ghost values, pack owned blocks and post sends.
    pub fn begin_forward(
        &self,
        ctx: &mut ScatterCtx<C>,
        owned: &[f64],
        ghost: &mut [f64],
    ) -> Result<(), DofVecError> {
        ctx.require(CtxState::Idle)?;
        self.check_arrays(ctx, owned.len(), ghost.len())?;
        let comm = self.map.comm();
        let b = ctx.bsize;
        let tag = ctx.tags.forward.as_u16();

        for plan in &self.recv_plan {
            let mut template = vec![0u8; 8 * b * plan.offsets.len()];
            ctx.recv_reqs
                .push(comm.irecv(plan.rank, tag, &mut template));
        }
        for (plan, buf) in self.send_plan.iter().zip(ctx.fwd_send.iter_mut()) {
            for (j, &off) in plan.offsets.iter().enumerate() {
                buf[b * j..b * (j + 1)].copy_from_slice(&owned[b * off..b * (off + 1)]);
            }
            ctx.send_reqs
                .push(comm.isend(plan.rank, tag, wire::cast_slice(buf)));
        }
        ctx.state = CtxState::Forward;
        Ok(())
    }

    /// Wait for ghost values and deposit them (assignment semantics).
    pub fn end_forward(
        &self,
        ctx: &mut ScatterCtx<C>,
        owned: &[f64],
        ghost: &mut [f64],
    ) -> Result<(), DofVecError> {
        ctx.require(CtxState::Forward)?;
        self.check_arrays(ctx, owned.len(), ghost.len())?;
        let b = ctx.bsize;

        for (plan, handle) in self.recv_plan.iter().zip(ctx.recv_reqs.drain(..)) {
            let raw = handle.wait().ok_or_else(|| DofVecError::Comm {
                peer: plan.rank,
                reason: "forward scatter payload lost".into(),
            })?;
            let vals: Vec<f64> = wire::cast_slice_from(&raw);
            if vals.len() != b * plan.offsets.len() {
                return Err(DofVecError::Comm {
                    peer: plan.rank,
                    reason: format!(
                        "expected {} scalars, got {}",
                        b * plan.offsets.len(),
                        vals.len()
                    ),
                });
            }
            for (j, &off) in plan.offsets.iter().enumerate() {
                ghost[b * off..b * (off + 1)].copy_from_slice(&vals[b * j..b * (j + 1)]);
            }
        }
        for handle in ctx.send_reqs.drain(..) {
            let _ = handle.wait();
        }
        ctx.state = CtxState::Idle;
        Ok(())
    }

    /// Pack ghost blocks toward their owners and post receives for the
    /// contributions peers hold against our owned nodes.
    pub fn begin_reverse(
        &self,
        ctx: &mut ScatterCtx<C>,
        ghost: &[f64],
        owned: &mut [f64],
        _op: VecOp,
    ) -> Result<(), DofVecError> {
        ctx.require(CtxState::Idle)?;
        self.check_arrays(ctx, owned.len(), ghost.len())?;
        let comm = self.map.comm();
        let b = ctx.bsize;
        let tag = ctx.tags.reverse.as_u16();

        for plan in &self.send_plan {
            let mut template = vec![0u8; 8 * b * plan.offsets.len()];
            ctx.recv_reqs
                .push(comm.irecv(plan.rank, tag, &mut template));
        }
        for (plan, buf) in self.recv_plan.iter().zip(ctx.rev_send.iter_mut()) {
            for (j, &off) in plan.offsets.iter().enumerate() {
                buf[b * j..b * (j + 1)].copy_from_slice(&ghost[b * off..b * (off + 1)]);
            }
            ctx.send_reqs
                .push(comm.isend(plan.rank, tag, wire::cast_slice(buf)));
        }
        ctx.state = CtxState::Reverse;
        Ok(())
    }

    /// Wait for peer contributions and fold them into the owned array.
    ///
    /// `VecOp::Add` accumulates and is order-independent. `VecOp::Insert`
    /// assigns and assumes a single writer per node; with overlapping ghost
    /// writers the surviving value is unspecified.
    pub fn end_reverse(
        &self,
        ctx: &mut ScatterCtx<C>,
        ghost: &[f64],
        owned: &mut [f64],
        op: VecOp,
    ) -> Result<(), DofVecError> {
        ctx.require(CtxState::Reverse)?;
        self.check_arrays(ctx, owned.len(), ghost.len())?;
        let b = ctx.bsize;

        for (plan, handle) in self.send_plan.iter().zip(ctx.recv_reqs.drain(..)) {
            let raw = handle.wait().ok_or_else(|| DofVecError::Comm {
                peer: plan.rank,
                reason: "reverse scatter payload lost".into(),
            })?;
            let vals: Vec<f64> = wire::cast_slice_from(&raw);
            if vals.len() != b * plan.offsets.len() {
                return Err(DofVecError::Comm {
                    peer: plan.rank,
                    reason: format!(
                        "expected {} scalars, got {}",
                        b * plan.offsets.len(),
                        vals.len()
                    ),
                });
            }
            for (j, &off) in plan.offsets.iter().enumerate() {
                let dst = &mut owned[b * off..b * (off + 1)];
                let src = &vals[b * j..b * (j + 1)];
                match op {
                    VecOp::Insert => dst.copy_from_slice(src),
                    VecOp::Add => {
                        for (d, s) in dst.iter_mut().zip(src) {
                            *d += *s;
                        }
                    }
                }
            }
        }
        for handle in ctx.send_reqs.drain(..) {
            let _ = handle.wait();
        }
        ctx.state = CtxState::Idle;
        Ok(())
    }
}
