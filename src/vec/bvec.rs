//! `BVec`: the distributed block vector.
//!
//! A `BVec` owns three flat arrays: owned DoFs (`x`), ghost DoFs for
//! referenced non-owned nodes (`x_ext`) and scratch blocks for dependent
//! nodes (`x_dep`). Writes route by index class; `begin_set_values` /
//! `end_set_values` reconcile ghost and dependent contributions onto their
//! owners (reverse scatter), `begin_distribute_values` /
//! `end_distribute_values` refresh ghosts from their owners and re-evaluate
//! dependent blocks (forward scatter). All array sizes are fixed at
//! construction.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::comm::Communicator;
use crate::error::DofVecError;
use crate::flops;
use crate::map::{BcMap, DepNodes, IndexSet, VarMap};
use crate::scatter::{CtxState, Distributor, ScatterCtx, VecOp};

/// Distributed block vector over a [`VarMap`] partition.
pub struct BVec<C: Communicator> {
    pub(crate) comm: Arc<C>,
    pub(crate) map: Option<Arc<VarMap<C>>>,
    bcs: Option<Arc<BcMap>>,
    pub(crate) bsize: usize,
    /// Owned DoFs, `bsize * map.dim()` scalars.
    pub(crate) x: Vec<f64>,
    ext_dist: Option<Arc<Distributor<C>>>,
    ext_indices: Option<Arc<IndexSet>>,
    ext_ctx: Option<ScatterCtx<C>>,
    /// Ghost DoFs, `bsize * ext_indices.len()` scalars.
    x_ext: Vec<f64>,
    dep_nodes: Option<Arc<DepNodes>>,
    /// Dependent-node scratch, `bsize * dep_nodes.len()` scalars.
    x_dep: Vec<f64>,
    rng: StdRng,
}

impl<C: Communicator> BVec<C> {
    /// Create a distributed block vector.
    ///
    /// Ghost storage is allocated iff a distributor is provided; dependent
    /// storage iff a dependent-node table is provided. All arrays start
    /// zeroed.
    pub fn new(
        map: Arc<VarMap<C>>,
        bsize: usize,
        bcs: Option<Arc<BcMap>>,
        ext_dist: Option<Arc<Distributor<C>>>,
        dep_nodes: Option<Arc<DepNodes>>,
    ) -> Result<Self, DofVecError> {
        if bsize == 0 {
            return Err(DofVecError::ZeroBlockSize);
        }
        let comm = map.comm().clone();
        let size = bsize * map.dim();

        let (ext_indices, x_ext, ext_ctx) = match &ext_dist {
            Some(dist) => (
                Some(dist.indices().clone()),
                vec![0.0; bsize * dist.dim()],
                Some(dist.create_ctx(bsize)?),
            ),
            None => (None, Vec::new(), None),
        };
        let x_dep = match &dep_nodes {
            Some(dep) => vec![0.0; bsize * dep.len()],
            None => Vec::new(),
        };

        Ok(Self {
            comm,
            map: Some(map),
            bcs,
            bsize,
            x: vec![0.0; size],
            ext_dist,
            ext_indices,
            ext_ctx,
            x_ext,
            dep_nodes,
            x_dep,
            rng: StdRng::seed_from_u64(0),
        })
    }

    /// Create a bare vector: `local_size` scalars, no map, no boundary
    /// conditions, no scatter. Used by matrix internals that manage their
    /// own layout.
    pub fn with_local_size(
        comm: Arc<C>,
        local_size: usize,
        bsize: usize,
    ) -> Result<Self, DofVecError> {
        if bsize == 0 {
            return Err(DofVecError::ZeroBlockSize);
        }
        Ok(Self {
            comm,
            map: None,
            bcs: None,
            bsize,
            x: vec![0.0; local_size],
            ext_dist: None,
            ext_indices: None,
            ext_ctx: None,
            x_ext: Vec::new(),
            dep_nodes: None,
            x_dep: Vec::new(),
            rng: StdRng::seed_from_u64(0),
        })
    }

    /// Number of locally stored owned scalars.
    #[inline]
    pub fn local_len(&self) -> usize {
        self.x.len()
    }

    /// Block size.
    #[inline]
    pub fn bsize(&self) -> usize {
        self.bsize
    }

    /// The communicator this vector is distributed over.
    #[inline]
    pub fn comm(&self) -> &Arc<C> {
        &self.comm
    }

    /// Ownership map, if the vector was built over one.
    #[inline]
    pub fn var_map(&self) -> Option<&Arc<VarMap<C>>> {
        self.map.as_ref()
    }

    /// Owned storage.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.x
    }

    /// Owned storage, mutable.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.x
    }

    /// Ghost storage (empty without a distributor).
    #[inline]
    pub fn ghost_slice(&self) -> &[f64] {
        &self.x_ext
    }

    /// Dependent-node scratch (empty without a dependent-node table).
    #[inline]
    pub fn dep_slice(&self) -> &[f64] {
        &self.x_dep
    }

    pub(crate) fn ensure_idle(&self) -> Result<(), DofVecError> {
        match &self.ext_ctx {
            Some(ctx) => ctx.require(CtxState::Idle),
            None => Ok(()),
        }
    }

    fn check_same_size(&self, other: &BVec<C>) -> Result<(), DofVecError> {
        if self.x.len() != other.x.len() {
            return Err(DofVecError::SizeMismatch {
                expected: self.x.len(),
                found: other.x.len(),
            });
        }
        Ok(())
    }

    fn dot_local(&self, other: &BVec<C>) -> f64 {
        self.x
            .iter()
            .zip(&other.x)
            .map(|(a, b)| a * b)
            .sum()
    }

    // --- BLAS-1 operations (collective where noted) ---

    /// Global 2-norm. Collective.
    pub fn norm(&self) -> Result<f64, DofVecError> {
        self.ensure_idle()?;
        let local = self.dot_local(self);
        flops::add(2 * self.x.len() as u64);
        let mut sum = [0.0];
        self.comm.allreduce_sum(&[local], &mut sum);
        Ok(sum[0].sqrt())
    }

    /// Global dot product, the bilinear form `Σ xᵢ yᵢ`. Collective.
    pub fn dot(&self, other: &BVec<C>) -> Result<f64, DofVecError> {
        self.ensure_idle()?;
        self.check_same_size(other)?;
        let local = self.dot_local(other);
        flops::add(2 * self.x.len() as u64);
        let mut sum = [0.0];
        self.comm.allreduce_sum(&[local], &mut sum);
        Ok(sum[0])
    }

    /// Fused dot products against `vecs`, one allreduce of length
    /// `vecs.len()`. Collective.
    ///
    /// All operands are validated before the reduction is entered, so every
    /// rank either performs the collective or none does.
    pub fn mdot(&self, vecs: &[&BVec<C>], out: &mut [f64]) -> Result<(), DofVecError> {
        self.ensure_idle()?;
        if out.len() != vecs.len() {
            return Err(DofVecError::ValueCountMismatch {
                expected: vecs.len(),
                found: out.len(),
            });
        }
        for v in vecs {
            self.check_same_size(v)?;
        }
        let local: Vec<f64> = vecs.iter().map(|v| self.dot_local(v)).collect();
        flops::add(2 * vecs.len() as u64 * self.x.len() as u64);
        self.comm.allreduce_sum(&local, out);
        Ok(())
    }

    /// `x <- alpha * x`. Local.
    pub fn scale(&mut self, alpha: f64) -> Result<(), DofVecError> {
        self.ensure_idle()?;
        for v in &mut self.x {
            *v *= alpha;
        }
        flops::add(self.x.len() as u64);
        Ok(())
    }

    /// `x <- x + alpha * v`. Local.
    pub fn axpy(&mut self, alpha: f64, other: &BVec<C>) -> Result<(), DofVecError> {
        self.ensure_idle()?;
        self.check_same_size(other)?;
        for (y, z) in self.x.iter_mut().zip(&other.x) {
            *y += alpha * z;
        }
        flops::add(2 * self.x.len() as u64);
        Ok(())
    }

    /// `x <- alpha * v + beta * x`. Local.
    pub fn axpby(&mut self, alpha: f64, beta: f64, other: &BVec<C>) -> Result<(), DofVecError> {
        self.ensure_idle()?;
        self.check_same_size(other)?;
        for (y, z) in self.x.iter_mut().zip(&other.x) {
            *y = beta * *y + alpha * z;
        }
        flops::add(3 * self.x.len() as u64);
        Ok(())
    }

    /// Copy the owned entries of `other` into this vector. Local.
    pub fn copy_values(&mut self, other: &BVec<C>) -> Result<(), DofVecError> {
        self.ensure_idle()?;
        self.check_same_size(other)?;
        self.x.copy_from_slice(&other.x);
        Ok(())
    }

    /// Set every owned entry to `val`. Ghost and dependent storage are left
    /// alone. Local.
    pub fn set_all(&mut self, val: f64) -> Result<(), DofVecError> {
        self.ensure_idle()?;
        for v in &mut self.x {
            *v = val;
        }
        Ok(())
    }

    /// Zero the owned, ghost and dependent storage. Local.
    pub fn zero_entries(&mut self) -> Result<(), DofVecError> {
        self.ensure_idle()?;
        self.x.fill(0.0);
        self.x_ext.fill(0.0);
        self.x_dep.fill(0.0);
        Ok(())
    }

    // --- scatter API ---

    /// Write one `bsize` block per listed node.
    ///
    /// Routing: owned ids go to the owned array (per `op`), negative ids go
    /// to the dependent scratch (per `op`), non-owned positive ids
    /// accumulate into ghost storage regardless of `op` — multiple element
    /// contributions to the same ghost must combine before the reverse
    /// scatter, and `end_set_values` leaves the ghost array zeroed.
    pub fn set_values(
        &mut self,
        indices: &[i64],
        vals: &[f64],
        op: VecOp,
    ) -> Result<(), DofVecError> {
        self.ensure_idle()?;
        let map = self.map.as_ref().ok_or(DofVecError::NoVarMap)?;
        let b = self.bsize;
        if vals.len() != b * indices.len() {
            return Err(DofVecError::ValueCountMismatch {
                expected: b * indices.len(),
                found: vals.len(),
            });
        }
        let (lo, hi) = map.local_range();

        for (i, &id) in indices.iter().enumerate() {
            let block = &vals[b * i..b * (i + 1)];
            if id >= lo && id < hi {
                let off = b * (id - lo) as usize;
                let dst = &mut self.x[off..off + b];
                match op {
                    VecOp::Insert => dst.copy_from_slice(block),
                    VecOp::Add => {
                        for (y, v) in dst.iter_mut().zip(block) {
                            *y += *v;
                        }
                    }
                }
            } else if id < 0 {
                let d = (-id - 1) as usize;
                let ndep = self
                    .dep_nodes
                    .as_ref()
                    .ok_or(DofVecError::NoDepStorage(id))?
                    .len();
                if d >= ndep {
                    return Err(DofVecError::DepNodeOutOfRange { dep: d, ndep });
                }
                let off = b * d;
                let dst = &mut self.x_dep[off..off + b];
                match op {
                    VecOp::Insert => dst.copy_from_slice(block),
                    VecOp::Add => {
                        for (y, v) in dst.iter_mut().zip(block) {
                            *y += *v;
                        }
                    }
                }
            } else {
                let ext = self
                    .ext_indices
                    .as_ref()
                    .ok_or(DofVecError::NoGhostStorage(id))?;
                let off = b * ext.find_index(id)?;
                // Ghost writes accumulate for both ops; the staging array is
                // zero between assemblies.
                for (y, v) in self.x_ext[off..off + b].iter_mut().zip(block) {
                    *y += *v;
                }
            }
        }
        Ok(())
    }

    /// Read one `bsize` block per listed node, routed like
    /// [`set_values`](Self::set_values).
    ///
    /// External and dependent reads are only meaningful after
    /// [`end_distribute_values`](Self::end_distribute_values) has completed.
    pub fn get_values(&self, indices: &[i64], vals: &mut [f64]) -> Result<(), DofVecError> {
        let map = self.map.as_ref().ok_or(DofVecError::NoVarMap)?;
        let b = self.bsize;
        if vals.len() != b * indices.len() {
            return Err(DofVecError::ValueCountMismatch {
                expected: b * indices.len(),
                found: vals.len(),
            });
        }
        let (lo, hi) = map.local_range();

        for (i, &id) in indices.iter().enumerate() {
            let block = &mut vals[b * i..b * (i + 1)];
            if id >= lo && id < hi {
                let off = b * (id - lo) as usize;
                block.copy_from_slice(&self.x[off..off + b]);
            } else if id < 0 {
                let d = (-id - 1) as usize;
                let ndep = self
                    .dep_nodes
                    .as_ref()
                    .ok_or(DofVecError::NoDepStorage(id))?
                    .len();
                if d >= ndep {
                    return Err(DofVecError::DepNodeOutOfRange { dep: d, ndep });
                }
                let off = b * d;
                block.copy_from_slice(&self.x_dep[off..off + b]);
            } else {
                let ext = self
                    .ext_indices
                    .as_ref()
                    .ok_or(DofVecError::NoGhostStorage(id))?;
                let off = b * ext.find_index(id)?;
                block.copy_from_slice(&self.x_ext[off..off + b]);
            }
        }
        Ok(())
    }

    /// Begin collecting written values onto their owners.
    ///
    /// Under `VecOp::Add`, dependent scratch blocks are first projected onto
    /// their constituents (weighted), into owned or ghost storage as
    /// ownership dictates; the reverse scatter then ships every ghost
    /// contribution home.
    pub fn begin_set_values(&mut self, op: VecOp) -> Result<(), DofVecError> {
        if let Some(dep) = &self.dep_nodes {
            if op == VecOp::Add {
                let map = self.map.as_ref().ok_or(DofVecError::NoVarMap)?;
                let (lo, hi) = map.local_range();
                let b = self.bsize;
                let x = &mut self.x;
                let x_ext = &mut self.x_ext;
                let x_dep = &self.x_dep;
                for (d, (conn, weights)) in dep.rows().enumerate() {
                    let z = &x_dep[b * d..b * (d + 1)];
                    for (&c, &w) in conn.iter().zip(weights) {
                        let dst = if c >= lo && c < hi {
                            let off = b * (c - lo) as usize;
                            &mut x[off..off + b]
                        } else {
                            let ext = self
                                .ext_indices
                                .as_ref()
                                .ok_or(DofVecError::NoGhostStorage(c))?;
                            let off = b * ext.find_index(c)?;
                            &mut x_ext[off..off + b]
                        };
                        for (y, zk) in dst.iter_mut().zip(z) {
                            *y += w * zk;
                        }
                    }
                }
            }
        }

        if let (Some(dist), Some(ctx)) = (&self.ext_dist, &mut self.ext_ctx) {
            dist.begin_reverse(ctx, &self.x_ext, &mut self.x, op)?;
        }
        Ok(())
    }

    /// Finish the reverse scatter and zero the ghost staging array.
    pub fn end_set_values(&mut self, op: VecOp) -> Result<(), DofVecError> {
        if let (Some(dist), Some(ctx)) = (&self.ext_dist, &mut self.ext_ctx) {
            dist.end_reverse(ctx, &self.x_ext, &mut self.x, op)?;
        }
        self.x_ext.fill(0.0);
        Ok(())
    }

    /// Begin refreshing ghost values from their owners.
    pub fn begin_distribute_values(&mut self) -> Result<(), DofVecError> {
        if let (Some(dist), Some(ctx)) = (&self.ext_dist, &mut self.ext_ctx) {
            dist.begin_forward(ctx, &self.x, &mut self.x_ext)?;
        }
        Ok(())
    }

    /// Finish the forward scatter, then re-evaluate every dependent block
    /// from the fresh owned/ghost data.
    pub fn end_distribute_values(&mut self) -> Result<(), DofVecError> {
        if let (Some(dist), Some(ctx)) = (&self.ext_dist, &mut self.ext_ctx) {
            dist.end_forward(ctx, &self.x, &mut self.x_ext)?;
        }

        if let Some(dep) = &self.dep_nodes {
            let map = self.map.as_ref().ok_or(DofVecError::NoVarMap)?;
            let (lo, hi) = map.local_range();
            let b = self.bsize;
            let x = &self.x;
            let x_ext = &self.x_ext;
            let x_dep = &mut self.x_dep;
            for (d, (conn, weights)) in dep.rows().enumerate() {
                let z = &mut x_dep[b * d..b * (d + 1)];
                z.fill(0.0);
                for (&c, &w) in conn.iter().zip(weights) {
                    let src = if c >= lo && c < hi {
                        let off = b * (c - lo) as usize;
                        &x[off..off + b]
                    } else {
                        let ext = self
                            .ext_indices
                            .as_ref()
                            .ok_or(DofVecError::NoGhostStorage(c))?;
                        let off = b * ext.find_index(c)?;
                        &x_ext[off..off + b]
                    };
                    for (zk, y) in z.iter_mut().zip(src) {
                        *zk += w * y;
                    }
                }
            }
        }
        Ok(())
    }

    // --- boundary conditions ---

    /// Zero the owned DoFs named by the boundary-condition map.
    ///
    /// Records whose global node lies outside the local ownership range are
    /// skipped; ghost and dependent storage are untouched. The stored BC
    /// values are for matrix row modification and are not consumed here.
    pub fn apply_bcs(&mut self) -> Result<(), DofVecError> {
        self.ensure_idle()?;
        let Some(bcs) = &self.bcs else {
            return Ok(());
        };
        let map = self.map.as_ref().ok_or(DofVecError::NoVarMap)?;
        let (lo, hi) = map.local_range();
        let b = self.bsize;

        for rec in bcs.records() {
            if rec.global >= lo && rec.global < hi {
                let off = b * (rec.global - lo) as usize;
                for &var in rec.vars {
                    if var >= b {
                        return Err(DofVecError::BcVarOutOfRange { var, bsize: b });
                    }
                    self.x[off + var] = 0.0;
                }
            }
        }
        Ok(())
    }

    // --- random fill ---

    /// Reseed the shared draw engine from entropy on rank 0; the seed is
    /// broadcast so every rank holds an identical engine. Collective.
    pub fn init_rand(&mut self) {
        let mut seed = if self.comm.rank() == 0 {
            rand::random::<u64>()
        } else {
            0
        };
        self.comm.bcast_u64(0, &mut seed);
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Reseed from an explicit seed (rank 0's value wins). Collective.
    pub fn init_rand_with_seed(&mut self, seed: u64) {
        let mut seed = seed;
        self.comm.bcast_u64(0, &mut seed);
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Fill the owned entries with uniform draws from `[lower, upper)`.
    ///
    /// The draw sequence is consumed in rank order across the whole
    /// partition — each rank burns the draws belonging to every other rank —
    /// so the assembled global vector is identical for any process count,
    /// provided all ranks share the engine seeded by
    /// [`init_rand`](Self::init_rand). Collective in that sense; no messages
    /// are exchanged.
    pub fn set_rand(&mut self, lower: f64, upper: f64) -> Result<(), DofVecError> {
        self.ensure_idle()?;
        match &self.map {
            None => {
                for v in &mut self.x {
                    *v = lower + (upper - lower) * self.rng.gen::<f64>();
                }
            }
            Some(map) => {
                let rank = self.comm.rank();
                let range = map.owner_range();
                let b = self.bsize;
                for k in 0..self.comm.size() {
                    if k != rank {
                        let skip = b * (range[k + 1] - range[k]) as usize;
                        for _ in 0..skip {
                            let _: f64 = self.rng.gen();
                        }
                    } else {
                        for v in &mut self.x {
                            *v = lower + (upper - lower) * self.rng.gen::<f64>();
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
