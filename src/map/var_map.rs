//! `VarMap`: static node-id → owning-rank map.
//!
//! Global node ids are partitioned contiguously: rank `p` owns
//! `[owner_range[p], owner_range[p+1])`. The range array has one entry per
//! rank plus one, is non-decreasing and starts at zero. The map is static
//! after construction.

use std::sync::Arc;

use crate::comm::Communicator;
use crate::error::DofVecError;

/// Contiguous ownership ranges for the global node-id space, plus the
/// communicator the partition lives on.
pub struct VarMap<C: Communicator> {
    comm: Arc<C>,
    owner_range: Vec<i64>,
}

impl<C: Communicator> VarMap<C> {
    /// Build the map collectively from this rank's local node count.
    ///
    /// Every rank contributes its count through an allgather; the resulting
    /// owner range is identical on all ranks.
    pub fn new(comm: Arc<C>, local_count: usize) -> Result<Self, DofVecError> {
        let size = comm.size();
        let mut counts = vec![0u64; size];
        comm.allgather_u64(local_count as u64, &mut counts);

        let mut owner_range = Vec::with_capacity(size + 1);
        owner_range.push(0i64);
        for c in counts {
            let prev = *owner_range.last().expect("range non-empty");
            owner_range.push(prev + c as i64);
        }
        Ok(Self { comm, owner_range })
    }

    /// Build the map from an explicit owner range (must already be identical
    /// on all ranks).
    pub fn from_owner_range(comm: Arc<C>, owner_range: Vec<i64>) -> Result<Self, DofVecError> {
        if owner_range.len() != comm.size() + 1
            || owner_range.first() != Some(&0)
            || owner_range.windows(2).any(|w| w[0] > w[1])
        {
            return Err(DofVecError::InvalidOwnerRange);
        }
        Ok(Self { comm, owner_range })
    }

    /// The communicator this partition lives on.
    #[inline]
    pub fn comm(&self) -> &Arc<C> {
        &self.comm
    }

    /// Full owner range (`size + 1` entries, ascending, starts at zero).
    #[inline]
    pub fn owner_range(&self) -> &[i64] {
        &self.owner_range
    }

    /// Number of nodes owned by the local rank.
    #[inline]
    pub fn dim(&self) -> usize {
        let rank = self.comm.rank();
        (self.owner_range[rank + 1] - self.owner_range[rank]) as usize
    }

    /// Total number of nodes across all ranks.
    #[inline]
    pub fn global_dim(&self) -> i64 {
        *self.owner_range.last().expect("range non-empty")
    }

    /// Half-open node-id interval owned by the local rank.
    #[inline]
    pub fn local_range(&self) -> (i64, i64) {
        let rank = self.comm.rank();
        (self.owner_range[rank], self.owner_range[rank + 1])
    }

    /// Whether `id` is owned by the local rank.
    #[inline]
    pub fn owns(&self, id: i64) -> bool {
        let (lo, hi) = self.local_range();
        id >= lo && id < hi
    }

    /// Owning rank of a global node id.
    pub fn find_owner(&self, id: i64) -> Result<usize, DofVecError> {
        if id < 0 || id >= self.global_dim() {
            return Err(DofVecError::IndexOutOfRange {
                id,
                global: self.global_dim(),
            });
        }
        // partition_point: first rank whose range ends beyond id.
        Ok(self.owner_range[1..].partition_point(|&end| end <= id))
    }
}
