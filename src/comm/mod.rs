//! Communication abstraction for intra-process (thread) and inter-process
//! (MPI) message passing.
//!
//! Wire format conventions:
//! - Counts, tags and ranks are LE fixed-width integers (`u32`).
//! - Bulk payloads (node ids, scalars) travel native-endian within a run,
//!   matching the on-disk vector format.
//! - Receivers may truncate to their provided buffer length; protocols that
//!   need exact lengths exchange sizes first.
//!
//! Tags below `0xFF00` are available to higher-level protocols; the range
//! `0xFF00..=0xFFFF` is reserved for the built-in collectives.

use once_cell::sync::Lazy;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};

pub mod wire;

#[cfg(feature = "mpi-support")]
mod mpi;
#[cfg(feature = "mpi-support")]
pub use mpi::MpiComm;

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

// Reserved tags for the built-in collectives.
const TAG_BARRIER: u16 = 0xFF00;
const TAG_BARRIER_RELEASE: u16 = 0xFF01;
const TAG_REDUCE: u16 = 0xFF02;
const TAG_REDUCE_RESULT: u16 = 0xFF03;
const TAG_BCAST: u16 = 0xFF04;
const TAG_GATHER: u16 = 0xFF05;
const TAG_ALLTOALL: u16 = 0xFF06;

/// Non-blocking communication interface (minimal by design).
///
/// Implementors provide asynchronous byte-level send/receive plus the handful
/// of collectives the vector reductions need. The collectives have default
/// implementations built on the point-to-point layer that reduce in rank
/// order, so their results are bitwise deterministic; the MPI backend
/// overrides them with native calls.
///
/// Collectives must be invoked by all ranks of the communicator in the same
/// order. A failed exchange inside a collective is fatal to the process
/// group, matching MPI semantics.
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Rank of this process (0..size-1)
    fn rank(&self) -> usize;
    /// Total number of ranks
    fn size(&self) -> usize;

    /// Synchronization barrier.
    fn barrier(&self) {
        let size = self.size();
        if size <= 1 {
            return;
        }
        if self.rank() == 0 {
            for peer in 1..size {
                let mut token = [0u8; 1];
                let _ = self.irecv(peer, TAG_BARRIER, &mut token).wait();
            }
            for peer in 1..size {
                let _ = self.isend(peer, TAG_BARRIER_RELEASE, &[1]).wait();
            }
        } else {
            let _ = self.isend(0, TAG_BARRIER, &[1]).wait();
            let mut token = [0u8; 1];
            let _ = self.irecv(0, TAG_BARRIER_RELEASE, &mut token).wait();
        }
    }

    /// Element-wise global sum of `local` into `global`.
    ///
    /// Rank 0 accumulates contributions in rank order before broadcasting the
    /// result, so repeated calls with identical inputs are bitwise identical.
    fn allreduce_sum(&self, local: &[f64], global: &mut [f64]) {
        assert_eq!(local.len(), global.len());
        let size = self.size();
        if size <= 1 {
            global.copy_from_slice(local);
            return;
        }
        if self.rank() == 0 {
            let mut acc = local.to_vec();
            for peer in 1..size {
                let mut template = vec![0u8; std::mem::size_of_val(local)];
                let raw = self
                    .irecv(peer, TAG_REDUCE, &mut template)
                    .wait()
                    .expect("allreduce contribution lost");
                let part: Vec<f64> = wire::cast_slice_from(&raw);
                assert_eq!(part.len(), acc.len(), "allreduce length mismatch");
                for (a, p) in acc.iter_mut().zip(&part) {
                    *a += *p;
                }
            }
            let bytes = wire::cast_slice(&acc);
            for peer in 1..size {
                let _ = self.isend(peer, TAG_REDUCE_RESULT, bytes).wait();
            }
            global.copy_from_slice(&acc);
        } else {
            let _ = self.isend(0, TAG_REDUCE, wire::cast_slice(local)).wait();
            let mut template = vec![0u8; std::mem::size_of_val(local)];
            let raw = self
                .irecv(0, TAG_REDUCE_RESULT, &mut template)
                .wait()
                .expect("allreduce result lost");
            wire::cast_slice_mut(global).copy_from_slice(&raw);
        }
    }

    /// Broadcast a `u64` from `root` to every rank.
    fn bcast_u64(&self, root: usize, value: &mut u64) {
        let size = self.size();
        if size <= 1 {
            return;
        }
        if self.rank() == root {
            for peer in 0..size {
                if peer != root {
                    let _ = self.isend(peer, TAG_BCAST, &value.to_le_bytes()).wait();
                }
            }
        } else {
            let mut template = [0u8; 8];
            let raw = self
                .irecv(root, TAG_BCAST, &mut template)
                .wait()
                .expect("broadcast value lost");
            template.copy_from_slice(&raw);
            *value = u64::from_le_bytes(template);
        }
    }

    /// Gather one `u64` from every rank; `all[r]` receives rank `r`'s value.
    fn allgather_u64(&self, mine: u64, all: &mut [u64]) {
        let size = self.size();
        let rank = self.rank();
        assert_eq!(all.len(), size);
        all[rank] = mine;
        if size <= 1 {
            return;
        }
        let mut pending = Vec::with_capacity(size - 1);
        for peer in 0..size {
            if peer != rank {
                let mut template = [0u8; 8];
                pending.push((peer, self.irecv(peer, TAG_GATHER, &mut template)));
            }
        }
        for peer in 0..size {
            if peer != rank {
                let _ = self.isend(peer, TAG_GATHER, &mine.to_le_bytes()).wait();
            }
        }
        for (peer, handle) in pending {
            let raw = handle.wait().expect("allgather value lost");
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&raw);
            all[peer] = u64::from_le_bytes(bytes);
        }
    }

    /// Personalized exchange of one `u32` per peer; `recvs[p]` receives the
    /// value rank `p` addressed to this rank.
    fn alltoall_u32(&self, sends: &[u32], recvs: &mut [u32]) {
        let size = self.size();
        let rank = self.rank();
        assert_eq!(sends.len(), size);
        assert_eq!(recvs.len(), size);
        recvs[rank] = sends[rank];
        if size <= 1 {
            return;
        }
        let mut pending = Vec::with_capacity(size - 1);
        for peer in 0..size {
            if peer != rank {
                let mut template = [0u8; 4];
                pending.push((peer, self.irecv(peer, TAG_ALLTOALL, &mut template)));
            }
        }
        for peer in 0..size {
            if peer != rank {
                let _ = self
                    .isend(peer, TAG_ALLTOALL, &sends[peer].to_le_bytes())
                    .wait();
            }
        }
        for (peer, handle) in pending {
            let raw = handle.wait().expect("alltoall value lost");
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&raw);
            recvs[peer] = u32::from_le_bytes(bytes);
        }
    }
}

/// Tag newtype for safer tag arithmetic.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct CommTag(u16);

impl CommTag {
    /// Create a new tag from a raw `u16`.
    #[inline]
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    /// Return the underlying `u16` value.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Safely offset the tag by `dx`, wrapping on overflow.
    #[inline]
    pub const fn offset(self, dx: u16) -> Self {
        Self(self.0.wrapping_add(dx))
    }
}

impl From<u16> for CommTag {
    #[inline]
    fn from(x: u16) -> Self {
        CommTag::new(x)
    }
}

/// Compile-time no-op comm for pure serial runs and unit tests.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}

    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }
}

// --- ThreadComm: intra-process ranks over a global mailbox ---

// (universe, src, dst, tag); the universe id keeps concurrently running rank
// groups (e.g. parallel tests in one binary) out of each other's queues.
type Key = (u32, usize, usize, u16);

#[derive(Default)]
struct Slot {
    q: VecDeque<Vec<u8>>,
}

struct Mailbox {
    map: Mutex<HashMap<Key, Arc<(Mutex<Slot>, Condvar)>>>,
}

static MAILBOX: Lazy<Mailbox> = Lazy::new(|| Mailbox {
    map: Mutex::new(HashMap::new()),
});

static NEXT_UNIVERSE: AtomicU32 = AtomicU32::new(0);

fn mailbox_entry(key: Key) -> Arc<(Mutex<Slot>, Condvar)> {
    let mut g = MAILBOX.map.lock().expect("MAILBOX poisoned");
    g.entry(key)
        .or_insert_with(|| Arc::new((Mutex::new(Slot::default()), Condvar::new())))
        .clone()
}

pub struct LocalSendHandle;

impl Wait for LocalSendHandle {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

pub struct LocalRecvHandle {
    cell: Arc<(Mutex<Slot>, Condvar)>,
    want_len: usize,
}

impl Wait for LocalRecvHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let (lock, cv) = &*self.cell;
        let mut slot = lock.lock().expect("Slot poisoned");
        while slot.q.is_empty() {
            slot = cv.wait(slot).expect("Condvar poisoned");
        }
        let mut msg = slot.q.pop_front().expect("q non-empty");
        msg.truncate(self.want_len.min(msg.len()));
        Some(msg)
    }
}

/// Intra-process communicator: every rank is a thread, messages move through
/// a process-global mailbox. This is the backend the multi-rank tests run on.
#[derive(Clone, Debug)]
pub struct ThreadComm {
    universe: u32,
    rank: usize,
    size: usize,
}

impl ThreadComm {
    /// Create all ranks of a fresh universe. Hand one element to each rank
    /// thread; the universes of separate `split` calls never share queues.
    pub fn split(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0, "communicator needs at least one rank");
        let universe = NEXT_UNIVERSE.fetch_add(1, Ordering::Relaxed);
        (0..size)
            .map(|rank| ThreadComm {
                universe,
                rank,
                size,
            })
            .collect()
    }
}

impl Communicator for ThreadComm {
    type SendHandle = LocalSendHandle;
    type RecvHandle = LocalRecvHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let key = (self.universe, self.rank, peer, tag);
        let entry = mailbox_entry(key);
        let (lock, cv) = &*entry;
        {
            let mut slot = lock.lock().expect("Slot poisoned");
            slot.q.push_back(buf.to_vec());
        }
        cv.notify_all();
        LocalSendHandle
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        let key = (self.universe, peer, self.rank, tag);
        LocalRecvHandle {
            cell: mailbox_entry(key),
            want_len: buf.len(),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_round_trip() {
        let mut comms = ThreadComm::split(2);
        let c1 = comms.pop().unwrap();
        let c0 = comms.pop().unwrap();

        let msg = b"hello";
        let _s = c0.isend(1, 7, msg);

        let mut buf = [0u8; 5];
        let h = c1.irecv(0, 7, &mut buf);
        let got = h.wait().unwrap();
        assert_eq!(&got, msg);
    }

    #[test]
    fn thread_fifo_order() {
        let mut comms = ThreadComm::split(2);
        let c1 = comms.pop().unwrap();
        let c0 = comms.pop().unwrap();

        for i in 0..10u8 {
            let _ = c0.isend(1, 9, &[i]);
        }
        let mut out = Vec::new();
        for _ in 0..10 {
            let mut b = [0u8; 1];
            let h = c1.irecv(0, 9, &mut b);
            out.push(h.wait().unwrap()[0]);
        }
        assert_eq!(out, (0u8..10u8).collect::<Vec<_>>());
    }

    #[test]
    fn universes_are_isolated() {
        let mut a = ThreadComm::split(2);
        let mut b = ThreadComm::split(2);
        let a1 = a.pop().unwrap();
        let a0 = a.pop().unwrap();
        let b1 = b.pop().unwrap();
        let _b0 = b.pop().unwrap();

        let _ = a0.isend(1, 3, &[0xAA]);
        let _ = b1; // never receives rank a0's message
        let mut buf = [0u8; 1];
        let got = a1.irecv(0, 3, &mut buf).wait().unwrap();
        assert_eq!(got, vec![0xAA]);
    }

    #[test]
    fn allreduce_sums_across_ranks() {
        let comms = ThreadComm::split(3);
        let results = std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|c| {
                    s.spawn(move || {
                        let local = [c.rank() as f64 + 1.0, 10.0];
                        let mut global = [0.0f64; 2];
                        c.allreduce_sum(&local, &mut global);
                        global
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });
        for global in results {
            assert_eq!(global, [6.0, 30.0]);
        }
    }

    #[test]
    fn alltoall_routes_per_peer_values() {
        let comms = ThreadComm::split(3);
        let results = std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|c| {
                    s.spawn(move || {
                        let rank = c.rank() as u32;
                        let sends: Vec<u32> = (0..3).map(|p| 10 * rank + p).collect();
                        let mut recvs = vec![0u32; 3];
                        c.alltoall_u32(&sends, &mut recvs);
                        recvs
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });
        for (rank, recvs) in results.into_iter().enumerate() {
            let want: Vec<u32> = (0..3).map(|p| 10 * p + rank as u32).collect();
            assert_eq!(recvs, want);
        }
    }

    #[test]
    fn bcast_and_gather() {
        let comms = ThreadComm::split(4);
        let results = std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|c| {
                    s.spawn(move || {
                        let mut seed = if c.rank() == 0 { 0xC0FFEE } else { 0 };
                        c.bcast_u64(0, &mut seed);
                        let mut all = vec![0u64; 4];
                        c.allgather_u64(c.rank() as u64 * 100, &mut all);
                        (seed, all)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });
        for (seed, all) in results {
            assert_eq!(seed, 0xC0FFEE);
            assert_eq!(all, vec![0, 100, 200, 300]);
        }
    }

    #[test]
    fn no_comm_collectives_are_local() {
        let c = NoComm;
        let mut out = [0.0f64; 2];
        c.allreduce_sum(&[1.5, -2.5], &mut out);
        assert_eq!(out, [1.5, -2.5]);
        let mut seed = 42u64;
        c.bcast_u64(0, &mut seed);
        assert_eq!(seed, 42);
        c.barrier();
    }
}
