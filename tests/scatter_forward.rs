//! Forward scatter: owners propagate values to ghosts.

mod util;

use dofvec::prelude::*;
use util::{dist_over, run_ranks};

/// Two ranks, bsize 2, owner range [0,2,4]. Rank 0 writes its two owned
/// blocks; rank 1 ghosts node 1 and must observe its block after the
/// forward scatter. The global norm is sqrt(30) on every rank.
#[test]
fn forward_propagates_owned_blocks() {
    let results = run_ranks(2, |comm| {
        let rank = comm.rank();
        let ext = if rank == 0 { vec![] } else { vec![1] };
        let (map, dist) = dist_over(comm, vec![0, 2, 4], ext, 0x100);
        let mut v = BVec::new(map, 2, None, Some(dist), None).unwrap();

        if rank == 0 {
            v.set_values(&[0, 1], &[1.0, 2.0, 3.0, 4.0], VecOp::Insert)
                .unwrap();
        }
        v.begin_distribute_values().unwrap();
        v.end_distribute_values().unwrap();

        (v.ghost_slice().to_vec(), v.norm().unwrap())
    });

    let (ghost0, norm0) = &results[0];
    let (ghost1, norm1) = &results[1];
    assert!(ghost0.is_empty());
    assert_eq!(ghost1.as_slice(), &[3.0, 4.0]);
    assert_eq!(*norm0, 30.0f64.sqrt());
    assert_eq!(*norm1, 30.0f64.sqrt());
}

/// Identity under forward scatter: with every owned DoF holding
/// `f(id, j) = 10 * id + j`, each rank's ghost array must reproduce `f`
/// for every external node.
#[test]
fn forward_identity_four_ranks() {
    const NODES: i64 = 12;
    const B: usize = 3;
    let f = |id: i64, j: usize| 10.0 * id as f64 + j as f64;

    let results = run_ranks(4, |comm| {
        let rank = comm.rank();
        let owner_range = vec![0, 3, 6, 9, 12];
        // Ghost two nodes from other ranks, deterministically per rank.
        let mut ext: Vec<i64> = vec![(3 * rank as i64 + 4) % NODES, (3 * rank as i64 + 8) % NODES];
        ext.sort_unstable();
        let (map, dist) = dist_over(comm, owner_range, ext.clone(), 0x200);
        let mut v = BVec::new(map.clone(), B, None, Some(dist), None).unwrap();

        let (lo, hi) = map.local_range();
        for id in lo..hi {
            let block: Vec<f64> = (0..B).map(|j| f(id, j)).collect();
            v.set_values(&[id], &block, VecOp::Insert).unwrap();
        }
        v.begin_distribute_values().unwrap();
        v.end_distribute_values().unwrap();
        (ext, v.ghost_slice().to_vec())
    });

    for (ext, ghost) in results {
        for (k, id) in ext.iter().enumerate() {
            for j in 0..B {
                assert_eq!(ghost[B * k + j], f(*id, j), "node {id} dof {j}");
            }
        }
    }
}

/// Two consecutive distribute pairs produce bitwise-identical ghosts.
#[test]
fn forward_is_idempotent() {
    let results = run_ranks(2, |comm| {
        let rank = comm.rank();
        let ext = if rank == 0 { vec![2, 3] } else { vec![0] };
        let (map, dist) = dist_over(comm, vec![0, 2, 4], ext, 0x300);
        let mut v = BVec::new(map.clone(), 2, None, Some(dist), None).unwrap();

        let (lo, hi) = map.local_range();
        for id in lo..hi {
            let block = [0.1 * id as f64 + 0.7, -3.3 * id as f64];
            v.set_values(&[id], &block, VecOp::Insert).unwrap();
        }
        v.begin_distribute_values().unwrap();
        v.end_distribute_values().unwrap();
        let first = v.ghost_slice().to_vec();

        v.begin_distribute_values().unwrap();
        v.end_distribute_values().unwrap();
        let second = v.ghost_slice().to_vec();
        (first, second)
    });

    for (first, second) in results {
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }
}

/// Reads through `get_values` route externally after a distribute.
#[test]
fn get_values_reads_ghosts_after_distribute() {
    let results = run_ranks(2, |comm| {
        let rank = comm.rank();
        let ext = if rank == 0 { vec![3] } else { vec![] };
        let (map, dist) = dist_over(comm, vec![0, 2, 4], ext, 0x400);
        let mut v = BVec::new(map, 2, None, Some(dist), None).unwrap();

        if rank == 1 {
            v.set_values(&[3], &[5.5, 6.5], VecOp::Insert).unwrap();
        }
        v.begin_distribute_values().unwrap();
        v.end_distribute_values().unwrap();

        if rank == 0 {
            let mut out = [0.0; 2];
            v.get_values(&[3], &mut out).unwrap();
            Some(out)
        } else {
            None
        }
    });

    assert_eq!(results[0], Some([5.5, 6.5]));
}

/// A ghost id outside the distributor's index set is a fail-fast error.
#[test]
fn unknown_ghost_id_is_rejected() {
    let results = run_ranks(2, |comm| {
        let rank = comm.rank();
        let ext = if rank == 0 { vec![2] } else { vec![] };
        let (map, dist) = dist_over(comm, vec![0, 2, 4], ext, 0x500);
        let mut v = BVec::new(map, 1, None, Some(dist), None).unwrap();
        if rank == 0 {
            matches!(
                v.set_values(&[3], &[1.0], VecOp::Insert),
                Err(DofVecError::IndexNotFound(3))
            )
        } else {
            true
        }
    });
    assert!(results.into_iter().all(|ok| ok));
}

/// Vectors sharing one distributor scatter concurrently on distinct
/// contexts without aliasing each other's traffic.
#[test]
fn shared_distributor_distinct_contexts() {
    let results = run_ranks(2, |comm| {
        let rank = comm.rank();
        let ext = if rank == 0 { vec![2] } else { vec![1] };
        let (map, dist) = dist_over(comm, vec![0, 2, 4], ext, 0x600);
        let mut v = BVec::new(map.clone(), 1, None, Some(dist.clone()), None).unwrap();
        let mut w = BVec::new(map.clone(), 1, None, Some(dist), None).unwrap();

        let (lo, hi) = map.local_range();
        for id in lo..hi {
            v.set_values(&[id], &[id as f64], VecOp::Insert).unwrap();
            w.set_values(&[id], &[100.0 + id as f64], VecOp::Insert)
                .unwrap();
        }
        // Interleave the two in-flight scatters.
        v.begin_distribute_values().unwrap();
        w.begin_distribute_values().unwrap();
        w.end_distribute_values().unwrap();
        v.end_distribute_values().unwrap();

        (v.ghost_slice().to_vec(), w.ghost_slice().to_vec())
    });

    assert_eq!(results[0].0, vec![2.0]);
    assert_eq!(results[0].1, vec![102.0]);
    assert_eq!(results[1].0, vec![1.0]);
    assert_eq!(results[1].1, vec![101.0]);
}
