#![allow(dead_code)]
use std::sync::Arc;

use dofvec::comm::{CommTag, ThreadComm};
use dofvec::map::{IndexSet, VarMap};
use dofvec::scatter::Distributor;

/// Run `f` once per rank on its own thread over a fresh `ThreadComm`
/// universe; results come back in rank order.
pub fn run_ranks<T: Send>(size: usize, f: impl Fn(ThreadComm) -> T + Send + Sync) -> Vec<T> {
    let comms = ThreadComm::split(size);
    std::thread::scope(|s| {
        let f = &f;
        let handles: Vec<_> = comms.into_iter().map(|c| s.spawn(move || f(c))).collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank panicked"))
            .collect()
    })
}

/// Ownership map plus distributor over the given ghost ids for one rank.
pub fn dist_over(
    comm: ThreadComm,
    owner_range: Vec<i64>,
    ext_ids: Vec<i64>,
    tag: u16,
) -> (Arc<VarMap<ThreadComm>>, Arc<Distributor<ThreadComm>>) {
    let comm = Arc::new(comm);
    let map = Arc::new(VarMap::from_owner_range(comm, owner_range).unwrap());
    let ext = Arc::new(IndexSet::new(ext_ids).unwrap());
    let dist = Arc::new(Distributor::new(map.clone(), ext, CommTag::new(tag)).unwrap());
    (map, dist)
}

/// Evenly split `nodes` over `size` ranks, leftovers to the low ranks.
pub fn even_owner_range(nodes: i64, size: usize) -> Vec<i64> {
    let mut range = Vec::with_capacity(size + 1);
    range.push(0);
    for r in 0..size as i64 {
        let share = nodes / size as i64 + i64::from(r < nodes % size as i64);
        range.push(range[r as usize] + share);
    }
    range
}

/// Assert element-wise closeness with a relative tolerance.
pub fn assert_close(got: &[f64], want: &[f64], tol: f64) {
    assert_eq!(got.len(), want.len());
    for (i, (g, w)) in got.iter().zip(want).enumerate() {
        let scale = 1.0f64.max(w.abs());
        assert!(
            (g - w).abs() <= tol * scale,
            "entry {i}: got {g}, want {w}"
        );
    }
}
