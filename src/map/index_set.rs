//! `IndexSet`: sorted set of external (ghost) node ids.
//!
//! The set is strictly ascending, so lookup is a binary search and the ghost
//! blocks a peer contributes always occupy a contiguous run of positions.

use crate::error::DofVecError;

/// Ascending unique list of global node ids.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexSet {
    indices: Vec<i64>,
}

impl IndexSet {
    /// Validate and wrap a strictly-ascending list of non-negative ids.
    pub fn new(indices: Vec<i64>) -> Result<Self, DofVecError> {
        if indices.first().is_some_and(|&i| i < 0)
            || indices.windows(2).any(|w| w[0] >= w[1])
        {
            return Err(DofVecError::InvalidIndexSet);
        }
        Ok(Self { indices })
    }

    /// Sort and deduplicate an arbitrary id list, then wrap it.
    pub fn from_unsorted(mut indices: Vec<i64>) -> Result<Self, DofVecError> {
        indices.sort_unstable();
        indices.dedup();
        Self::new(indices)
    }

    /// Position of `id` in the set. Absent ids are an error; writes and
    /// reads that reach this path address ghost storage that was never
    /// provisioned, so failing fast beats a silent misroute.
    #[inline]
    pub fn find_index(&self, id: i64) -> Result<usize, DofVecError> {
        self.indices
            .binary_search(&id)
            .map_err(|_| DofVecError::IndexNotFound(id))
    }

    #[inline]
    pub fn contains(&self, id: i64) -> bool {
        self.indices.binary_search(&id).is_ok()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[i64] {
        &self.indices
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.indices.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_index_binary_search() {
        let set = IndexSet::new(vec![2, 5, 9, 40]).unwrap();
        assert_eq!(set.find_index(2).unwrap(), 0);
        assert_eq!(set.find_index(9).unwrap(), 2);
        assert_eq!(set.find_index(40).unwrap(), 3);
        assert!(matches!(
            set.find_index(7),
            Err(DofVecError::IndexNotFound(7))
        ));
    }

    #[test]
    fn rejects_unsorted_and_negative() {
        assert!(IndexSet::new(vec![3, 3]).is_err());
        assert!(IndexSet::new(vec![5, 2]).is_err());
        assert!(IndexSet::new(vec![-1, 2]).is_err());
        assert!(IndexSet::new(vec![]).is_ok());
    }

    #[test]
    fn from_unsorted_normalizes() {
        let set = IndexSet::from_unsorted(vec![9, 2, 9, 5]).unwrap();
        assert_eq!(set.as_slice(), &[2, 5, 9]);
    }
}
