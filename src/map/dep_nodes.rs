//! `DepNodes`: CSR table of dependent nodes.
//!
//! A dependent node is a weighted linear combination of real nodes. The
//! negative id `n` seen by the vector API decodes to row `d = -n - 1` of this
//! table. Constituents must be real (non-negative) node ids; the relations
//! are static.

use crate::error::DofVecError;

/// CSR-shaped dependent-node relations: row `d` holds the constituent node
/// ids `conn[ptr[d]..ptr[d+1]]` with matching weights.
#[derive(Clone, Debug, Default)]
pub struct DepNodes {
    ptr: Vec<usize>,
    conn: Vec<i64>,
    weights: Vec<f64>,
}

impl DepNodes {
    /// Validate and wrap the CSR triple.
    pub fn new(ptr: Vec<usize>, conn: Vec<i64>, weights: Vec<f64>) -> Result<Self, DofVecError> {
        if ptr.first() != Some(&0) {
            return Err(DofVecError::MalformedDepNodes(
                "row pointer must start at zero",
            ));
        }
        if ptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(DofVecError::MalformedDepNodes(
                "row pointer must be non-decreasing",
            ));
        }
        if *ptr.last().expect("ptr non-empty") != conn.len() {
            return Err(DofVecError::MalformedDepNodes(
                "row pointer must end at the connectivity length",
            ));
        }
        if conn.len() != weights.len() {
            return Err(DofVecError::MalformedDepNodes(
                "connectivity and weights must have equal length",
            ));
        }
        if conn.iter().any(|&c| c < 0) {
            return Err(DofVecError::MalformedDepNodes(
                "constituents must be real (non-negative) node ids",
            ));
        }
        Ok(Self { ptr, conn, weights })
    }

    /// Number of dependent nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.ptr.len() - 1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Constituents and weights of dependent node `d`.
    #[inline]
    pub fn row(&self, d: usize) -> (&[i64], &[f64]) {
        let lo = self.ptr[d];
        let hi = self.ptr[d + 1];
        (&self.conn[lo..hi], &self.weights[lo..hi])
    }

    /// Iterate over all rows in order.
    pub fn rows(&self) -> impl Iterator<Item = (&[i64], &[f64])> + '_ {
        (0..self.len()).map(move |d| self.row(d))
    }

    /// Raw CSR buffers `(ptr, conn, weights)`.
    pub fn raw(&self) -> (&[usize], &[i64], &[f64]) {
        (&self.ptr, &self.conn, &self.weights)
    }
}
