//! `BcMap`: Dirichlet boundary-condition records.
//!
//! Five parallel append-only buffers describe which DoFs of which nodes are
//! constrained: per record a local and a global node id, plus a CSR window
//! into the per-DoF index/value buffers. Vector application zeroes the
//! indicated DoFs; the stored values are retained for matrix row
//! modification elsewhere in the solver stack.

use crate::error::DofVecError;

/// One boundary-condition record, borrowed from the map.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BcRecord<'a> {
    pub local: i64,
    pub global: i64,
    /// DoF indices within the node's block.
    pub vars: &'a [usize],
    /// Clamp values (zero unless specified at `add_bc`).
    pub values: &'a [f64],
}

/// Append-only table of Dirichlet constraints.
#[derive(Clone, Debug)]
pub struct BcMap {
    local: Vec<i64>,
    global: Vec<i64>,
    var_ptr: Vec<usize>,
    vars: Vec<usize>,
    values: Vec<f64>,
}

impl Default for BcMap {
    fn default() -> Self {
        Self::new()
    }
}

impl BcMap {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// `num_bcs` is an estimate of the number of records; roughly eight DoFs
    /// per node are reserved up front.
    pub fn with_capacity(num_bcs: usize) -> Self {
        let mut var_ptr = Vec::with_capacity(num_bcs + 1);
        var_ptr.push(0);
        Self {
            local: Vec::with_capacity(num_bcs),
            global: Vec::with_capacity(num_bcs),
            var_ptr,
            vars: Vec::with_capacity(8 * (num_bcs + 1)),
            values: Vec::with_capacity(8 * (num_bcs + 1)),
        }
    }

    /// Append one record. If `bc_vals` is omitted the values default to zero
    /// for every listed DoF.
    pub fn add_bc(
        &mut self,
        local: i64,
        global: i64,
        bc_nums: &[usize],
        bc_vals: Option<&[f64]>,
    ) -> Result<(), DofVecError> {
        if let Some(vals) = bc_vals {
            if vals.len() != bc_nums.len() {
                return Err(DofVecError::BcValueCountMismatch {
                    nvars: bc_nums.len(),
                    nvals: vals.len(),
                });
            }
        }
        self.local.push(local);
        self.global.push(global);
        self.vars.extend_from_slice(bc_nums);
        match bc_vals {
            Some(vals) => self.values.extend_from_slice(vals),
            None => self.values.resize(self.values.len() + bc_nums.len(), 0.0),
        }
        self.var_ptr.push(self.vars.len());
        Ok(())
    }

    /// Number of records.
    #[inline]
    pub fn len(&self) -> usize {
        self.local.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    /// Record `i`.
    pub fn record(&self, i: usize) -> BcRecord<'_> {
        let lo = self.var_ptr[i];
        let hi = self.var_ptr[i + 1];
        BcRecord {
            local: self.local[i],
            global: self.global[i],
            vars: &self.vars[lo..hi],
            values: &self.values[lo..hi],
        }
    }

    /// Iterate over all records in insertion order.
    pub fn records(&self) -> impl Iterator<Item = BcRecord<'_>> + '_ {
        (0..self.len()).map(move |i| self.record(i))
    }

    /// Raw buffers `(local, global, var_ptr, vars, values)` and the count.
    pub fn bcs(&self) -> (&[i64], &[i64], &[usize], &[usize], &[f64], usize) {
        (
            &self.local,
            &self.global,
            &self.var_ptr,
            &self.vars,
            &self.values,
            self.len(),
        )
    }
}
