//! Flattened per-cell drainage graph
//!
//! Cells are addressed by flat index `row * cols + col`. Each valid cell
//! stores the index of the cell it drains into, or [`NO_DOWNSTREAM`] when it
//! is an outlet or explicit sink. Directions form a forest, so every walk
//! along `downstream` terminates.

use crate::priority_flood::FlowRouting;
use catchflow_core::raster::{d8, Raster};
use catchflow_core::{Error, Result};

/// Sentinel for "drains out of the grid or into a sink"
pub const NO_DOWNSTREAM: u32 = u32::MAX;

/// Arena of downstream pointers over the grid
#[derive(Debug, Clone)]
pub struct FlowGraph {
    rows: usize,
    cols: usize,
    downstream: Vec<u32>,
    valid: Vec<bool>,
}

impl FlowGraph {
    /// Build from a routed surface.
    pub fn from_routing(routing: &FlowRouting) -> Result<Self> {
        let valid: Vec<bool> = routing.filled.data().iter().map(|v| !v.is_nan()).collect();
        Self::from_directions(&routing.direction, valid)
    }

    /// Build from D8 codes and a validity mask.
    ///
    /// A valid cell pointing off the grid or into an invalid cell is an
    /// inconsistency, not an outlet.
    pub fn from_directions(direction: &Raster<u8>, valid: Vec<bool>) -> Result<Self> {
        let (rows, cols) = direction.shape();
        if valid.len() != rows * cols {
            return Err(Error::SizeMismatch {
                er: rows,
                ec: cols,
                ar: valid.len() / cols.max(1),
                ac: cols,
            });
        }
        if rows * cols >= NO_DOWNSTREAM as usize {
            return Err(Error::InvalidDimensions { width: cols, height: rows });
        }

        let mut downstream = vec![NO_DOWNSTREAM; rows * cols];
        for row in 0..rows {
            for col in 0..cols {
                let idx = row * cols + col;
                let dir = unsafe { direction.get_unchecked(row, col) };
                if !valid[idx] || dir == d8::NONE {
                    continue;
                }
                match d8::step(row, col, dir, rows, cols) {
                    Some((r, c)) if valid[r * cols + c] => downstream[idx] = (r * cols + c) as u32,
                    _ => {
                        return Err(Error::Inconsistent(format!(
                            "cell ({row}, {col}) direction {dir} leaves the valid grid"
                        )))
                    }
                }
            }
        }

        Ok(Self { rows, cols, downstream, valid })
    }

    /// Build directly from downstream pointers (used when reloading a snapshot).
    pub fn from_downstream(rows: usize, cols: usize, downstream: Vec<u32>, valid: Vec<bool>) -> Result<Self> {
        let n = rows * cols;
        if downstream.len() != n || valid.len() != n {
            return Err(Error::SizeMismatch {
                er: rows,
                ec: cols,
                ar: downstream.len() / cols.max(1),
                ac: cols,
            });
        }
        for (idx, &down) in downstream.iter().enumerate() {
            if down == NO_DOWNSTREAM {
                continue;
            }
            let target = down as usize;
            let adjacent = target < n
                && d8::code_between((idx / cols, idx % cols), (target / cols, target % cols)).is_some();
            if !valid[idx] || !adjacent || !valid[target] {
                return Err(Error::Inconsistent(format!(
                    "cell {idx} has dangling downstream reference {down}"
                )));
            }
        }
        Ok(Self { rows, cols, downstream, valid })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total cells, valid or not
    pub fn len(&self) -> usize {
        self.downstream.len()
    }

    pub fn is_empty(&self) -> bool {
        self.downstream.is_empty()
    }

    #[inline]
    pub fn is_valid(&self, idx: usize) -> bool {
        self.valid[idx]
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    pub fn valid_mask(&self) -> &[bool] {
        &self.valid
    }

    #[inline]
    pub fn downstream(&self, idx: usize) -> Option<usize> {
        let d = self.downstream[idx];
        (d != NO_DOWNSTREAM).then_some(d as usize)
    }

    /// Raw downstream array with [`NO_DOWNSTREAM`] sentinels
    pub fn downstream_ids(&self) -> &[u32] {
        &self.downstream
    }

    /// Neighbors draining directly into `idx`, in D8 code order
    pub fn upstream(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        let (row, col) = (idx / self.cols, idx % self.cols);
        d8::neighbors(row, col, self.rows, self.cols)
            .map(move |(_, r, c)| r * self.cols + c)
            .filter(move |&n| self.downstream[n] == idx as u32)
    }

    /// Valid cells with no downstream neighbor
    pub fn outlets(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(move |&i| self.valid[i] && self.downstream[i] == NO_DOWNSTREAM)
    }

    /// Valid cells ordered so every cell precedes the cell it drains into.
    ///
    /// Kahn's algorithm over inflow degrees. A cycle leaves cells with
    /// unresolved inflow and is reported as [`Error::Inconsistent`].
    pub fn topological_order(&self) -> Result<Vec<u32>> {
        let n = self.len();
        let mut inflow = vec![0u8; n];
        for (idx, &down) in self.downstream.iter().enumerate() {
            if self.valid[idx] && down != NO_DOWNSTREAM {
                inflow[down as usize] += 1;
            }
        }

        let mut order: Vec<u32> = (0..n)
            .filter(|&i| self.valid[i] && inflow[i] == 0)
            .map(|i| i as u32)
            .collect();

        let mut head = 0;
        while head < order.len() {
            let idx = order[head] as usize;
            head += 1;
            let down = self.downstream[idx];
            if down == NO_DOWNSTREAM {
                continue;
            }
            let d = down as usize;
            inflow[d] -= 1;
            if inflow[d] == 0 {
                order.push(down);
            }
        }

        let expected = self.valid_count();
        if order.len() != expected {
            return Err(Error::Inconsistent(format!(
                "flow directions contain a cycle: {} of {} cells ordered",
                order.len(),
                expected
            )));
        }
        Ok(order)
    }
}
