//! Flow accumulation
//!
//! Number of cells whose flow path passes through each cell, the cell
//! itself included, so headwaters carry 1. Computed with one Kahn pass over
//! the [`FlowGraph`]; no recursion, so path length is unbounded.

use crate::flow_graph::{FlowGraph, NO_DOWNSTREAM};
use catchflow_core::{Algorithm, Error, Result};
use std::time::Instant;
use tracing::info;

/// Accumulation counts plus the topological order that produced them
#[derive(Debug, Clone)]
pub struct Accumulation {
    /// Cells draining through each cell; 0 for nodata
    pub counts: Vec<u32>,
    /// Valid cells, upstream before downstream
    pub order: Vec<u32>,
}

impl Accumulation {
    #[inline]
    pub fn at(&self, idx: usize) -> u32 {
        self.counts[idx]
    }

    pub fn max(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }
}

/// Flow accumulation algorithm
#[derive(Debug, Clone, Default)]
pub struct FlowAccumulator;

impl Algorithm for FlowAccumulator {
    type Input = FlowGraph;
    type Output = Accumulation;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Flow Accumulation"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        flow_accumulation(&input)
    }
}

/// Calculate flow accumulation over a flow graph.
///
/// # Algorithm
/// 1. Order valid cells topologically (inflow degree, Kahn)
/// 2. Walk the order, adding each cell's count to its downstream cell
///
/// # Errors
/// [`Error::Inconsistent`] if the directions contain a cycle.
pub fn flow_accumulation(graph: &FlowGraph) -> Result<Accumulation> {
    let start = Instant::now();
    let order = graph.topological_order()?;

    let mut counts = vec![0u32; graph.len()];
    for &idx in &order {
        counts[idx as usize] += 1;
        let down = graph.downstream_ids()[idx as usize];
        if down != NO_DOWNSTREAM {
            counts[down as usize] += counts[idx as usize];
        }
    }

    info!(
        cells = order.len(),
        max = counts.iter().copied().max().unwrap_or(0),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "flow accumulated"
    );

    Ok(Accumulation { counts, order })
}

#[cfg(test)]
mod tests {
    use super::*;
    use catchflow_core::raster::Raster;

    fn graph(codes: &[u8], rows: usize, cols: usize) -> FlowGraph {
        let dirs = Raster::from_vec(codes.to_vec(), rows, cols).unwrap();
        FlowGraph::from_directions(&dirs, vec![true; rows * cols]).unwrap()
    }

    #[test]
    fn test_linear_flow() {
        // 1x5: all flow east into the last cell
        let acc = flow_accumulation(&graph(&[1, 1, 1, 1, 0], 1, 5)).unwrap();
        assert_eq!(acc.counts, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_convergent_flow() {
        // 3x3, everything drains to the center
        #[rustfmt::skip]
        let codes = [
            8, 7, 6,
            1, 0, 5,
            2, 3, 4,
        ];
        let acc = flow_accumulation(&graph(&codes, 3, 3)).unwrap();
        assert_eq!(acc.at(4), 9);
        assert_eq!(acc.at(0), 1);
        assert_eq!(acc.max(), 9);
    }

    #[test]
    fn test_outlet_equals_one_plus_children() {
        // Two branches meeting: 0 <- 1 <- 2 and 0 <- 3 (row below)
        #[rustfmt::skip]
        let codes = [
            0, 5, 5,
            3, 4, 4,
        ];
        let g = graph(&codes, 2, 3);
        let acc = flow_accumulation(&g).unwrap();
        for idx in 0..g.len() {
            let children: u32 = g.upstream(idx).map(|c| acc.at(c)).sum();
            assert_eq!(acc.at(idx), 1 + children);
        }
        assert_eq!(acc.at(0), 6);
    }

    #[test]
    fn test_nodata_cells_carry_zero() {
        let dirs = Raster::from_vec(vec![0u8, 5, 0], 1, 3).unwrap();
        let g = FlowGraph::from_directions(&dirs, vec![true, true, false]).unwrap();
        let acc = flow_accumulation(&g).unwrap();
        assert_eq!(acc.counts, vec![2, 1, 0]);
        assert_eq!(acc.order.len(), 2);
    }
}
