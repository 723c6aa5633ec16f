//! In-memory catchment graph
//!
//! Nodes are catchments (one per stream segment) with dense 0-based ids.
//! Each node drains into at most one parent, so the graph is a forest stored
//! as a parent-index array; the upstream direction is a CSR list derived
//! from it once at build time. Attributes live in flat arrays indexed by id.
//!
//! Nothing here mutates after construction, so any number of threads can
//! share one graph behind an `Arc`.

use crate::boundary::{perimeter, union_all};
use crate::spatial_index::BucketIndex;
use crate::store::CatchmentRecord;
use catchflow_core::Error;
use catchflow_hydro::ElevationHistogram;
use geo::{MultiPolygon, Point};
use std::collections::VecDeque;

/// Sentinel parent of a basin outlet catchment
pub const NO_PARENT: u32 = u32::MAX;

/// How far [`CatchmentGraph::traverse_upstream`] expands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalMode {
    /// The whole rooted subtree
    #[default]
    Full,
    /// Stop expanding at any node with more than one upstream neighbor
    ToFirstConfluence,
}

/// Aggregate over a set of catchments
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub area: f64,
    pub cell_count: u64,
    pub min_elevation: f64,
    pub max_elevation: f64,
    /// Area-weighted
    pub mean_elevation: f64,
    /// Area-weighted
    pub mean_slope_percent: f64,
    pub stream_length: f64,
    /// Recomputed from the union outline
    pub perimeter: f64,
    pub histogram: ElevationHistogram,
    pub union: MultiPolygon<f64>,
}

#[derive(Debug, Clone)]
pub struct CatchmentGraph {
    parent: Vec<u32>,
    child_offsets: Vec<u32>,
    child_ids: Vec<u32>,
    area: Vec<f64>,
    cell_count: Vec<u64>,
    min_elevation: Vec<f64>,
    max_elevation: Vec<f64>,
    mean_elevation: Vec<f64>,
    mean_slope: Vec<f64>,
    stream_length: Vec<f64>,
    perimeter: Vec<f64>,
    histograms: Vec<ElevationHistogram>,
    polygons: Vec<MultiPolygon<f64>>,
    index: BucketIndex,
}

impl CatchmentGraph {
    /// Build from persisted catchments. Record `i` must carry id `i`.
    ///
    /// # Errors
    /// [`Error::Inconsistent`] for out-of-order ids, parents out of range,
    /// or a parent cycle.
    pub fn from_records(records: &[CatchmentRecord]) -> catchflow_core::Result<Self> {
        let n = records.len();
        let mut parent = Vec::with_capacity(n);
        for (i, r) in records.iter().enumerate() {
            if r.id as usize != i {
                return Err(Error::Inconsistent(format!("catchment at position {i} has id {}", r.id)));
            }
            let p = match r.downstream_segment_id {
                Some(p) if (p as usize) < n && p as usize != i => p,
                Some(p) => {
                    return Err(Error::Inconsistent(format!("catchment {i} has invalid parent {p}")))
                }
                None => NO_PARENT,
            };
            parent.push(p);
        }

        // Counting sort of children by parent
        let mut child_offsets = vec![0u32; n + 1];
        for &p in &parent {
            if p != NO_PARENT {
                child_offsets[p as usize + 1] += 1;
            }
        }
        for i in 0..n {
            child_offsets[i + 1] += child_offsets[i];
        }
        let mut fill = child_offsets.clone();
        let mut child_ids = vec![0u32; child_offsets[n] as usize];
        for (child, &p) in parent.iter().enumerate() {
            if p != NO_PARENT {
                child_ids[fill[p as usize] as usize] = child as u32;
                fill[p as usize] += 1;
            }
        }

        let polygons: Vec<MultiPolygon<f64>> = records.iter().map(|r| r.geometry.clone()).collect();
        let graph = Self {
            parent,
            child_offsets,
            child_ids,
            area: records.iter().map(|r| r.area).collect(),
            cell_count: records.iter().map(|r| r.cell_count).collect(),
            min_elevation: records.iter().map(|r| r.min_elevation).collect(),
            max_elevation: records.iter().map(|r| r.max_elevation).collect(),
            mean_elevation: records.iter().map(|r| r.mean_elevation).collect(),
            mean_slope: records.iter().map(|r| r.mean_slope_percent).collect(),
            stream_length: records.iter().map(|r| r.stream_length).collect(),
            perimeter: records.iter().map(|r| r.perimeter).collect(),
            histograms: records.iter().map(|r| r.elevation_histogram.clone()).collect(),
            index: BucketIndex::build(&polygons),
            polygons,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    /// Every node reaches a root; a full traversal from all roots covers the forest.
    fn check_acyclic(&self) -> catchflow_core::Result<()> {
        let mut seen = 0usize;
        let mut queue: VecDeque<u32> = self.roots().collect();
        while let Some(id) = queue.pop_front() {
            seen += 1;
            queue.extend(self.children(id).iter().copied());
        }
        if seen != self.len() {
            return Err(Error::Inconsistent(format!(
                "catchment parents form a cycle: {seen} of {} nodes reachable from outlets",
                self.len()
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    pub fn contains(&self, id: u32) -> bool {
        (id as usize) < self.len()
    }

    pub fn parent(&self, id: u32) -> Option<u32> {
        let p = self.parent[id as usize];
        (p != NO_PARENT).then_some(p)
    }

    /// Direct upstream neighbors
    pub fn children(&self, id: u32) -> &[u32] {
        let start = self.child_offsets[id as usize] as usize;
        let end = self.child_offsets[id as usize + 1] as usize;
        &self.child_ids[start..end]
    }

    /// Catchments draining out of the graph
    pub fn roots(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.len() as u32).filter(move |&i| self.parent[i as usize] == NO_PARENT)
    }

    pub fn area(&self, id: u32) -> f64 {
        self.area[id as usize]
    }

    pub fn cell_count(&self, id: u32) -> u64 {
        self.cell_count[id as usize]
    }

    pub fn perimeter(&self, id: u32) -> f64 {
        self.perimeter[id as usize]
    }

    pub fn polygon(&self, id: u32) -> &MultiPolygon<f64> {
        &self.polygons[id as usize]
    }

    /// Catchment whose polygon contains (or touches) `point`; ties go to
    /// the lowest id.
    pub fn find_catchment_at(&self, point: Point<f64>) -> Option<u32> {
        self.index.locate(point, &self.polygons)
    }

    /// Breadth-first walk of the subtree rooted at `id`, root first.
    ///
    /// Cost is proportional to the nodes yielded, never to the graph size.
    pub fn traverse_upstream(&self, id: u32, mode: TraversalMode) -> catchflow_core::Result<UpstreamWalk<'_>> {
        if !self.contains(id) {
            return Err(Error::InvalidParameter {
                name: "catchment_id",
                value: id.to_string(),
                reason: format!("graph has {} catchments", self.len()),
            });
        }
        Ok(UpstreamWalk {
            graph: self,
            queue: VecDeque::from([id]),
            mode,
        })
    }

    /// Combine the attributes of `ids` (each expected once).
    pub fn aggregate(&self, ids: &[u32]) -> catchflow_core::Result<Aggregate> {
        let first = *ids
            .first()
            .ok_or_else(|| Error::InvalidParameter {
                name: "ids",
                value: "[]".into(),
                reason: "nothing to aggregate".into(),
            })?;
        if let Some(&bad) = ids.iter().find(|&&id| !self.contains(id)) {
            return Err(Error::InvalidParameter {
                name: "catchment_id",
                value: bad.to_string(),
                reason: format!("graph has {} catchments", self.len()),
            });
        }

        let mut area = 0.0;
        let mut cell_count = 0;
        let mut min_elevation = f64::INFINITY;
        let mut max_elevation = f64::NEG_INFINITY;
        let mut weighted_elevation = 0.0;
        let mut weighted_slope = 0.0;
        let mut stream_length = 0.0;
        let mut histogram = self.histograms[first as usize].clone();

        for (n, &id) in ids.iter().enumerate() {
            let i = id as usize;
            area += self.area[i];
            cell_count += self.cell_count[i];
            min_elevation = min_elevation.min(self.min_elevation[i]);
            max_elevation = max_elevation.max(self.max_elevation[i]);
            weighted_elevation += self.mean_elevation[i] * self.area[i];
            weighted_slope += self.mean_slope[i] * self.area[i];
            stream_length += self.stream_length[i];
            if n > 0 {
                histogram = histogram.merge(&self.histograms[i])?;
            }
        }

        let union = union_all(ids.iter().map(|&id| self.polygons[id as usize].clone()).collect());
        let (mean_elevation, mean_slope_percent) = if area > 0.0 {
            (weighted_elevation / area, weighted_slope / area)
        } else {
            (f64::NAN, f64::NAN)
        };

        Ok(Aggregate {
            area,
            cell_count,
            min_elevation,
            max_elevation,
            mean_elevation,
            mean_slope_percent,
            stream_length,
            perimeter: perimeter(&union),
            histogram,
            union,
        })
    }
}

/// Lazy breadth-first upstream traversal.
///
/// Pure: it knows nothing about deadlines or ceilings, which callers apply
/// by deciding how far to drive it.
#[derive(Debug, Clone)]
pub struct UpstreamWalk<'g> {
    graph: &'g CatchmentGraph,
    queue: VecDeque<u32>,
    mode: TraversalMode,
}

impl Iterator for UpstreamWalk<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let id = self.queue.pop_front()?;
        let children = self.graph.children(id);
        let expand = match self.mode {
            TraversalMode::Full => true,
            TraversalMode::ToFirstConfluence => children.len() <= 1,
        };
        if expand {
            self.queue.extend(children.iter().copied());
        }
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::cell_square;
    use approx::assert_relative_eq;

    /// Unit-square catchment at column `col` of a single row
    fn record(id: u32, col: f64, parent: Option<u32>, elevation: f64) -> CatchmentRecord {
        CatchmentRecord {
            id,
            geometry: MultiPolygon::new(vec![cell_square(col + 0.5, 0.5, 1.0)]),
            segment_id: id,
            threshold_used: 1,
            area: 1.0,
            cell_count: 1,
            mean_elevation: elevation,
            min_elevation: elevation,
            max_elevation: elevation,
            mean_slope_percent: 1.0,
            perimeter: 4.0,
            stream_length: 1.0,
            downstream_segment_id: parent,
            elevation_histogram: ElevationHistogram::from_values([elevation], 1.0).unwrap(),
        }
    }

    //   3   4
    //    \ /
    //     1   2
    //      \ /
    //       0
    fn tree() -> CatchmentGraph {
        CatchmentGraph::from_records(&[
            record(0, 0.0, None, 10.0),
            record(1, 1.0, Some(0), 20.0),
            record(2, 2.0, Some(0), 30.0),
            record(3, 3.0, Some(1), 40.0),
            record(4, 4.0, Some(1), 50.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_children_and_parent() {
        let g = tree();
        assert_eq!(g.children(0), &[1, 2]);
        assert_eq!(g.children(1), &[3, 4]);
        assert!(g.children(3).is_empty());
        assert_eq!(g.parent(3), Some(1));
        assert_eq!(g.parent(0), None);
        assert_eq!(g.roots().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_full_traversal_is_breadth_first() {
        let g = tree();
        let ids: Vec<u32> = g.traverse_upstream(0, TraversalMode::Full).unwrap().collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        let sub: Vec<u32> = g.traverse_upstream(1, TraversalMode::Full).unwrap().collect();
        assert_eq!(sub, vec![1, 3, 4]);
    }

    #[test]
    fn test_to_first_confluence_stops_at_fork() {
        let g = tree();
        let ids: Vec<u32> = g.traverse_upstream(0, TraversalMode::ToFirstConfluence).unwrap().collect();
        assert_eq!(ids, vec![0]);
    }

    #[test]
    fn test_to_first_confluence_follows_single_chain() {
        // 2 -> 1 -> 0 chain, with 3 and 4 both draining into 2
        let g = CatchmentGraph::from_records(&[
            record(0, 0.0, None, 1.0),
            record(1, 1.0, Some(0), 2.0),
            record(2, 2.0, Some(1), 3.0),
            record(3, 3.0, Some(2), 4.0),
            record(4, 4.0, Some(2), 5.0),
        ])
        .unwrap();
        let ids: Vec<u32> = g.traverse_upstream(0, TraversalMode::ToFirstConfluence).unwrap().collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_traversal_is_idempotent() {
        let g = tree();
        let a: Vec<u32> = g.traverse_upstream(1, TraversalMode::Full).unwrap().collect();
        let b: Vec<u32> = g.traverse_upstream(1, TraversalMode::Full).unwrap().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_aggregate() {
        let g = tree();
        let ids: Vec<u32> = g.traverse_upstream(0, TraversalMode::Full).unwrap().collect();
        let agg = g.aggregate(&ids).unwrap();
        assert_relative_eq!(agg.area, 5.0);
        assert_eq!(agg.cell_count, 5);
        assert_eq!(agg.min_elevation, 10.0);
        assert_eq!(agg.max_elevation, 50.0);
        assert_relative_eq!(agg.mean_elevation, 30.0);
        assert_relative_eq!(agg.stream_length, 5.0);
        // One 5x1 strip, not five separate squares
        assert_relative_eq!(agg.perimeter, 12.0, epsilon = 1e-9);
        assert_eq!(agg.histogram.total(), 5);
        assert_eq!(agg.histogram.base_value, 10.0);
    }

    #[test]
    fn test_find_catchment_at() {
        let g = tree();
        assert_eq!(g.find_catchment_at(Point::new(2.5, 0.5)), Some(2));
        // Shared edge: lowest id wins
        assert_eq!(g.find_catchment_at(Point::new(1.0, 0.5)), Some(0));
        assert_eq!(g.find_catchment_at(Point::new(9.0, 9.0)), None);
    }

    #[test]
    fn test_cycle_rejected() {
        let err = CatchmentGraph::from_records(&[record(0, 0.0, Some(1), 1.0), record(1, 1.0, Some(0), 1.0)])
            .unwrap_err();
        assert!(matches!(err, Error::Inconsistent(_)));
    }

    #[test]
    fn test_unknown_id_is_input_error() {
        let g = tree();
        let err = g.traverse_upstream(99, TraversalMode::Full).unwrap_err();
        assert!(err.is_input_error());
    }
}
