//! Watershed queries
//!
//! Each query walks a fixed sequence of states:
//!
//! ```text
//! Idle -> Locating -> SizeChecked -> Traversing -> BoundaryBuilt -> Done
//!            |             |             |              |
//!            +-------------+------> Rejected <----------+
//! ```
//!
//! Locating snaps the point to the nearest stream cell inside the search
//! radius. SizeChecked compares that cell's stored accumulation with the
//! cell ceiling before any traversal happens. Traversing drives the upstream
//! walk through the [`ResourceGuard`]. BoundaryBuilt merges the member
//! catchments. Any failure lands in Rejected and no partial result escapes.

use crate::boundary::watershed_outline;
use crate::catchment_graph::{CatchmentGraph, TraversalMode};
use crate::config::QueryConfig;
use crate::error::QueryError;
use crate::guard::ResourceGuard;
use crate::snapshot::{CellTable, LiveSnapshot, Snapshot};
use catchflow_hydro::ElevationHistogram;
use geo::{Point, Polygon};
use std::cell::Cell;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Idle,
    Locating,
    SizeChecked,
    Traversing,
    BoundaryBuilt,
    Done,
    Rejected,
}

fn transition(state: &mut QueryState, next: QueryState) {
    debug!(from = ?*state, to = ?next, "query state");
    *state = next;
}

/// Aggregate description of everything draining to one outlet
#[derive(Debug, Clone)]
pub struct WatershedResult {
    pub query_point: Point<f64>,
    /// Center of the snapped stream cell
    pub outlet: Point<f64>,
    pub outlet_cell: u64,
    pub snap_distance: f64,
    pub outlet_catchment: u32,
    /// Member catchments in traversal order; each is also the id of the
    /// stream segment it drains
    pub catchment_ids: Vec<u32>,
    pub boundary: Polygon<f64>,
    pub area: f64,
    pub cell_count: u64,
    pub min_elevation: f64,
    pub max_elevation: f64,
    pub mean_elevation: f64,
    pub mean_slope_percent: f64,
    pub perimeter: f64,
    pub stream_length: f64,
    /// Length of the path following the largest upstream branch
    pub main_stem_length: f64,
    /// Drop per unit length along the main stem
    pub main_stem_slope: f64,
    pub histogram: ElevationHistogram,
    /// Snapshot generation the answer was computed against
    pub generation: u64,
    pub elapsed: Duration,
}

impl WatershedResult {
    pub fn hypsometric_integral(&self) -> f64 {
        self.histogram.hypsometric_integral()
    }
}

/// Lock-free counters shared by every caller of one engine
#[derive(Debug, Default)]
pub struct QueryStats {
    queries: AtomicU64,
    completed: AtomicU64,
    not_found: AtomicU64,
    too_large: AtomicU64,
    timeouts: AtomicU64,
    input_errors: AtomicU64,
    inconsistent: AtomicU64,
    traversal_steps: AtomicU64,
}

/// Point-in-time copy of [`QueryStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStatsSnapshot {
    pub queries: u64,
    pub completed: u64,
    pub not_found: u64,
    pub too_large: u64,
    pub timeouts: u64,
    pub input_errors: u64,
    pub inconsistent: u64,
    pub traversal_steps: u64,
}

impl QueryStats {
    fn record(&self, outcome: &Result<WatershedResult, QueryError>) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            Ok(_) => &self.completed,
            Err(QueryError::NotFound { .. }) => &self.not_found,
            Err(QueryError::TooLarge { .. }) => &self.too_large,
            Err(QueryError::Timeout { .. }) => &self.timeouts,
            Err(QueryError::Input(_)) => &self.input_errors,
            Err(QueryError::Inconsistent(_)) => &self.inconsistent,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> QueryStatsSnapshot {
        QueryStatsSnapshot {
            queries: self.queries.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            too_large: self.too_large.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            input_errors: self.input_errors.load(Ordering::Relaxed),
            inconsistent: self.inconsistent.load(Ordering::Relaxed),
            traversal_steps: self.traversal_steps.load(Ordering::Relaxed),
        }
    }
}

/// Answers watershed queries against the current snapshot.
///
/// `Sync`: share one engine between threads by reference or `Arc`.
#[derive(Debug)]
pub struct WatershedQueryEngine {
    live: Arc<LiveSnapshot>,
    config: QueryConfig,
    guard: ResourceGuard,
    stats: QueryStats,
}

impl WatershedQueryEngine {
    pub fn new(live: Arc<LiveSnapshot>, config: QueryConfig) -> Self {
        Self {
            guard: ResourceGuard::from_config(&config),
            live,
            config,
            stats: QueryStats::default(),
        }
    }

    pub fn live(&self) -> &Arc<LiveSnapshot> {
        &self.live
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn stats(&self) -> QueryStatsSnapshot {
        self.stats.snapshot()
    }

    /// Everything draining to the stream nearest (x, y).
    pub fn query(&self, x: f64, y: f64, mode: TraversalMode) -> Result<WatershedResult, QueryError> {
        let started = Instant::now();
        let mut state = QueryState::Idle;
        let outcome = self.run(x, y, mode, started, &mut state);
        if let Err(e) = &outcome {
            debug!(from = ?state, error = %e, "query rejected");
            state = QueryState::Rejected;
        }
        debug!(?state, elapsed_us = started.elapsed().as_micros() as u64, "query finished");
        self.stats.record(&outcome);
        outcome
    }

    fn run(
        &self,
        x: f64,
        y: f64,
        mode: TraversalMode,
        started: Instant,
        state: &mut QueryState,
    ) -> Result<WatershedResult, QueryError> {
        if !x.is_finite() || !y.is_finite() {
            return Err(invalid_coordinate(x, y, "coordinates must be finite"));
        }
        let radius = self.config.search_radius;
        if !(radius.is_finite() && radius >= 0.0) {
            return Err(catchflow_core::Error::InvalidParameter {
                name: "search_radius",
                value: radius.to_string(),
                reason: "must be finite and non-negative".into(),
            }
            .into());
        }

        // The Arc pins this snapshot for the whole query, whatever gets
        // published meanwhile.
        let (snapshot, generation) = self.live.load_with_generation();
        let cells = snapshot.cells();
        let graph = snapshot.graph();

        transition(state, QueryState::Locating);
        let Some(query_cell) = cells.locate(x, y) else {
            return Err(invalid_coordinate(x, y, "outside the raster extent"));
        };
        let (outlet_cell, snap_distance) =
            nearest_stream(cells, query_cell, x, y, radius).ok_or(QueryError::NotFound { x, y, radius })?;

        transition(state, QueryState::SizeChecked);
        self.guard.preflight(cells.accumulation(outlet_cell) as u64)?;
        let outlet = cells.center(outlet_cell);
        let outlet_catchment = graph
            .find_catchment_at(outlet)
            .or_else(|| cells.catchment(outlet_cell))
            .ok_or_else(|| QueryError::Inconsistent(format!("stream cell {outlet_cell} has no catchment")))?;

        transition(state, QueryState::Traversing);
        let steps = Cell::new(0u64);
        let walk = graph
            .traverse_upstream(outlet_catchment, mode)?
            .inspect(|_| steps.set(steps.get() + 1));
        let walked = self.guard.drive(walk, |id| graph.cell_count(id), started);
        self.stats.traversal_steps.fetch_add(steps.get(), Ordering::Relaxed);
        let walked = walked?;

        transition(state, QueryState::BoundaryBuilt);
        self.guard.check_deadline(started)?;
        let (agg, boundary, (main_stem_length, main_stem_slope)) = self.guard.within_budget(started, || {
            let agg = graph
                .aggregate(&walked.ids)
                .map_err(|e| QueryError::Inconsistent(e.to_string()))?;
            let boundary = watershed_outline(&agg.union, outlet, cells.cell_size() / 2.0)
                .map_err(|e| QueryError::Inconsistent(e.to_string()))?;
            let stem = main_stem(&snapshot, graph, outlet_catchment, &walked.ids)?;
            Ok((agg, boundary, stem))
        })?;

        transition(state, QueryState::Done);
        Ok(WatershedResult {
            query_point: Point::new(x, y),
            outlet,
            outlet_cell: outlet_cell as u64,
            snap_distance,
            outlet_catchment,
            catchment_ids: walked.ids,
            boundary,
            area: agg.area,
            cell_count: agg.cell_count,
            min_elevation: agg.min_elevation,
            max_elevation: agg.max_elevation,
            mean_elevation: agg.mean_elevation,
            mean_slope_percent: agg.mean_slope_percent,
            perimeter: agg.perimeter,
            stream_length: agg.stream_length,
            main_stem_length,
            main_stem_slope,
            histogram: agg.histogram,
            generation,
            elapsed: started.elapsed(),
        })
    }
}

fn invalid_coordinate(x: f64, y: f64, reason: &str) -> QueryError {
    catchflow_core::Error::InvalidCoordinate {
        x,
        y,
        reason: reason.into(),
    }
    .into()
}

/// Nearest stream cell center within `radius` of (x, y). Only the window
/// of cells the radius can reach is scanned; ties keep the lowest index.
fn nearest_stream(cells: &CellTable, around: usize, x: f64, y: f64, radius: f64) -> Option<(usize, f64)> {
    let reach = ((radius / cells.cell_size()).ceil() as usize).saturating_add(1);
    let (row, col) = (around / cells.cols(), around % cells.cols());
    let (r0, r1) = (row.saturating_sub(reach), row.saturating_add(reach).min(cells.rows() - 1));
    let (c0, c1) = (col.saturating_sub(reach), col.saturating_add(reach).min(cells.cols() - 1));

    let mut best: Option<(usize, f64)> = None;
    for r in r0..=r1 {
        for c in c0..=c1 {
            let idx = r * cells.cols() + c;
            if !cells.is_valid(idx) || !cells.is_stream(idx) {
                continue;
            }
            let p = cells.center(idx);
            let d = (p.x() - x).hypot(p.y() - y);
            if d <= radius && best.map_or(true, |(_, bd)| d < bd) {
                best = Some((idx, d));
            }
        }
    }
    best
}

/// Follow the visited upstream branch with the most contributing cells,
/// starting at the outlet catchment. Returns (length, drop per length).
fn main_stem(
    snapshot: &Snapshot,
    graph: &CatchmentGraph,
    root: u32,
    visited: &[u32],
) -> Result<(f64, f64), QueryError> {
    let segment = |id: u32| {
        snapshot
            .segment(id)
            .ok_or_else(|| QueryError::Inconsistent(format!("catchment {id} has no segment")))
    };
    let visited: HashSet<u32> = visited.iter().copied().collect();
    let outlet_elevation = segment(root)?.outlet_elevation;

    let mut length = 0.0;
    let mut cur = root;
    loop {
        length += segment(cur)?.length;
        let mut next: Option<(u32, u32)> = None;
        for &child in graph.children(cur).iter().filter(|&&c| visited.contains(&c)) {
            let cells = segment(child)?.upstream_cells;
            if next.map_or(true, |(_, best)| cells > best) {
                next = Some((child, cells));
            }
        }
        match next {
            Some((child, _)) => cur = child,
            None => break,
        }
    }

    let head_elevation = segment(cur)?.head_elevation;
    let slope = if length > 0.0 {
        ((head_elevation - outlet_elevation) / length).max(0.0)
    } else {
        0.0
    };
    Ok((length, slope))
}

#[cfg(test)]
mod tests {
    use super::*;
    use catchflow_core::{GeoTransform, InMemorySource};
    use catchflow_hydro::{PreprocessParams, StreamParams};

    fn engine(config: QueryConfig) -> WatershedQueryEngine {
        let values = (0..100).map(|i| ((i / 10) + (i % 10)) as f64).collect();
        let source = InMemorySource::new(values, 10, 10, GeoTransform::new(0.0, 100.0, 10.0, -10.0));
        let params = PreprocessParams {
            streams: StreamParams { threshold_cells: 50 },
            ..Default::default()
        };
        let live = Arc::new(LiveSnapshot::build(&source, &params).unwrap());
        WatershedQueryEngine::new(live, config)
    }

    #[test]
    fn test_outlet_query() {
        let engine = engine(QueryConfig::default());
        let result = engine.query(5.0, 95.0, TraversalMode::Full).unwrap();
        assert_eq!(result.outlet_cell, 0);
        assert_eq!(result.snap_distance, 0.0);
        assert_eq!(result.cell_count, 100);
        assert!((result.area - 10_000.0).abs() < 1e-6);
        assert_eq!(result.generation, 1);
        assert_eq!(engine.stats().completed, 1);
    }

    #[test]
    fn test_non_finite_coordinate() {
        let engine = engine(QueryConfig::default());
        let err = engine.query(f64::NAN, 0.0, TraversalMode::Full).unwrap_err();
        assert!(matches!(err, QueryError::Input(_)));
        assert_eq!(engine.stats().input_errors, 1);
    }

    #[test]
    fn test_outside_extent() {
        let engine = engine(QueryConfig::default());
        let err = engine.query(-50.0, 95.0, TraversalMode::Full).unwrap_err();
        assert!(matches!(err, QueryError::Input(_)));
    }

    #[test]
    fn test_negative_radius_rejected() {
        let engine = engine(QueryConfig {
            search_radius: -1.0,
            ..Default::default()
        });
        assert!(matches!(
            engine.query(5.0, 95.0, TraversalMode::Full),
            Err(QueryError::Input(_))
        ));
    }

    #[test]
    fn test_snap_within_radius() {
        let engine = engine(QueryConfig::default());
        let snapshot = engine.live().load();
        let cells = snapshot.cells();
        // A non-stream cell beside the outlet snaps onto a stream cell
        let result = engine.query(15.0, 85.0, TraversalMode::Full).unwrap();
        assert!(cells.is_stream(result.outlet_cell as usize));
        assert!(result.snap_distance <= engine.config().search_radius);
    }
}
