//! End-to-end watershed scenarios

mod common;

use approx::assert_relative_eq;
use catchflow_engine::{
    build_snapshot, CatchmentGraph, CatchmentRecord, LiveSnapshot, QueryConfig, QueryError, Resource, TraversalMode,
    WatershedQueryEngine,
};
use catchflow_engine::boundary::cell_square;
use catchflow_hydro::ElevationHistogram;
use common::{init_tracing, params, plane};
use geo::{Contains, MultiPolygon};
use std::sync::Arc;

fn engine(threshold: u32, config: QueryConfig) -> WatershedQueryEngine {
    init_tracing();
    let live = Arc::new(LiveSnapshot::build(&plane(), &params(threshold)).unwrap());
    WatershedQueryEngine::new(live, config)
}

#[test]
fn corner_drained_plane_is_one_catchment() {
    init_tracing();
    let snap = build_snapshot(&plane(), &params(50)).unwrap();
    assert_eq!(snap.cells().accumulation(0), 100);
    assert_eq!(snap.segments().len(), 1);
    assert_eq!(snap.catchments().len(), 1);
    assert_eq!(snap.catchments()[0].cell_count, 100);

    let engine = engine(50, QueryConfig::default());
    let result = engine.query(5.0, 95.0, TraversalMode::Full).unwrap();
    assert_eq!(result.catchment_ids, vec![0]);
    assert_eq!(result.cell_count, 100);
    assert_relative_eq!(result.area, 10_000.0, epsilon = 1e-6);
    assert_relative_eq!(result.perimeter, 400.0, epsilon = 1e-6);
    assert_eq!(result.histogram.total(), 100);
    assert!(result.hypsometric_integral() > 0.0 && result.hypsometric_integral() < 1.0);
}

#[test]
fn point_beyond_search_radius_is_not_found() {
    let engine = engine(50, QueryConfig { search_radius: 1.0, ..Default::default() });
    // South-east corner: accumulation 1, far from every stream cell
    let err = engine.query(95.0, 5.0, TraversalMode::Full).unwrap_err();
    assert!(matches!(err, QueryError::NotFound { radius, .. } if radius == 1.0));
    assert_eq!(engine.stats().not_found, 1);
}

#[test]
fn oversized_outlet_rejected_before_traversal() {
    let engine = engine(50, QueryConfig { max_cells: 99, ..Default::default() });
    match engine.query(5.0, 95.0, TraversalMode::Full) {
        Err(QueryError::TooLarge { resource, estimated, ceiling }) => {
            assert_eq!(resource, Resource::Cells);
            assert_eq!(estimated, 100);
            assert_eq!(ceiling, 99);
        }
        other => panic!("expected TooLarge, got {other:?}"),
    }
    let stats = engine.stats();
    assert_eq!(stats.too_large, 1);
    assert_eq!(stats.traversal_steps, 0);
}

#[test]
fn zero_budget_times_out() {
    let engine = engine(50, QueryConfig { timeout_ms: 0, ..Default::default() });
    let err = engine.query(5.0, 95.0, TraversalMode::Full).unwrap_err();
    assert!(matches!(err, QueryError::Timeout { .. }));
    assert_eq!(engine.stats().timeouts, 1);
}

fn record(id: u32, parent: Option<u32>) -> CatchmentRecord {
    CatchmentRecord {
        id,
        geometry: MultiPolygon::new(vec![cell_square(id as f64 + 0.5, 0.5, 1.0)]),
        segment_id: id,
        threshold_used: 1,
        area: 1.0,
        cell_count: 1,
        mean_elevation: id as f64,
        min_elevation: id as f64,
        max_elevation: id as f64,
        mean_slope_percent: 0.0,
        perimeter: 4.0,
        stream_length: 1.0,
        downstream_segment_id: parent,
        elevation_histogram: ElevationHistogram::from_values([id as f64], 1.0).unwrap(),
    }
}

#[test]
fn to_first_confluence_stops_at_two_branches() {
    // 3 -> 2 -> 1 -> 0 chain with a second branch 4 -> 1
    let graph = CatchmentGraph::from_records(&[
        record(0, None),
        record(1, Some(0)),
        record(2, Some(1)),
        record(3, Some(2)),
        record(4, Some(1)),
    ])
    .unwrap();

    let from_fork: Vec<u32> = graph.traverse_upstream(1, TraversalMode::ToFirstConfluence).unwrap().collect();
    assert_eq!(from_fork, vec![1]);

    let from_outlet: Vec<u32> = graph.traverse_upstream(0, TraversalMode::ToFirstConfluence).unwrap().collect();
    assert_eq!(from_outlet, vec![0, 1]);

    let full: Vec<u32> = graph.traverse_upstream(1, TraversalMode::Full).unwrap().collect();
    assert_eq!(full, vec![1, 2, 4, 3]);
}

#[test]
fn traversal_area_matches_aggregate_and_is_idempotent() {
    let snap = build_snapshot(&plane(), &params(10)).unwrap();
    let graph = snap.graph();
    assert!(graph.len() > 1);
    for id in 0..graph.len() as u32 {
        let ids: Vec<u32> = graph.traverse_upstream(id, TraversalMode::Full).unwrap().collect();
        let again: Vec<u32> = graph.traverse_upstream(id, TraversalMode::Full).unwrap().collect();
        assert_eq!(ids, again);
        let summed: f64 = ids.iter().map(|&i| graph.area(i)).sum();
        let agg = graph.aggregate(&ids).unwrap();
        assert_relative_eq!(summed, agg.area, epsilon = 1e-6);
    }
    let roots: Vec<u32> = graph.roots().collect();
    let total: f64 = roots
        .iter()
        .map(|&r| graph.aggregate(&graph.traverse_upstream(r, TraversalMode::Full).unwrap().collect::<Vec<_>>()).unwrap().area)
        .sum();
    assert_relative_eq!(total, 10_000.0, epsilon = 1e-6);
}

#[test]
fn boundary_contains_outlet_for_every_stream_cell() {
    let engine = engine(10, QueryConfig::default());
    let snap = engine.live().load();
    let cells = snap.cells();
    let mut queried = 0;
    for idx in (0..cells.len()).filter(|&i| cells.is_stream(i)) {
        let p = cells.center(idx);
        for mode in [TraversalMode::Full, TraversalMode::ToFirstConfluence] {
            let result = engine.query(p.x(), p.y(), mode).unwrap();
            assert_eq!(result.outlet_cell, idx as u64);
            assert!(result.boundary.contains(&result.outlet));
            if mode == TraversalMode::Full {
                assert!(result.cell_count >= cells.accumulation(idx) as u64);
            }
            queried += 1;
        }
    }
    assert!(queried > 0);
    assert_eq!(engine.stats().completed, queried);
}
