//! Immutable snapshots and their atomic publication
//!
//! A [`Snapshot`] is validated once on construction and never changes
//! afterwards. [`LiveSnapshot`] holds the current one behind an `Arc`:
//! readers clone the `Arc` and work lock-free from then on, while a refresh
//! builds a complete replacement off to the side and swaps it in. A failed
//! build leaves the previous snapshot serving.

use crate::boundary::perimeter;
use crate::catchment_graph::CatchmentGraph;
use crate::error::{Error, Result};
use crate::pipeline::build_snapshot;
use crate::store::{CatchmentRecord, CellRecord, CellWriter, GraphStore, Manifest, SegmentRecord, FORMAT_VERSION};
use catchflow_core::{GeoTransform, RasterSource};
use catchflow_hydro::{flow_accumulation, DrainageModel, FlowGraph, PreprocessParams, NO_DOWNSTREAM, NO_LABEL};
use geo::Point;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Column-oriented per-cell table indexed by flat cell id.
///
/// Invalid cells carry `NaN` elevation, zero accumulation and no labels.
#[derive(Debug, Clone)]
pub struct CellTable {
    rows: usize,
    cols: usize,
    transform: GeoTransform,
    valid: Vec<bool>,
    elevation: Vec<f64>,
    accumulation: Vec<u32>,
    slope: Vec<f64>,
    downstream: Vec<u32>,
    /// 0 off-stream
    strahler: Vec<u8>,
    catchment: Vec<u32>,
}

impl CellTable {
    fn from_model(model: &DrainageModel) -> Self {
        let n = model.graph.len();
        Self {
            rows: model.graph.rows(),
            cols: model.graph.cols(),
            transform: *model.routing.filled.transform(),
            valid: model.graph.valid_mask().to_vec(),
            elevation: model.routing.filled.to_flat_vec(),
            accumulation: model.accumulation.counts.clone(),
            slope: model.slope.to_flat_vec(),
            downstream: model.graph.downstream_ids().to_vec(),
            strahler: (0..n).map(|i| model.network.order(i).unwrap_or(0)).collect(),
            catchment: model.labels.clone(),
        }
    }

    fn from_records(manifest: &Manifest, records: &[CellRecord]) -> Result<Self> {
        let n = manifest.rows * manifest.cols;
        let mut table = Self {
            rows: manifest.rows,
            cols: manifest.cols,
            transform: manifest.transform,
            valid: vec![false; n],
            elevation: vec![f64::NAN; n],
            accumulation: vec![0; n],
            slope: vec![f64::NAN; n],
            downstream: vec![NO_DOWNSTREAM; n],
            strahler: vec![0; n],
            catchment: vec![NO_LABEL; n],
        };
        for r in records {
            let idx = r.id as usize;
            if idx >= n || table.valid[idx] {
                return Err(Error::inconsistent(format!("cell record {} out of range or duplicated", r.id)));
            }
            let downstream = match r.downstream_id {
                Some(d) if d < n as u64 => d as u32,
                Some(d) => return Err(Error::inconsistent(format!("cell {} drains to missing cell {d}", r.id))),
                None => NO_DOWNSTREAM,
            };
            table.valid[idx] = true;
            table.elevation[idx] = r.elevation;
            table.accumulation[idx] = r.accumulation;
            table.slope[idx] = r.slope_percent;
            table.downstream[idx] = downstream;
            table.strahler[idx] = r.strahler_order.unwrap_or(0);
            table.catchment[idx] = r.catchment_id.unwrap_or(NO_LABEL);
        }
        Ok(table)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.valid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valid.is_empty()
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    pub fn is_valid(&self, idx: usize) -> bool {
        self.valid[idx]
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    pub fn is_stream(&self, idx: usize) -> bool {
        self.strahler[idx] > 0
    }

    pub fn accumulation(&self, idx: usize) -> u32 {
        self.accumulation[idx]
    }

    pub fn elevation(&self, idx: usize) -> f64 {
        self.elevation[idx]
    }

    pub fn downstream(&self, idx: usize) -> Option<usize> {
        let d = self.downstream[idx];
        (d != NO_DOWNSTREAM).then_some(d as usize)
    }

    pub fn catchment(&self, idx: usize) -> Option<u32> {
        let c = self.catchment[idx];
        (c != NO_LABEL).then_some(c)
    }

    pub fn center(&self, idx: usize) -> Point<f64> {
        let (x, y) = self.transform.pixel_to_geo(idx % self.cols, idx / self.cols);
        Point::new(x, y)
    }

    /// Flat index of the cell containing (x, y)
    pub fn locate(&self, x: f64, y: f64) -> Option<usize> {
        let (col, row) = self.transform.geo_to_pixel(x, y);
        if !(col >= 0.0 && row >= 0.0) {
            return None;
        }
        let (row, col) = (row.floor() as usize, col.floor() as usize);
        (row < self.rows && col < self.cols).then_some(row * self.cols + col)
    }

    pub fn record(&self, idx: usize) -> CellRecord {
        let center = self.center(idx);
        let order = self.strahler[idx];
        CellRecord {
            id: idx as u64,
            x: center.x(),
            y: center.y(),
            elevation: self.elevation[idx],
            accumulation: self.accumulation[idx],
            slope_percent: self.slope[idx],
            downstream_id: self.downstream(idx).map(|d| d as u64),
            cell_area: self.transform.cell_area(),
            is_stream: order > 0,
            strahler_order: (order > 0).then_some(order),
            catchment_id: self.catchment(idx),
        }
    }

    /// Records for every valid cell, in flat index order
    pub fn records(&self) -> impl Iterator<Item = CellRecord> + '_ {
        (0..self.len()).filter(|&i| self.valid[i]).map(|i| self.record(i))
    }
}

/// One published preprocessing result
#[derive(Debug, Clone)]
pub struct Snapshot {
    manifest: Manifest,
    cells: CellTable,
    segments: Vec<SegmentRecord>,
    catchments: Vec<CatchmentRecord>,
    graph: CatchmentGraph,
}

impl Snapshot {
    fn new(
        manifest: Manifest,
        cells: CellTable,
        segments: Vec<SegmentRecord>,
        catchments: Vec<CatchmentRecord>,
    ) -> Result<Self> {
        let graph = CatchmentGraph::from_records(&catchments)?;
        let snapshot = Self {
            manifest,
            cells,
            segments,
            catchments,
            graph,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Convert a finished drainage model into records.
    pub fn from_model(model: &DrainageModel) -> Result<Self> {
        let transform = *model.routing.filled.transform();
        let cell_area = transform.cell_area();
        let threshold = model.network.threshold;

        let segments: Vec<SegmentRecord> = model
            .streams
            .segments
            .iter()
            .map(|s| SegmentRecord {
                id: s.id,
                geometry: s.geometry.clone(),
                strahler_order: s.strahler_order,
                length: s.length,
                upstream_area: s.upstream_area,
                upstream_cells: s.upstream_cells,
                mean_slope_percent: s.mean_slope_percent,
                threshold_used: threshold,
                source_tag: s.source_tag.clone(),
                head_cell: s.head_cell() as u64,
                outlet_cell: s.outlet_cell() as u64,
                head_elevation: s.head_elevation,
                outlet_elevation: s.outlet_elevation,
                downstream_segment_id: s.downstream,
                upstream_segment_ids: s.upstream.clone(),
            })
            .collect();

        let catchments: Vec<CatchmentRecord> = model
            .catchments
            .iter()
            .zip(&model.polygons)
            .zip(&model.streams.segments)
            .map(|((stats, polygon), segment)| CatchmentRecord {
                id: stats.segment_id,
                geometry: polygon.clone(),
                segment_id: segment.id,
                threshold_used: threshold,
                area: stats.cell_count as f64 * cell_area,
                cell_count: stats.cell_count,
                mean_elevation: stats.mean_elevation,
                min_elevation: stats.min_elevation,
                max_elevation: stats.max_elevation,
                mean_slope_percent: stats.mean_slope_percent,
                perimeter: perimeter(polygon),
                stream_length: segment.length,
                downstream_segment_id: segment.downstream,
                elevation_histogram: stats.histogram.clone(),
            })
            .collect();

        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            rows: model.graph.rows(),
            cols: model.graph.cols(),
            transform,
            crs: model.crs.clone(),
            threshold_cells: threshold,
            cell_count: model.graph.valid_count() as u64,
            segment_count: segments.len(),
            catchment_count: catchments.len(),
        };

        Self::new(manifest, CellTable::from_model(model), segments, catchments)
    }

    /// Check every cross-record invariant.
    ///
    /// Runs on construction and import; a failure means the snapshot must
    /// not be published.
    pub fn validate(&self) -> Result<()> {
        let m = &self.manifest;
        if self.cells.len() != m.rows * m.cols {
            return Err(Error::inconsistent("cell table shape disagrees with manifest"));
        }
        if self.cells.valid_count() as u64 != m.cell_count
            || self.segments.len() != m.segment_count
            || self.catchments.len() != m.catchment_count
        {
            return Err(Error::inconsistent("record counts disagree with manifest"));
        }
        if self.segments.len() != self.catchments.len() {
            return Err(Error::inconsistent(format!(
                "{} segments but {} catchments",
                self.segments.len(),
                self.catchments.len()
            )));
        }

        for (i, (s, c)) in self.segments.iter().zip(&self.catchments).enumerate() {
            if s.id as usize != i || c.segment_id != s.id {
                return Err(Error::inconsistent(format!("segment/catchment {i} ids out of step")));
            }
            if s.downstream_segment_id != c.downstream_segment_id {
                return Err(Error::inconsistent(format!("segment {i} and its catchment drain differently")));
            }
            let outlet = s.outlet_cell as usize;
            if outlet >= self.cells.len() || self.cells.catchment(outlet) != Some(s.id) {
                return Err(Error::inconsistent(format!("segment {i} outlet cell is not labelled with it")));
            }
        }

        // Rebuilding the flow graph re-checks adjacency and acyclicity
        let graph = FlowGraph::from_downstream(
            self.cells.rows,
            self.cells.cols,
            self.cells.downstream.clone(),
            self.cells.valid.clone(),
        )?;
        let recomputed = flow_accumulation(&graph)?;
        if let Some(idx) = (0..self.cells.len()).find(|&i| self.cells.valid[i] && recomputed.at(i) != self.cells.accumulation[i]) {
            return Err(Error::inconsistent(format!(
                "cell {idx}: stored accumulation {} but {} cells drain through it",
                self.cells.accumulation[idx],
                recomputed.at(idx)
            )));
        }
        Ok(())
    }

    /// Write every record to `store`. The manifest goes last, so a store
    /// interrupted mid-export has no readable manifest.
    pub fn export<S: GraphStore>(&self, store: &S) -> Result<()> {
        let mut writer = store.cell_writer()?;
        for record in self.cells.records() {
            writer.append(&record)?;
        }
        let written = writer.finish()?;
        if written != self.manifest.cell_count {
            return Err(Error::Store(format!(
                "wrote {written} cell records, expected {}",
                self.manifest.cell_count
            )));
        }
        store.put_segments(&self.segments)?;
        store.put_catchments(&self.catchments)?;
        store.put_manifest(&self.manifest)?;
        info!(cells = written, catchments = self.catchments.len(), "snapshot exported");
        Ok(())
    }

    /// Read and validate a snapshot from `store`.
    pub fn import<S: GraphStore>(store: &S) -> Result<Self> {
        let manifest = store.manifest()?;
        let records = store.cells()?;
        let cells = CellTable::from_records(&manifest, &records)?;
        let snapshot = Self::new(manifest, cells, store.segments()?, store.catchments()?)?;
        info!(
            cells = snapshot.manifest.cell_count,
            catchments = snapshot.catchments.len(),
            "snapshot imported"
        );
        Ok(snapshot)
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn cells(&self) -> &CellTable {
        &self.cells
    }

    pub fn segments(&self) -> &[SegmentRecord] {
        &self.segments
    }

    pub fn segment(&self, id: u32) -> Option<&SegmentRecord> {
        self.segments.get(id as usize)
    }

    pub fn catchments(&self) -> &[CatchmentRecord] {
        &self.catchments
    }

    pub fn graph(&self) -> &CatchmentGraph {
        &self.graph
    }
}

/// The currently published snapshot
///
/// Readers are not entirely lock-free: [`load`](Self::load) takes the
/// `RwLock` in read mode only long enough to clone the `Arc`, and releases
/// it before returning. Everything done with the returned snapshot runs
/// without locks, and a writer waits at most for those clones to finish.
#[derive(Debug)]
pub struct LiveSnapshot {
    current: RwLock<Arc<Snapshot>>,
    generation: AtomicU64,
}

impl LiveSnapshot {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            generation: AtomicU64::new(1),
        }
    }

    /// Preprocess `source` and publish the result as generation 1.
    pub fn build<S: RasterSource + ?Sized>(source: &S, params: &PreprocessParams) -> Result<Self> {
        Ok(Self::new(build_snapshot(source, params)?))
    }

    /// The current snapshot. Holding the `Arc` keeps it alive across a swap.
    pub fn load(&self) -> Arc<Snapshot> {
        let guard = self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// The current snapshot and the generation it was published as
    pub fn load_with_generation(&self) -> (Arc<Snapshot>, u64) {
        let guard = self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        (Arc::clone(&guard), self.generation.load(Ordering::Acquire))
    }

    /// Swap in `snapshot`; returns its generation.
    pub fn publish(&self, snapshot: Snapshot) -> u64 {
        let next = Arc::new(snapshot);
        let mut guard = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = next;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        drop(guard);
        info!(generation, "snapshot published");
        generation
    }

    /// Rebuild from `source` and publish. On failure the current snapshot
    /// keeps serving and the error is returned.
    pub fn refresh<S: RasterSource + ?Sized>(&self, source: &S, params: &PreprocessParams) -> Result<u64> {
        match build_snapshot(source, params) {
            Ok(snapshot) => Ok(self.publish(snapshot)),
            Err(e) => {
                warn!(error = %e, generation = self.generation(), "rebuild failed; keeping current snapshot");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catchflow_core::InMemorySource;
    use catchflow_hydro::StreamParams;

    fn params(threshold: u32) -> PreprocessParams {
        PreprocessParams {
            streams: StreamParams { threshold_cells: threshold },
            ..Default::default()
        }
    }

    fn plane() -> InMemorySource {
        let values = (0..100).map(|i| ((i / 10) + (i % 10)) as f64).collect();
        InMemorySource::new(values, 10, 10, GeoTransform::new(0.0, 100.0, 10.0, -10.0))
    }

    #[test]
    fn test_from_model_fields() {
        let snap = build_snapshot(&plane(), &params(50)).unwrap();
        assert_eq!(snap.manifest().cell_count, 100);
        assert_eq!(snap.segments().len(), 1);
        let c = &snap.catchments()[0];
        assert_eq!(c.cell_count, 100);
        assert!((c.area - 10_000.0).abs() < 1e-9);
        assert!((c.perimeter - 400.0).abs() < 1e-9);
        assert_eq!(c.downstream_segment_id, None);
        assert_eq!(snap.cells().accumulation(0), 100);
        assert_eq!(snap.cells().record(0).downstream_id, None);
        assert_eq!(snap.cells().record(11).downstream_id, Some(0));
    }

    #[test]
    fn test_tampered_accumulation_fails_validation() {
        let mut snap = build_snapshot(&plane(), &params(50)).unwrap();
        snap.cells.accumulation[0] = 99;
        assert!(snap.validate().is_err());
    }

    #[test]
    fn test_publish_bumps_generation() {
        let live = LiveSnapshot::build(&plane(), &params(50)).unwrap();
        assert_eq!(live.generation(), 1);
        let old = live.load();
        let generation = live.publish(build_snapshot(&plane(), &params(10)).unwrap());
        assert_eq!(generation, 2);
        assert_eq!(old.segments().len(), 1);
        assert!(live.load().segments().len() > 1);
    }

    #[test]
    fn test_failed_refresh_keeps_snapshot() {
        let live = LiveSnapshot::build(&plane(), &params(50)).unwrap();
        let broken = InMemorySource::new(vec![1.0; 3], 2, 2, GeoTransform::new(0.0, 0.0, 1.0, -1.0));
        assert!(live.refresh(&broken, &params(50)).is_err());
        assert_eq!(live.generation(), 1);
        assert_eq!(live.load().manifest().cell_count, 100);
    }

    #[test]
    fn test_held_snapshot_does_not_block_publish() {
        let live = LiveSnapshot::build(&plane(), &params(50)).unwrap();
        let held = live.load();
        let replacement = build_snapshot(&plane(), &params(10)).unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let writer = &live;
        std::thread::scope(|s| {
            s.spawn(move || {
                let _ = tx.send(writer.publish(replacement));
            });
            let generation = rx.recv_timeout(std::time::Duration::from_secs(10)).unwrap();
            assert_eq!(generation, 2);
        });

        assert_eq!(held.segments().len(), 1);
        assert!(live.load().segments().len() > 1);
    }
}
