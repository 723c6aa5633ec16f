//! Persistent graph store
//!
//! Snapshots are exported as four artefacts: a manifest, the per-cell table,
//! stream segments and catchments. Cells are written through an append-only
//! [`CellWriter`] in a single buffered pass; per-row inserts are far too slow
//! at millions of records.

mod directory;
mod records;

pub use directory::{BinaryCellWriter, DirectoryStore};
pub use records::{CatchmentRecord, CellRecord, Manifest, SegmentRecord, FORMAT_VERSION};

use crate::error::Result;

/// Append-only sink for cell records
pub trait CellWriter {
    fn append(&mut self, record: &CellRecord) -> Result<()>;

    /// Flush and seal the table; returns the number of records written.
    fn finish(self) -> Result<u64>;
}

/// Where snapshots are persisted
pub trait GraphStore {
    type Writer: CellWriter;

    fn put_manifest(&self, manifest: &Manifest) -> Result<()>;
    fn manifest(&self) -> Result<Manifest>;

    /// Start a fresh cell table, replacing any previous one
    fn cell_writer(&self) -> Result<Self::Writer>;
    fn cells(&self) -> Result<Vec<CellRecord>>;

    fn put_segments(&self, segments: &[SegmentRecord]) -> Result<()>;
    fn segments(&self) -> Result<Vec<SegmentRecord>>;

    fn put_catchments(&self, catchments: &[CatchmentRecord]) -> Result<()>;
    fn catchments(&self) -> Result<Vec<CatchmentRecord>>;
}
