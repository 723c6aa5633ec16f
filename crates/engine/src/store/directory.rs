//! Directory-backed store
//!
//! ```text
//! <root>/manifest.json
//! <root>/cells.bin         header + fixed-width little-endian records
//! <root>/segments.json
//! <root>/catchments.json
//! ```
//!
//! `cells.bin` header: magic `CFCELLS\0`, format version (u32), record
//! count (u64). The count is patched in when the writer finishes, so a
//! table whose writer never finished reads back as empty.

use super::records::{CatchmentRecord, CellRecord, Manifest, SegmentRecord, FORMAT_VERSION};
use super::{CellWriter, GraphStore};
use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 8] = b"CFCELLS\0";
const COUNT_OFFSET: u64 = 12;
const NONE_U64: u64 = u64::MAX;
const NONE_U32: u32 = u32::MAX;

/// Snapshot store rooted at a directory
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Open (creating if needed) a store at `root`.
    pub fn create(root: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(root.as_ref())?;
        Ok(Self { root: root.as_ref().to_path_buf() })
    }

    /// Open an existing store; fails if the directory is missing.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::Store(format!("{} is not a directory", root.display())));
        }
        Ok(Self { root: root.to_path_buf() })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let mut writer = BufWriter::new(File::create(self.path(name))?);
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let reader = BufReader::new(File::open(self.path(name))?);
        Ok(serde_json::from_reader(reader)?)
    }
}

impl GraphStore for DirectoryStore {
    type Writer = BinaryCellWriter<File>;

    fn put_manifest(&self, manifest: &Manifest) -> Result<()> {
        self.write_json("manifest.json", manifest)
    }

    fn manifest(&self) -> Result<Manifest> {
        let manifest: Manifest = self.read_json("manifest.json")?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(Error::Store(format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                manifest.format_version
            )));
        }
        Ok(manifest)
    }

    fn cell_writer(&self) -> Result<Self::Writer> {
        BinaryCellWriter::new(File::create(self.path("cells.bin"))?)
    }

    fn cells(&self) -> Result<Vec<CellRecord>> {
        read_cells(BufReader::new(File::open(self.path("cells.bin"))?))
    }

    fn put_segments(&self, segments: &[SegmentRecord]) -> Result<()> {
        self.write_json("segments.json", segments)
    }

    fn segments(&self) -> Result<Vec<SegmentRecord>> {
        self.read_json("segments.json")
    }

    fn put_catchments(&self, catchments: &[CatchmentRecord]) -> Result<()> {
        self.write_json("catchments.json", catchments)
    }

    fn catchments(&self) -> Result<Vec<CatchmentRecord>> {
        self.read_json("catchments.json")
    }
}

/// Buffered append-only writer for `cells.bin`
pub struct BinaryCellWriter<W: Write + Seek> {
    inner: BufWriter<W>,
    count: u64,
}

impl<W: Write + Seek> BinaryCellWriter<W> {
    pub fn new(sink: W) -> Result<Self> {
        let mut inner = BufWriter::with_capacity(1 << 20, sink);
        inner.write_all(MAGIC)?;
        inner.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        inner.write_u64::<LittleEndian>(0)?;
        Ok(Self { inner, count: 0 })
    }
}

impl<W: Write + Seek> CellWriter for BinaryCellWriter<W> {
    fn append(&mut self, r: &CellRecord) -> Result<()> {
        let w = &mut self.inner;
        w.write_u64::<LittleEndian>(r.id)?;
        w.write_f64::<LittleEndian>(r.x)?;
        w.write_f64::<LittleEndian>(r.y)?;
        w.write_f64::<LittleEndian>(r.elevation)?;
        w.write_u32::<LittleEndian>(r.accumulation)?;
        w.write_f64::<LittleEndian>(r.slope_percent)?;
        w.write_u64::<LittleEndian>(r.downstream_id.unwrap_or(NONE_U64))?;
        w.write_f64::<LittleEndian>(r.cell_area)?;
        w.write_u8(r.is_stream as u8)?;
        w.write_u8(r.strahler_order.unwrap_or(0))?;
        w.write_u32::<LittleEndian>(r.catchment_id.unwrap_or(NONE_U32))?;
        self.count += 1;
        Ok(())
    }

    fn finish(mut self) -> Result<u64> {
        self.inner.seek(SeekFrom::Start(COUNT_OFFSET))?;
        self.inner.write_u64::<LittleEndian>(self.count)?;
        self.inner.flush()?;
        Ok(self.count)
    }
}

fn read_cells<R: Read>(mut reader: R) -> Result<Vec<CellRecord>> {
    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(Error::Store("cells.bin has wrong magic".into()));
    }
    let version = reader.read_u32::<LittleEndian>()?;
    if version != FORMAT_VERSION {
        return Err(Error::Store(format!("cells.bin version {version} unsupported")));
    }
    let count = reader.read_u64::<LittleEndian>()?;

    let mut cells = Vec::with_capacity(count.min(1 << 24) as usize);
    for _ in 0..count {
        let id = reader.read_u64::<LittleEndian>()?;
        let x = reader.read_f64::<LittleEndian>()?;
        let y = reader.read_f64::<LittleEndian>()?;
        let elevation = reader.read_f64::<LittleEndian>()?;
        let accumulation = reader.read_u32::<LittleEndian>()?;
        let slope_percent = reader.read_f64::<LittleEndian>()?;
        let downstream = reader.read_u64::<LittleEndian>()?;
        let cell_area = reader.read_f64::<LittleEndian>()?;
        let is_stream = reader.read_u8()? != 0;
        let order = reader.read_u8()?;
        let catchment = reader.read_u32::<LittleEndian>()?;
        cells.push(CellRecord {
            id,
            x,
            y,
            elevation,
            accumulation,
            slope_percent,
            downstream_id: (downstream != NONE_U64).then_some(downstream),
            cell_area,
            is_stream,
            strahler_order: (order != 0).then_some(order),
            catchment_id: (catchment != NONE_U32).then_some(catchment),
        });
    }
    Ok(cells)
}
