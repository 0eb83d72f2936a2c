//! SparseLongStore - per-record i64 values with partial-file writes
//!
//! Holds one `i64` per record id (the record timestamp in practice). Unused
//! slots hold [`UNUSED`]. The backing file is the raw big-endian array with
//! no header:
//!
//! ```text
//! offset 8*n : i64 value of record n
//! ```
//!
//! Changes are tracked per save block (4 KB of values by default) so a store
//! only rewrites the blocks that changed, merged into contiguous ranges.

use crate::storage::bitmap::SparseBitmap;
use crate::storage::codec::{ByteReader, ByteWriter};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::names::name_to_filename;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Value of a slot that was never set
pub const UNUSED: i64 = i64::MIN;

/// Extra slots allocated past a required index
pub const DEFAULT_GROWTH_RATE: usize = 1000;

/// Default size of a partial-write block
pub const DEFAULT_SAVE_BLOCK_KB: usize = 4;

const VALUE_BYTES: usize = std::mem::size_of::<i64>();

/// Set of save blocks changed since the last successful store
#[derive(Debug, Clone)]
pub struct DirtyBlocks {
    block_len: usize,
    blocks: BTreeSet<usize>,
}

impl DirtyBlocks {
    /// Track blocks of `block_len` values each
    pub fn new(block_len: usize) -> Self {
        Self {
            block_len: block_len.max(1),
            blocks: BTreeSet::new(),
        }
    }

    pub fn mark(&mut self, index: usize) {
        self.blocks.insert(index / self.block_len);
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    /// Index ranges covering the dirty blocks, adjacent blocks merged and
    /// everything clipped to `len`
    pub fn ranges(&self, len: usize) -> Vec<Range<usize>> {
        let mut out: Vec<Range<usize>> = Vec::new();
        for &block in &self.blocks {
            let start = block * self.block_len;
            if start >= len {
                break;
            }
            let end = (start + self.block_len).min(len);
            match out.last_mut() {
                Some(last) if last.end == start => last.end = end,
                _ => out.push(start..end),
            }
        }
        out
    }
}

/// Merge sorted-or-not ranges that overlap or touch
fn merge_ranges(mut ranges: Vec<Range<usize>>) -> Vec<Range<usize>> {
    ranges.sort_by_key(|r| r.start);
    let mut out: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match out.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => out.push(range),
        }
    }
    out
}

/// Growable array of i64 values with dirty-tracked persistence
#[derive(Debug, Clone)]
pub struct SparseLongStore {
    name: String,
    file: Option<PathBuf>,
    values: Vec<i64>,
    growth_rate: usize,
    dirty: bool,
    dirty_blocks: DirtyBlocks,
}

impl Default for SparseLongStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseLongStore {
    /// Create an empty, unnamed, memory-only store
    pub fn new() -> Self {
        Self::with_len("", 0)
    }

    /// Create a memory-only store with `len` unused slots
    pub fn with_len(name: impl Into<String>, len: usize) -> Self {
        Self {
            name: name.into(),
            file: None,
            values: vec![UNUSED; len],
            growth_rate: DEFAULT_GROWTH_RATE,
            dirty: false,
            dirty_blocks: DirtyBlocks::new(DEFAULT_SAVE_BLOCK_KB * 1024 / VALUE_BYTES),
        }
    }

    /// Open the store persisted for `name` in `dir`
    ///
    /// A missing file yields an empty store.
    pub fn open(name: impl Into<String>, dir: &Path) -> StorageResult<Self> {
        let mut store = Self::with_len(name, 0);
        store.file = Some(dir.join(name_to_filename(&store.name)));
        store.load()?;
        Ok(store)
    }

    /// Change the partial-write block size (0 means default)
    pub fn with_save_block_kb(mut self, kb: usize) -> Self {
        let kb = if kb == 0 { DEFAULT_SAVE_BLOCK_KB } else { kb };
        self.dirty_blocks = DirtyBlocks::new(kb * 1024 / VALUE_BYTES);
        self
    }

    /// Change how many slots are added past a required index (0 means default)
    pub fn set_growth_rate(&mut self, rate: usize) {
        self.growth_rate = if rate == 0 { DEFAULT_GROWTH_RATE } else { rate };
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Number of allocated slots (set or not)
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Value at `index`, or [`UNUSED`]
    pub fn get(&self, index: u32) -> i64 {
        self.values.get(index as usize).copied().unwrap_or(UNUSED)
    }

    pub fn is_set(&self, index: u32) -> bool {
        self.get(index) != UNUSED
    }

    pub fn set(&mut self, index: u32, value: i64) {
        let index = index as usize;
        if index >= self.values.len() {
            self.values.resize(index + self.growth_rate, UNUSED);
        }
        if self.values[index] != value {
            self.values[index] = value;
            self.dirty_blocks.mark(index);
            self.dirty = true;
        }
    }

    /// Reset slots to [`UNUSED`]; out-of-range indices are ignored
    pub fn unset(&mut self, indices: &[u32]) {
        for &index in indices {
            let index = index as usize;
            if let Some(slot) = self.values.get_mut(index) {
                if *slot != UNUSED {
                    *slot = UNUSED;
                    self.dirty_blocks.mark(index);
                    self.dirty = true;
                }
            }
        }
    }

    /// First unused index, or the length when every slot is in use
    pub fn first_unset_index(&self) -> u32 {
        self.values
            .iter()
            .position(|&v| v == UNUSED)
            .unwrap_or(self.values.len()) as u32
    }

    /// Ids whose value lies in `min..=max`
    pub fn as_bitmap(&self, min: i64, max: i64) -> SparseBitmap {
        let mut bits = SparseBitmap::new();
        for (index, &value) in self.values.iter().enumerate() {
            if value != UNUSED && value >= min && value <= max {
                bits.set(index as u32, true);
            }
        }
        bits
    }

    /// Ids that have any value
    pub fn all_set(&self) -> SparseBitmap {
        self.as_bitmap(i64::MIN, i64::MAX)
    }

    /// Drop every value and delete the backing file
    pub fn clear(&mut self) -> StorageResult<()> {
        self.values.clear();
        self.dirty_blocks.clear();
        self.dirty = true;
        if let Some(path) = &self.file {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Index ranges the next store will write, before file extension
    pub fn index_ranges_to_store(&self) -> Vec<Range<usize>> {
        self.dirty_blocks.ranges(self.values.len())
    }

    /// Write changed blocks to the backing file
    pub fn store(&mut self) -> StorageResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let path = match &self.file {
            Some(path) if !self.name.is_empty() => path.clone(),
            _ => {
                return Err(StorageError::InvalidName(
                    "a value store needs a name and directory to be stored".to_string(),
                ))
            }
        };

        let mut file = OpenOptions::new().write(true).create(true).open(&path)?;
        let stored = file.metadata()?.len() as usize / VALUE_BYTES;
        let len = self.values.len();

        let mut ranges = self.index_ranges_to_store();
        if stored < len {
            // Slots past the old end of file were never written
            ranges.push(stored..len);
        }
        let ranges = merge_ranges(ranges);

        for range in &ranges {
            let mut out = ByteWriter::with_capacity(range.len() * VALUE_BYTES);
            for &value in &self.values[range.clone()] {
                out.write_i64(value);
            }
            file.seek(SeekFrom::Start((range.start * VALUE_BYTES) as u64))?;
            file.write_all(out.as_slice())?;
        }

        let size = (len * VALUE_BYTES) as u64;
        if file.metadata()?.len() != size {
            file.set_len(size)?;
        }
        file.sync_data()?;

        self.dirty = false;
        self.dirty_blocks.clear();
        tracing::debug!(
            store = %self.name,
            ranges = ranges.len(),
            values = len,
            "Stored values"
        );
        Ok(())
    }

    /// Replace the in-memory values with the content of the backing file
    pub fn load(&mut self) -> StorageResult<()> {
        let Some(path) = &self.file else {
            return Ok(());
        };
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        if data.len() % VALUE_BYTES != 0 {
            tracing::warn!(
                store = %self.name,
                "Ignoring {} trailing bytes",
                data.len() % VALUE_BYTES
            );
        }

        let count = data.len() / VALUE_BYTES;
        let mut reader = ByteReader::new(&data);
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(reader.read_i64()?);
        }

        self.values = values;
        self.dirty = false;
        self.dirty_blocks.clear();
        tracing::debug!(store = %self.name, values = count, "Loaded values");
        Ok(())
    }
}
