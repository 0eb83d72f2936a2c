//! SparseBitmap - growable sparse set of record ids
//!
//! Three tiers: the bitmap holds optional pages, a page holds optional
//! vectors, a vector holds 8192 bits. Only pages that contain bits exist,
//! so a label touching ids 3 and 40,000,000 costs two small vectors.
//!
//! ```text
//! id ──► page  = id / PAGE_BITS
//!        bit   = id % PAGE_BITS ──► vector = bit / VECTOR_BITS
//!                                  bit    = bit % VECTOR_BITS
//! ```
//!
//! # Persistence
//!
//! A named bitmap rooted in a directory stores one file per page plus a small
//! header used to validate the pages on load:
//!
//! ```text
//! <dir>/Bits     u32 set_bit_count, u16 page_array_length, string name
//! <dir>/<n>      page n (see `page.rs` for the layout)
//! ```
//!
//! Only dirty pages are rewritten. Page files whose page disappeared are
//! deleted on the next store.

use crate::storage::codec::{ByteReader, ByteWriter};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::names::name_to_filename;
use crate::storage::page::{BitVectorPage, PAGE_BITS};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Name of the header file inside a bitmap directory
pub const HEADER_FILE: &str = "Bits";

/// Number of page slots added whenever the page array must grow
const PAGE_GROWTH: usize = 10;

#[inline]
fn split(index: u32) -> (usize, usize) {
    let index = index as usize;
    (index / PAGE_BITS, index % PAGE_BITS)
}

/// Sparse bit set with set algebra and page-level persistence
pub struct SparseBitmap {
    name: String,
    dir: Option<PathBuf>,
    pages: Vec<Option<BitVectorPage>>,
    /// Highest index ever set; nothing beyond it is set
    max_index: Option<u32>,
    valid: bool,
    /// A page slot was emptied since the last store
    structure_dirty: bool,
}

impl Default for SparseBitmap {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseBitmap {
    /// Create an unnamed, memory-only bitmap
    pub fn new() -> Self {
        Self::named("")
    }

    /// Create a named bitmap that lives only in memory
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dir: None,
            pages: Vec::new(),
            max_index: None,
            valid: true,
            structure_dirty: false,
        }
    }

    /// Open the bitmap stored for `name` under `root`
    ///
    /// A missing directory yields an empty bitmap. A directory whose content
    /// does not validate yields an empty bitmap with [`is_valid`](Self::is_valid)
    /// returning false.
    pub fn open(name: impl Into<String>, root: &Path) -> StorageResult<Self> {
        let name = name.into();
        let mut bitmap = Self::named(name.clone());
        bitmap.dir = Some(root.join(name_to_filename(&name)));
        bitmap.load()?;
        Ok(bitmap)
    }

    /// Build a memory-only bitmap from a list of ids
    pub fn from_indices(indices: &[u32]) -> Self {
        let mut bitmap = Self::new();
        bitmap.set_all(indices);
        bitmap
    }

    /// Deep copy that shares nothing with `self` and is never persisted
    pub fn copy(&self) -> Self {
        Self {
            name: self.name.clone(),
            dir: None,
            pages: self.pages.clone(),
            max_index: self.max_index,
            valid: self.valid,
            structure_dirty: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory the bitmap is persisted in, if any
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// False when the stored data failed validation on the last load
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn max_index(&self) -> Option<u32> {
        self.max_index
    }

    /// Drop every bit (in memory; persisted on the next store)
    pub fn clear(&mut self) {
        if self.pages.iter().any(Option::is_some) {
            self.structure_dirty = true;
        }
        self.pages.clear();
        self.max_index = None;
        self.valid = true;
    }

    fn page_mut(&mut self, page: usize) -> &mut BitVectorPage {
        if page >= self.pages.len() {
            self.pages.resize(page + PAGE_GROWTH, None);
        }
        self.pages[page].get_or_insert_with(BitVectorPage::new)
    }

    fn page(&self, page: usize) -> Option<&BitVectorPage> {
        self.pages.get(page).and_then(Option::as_ref)
    }

    fn bump_max(&mut self, index: u32) {
        self.max_index = Some(self.max_index.map_or(index, |m| m.max(index)));
    }

    pub fn set(&mut self, index: u32, value: bool) {
        let (page, bit) = split(index);
        if value {
            self.page_mut(page).set(bit, true);
            self.bump_max(index);
        } else if let Some(p) = self.pages.get_mut(page).and_then(Option::as_mut) {
            p.set(bit, false);
        }
    }

    pub fn set_all(&mut self, indices: &[u32]) {
        for &index in indices {
            self.set(index, true);
        }
    }

    pub fn unset_all(&mut self, indices: &[u32]) {
        for &index in indices {
            self.set(index, false);
        }
    }

    /// Set every index in `from..=upto`
    pub fn set_range(&mut self, from: u32, upto: u32) {
        if from > upto {
            return;
        }
        let (first_page, first_bit) = split(from);
        let (last_page, last_bit) = split(upto);
        for page in first_page..=last_page {
            let lo = if page == first_page { first_bit } else { 0 };
            let hi = if page == last_page {
                last_bit
            } else {
                PAGE_BITS - 1
            };
            self.page_mut(page).set_range(lo, hi);
        }
        self.bump_max(upto);
    }

    pub fn is_set(&self, index: u32) -> bool {
        if self.max_index.map_or(true, |max| index > max) {
            return false;
        }
        let (page, bit) = split(index);
        self.page(page).is_some_and(|p| p.is_set(bit))
    }

    /// Whether any index in `from..=upto` is set
    pub fn is_any_set(&self, from: u32, upto: u32) -> bool {
        let Some(max) = self.max_index else {
            return false;
        };
        let upto = upto.min(max);
        if from > upto {
            return false;
        }
        let (first_page, first_bit) = split(from);
        let (last_page, last_bit) = split(upto);
        (first_page..=last_page).any(|page| {
            let Some(p) = self.page(page) else {
                return false;
            };
            let lo = if page == first_page { first_bit } else { 0 };
            let hi = if page == last_page {
                last_bit
            } else {
                PAGE_BITS - 1
            };
            if lo == 0 && hi == PAGE_BITS - 1 {
                !p.is_empty()
            } else {
                p.is_any_set_in(lo, hi)
            }
        })
    }

    pub fn is_any_set_anywhere(&self) -> bool {
        self.pages.iter().flatten().any(|p| !p.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        !self.is_any_set_anywhere()
    }

    pub fn count_set_bits(&self) -> u64 {
        self.pages.iter().flatten().map(BitVectorPage::count).sum()
    }

    /// Every set index in ascending order
    pub fn get_indices(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.count_set_bits() as usize);
        for (i, page) in self.pages.iter().enumerate() {
            if let Some(page) = page {
                page.push_indices((i * PAGE_BITS) as u32, &mut out);
            }
        }
        out
    }

    /// Size of the intersection, without touching either side
    pub fn count_overlap_with(&self, other: &SparseBitmap) -> u64 {
        self.pages
            .iter()
            .enumerate()
            .filter_map(|(i, page)| Some(page.as_ref()?.count_overlap(other.page(i)?)))
            .sum()
    }

    /// AND in place
    pub fn retain_overlap_with(&mut self, other: &SparseBitmap) -> &mut Self {
        for (i, slot) in self.pages.iter_mut().enumerate() {
            let Some(page) = slot.as_mut() else {
                continue;
            };
            let theirs = other.pages.get(i).and_then(Option::as_ref);
            if let Some(o) = theirs {
                page.retain(o);
                if !page.is_empty() {
                    continue;
                }
            }
            *slot = None;
            self.structure_dirty = true;
        }
        self
    }

    /// AND-NOT in place
    pub fn remove_overlap_with(&mut self, other: &SparseBitmap) -> &mut Self {
        for (i, slot) in self.pages.iter_mut().enumerate() {
            if let (Some(page), Some(o)) = (slot.as_mut(), other.page(i)) {
                page.remove(o);
            }
        }
        self
    }

    /// OR in place
    pub fn join_with(&mut self, other: &SparseBitmap) -> &mut Self {
        if other.pages.len() > self.pages.len() {
            self.pages.resize(other.pages.len(), None);
        }
        for (i, theirs) in other.pages.iter().enumerate() {
            let Some(o) = theirs else {
                continue;
            };
            let slot = &mut self.pages[i];
            if let Some(page) = slot.as_mut() {
                page.join(o);
            } else {
                let mut copy = o.clone();
                copy.mark_dirty();
                *slot = Some(copy);
            }
        }
        if let Some(max) = other.max_index {
            self.bump_max(max);
        }
        self
    }

    /// NOT in place, bounded by the highest index ever set
    ///
    /// Every index in `0..=max_index` is flipped and nothing beyond it becomes
    /// set, so reversing twice restores the original content.
    pub fn reverse(&mut self) -> &mut Self {
        let Some(max) = self.max_index else {
            return self;
        };
        let (last_page, last_bit) = split(max);
        for page in 0..=last_page {
            self.page_mut(page).reverse();
        }
        self.page_mut(last_page).clear_from(last_bit + 1);

        for slot in self.pages.iter_mut().take(last_page + 1) {
            if slot.as_ref().is_some_and(BitVectorPage::is_empty) {
                *slot = None;
                self.structure_dirty = true;
            }
        }
        self
    }

    /// Replace empty pages by absent ones
    pub fn compact(&mut self) {
        for slot in self.pages.iter_mut() {
            let Some(page) = slot.as_mut() else {
                continue;
            };
            page.compact();
            if page.is_empty() {
                *slot = None;
                self.structure_dirty = true;
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.structure_dirty || self.pages.iter().flatten().any(BitVectorPage::is_dirty)
    }

    /// Write dirty pages and the header to disk
    ///
    /// No-op for unnamed or memory-only bitmaps, or when nothing changed and
    /// the header is already on disk. An empty bitmap that was never stored
    /// still gets its header, so the label survives a reopen.
    pub fn store(&mut self) -> StorageResult<()> {
        let Some(dir) = self.dir.clone() else {
            return Ok(());
        };
        if self.name.is_empty() || (!self.is_dirty() && dir.join(HEADER_FILE).exists()) {
            return Ok(());
        }

        self.compact();
        fs::create_dir_all(&dir)?;

        let mut written = 0;
        for (i, slot) in self.pages.iter_mut().enumerate() {
            if let Some(page) = slot.as_mut().filter(|p| p.is_dirty()) {
                fs::write(dir.join(i.to_string()), page.encode()?)?;
                page.clear_dirty();
                written += 1;
            }
        }
        let removed = self.remove_stale_pages(&dir)?;
        fs::write(dir.join(HEADER_FILE), self.header()?)?;
        self.structure_dirty = false;

        tracing::debug!(
            label = %self.name,
            pages_written = written,
            pages_removed = removed,
            "Stored bitmap"
        );
        Ok(())
    }

    fn header(&self) -> StorageResult<Vec<u8>> {
        let count = self.count_set_bits();
        let count = u32::try_from(count).map_err(|_| {
            StorageError::Capacity(format!("{} set bits do not fit the header", count))
        })?;
        let page_len = u16::try_from(self.pages.len()).map_err(|_| {
            StorageError::Capacity(format!("{} pages do not fit the header", self.pages.len()))
        })?;

        let mut out = ByteWriter::with_capacity(8 + self.name.len());
        out.write_u32(count);
        out.write_u16(page_len);
        out.write_string(&self.name)?;
        Ok(out.into_inner())
    }

    fn remove_stale_pages(&self, dir: &Path) -> StorageResult<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let Some(page) = page_file_index(&entry.file_name().to_string_lossy()) else {
                continue;
            };
            if self.page(page).is_none() {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Replace the in-memory content with what is stored on disk
    ///
    /// Content that fails validation is discarded and the bitmap is flagged
    /// invalid. Only real I/O failures are returned as errors.
    pub fn load(&mut self) -> StorageResult<()> {
        let Some(dir) = self.dir.clone() else {
            return Ok(());
        };
        self.pages.clear();
        self.max_index = None;
        self.valid = true;
        self.structure_dirty = false;
        if self.name.is_empty() || !dir.exists() {
            return Ok(());
        }

        match self.read_from(&dir) {
            Ok(()) => {
                tracing::debug!(
                    label = %self.name,
                    bits = self.count_set_bits(),
                    "Loaded bitmap"
                );
                Ok(())
            }
            Err(StorageError::Corruption(reason)) => {
                tracing::warn!(label = %self.name, "Discarding invalid bitmap: {}", reason);
                self.pages.clear();
                self.max_index = None;
                self.valid = false;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn read_from(&mut self, dir: &Path) -> StorageResult<()> {
        let header = match fs::read(dir.join(HEADER_FILE)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::Corruption("header file missing".to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let mut reader = ByteReader::new(&header);
        let expected_count = reader.read_u32()?;
        let page_len = reader.read_u16()? as usize;
        let stored_name = reader.read_string()?;
        if stored_name != self.name {
            return Err(StorageError::Corruption(format!(
                "header belongs to {:?}",
                stored_name
            )));
        }

        self.pages = vec![None; page_len];
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let Some(page) = page_file_index(&entry.file_name().to_string_lossy()) else {
                continue;
            };
            if page >= page_len {
                return Err(StorageError::Corruption(format!(
                    "page {} beyond stored page count {}",
                    page, page_len
                )));
            }
            self.pages[page] = Some(BitVectorPage::decode(&fs::read(entry.path())?)?);
        }

        let count = self.count_set_bits();
        if count != u64::from(expected_count) {
            return Err(StorageError::Corruption(format!(
                "expected {} set bits, found {}",
                expected_count, count
            )));
        }

        self.max_index = self.pages.iter().enumerate().rev().find_map(|(i, page)| {
            page.as_ref()
                .and_then(BitVectorPage::last_set_bit)
                .map(|bit| (i * PAGE_BITS + bit) as u32)
        });
        Ok(())
    }
}

/// Page index encoded in a page file name (plain decimal digits)
fn page_file_index(file_name: &str) -> Option<usize> {
    if file_name.is_empty() || !file_name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    file_name.parse().ok()
}

impl fmt::Debug for SparseBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseBitmap")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .field("bits", &self.count_set_bits())
            .field("max_index", &self.max_index)
            .field("valid", &self.valid)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::vector::VECTOR_BITS;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    const P: u32 = PAGE_BITS as u32;

    #[test]
    fn test_set_and_query() {
        let mut bits = SparseBitmap::new();
        assert!(!bits.is_set(0));
        assert!(!bits.is_set(u32::MAX));

        bits.set_all(&[3, 60_000_000, 17]);
        assert!(bits.is_set(3));
        assert!(bits.is_set(60_000_000));
        assert!(!bits.is_set(4));
        assert_eq!(bits.count_set_bits(), 3);
        assert_eq!(bits.get_indices(), vec![3, 17, 60_000_000]);
        assert_eq!(bits.max_index(), Some(60_000_000));

        bits.unset_all(&[17, 5]);
        assert_eq!(bits.get_indices(), vec![3, 60_000_000]);
    }

    #[test]
    fn test_is_any_set() {
        let bits = SparseBitmap::from_indices(&[P + 10, 3 * P]);
        assert!(bits.is_any_set(0, u32::MAX));
        assert!(bits.is_any_set(P, 2 * P));
        assert!(bits.is_any_set(P + 10, P + 10));
        assert!(!bits.is_any_set(0, P + 9));
        assert!(!bits.is_any_set(P + 11, 3 * P - 1));
        assert!(!bits.is_any_set(3 * P + 1, u32::MAX));
        assert!(!SparseBitmap::new().is_any_set(0, u32::MAX));
    }

    #[test]
    fn test_set_range() {
        let mut bits = SparseBitmap::new();
        bits.set_range(P - 5, P + 4);
        assert_eq!(bits.count_set_bits(), 10);
        assert_eq!(bits.get_indices().first(), Some(&(P - 5)));
        assert_eq!(bits.max_index(), Some(P + 4));
    }

    #[test]
    fn test_algebra_examples() {
        let a = SparseBitmap::from_indices(&[1, 2, 3, P * 2]);
        let b = SparseBitmap::from_indices(&[2, 3, 4, P * 5]);

        assert_eq!(a.count_overlap_with(&b), 2);
        assert_eq!(a.copy().retain_overlap_with(&b).get_indices(), vec![2, 3]);
        assert_eq!(a.copy().remove_overlap_with(&b).get_indices(), vec![1, P * 2]);
        assert_eq!(
            a.copy().join_with(&b).get_indices(),
            vec![1, 2, 3, 4, P * 2, P * 5]
        );
    }

    #[test]
    fn test_copy_is_independent() {
        let original = SparseBitmap::from_indices(&[7]);
        let mut copy = original.copy();
        copy.set(8, true);
        assert!(!original.is_set(8));
        assert!(copy.dir().is_none());
    }

    #[test]
    fn test_reverse_bounded_by_max_index() {
        let mut bits = SparseBitmap::from_indices(&[1, 3]);
        bits.reverse();
        assert_eq!(bits.get_indices(), vec![0, 2]);
        assert!(!bits.is_set(4));
        bits.reverse();
        assert_eq!(bits.get_indices(), vec![1, 3]);

        let mut empty = SparseBitmap::new();
        empty.reverse();
        assert!(empty.is_empty());
        assert_eq!(empty.max_index(), None);
    }

    #[test]
    fn test_reverse_spanning_pages() {
        let mut bits = SparseBitmap::from_indices(&[P + 1]);
        bits.reverse();
        assert_eq!(bits.count_set_bits(), u64::from(P) + 1);
        assert!(bits.is_set(0));
        assert!(!bits.is_set(P + 1));
        assert!(!bits.is_set(P + 2));
        bits.reverse();
        assert_eq!(bits.get_indices(), vec![P + 1]);
    }

    #[test]
    fn test_store_and_load() {
        let dir = tempdir().unwrap();
        let mut bits = SparseBitmap::open("label", dir.path()).unwrap();
        assert!(bits.is_valid());
        assert!(bits.is_empty());

        bits.set_all(&[1, 2, 3 * P + 9]);
        bits.store().unwrap();
        assert!(!bits.is_dirty());

        let label_dir = dir.path().join(name_to_filename("label"));
        assert!(label_dir.join(HEADER_FILE).exists());
        assert!(label_dir.join("0").exists());
        assert!(label_dir.join("3").exists());

        let loaded = SparseBitmap::open("label", dir.path()).unwrap();
        assert!(loaded.is_valid());
        assert_eq!(loaded.get_indices(), vec![1, 2, 3 * P + 9]);
        assert_eq!(loaded.max_index(), Some(3 * P + 9));
        assert!(!loaded.is_dirty());
    }

    #[test]
    fn test_store_only_rewrites_dirty_pages() {
        let dir = tempdir().unwrap();
        let mut bits = SparseBitmap::open("x", dir.path()).unwrap();
        bits.set_all(&[1, 2 * P]);
        bits.store().unwrap();

        let page0 = dir.path().join(name_to_filename("x")).join("0");
        fs::write(&page0, b"not a page").unwrap();

        bits.set(2 * P + 1, true);
        bits.store().unwrap();
        assert_eq!(fs::read(&page0).unwrap(), b"not a page");
    }

    #[test]
    fn test_store_removes_emptied_pages() {
        let dir = tempdir().unwrap();
        let mut bits = SparseBitmap::open("x", dir.path()).unwrap();
        bits.set_all(&[1, 2 * P]);
        bits.store().unwrap();

        bits.set(2 * P, false);
        bits.store().unwrap();
        assert!(!dir.path().join(name_to_filename("x")).join("2").exists());

        let loaded = SparseBitmap::open("x", dir.path()).unwrap();
        assert!(loaded.is_valid());
        assert_eq!(loaded.get_indices(), vec![1]);
    }

    #[test]
    fn test_store_after_clear_and_retain() {
        let dir = tempdir().unwrap();
        let mut bits = SparseBitmap::open("x", dir.path()).unwrap();
        bits.set_all(&[1, P]);
        bits.store().unwrap();

        bits.retain_overlap_with(&SparseBitmap::from_indices(&[1]));
        bits.store().unwrap();
        assert_eq!(
            SparseBitmap::open("x", dir.path()).unwrap().get_indices(),
            vec![1]
        );

        bits.clear();
        bits.store().unwrap();
        let loaded = SparseBitmap::open("x", dir.path()).unwrap();
        assert!(loaded.is_valid());
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_store_new_empty_bitmap_writes_header() {
        let dir = tempdir().unwrap();
        let mut bits = SparseBitmap::open("empty", dir.path()).unwrap();
        assert!(!bits.is_dirty());
        bits.store().unwrap();

        let label_dir = dir.path().join(name_to_filename("empty"));
        assert!(label_dir.join(HEADER_FILE).exists());
        let loaded = SparseBitmap::open("empty", dir.path()).unwrap();
        assert!(loaded.is_valid());
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_unnamed_or_memory_bitmaps_do_not_store() {
        let mut bits = SparseBitmap::named("memory");
        bits.set(1, true);
        bits.store().unwrap();
        assert!(bits.is_dirty());
    }

    #[test]
    fn test_invalid_on_count_mismatch() {
        let dir = tempdir().unwrap();
        let mut bits = SparseBitmap::open("x", dir.path()).unwrap();
        bits.set_all(&[1, 2 * P]);
        bits.store().unwrap();

        let label_dir = dir.path().join(name_to_filename("x"));
        fs::remove_file(label_dir.join("2")).unwrap();

        let loaded = SparseBitmap::open("x", dir.path()).unwrap();
        assert!(!loaded.is_valid());
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_invalid_on_header_problems() {
        let dir = tempdir().unwrap();
        let mut bits = SparseBitmap::open("x", dir.path()).unwrap();
        bits.set(5, true);
        bits.store().unwrap();
        let label_dir = dir.path().join(name_to_filename("x"));

        // Header of another label
        let mut other = ByteWriter::new();
        other.write_u32(1);
        other.write_u16(10);
        other.write_string("y").unwrap();
        fs::write(label_dir.join(HEADER_FILE), other.as_slice()).unwrap();
        assert!(!SparseBitmap::open("x", dir.path()).unwrap().is_valid());

        // Page beyond stored page count
        let mut short = ByteWriter::new();
        short.write_u32(1);
        short.write_u16(0);
        short.write_string("x").unwrap();
        fs::write(label_dir.join(HEADER_FILE), short.as_slice()).unwrap();
        assert!(!SparseBitmap::open("x", dir.path()).unwrap().is_valid());

        // Missing header
        fs::remove_file(label_dir.join(HEADER_FILE)).unwrap();
        assert!(!SparseBitmap::open("x", dir.path()).unwrap().is_valid());
    }

    #[test]
    fn test_full_vector_round_trips() {
        let dir = tempdir().unwrap();
        let mut bits = SparseBitmap::open("full", dir.path()).unwrap();
        bits.set_range(0, VECTOR_BITS as u32 - 1);
        bits.store().unwrap();

        let page0 = fs::read(dir.path().join(name_to_filename("full")).join("0")).unwrap();
        // u16 count, u16 index, u16 length, i32 -1
        assert_eq!(page0.len(), 2 + 2 + 2 + 4);

        let loaded = SparseBitmap::open("full", dir.path()).unwrap();
        assert_eq!(loaded.count_set_bits(), VECTOR_BITS as u64);
    }

    fn index_set() -> impl Strategy<Value = BTreeSet<u32>> {
        prop::collection::btree_set(
            prop_oneof![
                3 => 0u32..20_000,
                2 => 0u32..3 * P,
                1 => 0u32..40_000_000,
            ],
            0..150,
        )
    }

    fn bitmap_of(set: &BTreeSet<u32>) -> SparseBitmap {
        let v: Vec<u32> = set.iter().copied().collect();
        SparseBitmap::from_indices(&v)
    }

    fn sorted(set: impl IntoIterator<Item = u32>) -> Vec<u32> {
        set.into_iter().collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn algebra_matches_btreeset(a in index_set(), b in index_set()) {
            let (ba, bb) = (bitmap_of(&a), bitmap_of(&b));

            prop_assert_eq!(ba.count_overlap_with(&bb), a.intersection(&b).count() as u64);
            prop_assert_eq!(
                ba.copy().retain_overlap_with(&bb).get_indices(),
                sorted(a.intersection(&b).copied())
            );
            prop_assert_eq!(
                ba.copy().remove_overlap_with(&bb).get_indices(),
                sorted(a.difference(&b).copied())
            );
            prop_assert_eq!(
                ba.copy().join_with(&bb).get_indices(),
                sorted(a.union(&b).copied())
            );
        }

        #[test]
        fn reverse_twice_is_identity(a in index_set()) {
            let mut bits = bitmap_of(&a);
            bits.reverse();
            if let Some(&max) = a.iter().next_back() {
                prop_assert_eq!(bits.count_set_bits(), u64::from(max) + 1 - a.len() as u64);
            }
            bits.reverse();
            prop_assert_eq!(bits.get_indices(), sorted(a.iter().copied()));
        }

        #[test]
        fn store_load_preserves_indices(a in index_set()) {
            let dir = tempdir().unwrap();
            let mut bits = SparseBitmap::open("prop", dir.path()).unwrap();
            for &i in &a {
                bits.set(i, true);
            }
            bits.store().unwrap();
            let loaded = SparseBitmap::open("prop", dir.path()).unwrap();
            prop_assert!(loaded.is_valid());
            prop_assert_eq!(loaded.get_indices(), sorted(a.iter().copied()));
        }
    }
}
