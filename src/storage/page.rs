//! BitVectorPage - 64 optional vectors, the unit of persistence
//!
//! A page covers 64 x 8192 = 524,288 bits. Vectors that were never touched,
//! or that became all-zero and were compacted away, are simply absent.
//!
//! Page file layout:
//! ```text
//! u16 vector_count
//! repeated vector_count times:
//!     u16 vector_index      (0..64)
//!     u16 payload_length
//!     [u8; payload_length]  BitVector payload
//! ```

use crate::storage::codec::{ByteReader, ByteWriter};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::vector::{BitVector, VECTOR_BITS};

/// Number of vectors in a page
pub const PAGE_VECTORS: usize = 64;

/// Number of bits in a page
pub const PAGE_BITS: usize = PAGE_VECTORS * VECTOR_BITS;

/// Fixed array of optional bit vectors
#[derive(Debug, Clone)]
pub struct BitVectorPage {
    vectors: Vec<Option<BitVector>>,
    /// Set when a vector slot was dropped or replaced wholesale
    structure_dirty: bool,
}

impl Default for BitVectorPage {
    fn default() -> Self {
        Self::new()
    }
}

impl BitVectorPage {
    pub fn new() -> Self {
        Self {
            vectors: vec![None; PAGE_VECTORS],
            structure_dirty: false,
        }
    }

    fn vector_mut(&mut self, slot: usize) -> &mut BitVector {
        self.vectors[slot].get_or_insert_with(BitVector::new)
    }

    pub fn is_set(&self, bit: usize) -> bool {
        self.vectors[bit / VECTOR_BITS]
            .as_ref()
            .is_some_and(|v| v.is_set(bit % VECTOR_BITS))
    }

    /// Set or clear a bit, returning whether the page changed
    ///
    /// # Panics
    /// When `bit` is not below [`PAGE_BITS`].
    pub fn set(&mut self, bit: usize, value: bool) -> bool {
        assert!(bit < PAGE_BITS, "bit {} outside page (0..{})", bit, PAGE_BITS);
        let slot = bit / VECTOR_BITS;
        if !value && self.vectors[slot].is_none() {
            return false;
        }
        self.vector_mut(slot).set(bit % VECTOR_BITS, value)
    }

    /// Set every bit in `from..=upto`
    pub fn set_range(&mut self, from: usize, upto: usize) {
        let upto = upto.min(PAGE_BITS - 1);
        if from > upto {
            return;
        }
        let (first, last) = (from / VECTOR_BITS, upto / VECTOR_BITS);
        for slot in first..=last {
            let lo = if slot == first { from % VECTOR_BITS } else { 0 };
            let hi = if slot == last {
                upto % VECTOR_BITS
            } else {
                VECTOR_BITS - 1
            };
            self.vector_mut(slot).set_range(lo, hi);
        }
    }

    /// Clear every bit from `from` to the end of the page
    pub fn clear_from(&mut self, from: usize) {
        if from >= PAGE_BITS {
            return;
        }
        let first = from / VECTOR_BITS;
        if let Some(v) = self.vectors[first].as_mut() {
            v.clear_from(from % VECTOR_BITS);
        }
        for slot in first + 1..PAGE_VECTORS {
            if self.vectors[slot].take().is_some() {
                self.structure_dirty = true;
            }
        }
        self.compact();
    }

    pub fn count(&self) -> u64 {
        self.present().map(|(_, v)| v.count()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.present().all(|(_, v)| v.is_empty())
    }

    /// Whether any bit in `from..=upto` is set
    pub fn is_any_set_in(&self, from: usize, upto: usize) -> bool {
        let upto = upto.min(PAGE_BITS - 1);
        if from > upto {
            return false;
        }
        let (first, last) = (from / VECTOR_BITS, upto / VECTOR_BITS);
        (first..=last).any(|slot| {
            let Some(v) = self.vectors[slot].as_ref() else {
                return false;
            };
            let lo = if slot == first { from % VECTOR_BITS } else { 0 };
            let hi = if slot == last {
                upto % VECTOR_BITS
            } else {
                VECTOR_BITS - 1
            };
            if lo == 0 && hi == VECTOR_BITS - 1 {
                !v.is_empty()
            } else {
                v.is_any_set_in(lo, hi)
            }
        })
    }

    pub fn last_set_bit(&self) -> Option<usize> {
        self.vectors.iter().enumerate().rev().find_map(|(slot, v)| {
            v.as_ref()
                .and_then(BitVector::last_set_bit)
                .map(|bit| slot * VECTOR_BITS + bit)
        })
    }

    /// Flip every bit of the page
    pub fn reverse(&mut self) {
        for slot in 0..PAGE_VECTORS {
            self.vector_mut(slot).reverse();
        }
        self.structure_dirty = true;
        self.compact();
    }

    pub fn count_overlap(&self, other: &BitVectorPage) -> u64 {
        self.present()
            .filter_map(|(slot, v)| other.vectors[slot].as_ref().map(|o| v.count_overlap(o)))
            .sum()
    }

    /// AND: vectors absent in `other` disappear from `self`
    pub fn retain(&mut self, other: &BitVectorPage) {
        for (mine, theirs) in self.vectors.iter_mut().zip(&other.vectors) {
            let Some(v) = mine.as_mut() else {
                continue;
            };
            match theirs {
                Some(o) => v.retain(o),
                None => {
                    *mine = None;
                    self.structure_dirty = true;
                }
            }
        }
        self.compact();
    }

    /// AND-NOT: only slots present on both sides are touched
    pub fn remove(&mut self, other: &BitVectorPage) {
        for (mine, theirs) in self.vectors.iter_mut().zip(&other.vectors) {
            if let (Some(v), Some(o)) = (mine.as_mut(), theirs) {
                v.remove(o);
            }
        }
    }

    /// OR: vectors only present in `other` are copied in
    pub fn join(&mut self, other: &BitVectorPage) {
        for (mine, theirs) in self.vectors.iter_mut().zip(&other.vectors) {
            let Some(o) = theirs else {
                continue;
            };
            if let Some(v) = mine.as_mut() {
                v.join(o);
            } else {
                let mut copy = o.clone();
                copy.mark_dirty();
                *mine = Some(copy);
                self.structure_dirty = true;
            }
        }
    }

    /// Drop vectors that no longer hold any bit
    pub fn compact(&mut self) {
        for slot in self.vectors.iter_mut() {
            if slot.as_ref().is_some_and(BitVector::is_empty) {
                *slot = None;
                self.structure_dirty = true;
            }
        }
    }

    pub fn push_indices(&self, base: u32, out: &mut Vec<u32>) {
        for (slot, v) in self.present() {
            v.push_indices(base + (slot * VECTOR_BITS) as u32, out);
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.structure_dirty || self.present().any(|(_, v)| v.is_dirty())
    }

    pub fn mark_dirty(&mut self) {
        self.structure_dirty = true;
    }

    pub fn clear_dirty(&mut self) {
        self.structure_dirty = false;
        for v in self.vectors.iter_mut().flatten() {
            v.clear_dirty();
        }
    }

    /// Serialize the page (compacting it first)
    pub fn encode(&mut self) -> StorageResult<Vec<u8>> {
        self.compact();
        let mut out = ByteWriter::new();
        out.write_u16(self.present().count() as u16);
        for (slot, v) in self.present() {
            let mut payload = ByteWriter::new();
            v.encode(&mut payload);
            out.write_u16(slot as u16);
            out.write_u16(u16::try_from(payload.len()).map_err(|_| {
                StorageError::Capacity(format!(
                    "vector {} payload of {} bytes",
                    slot,
                    payload.len()
                ))
            })?);
            out.write_bytes(payload.as_slice());
        }
        Ok(out.into_inner())
    }

    /// Rebuild a page from [`encode`](Self::encode) output
    pub fn decode(bytes: &[u8]) -> StorageResult<Self> {
        let mut reader = ByteReader::new(bytes);
        let count = reader.read_u16()? as usize;
        let mut page = Self::new();
        let mut seen = 0;

        while reader.has_remaining() {
            let slot = reader.read_u16()? as usize;
            let len = reader.read_u16()? as usize;
            if slot >= PAGE_VECTORS {
                return Err(StorageError::Corruption(format!(
                    "vector index {} outside page",
                    slot
                )));
            }
            let payload = reader.read_bytes(len)?;
            page.vectors[slot] = Some(BitVector::decode(payload)?);
            seen += 1;
        }

        if seen != count {
            return Err(StorageError::Corruption(format!(
                "page announced {} vectors but holds {}",
                count, seen
            )));
        }
        Ok(page)
    }

    fn present(&self) -> impl Iterator<Item = (usize, &BitVector)> {
        self.vectors
            .iter()
            .enumerate()
            .filter_map(|(slot, v)| v.as_ref().map(|v| (slot, v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_of(bits: &[usize]) -> BitVectorPage {
        let mut page = BitVectorPage::new();
        for &bit in bits {
            page.set(bit, true);
        }
        page
    }

    fn indices(page: &BitVectorPage) -> Vec<u32> {
        let mut out = Vec::new();
        page.push_indices(0, &mut out);
        out
    }

    #[test]
    fn test_clearing_untouched_vector_allocates_nothing() {
        let mut page = BitVectorPage::new();
        assert!(!page.set(100_000, false));
        assert!(!page.is_dirty());
        assert_eq!(page.present().count(), 0);
    }

    #[test]
    fn test_bits_across_vectors() {
        let page = page_of(&[0, VECTOR_BITS - 1, VECTOR_BITS, PAGE_BITS - 1]);
        assert_eq!(page.count(), 4);
        assert_eq!(
            indices(&page),
            vec![0, VECTOR_BITS as u32 - 1, VECTOR_BITS as u32, PAGE_BITS as u32 - 1]
        );
        assert_eq!(page.last_set_bit(), Some(PAGE_BITS - 1));
        assert!(page.is_any_set_in(1, VECTOR_BITS));
        assert!(!page.is_any_set_in(VECTOR_BITS + 1, PAGE_BITS - 2));
    }

    #[test]
    fn test_retain_drops_vectors_missing_in_other() {
        let mut a = page_of(&[1, VECTOR_BITS * 3 + 5]);
        let b = page_of(&[1]);
        a.clear_dirty();

        a.retain(&b);
        assert_eq!(indices(&a), vec![1]);
        assert_eq!(a.present().count(), 1);
        assert!(a.is_dirty());
    }

    #[test]
    fn test_join_copies_missing_vectors() {
        let mut a = page_of(&[1]);
        let b = page_of(&[VECTOR_BITS * 7]);
        a.join(&b);
        assert_eq!(indices(&a), vec![1, VECTOR_BITS as u32 * 7]);

        // Independent copy
        let mut b2 = b.clone();
        b2.set(VECTOR_BITS * 7 + 1, true);
        assert!(!a.is_set(VECTOR_BITS * 7 + 1));
    }

    #[test]
    fn test_remove_and_overlap() {
        let mut a = page_of(&[1, 2, VECTOR_BITS * 2]);
        let b = page_of(&[2, VECTOR_BITS * 2, VECTOR_BITS * 4]);
        assert_eq!(a.count_overlap(&b), 2);
        a.remove(&b);
        assert_eq!(indices(&a), vec![1]);
    }

    #[test]
    fn test_reverse_compacts_full_page() {
        let mut page = BitVectorPage::new();
        page.set_range(0, PAGE_BITS - 1);
        assert_eq!(page.count(), PAGE_BITS as u64);
        page.reverse();
        assert!(page.is_empty());
        assert_eq!(page.present().count(), 0);
    }

    #[test]
    fn test_clear_from() {
        let mut page = page_of(&[10, VECTOR_BITS + 10, VECTOR_BITS * 9]);
        page.clear_from(VECTOR_BITS + 10);
        assert_eq!(indices(&page), vec![10]);
    }

    #[test]
    fn test_encode_decode() {
        let mut page = page_of(&[3, VECTOR_BITS * 63 + 1]);
        page.set_range(VECTOR_BITS * 10, VECTOR_BITS * 11 - 1);
        let bytes = page.encode().unwrap();

        let back = BitVectorPage::decode(&bytes).unwrap();
        assert_eq!(indices(&back), indices(&page));
        assert!(!back.is_dirty());
    }

    #[test]
    fn test_encode_skips_emptied_vectors() {
        let mut page = page_of(&[3, VECTOR_BITS * 2]);
        page.set(VECTOR_BITS * 2, false);
        let bytes = page.encode().unwrap();
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(reader.read_u16().unwrap(), 1);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let mut w = ByteWriter::new();
        w.write_u16(1);
        w.write_u16(64);
        w.write_u16(4);
        w.write_i32(-1);
        assert!(BitVectorPage::decode(w.as_slice()).is_err());

        let mut w = ByteWriter::new();
        w.write_u16(2);
        w.write_u16(0);
        w.write_u16(4);
        w.write_i32(-1);
        assert!(BitVectorPage::decode(w.as_slice()).is_err());
    }
}
