//! BitVector - the leaf of the sparse bitmap
//!
//! A fixed block of 8192 bits stored as 128 packed `u64` words. The vector
//! tracks the span of words that may be non-zero so counting, enumeration and
//! serialization only touch the part that is in use.
//!
//! Payload layout:
//! ```text
//! all bits set:   i32 -1
//! otherwise:      i32 word_count
//!                 i32 first_word
//!                 u64 words[word_count]   (big-endian)
//! ```

use crate::storage::codec::{ByteReader, ByteWriter};
use crate::storage::error::{StorageError, StorageResult};
use std::fmt;

/// Number of 64-bit words in a vector
pub const VECTOR_WORDS: usize = 128;

/// Number of bits in a vector
pub const VECTOR_BITS: usize = VECTOR_WORDS * 64;

const FULL_MARKER: i32 = -1;

/// Mask with bits `lo..=hi` of a word set
#[inline]
fn mask(lo: usize, hi: usize) -> u64 {
    (u64::MAX << lo) & (u64::MAX >> (63 - hi))
}

/// Fixed-capacity block of bits
#[derive(Clone)]
pub struct BitVector {
    words: Box<[u64; VECTOR_WORDS]>,
    /// Inclusive word range outside of which every word is zero
    span: Option<(usize, usize)>,
    dirty: bool,
}

impl Default for BitVector {
    fn default() -> Self {
        Self::new()
    }
}

impl BitVector {
    /// Create an empty vector
    pub fn new() -> Self {
        Self {
            words: Box::new([0u64; VECTOR_WORDS]),
            span: None,
            dirty: false,
        }
    }

    /// Create a vector with every bit set
    pub fn full() -> Self {
        Self {
            words: Box::new([u64::MAX; VECTOR_WORDS]),
            span: Some((0, VECTOR_WORDS - 1)),
            dirty: false,
        }
    }

    pub fn is_set(&self, bit: usize) -> bool {
        self.words[bit / 64] & (1u64 << (bit % 64)) != 0
    }

    /// Set or clear a bit, returning whether the vector changed
    ///
    /// # Panics
    /// When `bit` is not below [`VECTOR_BITS`].
    pub fn set(&mut self, bit: usize, value: bool) -> bool {
        assert!(
            bit < VECTOR_BITS,
            "bit {} outside vector (0..{})",
            bit,
            VECTOR_BITS
        );
        let w = bit / 64;
        let old = self.words[w];
        let new = if value {
            old | (1u64 << (bit % 64))
        } else {
            old & !(1u64 << (bit % 64))
        };
        if new == old {
            return false;
        }

        self.words[w] = new;
        self.dirty = true;
        if value {
            self.widen(w, w);
        } else if new == 0 && matches!(self.span, Some((lo, hi)) if lo == w || hi == w) {
            self.refresh_span();
        }
        true
    }

    /// Set every bit in `from..=upto`
    pub fn set_range(&mut self, from: usize, upto: usize) {
        let upto = upto.min(VECTOR_BITS - 1);
        if from > upto {
            return;
        }
        let (first, last) = (from / 64, upto / 64);
        for w in first..=last {
            let lo = if w == first { from % 64 } else { 0 };
            let hi = if w == last { upto % 64 } else { 63 };
            let old = self.words[w];
            self.words[w] |= mask(lo, hi);
            self.dirty |= self.words[w] != old;
        }
        self.widen(first, last);
    }

    /// Clear every bit from `from` to the end of the vector
    pub fn clear_from(&mut self, from: usize) {
        if from >= VECTOR_BITS {
            return;
        }
        let first = from / 64;
        for w in first..VECTOR_WORDS {
            let old = self.words[w];
            self.words[w] &= if w == first { !mask(from % 64, 63) } else { 0 };
            self.dirty |= self.words[w] != old;
        }
        self.refresh_span();
    }

    pub fn count(&self) -> u64 {
        self.span_words()
            .iter()
            .map(|w| u64::from(w.count_ones()))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.span_words().iter().all(|&w| w == 0)
    }

    pub fn is_full(&self) -> bool {
        self.words.iter().all(|&w| w == u64::MAX)
    }

    /// Whether any bit in `from..=upto` is set
    pub fn is_any_set_in(&self, from: usize, upto: usize) -> bool {
        let upto = upto.min(VECTOR_BITS - 1);
        if from > upto {
            return false;
        }
        let (first, last) = (from / 64, upto / 64);
        (first..=last).any(|w| {
            let lo = if w == first { from % 64 } else { 0 };
            let hi = if w == last { upto % 64 } else { 63 };
            self.words[w] & mask(lo, hi) != 0
        })
    }

    /// Highest set bit, if any
    pub fn last_set_bit(&self) -> Option<usize> {
        let (lo, hi) = self.span?;
        (lo..=hi)
            .rev()
            .find(|&w| self.words[w] != 0)
            .map(|w| w * 64 + 63 - self.words[w].leading_zeros() as usize)
    }

    /// Flip every bit
    pub fn reverse(&mut self) {
        for w in self.words.iter_mut() {
            *w = !*w;
        }
        self.dirty = true;
        self.refresh_span();
    }

    /// Number of bits set in both vectors
    pub fn count_overlap(&self, other: &BitVector) -> u64 {
        let Some((lo, hi)) = self.common_span(other) else {
            return 0;
        };
        (lo..=hi)
            .map(|w| u64::from((self.words[w] & other.words[w]).count_ones()))
            .sum()
    }

    /// Keep only bits also set in `other`
    pub fn retain(&mut self, other: &BitVector) {
        let Some((lo, hi)) = self.span else {
            return;
        };
        for w in lo..=hi {
            let old = self.words[w];
            if old != 0 {
                self.words[w] = old & other.words[w];
                self.dirty |= self.words[w] != old;
            }
        }
        self.refresh_span();
    }

    /// Clear bits that are set in `other`
    pub fn remove(&mut self, other: &BitVector) {
        let Some((lo, hi)) = self.common_span(other) else {
            return;
        };
        for w in lo..=hi {
            let old = self.words[w];
            self.words[w] = old & !other.words[w];
            self.dirty |= self.words[w] != old;
        }
        self.refresh_span();
    }

    /// Set bits that are set in `other`
    pub fn join(&mut self, other: &BitVector) {
        let Some((lo, hi)) = other.span else {
            return;
        };
        for w in lo..=hi {
            let old = self.words[w];
            self.words[w] = old | other.words[w];
            self.dirty |= self.words[w] != old;
        }
        self.widen(lo, hi);
    }

    /// Append the index of every set bit, offset by `base`, in ascending order
    pub fn push_indices(&self, base: u32, out: &mut Vec<u32>) {
        let Some((lo, hi)) = self.span else {
            return;
        };
        for w in lo..=hi {
            let mut word = self.words[w];
            while word != 0 {
                let bit = word.trailing_zeros() as usize;
                out.push(base + (w * 64 + bit) as u32);
                word &= word - 1;
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Serialize the used span of this vector
    pub fn encode(&self, out: &mut ByteWriter) {
        if self.is_full() {
            out.write_i32(FULL_MARKER);
            return;
        }
        match self.span {
            Some((lo, hi)) => {
                out.write_i32((hi - lo + 1) as i32);
                out.write_i32(lo as i32);
                for w in lo..=hi {
                    out.write_u64(self.words[w]);
                }
            }
            None => {
                out.write_i32(0);
                out.write_i32(0);
            }
        }
    }

    /// Rebuild a vector from [`encode`](Self::encode) output
    pub fn decode(bytes: &[u8]) -> StorageResult<Self> {
        let mut reader = ByteReader::new(bytes);
        let count = reader.read_i32()?;

        let vector = if count == FULL_MARKER {
            Self::full()
        } else {
            let start = reader.read_i32()?;
            if count < 0 || start < 0 || i64::from(count) + i64::from(start) > VECTOR_WORDS as i64
            {
                return Err(StorageError::Corruption(format!(
                    "vector span out of bounds (words={}, start={})",
                    count, start
                )));
            }
            let mut vector = Self::new();
            let start = start as usize;
            for w in start..start + count as usize {
                vector.words[w] = reader.read_u64()?;
            }
            vector.refresh_span();
            vector
        };

        if reader.has_remaining() {
            return Err(StorageError::Corruption(format!(
                "{} trailing bytes after vector payload",
                reader.remaining()
            )));
        }
        Ok(vector)
    }

    fn span_words(&self) -> &[u64] {
        match self.span {
            Some((lo, hi)) => &self.words[lo..=hi],
            None => &[],
        }
    }

    fn common_span(&self, other: &BitVector) -> Option<(usize, usize)> {
        let (a_lo, a_hi) = self.span?;
        let (b_lo, b_hi) = other.span?;
        let (lo, hi) = (a_lo.max(b_lo), a_hi.min(b_hi));
        (lo <= hi).then_some((lo, hi))
    }

    fn widen(&mut self, lo: usize, hi: usize) {
        self.span = Some(match self.span {
            Some((a, b)) => (a.min(lo), b.max(hi)),
            None => (lo, hi),
        });
    }

    fn refresh_span(&mut self) {
        let first = self.words.iter().position(|&w| w != 0);
        let last = self.words.iter().rposition(|&w| w != 0);
        self.span = first.zip(last);
    }
}

impl fmt::Debug for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitVector")
            .field("span", &self.span)
            .field("count", &self.count())
            .field("dirty", &self.dirty)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(v: &BitVector) -> Vec<u32> {
        let mut out = Vec::new();
        v.push_indices(0, &mut out);
        out
    }

    fn vector_of(bits: &[usize]) -> BitVector {
        let mut v = BitVector::new();
        for &bit in bits {
            v.set(bit, true);
        }
        v
    }

    #[test]
    fn test_set_and_clear() {
        let mut v = BitVector::new();
        assert!(!v.is_dirty());
        assert!(v.set(5, true));
        assert!(!v.set(5, true));
        assert!(v.is_set(5));
        assert!(v.is_dirty());
        assert_eq!(v.count(), 1);

        v.clear_dirty();
        assert!(v.set(5, false));
        assert!(v.is_dirty());
        assert!(v.is_empty());
        assert_eq!(v.last_set_bit(), None);
    }

    #[test]
    #[should_panic(expected = "outside vector")]
    fn test_set_out_of_range_panics() {
        BitVector::new().set(VECTOR_BITS, true);
    }

    #[test]
    fn test_indices_ascending() {
        let v = vector_of(&[8191, 0, 64, 63, 700]);
        assert_eq!(indices(&v), vec![0, 63, 64, 700, 8191]);
        assert_eq!(v.last_set_bit(), Some(8191));

        let mut out = Vec::new();
        v.push_indices(10_000, &mut out);
        assert_eq!(out[0], 10_000);
    }

    #[test]
    fn test_any_set_in_range() {
        let v = vector_of(&[130]);
        assert!(v.is_any_set_in(0, VECTOR_BITS));
        assert!(v.is_any_set_in(130, 130));
        assert!(v.is_any_set_in(65, 200));
        assert!(!v.is_any_set_in(0, 129));
        assert!(!v.is_any_set_in(131, 8191));
        assert!(!v.is_any_set_in(200, 100));
    }

    #[test]
    fn test_set_range_and_clear_from() {
        let mut v = BitVector::new();
        v.set_range(60, 130);
        assert_eq!(v.count(), 71);
        assert!(v.is_set(60) && v.is_set(130));
        assert!(!v.is_set(59) && !v.is_set(131));

        v.clear_from(100);
        assert_eq!(v.count(), 40);
        assert_eq!(v.last_set_bit(), Some(99));
    }

    #[test]
    fn test_set_algebra() {
        let a = vector_of(&[1, 2, 3, 500, 8000]);
        let b = vector_of(&[2, 3, 4, 8000]);
        assert_eq!(a.count_overlap(&b), 3);

        let mut and = a.clone();
        and.retain(&b);
        assert_eq!(indices(&and), vec![2, 3, 8000]);

        let mut and_not = a.clone();
        and_not.remove(&b);
        assert_eq!(indices(&and_not), vec![1, 500]);

        let mut or = a.clone();
        or.join(&b);
        assert_eq!(indices(&or), vec![1, 2, 3, 4, 500, 8000]);
    }

    #[test]
    fn test_reverse_twice_is_identity() {
        let mut v = vector_of(&[0, 77, 8191]);
        v.reverse();
        assert_eq!(v.count(), VECTOR_BITS as u64 - 3);
        assert!(!v.is_set(77));
        v.reverse();
        assert_eq!(indices(&v), vec![0, 77, 8191]);
    }

    #[test]
    fn test_full_vector_encodes_to_four_bytes() {
        let mut v = BitVector::new();
        v.set_range(0, VECTOR_BITS - 1);
        assert!(v.is_full());

        let mut w = ByteWriter::new();
        v.encode(&mut w);
        assert_eq!(w.as_slice(), &[0xFF, 0xFF, 0xFF, 0xFF]);

        let back = BitVector::decode(w.as_slice()).unwrap();
        assert!(back.is_full());
        assert!(!back.is_dirty());
    }

    #[test]
    fn test_encode_only_used_span() {
        let v = vector_of(&[64 * 10 + 1, 64 * 12]);
        let mut w = ByteWriter::new();
        v.encode(&mut w);
        // count + start + 3 words
        assert_eq!(w.len(), 4 + 4 + 3 * 8);

        let back = BitVector::decode(w.as_slice()).unwrap();
        assert_eq!(indices(&back), indices(&v));
    }

    #[test]
    fn test_decode_rejects_bad_span() {
        let mut w = ByteWriter::new();
        w.write_i32(4);
        w.write_i32(126);
        assert!(matches!(
            BitVector::decode(w.as_slice()),
            Err(StorageError::Corruption(_))
        ));

        let mut w = ByteWriter::new();
        w.write_i32(1);
        w.write_i32(0);
        // missing word
        assert!(BitVector::decode(w.as_slice()).is_err());
    }
}
