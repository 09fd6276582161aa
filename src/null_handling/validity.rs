// --- IN: src/null_handling/validity.rs ---

//! The bit-packed validity (null) mask used throughout the engine.
//!
//! A mask is either the all-valid sentinel (no memory at all, the common case) or
//! a word array with one bit per row, `1 = valid`. Word arrays are reference
//! counted: cloning a mask, adopting another mask in `combine`, or slicing at
//! offset 0 all share the same words. The first mutation through a shared mask
//! clones the words (`Arc::make_mut`), so a mask aliased elsewhere is never
//! changed behind its other owners' backs.

use std::sync::Arc;

use arrow::buffer::{BooleanBuffer, Buffer, NullBuffer};

use crate::config::STANDARD_VECTOR_SIZE;

/// One storage word of a validity mask.
pub type ValidityWord = u64;

/// Number of rows covered by one `ValidityWord`.
pub const BITS_PER_WORD: usize = ValidityWord::BITS as usize;

/// A word with every row valid.
const ALL_VALID_WORD: ValidityWord = ValidityWord::MAX;

/// Number of words needed to cover `count` rows.
#[inline]
pub fn word_count(count: usize) -> usize {
    count.div_ceil(BITS_PER_WORD)
}

#[derive(Debug, Clone)]
pub struct ValidityMask {
    words: Option<Arc<Vec<ValidityWord>>>,
    capacity: usize,
}

impl Default for ValidityMask {
    fn default() -> Self {
        Self::with_capacity(STANDARD_VECTOR_SIZE)
    }
}

impl ValidityMask {
    /// An all-valid mask that will materialize `capacity` rows on first mutation.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            words: None,
            capacity,
        }
    }

    /// Builds a mask from an Arrow null buffer. Buffers without nulls stay in the
    /// sentinel state.
    pub fn from_null_buffer(nulls: Option<&NullBuffer>, count: usize) -> Self {
        let Some(nulls) = nulls.filter(|nulls| nulls.null_count() > 0) else {
            return Self::with_capacity(count);
        };
        let covered = count.min(nulls.len());
        let bits = nulls.inner().slice(0, covered).sliced();
        let mut mask = Self::from_bitmap_bytes(bits.as_slice(), covered);
        if covered < count {
            mask.resize(covered, count);
        }
        mask
    }

    /// Builds a mask from a little-endian bitmap, the layout used for in-block
    /// validity. Only the first `count` rows are meaningful.
    pub fn from_bitmap_bytes(bytes: &[u8], count: usize) -> Self {
        let needed_words = word_count(count);
        let mut words = Vec::with_capacity(needed_words);
        for chunk in bytes.chunks(std::mem::size_of::<ValidityWord>()).take(needed_words) {
            let mut raw = [0xFFu8; 8];
            raw[..chunk.len()].copy_from_slice(chunk);
            words.push(bytemuck::pod_read_unaligned::<ValidityWord>(&raw));
        }
        words.resize(needed_words, ALL_VALID_WORD);
        let mask = Self {
            words: Some(Arc::new(words)),
            capacity: count,
        };
        if mask.count_valid(count) == count {
            Self::with_capacity(count)
        } else {
            mask
        }
    }

    /// Converts the first `count` rows into an Arrow null buffer, or `None` if every
    /// one of them is valid.
    pub fn to_null_buffer(&self, count: usize) -> Option<NullBuffer> {
        let words = self.words.as_ref()?;
        if self.count_valid(count) == count {
            return None;
        }
        let mut owned: Vec<ValidityWord> = words.iter().copied().take(word_count(count)).collect();
        owned.resize(word_count(count), ALL_VALID_WORD);
        let bits = BooleanBuffer::new(Buffer::from_vec(owned), 0, count);
        Some(NullBuffer::new(bits))
    }

    //==============================================================================
    // Inspection
    //==============================================================================

    /// `true` iff no bit array is materialized.
    #[inline]
    pub fn is_all_valid(&self) -> bool {
        self.words.is_none()
    }

    #[inline]
    pub fn row_is_valid(&self, row: usize) -> bool {
        match &self.words {
            None => true,
            Some(words) => match words.get(row / BITS_PER_WORD) {
                Some(word) => (word >> (row % BITS_PER_WORD)) & 1 == 1,
                None => true,
            },
        }
    }

    /// Number of valid rows among the first `count`.
    pub fn count_valid(&self, count: usize) -> usize {
        match &self.words {
            None => count,
            Some(words) => {
                let full = count / BITS_PER_WORD;
                let rest = count % BITS_PER_WORD;
                // Rows past the materialized words are valid.
                let mut valid = full.saturating_sub(words.len()) * BITS_PER_WORD;
                valid += words
                    .iter()
                    .take(full)
                    .map(|word| word.count_ones() as usize)
                    .sum::<usize>();
                if rest > 0 {
                    valid += match words.get(full) {
                        Some(word) => {
                            let low_bits: ValidityWord = (1 << rest) - 1;
                            (word & low_bits).count_ones() as usize
                        }
                        None => rest,
                    };
                }
                valid
            }
        }
    }

    /// The number of rows materialization will cover.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `true` if the materialized words are also referenced by another mask.
    pub fn is_shared(&self) -> bool {
        self.words
            .as_ref()
            .map(|words| Arc::strong_count(words) > 1)
            .unwrap_or(false)
    }

    /// `true` if both masks reference the identical underlying word array.
    pub fn shares_storage_with(&self, other: &ValidityMask) -> bool {
        match (&self.words, &other.words) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    //==============================================================================
    // Mutation
    //==============================================================================

    /// Returns the mutable word array, materializing it (all valid) or detaching it
    /// from other owners first.
    fn words_mut(&mut self) -> &mut Vec<ValidityWord> {
        let capacity = self.capacity;
        let words = self
            .words
            .get_or_insert_with(|| Arc::new(vec![ALL_VALID_WORD; word_count(capacity)]));
        let words = Arc::make_mut(words);
        if words.len() < word_count(capacity) {
            words.resize(word_count(capacity), ALL_VALID_WORD);
        }
        words
    }

    /// Grows the mask so that `row` is addressable.
    fn ensure_row(&mut self, row: usize) {
        if row >= self.capacity {
            let new_capacity = (row + 1).max(self.capacity * 2);
            let old_capacity = self.capacity;
            self.resize(old_capacity, new_capacity);
        }
    }

    pub fn set_invalid(&mut self, row: usize) {
        self.ensure_row(row);
        let words = self.words_mut();
        words[row / BITS_PER_WORD] &= !((1 as ValidityWord) << (row % BITS_PER_WORD));
    }

    pub fn set_valid(&mut self, row: usize) {
        if self.is_all_valid() {
            return;
        }
        self.ensure_row(row);
        let words = self.words_mut();
        words[row / BITS_PER_WORD] |= (1 as ValidityWord) << (row % BITS_PER_WORD);
    }

    /// Materializes the mask and marks the first `count` rows valid.
    pub fn set_all_valid(&mut self, count: usize) {
        if count > self.capacity {
            let old_capacity = self.capacity;
            self.capacity = count;
            self.resize(old_capacity, count);
        }
        let words = self.words_mut();
        let full_words = count / BITS_PER_WORD;
        words[..full_words].fill(ALL_VALID_WORD);
        let rest = count % BITS_PER_WORD;
        if rest > 0 {
            words[full_words] |= ((1 as ValidityWord) << rest) - 1;
        }
    }

    /// Materializes the mask and marks the first `count` rows invalid.
    pub fn set_all_invalid(&mut self, count: usize) {
        if count > self.capacity {
            let old_capacity = self.capacity;
            self.capacity = count;
            self.resize(old_capacity, count);
        }
        let words = self.words_mut();
        let full_words = count / BITS_PER_WORD;
        words[..full_words].fill(0);
        let rest = count % BITS_PER_WORD;
        if rest > 0 {
            words[full_words] &= !(((1 as ValidityWord) << rest) - 1);
        }
    }

    /// Bitwise AND of `self` with `other` over the first `count` rows.
    pub fn combine(&mut self, other: &ValidityMask, count: usize) {
        if other.is_all_valid() {
            // X & 1 = X
            return;
        }
        if self.is_all_valid() {
            // 1 & Y = Y
            self.words = other.words.clone();
            self.capacity = self.capacity.max(other.capacity);
            return;
        }
        if self.shares_storage_with(other) {
            // X & X = X
            return;
        }
        let (Some(ours), Some(theirs)) = (&self.words, &other.words) else {
            return;
        };
        let combined: Vec<ValidityWord> = (0..word_count(count).max(ours.len()))
            .map(|idx| {
                let a = ours.get(idx).copied().unwrap_or(ALL_VALID_WORD);
                if idx < word_count(count) {
                    a & theirs.get(idx).copied().unwrap_or(ALL_VALID_WORD)
                } else {
                    a
                }
            })
            .collect();
        self.capacity = self.capacity.max(count);
        self.words = Some(Arc::new(combined));
    }

    /// Grows a materialized mask from `old_size` to `new_size` rows, preserving the
    /// existing bits and marking the new rows valid. No-op on the sentinel.
    pub fn resize(&mut self, old_size: usize, new_size: usize) {
        if new_size > self.capacity {
            self.capacity = new_size;
        }
        let Some(words) = &self.words else {
            return;
        };
        let new_words = word_count(new_size);
        let old_words = word_count(old_size).min(words.len()).min(new_words);
        let mut resized = vec![ALL_VALID_WORD; new_words.max(old_words)];
        resized[..old_words].copy_from_slice(&words[..old_words]);
        // Rows past `old_size` inside the last preserved word become valid too.
        let rest = old_size % BITS_PER_WORD;
        if rest > 0 && old_words > 0 && old_words == word_count(old_size) {
            resized[old_words - 1] |= ALL_VALID_WORD << rest;
        }
        self.words = Some(Arc::new(resized));
    }

    /// Makes `self` represent `other`'s rows starting at `offset`, re-based to row 0.
    pub fn slice(&mut self, other: &ValidityMask, offset: usize) {
        let Some(source) = &other.words else {
            self.words = None;
            self.capacity = other.capacity.saturating_sub(offset);
            return;
        };
        if offset == 0 {
            self.words = other.words.clone();
            self.capacity = other.capacity;
            return;
        }
        let entire_words = offset / BITS_PER_WORD;
        let sub_bits = offset % BITS_PER_WORD;
        let word_at = |idx: usize| source.get(idx).copied().unwrap_or(ALL_VALID_WORD);

        let shifted: Vec<ValidityWord> = (0..source.len())
            .map(|idx| {
                let low = word_at(idx + entire_words);
                if sub_bits == 0 {
                    return low;
                }
                // Stitch the low bits of the next word onto the top of this one.
                let high = word_at(idx + entire_words + 1);
                (low >> sub_bits) | (high << (BITS_PER_WORD - sub_bits))
            })
            .collect();
        self.capacity = other.capacity.saturating_sub(offset);
        self.words = Some(Arc::new(shifted));
    }

    /// Convenience form of [`ValidityMask::slice`] returning a new mask.
    pub fn sliced(&self, offset: usize) -> ValidityMask {
        let mut result = ValidityMask::with_capacity(self.capacity);
        result.slice(self, offset);
        result
    }

    /// Diagnostic rendering: `.` for valid rows and `X` for invalid ones.
    pub fn to_display_string(&self, count: usize) -> String {
        let mut result = format!("Validity Mask ({}) [", count);
        for row in 0..count {
            result.push(if self.row_is_valid(row) { '.' } else { 'X' });
        }
        result.push(']');
        result
    }
}
