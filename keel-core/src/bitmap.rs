use std::sync::Arc;

/// Immutable validity bitmap: bit set = value present, bit unset = null.
///
/// Bits are stored little-endian within each `u64` word. The word storage is
/// shared, so slicing only adjusts `offset`/`len`.
#[derive(Clone, Debug)]
pub struct Bitmap {
    words: Arc<[u64]>,
    offset: usize,
    len: usize,
    unset: usize,
}

impl Bitmap {
    pub fn from_bools(bits: &[bool]) -> Self {
        let mut builder = MutableBitmap::with_capacity(bits.len());
        for &b in bits {
            builder.push(b);
        }
        builder.freeze()
    }

    pub fn new_set(len: usize) -> Self {
        let mut builder = MutableBitmap::with_capacity(len);
        builder.extend_constant(len, true);
        builder.freeze()
    }

    pub fn new_unset(len: usize) -> Self {
        let mut builder = MutableBitmap::with_capacity(len);
        builder.extend_constant(len, false);
        builder.freeze()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, i: usize) -> bool {
        debug_assert!(i < self.len);
        let bit = self.offset + i;
        (self.words[bit / 64] >> (bit % 64)) & 1 == 1
    }

    /// Number of unset (null) bits.
    pub fn unset_bits(&self) -> usize {
        self.unset
    }

    pub fn set_bits(&self) -> usize {
        self.len - self.unset
    }

    pub fn slice(&self, offset: usize, len: usize) -> Bitmap {
        debug_assert!(offset + len <= self.len);
        let mut sliced = Bitmap {
            words: Arc::clone(&self.words),
            offset: self.offset + offset,
            len,
            unset: 0,
        };
        sliced.unset = len - sliced.iter().filter(|b| *b).count();
        sliced
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }

    /// Bitwise AND; both bitmaps must have the same length.
    pub fn and(&self, other: &Bitmap) -> Bitmap {
        debug_assert_eq!(self.len, other.len);
        let mut builder = MutableBitmap::with_capacity(self.len);
        for i in 0..self.len {
            builder.push(self.get(i) && other.get(i));
        }
        builder.freeze()
    }
}

impl PartialEq for Bitmap {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

/// Growable bitmap used while a column is being built.
#[derive(Debug, Default)]
pub struct MutableBitmap {
    words: Vec<u64>,
    len: usize,
    unset: usize,
}

impl MutableBitmap {
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            words: Vec::with_capacity((bits + 63) / 64),
            len: 0,
            unset: 0,
        }
    }

    #[inline]
    pub fn push(&mut self, value: bool) {
        let bit = self.len % 64;
        if bit == 0 {
            self.words.push(0);
        }
        if value {
            if let Some(last) = self.words.last_mut() {
                *last |= 1u64 << bit;
            }
        } else {
            self.unset += 1;
        }
        self.len += 1;
    }

    pub fn extend_constant(&mut self, additional: usize, value: bool) {
        for _ in 0..additional {
            self.push(value);
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn unset_bits(&self) -> usize {
        self.unset
    }

    pub fn freeze(self) -> Bitmap {
        Bitmap {
            words: self.words.into(),
            offset: 0,
            len: self.len,
            unset: self.unset,
        }
    }

    /// Freezes into `None` when every bit is set, the representation columns
    /// use for "no nulls".
    pub fn into_validity(self) -> Option<Bitmap> {
        if self.unset == 0 {
            None
        } else {
            Some(self.freeze())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_get_across_word_boundary() {
        let mut builder = MutableBitmap::with_capacity(130);
        for i in 0..130 {
            builder.push(i % 3 != 0);
        }
        let bitmap = builder.freeze();
        assert_eq!(bitmap.len(), 130);
        for i in 0..130 {
            assert_eq!(bitmap.get(i), i % 3 != 0, "bit {}", i);
        }
        assert_eq!(bitmap.unset_bits(), (0..130).filter(|i| i % 3 == 0).count());
    }

    #[test]
    fn test_slice_shares_words_and_recounts() {
        let bitmap = Bitmap::from_bools(&[true, false, true, true, false, true]);
        let sliced = bitmap.slice(1, 4);
        assert_eq!(sliced.iter().collect::<Vec<_>>(), vec![false, true, true, false]);
        assert_eq!(sliced.unset_bits(), 2);
        assert!(Arc::ptr_eq(&bitmap.words, &sliced.words));
    }

    #[test]
    fn test_and() {
        let a = Bitmap::from_bools(&[true, true, false]);
        let b = Bitmap::from_bools(&[true, false, false]);
        assert_eq!(a.and(&b), Bitmap::from_bools(&[true, false, false]));
    }

    #[test]
    fn test_into_validity_drops_all_set() {
        let mut builder = MutableBitmap::default();
        builder.extend_constant(10, true);
        assert!(builder.into_validity().is_none());
    }
}
