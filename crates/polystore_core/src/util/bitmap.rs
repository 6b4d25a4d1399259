use std::fmt;

/// An LSB ordered bitmap.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Bitmap {
    len: usize,
    data: Vec<u8>,
}

impl Bitmap {
    pub fn new_with_all_false(len: usize) -> Self {
        let cap = len.div_ceil(8);
        Bitmap {
            len,
            data: vec![0; cap],
        }
    }

    /// Get the number of bits being tracked by this bitmap.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if this bitmap is empty.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Resets all bits in the bitmap to some initial value.
    pub fn reset(&mut self, value: bool) {
        if value {
            self.data.iter_mut().for_each(|v| *v = u8::MAX);
        } else {
            self.data.iter_mut().for_each(|v| *v = 0);
        }
    }

    pub fn count_trues(&self) -> usize {
        (0..self.len).filter(|&idx| self.value(idx)).count()
    }

    /// Get the value at index.
    ///
    /// Panics if index is out of bounds.
    #[inline]
    pub fn value(&self, idx: usize) -> bool {
        let byte = self.data[idx >> 3]; // Equivalent to idx / 8
        (byte >> (idx & 7)) & 1 != 0 // `idx & 7` equivalent to `idx % 8`
    }

    /// Set a bit at index.
    ///
    /// Panics if index is out of bounds.
    #[inline]
    pub fn set_unchecked(&mut self, idx: usize, val: bool) {
        let byte = idx / 8;
        let bit = idx & 7; // Same as idx % 8
        if val {
            self.data[byte] |= 1 << bit;
        } else {
            self.data[byte] &= !(1 << bit);
        }
    }

    /// Bitwise OR `other` into self.
    ///
    /// Panics if the lengths differ.
    pub fn bit_or_mut(&mut self, other: &Bitmap) {
        assert_eq!(self.len, other.len, "Bitmap lengths must match");
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a |= *b;
        }
    }

    /// Iterate over indices where the bit is unset.
    pub fn unset_indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(|&idx| !self.value(idx))
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries((0..self.len).map(|idx| self.value(idx)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_count() {
        let mut bm = Bitmap::new_with_all_false(10);
        bm.set_unchecked(0, true);
        bm.set_unchecked(9, true);
        assert_eq!(2, bm.count_trues());
        assert!(bm.value(9));
        assert!(!bm.value(8));

        bm.set_unchecked(9, false);
        assert_eq!(1, bm.count_trues());
    }

    #[test]
    fn reset_true_respects_len() {
        let mut bm = Bitmap::new_with_all_false(3);
        bm.reset(true);
        assert_eq!(3, bm.count_trues());
    }

    #[test]
    fn or_and_unset() {
        let mut a = Bitmap::new_with_all_false(5);
        let mut b = Bitmap::new_with_all_false(5);
        a.set_unchecked(1, true);
        b.set_unchecked(3, true);
        a.bit_or_mut(&b);
        assert_eq!(vec![0, 2, 4], a.unset_indices().collect::<Vec<_>>());
    }
}
