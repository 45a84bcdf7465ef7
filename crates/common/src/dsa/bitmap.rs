/// Number of bytes needed to hold `bits` flags.
pub const fn byte_len(bits: usize) -> usize {
    (bits + 7) >> 3
}

pub struct BitmapMut<'a>(&'a mut [u8]);

impl<'a> BitmapMut<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self(bytes)
    }

    pub fn set(&mut self, idx: usize) {
        self.0[idx >> 3] |= 1 << (idx & 7);
    }

    pub fn unset(&mut self, idx: usize) {
        self.0[idx >> 3] &= !(1 << (idx & 7));
    }

    pub fn assign(&mut self, idx: usize, flag: bool) {
        if flag {
            self.set(idx)
        } else {
            self.unset(idx)
        }
    }
}

pub struct Bitmap<'a>(&'a [u8]);

impl<'a> Bitmap<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self(bytes)
    }

    pub fn is_set(&self, idx: usize) -> bool {
        (self.0[idx >> 3] >> (idx & 7)) & 1 == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_unset() {
        let mut bytes = [0u8; byte_len(12)];
        assert_eq!(bytes.len(), 2);

        let mut map = BitmapMut::new(&mut bytes);
        map.set(0);
        map.set(9);
        map.assign(11, true);
        map.unset(0);

        let map = Bitmap::new(&bytes);
        assert!(!map.is_set(0));
        assert!(map.is_set(9));
        assert!(map.is_set(11));
        assert!(!map.is_set(10));
    }
}
