/// One bit per allocatable unit, 1 = in use. Bit `i` lives in byte `i / 8`
/// at position `i % 8`, the same layout as on disk.
pub struct Bitmap {
    bits: Vec<u8>,
}

impl Bitmap {
    pub fn from_bytes(bits: Vec<u8>) -> Self {
        Self { bits }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bits
    }

    pub fn test(&self, bit_idx: usize) -> bool {
        let byte = bit_idx / 8;
        let bit = bit_idx % 8;
        self.bits[byte] & (1 << bit) != 0
    }

    /// Look for `cnt` consecutive clear bits, return the index of the first one.
    pub fn scan(&self, cnt: usize) -> Option<usize> {
        assert!(cnt > 0);
        // skip the bytes already full
        let idx_byte = self.bits.iter().position(|&b| b != 0xff)?;
        let idx_bit = (0..8).find(|bit| self.bits[idx_byte] & (1 << bit) == 0)?;
        let start = idx_byte * 8 + idx_bit;
        if cnt == 1 {
            return Some(start);
        }

        let total = self.bits.len() * 8;
        let mut count = 1;
        let mut next_bit = start + 1;
        while next_bit < total {
            if self.test(next_bit) {
                count = 0;
            } else {
                count += 1;
            }
            if count == cnt {
                return Some(next_bit + 1 - cnt);
            }
            next_bit += 1;
        }
        None
    }

    pub fn set(&mut self, bit_idx: usize, value: bool) {
        let byte = bit_idx / 8;
        let mask = 1 << (bit_idx % 8);
        if value {
            self.bits[byte] |= mask;
        } else {
            self.bits[byte] &= !mask;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_skips_full_bytes() {
        let mut bm = Bitmap::from_bytes(vec![0xff, 0x0f, 0]);
        assert_eq!(bm.scan(1), Some(12));
        bm.set(12, true);
        assert!(bm.test(12));
        assert_eq!(bm.scan(1), Some(13));
        bm.set(12, false);
        assert!(!bm.test(12));
    }

    #[test]
    fn scan_finds_runs() {
        let mut bm = Bitmap::from_bytes(vec![0; 2]);
        bm.set(1, true);
        bm.set(4, true);
        // 0 is free but 0..3 is interrupted by bit 1
        assert_eq!(bm.scan(3), Some(5));
        assert_eq!(bm.scan(2), Some(2));
        assert_eq!(bm.scan(16), None);
    }

    #[test]
    fn exhausted_bitmap_has_nothing() {
        let mut bm = Bitmap::from_bytes(vec![0xff; 4]);
        assert_eq!(bm.scan(1), None);
        bm.set(31, false);
        assert_eq!(bm.scan(1), Some(31));
        assert_eq!(bm.scan(2), None);
    }
}
