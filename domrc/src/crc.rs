/// CRC-16/CCITT-FALSE accumulator: polynomial 0x1021, initial value 0xFFFF,
/// most-significant-bit-first, no final xor.
#[derive(Debug, Clone)]
pub struct Crc16 {
    value: u16,
}

const POLYNOMIAL: u16 = 0x1021;

impl Crc16 {
    pub fn new() -> Crc16 {
        Crc16 { value: 0xFFFF }
    }

    pub fn accumulate(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.value ^= (byte as u16) << 8;
            for _ in 0..8 {
                if self.value & 0x8000 != 0 {
                    self.value = (self.value << 1) ^ POLYNOMIAL;
                } else {
                    self.value <<= 1;
                }
            }
        }
    }

    pub fn value(&self) -> u16 {
        self.value
    }
}

impl Default for Crc16 {
    fn default() -> Crc16 {
        Crc16::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn crc_check_vector() {
        // standard CCITT-FALSE check value
        let mut crc = Crc16::new();
        crc.accumulate(b"123456789");
        assert_eq!(crc.value(), 0x29B1);
    }

    #[test]
    fn crc_accumulates_across_slices() {
        let mut split = Crc16::new();
        split.accumulate(b"1234");
        split.accumulate(b"56789");
        let mut whole = Crc16::new();
        whole.accumulate(b"123456789");
        assert_eq!(split.value(), whole.value());
    }

    #[test]
    fn crc_empty_is_initial() {
        let crc = Crc16::new();
        assert_eq!(crc.value(), 0xFFFF);
    }
}
