use crate::error::J2kError;

/// Bit-granular cursor used for packet headers.
///
/// Bits are read MSB first. When bit stuffing is enabled, a byte following
/// 0xFF contributes only its 7 low bits, matching how encoders avoid
/// emulating markers inside packet headers.
pub struct PacketBitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u8,
    bit_stuffing: bool,
}

impl<'a> PacketBitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
            bit_stuffing: false,
        }
    }

    /// Reader with packet-header bit stuffing enabled.
    pub fn with_bit_stuffing(data: &'a [u8]) -> Self {
        Self {
            bit_stuffing: true,
            ..Self::new(data)
        }
    }

    pub fn read_bit(&mut self) -> Result<u32, J2kError> {
        let byte = *self
            .data
            .get(self.byte_pos)
            .ok_or(J2kError::UnexpectedEndOfData)?;
        let bit = (byte >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.next_byte();
        }
        Ok(bit as u32)
    }

    /// Reads `count` bits as a big-endian unsigned integer.
    pub fn read_bits(&mut self, count: u32) -> Result<u32, J2kError> {
        if count > 32 {
            return Err(J2kError::InvalidBitCount(count));
        }
        let mut bits = 0u32;
        for _ in 0..count {
            bits = (bits << 1) | self.read_bit()?;
        }
        Ok(bits)
    }

    /// Drops the unread bits of a partially consumed byte.
    pub fn align_to_byte(&mut self) {
        if self.bit_pos != 0 {
            self.next_byte();
        }
    }

    /// Aligns, then returns the next `count` raw bytes.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], J2kError> {
        self.align_to_byte();
        let end = self
            .byte_pos
            .checked_add(count)
            .filter(|&end| end <= self.data.len())
            .ok_or(J2kError::UnexpectedEndOfData)?;
        let bytes = &self.data[self.byte_pos..end];
        self.byte_pos = end;
        self.bit_pos = 0;
        Ok(bytes)
    }

    /// Returns the next two bytes without consuming them, if aligned.
    pub fn peek_u16(&self) -> Option<u16> {
        if self.bit_pos != 0 {
            return None;
        }
        let hi = *self.data.get(self.byte_pos)?;
        let lo = *self.data.get(self.byte_pos + 1)?;
        Some(((hi as u16) << 8) | lo as u16)
    }

    pub fn position(&self) -> usize {
        self.byte_pos
    }

    pub fn has_data(&self) -> bool {
        self.byte_pos < self.data.len()
    }

    fn next_byte(&mut self) {
        let finished = self.data.get(self.byte_pos).copied();
        self.byte_pos += 1;
        self.bit_pos = if self.bit_stuffing && finished == Some(0xFF) {
            1
        } else {
            0
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bits_matches_sequential_bits() {
        let data = [0b1011_0011, 0b0101_1100, 0xE7];
        for skip in 0..8 {
            let mut a = PacketBitReader::new(&data);
            let mut b = PacketBitReader::new(&data);
            a.read_bits(skip).unwrap();
            b.read_bits(skip).unwrap();
            let folded = (0..8).fold(0u32, |acc, _| (acc << 1) | a.read_bit().unwrap());
            assert_eq!(b.read_bits(8).unwrap(), folded, "skip {}", skip);
        }
    }

    #[test]
    fn test_align_skips_to_next_byte() {
        let data = [0b0111_1111, 0b1000_0000];
        for k in 1..8 {
            let mut reader = PacketBitReader::new(&data);
            reader.read_bits(k).unwrap();
            reader.align_to_byte();
            assert_eq!(reader.read_bit().unwrap(), 1, "k = {}", k);
            assert_eq!(reader.position(), 1);
        }

        // Aligned readers stay put.
        let mut reader = PacketBitReader::new(&data);
        reader.align_to_byte();
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn test_read_bytes_aligns_first() {
        let data = [0xA0, 0x11, 0x22, 0x33];
        let mut reader = PacketBitReader::new(&data);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bytes(2).unwrap(), &[0x11, 0x22]);
        assert_eq!(reader.read_bits(8).unwrap(), 0x33);
        assert!(!reader.has_data());
    }

    #[test]
    fn test_out_of_data() {
        let data = [0xFF];
        let mut reader = PacketBitReader::new(&data);
        assert_eq!(reader.read_bits(8).unwrap(), 0xFF);
        assert_eq!(reader.read_bit(), Err(J2kError::UnexpectedEndOfData));
        assert_eq!(reader.read_bytes(1), Err(J2kError::UnexpectedEndOfData));
        assert_eq!(
            PacketBitReader::new(&data).read_bits(33),
            Err(J2kError::InvalidBitCount(33))
        );
    }

    #[test]
    fn test_bit_stuffing_after_ff() {
        // 0xFF then a byte whose MSB is a stuffed zero.
        let data = [0xFF, 0x7F, 0x80];
        let mut reader = PacketBitReader::with_bit_stuffing(&data);
        assert_eq!(reader.read_bits(8).unwrap(), 0xFF);
        assert_eq!(reader.read_bits(7).unwrap(), 0x7F);
        assert_eq!(reader.read_bit().unwrap(), 1);

        // Plain mode sees the stuffed bit.
        let mut plain = PacketBitReader::new(&data);
        plain.read_bits(8).unwrap();
        assert_eq!(plain.read_bit().unwrap(), 0);
    }

    #[test]
    fn test_align_after_ff_consumes_stuffed_byte() {
        let data = [0xFF, 0x00, 0x42];
        let mut reader = PacketBitReader::with_bit_stuffing(&data);
        reader.read_bits(8).unwrap();
        reader.align_to_byte();
        assert_eq!(reader.read_bytes(1).unwrap(), &[0x42]);
    }
}
