use crate::error::prelude::*;

/// Fixed-size serialization buffer. All multi-byte writers store
/// little-endian and return the advanced write position, so field writes
/// chain as `pos = buffer.write_u16(value, pos)`.
#[derive(Debug, Default, Clone)]
pub struct BinaryBuffer {
    data: Vec<u8>,
}

impl BinaryBuffer {
    pub fn new() -> BinaryBuffer {
        BinaryBuffer { data: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Resizes the buffer; new bytes are zero.
    pub fn set_len(&mut self, length: usize) {
        self.data.resize(length, 0);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn write_u8(&mut self, value: u8, pos: usize) -> usize {
        self.data[pos] = value;
        pos + 1
    }

    pub fn write_u16(&mut self, value: u16, pos: usize) -> usize {
        self.data[pos] = value as u8;
        self.data[pos + 1] = (value >> 8) as u8;
        pos + 2
    }

    pub fn write_u32(&mut self, value: u32, pos: usize) -> usize {
        self.data[pos] = value as u8;
        self.data[pos + 1] = (value >> 8) as u8;
        self.data[pos + 2] = (value >> 16) as u8;
        self.data[pos + 3] = (value >> 24) as u8;
        pos + 4
    }

    pub fn write_bytes(&mut self, bytes: &[u8], pos: usize) -> usize {
        self.data[pos..pos + bytes.len()].copy_from_slice(bytes);
        pos + bytes.len()
    }
}

/// Streaming reader over a loaded file. Plain readers are big-endian (Java
/// class files); the `_le` variants serve the little-endian resource
/// formats (RIFF, BMP, FNT).
#[derive(Debug)]
pub struct ByteReader {
    data: Vec<u8>,
    position: usize,
}

impl ByteReader {
    pub fn new(data: Vec<u8>) -> ByteReader {
        ByteReader { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    pub fn skip(&mut self, count: usize) {
        self.position += count;
    }

    pub fn read_u8(&mut self) -> BuildResult<u8> {
        if self.position >= self.data.len() {
            return Err(BuildError::UnexpectedEndOfData);
        }
        let value = self.data[self.position];
        self.position += 1;
        Ok(value)
    }

    pub fn read_bytes(&mut self, count: usize) -> BuildResult<&[u8]> {
        if self.position + count > self.data.len() {
            return Err(BuildError::UnexpectedEndOfData);
        }
        let slice = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    pub fn read_u16(&mut self) -> BuildResult<u16> {
        let high = self.read_u8()? as u16;
        let low = self.read_u8()? as u16;
        Ok((high << 8) | low)
    }

    pub fn read_u32(&mut self) -> BuildResult<u32> {
        let high = self.read_u16()? as u32;
        let low = self.read_u16()? as u32;
        Ok((high << 16) | low)
    }

    pub fn read_i32(&mut self) -> BuildResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_i64(&mut self) -> BuildResult<i64> {
        let high = self.read_u32()? as u64;
        let low = self.read_u32()? as u64;
        Ok(((high << 32) | low) as i64)
    }

    pub fn read_f32(&mut self) -> BuildResult<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> BuildResult<f64> {
        Ok(f64::from_bits(self.read_i64()? as u64))
    }

    pub fn read_u16_le(&mut self) -> BuildResult<u16> {
        let low = self.read_u8()? as u16;
        let high = self.read_u8()? as u16;
        Ok((high << 8) | low)
    }

    pub fn read_u32_le(&mut self) -> BuildResult<u32> {
        let low = self.read_u16_le()? as u32;
        let high = self.read_u16_le()? as u32;
        Ok((high << 16) | low)
    }

    pub fn read_i32_le(&mut self) -> BuildResult<i32> {
        Ok(self.read_u32_le()? as i32)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn buffer_writes_little_endian() {
        let mut buffer = BinaryBuffer::new();
        buffer.set_len(8);
        let pos = buffer.write_u16(0x1234, 0);
        assert_eq!(pos, 2);
        let pos = buffer.write_u32(0xAABBCCDD, pos);
        assert_eq!(pos, 6);
        let pos = buffer.write_bytes(&[0x01, 0x02], pos);
        assert_eq!(pos, 8);
        assert_eq!(
            buffer.as_slice(),
            &[0x34, 0x12, 0xDD, 0xCC, 0xBB, 0xAA, 0x01, 0x02]
        );
    }

    #[test]
    fn buffer_resize_zero_fills() {
        let mut buffer = BinaryBuffer::new();
        buffer.set_len(3);
        buffer.write_bytes(&[0xFF, 0xFF, 0xFF], 0);
        buffer.set_len(5);
        assert_eq!(buffer.as_slice(), &[0xFF, 0xFF, 0xFF, 0x00, 0x00]);
    }

    #[test]
    fn reader_big_endian() {
        let mut reader = ByteReader::new(vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x21]);
        assert_eq!(reader.read_u32(), Ok(0xCAFEBABE));
        assert_eq!(reader.read_u16(), Ok(0x0021));
        assert_eq!(reader.read_u8(), Err(BuildError::UnexpectedEndOfData));
    }

    #[test]
    fn reader_little_endian_helpers() {
        let mut reader = ByteReader::new(vec![0x52, 0x49, 0x46, 0x46, 0x34, 0x12]);
        assert_eq!(reader.read_u32_le(), Ok(0x46464952));
        assert_eq!(reader.read_u16_le(), Ok(0x1234));
    }

    #[test]
    fn reader_seek_and_bounds() {
        let mut reader = ByteReader::new(vec![1, 2, 3, 4]);
        reader.seek(2);
        assert_eq!(reader.read_u8(), Ok(3));
        reader.seek(100);
        assert_eq!(reader.read_u8(), Err(BuildError::UnexpectedEndOfData));
        assert_eq!(reader.read_bytes(1), Err(BuildError::UnexpectedEndOfData));
    }
}
