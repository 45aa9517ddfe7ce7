use byteorder::{BigEndian, ByteOrder};

use crate::midi::Error;

/// Sequential big-endian reader over a borrowed byte slice.
///
/// Every read either consumes exactly the bytes it decodes or fails with
/// [`Error::UnexpectedEof`] and leaves the position untouched.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Reader { data, position: 0 }
    }

    /// Current offset into the underlying slice.
    pub fn position(&self) -> usize {
        self.position
    }

    /// True once every byte has been consumed.
    pub fn eof(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Read the next `length` bytes.
    pub fn read(&mut self, length: usize) -> Result<&'a [u8], Error> {
        let end = self
            .position
            .checked_add(length)
            .filter(|&end| end <= self.data.len())
            .ok_or(Error::UnexpectedEof {
                offset: self.position,
                needed: length,
            })?;
        let bytes = &self.data[self.position..end];
        self.position = end;

        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.read(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, Error> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(BigEndian::read_u16(self.read(2)?))
    }

    pub fn read_u24(&mut self) -> Result<u32, Error> {
        Ok(BigEndian::read_u24(self.read(3)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(BigEndian::read_u32(self.read(4)?))
    }

    /// Read a MIDI variable-length quantity: big-endian groups of 7 bits,
    /// with the top bit set on every byte except the last.
    pub fn read_var_int(&mut self) -> Result<u32, Error> {
        let mut value: u32 = 0;
        loop {
            let byte = self.read_u8()?;
            value = (value << 7) | u32::from(byte & 0x7f);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
    }
}
