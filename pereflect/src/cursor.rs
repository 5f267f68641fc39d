//! Sequential reading of little-endian binary structures from a seekable byte source.


use std::io::{self, Read, Seek, SeekFrom};

use tracing::trace;

use crate::error::{Error, FormatError, Result};
use crate::guid::Guid;


/// A cursor over a seekable byte source.
///
/// Every read advances the position by exactly the number of bytes consumed. Reading past the end
/// of the source fails with [`Error::Truncated`].
#[derive(Debug)]
pub struct BinaryCursor<R> {
    reader: R,
}
impl<R: Read + Seek> BinaryCursor<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.reader.stream_position()?)
    }

    /// Moves to an absolute offset within the byte source.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        trace!("seeking to {:#X}", offset);
        self.reader.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let position = self.position()?;
        match self.reader.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(Error::Truncated { position, requested: buf.len() })
            },
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads `count` bytes.
    ///
    /// The buffer grows with the data actually delivered, so an absurd count taken from a
    /// malformed header fails with [`Error::Truncated`] instead of allocating up front.
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let position = self.position()?;
        let mut buf = Vec::new();
        (&mut self.reader)
            .take(count as u64)
            .read_to_end(&mut buf)?;
        if buf.len() < count {
            return Err(Error::Truncated { position, requested: count });
        }
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let buf: [u8; 1] = self.read_array()?;
        Ok(buf[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_guid(&mut self) -> Result<Guid> {
        let buf: [u8; 16] = self.read_array()?;
        Ok(Guid::from_le_bytes(buf))
    }

    pub fn read_nul_terminated_ascii_string(&mut self) -> Result<String> {
        let mut ret = Vec::new();
        loop {
            let b = self.read_u8()?;
            if b == 0x00 {
                break;
            }
            ret.push(b);
        }
        String::from_utf8(ret)
            .map_err(|_| FormatError::InvalidText.into())
    }

    /// Reads exactly `unit_count` UTF-16LE code units.
    pub fn read_utf16_string(&mut self, unit_count: usize) -> Result<String> {
        let bytes = self.read_bytes(unit_count * 2)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units)
            .map_err(|_| FormatError::InvalidText.into())
    }

    /// Reads a UTF-16LE string prefixed by its 16-bit code unit count.
    pub fn read_pascal_utf16_string(&mut self) -> Result<String> {
        let unit_count = self.read_u16()?;
        self.read_utf16_string(unit_count.into())
    }
}
