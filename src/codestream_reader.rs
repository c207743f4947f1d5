use crate::error::J2kError;
use crate::jpeg_marker_code::{J2K_MARKER_START_BYTE, J2kMarkerCode};

/// Big-endian byte cursor over a codestream or a single marker segment.
pub struct CodestreamReader<'a> {
    source: &'a [u8],
    position: usize,
}

impl<'a> CodestreamReader<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        Self {
            source,
            position: 0,
        }
    }

    /// Creates a reader that starts at `position` within `source`.
    pub fn at(source: &'a [u8], position: usize) -> Self {
        Self { source, position }
    }

    pub fn remaining_data(&self) -> &'a [u8] {
        self.source.get(self.position..).unwrap_or(&[])
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_empty(&self) -> bool {
        self.position >= self.source.len()
    }

    pub fn read_u8(&mut self) -> Result<u8, J2kError> {
        let val = *self
            .source
            .get(self.position)
            .ok_or(J2kError::UnexpectedEndOfData)?;
        self.position += 1;
        Ok(val)
    }

    pub fn read_u16(&mut self) -> Result<u16, J2kError> {
        let b1 = self.read_u8()? as u16;
        let b2 = self.read_u8()? as u16;
        Ok((b1 << 8) | b2)
    }

    pub fn read_u32(&mut self) -> Result<u32, J2kError> {
        let b1 = self.read_u8()? as u32;
        let b2 = self.read_u8()? as u32;
        let b3 = self.read_u8()? as u32;
        let b4 = self.read_u8()? as u32;
        Ok((b1 << 24) | (b2 << 16) | (b3 << 8) | b4)
    }

    /// Returns the next `count` bytes and advances past them.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], J2kError> {
        let end = self
            .position
            .checked_add(count)
            .filter(|&end| end <= self.source.len())
            .ok_or(J2kError::UnexpectedEndOfData)?;
        let bytes = &self.source[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// Reads a raw 16-bit marker code. The first byte must be 0xFF.
    pub fn read_marker_code(&mut self) -> Result<u16, J2kError> {
        let offset = self.position;
        let code = self.read_u16()?;
        if (code >> 8) as u8 != J2K_MARKER_START_BYTE {
            return Err(J2kError::MarkerExpected {
                offset,
                found: code,
            });
        }
        Ok(code)
    }

    /// Reads the length field of a marker segment and returns its body.
    ///
    /// The length counts itself, so it must be at least 2 and the rest of
    /// the segment must fit in the buffer.
    pub fn read_segment(&mut self, marker: &'static str) -> Result<&'a [u8], J2kError> {
        let length = self.read_u16()?;
        if length < 2 {
            return Err(J2kError::InvalidSegmentLength {
                marker,
                length: length as u32,
            });
        }
        self.read_bytes(length as usize - 2)
            .map_err(|_| J2kError::InvalidSegmentLength {
                marker,
                length: length as u32,
            })
    }

    /// Consumes `marker` or fails with `MissingMarker`.
    pub fn expect_marker(&mut self, marker: J2kMarkerCode) -> Result<(), J2kError> {
        match self.read_u16() {
            Ok(code) if code == u16::from(marker) => Ok(()),
            _ => Err(J2kError::MissingMarker(marker.name())),
        }
    }
}
