// SPDX-License-Identifier: MIT

use crate::{BlockIO, BlockIOError, BlockIOResult, BlockIOSetLen};

/// In-memory implementation of `BlockIO`.
///
/// Useful for tests, RAM-backed images and probing fixtures.
#[derive(Debug)]
pub struct MemBlockIO<'a> {
    buffer: &'a mut [u8],
    window_offset: u64,
    logical_len: usize,
}

impl<'a> MemBlockIO<'a> {
    #[inline]
    pub fn new(buffer: &'a mut [u8]) -> Self {
        let logical_len = buffer.len();

        Self {
            buffer,
            logical_len,
            window_offset: 0,
        }
    }

    #[inline]
    pub fn new_with_offset(buffer: &'a mut [u8], window_offset: u64) -> Self {
        let logical_len = buffer.len();

        Self {
            buffer,
            logical_len,
            window_offset,
        }
    }

    #[inline]
    fn check_bounds(&self, abs_off: u64, len: usize) -> BlockIOResult {
        let end = abs_off
            .checked_add(len as u64)
            .ok_or(BlockIOError::OutOfBounds)?;
        if end > self.logical_len as u64 {
            return Err(BlockIOError::OutOfBounds);
        }
        Ok(())
    }
}

impl<'a> BlockIO for MemBlockIO<'a> {
    #[inline(always)]
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> BlockIOResult {
        let abs_offset = self.window_offset + offset;
        self.check_bounds(abs_offset, buf.len())?;
        let src = &self.buffer[abs_offset as usize..abs_offset as usize + buf.len()];
        buf.copy_from_slice(src);
        Ok(())
    }

    #[inline(always)]
    fn write_at(&mut self, offset: u64, data: &[u8]) -> BlockIOResult {
        let abs_offset = self.window_offset + offset;
        self.check_bounds(abs_offset, data.len())?;
        let dst = &mut self.buffer[abs_offset as usize..abs_offset as usize + data.len()];
        dst.copy_from_slice(data);
        Ok(())
    }

    #[inline]
    fn flush(&mut self) -> BlockIOResult {
        Ok(())
    }

    #[inline]
    fn size(&mut self) -> BlockIOResult<u64> {
        Ok((self.logical_len as u64).saturating_sub(self.window_offset))
    }

    #[inline]
    fn set_offset(&mut self, window_offset: u64) -> u64 {
        self.window_offset = window_offset;
        window_offset
    }

    #[inline]
    fn window_offset(&self) -> u64 {
        self.window_offset
    }
}

impl<'a> BlockIOSetLen for MemBlockIO<'a> {
    fn set_len(&mut self, new_len: u64) -> BlockIOResult {
        let end = self
            .window_offset
            .checked_add(new_len)
            .ok_or(BlockIOError::OutOfBounds)? as usize;
        if end > self.buffer.len() {
            return Err(BlockIOError::OutOfBounds);
        }
        self.logical_len = end;
        Ok(())
    }
}

#[cfg(all(test, feature = "std"))]
mod test {
    use crate::prelude::*;

    #[test]
    fn test_rw() {
        let mut buf = [0u8; 256];
        let mut io = MemBlockIO::new(&mut buf);
        io.write_at(10, &[1, 2, 3, 4]).unwrap();

        let mut output = [0u8; 4];
        io.read_at(10, &mut output).unwrap();
        assert_eq!(output, [1, 2, 3, 4]);
    }

    #[test]
    fn test_window_offset() {
        let mut buf = [0u8; 256];
        buf[100] = 0xAA;
        let mut io = MemBlockIO::new_with_offset(&mut buf, 100);

        let mut out = [0u8; 1];
        io.read_at(0, &mut out).unwrap();
        assert_eq!(out[0], 0xAA);
        assert_eq!(io.size().unwrap(), 156);
    }

    #[test]
    fn test_bounds() {
        let mut buf = [0u8; 32];
        let mut io = MemBlockIO::new(&mut buf);

        assert_eq!(
            io.read_at(30, &mut [0u8; 4]),
            Err(BlockIOError::OutOfBounds)
        );
        assert_eq!(io.write_at(u64::MAX, &[1]), Err(BlockIOError::OutOfBounds));
    }

    #[test]
    fn test_byte_fill() {
        let mut buf = [0u8; 64];
        let mut io = MemBlockIO::new(&mut buf);

        io.byte_fill(8, 16, 0xF6).unwrap();

        let mut out = [0u8; 16];
        io.read_at(8, &mut out).unwrap();
        assert_eq!(out, [0xF6; 16]);

        io.zero_fill(8, 16).unwrap();
        io.read_at(8, &mut out).unwrap();
        assert_eq!(out, [0u8; 16]);
    }

    #[test]
    fn test_primitive_rw() {
        let mut buf = [0u8; 64];
        let mut io = MemBlockIO::new(&mut buf);

        io.write_u32_at(4, 0xDEAD_BEEF).unwrap();
        assert_eq!(io.read_u32_at(4).unwrap(), 0xDEAD_BEEF);
        assert_eq!(io.read_u16_at(4).unwrap(), 0xBEEF);
    }
}
