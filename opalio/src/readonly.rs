// SPDX-License-Identifier: MIT

use crate::{BlockIO, BlockIOError, BlockIOResult};

/// Read-only view over another `BlockIO`.
///
/// Every mutating operation fails with `BlockIOError::ReadOnly`, so a
/// read-only mount cannot touch the medium no matter what the format
/// plugin does. Probing always goes through this wrapper.
#[derive(Debug)]
pub struct ReadOnly<IO> {
    inner: IO,
}

impl<IO: BlockIO> ReadOnly<IO> {
    #[inline]
    pub fn new(inner: IO) -> Self {
        Self { inner }
    }

    /// Releases the wrapped backing.
    #[inline]
    pub fn into_inner(self) -> IO {
        self.inner
    }
}

impl<IO: BlockIO> BlockIO for ReadOnly<IO> {
    #[inline(always)]
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> BlockIOResult {
        self.inner.read_at(offset, buf)
    }

    fn write_at(&mut self, _offset: u64, _data: &[u8]) -> BlockIOResult {
        Err(BlockIOError::ReadOnly)
    }

    #[inline]
    fn flush(&mut self) -> BlockIOResult {
        Ok(())
    }

    #[inline]
    fn size(&mut self) -> BlockIOResult<u64> {
        self.inner.size()
    }

    #[inline]
    fn set_offset(&mut self, window_offset: u64) -> u64 {
        self.inner.set_offset(window_offset)
    }

    #[inline]
    fn window_offset(&self) -> u64 {
        self.inner.window_offset()
    }
}

#[cfg(all(test, feature = "mem"))]
mod test {
    use crate::prelude::*;

    #[test]
    fn test_rejects_writes() {
        let mut buf = [0u8; 64];
        let mut io = ReadOnly::new(MemBlockIO::new(&mut buf));

        assert_eq!(io.write_at(0, &[1, 2, 3]), Err(BlockIOError::ReadOnly));
        assert_eq!(io.zero_fill(0, 8), Err(BlockIOError::ReadOnly));

        let mut out = [0u8; 4];
        io.read_at(0, &mut out).unwrap();
        assert_eq!(out, [0u8; 4]);
    }
}
