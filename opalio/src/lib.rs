// SPDX-License-Identifier: MIT
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

// Core modules
pub mod errors;
mod macros;
mod readonly;

// Backend modules
#[cfg(feature = "mem")]
mod mem;

#[cfg(feature = "std")]
mod std;

// Prelude re-exports (central entrypoint)
pub mod prelude {
    pub use super::BlockIO;
    pub use super::BlockIOExt;
    pub use super::BlockIOSetLen;
    pub use super::BlockIOStructExt;
    pub use super::errors::*;
    pub use super::readonly::ReadOnly;

    #[cfg(feature = "mem")]
    pub use super::mem::MemBlockIO;

    #[cfg(feature = "std")]
    pub use super::std::StdBlockIO;
}

// Internal use
use errors::*;

pub use readonly::ReadOnly;

/// Maximum size of the internal scratch buffer (streaming/chunked ops).
/// 4 KiB = typical page size and the largest sector size any of the
/// supported volume formats allows.
pub const BLOCK_BUF_SIZE: usize = 4096;

/// Byte-addressable random-access IO abstraction.
///
/// Volume-format plugins consume this as their raw backing handle.
/// Implementations may target RAM, files, block devices, etc.
pub trait BlockIO {
    /// Reads `buf.len()` bytes into `buf` from `offset` (window-relative).
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> BlockIOResult;

    /// Writes `data` at `offset` (window-relative).
    fn write_at(&mut self, offset: u64, data: &[u8]) -> BlockIOResult;

    /// Flushes any buffered data (may be a no-op).
    fn flush(&mut self) -> BlockIOResult;

    /// Total usable size of the backing in bytes, measured from the
    /// window base. Probing and geometry auto-detection rely on this.
    fn size(&mut self) -> BlockIOResult<u64>;

    /// Moves the window base. All offsets passed to `read_at`/`write_at`
    /// are relative to this base, which is how a volume embedded in a
    /// larger container (partition, floppy-in-image) is addressed.
    fn set_offset(&mut self, window_offset: u64) -> u64;

    /// Current window base.
    fn window_offset(&self) -> u64;
}

/// Extension helpers for BlockIO.
///
/// Chunked transfers, region fills and little-endian primitive access.
pub trait BlockIOExt: BlockIO {
    /// Reads `buf.len()` bytes from `offset` in chunks of `chunk_size` or less.
    #[inline(always)]
    fn read_in_chunks(&mut self, offset: u64, buf: &mut [u8], chunk_size: usize) -> BlockIOResult {
        let mut remaining = buf.len();
        let mut off = offset;
        let mut pos = 0;

        while remaining > 0 {
            let to_read = remaining.min(chunk_size);
            self.read_at(off, &mut buf[pos..pos + to_read])?;
            off += to_read as u64;
            pos += to_read;
            remaining -= to_read;
        }

        Ok(())
    }

    /// Writes `buf.len()` bytes at `offset` in chunks of `chunk_size` or less.
    #[inline(always)]
    fn write_in_chunks(&mut self, offset: u64, buf: &[u8], chunk_size: usize) -> BlockIOResult {
        let mut remaining = buf.len();
        let mut off = offset;
        let mut pos = 0;

        while remaining > 0 {
            let to_write = remaining.min(chunk_size);
            self.write_at(off, &buf[pos..pos + to_write])?;
            off += to_write as u64;
            pos += to_write;
            remaining -= to_write;
        }

        Ok(())
    }

    /// Fills a region with a single byte value.
    ///
    /// Used for data-region fills during full formats (historically 0xF6).
    #[inline(always)]
    fn byte_fill(&mut self, offset: u64, len: u64, value: u8) -> BlockIOResult {
        let buf = [value; BLOCK_BUF_SIZE];
        let mut remaining = len;
        let mut off = offset;
        while remaining > 0 {
            let chunk = remaining.min(BLOCK_BUF_SIZE as u64) as usize;
            self.write_at(off, &buf[..chunk])?;
            off += chunk as u64;
            remaining -= chunk as u64;
        }
        Ok(())
    }

    /// Fills a region with zeroes.
    ///
    /// Used for quick cluster clearing, FS formatting, FSINFO clears, etc.
    #[inline(always)]
    fn zero_fill(&mut self, offset: u64, len: usize) -> BlockIOResult {
        self.byte_fill(offset, len as u64, 0)
    }

    // read_u16_at/write_u16_at and friends (little-endian)
    blockio_impl_primitive_rw!(u16, u32, u64);
}

impl<T: BlockIO + ?Sized> BlockIOExt for T {}

/// Trait for setting the length of a BlockIO backing.
pub trait BlockIOSetLen: BlockIO {
    /// Sets the length of the storage.
    fn set_len(&mut self, len: u64) -> BlockIOResult;
}

/// Zerocopy-backed struct read/write on a BlockIO.
///
/// The scratch buffer caps struct size at [`BLOCK_BUF_SIZE`]; on-disk
/// records in this workspace are all well below that.
pub trait BlockIOStructExt: BlockIO {
    /// Reads a struct of type `T` from the given offset.
    fn read_struct<T: zerocopy::FromBytes + zerocopy::KnownLayout + zerocopy::Immutable>(
        &mut self,
        offset: u64,
    ) -> BlockIOResult<T> {
        let size = core::mem::size_of::<T>();
        debug_assert!(size <= BLOCK_BUF_SIZE, "read_struct: type too large");
        if size > BLOCK_BUF_SIZE {
            return Err(BlockIOError::Other("read_struct: type too large"));
        }
        let mut buf = [0u8; BLOCK_BUF_SIZE];
        self.read_at(offset, &mut buf[..size])?;
        T::read_from_bytes(&buf[..size]).map_err(|_| BlockIOError::Other("read_struct failed"))
    }

    /// Writes a struct of type `T` at the given offset.
    fn write_struct<T: zerocopy::IntoBytes + zerocopy::Immutable + ?Sized>(
        &mut self,
        offset: u64,
        val: &T,
    ) -> BlockIOResult {
        self.write_at(offset, val.as_bytes())
    }
}

impl<T: BlockIO + ?Sized> BlockIOStructExt for T {}
