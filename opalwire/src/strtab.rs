// SPDX-License-Identifier: MIT

//! Dictionary-compressed string table decoder.
//!
//! A table is a raw byte blob plus a dictionary of 255 or 256 entries.
//! Compressed strings live inside the blob as `(offset, length)` spans;
//! each compressed byte either indexes the dictionary or, for
//! 255-entry dictionaries, the reserved byte `0xFF` escapes an inline
//! UTF-8 encoded codepoint.

use crate::errors::*;

/// Reserved escape byte, valid only with 255-entry dictionaries.
pub const STRTAB_ESCAPE: u8 = 0xFF;

/// Span into the raw table blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrRef {
    pub off: u32,
    pub cch: u32,
}

/// One dictionary slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictEntry {
    /// Single 7-bit character emitted as-is.
    Chr(u8),
    /// Frequent word stored once in the blob.
    Word(StrRef),
}

/// Read-only decoder over a compressed string table.
///
/// The table never owns its backing storage; tables are typically
/// baked into the binary as `static` data.
#[derive(Debug, Clone, Copy)]
pub struct StrTab<'a> {
    raw: &'a [u8],
    dict: &'a [DictEntry],
}

impl<'a> StrTab<'a> {
    /// `BadDictSize` unless the dictionary has exactly 255 or 256
    /// entries. 255-entry dictionaries reserve `0xFF` as escape.
    pub fn new(raw: &'a [u8], dict: &'a [DictEntry]) -> StrTabResult<Self> {
        if dict.len() != 255 && dict.len() != 256 {
            return Err(StrTabError::BadDictSize);
        }
        Ok(Self { raw, dict })
    }

    #[inline]
    pub fn raw_len(&self) -> usize {
        self.raw.len()
    }

    #[inline]
    fn has_escape(&self) -> bool {
        self.dict.len() == 255
    }

    #[inline]
    fn span(&self, off: u32, cch: u32) -> StrTabResult<&'a [u8]> {
        let start = off as usize;
        let end = start
            .checked_add(cch as usize)
            .ok_or(StrTabError::OutOfRange)?;
        if end > self.raw.len() {
            return Err(StrTabError::OutOfRange);
        }
        Ok(&self.raw[start..end])
    }

    /// Decodes the compressed string at `(off, cch)` into `dst` and
    /// NUL-terminates it.
    ///
    /// Returns the decoded length excluding the terminator. On
    /// `BufferOverflow` the output is still terminated at the
    /// truncation point. A string span that fails bounds checking
    /// returns `OutOfRange` before anything is written; an empty `dst`
    /// is left untouched.
    pub fn query_string(&self, off: u32, cch: u32, dst: &mut [u8]) -> StrTabResult<usize> {
        if dst.is_empty() {
            return Err(StrTabError::BufferOverflow);
        }
        let cap = dst.len() - 1; // reserve the terminator
        let mut used = 0usize;
        let mut overflow = false;

        self.decode(off, cch, &mut |piece| {
            if overflow {
                return Ok(0);
            }
            let room = cap - used;
            let take = piece.len().min(room);
            dst[used..used + take].copy_from_slice(&piece[..take]);
            used += take;
            if take < piece.len() {
                overflow = true;
            }
            Ok(take)
        })?;
        dst[used] = 0;
        if overflow {
            return Err(StrTabError::BufferOverflow);
        }
        Ok(used)
    }

    /// Streaming variant: feeds decoded pieces to `sink` and returns
    /// the sum of the sink's own return values. No terminator is
    /// emitted.
    pub fn query_output<F>(&self, off: u32, cch: u32, sink: &mut F) -> StrTabResult<usize>
    where
        F: FnMut(&[u8]) -> StrTabResult<usize>,
    {
        self.decode(off, cch, sink)
    }

    fn decode<F>(&self, off: u32, cch: u32, sink: &mut F) -> StrTabResult<usize>
    where
        F: FnMut(&[u8]) -> StrTabResult<usize>,
    {
        let src = self.span(off, cch)?;
        let mut total = 0usize;
        let mut i = 0usize;
        while i < src.len() {
            let b = src[i];
            if b == STRTAB_ESCAPE && self.has_escape() {
                let tail = &src[i + 1..];
                let n = utf8_seq_len(tail)?;
                core::str::from_utf8(&tail[..n]).map_err(|_| StrTabError::BadEncoding)?;
                total += sink(&tail[..n])?;
                i += 1 + n;
                continue;
            }
            match self.dict[b as usize] {
                DictEntry::Chr(ch) => {
                    if ch >= 0x80 {
                        return Err(StrTabError::BadEncoding);
                    }
                    total += sink(&[ch])?;
                }
                DictEntry::Word(r) => {
                    // Word spans are range-checked on every use; the
                    // dictionary itself is untrusted.
                    let word = self.span(r.off, r.cch)?;
                    total += sink(word)?;
                }
            }
            i += 1;
        }
        Ok(total)
    }
}

/// Length of the UTF-8 sequence starting at `tail[0]`.
fn utf8_seq_len(tail: &[u8]) -> StrTabResult<usize> {
    let Some(&lead) = tail.first() else {
        return Err(StrTabError::BadEncoding);
    };
    let n = match lead {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => return Err(StrTabError::BadEncoding),
    };
    if tail.len() < n {
        return Err(StrTabError::BadEncoding);
    }
    Ok(n)
}
