// SPDX-License-Identifier: MIT

//! RIFF container and WAVE format records.
//!
//! The packed structs mirror the on-disk layout byte for byte; callers
//! only ever see the safe [`WaveInfo`]/[`WaveFormat`] views produced by
//! [`parse_wave`]. All sizes are little-endian, magics are four-char
//! codes pinned as byte-order-fixed constants.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::*;

// Four-char codes as they appear in the byte stream.
pub const RIFF_MAGIC: u32 = u32::from_le_bytes(*b"RIFF");
pub const RIFF_LIST_MAGIC: u32 = u32::from_le_bytes(*b"LIST");
pub const RIFF_WAVE_TYPE: u32 = u32::from_le_bytes(*b"WAVE");
pub const WAVE_FMT_MAGIC: u32 = u32::from_le_bytes(*b"fmt ");
pub const WAVE_DATA_MAGIC: u32 = u32::from_le_bytes(*b"data");

pub const WAVE_FMT_TAG_PCM: u16 = 0x0001;
pub const WAVE_FMT_TAG_EXTENSIBLE: u16 = 0xFFFE;

/// RIFF file header (12 bytes).
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct RiffHdr {
    pub magic: u32,
    /// Size of the file minus the first 8 bytes.
    pub file_size: u32,
    pub file_type: u32,
}

/// RIFF chunk header (8 bytes).
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct RiffChunk {
    pub magic: u32,
    pub chunk_size: u32,
}

/// RIFF list chunk header (12 bytes).
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct RiffList {
    pub magic: u32,
    pub chunk_size: u32,
    pub list_type: u32,
}

/// WAVE `fmt ` chunk payload, PCM core (16 bytes).
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct WaveFmt {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

/// WAVEFORMATEXTENSIBLE extension block following [`WaveFmt`] when
/// `format_tag == WAVE_FMT_TAG_EXTENSIBLE` (24 bytes).
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct WaveFmtExt {
    pub cb_size: u16,
    pub valid_bits_per_sample: u16,
    pub channel_mask: u32,
    pub sub_format: [u8; 16],
}

const _: () = assert!(core::mem::size_of::<RiffHdr>() == 12);
const _: () = assert!(core::mem::size_of::<RiffChunk>() == 8);
const _: () = assert!(core::mem::size_of::<RiffList>() == 12);
const _: () = assert!(core::mem::size_of::<WaveFmt>() == 16);
const _: () = assert!(core::mem::size_of::<WaveFmtExt>() == 24);

/// Iterator over top-level chunks of a RIFF payload.
///
/// Chunk data is padded to even offsets; the pad byte is not part of
/// `chunk_size` and is skipped here.
pub struct ChunkIter<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ChunkIter<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Self {
            buf: payload,
            pos: 0,
        }
    }
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = RiffResult<(RiffChunk, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let rest = &self.buf[self.pos..];
        let Ok((hdr, _)) = RiffChunk::read_from_prefix(rest) else {
            self.pos = self.buf.len();
            return Some(Err(RiffError::Truncated));
        };
        let data_start = self.pos + core::mem::size_of::<RiffChunk>();
        let size = hdr.chunk_size as usize;
        let Some(data_end) = data_start.checked_add(size) else {
            self.pos = self.buf.len();
            return Some(Err(RiffError::Corrupt("chunk size overflows buffer")));
        };
        if data_end > self.buf.len() {
            self.pos = self.buf.len();
            return Some(Err(RiffError::Truncated));
        }
        let data = &self.buf[data_start..data_end];
        // Word alignment pad.
        self.pos = data_end + (size & 1);
        Some(Ok((hdr, data)))
    }
}

/// Safe, validated view of a WAVE `fmt ` chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaveFormat {
    Pcm {
        channels: u16,
        sample_rate: u32,
        byte_rate: u32,
        block_align: u16,
        bits_per_sample: u16,
    },
    Extensible {
        channels: u16,
        sample_rate: u32,
        bits_per_sample: u16,
        valid_bits_per_sample: u16,
        channel_mask: u32,
        sub_format: [u8; 16],
    },
}

/// Parsed summary of a RIFF/WAVE buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveInfo {
    pub format: WaveFormat,
    /// Offset of the `data` chunk payload within the input buffer.
    pub data_offset: usize,
    pub data_len: usize,
}

/// Parses a RIFF/WAVE buffer into a [`WaveInfo`].
///
/// `NotRiff` on magic mismatch (callers may try other sniffers),
/// `Corrupt` once the magic matched but structure fails validation.
pub fn parse_wave(buf: &[u8]) -> RiffResult<WaveInfo> {
    let (hdr, _) = RiffHdr::read_from_prefix(buf).map_err(|_| RiffError::Truncated)?;
    if hdr.magic != RIFF_MAGIC {
        return Err(RiffError::NotRiff);
    }
    if hdr.file_type != RIFF_WAVE_TYPE {
        return Err(RiffError::Unsupported("RIFF file type is not WAVE"));
    }
    let declared_end = (hdr.file_size as usize)
        .checked_add(8)
        .ok_or(RiffError::Corrupt("RIFF file size overflows"))?;
    if declared_end > buf.len() {
        return Err(RiffError::Truncated);
    }

    let payload = &buf[core::mem::size_of::<RiffHdr>()..declared_end];
    let payload_base = core::mem::size_of::<RiffHdr>();

    let mut format: Option<WaveFormat> = None;
    let mut data: Option<(usize, usize)> = None;

    let mut pos = 0usize;
    for item in ChunkIter::new(payload) {
        let (chunk, chunk_data) = item?;
        let data_off = pos + core::mem::size_of::<RiffChunk>();
        pos = data_off + chunk_data.len() + (chunk_data.len() & 1);

        match chunk.magic {
            WAVE_FMT_MAGIC => {
                format = Some(parse_fmt_chunk(chunk_data)?);
            }
            WAVE_DATA_MAGIC => {
                data = Some((payload_base + data_off, chunk_data.len()));
            }
            _ => {} // fact, LIST, cue, ... are not interesting here
        }
    }

    let format = format.ok_or(RiffError::Corrupt("missing fmt chunk"))?;
    let (data_offset, data_len) = data.ok_or(RiffError::Corrupt("missing data chunk"))?;
    Ok(WaveInfo {
        format,
        data_offset,
        data_len,
    })
}

fn parse_fmt_chunk(chunk: &[u8]) -> RiffResult<WaveFormat> {
    let (fmt, rest) = WaveFmt::read_from_prefix(chunk).map_err(|_| RiffError::Truncated)?;
    match fmt.format_tag {
        WAVE_FMT_TAG_PCM => Ok(WaveFormat::Pcm {
            channels: fmt.channels,
            sample_rate: fmt.sample_rate,
            byte_rate: fmt.byte_rate,
            block_align: fmt.block_align,
            bits_per_sample: fmt.bits_per_sample,
        }),
        WAVE_FMT_TAG_EXTENSIBLE => {
            let (ext, _) = WaveFmtExt::read_from_prefix(rest).map_err(|_| RiffError::Truncated)?;
            if ext.cb_size < 22 {
                return Err(RiffError::Corrupt("extensible cbSize below 22"));
            }
            Ok(WaveFormat::Extensible {
                channels: fmt.channels,
                sample_rate: fmt.sample_rate,
                bits_per_sample: fmt.bits_per_sample,
                valid_bits_per_sample: ext.valid_bits_per_sample,
                channel_mask: ext.channel_mask,
                sub_format: ext.sub_format,
            })
        }
        _ => Err(RiffError::Unsupported("unknown wave format tag")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm_8khz_mono() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&36u32.to_le_bytes());
        buf.extend_from_slice(b"WAVE");
        buf.extend_from_slice(b"fmt ");
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
        buf.extend_from_slice(&1u16.to_le_bytes()); // mono
        buf.extend_from_slice(&8000u32.to_le_bytes());
        buf.extend_from_slice(&8000u32.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.extend_from_slice(&8u16.to_le_bytes());
        buf.extend_from_slice(b"data");
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf
    }

    #[test]
    fn test_wire_sizes() {
        // Compile-time asserted as well; re-checked here for defense in depth.
        assert_eq!(core::mem::size_of::<RiffHdr>(), 12);
        assert_eq!(core::mem::size_of::<RiffChunk>(), 8);
        assert_eq!(core::mem::size_of::<RiffList>(), 12);
        assert_eq!(core::mem::size_of::<WaveFmt>(), 16);
        assert_eq!(core::mem::size_of::<WaveFmtExt>(), 24);
    }

    #[test]
    fn test_parse_pcm_wave() {
        let buf = pcm_8khz_mono();
        let info = parse_wave(&buf).unwrap();

        assert_eq!(
            info.format,
            WaveFormat::Pcm {
                channels: 1,
                sample_rate: 8000,
                byte_rate: 8000,
                block_align: 1,
                bits_per_sample: 8,
            }
        );
        assert_eq!(info.data_len, 0);
        assert_eq!(info.data_offset, buf.len());
    }

    #[test]
    fn test_not_riff() {
        let buf = [0u8; 64];
        assert_eq!(parse_wave(&buf), Err(RiffError::NotRiff));
        // Deterministic across repeated probes.
        assert_eq!(parse_wave(&buf), Err(RiffError::NotRiff));
    }

    #[test]
    fn test_truncated_chunk() {
        let mut buf = pcm_8khz_mono();
        // Claim a data chunk bigger than the buffer.
        let n = buf.len();
        buf[n - 4..].copy_from_slice(&64u32.to_le_bytes());
        buf[4..8].copy_from_slice(&(36u32 + 64).to_le_bytes());
        assert_eq!(parse_wave(&buf), Err(RiffError::Truncated));
    }

    #[test]
    fn test_unknown_format_tag() {
        let mut buf = pcm_8khz_mono();
        buf[20..22].copy_from_slice(&0x55AAu16.to_le_bytes());
        assert!(matches!(parse_wave(&buf), Err(RiffError::Unsupported(_))));
    }
}
