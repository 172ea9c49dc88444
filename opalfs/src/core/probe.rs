// SPDX-License-Identifier: MIT

//! Format dispatcher.
//!
//! Tries each enabled plugin in a fixed order (FAT, ISO9660, NTFS,
//! EXT). `NotThisFormat` rejections are swallowed; if exactly one
//! plugin got past its magic check but failed deeper validation, that
//! concrete `Corrupt`/`Unsupported` is surfaced instead of a generic
//! "unknown format". Probing only reads; the medium is never touched.

#[cfg(all(not(feature = "std"), feature = "alloc"))]
use alloc::vec::Vec;

use log::debug;
use opalio::prelude::*;

use crate::core::errors::*;
use crate::core::volume::*;

#[cfg(feature = "fat")]
use crate::fs::fat::volume::{FatOpenOptions, FatVolume};
#[cfg(feature = "iso9660")]
use crate::fs::iso9660::volume::{IsoFlags, IsoVolume};
#[cfg(feature = "ntfs")]
use crate::fs::ntfs::volume::NtfsVolume;
#[cfg(feature = "ext")]
use crate::fs::ext::volume::ExtVolume;

/// Per-format options applied when a probe succeeds.
#[derive(Debug, Clone, Default)]
pub struct ProbeOptions {
    #[cfg(feature = "fat")]
    pub fat: FatOpenOptions,
    #[cfg(feature = "iso9660")]
    pub iso_flags: IsoFlags,
}

/// A mounted volume of any enabled format.
pub enum AnyVolume<IO: BlockIO> {
    #[cfg(feature = "fat")]
    Fat(FatVolume<IO>),
    #[cfg(feature = "iso9660")]
    Iso(IsoVolume<IO>),
    #[cfg(feature = "ntfs")]
    Ntfs(NtfsVolume<IO>),
    #[cfg(feature = "ext")]
    Ext(ExtVolume<IO>),
}

macro_rules! any_delegate {
    ($self:ident, $vol:ident => $body:expr) => {
        match $self {
            #[cfg(feature = "fat")]
            AnyVolume::Fat($vol) => $body,
            #[cfg(feature = "iso9660")]
            AnyVolume::Iso($vol) => $body,
            #[cfg(feature = "ntfs")]
            AnyVolume::Ntfs($vol) => $body,
            #[cfg(feature = "ext")]
            AnyVolume::Ext($vol) => $body,
        }
    };
}

impl<IO: BlockIO> AnyVolume<IO> {
    /// Releases the backing IO.
    pub fn into_inner(self) -> IO {
        any_delegate!(self, vol => vol.into_inner())
    }
}

impl<IO: BlockIO> FsVolume for AnyVolume<IO> {
    fn format_tag(&self) -> FormatTag {
        any_delegate!(self, vol => vol.format_tag())
    }

    fn label(&self) -> Option<&str> {
        any_delegate!(self, vol => vol.label())
    }

    fn volume_size(&self) -> u64 {
        any_delegate!(self, vol => vol.volume_size())
    }

    fn lookup(&mut self, path: &str) -> FsResult<NodeInfo> {
        any_delegate!(self, vol => vol.lookup(path))
    }

    fn read_dir(&mut self, path: &str) -> FsResult<Vec<DirEntry>> {
        any_delegate!(self, vol => vol.read_dir(path))
    }

    fn read_file(&mut self, path: &str) -> FsResult<Vec<u8>> {
        any_delegate!(self, vol => vol.read_file(path))
    }

    fn read_file_at(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        any_delegate!(self, vol => vol.read_file_at(path, offset, buf))
    }
}

/// Cheap magic-only sniff; no structural validation.
///
/// IO failures (image smaller than the probed offsets) count as "no
/// known format here".
pub fn detect<IO: BlockIO>(io: &mut IO) -> Option<FormatTag> {
    let mut sector = [0u8; 512];
    if io.read_at(0, &mut sector).is_ok() {
        #[cfg(feature = "ntfs")]
        if &sector[3..11] == b"NTFS    " {
            return Some(FormatTag::Ntfs);
        }
        #[cfg(feature = "fat")]
        {
            let jump_ok = sector[0] == 0xEB || sector[0] == 0xE9;
            let sig_ok = sector[510] == 0x55 && sector[511] == 0xAA;
            let fat_size_16 = u16::from_le_bytes([sector[22], sector[23]]);
            let fat_size_32 = u32::from_le_bytes([sector[36], sector[37], sector[38], sector[39]]);
            if jump_ok && sig_ok && (fat_size_16 != 0 || fat_size_32 != 0) {
                return Some(FormatTag::Fat);
            }
        }
    }

    #[cfg(feature = "iso9660")]
    {
        let mut id = [0u8; 6];
        if io.read_at(32768, &mut id).is_ok()
            && (&id[1..6] == b"CD001" || &id[1..6] == b"BEA01")
        {
            return Some(FormatTag::Iso9660);
        }
    }

    #[cfg(feature = "ext")]
    {
        if let Ok(magic) = io.read_u16_at(1024 + 56)
            && magic == 0xEF53
        {
            return Some(FormatTag::Ext);
        }
    }

    None
}

/// Full probe: attempts each enabled plugin's open validation in order
/// and mounts the first that accepts the volume.
pub fn open_auto<IO: BlockIO>(mut io: IO, opts: &ProbeOptions) -> Result<AnyVolume<IO>, OpenError> {
    let mut candidate: Option<OpenError> = None;
    let mut matched = 0usize;

    macro_rules! try_plugin {
        ($name:literal, $parse:expr, $wrap:expr) => {
            match $parse {
                Ok(meta) => return Ok($wrap(io, meta)),
                Err(OpenError::NotThisFormat) => {
                    debug!("probe: {} rejected (not this format)", $name);
                }
                Err(e @ (OpenError::Corrupt(_) | OpenError::Unsupported(_))) => {
                    debug!("probe: {} matched magic but failed: {}", $name, e);
                    matched += 1;
                    candidate = Some(e);
                }
                // IO and parameter errors abort the whole sniffing loop.
                Err(e) => return Err(e),
            }
        };
    }

    #[cfg(feature = "fat")]
    try_plugin!(
        "fat",
        FatVolume::parse(&mut io, &opts.fat),
        |io, meta| AnyVolume::Fat(FatVolume::assemble(io, meta, opts.fat.read_only))
    );

    #[cfg(feature = "iso9660")]
    try_plugin!(
        "iso9660",
        IsoVolume::parse(&mut io, opts.iso_flags),
        |io, meta| AnyVolume::Iso(IsoVolume::assemble(io, meta))
    );

    #[cfg(feature = "ntfs")]
    try_plugin!(
        "ntfs",
        NtfsVolume::parse(&mut io),
        |io, meta| AnyVolume::Ntfs(NtfsVolume::assemble(io, meta))
    );

    #[cfg(feature = "ext")]
    try_plugin!(
        "ext",
        ExtVolume::parse(&mut io),
        |io, meta| AnyVolume::Ext(ExtVolume::assemble(io, meta))
    );

    let _ = &mut io;
    if matched == 1
        && let Some(e) = candidate
    {
        return Err(e);
    }
    Err(OpenError::NotThisFormat)
}
