// SPDX-License-Identifier: MIT

#[cfg(all(not(feature = "std"), feature = "alloc"))]
use alloc::{string::String, vec::Vec};

use time::OffsetDateTime;

use crate::core::errors::*;

/// Identifies which plugin owns a mounted volume. Fixed for the life
/// of the volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatTag {
    Fat,
    Iso9660,
    Ntfs,
    Ext,
}

impl FormatTag {
    pub fn name(&self) -> &'static str {
        match self {
            FormatTag::Fat => "fat",
            FormatTag::Iso9660 => "iso9660",
            FormatTag::Ntfs => "ntfs",
            FormatTag::Ext => "ext",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Dir,
}

/// Metadata for a resolved path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: String,
    pub kind: NodeKind,
    pub size: u64,
    pub mtime: Option<OffsetDateTime>,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: NodeKind,
    pub size: u64,
}

/// Uniform surface every format plugin implements.
///
/// A volume owns its backing IO and its parsed metadata cache; file and
/// directory access borrows the volume mutably, so no handle can
/// outlive the volume it came from. Path lookup follows each format's
/// own case conventions (FAT and NTFS case-insensitive, EXT
/// case-sensitive, ISO9660 per active namespace).
///
/// The library is synchronous and takes no internal locks; concurrent
/// use of one volume requires external synchronization.
pub trait FsVolume {
    fn format_tag(&self) -> FormatTag;

    /// Volume label, if the format records one and it is set.
    fn label(&self) -> Option<&str>;

    /// Total addressable size of the volume in bytes.
    fn volume_size(&self) -> u64;

    /// Resolves `path` ('/'-separated, leading '/' optional) to its
    /// metadata.
    fn lookup(&mut self, path: &str) -> FsResult<NodeInfo>;

    /// Lists the directory at `path`. Self-references ('.', '..') and
    /// format bookkeeping entries (volume labels, deleted slots) are
    /// suppressed.
    fn read_dir(&mut self, path: &str) -> FsResult<Vec<DirEntry>>;

    /// Reads the whole file at `path`.
    fn read_file(&mut self, path: &str) -> FsResult<Vec<u8>>;

    /// Positional read; returns the number of bytes read, short only
    /// at end of file.
    fn read_file_at(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> FsResult<usize>;
}
