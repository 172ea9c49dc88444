// SPDX-License-Identifier: MIT

#[cfg(all(not(feature = "std"), feature = "alloc"))]
use alloc::{string::String, vec::Vec};

use log::debug;
use opalio::prelude::*;

use crate::core::errors::*;
use crate::core::utils::path_utils::*;
use crate::core::volume::*;
use crate::fs::fat::{constant::*, meta::*, types::*, utils};

/// FAT-specific open parameters.
///
/// `boot_sector_offset` supports floppy images embedded in a larger
/// container; the whole volume is addressed relative to it.
/// `read_only` records the requested mount mode; callers wanting the
/// medium structurally protected pass a [`ReadOnly`] backing.
#[derive(Debug, Clone, Default)]
pub struct FatOpenOptions {
    pub read_only: bool,
    pub boot_sector_offset: u64,
}

/// A mounted FAT12/16/32 volume.
///
/// Owns the backing IO and the parsed geometry. All post-open paths
/// only read; formatting lives in [`crate::fs::fat::formatter`].
pub struct FatVolume<IO: BlockIO> {
    io: IO,
    meta: FatMeta,
    label: Option<String>,
    read_only: bool,
}

/// Where a directory's entry stream lives.
#[derive(Debug, Clone, Copy)]
enum DirSource {
    /// FAT12/16 fixed root region: byte offset and length.
    Fixed(u64, u64),
    /// Cluster chain starting here.
    Chain(u32),
}

/// A resolved directory slot plus its decoded name.
#[derive(Debug, Clone)]
struct RawNode {
    entry: FatDirEntry,
    name: String,
}

impl<IO: BlockIO> FatVolume<IO> {
    pub fn open(mut io: IO, opts: &FatOpenOptions) -> OpenResult<Self> {
        let meta = Self::parse(&mut io, opts)?;
        Ok(Self::assemble(io, meta, opts.read_only))
    }

    /// Probe entry: validates the boot sector and derives geometry
    /// without consuming the IO. The window offset is restored on
    /// rejection so later probes see the medium unmoved.
    pub(crate) fn parse(io: &mut IO, opts: &FatOpenOptions) -> OpenResult<FatMeta> {
        let prev = io.window_offset();
        if opts.boot_sector_offset != 0 {
            io.set_offset(prev + opts.boot_sector_offset);
        }
        let res = Self::parse_at_window(io);
        if res.is_err() && opts.boot_sector_offset != 0 {
            io.set_offset(prev);
        }
        res
    }

    fn parse_at_window(io: &mut IO) -> OpenResult<FatMeta> {
        let volume_size = io.size()?;
        if volume_size < 512 {
            return Err(OpenError::NotThisFormat);
        }
        let mut sector = [0u8; 512];
        io.read_at(0, &mut sector)?;
        FatMeta::from_boot_sector(&sector, volume_size)
    }

    pub(crate) fn assemble(io: IO, meta: FatMeta, read_only: bool) -> Self {
        let label = label_from_bytes(&meta.volume_label);
        debug!(
            "fat: mounted {} volume, {} clusters of {} bytes",
            meta.fat_type.name(),
            meta.cluster_count,
            meta.bytes_per_cluster()
        );
        Self { io, meta, label, read_only }
    }

    pub fn meta(&self) -> &FatMeta {
        &self.meta
    }

    /// Mount mode requested at open. All paths on this type only read;
    /// write-capable handles check this before touching the medium.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn fat_type(&self) -> FatType {
        self.meta.fat_type
    }

    pub fn into_inner(self) -> IO {
        self.io
    }

    /// One FAT entry of the active table, width per variant.
    fn fat_entry(&mut self, cluster: u32) -> FsResult<u32> {
        let fat = self.meta.fat_offset();
        match self.meta.fat_type {
            FatType::Fat12 => {
                let idx = cluster as u64 + (cluster as u64 / 2);
                let raw = self.io.read_u16_at(fat + idx)?;
                Ok(if cluster & 1 == 1 {
                    (raw >> 4) as u32
                } else {
                    (raw & 0x0FFF) as u32
                })
            }
            FatType::Fat16 => Ok(self.io.read_u16_at(fat + cluster as u64 * 2)? as u32),
            FatType::Fat32 => {
                Ok(self.io.read_u32_at(fat + cluster as u64 * 4)? & FAT32_CLUSTER_MASK)
            }
        }
    }

    /// Collects a cluster chain, bounds-checking every link and
    /// refusing chains longer than the cluster count (cycle).
    fn walk_chain(&mut self, start: u32) -> FsResult<Vec<u32>> {
        let mut clusters = Vec::new();
        let mut cur = start;
        loop {
            if cur < FAT_FIRST_DATA_CLUSTER || cur > self.meta.max_cluster() {
                return Err(FsError::Corrupt("Cluster outside data region"));
            }
            clusters.push(cur);
            if clusters.len() as u64 > self.meta.cluster_count as u64 {
                return Err(FsError::Loop);
            }
            let next = self.fat_entry(cur)?;
            if next >= self.meta.fat_type.eoc_min() {
                break;
            }
            cur = next;
        }
        Ok(clusters)
    }

    fn dir_bytes(&mut self, src: DirSource) -> FsResult<Vec<u8>> {
        match src {
            DirSource::Fixed(offset, len) => {
                let mut buf = vec![0u8; len as usize];
                self.io.read_at(offset, &mut buf)?;
                Ok(buf)
            }
            DirSource::Chain(start) => {
                let bpc = self.meta.bytes_per_cluster() as usize;
                let chain = self.walk_chain(start)?;
                let mut buf = vec![0u8; chain.len() * bpc];
                for (i, &cluster) in chain.iter().enumerate() {
                    let off = self.meta.cluster_offset(cluster);
                    self.io.read_at(off, &mut buf[i * bpc..(i + 1) * bpc])?;
                }
                Ok(buf)
            }
        }
    }

    /// Decodes a directory's 32-byte slots: LFN runs, deleted slots,
    /// the end marker, volume label and dot entries.
    fn parse_dir(&mut self, src: DirSource) -> FsResult<Vec<RawNode>> {
        let bytes = self.dir_bytes(src)?;
        let mut nodes = Vec::new();
        let mut lfn_run: Vec<FatLfnEntry> = Vec::new();

        for slot in bytes.chunks_exact(FAT_DIR_ENTRY_SIZE as usize) {
            if slot[0] == FAT_ENTRY_FREE {
                break;
            }
            if slot[0] == FAT_ENTRY_DELETED {
                lfn_run.clear();
                continue;
            }
            if slot[11] == FatAttributes::LFN {
                if let Ok(lfn) = zerocopy::FromBytes::read_from_bytes(slot) {
                    lfn_run.push(lfn);
                }
                continue;
            }

            let entry: FatDirEntry = zerocopy::FromBytes::read_from_bytes(slot)
                .map_err(|_| FsError::Corrupt("Short directory slot"))?;
            let attrs = FatAttributes::from_bits_truncate(entry.attr);
            if attrs.contains(FatAttributes::VOLUME_ID) {
                lfn_run.clear();
                continue;
            }

            let mut short = entry.name;
            if short[0] == FAT_ENTRY_KANJI_E5 {
                short[0] = FAT_ENTRY_DELETED;
            }
            if short[0] == b'.' {
                // '.' and '..' bookkeeping entries.
                lfn_run.clear();
                continue;
            }

            let name = if !lfn_run.is_empty()
                && lfn_run.iter().all(|l| l.checksum == utils::sfn_checksum(&short))
            {
                utils::decode_lfn(&lfn_run)?
            } else {
                utils::decode_sfn(&short)?
            };
            lfn_run.clear();
            nodes.push(RawNode { entry, name });
        }
        Ok(nodes)
    }

    fn root_source(&self) -> DirSource {
        match self.meta.fat_type {
            FatType::Fat32 => DirSource::Chain(self.meta.root_cluster),
            _ => DirSource::Fixed(
                self.meta.root_dir_offset(),
                self.meta.root_dir_sectors as u64 * self.meta.bytes_per_sector as u64,
            ),
        }
    }

    /// Resolves all but nothing of the root; `None` means the path is
    /// the root directory itself.
    fn resolve(&mut self, path: &str) -> FsResult<Option<RawNode>> {
        let mut src = self.root_source();
        let mut found: Option<RawNode> = None;

        for comp in path_components(path) {
            // Descend from the previous match first.
            if let Some(node) = found.take() {
                let attrs = FatAttributes::from_bits_truncate(node.entry.attr);
                if !attrs.contains(FatAttributes::DIRECTORY) {
                    return Err(FsError::NotADirectory);
                }
                src = DirSource::Chain(node.entry.first_cluster());
            }
            let nodes = self.parse_dir(src)?;
            found = Some(
                nodes
                    .into_iter()
                    .find(|n| n.name.eq_ignore_ascii_case(comp))
                    .ok_or(FsError::NotFound)?,
            );
        }
        Ok(found)
    }

    fn read_chain_bytes(&mut self, entry: &FatDirEntry) -> FsResult<Vec<u8>> {
        let size = entry.file_size as usize;
        if size == 0 || entry.first_cluster() < FAT_FIRST_DATA_CLUSTER {
            return Ok(Vec::new());
        }
        let bpc = self.meta.bytes_per_cluster() as usize;
        let chain = self.walk_chain(entry.first_cluster())?;
        let mut buf = vec![0u8; chain.len() * bpc];
        for (i, &cluster) in chain.iter().enumerate() {
            let off = self.meta.cluster_offset(cluster);
            self.io.read_at(off, &mut buf[i * bpc..(i + 1) * bpc])?;
        }
        if buf.len() < size {
            return Err(FsError::Corrupt("Chain shorter than file size"));
        }
        buf.truncate(size);
        Ok(buf)
    }
}

fn node_kind(entry: &FatDirEntry) -> NodeKind {
    if FatAttributes::from_bits_truncate(entry.attr).contains(FatAttributes::DIRECTORY) {
        NodeKind::Dir
    } else {
        NodeKind::File
    }
}

fn label_from_bytes(raw: &[u8; 11]) -> Option<String> {
    let trimmed: &[u8] = {
        let mut end = raw.len();
        while end > 0 && (raw[end - 1] == b' ' || raw[end - 1] == 0) {
            end -= 1;
        }
        &raw[..end]
    };
    if trimmed.is_empty() {
        return None;
    }
    core::str::from_utf8(trimmed).ok().map(String::from)
}

impl<IO: BlockIO> FsVolume for FatVolume<IO> {
    fn format_tag(&self) -> FormatTag {
        FormatTag::Fat
    }

    fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn volume_size(&self) -> u64 {
        self.meta.volume_bytes()
    }

    fn lookup(&mut self, path: &str) -> FsResult<NodeInfo> {
        match self.resolve(path)? {
            None => Ok(NodeInfo {
                name: String::from("/"),
                kind: NodeKind::Dir,
                size: 0,
                mtime: None,
            }),
            Some(node) => Ok(NodeInfo {
                kind: node_kind(&node.entry),
                size: node.entry.file_size as u64,
                mtime: {
                    let (date, time) = (node.entry.write_date, node.entry.write_time);
                    utils::decode_datetime(date, time)
                },
                name: node.name,
            }),
        }
    }

    fn read_dir(&mut self, path: &str) -> FsResult<Vec<DirEntry>> {
        let src = match self.resolve(path)? {
            None => self.root_source(),
            Some(node) => {
                let attrs = FatAttributes::from_bits_truncate(node.entry.attr);
                if !attrs.contains(FatAttributes::DIRECTORY) {
                    return Err(FsError::NotADirectory);
                }
                DirSource::Chain(node.entry.first_cluster())
            }
        };
        let nodes = self.parse_dir(src)?;
        Ok(nodes
            .into_iter()
            .map(|n| DirEntry {
                kind: node_kind(&n.entry),
                size: n.entry.file_size as u64,
                name: n.name,
            })
            .collect())
    }

    fn read_file(&mut self, path: &str) -> FsResult<Vec<u8>> {
        let node = self.resolve(path)?.ok_or(FsError::NotAFile)?;
        if node_kind(&node.entry) != NodeKind::File {
            return Err(FsError::NotAFile);
        }
        self.read_chain_bytes(&node.entry)
    }

    fn read_file_at(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        // Whole-file read then slice; FAT files this library handles
        // are small enough that chasing the chain twice is not worth
        // the complexity.
        let data = self.read_file(path)?;
        if offset >= data.len() as u64 {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }
}
