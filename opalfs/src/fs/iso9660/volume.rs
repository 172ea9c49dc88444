// SPDX-License-Identifier: MIT

#[cfg(all(not(feature = "std"), feature = "alloc"))]
use alloc::{string::String, vec::Vec};

use bitflags::bitflags;
use log::debug;
use opalio::prelude::*;
use zerocopy::FromBytes;

use crate::core::errors::*;
use crate::core::utils::path_utils::*;
use crate::core::volume::*;
use crate::ensure;
use crate::fs::iso9660::{susp, types::*};

bitflags! {
    /// Mount flags excluding specific hybrid namespaces.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct IsoFlags: u32 {
        const NO_UDF    = 1 << 0;
        const NO_JOLIET = 1 << 1;
        const NO_ROCK   = 1 << 2;
    }
}

pub const ISO_FLAGS_VALID_MASK: u32 = 0x7;

/// The namespace a mounted volume serves names from.
///
/// When several are embedded in one image and not excluded by flags,
/// the fixed priority is UDF > Joliet > Rock Ridge > plain ISO9660.
/// UDF itself is detected but not mounted; selecting it reports
/// `Unsupported` so callers can retry with [`IsoFlags::NO_UDF`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsoNamespace {
    Joliet,
    RockRidge,
    Plain,
}

/// Parsed descriptor index kept for the life of the mount.
#[derive(Debug, Clone)]
pub struct IsoMeta {
    pub namespace: IsoNamespace,
    pub block_size: u32,
    pub volume_space_blocks: u32,
    root_extent: u32,
    root_size: u32,
    susp_skip: usize,
    label: Option<String>,
}

/// A mounted ISO9660 volume.
pub struct IsoVolume<IO: BlockIO> {
    io: IO,
    meta: IsoMeta,
}

/// One decoded directory record.
#[derive(Debug, Clone)]
struct IsoNode {
    name: String,
    extent: u32,
    size: u32,
    is_dir: bool,
    multi_extent: bool,
    mtime: Option<time::OffsetDateTime>,
}

struct DescriptorSet {
    pvd: Option<IsoVolDesc>,
    joliet_svd: Option<IsoVolDesc>,
    udf: bool,
}

impl<IO: BlockIO> IsoVolume<IO> {
    pub fn open(mut io: IO, flags: IsoFlags) -> OpenResult<Self> {
        let meta = Self::parse(&mut io, flags)?;
        Ok(Self::assemble(io, meta))
    }

    pub(crate) fn assemble(io: IO, meta: IsoMeta) -> Self {
        Self { io, meta }
    }

    pub fn meta(&self) -> &IsoMeta {
        &self.meta
    }

    pub fn active_namespace(&self) -> IsoNamespace {
        self.meta.namespace
    }

    pub fn into_inner(self) -> IO {
        self.io
    }

    pub(crate) fn parse(io: &mut IO, flags: IsoFlags) -> OpenResult<IsoMeta> {
        // Parameter validation precedes any I/O.
        ensure!(
            flags.bits() & !ISO_FLAGS_VALID_MASK == 0,
            OpenError::InvalidParameter("unrecognized ISO9660 mount flag bits")
        );

        let set = Self::scan_descriptors(io)?;
        let pvd = match set.pvd {
            Some(pvd) => pvd,
            None if set.udf => {
                // Pure UDF, no ISO9660 bridge.
                return Err(OpenError::unsupported(
                    "iso9660",
                    "udf",
                    "UDF without an ISO9660 bridge is not supported".into(),
                ));
            }
            None => {
                return Err(OpenError::corrupt(
                    "iso9660",
                    "primary_volume_descriptor",
                    "descriptor set has no primary volume descriptor".into(),
                ));
            }
        };

        let block_size = validate_pvd(&pvd)?;

        // Rock Ridge announces itself in the root '.' record.
        let root = root_record(&pvd)?;
        let susp_skip = if flags.contains(IsoFlags::NO_ROCK) {
            None
        } else {
            Self::probe_rock_ridge(io, &root)?
        };

        // Priority: UDF > Joliet > Rock Ridge > plain.
        if set.udf && !flags.contains(IsoFlags::NO_UDF) {
            return Err(OpenError::unsupported(
                "iso9660",
                "udf",
                "UDF bridge volume; mount with NO_UDF to use the ISO9660 namespace".into(),
            ));
        }

        let joliet = set.joliet_svd.filter(|_| !flags.contains(IsoFlags::NO_JOLIET));
        let (namespace, active) = if let Some(svd) = joliet {
            (IsoNamespace::Joliet, svd)
        } else if susp_skip.is_some() {
            (IsoNamespace::RockRidge, pvd)
        } else {
            (IsoNamespace::Plain, pvd)
        };
        debug!("iso9660: active namespace {:?}", namespace);

        let active_root = root_record(&active)?;
        let label = match namespace {
            IsoNamespace::Joliet => decode_ucs2_be(&active.volume_id),
            _ => decode_ascii_field(&active.volume_id),
        };
        let space_le = active.space_size_le;

        Ok(IsoMeta {
            namespace,
            block_size,
            volume_space_blocks: space_le,
            root_extent: active_root.0,
            root_size: active_root.1,
            susp_skip: susp_skip.unwrap_or(0),
            label,
        })
    }

    fn scan_descriptors(io: &mut IO) -> OpenResult<DescriptorSet> {
        let mut set = DescriptorSet {
            pvd: None,
            joliet_svd: None,
            udf: false,
        };
        let mut sector = [0u8; ISO_SECTOR_SIZE as usize];
        let mut terminated = false;

        for i in 0..64u64 {
            let offset = (ISO_DESC_AREA_SECTOR + i) * ISO_SECTOR_SIZE;
            if io.read_at(offset, &mut sector).is_err() {
                // Ran off the end of the image.
                ensure!(i != 0, OpenError::NotThisFormat);
                break;
            }
            let desc = IsoVolDesc::read_from_prefix(&sector[..])
                .map(|(d, _)| d)
                .map_err(|_| OpenError::NotThisFormat)?;

            if desc.std_id != *ISO_STD_ID {
                if desc.std_id == *UDF_BEA_ID
                    || desc.std_id == *UDF_NSR2_ID
                    || desc.std_id == *UDF_NSR3_ID
                {
                    set.udf = set.udf || desc.std_id != *UDF_BEA_ID;
                    if !terminated && i == 0 {
                        // Pure UDF recognition area at sector 16.
                        set.udf = true;
                    }
                    continue;
                }
                if desc.std_id == *UDF_TEA_ID {
                    break;
                }
                ensure!(i != 0, OpenError::NotThisFormat);
                if terminated {
                    break;
                }
                continue;
            }

            match desc.desc_type {
                ISO_DESC_TYPE_PRIMARY if set.pvd.is_none() => set.pvd = Some(desc),
                ISO_DESC_TYPE_SUPPLEMENTARY if set.joliet_svd.is_none() => {
                    if joliet_level(&desc.escape_sequences).is_some() {
                        set.joliet_svd = Some(desc);
                    }
                }
                ISO_DESC_TYPE_TERMINATOR => {
                    // The UDF volume recognition sequence, if any,
                    // follows the ISO descriptor set.
                    terminated = true;
                }
                _ => {}
            }
        }
        Ok(set)
    }

    fn probe_rock_ridge(io: &mut IO, root: &(u32, u32)) -> OpenResult<Option<usize>> {
        let mut block = [0u8; ISO_SECTOR_SIZE as usize];
        io.read_at(root.0 as u64 * ISO_SECTOR_SIZE, &mut block)?;

        let Ok((rec, _)) = IsoDirRecord::read_from_prefix(&block[..]) else {
            return Ok(None);
        };
        let rec_len = rec.record_len as usize;
        let name_len = rec.name_len as usize;
        if rec_len == 0 || rec_len > block.len() || name_len != 1 {
            return Ok(None);
        }
        let su_start = 33 + name_len + (1 - name_len % 2);
        if su_start >= rec_len {
            return Ok(None);
        }
        Ok(susp::detect_rock_ridge(&block[su_start..rec_len]))
    }

    fn read_extent(&mut self, extent: u32, len: u32) -> FsResult<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        self.io
            .read_at(extent as u64 * self.meta.block_size as u64, &mut buf)?;
        Ok(buf)
    }

    /// Walks one directory extent into decoded nodes.
    fn parse_dir(&mut self, extent: u32, len: u32) -> FsResult<Vec<IsoNode>> {
        let block_size = self.meta.block_size as usize;
        let bytes = self.read_extent(extent, len)?;
        let mut nodes = Vec::new();
        let mut pos = 0usize;

        while pos < bytes.len() {
            if bytes[pos] == 0 {
                // Records never straddle block boundaries; a zero
                // length byte pads to the next block.
                pos = (pos / block_size + 1) * block_size;
                continue;
            }
            let rec = IsoDirRecord::read_from_prefix(&bytes[pos..])
                .map(|(r, _)| r)
                .map_err(|_| FsError::Corrupt("Truncated directory record"))?;
            let rec_len = rec.record_len as usize;
            let name_len = rec.name_len as usize;
            if rec_len < 33 + name_len || pos + rec_len > bytes.len() {
                return Err(FsError::Corrupt("Directory record length out of bounds"));
            }
            let name_raw = &bytes[pos + 33..pos + 33 + name_len];
            let su_start = pos + 33 + name_len + (1 - name_len % 2);
            let su = if su_start < pos + rec_len {
                &bytes[su_start + self.meta.susp_skip.min(pos + rec_len - su_start)
                    ..pos + rec_len]
            } else {
                &[]
            };
            pos += rec_len;

            // '.' and '..' slots.
            if name_raw == [0x00] || name_raw == [0x01] {
                continue;
            }

            let name = match self.meta.namespace {
                IsoNamespace::Joliet => decode_ucs2_be(name_raw),
                IsoNamespace::RockRidge => {
                    susp::alternate_name(su).or_else(|| decode_ascii_field(name_raw))
                }
                IsoNamespace::Plain => decode_ascii_field(name_raw),
            };
            let Some(mut name) = name else {
                continue; // undecodable name; skip rather than fail the listing
            };
            if !rec.is_directory() {
                name = strip_version(&name);
            }

            nodes.push(IsoNode {
                name,
                extent: rec.extent_lba_le,
                size: rec.data_len_le,
                is_dir: rec.is_directory(),
                multi_extent: rec.flags & ISO_DIRREC_FLAG_MULTI_EXTENT != 0,
                mtime: decode_recording_time(&rec.recording_time),
            });
        }
        Ok(nodes)
    }

    fn name_matches(&self, node: &IsoNode, comp: &str) -> bool {
        match self.meta.namespace {
            // Rock Ridge names are POSIX names: case-sensitive.
            IsoNamespace::RockRidge => node.name == comp,
            _ => node.name.eq_ignore_ascii_case(comp),
        }
    }

    fn resolve(&mut self, path: &str) -> FsResult<Option<IsoNode>> {
        let mut dir = (self.meta.root_extent, self.meta.root_size);
        let mut found: Option<IsoNode> = None;

        for comp in path_components(path) {
            if let Some(node) = found.take() {
                if !node.is_dir {
                    return Err(FsError::NotADirectory);
                }
                dir = (node.extent, node.size);
            }
            let nodes = self.parse_dir(dir.0, dir.1)?;
            found = Some(
                nodes
                    .into_iter()
                    .find(|n| self.name_matches(n, comp))
                    .ok_or(FsError::NotFound)?,
            );
        }
        Ok(found)
    }
}

fn validate_pvd(pvd: &IsoVolDesc) -> OpenResult<u32> {
    let version = pvd.version;
    ensure!(
        version == 1,
        OpenError::unsupported(
            "iso9660",
            "version",
            format!("descriptor version {version} not implemented")
        )
    );
    let (bs_le, bs_be) = (pvd.block_size_le, pvd.block_size_be);
    ensure!(
        bs_le == bs_be.swap_bytes(),
        OpenError::corrupt(
            "iso9660",
            "block_size",
            format!("both-endian halves disagree ({bs_le} vs {})", bs_be.swap_bytes())
        )
    );
    let (sp_le, sp_be) = (pvd.space_size_le, pvd.space_size_be);
    ensure!(
        sp_le == sp_be.swap_bytes(),
        OpenError::corrupt(
            "iso9660",
            "volume_space_size",
            format!("both-endian halves disagree ({sp_le} vs {})", sp_be.swap_bytes())
        )
    );
    ensure!(
        bs_le as u64 == ISO_SECTOR_SIZE,
        OpenError::unsupported(
            "iso9660",
            "block_size",
            format!("only 2048-byte blocks are supported, got {bs_le}")
        )
    );
    Ok(bs_le as u32)
}

fn root_record(desc: &IsoVolDesc) -> OpenResult<(u32, u32)> {
    let rec = IsoDirRecord::read_from_prefix(&desc.root_dir_record[..])
        .map(|(r, _)| r)
        .map_err(|_| {
            OpenError::corrupt(
                "iso9660",
                "root_dir_record",
                "record shorter than its fixed header".into(),
            )
        })?;
    ensure!(
        rec.is_directory(),
        OpenError::corrupt(
            "iso9660",
            "root_dir_record",
            "root record is not marked as a directory".into(),
        )
    );
    Ok((rec.extent_lba_le, rec.data_len_le))
}

/// Joliet UCS-2 level from an SVD's escape sequences (1..=3), `None`
/// when the SVD is not Joliet.
pub fn joliet_level(escape_sequences: &[u8; 32]) -> Option<u8> {
    for window in escape_sequences.windows(3) {
        if window[0] == 0x25 && window[1] == 0x2F {
            match window[2] {
                0x40 => return Some(1),
                0x43 => return Some(2),
                0x45 => return Some(3),
                _ => {}
            }
        }
    }
    None
}

fn decode_ascii_field(raw: &[u8]) -> Option<String> {
    let end = raw
        .iter()
        .rposition(|&b| b != b' ' && b != 0)
        .map(|p| p + 1)
        .unwrap_or(0);
    if end == 0 {
        return None;
    }
    core::str::from_utf8(&raw[..end]).ok().map(String::from)
}

fn decode_ucs2_be(raw: &[u8]) -> Option<String> {
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|p| u16::from_be_bytes([p[0], p[1]]))
        .take_while(|&u| u != 0)
        .collect();
    let s = String::from_utf16(&units).ok()?;
    let trimmed = s.trim_end_matches(' ');
    if trimmed.is_empty() {
        None
    } else {
        Some(String::from(trimmed))
    }
}

/// Strips the ISO9660 ";1" version suffix and a trailing '.' left by
/// extensionless names.
fn strip_version(name: &str) -> String {
    let base = name.split(';').next().unwrap_or(name);
    String::from(base.strip_suffix('.').unwrap_or(base))
}

impl<IO: BlockIO> FsVolume for IsoVolume<IO> {
    fn format_tag(&self) -> FormatTag {
        FormatTag::Iso9660
    }

    fn label(&self) -> Option<&str> {
        self.meta.label.as_deref()
    }

    fn volume_size(&self) -> u64 {
        self.meta.volume_space_blocks as u64 * self.meta.block_size as u64
    }

    fn lookup(&mut self, path: &str) -> FsResult<NodeInfo> {
        match self.resolve(path)? {
            None => Ok(NodeInfo {
                name: String::from("/"),
                kind: NodeKind::Dir,
                size: self.meta.root_size as u64,
                mtime: None,
            }),
            Some(node) => Ok(NodeInfo {
                kind: if node.is_dir { NodeKind::Dir } else { NodeKind::File },
                size: node.size as u64,
                mtime: node.mtime,
                name: node.name,
            }),
        }
    }

    fn read_dir(&mut self, path: &str) -> FsResult<Vec<DirEntry>> {
        let dir = match self.resolve(path)? {
            None => (self.meta.root_extent, self.meta.root_size),
            Some(node) => {
                if !node.is_dir {
                    return Err(FsError::NotADirectory);
                }
                (node.extent, node.size)
            }
        };
        let nodes = self.parse_dir(dir.0, dir.1)?;
        Ok(nodes
            .into_iter()
            .map(|n| DirEntry {
                kind: if n.is_dir { NodeKind::Dir } else { NodeKind::File },
                size: n.size as u64,
                name: n.name,
            })
            .collect())
    }

    fn read_file(&mut self, path: &str) -> FsResult<Vec<u8>> {
        let node = self.resolve(path)?.ok_or(FsError::NotAFile)?;
        if node.is_dir {
            return Err(FsError::NotAFile);
        }
        if node.multi_extent {
            return Err(FsError::Unsupported("Multi-extent files not supported"));
        }
        self.read_extent(node.extent, node.size)
    }

    fn read_file_at(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let node = self.resolve(path)?.ok_or(FsError::NotAFile)?;
        if node.is_dir {
            return Err(FsError::NotAFile);
        }
        if node.multi_extent {
            return Err(FsError::Unsupported("Multi-extent files not supported"));
        }
        if offset >= node.size as u64 {
            return Ok(0);
        }
        let n = buf.len().min((node.size as u64 - offset) as usize);
        let base = node.extent as u64 * self.meta.block_size as u64;
        self.io.read_at(base + offset, &mut buf[..n])?;
        Ok(n)
    }
}

#[cfg(all(test, feature = "std", feature = "mem"))]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_flags_rejected_before_io() {
        // Zero-sized backing: any I/O attempt would error, so passing
        // means the flag check came first.
        let mut img = [0u8; 0];
        let mut io = MemBlockIO::new(&mut img);
        let err = IsoVolume::parse(&mut io, IsoFlags::from_bits_retain(0x80)).err();
        assert!(matches!(err, Some(OpenError::InvalidParameter(_))));
    }

    #[test]
    fn test_zero_buffer_is_not_this_format() {
        let mut img = vec![0u8; 40 * 2048];
        let io = MemBlockIO::new(&mut img);
        let err = IsoVolume::open(io, IsoFlags::empty()).err();
        assert!(matches!(err, Some(OpenError::NotThisFormat)));
    }

    #[test]
    fn test_joliet_level() {
        let mut esc = [0u8; 32];
        esc[0] = 0x25;
        esc[1] = 0x2F;
        esc[2] = 0x45;
        assert_eq!(joliet_level(&esc), Some(3));
        assert_eq!(joliet_level(&[0u8; 32]), None);
    }

    #[test]
    fn test_strip_version() {
        assert_eq!(strip_version("README.TXT;1"), "README.TXT");
        assert_eq!(strip_version("NOEXT.;1"), "NOEXT");
    }
}
