// SPDX-License-Identifier: MIT

#[cfg(all(not(feature = "std"), feature = "alloc"))]
use alloc::{string::String, vec::Vec};

use log::debug;
use opalio::prelude::*;
use zerocopy::FromBytes;

use crate::core::errors::*;
use crate::core::utils::path_utils::*;
use crate::core::volume::*;
use crate::fs::ntfs::types::*;

/// One run of a non-resident attribute: cluster count plus starting
/// LCN, `None` for sparse runs.
type RunList = Vec<(u64, Option<u64>)>;

/// Geometry and bootstrap state derived from the boot sector plus the
/// $MFT record itself. The $MFT data run list is resolved up front so
/// record lookup works on fragmented volumes.
#[derive(Debug, Clone)]
pub struct NtfsMeta {
    pub bytes_per_sector: u32,
    pub cluster_size: u32,
    pub mft_record_size: u32,
    pub total_sectors: u64,
    pub serial: u64,
    pub version: (u8, u8),
    mft_runs: RunList,
    volume_label: Option<String>,
}

impl NtfsMeta {
    #[inline]
    pub fn volume_bytes(&self) -> u64 {
        self.total_sectors * self.bytes_per_sector as u64
    }
}

/// A mounted NTFS volume. Read-only; resident and non-resident $DATA
/// streams, small (resident) directory indexes.
pub struct NtfsVolume<IO: BlockIO> {
    io: IO,
    meta: NtfsMeta,
}

/// A directory index entry after name decode.
#[derive(Debug, Clone)]
struct NtfsNode {
    record: u64,
    name: String,
    is_dir: bool,
    size: u64,
    mtime: Option<time::OffsetDateTime>,
}

impl<IO: BlockIO> NtfsVolume<IO> {
    pub fn open(mut io: IO) -> OpenResult<Self> {
        let meta = Self::parse(&mut io)?;
        Ok(Self::assemble(io, meta))
    }

    /// Probe entry: boot sector validation, then enough of the MFT to
    /// know record lookup will work ($MFT run list, $Volume record).
    pub(crate) fn parse(io: &mut IO) -> OpenResult<NtfsMeta> {
        if io.size()? < 512 {
            return Err(OpenError::NotThisFormat);
        }
        let mut sector = [0u8; 512];
        io.read_at(0, &mut sector)?;
        let bs = NtfsBootSector::read_from_bytes(&sector)
            .map_err(|_| OpenError::NotThisFormat)?;

        if bs.oem_name != *NTFS_OEM_ID {
            return Err(OpenError::NotThisFormat);
        }
        // Legacy BPB fields NTFS keeps zero; nonzero means some other
        // VBR carrying a lookalike OEM string.
        let (fats, roots, tot16, fat16, tot32) = (
            bs.num_fats,
            bs.root_entry_count,
            bs.total_sectors_16,
            bs.fat_size_16,
            bs.total_sectors_32,
        );
        if fats != 0 || roots != 0 || tot16 != 0 || fat16 != 0 || tot32 != 0 {
            return Err(OpenError::NotThisFormat);
        }

        let bps = bs.bytes_per_sector as u32;
        if !bps.is_power_of_two() || !(512..=4096).contains(&bps) {
            return Err(OpenError::corrupt(
                "ntfs",
                "bytes_per_sector",
                format!("expected power of two in 512..=4096, got {bps}"),
            ));
        }
        let spc = bs.sectors_per_cluster;
        if !spc.is_power_of_two() {
            // Encodings above 0x80 mean 2^(256-n) sectors, all of which
            // land over the 64K cluster ceiling.
            return Err(OpenError::unsupported(
                "ntfs",
                "sectors_per_cluster",
                format!("encoding {spc:#04x} exceeds the 64K cluster limit"),
            ));
        }
        let cluster_size = bps * spc as u32;
        if cluster_size > NTFS_MAX_CLUSTER_SIZE {
            return Err(OpenError::unsupported(
                "ntfs",
                "sectors_per_cluster",
                format!("cluster size {cluster_size} over 64K"),
            ));
        }

        let media_size = io.size()?;
        let total_sectors = bs.total_sectors;
        let volume_bytes = total_sectors
            .checked_mul(bps as u64)
            .filter(|&v| v != 0 && v <= media_size)
            .ok_or_else(|| {
                OpenError::corrupt(
                    "ntfs",
                    "total_sectors",
                    format!("{total_sectors} sectors do not fit the medium"),
                )
            })?;

        let cpr = bs.clusters_per_mft_record;
        let record_size = if cpr > 0 {
            cpr as u32 * cluster_size
        } else {
            1u32.checked_shl((-(cpr as i32)) as u32).unwrap_or(0)
        };
        if !record_size.is_power_of_two() || !(256..=65536).contains(&record_size) {
            return Err(OpenError::corrupt(
                "ntfs",
                "clusters_per_mft_record",
                format!("encoding {cpr} yields record size {record_size}"),
            ));
        }

        let mft_lcn = bs.mft_lcn;
        let mft_offset = mft_lcn
            .checked_mul(cluster_size as u64)
            .filter(|off| off + record_size as u64 <= volume_bytes)
            .ok_or_else(|| {
                OpenError::corrupt("ntfs", "mft_lcn", format!("LCN {mft_lcn} outside the volume"))
            })?;

        // Bootstrap: record 0 describes where every other record lives.
        let mut rec0 = vec![0u8; record_size as usize];
        io.read_at(mft_offset, &mut rec0)?;
        apply_fixups(&mut rec0, bps).map_err(|e| open_err("mft_record_0", e))?;
        let (_, data) = find_attr(&rec0, ATTR_DATA)
            .map_err(|e| open_err("mft_record_0", e))?
            .ok_or_else(|| {
                OpenError::corrupt("ntfs", "mft_record_0", String::from("$MFT has no $DATA"))
            })?;
        let mft_runs = match attr_content(data).map_err(|e| open_err("mft_record_0", e))? {
            AttrContent::Resident(_) => {
                return Err(OpenError::corrupt(
                    "ntfs",
                    "mft_record_0",
                    String::from("resident $MFT data"),
                ));
            }
            AttrContent::NonResident(_, runs) => runs,
        };

        let mut meta = NtfsMeta {
            bytes_per_sector: bps,
            cluster_size,
            mft_record_size: record_size,
            total_sectors,
            serial: bs.serial,
            version: (0, 0),
            mft_runs,
            volume_label: None,
        };

        let rec3 = load_record(io, &meta, MFT_REC_VOLUME)
            .map_err(|e| open_err("mft_record_3", e))?;
        if let Some((_, attr)) =
            find_attr(&rec3, ATTR_VOLUME_NAME).map_err(|e| open_err("mft_record_3", e))?
            && let AttrContent::Resident(value) =
                attr_content(attr).map_err(|e| open_err("mft_record_3", e))?
            && !value.is_empty()
        {
            meta.volume_label = decode_utf16le(value);
        }
        if let Some((_, attr)) =
            find_attr(&rec3, ATTR_VOLUME_INFORMATION).map_err(|e| open_err("mft_record_3", e))?
            && let AttrContent::Resident(value) =
                attr_content(attr).map_err(|e| open_err("mft_record_3", e))?
            && let Ok(info) = VolumeInfoAttr::read_from_prefix(value)
        {
            let (major, minor) = (info.0.major_version, info.0.minor_version);
            if major > 3 || (major == 3 && minor > 1) {
                return Err(OpenError::unsupported(
                    "ntfs",
                    "version",
                    format!("NTFS {major}.{minor} is newer than 3.1"),
                ));
            }
            meta.version = (major, minor);
        }
        Ok(meta)
    }

    pub(crate) fn assemble(io: IO, meta: NtfsMeta) -> Self {
        debug!(
            "ntfs: mounted v{}.{}, {} byte clusters, {} byte records",
            meta.version.0, meta.version.1, meta.cluster_size, meta.mft_record_size
        );
        Self { io, meta }
    }

    pub fn meta(&self) -> &NtfsMeta {
        &self.meta
    }

    pub fn into_inner(self) -> IO {
        self.io
    }

    fn record(&mut self, number: u64) -> FsResult<Vec<u8>> {
        load_record(&mut self.io, &self.meta, number)
    }

    /// Lists a directory record's resident index. Entries whose names
    /// live only in the DOS namespace are suppressed.
    fn list_dir(&mut self, record_number: u64) -> FsResult<Vec<NtfsNode>> {
        let record = self.record(record_number)?;
        let hdr = record_header(&record)?;
        if hdr.flags & MFT_RECORD_IS_DIRECTORY == 0 {
            return Err(FsError::NotADirectory);
        }
        let (_, attr) = find_attr(&record, ATTR_INDEX_ROOT)?
            .ok_or(FsError::Corrupt("Directory without index root"))?;
        let value = match attr_content(attr)? {
            AttrContent::Resident(v) => v,
            AttrContent::NonResident(..) => {
                return Err(FsError::Corrupt("Non-resident index root"));
            }
        };

        let root = IndexRootHeader::read_from_prefix(value)
            .map_err(|_| FsError::Corrupt("Short index root"))?
            .0;
        let indexed = root.indexed_attr_type;
        if indexed != ATTR_FILE_NAME {
            return Err(FsError::Corrupt("Index not keyed on file names"));
        }
        let node = IndexHeader::read_from_prefix(&value[16..])
            .map_err(|_| FsError::Corrupt("Short index header"))?
            .0;
        if node.flags & INDEX_FLAG_LARGE != 0 {
            return Err(FsError::Unsupported(
                "Directory index spills into allocation blocks",
            ));
        }

        let base = 16usize;
        let mut pos = base + node.entries_offset as usize;
        let end = (base + node.index_size as usize).min(value.len());
        let mut nodes = Vec::new();
        while pos + 16 <= end {
            let entry = IndexEntryHeader::read_from_prefix(&value[pos..])
                .map_err(|_| FsError::Corrupt("Short index entry"))?
                .0;
            if entry.flags & INDEX_ENTRY_LAST != 0 {
                break;
            }
            let entry_len = entry.entry_len as usize;
            if entry_len < 16 + 66 || pos + entry_len > end {
                return Err(FsError::Corrupt("Malformed index entry"));
            }
            let key = FileNameAttr::read_from_prefix(&value[pos + 16..])
                .map_err(|_| FsError::Corrupt("Short file name key"))?
                .0;
            let name_bytes = key.name_len as usize * 2;
            if pos + 16 + 66 + name_bytes > end {
                return Err(FsError::Corrupt("File name overruns index entry"));
            }
            if key.namespace != FILENAME_NAMESPACE_DOS {
                let raw = &value[pos + 16 + 66..pos + 16 + 66 + name_bytes];
                let (size, flags, mtime) = (key.real_size, key.flags, key.modification_time);
                nodes.push(NtfsNode {
                    record: entry.file_ref & MFT_REF_MASK,
                    name: decode_utf16le(raw).ok_or(FsError::Corrupt("Invalid UTF-16 name"))?,
                    is_dir: flags & FILE_FLAG_DIRECTORY != 0,
                    size,
                    mtime: decode_ntfs_time(mtime),
                });
            }
            pos += entry_len;
        }
        Ok(nodes)
    }

    /// `None` means the path is the root directory itself.
    fn resolve(&mut self, path: &str) -> FsResult<Option<NtfsNode>> {
        let mut dir = MFT_REC_ROOT;
        let mut found: Option<NtfsNode> = None;

        for comp in path_components(path) {
            if let Some(node) = found.take() {
                if !node.is_dir {
                    return Err(FsError::NotADirectory);
                }
                dir = node.record;
            }
            let nodes = self.list_dir(dir)?;
            found = Some(
                nodes
                    .into_iter()
                    .find(|n| n.name.eq_ignore_ascii_case(comp))
                    .ok_or(FsError::NotFound)?,
            );
        }
        Ok(found)
    }

    /// Positional read of a record's unnamed $DATA stream.
    fn read_data_at(&mut self, record_number: u64, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let record = self.record(record_number)?;
        let hdr = record_header(&record)?;
        if hdr.flags & MFT_RECORD_IS_DIRECTORY != 0 {
            return Err(FsError::NotAFile);
        }
        let (_, attr) = find_attr(&record, ATTR_DATA)?.ok_or(FsError::Corrupt("File has no data attribute"))?;
        match attr_content(attr)? {
            AttrContent::Resident(value) => {
                if offset >= value.len() as u64 {
                    return Ok(0);
                }
                let start = offset as usize;
                let n = buf.len().min(value.len() - start);
                buf[..n].copy_from_slice(&value[start..start + n]);
                Ok(n)
            }
            AttrContent::NonResident(tail, runs) => {
                let (data_size, init_size) = (tail.data_size, tail.init_size);
                if offset >= data_size {
                    return Ok(0);
                }
                let n = (buf.len() as u64).min(data_size - offset) as usize;
                let buf = &mut buf[..n];
                // Bytes past the initialized size read as zeros.
                let valid = init_size.saturating_sub(offset).min(n as u64) as usize;
                buf[valid..].fill(0);
                read_runs(
                    &mut self.io,
                    self.meta.cluster_size as u64,
                    &runs,
                    offset,
                    &mut buf[..valid],
                )?;
                Ok(n)
            }
        }
    }
}

/// Internal attribute payload: resident bytes or a run list.
enum AttrContent<'a> {
    Resident(&'a [u8]),
    NonResident(NonResidentAttrTail, RunList),
}

fn open_err(field: &'static str, e: FsError) -> OpenError {
    match e {
        FsError::IO(io) => OpenError::IO(io),
        FsError::Unsupported(msg) => OpenError::unsupported("ntfs", field, String::from(msg)),
        other => OpenError::corrupt("ntfs", field, String::from(other.msg())),
    }
}

fn record_header(record: &[u8]) -> FsResult<MftRecordHeader> {
    Ok(MftRecordHeader::read_from_prefix(record)
        .map_err(|_| FsError::Corrupt("Short MFT record"))?
        .0)
}

/// Verifies the multi-sector magic and update sequence, then restores
/// the original bytes under each sector-trailing sequence number.
fn apply_fixups(record: &mut [u8], bytes_per_sector: u32) -> FsResult {
    let hdr = record_header(record)?;
    if hdr.magic != NTFS_RECORD_MAGIC {
        return Err(FsError::Corrupt("Bad MFT record magic"));
    }
    let (usa_offset, usa_count) = (hdr.usa_offset as usize, hdr.usa_count as usize);
    let bps = bytes_per_sector as usize;
    if usa_count < 2
        || usa_offset + usa_count * 2 > record.len()
        || (usa_count - 1) * bps != record.len()
    {
        return Err(FsError::Corrupt("Bad update sequence array"));
    }
    let usn = [record[usa_offset], record[usa_offset + 1]];
    for i in 1..usa_count {
        let end = i * bps;
        if record[end - 2..end] != usn {
            debug!("ntfs: fixup mismatch in sector {} of record", i - 1);
            return Err(FsError::Corrupt("MFT record fixup mismatch"));
        }
        let slot = usa_offset + i * 2;
        let (a, b) = (record[slot], record[slot + 1]);
        record[end - 2] = a;
        record[end - 1] = b;
    }
    Ok(())
}

/// Finds the first unnamed attribute of `attr_type`; returns its header
/// and the whole attribute slice.
fn find_attr(record: &[u8], attr_type: u32) -> FsResult<Option<(AttrHeader, &[u8])>> {
    let hdr = record_header(record)?;
    let used = (hdr.bytes_used as usize).min(record.len());
    let mut off = hdr.attrs_offset as usize;
    while off + 16 <= used {
        let attr = AttrHeader::read_from_prefix(&record[off..])
            .map_err(|_| FsError::Corrupt("Short attribute header"))?
            .0;
        if attr.attr_type == ATTR_END {
            break;
        }
        let len = attr.length as usize;
        if len < 16 || len % 8 != 0 || off + len > used {
            return Err(FsError::Corrupt("Malformed attribute length"));
        }
        if attr.attr_type == attr_type && attr.name_len == 0 {
            return Ok(Some((attr, &record[off..off + len])));
        }
        off += len;
    }
    Ok(None)
}

fn attr_content(attr: &[u8]) -> FsResult<AttrContent<'_>> {
    let hdr = AttrHeader::read_from_prefix(attr)
        .map_err(|_| FsError::Corrupt("Short attribute header"))?
        .0;
    if hdr.non_resident == 0 {
        let tail = ResidentAttrTail::read_from_prefix(&attr[16..])
            .map_err(|_| FsError::Corrupt("Short resident attribute"))?
            .0;
        let (start, len) = (tail.value_offset as usize, tail.value_len as usize);
        if start + len > attr.len() {
            return Err(FsError::Corrupt("Resident value overruns attribute"));
        }
        Ok(AttrContent::Resident(&attr[start..start + len]))
    } else {
        let tail = NonResidentAttrTail::read_from_prefix(&attr[16..])
            .map_err(|_| FsError::Corrupt("Short non-resident attribute"))?
            .0;
        let start = tail.runs_offset as usize;
        if start > attr.len() {
            return Err(FsError::Corrupt("Run list overruns attribute"));
        }
        if tail.compression_unit != 0 {
            return Err(FsError::Unsupported("Compressed attribute stream"));
        }
        let runs = decode_runlist(&attr[start..])?;
        Ok(AttrContent::NonResident(tail, runs))
    }
}

/// Decodes a mapping-pairs run list. Each run carries a length and a
/// signed LCN delta relative to the previous run; a zero offset width
/// marks a sparse run.
fn decode_runlist(data: &[u8]) -> FsResult<RunList> {
    let mut runs = RunList::new();
    let mut lcn: i64 = 0;
    let mut pos = 0usize;
    while pos < data.len() {
        let header = data[pos];
        pos += 1;
        if header == 0 {
            break;
        }
        let len_size = (header & 0xF) as usize;
        let off_size = (header >> 4) as usize;
        if len_size == 0 || len_size > 8 || off_size > 8 || pos + len_size + off_size > data.len() {
            return Err(FsError::Corrupt("Malformed run list"));
        }
        let mut len = 0u64;
        for i in 0..len_size {
            len |= (data[pos + i] as u64) << (i * 8);
        }
        pos += len_size;
        if len == 0 {
            return Err(FsError::Corrupt("Zero-length run"));
        }
        if off_size == 0 {
            runs.push((len, None));
            continue;
        }
        let mut delta = 0i64;
        for i in 0..off_size {
            delta |= (data[pos + i] as i64) << (i * 8);
        }
        // Sign-extend the delta.
        let shift = 64 - off_size * 8;
        delta = (delta << shift) >> shift;
        pos += off_size;
        lcn += delta;
        if lcn < 0 {
            return Err(FsError::Corrupt("Run list walks below LCN zero"));
        }
        runs.push((len, Some(lcn as u64)));
    }
    Ok(runs)
}

/// Reads `buf.len()` bytes starting `offset` bytes into a run-mapped
/// stream. Sparse runs read as zeros.
fn read_runs<IO: BlockIO>(
    io: &mut IO,
    cluster_size: u64,
    runs: &[(u64, Option<u64>)],
    mut offset: u64,
    mut buf: &mut [u8],
) -> FsResult {
    for &(len, lcn) in runs {
        if buf.is_empty() {
            return Ok(());
        }
        let run_bytes = len
            .checked_mul(cluster_size)
            .ok_or(FsError::Corrupt("Run length overflow"))?;
        if offset >= run_bytes {
            offset -= run_bytes;
            continue;
        }
        let n = (buf.len() as u64).min(run_bytes - offset) as usize;
        let (chunk, rest) = core::mem::take(&mut buf).split_at_mut(n);
        match lcn {
            Some(lcn) => {
                let base = lcn
                    .checked_mul(cluster_size)
                    .ok_or(FsError::Corrupt("Run offset overflow"))?;
                io.read_at(base + offset, chunk)?;
            }
            None => chunk.fill(0),
        }
        buf = rest;
        offset = 0;
    }
    if buf.is_empty() {
        Ok(())
    } else {
        Err(FsError::Corrupt("Read past mapped runs"))
    }
}

/// Loads one MFT record through the $MFT run list and undoes its
/// fixups. Records may straddle run boundaries on fragmented volumes.
fn load_record<IO: BlockIO>(io: &mut IO, meta: &NtfsMeta, number: u64) -> FsResult<Vec<u8>> {
    let record_size = meta.mft_record_size as u64;
    let offset = number
        .checked_mul(record_size)
        .ok_or(FsError::Corrupt("MFT record number overflow"))?;
    let mut record = vec![0u8; record_size as usize];
    read_runs(io, meta.cluster_size as u64, &meta.mft_runs, offset, &mut record)?;
    apply_fixups(&mut record, meta.bytes_per_sector)?;
    let hdr = record_header(&record)?;
    if hdr.flags & MFT_RECORD_IN_USE == 0 {
        return Err(FsError::NotFound);
    }
    Ok(record)
}

fn decode_utf16le(raw: &[u8]) -> Option<String> {
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

impl<IO: BlockIO> FsVolume for NtfsVolume<IO> {
    fn format_tag(&self) -> FormatTag {
        FormatTag::Ntfs
    }

    fn label(&self) -> Option<&str> {
        self.meta.volume_label.as_deref()
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
                kind: if node.is_dir { NodeKind::Dir } else { NodeKind::File },
                size: node.size,
                mtime: node.mtime,
                name: node.name,
            }),
        }
    }

    fn read_dir(&mut self, path: &str) -> FsResult<Vec<DirEntry>> {
        let dir = match self.resolve(path)? {
            None => MFT_REC_ROOT,
            Some(node) if node.is_dir => node.record,
            Some(_) => return Err(FsError::NotADirectory),
        };
        Ok(self
            .list_dir(dir)?
            .into_iter()
            .map(|n| DirEntry {
                kind: if n.is_dir { NodeKind::Dir } else { NodeKind::File },
                size: n.size,
                name: n.name,
            })
            .collect())
    }

    fn read_file(&mut self, path: &str) -> FsResult<Vec<u8>> {
        let node = self.resolve(path)?.ok_or(FsError::NotAFile)?;
        if node.is_dir {
            return Err(FsError::NotAFile);
        }
        let mut data = vec![0u8; node.size as usize];
        let n = self.read_data_at(node.record, 0, &mut data)?;
        data.truncate(n);
        Ok(data)
    }

    fn read_file_at(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let node = self.resolve(path)?.ok_or(FsError::NotAFile)?;
        if node.is_dir {
            return Err(FsError::NotAFile);
        }
        self.read_data_at(node.record, offset, buf)
    }
}

#[cfg(all(test, feature = "std", feature = "mem"))]
mod tests {
    use super::*;
    use zerocopy::IntoBytes;

    const RECORD_SIZE: usize = 1024;
    const CLUSTER: u64 = 512;
    const MFT_LCN: u64 = 4;

    fn resident_attr(attr_type: u32, value: &[u8]) -> Vec<u8> {
        let len = (24 + value.len() + 7) & !7;
        let mut attr = vec![0u8; len];
        attr[0..4].copy_from_slice(&attr_type.to_le_bytes());
        attr[4..8].copy_from_slice(&(len as u32).to_le_bytes());
        // resident tail: value_len at 16, value_offset at 20
        attr[16..20].copy_from_slice(&(value.len() as u32).to_le_bytes());
        attr[20..22].copy_from_slice(&24u16.to_le_bytes());
        attr[24..24 + value.len()].copy_from_slice(value);
        attr
    }

    fn nonresident_data_attr(runs: &[u8], data_size: u64) -> Vec<u8> {
        let len = (64 + runs.len() + 7) & !7;
        let mut attr = vec![0u8; len];
        attr[0..4].copy_from_slice(&ATTR_DATA.to_le_bytes());
        attr[4..8].copy_from_slice(&(len as u32).to_le_bytes());
        attr[8] = 1; // non-resident
        attr[32..34].copy_from_slice(&64u16.to_le_bytes()); // runs_offset
        attr[40..48].copy_from_slice(&data_size.to_le_bytes()); // alloc
        attr[48..56].copy_from_slice(&data_size.to_le_bytes()); // data
        attr[56..64].copy_from_slice(&data_size.to_le_bytes()); // init
        attr[64..64 + runs.len()].copy_from_slice(runs);
        attr
    }

    /// Builds a fixed-up 1K MFT record from its attribute list.
    fn mft_record(flags: u16, attrs: &[Vec<u8>]) -> Vec<u8> {
        let mut rec = vec![0u8; RECORD_SIZE];
        rec[0..4].copy_from_slice(b"FILE");
        rec[4..6].copy_from_slice(&48u16.to_le_bytes()); // usa_offset
        rec[6..8].copy_from_slice(&3u16.to_le_bytes()); // usa_count
        rec[20..22].copy_from_slice(&56u16.to_le_bytes()); // attrs_offset
        rec[22..24].copy_from_slice(&flags.to_le_bytes());

        let mut off = 56;
        for attr in attrs {
            rec[off..off + attr.len()].copy_from_slice(attr);
            off += attr.len();
        }
        rec[off..off + 4].copy_from_slice(&ATTR_END.to_le_bytes());
        rec[24..28].copy_from_slice(&((off + 8) as u32).to_le_bytes()); // bytes_used

        // Apply fixups: stash the sector tails, stamp the sequence.
        rec[48..50].copy_from_slice(&1u16.to_le_bytes());
        for i in 1..3usize {
            let end = i * 512;
            let (a, b) = (rec[end - 2], rec[end - 1]);
            rec[48 + i * 2] = a;
            rec[48 + i * 2 + 1] = b;
            rec[end - 2..end].copy_from_slice(&1u16.to_le_bytes());
        }
        rec
    }

    fn utf16(name: &str) -> Vec<u8> {
        name.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    fn index_root(entries: &[(u64, &str, u32, u64)]) -> Vec<u8> {
        let mut value = vec![0u8; 32];
        value[0..4].copy_from_slice(&ATTR_FILE_NAME.to_le_bytes());
        value[16..20].copy_from_slice(&16u32.to_le_bytes()); // entries_offset

        for &(record, name, flags, size) in entries {
            let raw_name = utf16(name);
            let key_len = 66 + raw_name.len();
            let entry_len = (16 + key_len + 7) & !7;
            let mut entry = vec![0u8; entry_len];
            entry[0..8].copy_from_slice(&record.to_le_bytes());
            entry[8..10].copy_from_slice(&(entry_len as u16).to_le_bytes());
            entry[10..12].copy_from_slice(&(key_len as u16).to_le_bytes());
            let key = &mut entry[16..];
            key[48..56].copy_from_slice(&size.to_le_bytes()); // real_size
            key[56..60].copy_from_slice(&flags.to_le_bytes());
            key[64] = (raw_name.len() / 2) as u8; // name_len
            key[65] = 1; // Win32 namespace
            key[66..66 + raw_name.len()].copy_from_slice(&raw_name);
            value.extend_from_slice(&entry);
        }
        let mut last = vec![0u8; 16];
        last[8..10].copy_from_slice(&16u16.to_le_bytes());
        last[12..14].copy_from_slice(&INDEX_ENTRY_LAST.to_le_bytes());
        value.extend_from_slice(&last);

        let index_size = (value.len() - 16) as u32;
        value[20..24].copy_from_slice(&index_size.to_le_bytes());
        value[24..28].copy_from_slice(&index_size.to_le_bytes());
        resident_attr(ATTR_INDEX_ROOT, &value)
    }

    fn volume_info(major: u8, minor: u8) -> Vec<u8> {
        let info = VolumeInfoAttr {
            reserved: 0,
            major_version: major,
            minor_version: minor,
            flags: 0,
        };
        resident_attr(ATTR_VOLUME_INFORMATION, info.as_bytes())
    }

    fn build_image(version: (u8, u8)) -> Vec<u8> {
        let mut img = vec![0u8; 64 * 1024];
        img[3..11].copy_from_slice(b"NTFS    ");
        img[11..13].copy_from_slice(&512u16.to_le_bytes());
        img[13] = 1; // sectors per cluster
        img[40..48].copy_from_slice(&128u64.to_le_bytes()); // total sectors
        img[48..56].copy_from_slice(&MFT_LCN.to_le_bytes());
        img[64] = 0xF6; // 2^10 byte records
        img[72..80].copy_from_slice(&0x1234_5678_9ABC_DEF0u64.to_le_bytes());
        img[510] = 0x55;
        img[511] = 0xAA;

        // $MFT data: 16 clusters at LCN 4 (8 records).
        let rec0 = mft_record(
            MFT_RECORD_IN_USE,
            &[nonresident_data_attr(&[0x11, 0x10, MFT_LCN as u8, 0x00], 16 * CLUSTER)],
        );
        let rec3 = mft_record(
            MFT_RECORD_IN_USE,
            &[
                resident_attr(ATTR_VOLUME_NAME, &utf16("OPAL")),
                volume_info(version.0, version.1),
            ],
        );
        let rec5 = mft_record(
            MFT_RECORD_IN_USE | MFT_RECORD_IS_DIRECTORY,
            &[index_root(&[(6, "HELLO.TXT", 0, 5)])],
        );
        let rec6 = mft_record(MFT_RECORD_IN_USE, &[resident_attr(ATTR_DATA, b"hello")]);

        let mft = (MFT_LCN * CLUSTER) as usize;
        img[mft..mft + RECORD_SIZE].copy_from_slice(&rec0);
        img[mft + 3 * RECORD_SIZE..mft + 4 * RECORD_SIZE].copy_from_slice(&rec3);
        img[mft + 5 * RECORD_SIZE..mft + 6 * RECORD_SIZE].copy_from_slice(&rec5);
        img[mft + 6 * RECORD_SIZE..mft + 7 * RECORD_SIZE].copy_from_slice(&rec6);
        img
    }

    #[test]
    fn test_mount_and_read() {
        let mut img = build_image((3, 1));
        let io = MemBlockIO::new(&mut img);
        let mut vol = NtfsVolume::open(io).unwrap();

        assert_eq!(vol.label(), Some("OPAL"));
        assert_eq!(vol.meta().version, (3, 1));

        let entries = vol.read_dir("/").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "HELLO.TXT");
        assert_eq!(entries[0].size, 5);

        // Lookup is case-insensitive.
        let info = vol.lookup("/hello.txt").unwrap();
        assert_eq!(info.kind, NodeKind::File);
        assert_eq!(vol.read_file("/HELLO.TXT").unwrap(), b"hello");

        let mut two = [0u8; 2];
        assert_eq!(vol.read_file_at("/HELLO.TXT", 3, &mut two).unwrap(), 2);
        assert_eq!(&two, b"lo");
    }

    #[test]
    fn test_newer_version_is_unsupported() {
        let mut img = build_image((3, 2));
        let io = MemBlockIO::new(&mut img);
        match NtfsVolume::open(io) {
            Err(OpenError::Unsupported(diag)) => assert_eq!(diag.field, "version"),
            other => panic!("expected unsupported, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_fat_boot_sector_is_not_this_format() {
        // FAT-style BPB with nonzero legacy fields behind the OEM id.
        let mut img = vec![0u8; 64 * 1024];
        img[3..11].copy_from_slice(b"NTFS    ");
        img[16] = 2; // num_fats
        let io = MemBlockIO::new(&mut img);
        assert!(matches!(
            NtfsVolume::open(io),
            Err(OpenError::NotThisFormat)
        ));
    }

    #[test]
    fn test_fixup_mismatch_is_corrupt() {
        let mut img = build_image((3, 1));
        // Tear the second sector of record 0.
        let pos = (MFT_LCN * CLUSTER) as usize + 1022;
        img[pos] ^= 0xFF;
        let io = MemBlockIO::new(&mut img);
        match NtfsVolume::open(io) {
            Err(OpenError::Corrupt(diag)) => assert_eq!(diag.field, "mft_record_0"),
            other => panic!("expected corrupt, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_runlist_decoding() {
        // 0x21: 2-byte length, 1-byte offset.
        let runs = decode_runlist(&[0x21, 0x00, 0x01, 0x05, 0x11, 0x10, 0xFE, 0x00]).unwrap();
        assert_eq!(runs, vec![(0x100, Some(5)), (0x10, Some(3))]);

        // Sparse run: zero offset width.
        let runs = decode_runlist(&[0x01, 0x08, 0x00]).unwrap();
        assert_eq!(runs, vec![(8, None)]);

        assert!(decode_runlist(&[0x21, 0x00]).is_err());
    }
}
