// SPDX-License-Identifier: MIT

use log::debug;
use opalio::prelude::*;
use zerocopy::IntoBytes;

use crate::core::errors::*;
use crate::ensure;
use crate::fs::fat::{constant::*, meta::*, types::*, utils};

/// Geometry request for [`FatFormatter`]. Every field is independently
/// defaultable: zero (or `None`) means "derive from the volume size",
/// following the same heuristics real FAT formatters use so produced
/// images stay interoperable.
#[derive(Debug, Clone)]
pub struct FatFormatOptions {
    pub sector_size: u16,
    pub sectors_per_cluster: u8,
    pub fat_type: Option<FatType>,
    pub num_fats: u8,
    pub media_byte: u8,
    pub root_entries: u16,
    pub heads: u16,
    pub sectors_per_track: u16,
    pub hidden_sectors: u32,
    /// Skip the data-region fill; a full format writes `0xF6` over
    /// every data sector the way low-level formatting historically did.
    pub quick: bool,
    pub label: [u8; 11],
}

impl Default for FatFormatOptions {
    fn default() -> Self {
        Self {
            sector_size: 0,
            sectors_per_cluster: 0,
            fat_type: None,
            num_fats: 0,
            media_byte: 0,
            root_entries: 0,
            heads: 0,
            sectors_per_track: 0,
            hidden_sectors: 0,
            quick: false,
            label: [b' '; 11],
        }
    }
}

impl FatFormatOptions {
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = utils::encode_label(label);
        self
    }

    pub fn quick(mut self) -> Self {
        self.quick = true;
        self
    }
}

/// Writes FAT boot structures onto a sized backing.
///
/// Quick format writes boot sector + FATs + root directory only; full
/// format additionally fills the data region. A freshly formatted
/// volume reopens with an empty root directory.
pub struct FatFormatter<'a, IO: BlockIO + ?Sized> {
    io: &'a mut IO,
}

impl<'a, IO: BlockIO + ?Sized> FatFormatter<'a, IO> {
    pub fn new(io: &'a mut IO) -> Self {
        Self { io }
    }

    /// Designs the geometry for the backing's size and writes it out.
    /// Returns the final layout.
    pub fn format(&mut self, opts: &FatFormatOptions) -> OpenResult<FatMeta> {
        let volume_size = self.io.size()?;
        let meta = design_layout(volume_size, opts)?;
        debug!(
            "fat: formatting {} with {} clusters of {} bytes ({})",
            meta.fat_type.name(),
            meta.cluster_count,
            meta.bytes_per_cluster(),
            if opts.quick { "quick" } else { "full" }
        );

        if !opts.quick {
            self.fill_data_region(&meta)?;
        }
        self.write_boot_sector(&meta, opts)?;
        self.write_fat_region(&meta)?;
        self.write_root_dir(&meta)?;
        self.io.flush()?;
        Ok(meta)
    }

    fn write_boot_sector(&mut self, meta: &FatMeta, opts: &FatFormatOptions) -> OpenResult<()> {
        let mut sector = [0u8; 512];

        let total_16 = if meta.total_sectors <= u16::MAX as u32 && meta.fat_type != FatType::Fat32
        {
            meta.total_sectors as u16
        } else {
            0
        };
        let bpb = FatBpb {
            jump_boot: if meta.fat_type == FatType::Fat32 {
                FAT32_JUMP_BOOT
            } else {
                FAT_JUMP_BOOT
            },
            oem_name: *b"OPALFS  ",
            bytes_per_sector: meta.bytes_per_sector as u16,
            sectors_per_cluster: meta.sectors_per_cluster as u8,
            reserved_sectors: meta.reserved_sectors as u16,
            num_fats: meta.num_fats as u8,
            root_entry_count: meta.root_entry_count as u16,
            total_sectors_16: total_16,
            media: meta.media,
            fat_size_16: if meta.fat_type == FatType::Fat32 {
                0
            } else {
                meta.fat_size_sectors as u16
            },
            sectors_per_track: opts.sectors_per_track,
            num_heads: opts.heads,
            hidden_sectors: opts.hidden_sectors,
            total_sectors_32: if total_16 == 0 { meta.total_sectors } else { 0 },
        };
        sector[..36].copy_from_slice(bpb.as_bytes());

        match meta.fat_type {
            FatType::Fat32 => {
                let ebpb = FatEbpb32 {
                    fat_size_32: meta.fat_size_sectors,
                    ext_flags: 0,
                    fs_version: 0,
                    root_cluster: meta.root_cluster,
                    fsinfo_sector: FAT32_FSINFO_SECTOR,
                    backup_boot_sector: FAT32_VBR_BACKUP_SECTOR,
                    reserved: [0u8; 12],
                    drive_number: if meta.media == 0xF8 { 0x80 } else { 0x00 },
                    reserved1: 0,
                    boot_signature: FAT_BOOT_SIGNATURE,
                    volume_id: meta.volume_id,
                    volume_label: meta.volume_label,
                    fs_type: *b"FAT32   ",
                };
                sector[36..36 + 54].copy_from_slice(ebpb.as_bytes());
            }
            _ => {
                let ebpb = FatEbpb {
                    drive_number: if meta.media == 0xF8 { 0x80 } else { 0x00 },
                    reserved1: 0,
                    boot_signature: FAT_BOOT_SIGNATURE,
                    volume_id: meta.volume_id,
                    volume_label: meta.volume_label,
                    fs_type: if meta.fat_type == FatType::Fat12 {
                        *b"FAT12   "
                    } else {
                        *b"FAT16   "
                    },
                };
                sector[36..36 + 26].copy_from_slice(ebpb.as_bytes());
            }
        }
        sector[510..].copy_from_slice(&FAT_SIGNATURE.to_le_bytes());

        self.io.write_at(0, &sector)?;

        if meta.fat_type == FatType::Fat32 {
            let backup = FAT32_VBR_BACKUP_SECTOR as u64 * meta.bytes_per_sector as u64;
            self.io.write_at(backup, &sector)?;

            let fsinfo = FatFsInfo {
                lead_signature: FAT_FSINFO_LEAD_SIGNATURE,
                reserved1: [0u8; 480],
                struct_signature: FAT_FSINFO_STRUCT_SIGNATURE,
                free_cluster_count: FAT_FSINFO_UNKNOWN,
                next_free_cluster: meta.root_cluster + 1,
                reserved2: [0u8; 12],
                trail_signature: FAT_FSINFO_TRAIL_SIGNATURE,
            };
            let off = FAT32_FSINFO_SECTOR as u64 * meta.bytes_per_sector as u64;
            self.io.write_at(off, fsinfo.as_bytes())?;
            let backup_off = off + backup;
            self.io.write_at(backup_off, fsinfo.as_bytes())?;
        }
        Ok(())
    }

    fn write_fat_region(&mut self, meta: &FatMeta) -> OpenResult<()> {
        let fat_bytes = meta.fat_size_sectors as u64 * meta.bytes_per_sector as u64;
        for fat_index in 0..meta.num_fats {
            let offset = meta.fat_offset() + fat_index as u64 * fat_bytes;
            self.io.zero_fill(offset, fat_bytes as usize)?;

            // Reserved entries 0 and 1, plus the root chain on FAT32.
            match meta.fat_type {
                FatType::Fat12 => {
                    self.io.write_at(offset, &[meta.media, 0xFF, 0xFF])?;
                }
                FatType::Fat16 => {
                    self.io.write_at(offset, &[meta.media, 0xFF, 0xFF, 0xFF])?;
                }
                FatType::Fat32 => {
                    let mut head = [0u8; 12];
                    head[..4].copy_from_slice(&(0x0FFF_FF00 | meta.media as u32).to_le_bytes());
                    head[4..8].copy_from_slice(&0x0FFF_FFFFu32.to_le_bytes());
                    head[8..].copy_from_slice(&0x0FFF_FFFFu32.to_le_bytes());
                    self.io.write_at(offset, &head)?;
                }
            }
        }
        Ok(())
    }

    fn write_root_dir(&mut self, meta: &FatMeta) -> OpenResult<()> {
        match meta.fat_type {
            FatType::Fat32 => {
                let off = meta.cluster_offset(meta.root_cluster);
                self.io.zero_fill(off, meta.bytes_per_cluster() as usize)?;
            }
            _ => {
                let len = meta.root_dir_sectors as u64 * meta.bytes_per_sector as u64;
                self.io.zero_fill(meta.root_dir_offset(), len as usize)?;
            }
        }
        Ok(())
    }

    fn fill_data_region(&mut self, meta: &FatMeta) -> OpenResult<()> {
        let start = meta.first_data_sector as u64 * meta.bytes_per_sector as u64;
        let end = meta.volume_bytes();
        self.io.byte_fill(start, end - start, FAT_FORMAT_FILL_BYTE)?;
        Ok(())
    }
}

/// Formats a 1.44MB floppy image, resizing the backing first.
pub fn format_floppy_144<IO: BlockIO + BlockIOSetLen>(io: &mut IO, quick: bool) -> OpenResult<FatMeta> {
    io.set_len(FLOPPY_144_SIZE)?;
    let opts = FatFormatOptions { quick, ..Default::default() };
    FatFormatter::new(io).format(&opts)
}

/// Formats a 2.88MB floppy image, resizing the backing first.
pub fn format_floppy_288<IO: BlockIO + BlockIOSetLen>(io: &mut IO, quick: bool) -> OpenResult<FatMeta> {
    io.set_len(FLOPPY_288_SIZE)?;
    let opts = FatFormatOptions { quick, ..Default::default() };
    FatFormatter::new(io).format(&opts)
}

/// Derives a complete layout from the volume size and the caller's
/// (possibly defaulted) geometry request.
pub fn design_layout(volume_size: u64, opts: &FatFormatOptions) -> OpenResult<FatMeta> {
    let bps = if opts.sector_size == 0 { 512 } else { opts.sector_size } as u32;
    ensure!(
        bps.is_power_of_two()
            && bps >= FAT_SECTOR_SIZE_MIN as u32
            && bps <= FAT_SECTOR_SIZE_MAX as u32,
        OpenError::InvalidParameter("sector size must be a power of two in 512..=4096")
    );
    ensure!(
        volume_size >= 64 * 1024,
        OpenError::InvalidParameter("volume too small to format")
    );
    ensure!(
        opts.num_fats <= 4,
        OpenError::InvalidParameter("at most 4 FATs")
    );
    if opts.media_byte != 0 {
        ensure!(
            media_byte_valid(opts.media_byte),
            OpenError::InvalidParameter("invalid media byte")
        );
    }

    let defaults = FAT_DISK_DEFAULTS
        .iter()
        .find(|d| volume_size <= d.max_size)
        .copied()
        .unwrap_or(FAT_DISK_DEFAULTS[FAT_DISK_DEFAULTS.len() - 1]);

    let total_sectors = volume_size / bps as u64;
    ensure!(
        total_sectors <= u32::MAX as u64,
        OpenError::InvalidParameter("volume too large for FAT")
    );
    let total_sectors = total_sectors as u32;
    let num_fats = if opts.num_fats == 0 { 2 } else { opts.num_fats as u32 };
    let media = if opts.media_byte == 0 { defaults.media_byte } else { opts.media_byte };

    // Auto selection goes by size class; trying FAT12 first regardless
    // would happily put 64K clusters on a 32MB disk.
    let candidates: &[FatType] = match opts.fat_type {
        Some(FatType::Fat12) => &[FatType::Fat12],
        Some(FatType::Fat16) => &[FatType::Fat16],
        Some(FatType::Fat32) => &[FatType::Fat32],
        None if volume_size <= FLOPPY_288_SIZE => &[FatType::Fat12, FatType::Fat16],
        None if volume_size <= 512 * 1024 * 1024 => {
            &[FatType::Fat16, FatType::Fat32, FatType::Fat12]
        }
        None => &[FatType::Fat32, FatType::Fat16],
    };

    for &fat_type in candidates {
        let root_entry_count = match fat_type {
            FatType::Fat32 => 0,
            _ if opts.root_entries != 0 => opts.root_entries as u32,
            _ => defaults.root_entries as u32,
        };
        let reserved = match fat_type {
            FatType::Fat32 => 32,
            _ => 1,
        };
        let spc_start = if opts.sectors_per_cluster != 0 {
            opts.sectors_per_cluster as u32
        } else if defaults.sectors_per_cluster != 0 && fat_type != FatType::Fat32 {
            defaults.sectors_per_cluster as u32
        } else {
            // Hard disks: scale the cluster with the volume size.
            match fat_type {
                FatType::Fat12 => 8,
                FatType::Fat16 => 4,
                FatType::Fat32 => {
                    if volume_size <= 8_589_934_592 {
                        8
                    } else if volume_size <= 17_179_869_184 {
                        16
                    } else if volume_size <= 34_359_738_368 {
                        32
                    } else {
                        64
                    }
                }
            }
        };

        let mut spc = spc_start;
        loop {
            if let Some(layout) = converge(
                fat_type,
                total_sectors,
                bps,
                spc,
                reserved,
                num_fats,
                root_entry_count,
                media,
                opts.label,
            ) {
                return Ok(layout);
            }
            if opts.sectors_per_cluster != 0 {
                break;
            }
            // FAT12/16 overflow their entry width with too many
            // clusters; FAT32 falls below its minimum with too few.
            match fat_type {
                FatType::Fat32 => {
                    if spc == 1 {
                        break;
                    }
                    spc /= 2;
                }
                _ => {
                    if spc >= 128 {
                        break;
                    }
                    spc *= 2;
                }
            }
        }
    }

    Err(OpenError::InvalidParameter(
        "no FAT geometry fits the requested parameters",
    ))
}

/// Fixed-point iteration on the FAT size: the FAT must cover exactly
/// the clusters that remain once the FATs themselves are accounted
/// for. Returns `None` when the cluster count lands outside the
/// variant's valid range.
#[allow(clippy::too_many_arguments)]
fn converge(
    fat_type: FatType,
    total_sectors: u32,
    bps: u32,
    spc: u32,
    reserved: u32,
    num_fats: u32,
    root_entry_count: u32,
    media: u8,
    label: [u8; 11],
) -> Option<FatMeta> {
    if !spc.is_power_of_two() || spc > 128 {
        return None;
    }
    let root_dir_sectors = (root_entry_count * FAT_DIR_ENTRY_SIZE).div_ceil(bps);
    let entry_bits: u64 = match fat_type {
        FatType::Fat12 => 12,
        FatType::Fat16 => 16,
        FatType::Fat32 => 32,
    };

    let mut fat_size = 1u32;
    for _ in 0..16 {
        let meta_sectors = reserved + num_fats * fat_size + root_dir_sectors;
        if meta_sectors >= total_sectors {
            return None;
        }
        let clusters = (total_sectors - meta_sectors) / spc;
        let fat_bytes = ((clusters as u64 + 2) * entry_bits).div_ceil(8);
        let next = (fat_bytes.div_ceil(bps as u64)) as u32;
        if next == fat_size {
            break;
        }
        fat_size = next;
    }

    let first_root_sector = reserved + num_fats * fat_size;
    let first_data_sector = first_root_sector + root_dir_sectors;
    if first_data_sector >= total_sectors {
        return None;
    }
    let cluster_count = (total_sectors - first_data_sector) / spc;

    // The variant must survive a re-open: open() decides the type from
    // the cluster count alone.
    let in_range = match fat_type {
        FatType::Fat12 => cluster_count <= FAT12_MAX_CLUSTERS,
        FatType::Fat16 => cluster_count > FAT12_MAX_CLUSTERS && cluster_count <= FAT16_MAX_CLUSTERS,
        FatType::Fat32 => cluster_count > FAT16_MAX_CLUSTERS,
    };
    if !in_range {
        return None;
    }

    Some(FatMeta {
        fat_type,
        bytes_per_sector: bps,
        sectors_per_cluster: spc,
        reserved_sectors: reserved,
        num_fats,
        fat_size_sectors: fat_size,
        root_entry_count,
        root_dir_sectors,
        first_root_sector,
        root_cluster: if fat_type == FatType::Fat32 { FAT32_ROOT_CLUSTER } else { 0 },
        first_data_sector,
        cluster_count,
        total_sectors,
        media,
        volume_id: volume_id_now(),
        volume_label: label,
    })
}

/// Volume serial derived from the current timestamp, the way DOS
/// formatters seed it.
fn volume_id_now() -> u32 {
    #[cfg(feature = "std")]
    let now = time::OffsetDateTime::now_utc();
    #[cfg(not(feature = "std"))]
    let now = time::OffsetDateTime::UNIX_EPOCH;

    let (date, tm) = utils::encode_datetime(now);
    ((date as u32) << 16) ^ ((tm as u32) << 8) ^ now.millisecond() as u32
}

#[cfg(all(test, feature = "std", feature = "mem"))]
mod tests {
    use super::*;

    #[test]
    fn test_design_floppy_144() {
        let meta = design_layout(FLOPPY_144_SIZE, &FatFormatOptions::default()).unwrap();
        assert_eq!(meta.fat_type, FatType::Fat12);
        assert_eq!(meta.bytes_per_sector, 512);
        assert_eq!(meta.media, 0xF0);
        assert_eq!(meta.root_entry_count, 224);
        assert_eq!(meta.total_sectors, 2880);
    }

    #[test]
    fn test_design_respects_explicit_type() {
        // 256MB: auto would pick FAT16; FAT32 must be honored.
        let opts = FatFormatOptions {
            fat_type: Some(FatType::Fat32),
            ..Default::default()
        };
        let meta = design_layout(256 * 1024 * 1024, &opts).unwrap();
        assert_eq!(meta.fat_type, FatType::Fat32);
        assert!(meta.cluster_count > FAT16_MAX_CLUSTERS);
    }

    #[test]
    fn test_design_rejects_tiny_volume() {
        let err = design_layout(4096, &FatFormatOptions::default()).err();
        assert!(matches!(err, Some(OpenError::InvalidParameter(_))));
    }

    #[test]
    fn test_full_format_fills_data_region() {
        let mut img = vec![0u8; 1_228_800];
        let mut io = MemBlockIO::new(&mut img);
        let meta = FatFormatter::new(&mut io).format(&FatFormatOptions::default()).unwrap();

        let first_data = (meta.first_data_sector * meta.bytes_per_sector) as usize;
        drop(io);
        assert_eq!(img[first_data], FAT_FORMAT_FILL_BYTE);
        assert_eq!(img[510..512], [0x55, 0xAA]);
    }
}
