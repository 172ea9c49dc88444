// SPDX-License-Identifier: MIT

use zerocopy::FromBytes;

use crate::core::errors::*;
use crate::ensure;
use crate::fs::fat::{constant::*, types::*};

/// FAT variant, decided by the data-cluster count alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatType {
    Fat12,
    Fat16,
    Fat32,
}

impl FatType {
    pub fn name(&self) -> &'static str {
        match self {
            FatType::Fat12 => "FAT12",
            FatType::Fat16 => "FAT16",
            FatType::Fat32 => "FAT32",
        }
    }

    /// First end-of-chain marker value for this entry width.
    pub fn eoc_min(&self) -> u32 {
        match self {
            FatType::Fat12 => FAT12_EOC_MIN,
            FatType::Fat16 => FAT16_EOC_MIN,
            FatType::Fat32 => FAT32_EOC_MIN,
        }
    }
}

/// Parsed, validated FAT geometry. The in-memory index the volume
/// keeps for the life of the mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatMeta {
    pub fat_type: FatType,
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub reserved_sectors: u32,
    pub num_fats: u32,
    pub fat_size_sectors: u32,
    pub root_entry_count: u32,
    pub root_dir_sectors: u32,
    /// FAT12/16 fixed root directory region; unused on FAT32.
    pub first_root_sector: u32,
    /// FAT32 root directory start cluster; unused on FAT12/16.
    pub root_cluster: u32,
    pub first_data_sector: u32,
    pub cluster_count: u32,
    pub total_sectors: u32,
    pub media: u8,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
}

#[inline]
pub fn media_byte_valid(media: u8) -> bool {
    media == 0xF0 || media >= 0xF8
}

impl FatMeta {
    /// Validates a 512-byte boot sector and derives the geometry.
    ///
    /// Fields another boot-sector format (NTFS, exFAT) legitimately
    /// zeroes classify as `NotThisFormat`; impossible values behind a
    /// plausible FAT shape classify as `Corrupt`.
    pub fn from_boot_sector(sector: &[u8; 512], volume_size: u64) -> OpenResult<Self> {
        let signature = u16::from_le_bytes([sector[510], sector[511]]);
        ensure!(signature == FAT_SIGNATURE, OpenError::NotThisFormat);

        let (bpb, rest) =
            FatBpb::read_from_prefix(&sector[..]).map_err(|_| OpenError::NotThisFormat)?;
        ensure!(
            bpb.jump_boot[0] == 0xEB || bpb.jump_boot[0] == 0xE9,
            OpenError::NotThisFormat
        );
        let media = bpb.media;
        ensure!(media_byte_valid(media), OpenError::NotThisFormat);

        let bps = bpb.bytes_per_sector as u32;
        let spc = bpb.sectors_per_cluster as u32;
        let reserved = bpb.reserved_sectors as u32;
        let num_fats = bpb.num_fats as u32;
        let root_entry_count = bpb.root_entry_count as u32;
        let fat_size_16 = bpb.fat_size_16 as u32;
        let total_16 = bpb.total_sectors_16 as u32;
        let total_32 = bpb.total_sectors_32;

        let ebpb32 = FatEbpb32::read_from_prefix(rest)
            .map(|(e, _)| e)
            .map_err(|_| OpenError::NotThisFormat)?;
        let fat_size_32 = ebpb32.fat_size_32;

        // NTFS and exFAT zero these; not our format rather than corrupt.
        ensure!(fat_size_16 != 0 || fat_size_32 != 0, OpenError::NotThisFormat);
        ensure!(total_16 != 0 || total_32 != 0, OpenError::NotThisFormat);

        ensure!(
            bps.is_power_of_two()
                && bps >= FAT_SECTOR_SIZE_MIN as u32
                && bps <= FAT_SECTOR_SIZE_MAX as u32,
            OpenError::corrupt(
                "fat",
                "bytes_per_sector",
                format!("expected power of two in 512..=4096, got {bps}")
            )
        );
        ensure!(
            spc.is_power_of_two() && spc <= 128,
            OpenError::corrupt(
                "fat",
                "sectors_per_cluster",
                format!("expected power of two in 1..=128, got {spc}")
            )
        );
        ensure!(
            reserved != 0,
            OpenError::corrupt("fat", "reserved_sectors", "must be nonzero".into())
        );
        ensure!(
            (1..=4).contains(&num_fats),
            OpenError::corrupt("fat", "num_fats", format!("expected 1..=4, got {num_fats}"))
        );

        let total_sectors = if total_16 != 0 { total_16 } else { total_32 };
        ensure!(
            total_sectors as u64 * bps as u64 <= volume_size,
            OpenError::corrupt(
                "fat",
                "total_sectors",
                format!(
                    "claims {} bytes but backing holds {volume_size}",
                    total_sectors as u64 * bps as u64
                )
            )
        );

        let fat_size_sectors = if fat_size_16 != 0 { fat_size_16 } else { fat_size_32 };
        let root_dir_sectors = (root_entry_count * FAT_DIR_ENTRY_SIZE).div_ceil(bps);
        let first_root_sector = reserved + num_fats * fat_size_sectors;
        let first_data_sector = first_root_sector + root_dir_sectors;
        ensure!(
            first_data_sector < total_sectors,
            OpenError::corrupt(
                "fat",
                "geometry",
                format!(
                    "metadata ({first_data_sector} sectors) exceeds volume ({total_sectors} sectors)"
                )
            )
        );

        let cluster_count = (total_sectors - first_data_sector) / spc;
        let fat_type = if cluster_count <= FAT12_MAX_CLUSTERS {
            FatType::Fat12
        } else if cluster_count <= FAT16_MAX_CLUSTERS {
            FatType::Fat16
        } else {
            FatType::Fat32
        };

        let (root_cluster, volume_id, volume_label) = match fat_type {
            FatType::Fat32 => {
                ensure!(
                    fat_size_16 == 0,
                    OpenError::corrupt("fat", "fat_size_16", "must be zero on FAT32".into())
                );
                ensure!(
                    root_entry_count == 0,
                    OpenError::corrupt(
                        "fat",
                        "root_entry_count",
                        format!("must be zero on FAT32, got {root_entry_count}")
                    )
                );
                let fs_version = ebpb32.fs_version;
                ensure!(
                    fs_version == 0,
                    OpenError::unsupported(
                        "fat",
                        "fs_version",
                        format!("FAT32 version {:#06x} not implemented", fs_version)
                    )
                );
                let root_cluster = ebpb32.root_cluster;
                ensure!(
                    root_cluster >= FAT_FIRST_DATA_CLUSTER
                        && root_cluster < cluster_count + FAT_FIRST_DATA_CLUSTER,
                    OpenError::corrupt(
                        "fat",
                        "root_cluster",
                        format!("cluster {root_cluster} outside data region")
                    )
                );
                (root_cluster, ebpb32.volume_id, ebpb32.volume_label)
            }
            _ => {
                ensure!(
                    root_entry_count != 0,
                    OpenError::corrupt("fat", "root_entry_count", "must be nonzero".into())
                );
                let ebpb = FatEbpb::read_from_prefix(rest)
                    .map(|(e, _)| e)
                    .map_err(|_| OpenError::NotThisFormat)?;
                // The pre-DOS-4.0 EBPB has no volume id/label.
                if ebpb.boot_signature == FAT_BOOT_SIGNATURE {
                    (0, ebpb.volume_id, ebpb.volume_label)
                } else {
                    (0, 0, [b' '; 11])
                }
            }
        };

        Ok(FatMeta {
            fat_type,
            bytes_per_sector: bps,
            sectors_per_cluster: spc,
            reserved_sectors: reserved,
            num_fats,
            fat_size_sectors,
            root_entry_count,
            root_dir_sectors,
            first_root_sector,
            root_cluster,
            first_data_sector,
            cluster_count,
            total_sectors,
            media,
            volume_id,
            volume_label,
        })
    }

    #[inline]
    pub fn bytes_per_cluster(&self) -> u32 {
        self.bytes_per_sector * self.sectors_per_cluster
    }

    /// Byte offset of the first (active) FAT.
    #[inline]
    pub fn fat_offset(&self) -> u64 {
        self.reserved_sectors as u64 * self.bytes_per_sector as u64
    }

    /// Byte offset of the fixed FAT12/16 root directory region.
    #[inline]
    pub fn root_dir_offset(&self) -> u64 {
        self.first_root_sector as u64 * self.bytes_per_sector as u64
    }

    /// Byte offset of a data cluster. Cluster numbers start at 2.
    #[inline]
    pub fn cluster_offset(&self, cluster: u32) -> u64 {
        let sector = self.first_data_sector as u64
            + (cluster - FAT_FIRST_DATA_CLUSTER) as u64 * self.sectors_per_cluster as u64;
        sector * self.bytes_per_sector as u64
    }

    /// Highest valid data cluster number.
    #[inline]
    pub fn max_cluster(&self) -> u32 {
        self.cluster_count + FAT_FIRST_DATA_CLUSTER - 1
    }

    #[inline]
    pub fn volume_bytes(&self) -> u64 {
        self.total_sectors as u64 * self.bytes_per_sector as u64
    }
}
