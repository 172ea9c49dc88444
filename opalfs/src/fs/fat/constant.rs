// SPDX-License-Identifier: MIT

pub const FAT_SECTOR_SIZE_MIN: u16 = 512;
pub const FAT_SECTOR_SIZE_MAX: u16 = 4096;
pub const FAT_SIGNATURE: u16 = 0xAA55;
pub const FAT_JUMP_BOOT: [u8; 3] = [0xEB, 0x3C, 0x90];
pub const FAT32_JUMP_BOOT: [u8; 3] = [0xEB, 0x58, 0x90];
pub const FAT_BOOT_SIGNATURE: u8 = 0x29;
pub const FAT_DIR_ENTRY_SIZE: u32 = 32;

/// Variant thresholds on the data-cluster count. The BPB type string
/// is advisory only and never consulted.
pub const FAT12_MAX_CLUSTERS: u32 = 4084;
pub const FAT16_MAX_CLUSTERS: u32 = 65524;

pub const FAT12_EOC_MIN: u32 = 0xFF8;
pub const FAT16_EOC_MIN: u32 = 0xFFF8;
pub const FAT32_EOC_MIN: u32 = 0x0FFF_FFF8;
pub const FAT32_CLUSTER_MASK: u32 = 0x0FFF_FFFF;

pub const FAT_FIRST_DATA_CLUSTER: u32 = 2;
pub const FAT32_ROOT_CLUSTER: u32 = 2;
pub const FAT32_FSINFO_SECTOR: u16 = 1;
pub const FAT32_VBR_BACKUP_SECTOR: u16 = 6;

pub const FAT_ENTRY_FREE: u8 = 0x00;
pub const FAT_ENTRY_DELETED: u8 = 0xE5;
pub const FAT_ENTRY_KANJI_E5: u8 = 0x05;

pub const FAT_FSINFO_LEAD_SIGNATURE: [u8; 4] = *b"RRaA";
pub const FAT_FSINFO_STRUCT_SIGNATURE: [u8; 4] = *b"rrAa";
pub const FAT_FSINFO_TRAIL_SIGNATURE: [u8; 4] = [0x00, 0x00, 0x55, 0xAA];
pub const FAT_FSINFO_UNKNOWN: u32 = 0xFFFF_FFFF;

/// Low-level format fill byte, as real formatters have written since
/// DOS.
pub const FAT_FORMAT_FILL_BYTE: u8 = 0xF6;

pub const FLOPPY_144_SIZE: u64 = 1_474_560;
pub const FLOPPY_288_SIZE: u64 = 2_949_120;

/// Default geometry by total volume size, matching what classic FAT
/// formatters produce so images stay interoperable.
#[derive(Debug, Clone, Copy)]
pub struct FatDiskDefaults {
    pub max_size: u64,
    pub media_byte: u8,
    pub sectors_per_track: u16,
    pub heads: u16,
    pub root_entries: u16,
    pub sectors_per_cluster: u8,
}

pub const FAT_DISK_DEFAULTS: &[FatDiskDefaults] = &[
    // 160KB single-sided floppy
    FatDiskDefaults { max_size: 163_840, media_byte: 0xFE, sectors_per_track: 8, heads: 1, root_entries: 64, sectors_per_cluster: 1 },
    // 180KB
    FatDiskDefaults { max_size: 184_320, media_byte: 0xFC, sectors_per_track: 9, heads: 1, root_entries: 64, sectors_per_cluster: 1 },
    // 320KB
    FatDiskDefaults { max_size: 327_680, media_byte: 0xFF, sectors_per_track: 8, heads: 2, root_entries: 112, sectors_per_cluster: 2 },
    // 360KB
    FatDiskDefaults { max_size: 368_640, media_byte: 0xFD, sectors_per_track: 9, heads: 2, root_entries: 112, sectors_per_cluster: 2 },
    // 720KB
    FatDiskDefaults { max_size: 737_280, media_byte: 0xF9, sectors_per_track: 9, heads: 2, root_entries: 112, sectors_per_cluster: 2 },
    // 1.2MB
    FatDiskDefaults { max_size: 1_228_800, media_byte: 0xF9, sectors_per_track: 15, heads: 2, root_entries: 224, sectors_per_cluster: 1 },
    // 1.44MB
    FatDiskDefaults { max_size: FLOPPY_144_SIZE, media_byte: 0xF0, sectors_per_track: 18, heads: 2, root_entries: 224, sectors_per_cluster: 1 },
    // 2.88MB
    FatDiskDefaults { max_size: FLOPPY_288_SIZE, media_byte: 0xF0, sectors_per_track: 36, heads: 2, root_entries: 240, sectors_per_cluster: 2 },
    // Everything larger is treated as a hard disk.
    FatDiskDefaults { max_size: u64::MAX, media_byte: 0xF8, sectors_per_track: 63, heads: 255, root_entries: 512, sectors_per_cluster: 0 },
];
