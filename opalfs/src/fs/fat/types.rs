// SPDX-License-Identifier: MIT

use bitflags::bitflags;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Common BIOS parameter block, first 36 bytes of every FAT boot
/// sector.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct FatBpb {
    pub jump_boot: [u8; 3],
    pub oem_name: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_entry_count: u16,
    pub total_sectors_16: u16,
    pub media: u8,
    pub fat_size_16: u16,
    pub sectors_per_track: u16,
    pub num_heads: u16,
    pub hidden_sectors: u32,
    pub total_sectors_32: u32,
}

/// FAT12/16 extended boot record, at offset 36.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct FatEbpb {
    pub drive_number: u8,
    pub reserved1: u8,
    pub boot_signature: u8,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],
}

/// FAT32 extended boot record, at offset 36.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct FatEbpb32 {
    pub fat_size_32: u32,
    pub ext_flags: u16,
    pub fs_version: u16,
    pub root_cluster: u32,
    pub fsinfo_sector: u16,
    pub backup_boot_sector: u16,
    pub reserved: [u8; 12],
    pub drive_number: u8,
    pub reserved1: u8,
    pub boot_signature: u8,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],
}

/// FAT32 FSInfo sector.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct FatFsInfo {
    pub lead_signature: [u8; 4],
    pub reserved1: [u8; 480],
    pub struct_signature: [u8; 4],
    pub free_cluster_count: u32,
    pub next_free_cluster: u32,
    pub reserved2: [u8; 12],
    pub trail_signature: [u8; 4],
}

/// 8.3 directory entry.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct FatDirEntry {
    pub name: [u8; 11],
    pub attr: u8,
    pub nt_reserved: u8,
    pub creation_time_tenth: u8,
    pub creation_time: u16,
    pub creation_date: u16,
    pub last_access_date: u16,
    pub first_cluster_hi: u16,
    pub write_time: u16,
    pub write_date: u16,
    pub first_cluster_lo: u16,
    pub file_size: u32,
}

impl FatDirEntry {
    #[inline]
    pub fn first_cluster(&self) -> u32 {
        ((self.first_cluster_hi as u32) << 16) | self.first_cluster_lo as u32
    }
}

/// Long-filename entry occupying the same 32-byte slot layout.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct FatLfnEntry {
    pub order: u8,
    pub name1: [u8; 10],
    pub attr: u8,
    pub entry_type: u8,
    pub checksum: u8,
    pub name2: [u8; 12],
    pub first_cluster_lo: u16,
    pub name3: [u8; 4],
}

impl FatLfnEntry {
    /// The 13 UTF-16LE units carried by this entry, in name order.
    pub fn extract_utf16(&self) -> [u16; 13] {
        let mut out = [0u16; 13];
        for (i, pair) in self.name1.chunks_exact(2).enumerate() {
            out[i] = u16::from_le_bytes([pair[0], pair[1]]);
        }
        for (i, pair) in self.name2.chunks_exact(2).enumerate() {
            out[5 + i] = u16::from_le_bytes([pair[0], pair[1]]);
        }
        for (i, pair) in self.name3.chunks_exact(2).enumerate() {
            out[11 + i] = u16::from_le_bytes([pair[0], pair[1]]);
        }
        out
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FatAttributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN    = 0x02;
        const SYSTEM    = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE   = 0x20;
    }
}

impl FatAttributes {
    pub const LFN: u8 = 0x0F;
}

const _: () = assert!(core::mem::size_of::<FatBpb>() == 36);
const _: () = assert!(core::mem::size_of::<FatEbpb>() == 26);
const _: () = assert!(core::mem::size_of::<FatEbpb32>() == 54);
const _: () = assert!(core::mem::size_of::<FatFsInfo>() == 512);
const _: () = assert!(core::mem::size_of::<FatDirEntry>() == 32);
const _: () = assert!(core::mem::size_of::<FatLfnEntry>() == 32);
