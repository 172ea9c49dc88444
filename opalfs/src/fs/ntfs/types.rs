// SPDX-License-Identifier: MIT

use time::OffsetDateTime;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const NTFS_OEM_ID: &[u8; 8] = b"NTFS    ";
pub const NTFS_RECORD_MAGIC: [u8; 4] = *b"FILE";
pub const NTFS_MAX_CLUSTER_SIZE: u32 = 64 * 1024;

// Well-known MFT record numbers.
pub const MFT_REC_MFT: u64 = 0;
pub const MFT_REC_VOLUME: u64 = 3;
pub const MFT_REC_ROOT: u64 = 5;
/// Low 48 bits of a file reference are the record number.
pub const MFT_REF_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

// MFT record header flags.
pub const MFT_RECORD_IN_USE: u16 = 0x1;
pub const MFT_RECORD_IS_DIRECTORY: u16 = 0x2;

// Attribute type codes.
pub const ATTR_STANDARD_INFORMATION: u32 = 0x10;
pub const ATTR_FILE_NAME: u32 = 0x30;
pub const ATTR_VOLUME_NAME: u32 = 0x60;
pub const ATTR_VOLUME_INFORMATION: u32 = 0x70;
pub const ATTR_DATA: u32 = 0x80;
pub const ATTR_INDEX_ROOT: u32 = 0x90;
pub const ATTR_INDEX_ALLOCATION: u32 = 0xA0;
pub const ATTR_END: u32 = 0xFFFF_FFFF;

/// $FILE_NAME namespace codes.
pub const FILENAME_NAMESPACE_DOS: u8 = 2;

/// File attribute flag carried in index entries for directories.
pub const FILE_FLAG_DIRECTORY: u32 = 0x1000_0000;

/// Index header flag: entries continue in $INDEX_ALLOCATION.
pub const INDEX_FLAG_LARGE: u32 = 0x1;
/// Index entry flags.
pub const INDEX_ENTRY_SUBNODE: u16 = 0x1;
pub const INDEX_ENTRY_LAST: u16 = 0x2;

/// NTFS boot sector. The FAT BPB fields it inherits must all be zero;
/// a nonzero one means some other VBR format.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct NtfsBootSector {
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
    pub unused: u32,
    pub total_sectors: u64,
    pub mft_lcn: u64,
    pub mft_mirror_lcn: u64,
    /// Positive: clusters per record. Negative n: record is 2^-n bytes.
    pub clusters_per_mft_record: i8,
    pub reserved1: [u8; 3],
    pub clusters_per_index_block: i8,
    pub reserved2: [u8; 3],
    pub serial: u64,
    pub checksum: u32,
    pub boot_code: [u8; 426],
    pub signature: u16,
}

/// Fixed header of every MFT record, before fixup application.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct MftRecordHeader {
    pub magic: [u8; 4],
    pub usa_offset: u16,
    pub usa_count: u16,
    pub lsn: u64,
    pub sequence: u16,
    pub link_count: u16,
    pub attrs_offset: u16,
    pub flags: u16,
    pub bytes_used: u32,
    pub bytes_allocated: u32,
    pub base_record: u64,
    pub next_attr_id: u16,
}

/// Common attribute header; resident and non-resident forms extend it.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct AttrHeader {
    pub attr_type: u32,
    pub length: u32,
    pub non_resident: u8,
    pub name_len: u8,
    pub name_offset: u16,
    pub flags: u16,
    pub attr_id: u16,
}

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct ResidentAttrTail {
    pub value_len: u32,
    pub value_offset: u16,
    pub indexed: u8,
    pub padding: u8,
}

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct NonResidentAttrTail {
    pub vcn_first: u64,
    pub vcn_last: u64,
    pub runs_offset: u16,
    pub compression_unit: u16,
    pub padding: u32,
    pub alloc_size: u64,
    pub data_size: u64,
    pub init_size: u64,
}

/// $FILE_NAME attribute value (the UTF-16LE name trails it).
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct FileNameAttr {
    pub parent_ref: u64,
    pub creation_time: u64,
    pub modification_time: u64,
    pub mft_modification_time: u64,
    pub access_time: u64,
    pub allocated_size: u64,
    pub real_size: u64,
    pub flags: u32,
    pub reparse: u32,
    pub name_len: u8,
    pub namespace: u8,
}

/// $INDEX_ROOT attribute value header.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct IndexRootHeader {
    pub indexed_attr_type: u32,
    pub collation_rule: u32,
    pub index_block_size: u32,
    pub clusters_per_block: u8,
    pub reserved: [u8; 3],
}

/// Index node header, directly after [`IndexRootHeader`]. Offsets are
/// relative to this header.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct IndexHeader {
    pub entries_offset: u32,
    pub index_size: u32,
    pub allocated_size: u32,
    pub flags: u32,
}

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct IndexEntryHeader {
    pub file_ref: u64,
    pub entry_len: u16,
    pub key_len: u16,
    pub flags: u16,
    pub reserved: u16,
}

/// $VOLUME_INFORMATION attribute value.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct VolumeInfoAttr {
    pub reserved: u64,
    pub major_version: u8,
    pub minor_version: u8,
    pub flags: u16,
}

const _: () = assert!(core::mem::size_of::<NtfsBootSector>() == 512);
const _: () = assert!(core::mem::size_of::<MftRecordHeader>() == 42);
const _: () = assert!(core::mem::size_of::<AttrHeader>() == 16);
const _: () = assert!(core::mem::size_of::<ResidentAttrTail>() == 8);
const _: () = assert!(core::mem::size_of::<NonResidentAttrTail>() == 48);
const _: () = assert!(core::mem::size_of::<FileNameAttr>() == 66);
const _: () = assert!(core::mem::size_of::<IndexRootHeader>() == 16);
const _: () = assert!(core::mem::size_of::<IndexHeader>() == 16);
const _: () = assert!(core::mem::size_of::<IndexEntryHeader>() == 16);
const _: () = assert!(core::mem::size_of::<VolumeInfoAttr>() == 12);

/// NTFS timestamps count 100ns ticks since 1601-01-01.
pub fn decode_ntfs_time(ticks: u64) -> Option<OffsetDateTime> {
    if ticks == 0 {
        return None;
    }
    const EPOCH_DELTA_SECS: i64 = 11_644_473_600;
    let secs = (ticks / 10_000_000) as i64 - EPOCH_DELTA_SECS;
    OffsetDateTime::from_unix_timestamp(secs).ok()
}
