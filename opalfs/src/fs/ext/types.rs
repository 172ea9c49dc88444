// SPDX-License-Identifier: MIT

use bitflags::bitflags;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const EXT_SUPERBLOCK_OFFSET: u64 = 1024;
pub const EXT_MAGIC: u16 = 0xEF53;
pub const EXT_ROOT_INO: u32 = 2;

pub const EXT_GOOD_OLD_REV: u32 = 0;
pub const EXT_DYNAMIC_REV: u32 = 1;
pub const EXT_GOOD_OLD_INODE_SIZE: u16 = 128;

/// State bit: the filesystem carries recorded errors.
pub const EXT_STATE_ERRORS: u16 = 0x2;

bitflags! {
    /// Incompatible feature set. A reader must refuse bits it does not
    /// implement.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExtIncompat: u32 {
        const COMPRESSION = 0x0001;
        const FILETYPE = 0x0002;
        const RECOVER = 0x0004;
        const JOURNAL_DEV = 0x0008;
        const META_BG = 0x0010;
        const EXTENTS = 0x0040;
        const BIT64 = 0x0080;
        const MMP = 0x0100;
        const FLEX_BG = 0x0200;
    }
}

/// Read support here covers classic block maps plus extent trees.
pub const EXT_INCOMPAT_SUPPORTED: u32 =
    ExtIncompat::FILETYPE.bits() | ExtIncompat::EXTENTS.bits() | ExtIncompat::FLEX_BG.bits();

// Inode mode bits.
pub const EXT_S_IFMT: u16 = 0xF000;
pub const EXT_S_IFDIR: u16 = 0x4000;
pub const EXT_S_IFREG: u16 = 0x8000;

/// Inode flag: block\[\] holds an extent tree, not a block map.
pub const EXT_INODE_FLAG_EXTENTS: u32 = 0x0008_0000;

// Directory entry file types (valid with the FILETYPE feature).
pub const EXT_FT_REG_FILE: u8 = 1;
pub const EXT_FT_DIR: u8 = 2;

pub const EXT_EXTENT_MAGIC: u16 = 0xF30A;
pub const EXT_EXTENT_MAX_DEPTH: u16 = 5;

/// First 264 bytes of the superblock; the remainder is padding and
/// journal bookkeeping this reader never touches.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct ExtSuperblock {
    pub inodes_count: u32,
    pub blocks_count: u32,
    pub r_blocks_count: u32,
    pub free_blocks_count: u32,
    pub free_inodes_count: u32,
    pub first_data_block: u32,
    pub log_block_size: u32,
    pub log_frag_size: i32,
    pub blocks_per_group: u32,
    pub frags_per_group: u32,
    pub inodes_per_group: u32,
    pub mtime: u32,
    pub wtime: u32,
    pub mnt_count: u16,
    pub max_mnt_count: u16,
    pub magic: u16,
    pub state: u16,
    pub errors: u16,
    pub minor_rev_level: u16,
    pub lastcheck: u32,
    pub checkinterval: u32,
    pub creator_os: u32,
    pub rev_level: u32,
    pub def_resuid: u16,
    pub def_resgid: u16,
    // Dynamic-revision fields; undefined for revision 0.
    pub first_ino: u32,
    pub inode_size: u16,
    pub block_group_nr: u16,
    pub feature_compat: u32,
    pub feature_incompat: u32,
    pub feature_ro_compat: u32,
    pub uuid: [u8; 16],
    pub volume_name: [u8; 16],
    pub last_mounted: [u8; 64],
    pub algorithm_usage_bitmap: u32,
    pub prealloc_blocks: u8,
    pub prealloc_dir_blocks: u8,
    pub reserved_gdt_blocks: u16,
    pub journal_uuid: [u8; 16],
    pub journal_inum: u32,
    pub journal_dev: u32,
    pub last_orphan: u32,
    pub hash_seed: [u32; 4],
    pub def_hash_version: u8,
    pub jnl_backup_type: u8,
    pub desc_size: u16,
    pub default_mount_opts: u32,
    pub first_meta_bg: u32,
}

/// Classic 32-byte block group descriptor.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct ExtGroupDesc {
    pub block_bitmap: u32,
    pub inode_bitmap: u32,
    pub inode_table: u32,
    pub free_blocks_count: u16,
    pub free_inodes_count: u16,
    pub used_dirs_count: u16,
    pub pad: u16,
    pub reserved: [u8; 12],
}

/// On-disk inode, classic 128-byte layout. Larger inode sizes pad
/// after this prefix.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct ExtInode {
    pub mode: u16,
    pub uid: u16,
    pub size: u32,
    pub atime: u32,
    pub ctime: u32,
    pub mtime: u32,
    pub dtime: u32,
    pub gid: u16,
    pub links_count: u16,
    pub blocks: u32,
    pub flags: u32,
    pub osd1: u32,
    /// Block map (12 direct, indirect, double, triple) or, with the
    /// extents flag, the root extent node.
    pub block: [u32; 15],
    pub generation: u32,
    pub file_acl: u32,
    /// High 32 bits of the size for regular files.
    pub dir_acl: u32,
    pub faddr: u32,
    pub osd2: [u8; 12],
}

impl ExtInode {
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.mode & EXT_S_IFMT == EXT_S_IFDIR
    }

    #[inline]
    pub fn is_regular(&self) -> bool {
        self.mode & EXT_S_IFMT == EXT_S_IFREG
    }

    pub fn byte_size(&self) -> u64 {
        let low = self.size as u64;
        if self.is_regular() {
            low | ((self.dir_acl as u64) << 32)
        } else {
            low
        }
    }

    #[inline]
    pub fn uses_extents(&self) -> bool {
        self.flags & EXT_INODE_FLAG_EXTENTS != 0
    }
}

/// Fixed prefix of a directory entry; the name trails it.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct ExtDirEntry {
    pub inode: u32,
    pub rec_len: u16,
    pub name_len: u8,
    pub file_type: u8,
}

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct ExtExtentHeader {
    pub magic: u16,
    pub entries: u16,
    pub max_entries: u16,
    pub depth: u16,
    pub generation: u32,
}

/// Interior extent tree node entry, pointing at a child node block.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct ExtExtentIdx {
    pub file_block: u32,
    pub leaf_lo: u32,
    pub leaf_hi: u16,
    pub unused: u16,
}

/// Leaf extent: a contiguous run of file blocks.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct ExtExtent {
    pub file_block: u32,
    pub len: u16,
    pub start_hi: u16,
    pub start_lo: u32,
}

impl ExtExtent {
    #[inline]
    pub fn start(&self) -> u64 {
        ((self.start_hi as u64) << 32) | self.start_lo as u64
    }
}

const _: () = assert!(core::mem::size_of::<ExtSuperblock>() == 264);
const _: () = assert!(core::mem::size_of::<ExtGroupDesc>() == 32);
const _: () = assert!(core::mem::size_of::<ExtInode>() == 128);
const _: () = assert!(core::mem::size_of::<ExtDirEntry>() == 8);
const _: () = assert!(core::mem::size_of::<ExtExtentHeader>() == 12);
const _: () = assert!(core::mem::size_of::<ExtExtentIdx>() == 12);
const _: () = assert!(core::mem::size_of::<ExtExtent>() == 12);
