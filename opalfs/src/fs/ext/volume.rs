// SPDX-License-Identifier: MIT

#[cfg(all(not(feature = "std"), feature = "alloc"))]
use alloc::{string::String, vec::Vec};

use log::debug;
use opalio::prelude::*;
use zerocopy::FromBytes;

use crate::core::errors::*;
use crate::core::utils::path_utils::*;
use crate::core::volume::*;
use crate::fs::ext::types::*;

/// Geometry derived from the superblock. The probe validates nothing
/// past the superblock; group descriptors and inodes are checked as
/// they are touched.
#[derive(Debug, Clone)]
pub struct ExtMeta {
    pub block_size: u32,
    pub blocks_count: u32,
    pub first_data_block: u32,
    pub blocks_per_group: u32,
    pub inodes_per_group: u32,
    pub inodes_count: u32,
    pub inode_size: u32,
    pub revision: u32,
    has_filetype: bool,
    volume_label: Option<String>,
}

impl ExtMeta {
    #[inline]
    pub fn volume_bytes(&self) -> u64 {
        self.blocks_count as u64 * self.block_size as u64
    }

    #[inline]
    fn block_offset(&self, block: u64) -> u64 {
        block * self.block_size as u64
    }
}

/// A mounted ext2/3/4 volume, read-only. Classic block maps and extent
/// trees; names compare case-sensitively.
pub struct ExtVolume<IO: BlockIO> {
    io: IO,
    meta: ExtMeta,
}

/// A resolved directory entry plus its loaded inode.
#[derive(Debug, Clone)]
struct ExtNode {
    name: String,
    inode: ExtInode,
}

impl<IO: BlockIO> ExtVolume<IO> {
    pub fn open(mut io: IO) -> OpenResult<Self> {
        let meta = Self::parse(&mut io)?;
        Ok(Self::assemble(io, meta))
    }

    /// Probe entry: superblock validation only.
    pub(crate) fn parse(io: &mut IO) -> OpenResult<ExtMeta> {
        let media_size = io.size()?;
        if media_size < EXT_SUPERBLOCK_OFFSET + 264 {
            return Err(OpenError::NotThisFormat);
        }
        let mut raw = [0u8; 264];
        io.read_at(EXT_SUPERBLOCK_OFFSET, &mut raw)?;
        let sb = ExtSuperblock::read_from_bytes(&raw)
            .map_err(|_| OpenError::NotThisFormat)?;

        if sb.magic != EXT_MAGIC {
            return Err(OpenError::NotThisFormat);
        }
        let state = sb.state;
        if state & EXT_STATE_ERRORS != 0 {
            return Err(OpenError::unsupported(
                "ext",
                "state",
                String::from("filesystem carries recorded errors"),
            ));
        }
        let rev = sb.rev_level;
        if rev > EXT_DYNAMIC_REV {
            return Err(OpenError::unsupported(
                "ext",
                "rev_level",
                format!("revision {rev} is newer than dynamic"),
            ));
        }

        let log_bs = sb.log_block_size;
        if log_bs > 6 {
            return Err(OpenError::corrupt(
                "ext",
                "log_block_size",
                format!("expected 0..=6, got {log_bs}"),
            ));
        }
        let block_size = 1024u32 << log_bs;

        // Revision 0 predates the dynamic superblock fields.
        let (inode_size, incompat) = if rev == EXT_GOOD_OLD_REV {
            (EXT_GOOD_OLD_INODE_SIZE as u32, 0u32)
        } else {
            let isize = sb.inode_size as u32;
            if !isize.is_power_of_two() || isize < 128 || isize > block_size {
                return Err(OpenError::corrupt(
                    "ext",
                    "inode_size",
                    format!("expected power of two in 128..={block_size}, got {isize}"),
                ));
            }
            (isize, sb.feature_incompat)
        };

        if incompat & ExtIncompat::RECOVER.bits() != 0 {
            return Err(OpenError::unsupported(
                "ext",
                "feature_incompat",
                String::from("journal recovery needed"),
            ));
        }
        if incompat & ExtIncompat::BIT64.bits() != 0 {
            return Err(OpenError::unsupported(
                "ext",
                "feature_incompat",
                String::from("64-bit block numbers"),
            ));
        }
        let unknown = incompat & !EXT_INCOMPAT_SUPPORTED;
        if unknown != 0 {
            return Err(OpenError::unsupported(
                "ext",
                "feature_incompat",
                format!("unimplemented feature bits {unknown:#x}"),
            ));
        }

        let (blocks, inodes, bpg, ipg, first) = (
            sb.blocks_count,
            sb.inodes_count,
            sb.blocks_per_group,
            sb.inodes_per_group,
            sb.first_data_block,
        );
        if blocks == 0 || blocks as u64 * block_size as u64 > media_size {
            return Err(OpenError::corrupt(
                "ext",
                "blocks_count",
                format!("{blocks} blocks of {block_size} do not fit the medium"),
            ));
        }
        if inodes == 0 || ipg == 0 || bpg == 0 {
            return Err(OpenError::corrupt(
                "ext",
                "superblock",
                String::from("zero inode or group count"),
            ));
        }
        let expected_first = if block_size == 1024 { 1 } else { 0 };
        if first != expected_first {
            return Err(OpenError::corrupt(
                "ext",
                "first_data_block",
                format!("{first} disagrees with block size {block_size}"),
            ));
        }

        Ok(ExtMeta {
            block_size,
            blocks_count: blocks,
            first_data_block: first,
            blocks_per_group: bpg,
            inodes_per_group: ipg,
            inodes_count: inodes,
            inode_size,
            revision: rev,
            has_filetype: incompat & ExtIncompat::FILETYPE.bits() != 0,
            volume_label: label_from_bytes(&sb.volume_name),
        })
    }

    pub(crate) fn assemble(io: IO, meta: ExtMeta) -> Self {
        debug!(
            "ext: mounted rev {} volume, {} blocks of {} bytes",
            meta.revision, meta.blocks_count, meta.block_size
        );
        Self { io, meta }
    }

    pub fn meta(&self) -> &ExtMeta {
        &self.meta
    }

    pub fn into_inner(self) -> IO {
        self.io
    }

    fn inode(&mut self, ino: u32) -> FsResult<ExtInode> {
        if ino == 0 || ino > self.meta.inodes_count {
            return Err(FsError::Corrupt("Inode number out of range"));
        }
        let group = (ino - 1) / self.meta.inodes_per_group;
        let index = (ino - 1) % self.meta.inodes_per_group;

        // Descriptor table sits in the block after the superblock.
        let desc_off = self.meta.block_offset(self.meta.first_data_block as u64 + 1)
            + group as u64 * 32;
        let mut raw = [0u8; 32];
        self.io.read_at(desc_off, &mut raw)?;
        let desc = ExtGroupDesc::read_from_bytes(&raw)
            .map_err(|_| FsError::Corrupt("Short group descriptor"))?;

        let table = desc.inode_table;
        if table == 0 || table >= self.meta.blocks_count {
            return Err(FsError::Corrupt("Inode table outside the volume"));
        }
        let off = self.meta.block_offset(table as u64) + index as u64 * self.meta.inode_size as u64;
        let mut raw = [0u8; 128];
        self.io.read_at(off, &mut raw)?;
        ExtInode::read_from_bytes(&raw).map_err(|_| FsError::Corrupt("Short inode"))
    }

    /// Maps a file block through the classic direct/indirect chains.
    /// `None` is a hole.
    fn map_classic(&mut self, inode: &ExtInode, file_block: u64) -> FsResult<Option<u64>> {
        let ppb = self.meta.block_size as u64 / 4;
        let map = inode.block;
        let mut fb = file_block;
        if fb < 12 {
            return Ok(nonzero_block(map[fb as usize]));
        }
        fb -= 12;
        let (levels, mut table): (u32, u32) = if fb < ppb {
            (1, map[12])
        } else if fb < ppb + ppb * ppb {
            fb -= ppb;
            (2, map[13])
        } else if fb < ppb + ppb * ppb + ppb * ppb * ppb {
            fb -= ppb + ppb * ppb;
            (3, map[14])
        } else {
            return Err(FsError::Corrupt("File block beyond triple indirection"));
        };

        for level in (0..levels).rev() {
            let Some(block) = nonzero_block(table) else {
                return Ok(None);
            };
            if block >= self.meta.blocks_count as u64 {
                return Err(FsError::Corrupt("Indirect block outside the volume"));
            }
            let stride = ppb.pow(level);
            let idx = fb / stride;
            fb %= stride;
            table = self
                .io
                .read_u32_at(self.meta.block_offset(block) + idx * 4)?;
        }
        Ok(nonzero_block(table))
    }

    /// Maps a file block through the extent tree rooted in the inode's
    /// block area.
    fn map_extents(&mut self, inode: &ExtInode, file_block: u64) -> FsResult<Option<u64>> {
        let map = inode.block;
        let mut node: Vec<u8> = map.iter().flat_map(|w| w.to_le_bytes()).collect();
        for _ in 0..=EXT_EXTENT_MAX_DEPTH {
            let hdr = ExtExtentHeader::read_from_prefix(&node)
                .map_err(|_| FsError::Corrupt("Short extent node"))?
                .0;
            let magic = hdr.magic;
            if magic != EXT_EXTENT_MAGIC {
                return Err(FsError::Corrupt("Bad extent node magic"));
            }
            let entries = hdr.entries as usize;
            if 12 + entries * 12 > node.len() {
                return Err(FsError::Corrupt("Extent entries overrun node"));
            }

            if hdr.depth == 0 {
                for i in 0..entries {
                    let ext = ExtExtent::read_from_prefix(&node[12 + i * 12..])
                        .map_err(|_| FsError::Corrupt("Short extent"))?
                        .0;
                    let (first, len) = (ext.file_block as u64, ext.len as u64);
                    // Lengths over 32768 mark uninitialized extents.
                    let len = len.min(32768);
                    if (first..first + len).contains(&file_block) {
                        let phys = ext.start() + (file_block - first);
                        if phys >= self.meta.blocks_count as u64 {
                            return Err(FsError::Corrupt("Extent outside the volume"));
                        }
                        return Ok(Some(phys));
                    }
                }
                return Ok(None);
            }

            // Interior node: last child whose range starts at or below
            // the target.
            let mut child: Option<u64> = None;
            for i in 0..entries {
                let idx = ExtExtentIdx::read_from_prefix(&node[12 + i * 12..])
                    .map_err(|_| FsError::Corrupt("Short extent index"))?
                    .0;
                if idx.file_block as u64 <= file_block {
                    child = Some(((idx.leaf_hi as u64) << 32) | idx.leaf_lo as u64);
                }
            }
            let Some(block) = child else {
                return Ok(None);
            };
            if block >= self.meta.blocks_count as u64 {
                return Err(FsError::Corrupt("Extent child outside the volume"));
            }
            let mut buf = vec![0u8; self.meta.block_size as usize];
            self.io.read_at(self.meta.block_offset(block), &mut buf)?;
            node = buf;
        }
        Err(FsError::Loop)
    }

    fn map_block(&mut self, inode: &ExtInode, file_block: u64) -> FsResult<Option<u64>> {
        if inode.uses_extents() {
            self.map_extents(inode, file_block)
        } else {
            self.map_classic(inode, file_block)
        }
    }

    /// Positional read of an inode's data; holes read as zeros. Returns
    /// the byte count, short only at end of data.
    fn read_inode_at(&mut self, inode: &ExtInode, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let size = inode.byte_size();
        if offset >= size {
            return Ok(0);
        }
        let total = (buf.len() as u64).min(size - offset) as usize;
        let bs = self.meta.block_size as u64;

        let mut done = 0usize;
        while done < total {
            let pos = offset + done as u64;
            let within = pos % bs;
            let n = ((bs - within) as usize).min(total - done);
            let chunk = &mut buf[done..done + n];
            match self.map_block(inode, pos / bs)? {
                Some(block) => {
                    self.io.read_at(self.meta.block_offset(block) + within, chunk)?;
                }
                None => chunk.fill(0),
            }
            done += n;
        }
        Ok(total)
    }

    fn read_inode_all(&mut self, inode: &ExtInode) -> FsResult<Vec<u8>> {
        let mut data = vec![0u8; inode.byte_size() as usize];
        let n = self.read_inode_at(inode, 0, &mut data)?;
        data.truncate(n);
        Ok(data)
    }

    /// Lists a directory inode; '.' and '..' are suppressed.
    fn list_dir(&mut self, dir: &ExtInode) -> FsResult<Vec<ExtNode>> {
        if !dir.is_dir() {
            return Err(FsError::NotADirectory);
        }
        let bytes = self.read_inode_all(dir)?;
        let mut nodes = Vec::new();
        let mut pos = 0usize;
        while pos + 8 <= bytes.len() {
            let entry = ExtDirEntry::read_from_prefix(&bytes[pos..])
                .map_err(|_| FsError::Corrupt("Short directory entry"))?
                .0;
            let rec_len = entry.rec_len as usize;
            if rec_len < 8 || rec_len % 4 != 0 || pos + rec_len > bytes.len() {
                return Err(FsError::Corrupt("Malformed directory entry"));
            }
            if entry.inode != 0 {
                let name_len = entry.name_len as usize;
                if 8 + name_len > rec_len {
                    return Err(FsError::Corrupt("Name overruns directory entry"));
                }
                let raw = &bytes[pos + 8..pos + 8 + name_len];
                if raw != b"." && raw != b".." {
                    let name = core::str::from_utf8(raw)
                        .map_err(|_| FsError::Corrupt("Non-UTF-8 name"))?;
                    let inode = self.inode(entry.inode)?;
                    nodes.push(ExtNode {
                        name: String::from(name),
                        inode,
                    });
                }
            }
            pos += rec_len;
        }
        Ok(nodes)
    }

    /// `None` means the path is the root directory itself. Name
    /// comparison is case-sensitive.
    fn resolve(&mut self, path: &str) -> FsResult<Option<ExtNode>> {
        let mut dir = self.inode(EXT_ROOT_INO)?;
        let mut found: Option<ExtNode> = None;

        for comp in path_components(path) {
            if let Some(node) = found.take() {
                if !node.inode.is_dir() {
                    return Err(FsError::NotADirectory);
                }
                dir = node.inode;
            }
            let nodes = self.list_dir(&dir)?;
            found = Some(
                nodes
                    .into_iter()
                    .find(|n| n.name == comp)
                    .ok_or(FsError::NotFound)?,
            );
        }
        Ok(found)
    }
}

#[inline]
fn nonzero_block(block: impl Into<u64>) -> Option<u64> {
    let block = block.into();
    (block != 0).then_some(block)
}

fn label_from_bytes(raw: &[u8; 16]) -> Option<String> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    if end == 0 {
        return None;
    }
    core::str::from_utf8(&raw[..end]).ok().map(String::from)
}

fn node_kind(inode: &ExtInode) -> NodeKind {
    if inode.is_dir() {
        NodeKind::Dir
    } else {
        NodeKind::File
    }
}

impl<IO: BlockIO> FsVolume for ExtVolume<IO> {
    fn format_tag(&self) -> FormatTag {
        FormatTag::Ext
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
                kind: node_kind(&node.inode),
                size: node.inode.byte_size(),
                mtime: {
                    let mtime = node.inode.mtime;
                    (mtime != 0)
                        .then(|| time::OffsetDateTime::from_unix_timestamp(mtime as i64).ok())
                        .flatten()
                },
                name: node.name,
            }),
        }
    }

    fn read_dir(&mut self, path: &str) -> FsResult<Vec<DirEntry>> {
        let dir = match self.resolve(path)? {
            None => self.inode(EXT_ROOT_INO)?,
            Some(node) => node.inode,
        };
        let nodes = self.list_dir(&dir)?;
        Ok(nodes
            .into_iter()
            .map(|n| DirEntry {
                kind: node_kind(&n.inode),
                size: n.inode.byte_size(),
                name: n.name,
            })
            .collect())
    }

    fn read_file(&mut self, path: &str) -> FsResult<Vec<u8>> {
        let node = self.resolve(path)?.ok_or(FsError::NotAFile)?;
        if !node.inode.is_regular() {
            return Err(FsError::NotAFile);
        }
        self.read_inode_all(&node.inode)
    }

    fn read_file_at(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let node = self.resolve(path)?.ok_or(FsError::NotAFile)?;
        if !node.inode.is_regular() {
            return Err(FsError::NotAFile);
        }
        self.read_inode_at(&node.inode, offset, buf)
    }
}

#[cfg(all(test, feature = "std", feature = "mem"))]
mod tests {
    use super::*;
    use zerocopy::IntoBytes;

    const BS: usize = 1024;

    fn inode_bytes(mode: u16, size: u32, flags: u32, block: [u32; 15]) -> [u8; 128] {
        let mut ino = ExtInode::read_from_bytes(&[0u8; 128]).unwrap();
        ino.mode = mode;
        ino.size = size;
        ino.links_count = 1;
        ino.flags = flags;
        ino.block = block;
        let mut raw = [0u8; 128];
        raw.copy_from_slice(ino.as_bytes());
        raw
    }

    fn dirent(inode: u32, name: &str, file_type: u8, rec_len: u16) -> Vec<u8> {
        let mut raw = vec![0u8; rec_len as usize];
        raw[0..4].copy_from_slice(&inode.to_le_bytes());
        raw[4..6].copy_from_slice(&rec_len.to_le_bytes());
        raw[6] = name.len() as u8;
        raw[7] = file_type;
        raw[8..8 + name.len()].copy_from_slice(name.as_bytes());
        raw
    }

    /// 64-block 1K ext2 image: root (inode 2) holding `hello.txt`
    /// (classic map, inode 12) and `ext.txt` (extent tree, inode 13).
    fn build_image() -> Vec<u8> {
        let mut img = vec![0u8; 64 * BS];

        let mut sb = ExtSuperblock::read_from_bytes(&[0u8; 264]).unwrap();
        sb.inodes_count = 16;
        sb.blocks_count = 64;
        sb.first_data_block = 1;
        sb.log_block_size = 0;
        sb.blocks_per_group = 8192;
        sb.inodes_per_group = 16;
        sb.magic = EXT_MAGIC;
        sb.state = 1;
        sb.rev_level = EXT_DYNAMIC_REV;
        sb.first_ino = 11;
        sb.inode_size = 128;
        sb.feature_incompat =
            ExtIncompat::FILETYPE.bits() | ExtIncompat::EXTENTS.bits();
        sb.volume_name[..4].copy_from_slice(b"opal");
        img[1024..1024 + 264].copy_from_slice(sb.as_bytes());

        // Group descriptor at block 2: inode table at block 5.
        let mut desc = ExtGroupDesc::read_from_bytes(&[0u8; 32]).unwrap();
        desc.block_bitmap = 3;
        desc.inode_bitmap = 4;
        desc.inode_table = 5;
        img[2 * BS..2 * BS + 32].copy_from_slice(desc.as_bytes());

        // Inode table: root at slot 1, files at slots 11 and 12.
        let table = 5 * BS;
        let mut root_blocks = [0u32; 15];
        root_blocks[0] = 10;
        img[table + 128..table + 256]
            .copy_from_slice(&inode_bytes(EXT_S_IFDIR | 0o755, BS as u32, 0, root_blocks));

        let mut file_blocks = [0u32; 15];
        file_blocks[0] = 11;
        img[table + 11 * 128..table + 12 * 128]
            .copy_from_slice(&inode_bytes(EXT_S_IFREG | 0o644, 5, 0, file_blocks));

        // Extent-mapped file: single leaf extent at block 12.
        let mut extent_root = [0u32; 15];
        let hdr = ExtExtentHeader {
            magic: EXT_EXTENT_MAGIC,
            entries: 1,
            max_entries: 4,
            depth: 0,
            generation: 0,
        };
        let leaf = ExtExtent {
            file_block: 0,
            len: 1,
            start_hi: 0,
            start_lo: 12,
        };
        let mut area = [0u8; 60];
        area[..12].copy_from_slice(hdr.as_bytes());
        area[12..24].copy_from_slice(leaf.as_bytes());
        for (i, chunk) in area.chunks_exact(4).enumerate() {
            extent_root[i] = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        img[table + 12 * 128..table + 13 * 128].copy_from_slice(&inode_bytes(
            EXT_S_IFREG | 0o644,
            7,
            EXT_INODE_FLAG_EXTENTS,
            extent_root,
        ));

        // Root directory data at block 10.
        let dir = 10 * BS;
        let mut pos = dir;
        for entry in [
            dirent(2, ".", EXT_FT_DIR, 12),
            dirent(2, "..", EXT_FT_DIR, 12),
            dirent(12, "hello.txt", EXT_FT_REG_FILE, 20),
            dirent(13, "ext.txt", EXT_FT_REG_FILE, (BS - 44) as u16),
        ] {
            img[pos..pos + entry.len()].copy_from_slice(&entry);
            pos += entry.len();
        }

        img[11 * BS..11 * BS + 5].copy_from_slice(b"hello");
        img[12 * BS..12 * BS + 7].copy_from_slice(b"extents");
        img
    }

    #[test]
    fn test_mount_and_read() {
        let mut img = build_image();
        let io = MemBlockIO::new(&mut img);
        let mut vol = ExtVolume::open(io).unwrap();

        assert_eq!(vol.label(), Some("opal"));
        let mut names: Vec<_> = vol
            .read_dir("/")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        names.sort();
        assert_eq!(names, ["ext.txt", "hello.txt"]);

        let info = vol.lookup("/hello.txt").unwrap();
        assert_eq!(info.kind, NodeKind::File);
        assert_eq!(info.size, 5);
        assert_eq!(vol.read_file("/hello.txt").unwrap(), b"hello");
    }

    #[test]
    fn test_extent_mapped_file() {
        let mut img = build_image();
        let io = MemBlockIO::new(&mut img);
        let mut vol = ExtVolume::open(io).unwrap();

        assert_eq!(vol.read_file("/ext.txt").unwrap(), b"extents");
        let mut tail = [0u8; 16];
        assert_eq!(vol.read_file_at("/ext.txt", 3, &mut tail).unwrap(), 4);
        assert_eq!(&tail[..4], b"ents");
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let mut img = build_image();
        let io = MemBlockIO::new(&mut img);
        let mut vol = ExtVolume::open(io).unwrap();
        assert_eq!(vol.lookup("/HELLO.TXT").err(), Some(FsError::NotFound));
    }

    #[test]
    fn test_bad_magic_is_not_this_format() {
        let mut img = vec![0u8; 64 * BS];
        let io = MemBlockIO::new(&mut img);
        assert!(matches!(
            ExtVolume::open(io),
            Err(OpenError::NotThisFormat)
        ));
    }

    #[test]
    fn test_journal_recovery_is_unsupported() {
        let mut img = build_image();
        let incompat = ExtIncompat::FILETYPE.bits() | ExtIncompat::RECOVER.bits();
        img[1024 + 96..1024 + 100].copy_from_slice(&incompat.to_le_bytes());
        let io = MemBlockIO::new(&mut img);
        match ExtVolume::open(io) {
            Err(OpenError::Unsupported(diag)) => assert_eq!(diag.field, "feature_incompat"),
            other => panic!("expected unsupported, got {:?}", other.err()),
        }
    }
}
