// SPDX-License-Identifier: MIT

//! Namespace selection on a hybrid image carrying Joliet, Rock Ridge
//! and plain ISO9660 views of the same file, with an optional UDF
//! bridge recognition sequence.

use opalfs::iso9660::*;

const SECTOR: usize = 2048;
const PLAIN_ROOT_LBA: u32 = 24;
const JOLIET_ROOT_LBA: u32 = 25;
const FILE_LBA: u32 = 26;
const FILE_DATA: &[u8] = b"hello iso\n";

fn both16(v: u16) -> [u8; 4] {
    let mut out = [0u8; 4];
    out[..2].copy_from_slice(&v.to_le_bytes());
    out[2..].copy_from_slice(&v.to_be_bytes());
    out
}

fn both32(v: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&v.to_le_bytes());
    out[4..].copy_from_slice(&v.to_be_bytes());
    out
}

fn dir_record(name: &[u8], extent: u32, size: u32, flags: u8, system_use: &[u8]) -> Vec<u8> {
    let pad = if name.len() % 2 == 1 { 0 } else { 1 };
    let rec_len = 33 + name.len() + pad + system_use.len();
    let mut rec = vec![0u8; rec_len];
    rec[0] = rec_len as u8;
    rec[2..10].copy_from_slice(&both32(extent));
    rec[10..18].copy_from_slice(&both32(size));
    rec[18..25].copy_from_slice(&[120, 6, 15, 12, 30, 0, 0]);
    rec[25] = flags;
    rec[28..32].copy_from_slice(&both16(1));
    rec[32] = name.len() as u8;
    rec[33..33 + name.len()].copy_from_slice(name);
    let su_start = 33 + name.len() + pad;
    rec[su_start..].copy_from_slice(system_use);
    rec
}

fn volume_descriptor(desc_type: u8, volume_id: &[u8; 32], root_lba: u32, escapes: &[u8]) -> Vec<u8> {
    let mut desc = vec![0u8; SECTOR];
    desc[0] = desc_type;
    desc[1..6].copy_from_slice(b"CD001");
    desc[6] = 1; // version
    desc[40..72].copy_from_slice(volume_id);
    desc[80..88].copy_from_slice(&both32(30)); // volume space size
    desc[88..88 + escapes.len()].copy_from_slice(escapes);
    desc[120..124].copy_from_slice(&both16(1)); // set size
    desc[124..128].copy_from_slice(&both16(1)); // sequence number
    desc[128..132].copy_from_slice(&both16(2048)); // block size

    let root = dir_record(&[0x00], root_lba, SECTOR as u32, 0x02, &[]);
    desc[156..156 + root.len()].copy_from_slice(&root);
    desc
}

fn ucs2_be(name: &str) -> Vec<u8> {
    name.encode_utf16().flat_map(|u| u.to_be_bytes()).collect()
}

/// PVD (Rock Ridge root), Joliet SVD, terminator, then optionally a
/// UDF volume recognition sequence.
fn build_image(with_udf: bool) -> Vec<u8> {
    let mut img = vec![0u8; 32 * SECTOR];

    let mut plain_id = [b' '; 32];
    plain_id[..8].copy_from_slice(b"PLAINVOL");
    let pvd = volume_descriptor(1, &plain_id, PLAIN_ROOT_LBA, &[]);
    img[16 * SECTOR..17 * SECTOR].copy_from_slice(&pvd);

    let mut joliet_id = [0u8; 32];
    joliet_id[..12].copy_from_slice(&ucs2_be("JOLIET"));
    let svd = volume_descriptor(2, &joliet_id, JOLIET_ROOT_LBA, &[0x25, 0x2F, 0x45]);
    img[17 * SECTOR..18 * SECTOR].copy_from_slice(&svd);

    let term = 18 * SECTOR;
    img[term] = 255;
    img[term + 1..term + 6].copy_from_slice(b"CD001");
    img[term + 6] = 1;

    if with_udf {
        for (i, id) in [b"BEA01", b"NSR02", b"TEA01"].iter().enumerate() {
            let off = (19 + i) * SECTOR;
            img[off] = 0;
            img[off + 1..off + 6].copy_from_slice(*id);
            img[off + 6] = 1;
        }
    }

    // Plain root: the '.' record announces SUSP, the file carries a
    // Rock Ridge alternate name.
    let mut root = Vec::new();
    root.extend(dir_record(
        &[0x00],
        PLAIN_ROOT_LBA,
        SECTOR as u32,
        0x02,
        &[b'S', b'P', 7, 1, 0xBE, 0xEF, 0],
    ));
    root.extend(dir_record(&[0x01], PLAIN_ROOT_LBA, SECTOR as u32, 0x02, &[]));
    let mut nm = vec![b'N', b'M', (5 + "ReadMe.txt".len()) as u8, 1, 0];
    nm.extend_from_slice(b"ReadMe.txt");
    root.extend(dir_record(
        b"README.TXT;1",
        FILE_LBA,
        FILE_DATA.len() as u32,
        0,
        &nm,
    ));
    let base = PLAIN_ROOT_LBA as usize * SECTOR;
    img[base..base + root.len()].copy_from_slice(&root);

    // Joliet root with the UCS-2 name.
    let mut jroot = Vec::new();
    jroot.extend(dir_record(&[0x00], JOLIET_ROOT_LBA, SECTOR as u32, 0x02, &[]));
    jroot.extend(dir_record(&[0x01], JOLIET_ROOT_LBA, SECTOR as u32, 0x02, &[]));
    jroot.extend(dir_record(
        &ucs2_be("ReadMe.txt"),
        FILE_LBA,
        FILE_DATA.len() as u32,
        0,
        &[],
    ));
    let base = JOLIET_ROOT_LBA as usize * SECTOR;
    img[base..base + jroot.len()].copy_from_slice(&jroot);

    let base = FILE_LBA as usize * SECTOR;
    img[base..base + FILE_DATA.len()].copy_from_slice(FILE_DATA);
    img
}

#[test]
fn test_joliet_wins_by_default() {
    let mut img = build_image(false);
    let io = MemBlockIO::new(&mut img);
    let mut vol = IsoVolume::open(io, IsoFlags::empty()).unwrap();

    assert_eq!(vol.active_namespace(), IsoNamespace::Joliet);
    assert_eq!(vol.label(), Some("JOLIET"));
    let entries = vol.read_dir("/").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "ReadMe.txt");
    assert_eq!(vol.read_file("/ReadMe.txt").unwrap(), FILE_DATA);
    // Joliet lookups are case-insensitive.
    assert!(vol.lookup("/readme.txt").is_ok());
}

#[test]
fn test_no_joliet_falls_back_to_rock_ridge() {
    let mut img = build_image(false);
    let io = MemBlockIO::new(&mut img);
    let mut vol = IsoVolume::open(io, IsoFlags::NO_JOLIET).unwrap();

    assert_eq!(vol.active_namespace(), IsoNamespace::RockRidge);
    assert_eq!(vol.label(), Some("PLAINVOL"));
    let entries = vol.read_dir("/").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "ReadMe.txt");
    assert_eq!(vol.read_file("/ReadMe.txt").unwrap(), FILE_DATA);
    // Rock Ridge names are POSIX names.
    assert_eq!(vol.lookup("/readme.txt").err(), Some(FsError::NotFound));
}

#[test]
fn test_plain_namespace_strips_versions() {
    let mut img = build_image(false);
    let io = MemBlockIO::new(&mut img);
    let mut vol = IsoVolume::open(io, IsoFlags::NO_JOLIET | IsoFlags::NO_ROCK).unwrap();

    assert_eq!(vol.active_namespace(), IsoNamespace::Plain);
    let entries = vol.read_dir("/").unwrap();
    assert_eq!(entries[0].name, "README.TXT");
    assert_eq!(vol.read_file("/readme.txt").unwrap(), FILE_DATA);
}

#[test]
fn test_udf_bridge_reported_until_excluded() {
    let mut img = build_image(true);
    let io = MemBlockIO::new(&mut img);
    match IsoVolume::open(io, IsoFlags::empty()) {
        Err(OpenError::Unsupported(diag)) => assert_eq!(diag.field, "udf"),
        other => panic!("expected unsupported, got {:?}", other.err()),
    }

    let io = MemBlockIO::new(&mut img);
    let vol = IsoVolume::open(io, IsoFlags::NO_UDF).unwrap();
    assert_eq!(vol.active_namespace(), IsoNamespace::Joliet);
}

#[test]
fn test_lookup_metadata() {
    let mut img = build_image(false);
    let io = MemBlockIO::new(&mut img);
    let mut vol = IsoVolume::open(io, IsoFlags::empty()).unwrap();

    let info = vol.lookup("/ReadMe.txt").unwrap();
    assert_eq!(info.kind, NodeKind::File);
    assert_eq!(info.size, FILE_DATA.len() as u64);
    let mtime = info.mtime.unwrap();
    assert_eq!(mtime.year(), 2020);

    let mut buf = [0u8; 5];
    assert_eq!(vol.read_file_at("/ReadMe.txt", 6, &mut buf).unwrap(), 4);
    assert_eq!(&buf[..4], b"iso\n");
}
