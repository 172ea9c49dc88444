// SPDX-License-Identifier: MIT

//! Format-then-reopen round trips: every produced image must mount
//! through the regular open path with the same variant the formatter
//! designed, and an empty root directory.

use opalfs::fat::*;

#[test]
fn test_quick_format_roundtrip_fat16() {
    let mut img = vec![0u8; 32 * 1024 * 1024];
    let mut io = MemBlockIO::new(&mut img);
    let opts = FatFormatOptions::default().quick().with_label("OPALDISK");
    let designed = FatFormatter::new(&mut io).format(&opts).unwrap();
    assert_eq!(designed.fat_type, FatType::Fat16);

    let mut vol = FatVolume::open(io, &FatOpenOptions::default()).unwrap();
    assert_eq!(vol.fat_type(), FatType::Fat16);
    assert_eq!(vol.meta().cluster_count, designed.cluster_count);
    assert_eq!(vol.label(), Some("OPALDISK"));
    assert!(vol.read_dir("/").unwrap().is_empty());
}

#[test]
fn test_quick_format_roundtrip_fat12() {
    let mut img = vec![0u8; 1_474_560];
    let mut io = MemBlockIO::new(&mut img);
    let opts = FatFormatOptions::default().quick();
    let designed = FatFormatter::new(&mut io).format(&opts).unwrap();
    assert_eq!(designed.fat_type, FatType::Fat12);
    assert_eq!(designed.total_sectors, 2880);

    let mut vol = FatVolume::open(io, &FatOpenOptions::default()).unwrap();
    assert_eq!(vol.fat_type(), FatType::Fat12);
    assert_eq!(vol.volume_size(), 1_474_560);
    assert!(vol.read_dir("/").unwrap().is_empty());
}

#[test]
fn test_quick_format_roundtrip_fat32() {
    let mut img = vec![0u8; 128 * 1024 * 1024];
    let mut io = MemBlockIO::new(&mut img);
    let opts = FatFormatOptions {
        fat_type: Some(FatType::Fat32),
        quick: true,
        ..Default::default()
    };
    let designed = FatFormatter::new(&mut io).format(&opts).unwrap();
    assert_eq!(designed.fat_type, FatType::Fat32);

    let mut vol = FatVolume::open(io, &FatOpenOptions::default()).unwrap();
    assert_eq!(vol.fat_type(), FatType::Fat32);
    assert!(vol.read_dir("/").unwrap().is_empty());
    assert_eq!(vol.lookup("/").unwrap().kind, NodeKind::Dir);
    assert_eq!(vol.lookup("/missing.txt").err(), Some(FsError::NotFound));
}

#[test]
fn test_full_format_roundtrip() {
    // The 0xF6 fill must stay confined to the data region; the root
    // directory still reads back empty.
    let mut img = vec![0u8; 2 * 1024 * 1024];
    let mut io = MemBlockIO::new(&mut img);
    let meta = FatFormatter::new(&mut io)
        .format(&FatFormatOptions::default())
        .unwrap();

    let first_data = (meta.first_data_sector * meta.bytes_per_sector) as usize;
    let mut vol = FatVolume::open(io, &FatOpenOptions::default()).unwrap();
    assert!(vol.read_dir("/").unwrap().is_empty());
    drop(vol);
    assert_eq!(img[first_data], 0xF6);
    assert_eq!(img[img.len() - 1], 0xF6);
}

#[test]
fn test_floppy_144_helper() {
    let mut file = tempfile::tempfile().unwrap();
    let mut io = StdBlockIO::new(&mut file);
    let meta = format_floppy_144(&mut io, true).unwrap();
    assert_eq!(meta.fat_type, FatType::Fat12);
    assert_eq!(meta.total_sectors, 2880);
    assert_eq!(io.size().unwrap(), 1_474_560);

    let mut vol = FatVolume::open(io, &FatOpenOptions::default()).unwrap();
    assert_eq!(vol.fat_type(), FatType::Fat12);
    assert!(vol.read_dir("/").unwrap().is_empty());
}

#[test]
fn test_floppy_288_helper() {
    let mut file = tempfile::tempfile().unwrap();
    let mut io = StdBlockIO::new(&mut file);
    let meta = format_floppy_288(&mut io, true).unwrap();
    assert_eq!(meta.total_sectors, 5760);
    assert_eq!(meta.media, 0xF0);
    assert_eq!(io.size().unwrap(), 2_949_120);
}

#[test]
fn test_offset_open_sees_embedded_volume() {
    // A floppy image embedded 4K into a larger container.
    const SKIP: usize = 4096;
    let mut inner = vec![0u8; 1_474_560];
    let mut io = MemBlockIO::new(&mut inner);
    FatFormatter::new(&mut io)
        .format(&FatFormatOptions::default().quick())
        .unwrap();

    let mut container = vec![0u8; SKIP + 1_474_560];
    container[SKIP..].copy_from_slice(&inner);

    let io = MemBlockIO::new(&mut container);
    let opts = FatOpenOptions {
        boot_sector_offset: SKIP as u64,
        ..Default::default()
    };
    let mut vol = FatVolume::open(io, &opts).unwrap();
    assert_eq!(vol.fat_type(), FatType::Fat12);
    assert!(vol.read_dir("/").unwrap().is_empty());
}

#[test]
fn test_read_only_mount_mode() {
    let mut img = vec![0u8; 2 * 1024 * 1024];
    let mut io = MemBlockIO::new(&mut img);
    FatFormatter::new(&mut io)
        .format(&FatFormatOptions::default().quick().with_label("RODISK"))
        .unwrap();

    let opts = FatOpenOptions {
        read_only: true,
        ..Default::default()
    };
    let mut vol = FatVolume::open(io, &opts).unwrap();
    assert!(vol.is_read_only());
    assert_eq!(vol.label(), Some("RODISK"));
    assert!(vol.read_dir("/").unwrap().is_empty());

    // Default mounts are read-write, matching the formatter's needs.
    let io = vol.into_inner();
    let vol = FatVolume::open(io, &FatOpenOptions::default()).unwrap();
    assert!(!vol.is_read_only());
}
