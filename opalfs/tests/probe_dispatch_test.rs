// SPDX-License-Identifier: MIT

//! Dispatcher behavior over real and broken images.

use opalfs::fat::*;
use opalfs::{AnyVolume, FormatTag, FsVolume, ProbeOptions, detect, open_auto};

#[test]
fn test_zero_image_is_deterministic() {
    let mut img = vec![0u8; 1024 * 1024];

    for _ in 0..2 {
        let io = MemBlockIO::new(&mut img);
        match open_auto(io, &ProbeOptions::default()) {
            Err(OpenError::NotThisFormat) => {}
            other => panic!("expected NotThisFormat, got {:?}", other.err()),
        }
    }
    // Probing never writes.
    assert!(img.iter().all(|&b| b == 0));
}

#[test]
fn test_formatted_fat_dispatches() {
    let mut img = vec![0u8; 32 * 1024 * 1024];
    let mut io = MemBlockIO::new(&mut img);
    FatFormatter::new(&mut io)
        .format(&FatFormatOptions::default().quick().with_label("PROBED"))
        .unwrap();

    assert_eq!(detect(&mut io), Some(FormatTag::Fat));

    let mut vol = open_auto(io, &ProbeOptions::default()).unwrap();
    assert_eq!(vol.format_tag(), FormatTag::Fat);
    assert_eq!(vol.label(), Some("PROBED"));
    assert!(vol.read_dir("/").unwrap().is_empty());
    assert!(matches!(vol, AnyVolume::Fat(_)));

    // The backing comes back out intact.
    let mut io = vol.into_inner();
    assert_eq!(io.size().unwrap(), 32 * 1024 * 1024);
}

#[test]
fn test_single_match_surfaces_its_diagnosis() {
    // FAT magic in place, impossible sector size: only the FAT plugin
    // gets past its magic check, so its Corrupt diagnosis must come
    // through instead of a generic "unknown format".
    let mut img = vec![0u8; 64 * 1024];
    img[0] = 0xEB;
    img[510] = 0x55;
    img[511] = 0xAA;
    img[21] = 0xF8;
    img[22..24].copy_from_slice(&8u16.to_le_bytes());
    img[19..21].copy_from_slice(&128u16.to_le_bytes());
    img[11..13].copy_from_slice(&513u16.to_le_bytes());

    let io = MemBlockIO::new(&mut img);
    match open_auto(io, &ProbeOptions::default()) {
        Err(OpenError::Corrupt(diag)) => {
            assert_eq!(diag.format, "fat");
            assert_eq!(diag.field, "bytes_per_sector");
        }
        other => panic!("expected corrupt, got {:?}", other.err()),
    }
}

#[test]
fn test_detect_is_magic_only() {
    // detect() answers from signatures alone and never validates.
    let mut img = vec![0u8; 40 * 2048];
    img[32768 + 1..32768 + 6].copy_from_slice(b"CD001");
    let mut io = MemBlockIO::new(&mut img);
    assert_eq!(detect(&mut io), Some(FormatTag::Iso9660));

    let mut img = vec![0u8; 64 * 1024];
    img[3..11].copy_from_slice(b"NTFS    ");
    let mut io = MemBlockIO::new(&mut img);
    assert_eq!(detect(&mut io), Some(FormatTag::Ntfs));

    let mut img = vec![0u8; 64 * 1024];
    img[1024 + 56..1024 + 58].copy_from_slice(&0xEF53u16.to_le_bytes());
    let mut io = MemBlockIO::new(&mut img);
    assert_eq!(detect(&mut io), Some(FormatTag::Ext));

    let mut img = vec![0u8; 64 * 1024];
    let mut io = MemBlockIO::new(&mut img);
    assert_eq!(detect(&mut io), None);
}

#[test]
fn test_tiny_image_detects_nothing() {
    let mut img = vec![0u8; 64];
    let mut io = MemBlockIO::new(&mut img);
    assert_eq!(detect(&mut io), None);

    let io = MemBlockIO::new(&mut img);
    assert!(matches!(
        open_auto(io, &ProbeOptions::default()),
        Err(OpenError::NotThisFormat)
    ));
}
