// SPDX-License-Identifier: MIT

use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const ISO_SECTOR_SIZE: u64 = 2048;
pub const ISO_DESC_AREA_SECTOR: u64 = 16;
pub const ISO_STD_ID: &[u8; 5] = b"CD001";

pub const ISO_DESC_TYPE_BOOT: u8 = 0;
pub const ISO_DESC_TYPE_PRIMARY: u8 = 1;
pub const ISO_DESC_TYPE_SUPPLEMENTARY: u8 = 2;
pub const ISO_DESC_TYPE_PARTITION: u8 = 3;
pub const ISO_DESC_TYPE_TERMINATOR: u8 = 255;

// UDF volume recognition sequence identifiers.
pub const UDF_BEA_ID: &[u8; 5] = b"BEA01";
pub const UDF_NSR2_ID: &[u8; 5] = b"NSR02";
pub const UDF_NSR3_ID: &[u8; 5] = b"NSR03";
pub const UDF_TEA_ID: &[u8; 5] = b"TEA01";

pub const ISO_DIRREC_FLAG_HIDDEN: u8 = 1 << 0;
pub const ISO_DIRREC_FLAG_DIRECTORY: u8 = 1 << 1;
pub const ISO_DIRREC_FLAG_MULTI_EXTENT: u8 = 1 << 7;

/// Shared prefix of primary and supplementary volume descriptors,
/// through the root directory record. Both-endian fields carry the
/// value twice; the little-endian half is authoritative here and the
/// big-endian half is cross-checked during validation.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct IsoVolDesc {
    pub desc_type: u8,
    pub std_id: [u8; 5],
    pub version: u8,
    pub flags: u8,
    pub system_id: [u8; 32],
    pub volume_id: [u8; 32],
    pub unused1: [u8; 8],
    pub space_size_le: u32,
    pub space_size_be: u32,
    /// SVD escape sequences; selects the Joliet UCS-2 level.
    pub escape_sequences: [u8; 32],
    pub set_size_le: u16,
    pub set_size_be: u16,
    pub seq_number_le: u16,
    pub seq_number_be: u16,
    pub block_size_le: u16,
    pub block_size_be: u16,
    pub path_table_size_le: u32,
    pub path_table_size_be: u32,
    pub lpath_table_lba: u32,
    pub opt_lpath_table_lba: u32,
    pub mpath_table_lba: u32,
    pub opt_mpath_table_lba: u32,
    pub root_dir_record: [u8; 34],
}

/// Fixed header of a directory record; the name (and any system-use
/// area) trails it.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct IsoDirRecord {
    pub record_len: u8,
    pub ext_attr_len: u8,
    pub extent_lba_le: u32,
    pub extent_lba_be: u32,
    pub data_len_le: u32,
    pub data_len_be: u32,
    pub recording_time: [u8; 7],
    pub flags: u8,
    pub file_unit_size: u8,
    pub interleave_gap: u8,
    pub seq_number_le: u16,
    pub seq_number_be: u16,
    pub name_len: u8,
}

impl IsoDirRecord {
    #[inline]
    pub fn is_directory(&self) -> bool {
        self.flags & ISO_DIRREC_FLAG_DIRECTORY != 0
    }
}

const _: () = assert!(core::mem::size_of::<IsoVolDesc>() == 190);
const _: () = assert!(core::mem::size_of::<IsoDirRecord>() == 33);

/// Decodes the 7-byte directory recording date. Zeroed fields mean
/// "not recorded".
pub fn decode_recording_time(raw: &[u8; 7]) -> Option<OffsetDateTime> {
    let year = 1900 + raw[0] as i32;
    let month = Month::try_from(raw[1]).ok()?;
    let date = Date::from_calendar_date(year, month, raw[2]).ok()?;
    let time = Time::from_hms(raw[3], raw[4], raw[5]).ok()?;
    // Offset in 15-minute units from -48 to +52.
    let offset_minutes = (raw[6] as i8) as i32 * 15;
    let dt = PrimitiveDateTime::new(date, time).assume_utc();
    Some(dt - time::Duration::minutes(offset_minutes as i64))
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn test_wire_sizes() {
        assert_eq!(core::mem::size_of::<IsoVolDesc>(), 190);
        assert_eq!(core::mem::size_of::<IsoDirRecord>(), 33);
    }

    #[test]
    fn test_recording_time() {
        let raw = [120, 6, 15, 12, 30, 45, 0];
        let ts = decode_recording_time(&raw).unwrap();
        assert_eq!(ts.year(), 2020);
        assert_eq!(ts.minute(), 30);
        assert!(decode_recording_time(&[0u8; 7]).is_none());
    }
}
