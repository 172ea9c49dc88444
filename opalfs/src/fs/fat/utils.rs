// SPDX-License-Identifier: MIT

#[cfg(all(not(feature = "std"), feature = "alloc"))]
use alloc::{format, string::String, vec::Vec};

use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

use crate::core::errors::*;
use crate::fs::fat::types::FatLfnEntry;

pub const MAX_LFN_CHARS: usize = 255;

/// 8.3 short-name checksum carried by each LFN entry.
#[inline]
pub fn sfn_checksum(sfn: &[u8; 11]) -> u8 {
    sfn.iter()
        .fold(0u8, |sum, &b| (sum >> 1).wrapping_add(sum << 7).wrapping_add(b))
}

/// Decode SFN (8.3) entry to a filename.
pub fn decode_sfn(sfn: &[u8; 11]) -> FsResult<String> {
    let (name_raw, ext_raw) = sfn.split_at(8);

    let name = String::from_utf8(
        name_raw
            .iter()
            .take_while(|&&c| c != b' ')
            .map(|&c| c.to_ascii_lowercase())
            .collect(),
    )
    .map_err(|_| FsError::Corrupt("Invalid SFN"))?;

    let ext = String::from_utf8(
        ext_raw
            .iter()
            .take_while(|&&c| c != b' ')
            .map(|&c| c.to_ascii_lowercase())
            .collect(),
    )
    .map_err(|_| FsError::Corrupt("Invalid SFN"))?;

    if ext.is_empty() {
        Ok(name)
    } else {
        Ok(format!("{name}.{ext}"))
    }
}

/// Decode LFN entries (in on-disk order, last-logical first) into a
/// UTF-8 filename.
pub fn decode_lfn(lfns: &[FatLfnEntry]) -> FsResult<String> {
    if lfns.len() * 13 >= MAX_LFN_CHARS + 13 {
        return Err(FsError::Corrupt("LFN too long"));
    }

    let mut name_utf16 = Vec::with_capacity(MAX_LFN_CHARS);
    for entry in lfns.iter().rev() {
        for &c in &entry.extract_utf16() {
            if c == 0x0000 || c == 0xFFFF {
                break;
            }
            name_utf16.push(c);
        }
    }

    String::from_utf16(&name_utf16).map_err(|_| FsError::Corrupt("Invalid LFN"))
}

/// Decode a FAT date/time pair. Impossible dates (month 0, day 0)
/// yield `None`.
pub fn decode_datetime(date: u16, time: u16) -> Option<OffsetDateTime> {
    let year = 1980 + (date >> 9) as i32;
    let month = Month::try_from(((date >> 5) & 0xF) as u8).ok()?;
    let day = (date & 0x1F) as u8;

    let hour = (time >> 11) as u8;
    let minute = ((time >> 5) & 0x3F) as u8;
    let second = ((time & 0x1F) * 2) as u8;

    let date = Date::from_calendar_date(year, month, day).ok()?;
    let time = Time::from_hms(hour, minute, second).ok()?;
    Some(PrimitiveDateTime::new(date, time).assume_utc())
}

/// Encode a timestamp into FAT (date, time) fields.
pub fn encode_datetime(ts: OffsetDateTime) -> (u16, u16) {
    let year = ts.year().clamp(1980, 2107);
    let month = ts.month() as u16;
    let day = ts.day() as u16;

    let hour = ts.hour() as u16;
    let minute = ts.minute() as u16;
    let second = ts.second() as u16;

    let date = ((year - 1980) as u16) << 9 | (month << 5) | day;
    let time = (hour << 11) | (minute << 5) | (second / 2);

    (date, time)
}

/// Uppercased 11-byte label/name padded with spaces.
pub fn encode_label(label: &str) -> [u8; 11] {
    let mut out = [b' '; 11];
    for (i, b) in label.bytes().take(11).enumerate() {
        out[i] = b.to_ascii_uppercase();
    }
    out
}
