// SPDX-License-Identifier: MIT

//! System Use Sharing Protocol entries (Rock Ridge lives on top).

#[cfg(all(not(feature = "std"), feature = "alloc"))]
use alloc::{string::String, vec::Vec};

/// SP entry check bytes.
pub const SUSP_SP_CHECK: [u8; 2] = [0xBE, 0xEF];

/// NM flag: the name continues in the next NM entry.
pub const RRIP_NM_CONTINUE: u8 = 0x01;
/// NM flags mapping the name to '.' / '..'; such names never override.
pub const RRIP_NM_CURRENT: u8 = 0x02;
pub const RRIP_NM_PARENT: u8 = 0x04;

/// Iterator over `(signature, payload)` pairs of a system-use area.
///
/// Stops at the first malformed length instead of erroring; a broken
/// trailing pad byte is common in real images.
pub struct SuspIter<'a> {
    data: &'a [u8],
}

impl<'a> SuspIter<'a> {
    pub fn new(system_use: &'a [u8]) -> Self {
        Self { data: system_use }
    }
}

impl<'a> Iterator for SuspIter<'a> {
    type Item = ([u8; 2], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < 4 {
            return None;
        }
        let sig = [self.data[0], self.data[1]];
        let len = self.data[2] as usize;
        if len < 4 || len > self.data.len() {
            return None;
        }
        let payload = &self.data[4..len];
        self.data = &self.data[len..];
        Some((sig, payload))
    }
}

/// Checks the root '.' record's system-use area for a valid SP entry.
/// Returns the skip length to apply to every system-use area when
/// Rock Ridge is in effect.
pub fn detect_rock_ridge(system_use: &[u8]) -> Option<usize> {
    for (sig, payload) in SuspIter::new(system_use) {
        if sig == *b"SP" && payload.len() >= 3 && payload[..2] == SUSP_SP_CHECK {
            return Some(payload[2] as usize);
        }
    }
    None
}

/// Extracts the Rock Ridge alternate name, concatenating continued NM
/// entries. `None` when no NM entry overrides the ISO name.
pub fn alternate_name(system_use: &[u8]) -> Option<String> {
    let mut name: Vec<u8> = Vec::new();
    let mut seen = false;
    for (sig, payload) in SuspIter::new(system_use) {
        if sig != *b"NM" || payload.is_empty() {
            continue;
        }
        let flags = payload[0];
        if flags & (RRIP_NM_CURRENT | RRIP_NM_PARENT) != 0 {
            return None;
        }
        name.extend_from_slice(&payload[1..]);
        seen = true;
        if flags & RRIP_NM_CONTINUE == 0 {
            break;
        }
    }
    if !seen {
        return None;
    }
    String::from_utf8(name).ok()
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn test_detect_sp() {
        let area = [b'S', b'P', 7, 1, 0xBE, 0xEF, 0];
        assert_eq!(detect_rock_ridge(&area), Some(0));
        assert_eq!(detect_rock_ridge(&[0u8; 8]), None);
    }

    #[test]
    fn test_alternate_name() {
        // Entry length covers header (4) + flags (1) + name.
        let mut area = vec![b'N', b'M', 10, 1, 0];
        area.extend_from_slice(b"hello");
        assert_eq!(alternate_name(&area).as_deref(), Some("hello"));
    }

    #[test]
    fn test_continued_name() {
        let mut area = vec![b'N', b'M', 9, 1, RRIP_NM_CONTINUE];
        area.extend_from_slice(b"long");
        area.extend_from_slice(&[b'N', b'M', 9, 1, 0]);
        area.extend_from_slice(b"name");
        assert_eq!(alternate_name(&area).as_deref(), Some("longname"));
    }
}
