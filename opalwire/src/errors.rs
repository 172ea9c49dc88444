// SPDX-License-Identifier: MIT

use core::fmt;

pub type RiffResult<T = ()> = core::result::Result<T, RiffError>;

/// Error type for RIFF/WAVE parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiffError {
    /// Leading magic is not "RIFF"; this is not a RIFF container at all.
    NotRiff,
    /// Magic matched but a chunk header or size field is inconsistent.
    Corrupt(&'static str),
    /// Recognized container with a format tag we do not implement.
    Unsupported(&'static str),
    /// Buffer ends inside a declared structure.
    Truncated,
}

impl RiffError {
    pub fn msg(&self) -> &'static str {
        match self {
            RiffError::NotRiff => "Not a RIFF container",
            RiffError::Corrupt(msg) => msg,
            RiffError::Unsupported(msg) => msg,
            RiffError::Truncated => "Truncated structure",
        }
    }
}

impl fmt::Display for RiffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())
    }
}

pub type StrTabResult<T = ()> = core::result::Result<T, StrTabError>;

/// Error type for compressed string table decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrTabError {
    /// `offset + length` exceeds the raw table extent, either for the
    /// requested string or for a dictionary word reference.
    OutOfRange,
    /// Destination buffer too small; output is NUL-terminated at the
    /// truncation point (nothing is written to an empty buffer).
    BufferOverflow,
    /// Declared dictionary size outside {255, 256}. Build
    /// misconfiguration, not bad input data.
    BadDictSize,
    /// Escape sequence does not decode as UTF-8, or a dictionary entry
    /// is not a 7-bit character where one is required.
    BadEncoding,
}

impl StrTabError {
    pub fn msg(&self) -> &'static str {
        match self {
            StrTabError::OutOfRange => "Reference outside table bounds",
            StrTabError::BufferOverflow => "Destination buffer too small",
            StrTabError::BadDictSize => "Dictionary size must be 255 or 256",
            StrTabError::BadEncoding => "Invalid escape or dictionary encoding",
        }
    }
}

impl fmt::Display for StrTabError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())
    }
}
