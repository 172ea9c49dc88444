// SPDX-License-Identifier: MIT

#[cfg(all(not(feature = "std"), feature = "alloc"))]
use alloc::string::String;

use core::fmt;

pub use opalio::errors::*;

/// Rich diagnostic attached to `Corrupt` and `Unsupported` open failures.
///
/// Identifies the format, the offending field and an expected-vs-actual
/// detail string. `NotThisFormat` never carries one; it is the expected
/// negative result of a format-sniffing loop, not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diag {
    pub format: &'static str,
    pub field: &'static str,
    pub detail: String,
}

impl Diag {
    pub fn new(format: &'static str, field: &'static str, detail: String) -> Self {
        Self {
            format,
            field,
            detail,
        }
    }
}

impl fmt::Display for Diag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.format, self.field, self.detail)
    }
}

/// Volume-open error taxonomy, shared by every format plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenError {
    /// Caller argument violates a documented precondition. Checked
    /// before any I/O.
    InvalidParameter(&'static str),
    /// Magic/signature mismatch; try the next candidate plugin.
    NotThisFormat,
    /// Magic matched but structural validation failed.
    Corrupt(Diag),
    /// Recognized but unimplemented variant or feature.
    Unsupported(Diag),
    /// Underlying medium error, passed through unchanged.
    IO(BlockIOError),
}

impl OpenError {
    pub fn corrupt(format: &'static str, field: &'static str, detail: String) -> Self {
        OpenError::Corrupt(Diag::new(format, field, detail))
    }

    pub fn unsupported(format: &'static str, field: &'static str, detail: String) -> Self {
        OpenError::Unsupported(Diag::new(format, field, detail))
    }

    pub fn msg(&self) -> &'static str {
        match self {
            OpenError::InvalidParameter(msg) => msg,
            OpenError::NotThisFormat => "Not this format",
            OpenError::Corrupt(_) => "Corrupt filesystem structure",
            OpenError::Unsupported(_) => "Unsupported filesystem feature",
            OpenError::IO(_) => "IO error",
        }
    }

    pub fn diag(&self) -> Option<&Diag> {
        match self {
            OpenError::Corrupt(d) | OpenError::Unsupported(d) => Some(d),
            _ => None,
        }
    }
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        if let Some(diag) = self.diag() {
            write!(f, " ({diag})")?;
        }
        if let OpenError::IO(e) = self {
            write!(f, "\n  caused by: {}", e.msg())?;
        }
        Ok(())
    }
}

/// Post-open operation errors (lookup, directory listing, file reads).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    IO(BlockIOError),
    NotFound,
    NotADirectory,
    NotAFile,
    Corrupt(&'static str),
    Unsupported(&'static str),
    /// Cycle detected in an allocation chain or directory walk.
    Loop,
    Other(&'static str),
}

impl FsError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsError::IO(_) => "IO error",
            FsError::NotFound => "Path not found",
            FsError::NotADirectory => "Not a directory",
            FsError::NotAFile => "Not a file",
            FsError::Corrupt(msg) => msg,
            FsError::Unsupported(msg) => msg,
            FsError::Loop => "Loop detected in allocation chain",
            FsError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsError::IO(e) => Some(FsError::IO(*e)),
            _ => None,
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        if let FsError::IO(e) = self {
            write!(f, "\n  caused by: {}", e.msg())?;
        }
        Ok(())
    }
}

// === type *Result ===

pub type OpenResult<T> = Result<T, OpenError>;
pub type FsResult<T = ()> = Result<T, FsError>;

crate::vol_error_wiring! {
    BlockIOError => OpenError::IO,
    BlockIOError => FsError::IO,
}

impl From<&'static str> for FsError {
    #[inline]
    fn from(msg: &'static str) -> Self {
        FsError::Other(msg)
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn test_open_error_display() {
        let err = OpenError::corrupt("fat", "bytes_per_sector", format!("expected power of two, got {}", 513));
        let text = format!("{err}");
        assert!(text.contains("bytes_per_sector"));
        assert!(text.contains("513"));
    }

    #[test]
    fn test_io_passthrough_chain() {
        let err = FsError::from(BlockIOError::OutOfBounds);
        assert_eq!(err, FsError::IO(BlockIOError::OutOfBounds));
        println!("{err}");
    }
}
