// SPDX-License-Identifier: MIT

//! # opalwire
//!
//! Packed on-disk structure descriptors and decoding helpers shared by
//! the opal VFS crates: RIFF/WAVE records and the dictionary-compressed
//! string table format. `no_std` by default; nothing here allocates.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod errors;
pub mod riff;
pub mod strtab;

pub use errors::*;
pub use riff::*;
pub use strtab::*;

pub mod prelude {
    pub use crate::errors::*;
    pub use crate::riff::*;
    pub use crate::strtab::*;
}
