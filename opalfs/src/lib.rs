#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
#[macro_use]
extern crate alloc;

// Core Modules
#[cfg(feature = "alloc")]
pub mod core;
#[cfg(feature = "alloc")]
pub mod fs;

// Reusable types and traits
#[cfg(feature = "alloc")]
pub use core::traits::*;

// Utilities
#[cfg(feature = "alloc")]
pub use core::utils::path_utils::*;

// Filesystem APIs
#[cfg(feature = "fat")]
/// FAT12/16/32 volume implementation.
///
/// See [`fat::FatVolume`] and [`fat::FatFormatter`].
pub mod fat {
    pub use super::fs::fat::prelude::*;
}

#[cfg(feature = "iso9660")]
/// ISO9660 volume implementation (Joliet / Rock Ridge aware).
///
/// See [`iso9660::IsoVolume`] and [`iso9660::IsoFlags`].
pub mod iso9660 {
    pub use super::fs::iso9660::prelude::*;
}

#[cfg(feature = "ntfs")]
/// NTFS volume implementation.
///
/// See [`ntfs::NtfsVolume`].
pub mod ntfs {
    pub use super::fs::ntfs::prelude::*;
}

#[cfg(feature = "ext")]
/// EXT2/3/4 volume implementation.
///
/// See [`ext::ExtVolume`].
pub mod ext {
    pub use super::fs::ext::prelude::*;
}
