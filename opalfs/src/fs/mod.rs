#[cfg(feature = "ext")]
pub mod ext;
#[cfg(feature = "fat")]
pub mod fat;
#[cfg(feature = "iso9660")]
pub mod iso9660;
#[cfg(feature = "ntfs")]
pub mod ntfs;
