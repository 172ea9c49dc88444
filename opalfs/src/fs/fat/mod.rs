pub mod constant;
pub mod formatter;
pub mod meta;
pub mod types;
pub mod utils;
pub mod volume;

// === Public Interface ===
pub mod traits {
    pub use super::formatter::{
        FatFormatOptions, FatFormatter, format_floppy_144, format_floppy_288,
    };
    pub use super::meta::{FatMeta, FatType};
    pub use super::volume::{FatOpenOptions, FatVolume};
}

pub mod prelude {
    pub use super::traits::*;
    pub use crate::core::errors::*;
    pub use crate::core::traits::*;
    pub use opalio::prelude::*;
}
