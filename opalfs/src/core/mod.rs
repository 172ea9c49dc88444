// === Sub-modules ===
pub mod errors;
pub mod macros;
pub mod probe;
pub mod utils;
pub mod volume;

// === Core Traits ===
pub mod traits {
    pub use super::probe::{AnyVolume, ProbeOptions, detect, open_auto};
    pub use super::volume::{DirEntry, FormatTag, FsVolume, NodeInfo, NodeKind};
}

// === Error types ===
pub use errors::*;

// === Utilities ===
pub use utils::path_utils::*;
