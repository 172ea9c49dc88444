pub mod types;
pub mod volume;

// === Public Interface ===
pub mod traits {
    pub use super::volume::NtfsVolume;
}

pub mod prelude {
    pub use super::traits::*;
    pub use crate::core::errors::*;
    pub use crate::core::traits::*;
    pub use opalio::prelude::*;
}
