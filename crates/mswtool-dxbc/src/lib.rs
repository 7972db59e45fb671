//! DXBC patching engine: converts shaders compiled for the newer engine
//! revision to the layout the legacy engine expects, in place, and repairs
//! the container's integrity hash afterwards.

pub mod checksum;
pub mod container;
pub mod error;
pub mod layout;
pub mod passes;
pub mod patcher;
pub mod rdef;
pub mod sm5;

pub use checksum::{update_checksum, verify_checksum};
pub use container::{Chunk, Container, FourCC};
pub use error::DxbcError;
pub use layout::{detect_layout, CbLayout};
pub use patcher::{patch, PatchOptions, PatchReport};
