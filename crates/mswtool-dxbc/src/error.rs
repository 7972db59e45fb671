use thiserror::Error;

use crate::container::FourCC;

/// Structural rejects. Any of these abort patching before the blob is touched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DxbcError {
    #[error("not a DXBC container (bad magic)")]
    BadMagic,

    #[error("container truncated at offset {offset}: {context}")]
    Truncated { offset: usize, context: &'static str },

    #[error("declared total size {declared} does not match buffer length {actual}")]
    SizeMismatch { declared: usize, actual: usize },

    #[error("chunk {index} ({fourcc}) at offset {offset} overruns the container")]
    ChunkOutOfBounds {
        index: usize,
        fourcc: FourCC,
        offset: usize,
    },

    #[error("chunk {index} offset {offset} points inside the header")]
    ChunkOffsetInHeader { index: usize, offset: usize },

    #[error("RDEF payload too small for its fixed header ({size} bytes)")]
    RdefTooSmall { size: usize },

    #[error("RDEF table at offset {offset} overruns the chunk payload")]
    RdefTableOutOfBounds { offset: usize },
}
