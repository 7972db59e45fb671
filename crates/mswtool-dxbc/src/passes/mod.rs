//! The patch passes.
//!
//! Every pass has the same shape: re-walk the (already validated) container,
//! collect the edits it wants to make, apply them in place and report counts.
//! Chunk payloads are never resized, so chunk offsets stay valid across
//! passes and each pass re-parses rather than trusting cached offsets.

pub mod cb_swap;
pub mod clustered_lighting;
pub mod shadow_blend;
pub mod srv_remap;
pub mod sun_data;
pub mod uber_flags;

use crate::container::Chunk;

/// What a single pass did to the blob.
#[derive(Clone, Debug, Default)]
pub struct PassReport {
    /// Bytecode DWORDs rewritten in SHEX/SHDR chunks.
    pub shex_tokens: u32,
    /// Fields rewritten in the RDEF chunk.
    pub rdef_fields: u32,
    /// Resource slots moved (RDEF bind points and bytecode register indices).
    pub srv_slots: u32,
    pub note: Option<String>,
}

/// Copies a shader chunk's payload out as a DWORD vector. Trailing bytes of
/// a misaligned payload are left untouched by `write_tokens`.
pub(crate) fn chunk_tokens(blob: &[u8], chunk: Chunk) -> Vec<u32> {
    blob[chunk.offset..chunk.offset + chunk.len]
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
        .collect()
}

pub(crate) fn write_tokens(blob: &mut [u8], chunk: Chunk, tokens: &[u32]) {
    for (i, token) in tokens.iter().enumerate() {
        let at = chunk.offset + i * 4;
        blob[at..at + 4].copy_from_slice(&token.to_le_bytes());
    }
}
