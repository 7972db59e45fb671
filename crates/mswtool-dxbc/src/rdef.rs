//! RDEF reflection chunk parsing.
//!
//! Everything operates on absolute blob offsets so passes can write patched
//! fields straight back into the container. Strings are NUL-terminated ASCII
//! at chunk-relative offsets, bounded by the chunk payload; a string that
//! runs off the payload is treated as absent.

use crate::container::{read_u32, Chunk};
use crate::error::DxbcError;

pub const RDEF_HEADER_LEN: usize = 28;
pub const BINDING_LEN: usize = 32;
pub const CBUFFER_DESC_LEN: usize = 24;

/// `D3D_SHADER_INPUT_TYPE` discriminants.
pub mod input_type {
    pub const CBUFFER: u32 = 0;
    pub const TBUFFER: u32 = 1;
    pub const TEXTURE: u32 = 2;
    pub const SAMPLER: u32 = 3;
    pub const STRUCTURED: u32 = 5;
    pub const BYTEADDRESS: u32 = 7;
}

/// True for the binding classes the SRV remap pass may move.
pub fn is_srv_class(ty: u32) -> bool {
    matches!(
        ty,
        input_type::TBUFFER | input_type::TEXTURE | input_type::STRUCTURED | input_type::BYTEADDRESS
    )
}

/// Field offsets inside a 32-byte resource-binding record.
mod binding_field {
    pub const NAME_OFFSET: usize = 0;
    pub const INPUT_TYPE: usize = 4;
    pub const BIND_POINT: usize = 20;
    pub const BIND_COUNT: usize = 24;
}

/// Field offsets inside a 24-byte cbuffer descriptor.
mod cbuffer_field {
    pub const NAME_OFFSET: usize = 0;
    pub const VARIABLE_COUNT: usize = 4;
    pub const SIZE: usize = 12;
}

#[derive(Clone, Copy, Debug)]
pub struct ResourceBinding {
    /// Absolute offset of this record in the blob.
    pub offset: usize,
    pub name_offset: u32,
    pub input_type: u32,
    pub bind_point: u32,
    pub bind_count: u32,
}

impl ResourceBinding {
    /// Absolute offset of the bind-point field, the one field passes rewrite.
    pub fn bind_point_offset(&self) -> usize {
        self.offset + binding_field::BIND_POINT
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CbufferDesc {
    pub offset: usize,
    pub name_offset: u32,
    pub variable_count: u32,
    pub size: u32,
}

impl CbufferDesc {
    pub fn size_offset(&self) -> usize {
        self.offset + cbuffer_field::SIZE
    }

    pub fn variable_count_offset(&self) -> usize {
        self.offset + cbuffer_field::VARIABLE_COUNT
    }
}

/// Parsed view of one RDEF chunk: table counts plus absolute offsets.
#[derive(Debug)]
pub struct Rdef {
    pub chunk_offset: usize,
    pub chunk_len: usize,
    cbuffer_count: usize,
    cbuffers_offset: usize,
    binding_count: usize,
    bindings_offset: usize,
}

impl Rdef {
    pub fn parse(blob: &[u8], chunk: Chunk) -> Result<Rdef, DxbcError> {
        if chunk.len < RDEF_HEADER_LEN {
            return Err(DxbcError::RdefTooSmall { size: chunk.len });
        }

        let cbuffer_count = read_u32(blob, chunk.offset) as usize;
        let cbuffers_offset = read_u32(blob, chunk.offset + 4) as usize;
        let binding_count = read_u32(blob, chunk.offset + 8) as usize;
        let bindings_offset = read_u32(blob, chunk.offset + 12) as usize;

        let cb_end = cbuffers_offset.saturating_add(cbuffer_count * CBUFFER_DESC_LEN);
        if cbuffer_count > 0 && cb_end > chunk.len {
            return Err(DxbcError::RdefTableOutOfBounds {
                offset: cbuffers_offset,
            });
        }
        let bind_end = bindings_offset.saturating_add(binding_count * BINDING_LEN);
        if binding_count > 0 && bind_end > chunk.len {
            return Err(DxbcError::RdefTableOutOfBounds {
                offset: bindings_offset,
            });
        }

        Ok(Rdef {
            chunk_offset: chunk.offset,
            chunk_len: chunk.len,
            cbuffer_count,
            cbuffers_offset,
            binding_count,
            bindings_offset,
        })
    }

    pub fn bindings<'a>(&'a self, blob: &'a [u8]) -> impl Iterator<Item = ResourceBinding> + 'a {
        (0..self.binding_count).map(move |i| {
            let at = self.chunk_offset + self.bindings_offset + i * BINDING_LEN;
            ResourceBinding {
                offset: at,
                name_offset: read_u32(blob, at + binding_field::NAME_OFFSET),
                input_type: read_u32(blob, at + binding_field::INPUT_TYPE),
                bind_point: read_u32(blob, at + binding_field::BIND_POINT),
                bind_count: read_u32(blob, at + binding_field::BIND_COUNT),
            }
        })
    }

    pub fn cbuffers<'a>(&'a self, blob: &'a [u8]) -> impl Iterator<Item = CbufferDesc> + 'a {
        (0..self.cbuffer_count).map(move |i| {
            let at = self.chunk_offset + self.cbuffers_offset + i * CBUFFER_DESC_LEN;
            CbufferDesc {
                offset: at,
                name_offset: read_u32(blob, at + cbuffer_field::NAME_OFFSET),
                variable_count: read_u32(blob, at + cbuffer_field::VARIABLE_COUNT),
                size: read_u32(blob, at + cbuffer_field::SIZE),
            }
        })
    }

    /// NUL-terminated name at a chunk-relative offset, or `None` when the
    /// offset is outside the payload or the terminator is missing.
    pub fn name_at<'a>(&self, blob: &'a [u8], name_offset: u32) -> Option<&'a str> {
        let start = self.chunk_offset.checked_add(name_offset as usize)?;
        let end = self.chunk_offset + self.chunk_len;
        if start >= end {
            return None;
        }
        let bytes = &blob[start..end];
        let nul = bytes.iter().position(|&b| b == 0)?;
        std::str::from_utf8(&bytes[..nul]).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::FourCC;

    fn push_u32(out: &mut Vec<u8>, v: u32) {
        out.extend_from_slice(&v.to_le_bytes());
    }

    /// RDEF payload with one cbuffer descriptor and one binding, names at
    /// the tail of the payload.
    fn sample_rdef() -> Vec<u8> {
        let mut p = Vec::new();
        push_u32(&mut p, 1); // cbuffer count
        push_u32(&mut p, 28); // cbuffer table offset
        push_u32(&mut p, 1); // binding count
        push_u32(&mut p, 52); // binding table offset
        push_u32(&mut p, 0xFFFE_0500); // shader model
        push_u32(&mut p, 0); // flags
        push_u32(&mut p, 0); // creator

        // cbuffer descriptor @28
        push_u32(&mut p, 84); // name offset
        push_u32(&mut p, 42); // variable count
        push_u32(&mut p, 0); // variable table
        push_u32(&mut p, 784); // size
        push_u32(&mut p, 0); // flags
        push_u32(&mut p, 0); // type

        // binding @52
        push_u32(&mut p, 84); // name offset
        push_u32(&mut p, input_type::CBUFFER);
        push_u32(&mut p, 0); // return type
        push_u32(&mut p, 0); // dimension
        push_u32(&mut p, 0); // samples
        push_u32(&mut p, 3); // bind point
        push_u32(&mut p, 1); // bind count
        push_u32(&mut p, 0); // flags

        p.extend_from_slice(b"CBufCommonPerCamera\0");
        p
    }

    fn chunk_for(payload: &[u8]) -> (Vec<u8>, Chunk) {
        // Fake absolute placement: payload copied at some offset in a blob.
        let mut blob = vec![0u8; 100];
        blob.extend_from_slice(payload);
        (
            blob,
            Chunk {
                fourcc: FourCC(*b"RDEF"),
                offset: 100,
                len: payload.len(),
            },
        )
    }

    #[test]
    fn parses_tables_and_names() {
        let payload = sample_rdef();
        let (blob, chunk) = chunk_for(&payload);
        let rdef = Rdef::parse(&blob, chunk).unwrap();

        let bindings: Vec<_> = rdef.bindings(&blob).collect();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].input_type, input_type::CBUFFER);
        assert_eq!(bindings[0].bind_point, 3);
        assert_eq!(
            rdef.name_at(&blob, bindings[0].name_offset),
            Some("CBufCommonPerCamera")
        );

        let cbs: Vec<_> = rdef.cbuffers(&blob).collect();
        assert_eq!(cbs.len(), 1);
        assert_eq!(cbs[0].size, 784);
        assert_eq!(cbs[0].variable_count, 42);
    }

    #[test]
    fn truncated_name_is_absent() {
        let mut payload = sample_rdef();
        // Drop the NUL terminator.
        payload.pop();
        let (blob, chunk) = chunk_for(&payload);
        let rdef = Rdef::parse(&blob, chunk).unwrap();
        let binding = rdef.bindings(&blob).next().unwrap();
        assert_eq!(rdef.name_at(&blob, binding.name_offset), None);
    }

    #[test]
    fn name_offset_past_payload_is_absent() {
        let payload = sample_rdef();
        let (blob, chunk) = chunk_for(&payload);
        let rdef = Rdef::parse(&blob, chunk).unwrap();
        assert_eq!(rdef.name_at(&blob, payload.len() as u32), None);
        assert_eq!(rdef.name_at(&blob, u32::MAX), None);
    }

    #[test]
    fn rejects_undersized_header() {
        let (blob, chunk) = chunk_for(&[0u8; 16]);
        assert!(matches!(
            Rdef::parse(&blob, chunk).unwrap_err(),
            DxbcError::RdefTooSmall { size: 16 }
        ));
    }

    #[test]
    fn rejects_binding_table_overrun() {
        let mut payload = sample_rdef();
        payload[8..12].copy_from_slice(&100u32.to_le_bytes()); // binding count
        let (blob, chunk) = chunk_for(&payload);
        assert!(matches!(
            Rdef::parse(&blob, chunk).unwrap_err(),
            DxbcError::RdefTableOutOfBounds { .. }
        ));
    }
}
