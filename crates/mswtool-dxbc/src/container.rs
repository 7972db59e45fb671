use std::fmt::{Debug, Display, Formatter};

use crate::error::DxbcError;

pub const DXBC_MAGIC: [u8; 4] = *b"DXBC";

/// Fixed header: magic + 16-byte checksum + version + total size + chunk count.
pub const HEADER_LEN: usize = 32;

/// Byte range of the checksum field inside the header.
pub const CHECKSUM_RANGE: std::ops::Range<usize> = 4..20;

pub const FOURCC_RDEF: FourCC = FourCC(*b"RDEF");
pub const FOURCC_SHEX: FourCC = FourCC(*b"SHEX");
pub const FOURCC_SHDR: FourCC = FourCC(*b"SHDR");

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub fn is_shader_code(&self) -> bool {
        *self == FOURCC_SHEX || *self == FOURCC_SHDR
    }
}

impl Display for FourCC {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for b in self.0 {
            if b.is_ascii_graphic() {
                f.write_str(std::str::from_utf8(&[b]).unwrap_or("?"))?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl Debug for FourCC {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "FourCC({self})")
    }
}

/// One chunk of a parsed container. `offset`/`len` describe the payload,
/// which starts right after the 8-byte chunk sub-header.
#[derive(Clone, Copy, Debug)]
pub struct Chunk {
    pub fourcc: FourCC,
    pub offset: usize,
    pub len: usize,
}

/// Read-only walker over a DXBC container. Parsing validates every chunk
/// bound up front; iteration afterwards cannot fail and does not allocate.
#[derive(Debug)]
pub struct Container<'a> {
    data: &'a [u8],
    chunk_count: usize,
}

impl<'a> Container<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Container<'a>, DxbcError> {
        if data.len() < HEADER_LEN {
            return Err(DxbcError::Truncated {
                offset: data.len(),
                context: "fixed header",
            });
        }
        if data[0..4] != DXBC_MAGIC {
            return Err(DxbcError::BadMagic);
        }

        let total_size = read_u32(data, 24) as usize;
        if total_size != data.len() {
            return Err(DxbcError::SizeMismatch {
                declared: total_size,
                actual: data.len(),
            });
        }

        let chunk_count = read_u32(data, 28) as usize;
        let table_end = HEADER_LEN + chunk_count.saturating_mul(4);
        if table_end > data.len() {
            return Err(DxbcError::Truncated {
                offset: HEADER_LEN,
                context: "chunk offset table",
            });
        }

        let container = Container { data, chunk_count };
        for (index, chunk) in container.chunk_offsets().enumerate() {
            if chunk < table_end {
                return Err(DxbcError::ChunkOffsetInHeader {
                    index,
                    offset: chunk,
                });
            }
            if chunk.saturating_add(8) > data.len() {
                return Err(DxbcError::ChunkOutOfBounds {
                    index,
                    fourcc: FourCC(*b"????"),
                    offset: chunk,
                });
            }
            let fourcc = FourCC(data[chunk..chunk + 4].try_into().unwrap());
            let payload_len = read_u32(data, chunk + 4) as usize;
            if (chunk + 8).saturating_add(payload_len) > data.len() {
                return Err(DxbcError::ChunkOutOfBounds {
                    index,
                    fourcc,
                    offset: chunk,
                });
            }
        }

        Ok(container)
    }

    fn chunk_offsets(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.chunk_count).map(|i| read_u32(self.data, HEADER_LEN + i * 4) as usize)
    }

    pub fn chunks(&self) -> impl Iterator<Item = Chunk> + '_ {
        self.chunk_offsets().map(|off| Chunk {
            fourcc: FourCC(self.data[off..off + 4].try_into().unwrap()),
            offset: off + 8,
            len: read_u32(self.data, off + 4) as usize,
        })
    }

    pub fn find_chunk(&self, fourcc: FourCC) -> Option<Chunk> {
        self.chunks().find(|c| c.fourcc == fourcc)
    }

    /// SHEX and SHDR chunks, in container order. A container normally holds
    /// one or the other but both are walked if present.
    pub fn shader_chunks(&self) -> impl Iterator<Item = Chunk> + '_ {
        self.chunks().filter(|c| c.fourcc.is_shader_code())
    }
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

pub(crate) fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(chunks: &[(&[u8; 4], &[u8])]) -> Vec<u8> {
        let header_len = HEADER_LEN + chunks.len() * 4;
        let total: usize = header_len + chunks.iter().map(|(_, d)| 8 + d.len()).sum::<usize>();

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(b"DXBC");
        out.extend_from_slice(&[0u8; 16]);
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(chunks.len() as u32).to_le_bytes());

        let mut cursor = header_len;
        for (_, data) in chunks {
            out.extend_from_slice(&(cursor as u32).to_le_bytes());
            cursor += 8 + data.len();
        }
        for (fourcc, data) in chunks {
            out.extend_from_slice(*fourcc);
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(data);
        }
        assert_eq!(out.len(), total);
        out
    }

    #[test]
    fn parses_and_iterates() {
        let blob = build(&[(b"RDEF", &[1, 2, 3, 4]), (b"SHEX", &[5, 6])]);
        let container = Container::parse(&blob).unwrap();

        let chunks: Vec<_> = container.chunks().collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].fourcc, FOURCC_RDEF);
        assert_eq!(chunks[0].len, 4);
        assert_eq!(chunks[1].fourcc, FOURCC_SHEX);

        let shex = container.find_chunk(FOURCC_SHEX).unwrap();
        assert_eq!(&blob[shex.offset..shex.offset + shex.len], &[5, 6]);
        assert!(container.find_chunk(FourCC(*b"ISGN")).is_none());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut blob = build(&[(b"SHEX", &[0; 8])]);
        blob[0..4].copy_from_slice(b"DXBX");
        assert!(matches!(
            Container::parse(&blob).unwrap_err(),
            DxbcError::BadMagic
        ));
    }

    #[test]
    fn rejects_truncated_header() {
        assert!(matches!(
            Container::parse(&[0u8; 12]).unwrap_err(),
            DxbcError::Truncated { .. }
        ));
    }

    #[test]
    fn rejects_size_mismatch() {
        let mut blob = build(&[(b"SHEX", &[0; 8])]);
        let new_size = blob.len() as u32 + 4;
        write_u32(&mut blob, 24, new_size);
        assert!(matches!(
            Container::parse(&blob).unwrap_err(),
            DxbcError::SizeMismatch { .. }
        ));
    }

    #[test]
    fn rejects_chunk_count_overrun() {
        let mut blob = build(&[]);
        write_u32(&mut blob, 28, 1000);
        assert!(matches!(
            Container::parse(&blob).unwrap_err(),
            DxbcError::Truncated { .. }
        ));
    }

    #[test]
    fn rejects_chunk_payload_overrun() {
        let mut blob = build(&[(b"SHEX", &[0; 8])]);
        let chunk_header = blob.len() - 16;
        write_u32(&mut blob, chunk_header + 4, 64);
        assert!(matches!(
            Container::parse(&blob).unwrap_err(),
            DxbcError::ChunkOutOfBounds { index: 0, .. }
        ));
    }

    #[test]
    fn rejects_chunk_offset_inside_header() {
        let mut blob = build(&[(b"SHEX", &[0; 8])]);
        write_u32(&mut blob, HEADER_LEN, 4);
        assert!(matches!(
            Container::parse(&blob).unwrap_err(),
            DxbcError::ChunkOffsetInHeader { index: 0, .. }
        ));
    }
}
