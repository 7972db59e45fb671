//! ClusteredLighting member removal.
//!
//! The newer engine appends a 32-byte ClusteredLighting block to
//! `CBufCommonPerCamera`, growing it from 752 to 784 bytes. The legacy
//! engine allocates 752; a shader declaring 784 fails buffer validation at
//! bind time. Shrinking the declared size and dropping the trailing variable
//! from the count is enough, since no bytecode reads the removed member.

use tracing::debug;

use crate::container::{write_u32, Container, FOURCC_RDEF};
use crate::error::DxbcError;
use crate::layout::CAMERA_CBUFFER;
use crate::passes::PassReport;
use crate::rdef::Rdef;

const NEW_SIZE: u32 = 784;
const LEGACY_SIZE: u32 = 752;

pub fn run(blob: &mut [u8]) -> Result<PassReport, DxbcError> {
    let mut report = PassReport::default();

    let mut writes: Vec<(usize, u32)> = Vec::new();
    {
        let container = Container::parse(blob)?;
        if let Some(chunk) = container.find_chunk(FOURCC_RDEF) {
            let rdef = Rdef::parse(blob, chunk)?;
            for desc in rdef.cbuffers(blob) {
                if rdef.name_at(blob, desc.name_offset) != Some(CAMERA_CBUFFER) {
                    continue;
                }
                if desc.size != NEW_SIZE {
                    continue;
                }
                writes.push((desc.size_offset(), LEGACY_SIZE));
                writes.push((desc.variable_count_offset(), desc.variable_count - 1));
                debug!(
                    size = desc.size,
                    variables = desc.variable_count,
                    "shrinking per-camera cbuffer"
                );
            }
        }
    }

    for (offset, value) in writes {
        write_u32(blob, offset, value);
        report.rdef_fields += 1;
    }

    Ok(report)
}
