//! SRV slot remapping.
//!
//! Two passes over the blob. RDEF goes first: bindings are matched by name,
//! which is the only reliable identity when several resources share a slot
//! number, and the bind points are rewritten there. The `(old, new)` pairs
//! actually applied then drive the bytecode rewrite, with any caller-supplied
//! slot-keyed rules as a fallback for operands the reflection table does not
//! cover.

use tracing::debug;

use crate::container::{write_u32, Container, FOURCC_RDEF};
use crate::error::DxbcError;
use crate::passes::{chunk_tokens, write_tokens, PassReport};
use crate::rdef::{is_srv_class, Rdef};
use crate::sm5::{
    instructions, is_declaration, opcode, operand_payload_pos, operand_type, operands,
    read_operand,
};

/// Name-keyed moves applied in legacy mode: resources the newer engine
/// binds high get pulled back to the slots the legacy engine reserves.
const LEGACY_NAME_REMAPS: &[(&str, u32, u32)] = &[
    ("g_modelInst", 75, 61),
    ("g_boneWeightsExtra", 63, 1),
];

pub fn run(blob: &mut [u8], legacy: bool, custom: &[(u32, u32)]) -> Result<PassReport, DxbcError> {
    let mut report = PassReport::default();

    // RDEF pass: name-keyed analysis decides which slots move.
    let mut rdef_writes: Vec<(usize, u32, u32)> = Vec::new();
    {
        let container = Container::parse(blob)?;
        if let Some(chunk) = container.find_chunk(FOURCC_RDEF) {
            let rdef = Rdef::parse(blob, chunk)?;
            for binding in rdef.bindings(blob) {
                if !is_srv_class(binding.input_type) {
                    continue;
                }
                let name = rdef.name_at(blob, binding.name_offset);

                let mut target = None;
                if legacy {
                    target = LEGACY_NAME_REMAPS
                        .iter()
                        .find(|(n, from, _)| Some(*n) == name && binding.bind_point == *from)
                        .map(|(_, _, to)| *to);
                }
                if target.is_none() {
                    target = custom
                        .iter()
                        .find(|(from, _)| binding.bind_point == *from)
                        .map(|(_, to)| *to);
                }

                if let Some(to) = target {
                    rdef_writes.push((binding.bind_point_offset(), binding.bind_point, to));
                }
            }
        }
    }

    let mut applied: Vec<(u32, u32)> = Vec::new();
    for (offset, from, to) in rdef_writes {
        write_u32(blob, offset, to);
        applied.push((from, to));
        report.srv_slots += 1;
        debug!(from, to, "moved SRV binding");
    }

    // The reflection-derived pairs are authoritative; caller rules fill in
    // for slots the table does not cover.
    let remap = |slot: u32| -> Option<u32> {
        applied
            .iter()
            .find(|(from, _)| *from == slot)
            .or_else(|| custom.iter().find(|(from, _)| *from == slot))
            .map(|(_, to)| *to)
    };

    // Bytecode pass: declarations plus every resource operand.
    let container = Container::parse(blob)?;
    let shader_chunks: Vec<_> = container.shader_chunks().collect();
    for chunk in shader_chunks {
        let mut tokens = chunk_tokens(blob, chunk);

        let mut writes: Vec<(usize, u32)> = Vec::new();
        for ins in instructions(&tokens) {
            let is_resource_dcl = matches!(
                ins.opcode,
                opcode::DCL_RESOURCE | opcode::DCL_RESOURCE_RAW | opcode::DCL_RESOURCE_STRUCTURED
            );

            if is_resource_dcl {
                let Some(op) = read_operand(&tokens, ins.pos + 1) else {
                    continue;
                };
                if op.kind() != operand_type::RESOURCE {
                    continue;
                }
                if let Some(to) = op.index0.and_then(remap) {
                    writes.push((operand_payload_pos(&tokens, op.pos), to));
                }
            } else if !is_declaration(ins.opcode) && ins.opcode != opcode::CUSTOMDATA {
                for op in operands(&tokens, ins) {
                    if op.kind() != operand_type::RESOURCE {
                        continue;
                    }
                    if let Some(to) = op.index0.and_then(remap) {
                        writes.push((operand_payload_pos(&tokens, op.pos), to));
                    }
                }
            }
        }

        if writes.is_empty() {
            continue;
        }
        for (pos, to) in &writes {
            tokens[*pos] = *to;
        }
        report.shex_tokens += writes.len() as u32;
        write_tokens(blob, chunk, &tokens);
    }

    Ok(report)
}
