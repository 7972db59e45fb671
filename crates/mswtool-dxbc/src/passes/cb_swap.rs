//! CB2 <-> CB3 swap. Runs last: every other pass keys on pre-swap indices.
//!
//! Collect-then-apply is load-bearing here. A single walk that rewrites
//! 2 -> 3 and 3 -> 2 as it goes would visit some positions twice and swap
//! them back; both the bytecode and RDEF sides gather every write first and
//! commit in one sweep.

use tracing::debug;

use crate::container::{write_u32, Container, FOURCC_RDEF};
use crate::error::DxbcError;
use crate::passes::{chunk_tokens, write_tokens, PassReport};
use crate::rdef::{input_type, Rdef};
use crate::sm5::{
    instructions, is_declaration, opcode, operand_payload_pos, operand_type, operands,
    read_operand,
};

fn swapped(slot: u32) -> Option<u32> {
    match slot {
        2 => Some(3),
        3 => Some(2),
        _ => None,
    }
}

pub fn run(blob: &mut [u8]) -> Result<PassReport, DxbcError> {
    let mut report = PassReport::default();

    // Bytecode side: declarations and every cbuffer operand.
    let container = Container::parse(blob)?;
    let shader_chunks: Vec<_> = container.shader_chunks().collect();
    for chunk in shader_chunks {
        let mut tokens = chunk_tokens(blob, chunk);

        let mut writes: Vec<(usize, u32)> = Vec::new();
        for ins in instructions(&tokens) {
            if ins.opcode == opcode::DCL_CONSTANT_BUFFER {
                let Some(op) = read_operand(&tokens, ins.pos + 1) else {
                    continue;
                };
                if op.kind() != operand_type::CONSTANT_BUFFER {
                    continue;
                }
                if let Some(to) = op.index0.and_then(swapped) {
                    writes.push((operand_payload_pos(&tokens, op.pos), to));
                }
            } else if !is_declaration(ins.opcode) && ins.opcode != opcode::CUSTOMDATA {
                for op in operands(&tokens, ins) {
                    if op.kind() != operand_type::CONSTANT_BUFFER {
                        continue;
                    }
                    if let Some(to) = op.index0.and_then(swapped) {
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
        debug!(count = writes.len(), "swapped cbuffer indices in bytecode");
    }

    // RDEF side: only CBUFFER-class bindings move.
    let mut rdef_writes: Vec<(usize, u32)> = Vec::new();
    {
        let container = Container::parse(blob)?;
        if let Some(chunk) = container.find_chunk(FOURCC_RDEF) {
            let rdef = Rdef::parse(blob, chunk)?;
            for binding in rdef.bindings(blob) {
                if binding.input_type != input_type::CBUFFER {
                    continue;
                }
                if let Some(to) = swapped(binding.bind_point) {
                    rdef_writes.push((binding.bind_point_offset(), to));
                }
            }
        }
    }
    for (offset, to) in rdef_writes {
        write_u32(blob, offset, to);
        report.rdef_fields += 1;
    }

    Ok(report)
}
