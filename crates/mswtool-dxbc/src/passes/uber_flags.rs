//! Uber-flag AND removal.
//!
//! The newer engine gates material features on bits of `cb0[24]`; the legacy
//! engine leaves those components undefined, so a shader testing them renders
//! garbage. Every `and dst, cb0[24].?, l(bit)` becomes `mov dst, l(0)`,
//! forcing the feature path off.

use tracing::debug;

use crate::container::Container;
use crate::error::DxbcError;
use crate::passes::{chunk_tokens, write_tokens, PassReport};
use crate::sm5::{
    instructions, opcode, operand_type, read_operand, IMM32_SCALAR_TOKEN, NOP_TOKEN, SATURATE_BIT,
};

const UBER_FLAGS_BUFFER: u32 = 0;
const UBER_FLAGS_ELEMENT: u32 = 24;

/// Rewritten instruction: opcode + 2-DWORD dst + 2-DWORD immediate zero.
const MOV_LEN: usize = 5;

pub fn run(blob: &mut [u8], bit: u32) -> Result<PassReport, DxbcError> {
    let container = Container::parse(blob)?;
    let mut report = PassReport::default();

    let shader_chunks: Vec<_> = container.shader_chunks().collect();
    for chunk in shader_chunks {
        let mut tokens = chunk_tokens(blob, chunk);
        let mut patched = 0u32;

        let matches: Vec<_> = instructions(&tokens)
            .filter(|ins| ins.opcode == opcode::AND)
            .filter_map(|ins| {
                let dst = read_operand(&tokens, ins.pos + 1)?;
                if dst.len != 2 {
                    return None;
                }
                let src1 = read_operand(&tokens, dst.pos + dst.len)?;
                if src1.kind() != operand_type::CONSTANT_BUFFER
                    || src1.index0 != Some(UBER_FLAGS_BUFFER)
                    || src1.index1 != Some(UBER_FLAGS_ELEMENT)
                {
                    return None;
                }
                let src2 = read_operand(&tokens, src1.pos + src1.len)?;
                src2.is_scalar_imm32(bit).then_some(ins)
            })
            .collect();

        for ins in matches {
            tokens[ins.pos] =
                opcode::MOV | ((MOV_LEN as u32) << 24) | (tokens[ins.pos] & SATURATE_BIT);
            // dst stays in place; the source becomes an immediate zero.
            tokens[ins.pos + 3] = IMM32_SCALAR_TOKEN;
            tokens[ins.pos + 4] = 0;
            for t in &mut tokens[ins.pos + MOV_LEN..ins.pos + ins.len] {
                *t = NOP_TOKEN;
            }
            patched += ins.len as u32;
            debug!(pos = ins.pos, bit, "cleared uber-flag test");
        }

        if patched > 0 {
            write_tokens(blob, chunk, &tokens);
            report.shex_tokens += patched;
        }
    }

    Ok(report)
}
