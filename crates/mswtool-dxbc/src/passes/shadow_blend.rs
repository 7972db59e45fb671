//! Shadow-blend multiply removal.
//!
//! After the sun-data rewrite, shaders that compute `sunVis * shadowBlend`
//! effectively square the visibility term, which shows up as shadow flicker.
//! The fix NOPs the self-referential `.w` multiply entirely. The matcher is
//! broad, so the pass stays opt-in: it can NOP multiplies that merely look
//! like the blend.

use tracing::debug;

use crate::container::Container;
use crate::error::DxbcError;
use crate::passes::{chunk_tokens, write_tokens, PassReport};
use crate::sm5::{
    instructions, opcode, operand_type, read_operand, reads_w, write_mask, ComponentMask,
    NOP_TOKEN,
};

pub fn run(blob: &mut [u8]) -> Result<PassReport, DxbcError> {
    let container = Container::parse(blob)?;
    let mut report = PassReport::default();

    let shader_chunks: Vec<_> = container.shader_chunks().collect();
    for chunk in shader_chunks {
        let mut tokens = chunk_tokens(blob, chunk);
        let mut patched = 0u32;

        let matches: Vec<_> = instructions(&tokens)
            .filter(|ins| ins.opcode == opcode::MUL)
            .filter_map(|ins| {
                let dst = read_operand(&tokens, ins.pos + 1)?;
                if dst.kind() != operand_type::TEMP
                    || write_mask(dst.token) != ComponentMask::W
                {
                    return None;
                }
                let a = read_operand(&tokens, dst.pos + dst.len)?;
                let b = read_operand(&tokens, a.pos + a.len)?;
                if a.kind() != operand_type::TEMP
                    || b.kind() != operand_type::TEMP
                    || !reads_w(a.token)
                    || !reads_w(b.token)
                {
                    return None;
                }
                // One source is the destination itself, the other a distinct
                // register carrying the blend factor.
                let dst_reg = dst.index0?;
                let (a_reg, b_reg) = (a.index0?, b.index0?);
                ((a_reg == dst_reg) != (b_reg == dst_reg) && a_reg != b_reg).then_some(ins)
            })
            .collect();

        for ins in matches {
            for t in &mut tokens[ins.pos..ins.pos + ins.len] {
                *t = NOP_TOKEN;
            }
            patched += ins.len as u32;
            debug!(pos = ins.pos, "removed shadow-blend multiply");
        }

        if patched > 0 {
            write_tokens(blob, chunk, &tokens);
            report.shex_tokens += patched;
        }
    }

    Ok(report)
}
