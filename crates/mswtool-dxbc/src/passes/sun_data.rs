//! Sun-data unpacking removal.
//!
//! The newer engine packs sun visibility and intensity as two 16-bit halves
//! of `cb2[11].w` and unpacks them in the shader: a shift or mask extract,
//! an integer-to-float convert and a `* l(1/32768)` rescale. The legacy
//! engine supplies that component as a plain float in [0,1], so the unpack
//! must be erased while leaving every consumer instruction intact:
//!
//!   ishr r.w, cb2[11].w, l(16)      ->  mov r.w, cb2[11].w
//!   and  r.w, cb2[11].w, l(0xFFFF)  ->  mov r.w, cb2[11].w
//!   itof r.w, r.w                   ->  nop fill
//!   mul  x, r.w, l(3.05e-5)         ->  mul x, r.w, l(1.0)
//!
//! Instanced shaders first stage the packed word through a scratch register,
//! so the extract source may be a temp `.w` instead of the cbuffer. A bare
//! `ishr r, r.w, l(16)` is not diagnostic on its own; temp-source matches
//! are only accepted when the rescale multiply corroborates them.

use tracing::debug;

use crate::container::Container;
use crate::error::DxbcError;
use crate::passes::{chunk_tokens, write_tokens, PassReport};
use crate::sm5::{
    instructions, num_components, opcode, operand_payload_pos, operand_type, read_operand,
    reads_component, reads_w, single_component_mask, Instruction, NOP_TOKEN, SATURATE_BIT,
};

const SUN_DATA_BUFFER: u32 = 2;
const SUN_DATA_ELEMENT: u32 = 11;

/// Raw-bit window around 1/32768 accepted as the rescale constant.
const SCALE_MIN: f32 = 2.5e-5;
const SCALE_MAX: f32 = 3.5e-5;

const CONVERT_WINDOW: usize = 200;
const SCALE_WINDOW: usize = 600;
const MAX_SEQUENCES: usize = 4;

const FLOAT_ONE: u32 = 0x3F80_0000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Half {
    Upper,
    Lower,
}

struct Sequence {
    extract: Instruction,
    dst_reg: u32,
    component: u32,
    /// Extract reads the cbuffer directly; temp-staged otherwise.
    cb_source: bool,
    dst_len: usize,
    src_len: usize,
    half: Half,
    convert: Option<Instruction>,
    scale_imm_pos: Option<usize>,
}

pub fn run(blob: &mut [u8]) -> Result<PassReport, DxbcError> {
    let container = Container::parse(blob)?;
    let mut report = PassReport::default();

    let shader_chunks: Vec<_> = container.shader_chunks().collect();
    for chunk in shader_chunks {
        let mut tokens = chunk_tokens(blob, chunk);

        let mut sequences = collect_extracts(&tokens);
        for seq in &mut sequences {
            seq.convert = find_convert(&tokens, seq);
            seq.scale_imm_pos = find_scale(&tokens, seq);
        }

        let mut patched = 0u32;
        let mut notes = Vec::new();
        for seq in &sequences {
            // An isolated temp-source shift is too common to rewrite safely.
            if !seq.cb_source && seq.scale_imm_pos.is_none() {
                debug!(
                    pos = seq.extract.pos,
                    "temp-source extract without rescale, skipped"
                );
                notes.push(format!("skipped temp extract at {}", seq.extract.pos));
                continue;
            }
            if seq.convert.is_none() {
                notes.push(format!("no convert for extract at {}", seq.extract.pos));
            }
            patched += apply(&mut tokens, seq);
        }

        if patched > 0 {
            write_tokens(blob, chunk, &tokens);
            report.shex_tokens += patched;
        }
        if !notes.is_empty() {
            report.note = Some(notes.join("; "));
        }
    }

    Ok(report)
}

fn collect_extracts(tokens: &[u32]) -> Vec<Sequence> {
    let mut out = Vec::new();
    for ins in instructions(tokens) {
        if out.len() >= MAX_SEQUENCES {
            break;
        }
        let (half, imm) = match ins.opcode {
            opcode::ISHR => (Half::Upper, 16),
            opcode::AND => (Half::Lower, 0xFFFF),
            _ => continue,
        };

        let Some(dst) = read_operand(tokens, ins.pos + 1) else {
            continue;
        };
        if dst.kind() != operand_type::TEMP {
            continue;
        }
        let Some(component) = single_component_mask(dst.token) else {
            continue;
        };
        let Some(src1) = read_operand(tokens, dst.pos + dst.len) else {
            continue;
        };
        let cb_source = src1.kind() == operand_type::CONSTANT_BUFFER
            && src1.index0 == Some(SUN_DATA_BUFFER)
            && src1.index1 == Some(SUN_DATA_ELEMENT)
            && reads_w(src1.token);
        let temp_source = src1.kind() == operand_type::TEMP && reads_w(src1.token);
        if !cb_source && !temp_source {
            continue;
        }
        let Some(src2) = read_operand(tokens, src1.pos + src1.len) else {
            continue;
        };
        if !src2.is_scalar_imm32(imm) {
            continue;
        }

        out.push(Sequence {
            extract: ins,
            dst_reg: dst.index0.unwrap_or(0),
            component,
            cb_source,
            dst_len: dst.len,
            src_len: src1.len,
            half,
            convert: None,
            scale_imm_pos: None,
        });
    }
    out
}

/// `itof`/`utof` converting the extracted component in place.
fn find_convert(tokens: &[u32], seq: &Sequence) -> Option<Instruction> {
    let start = seq.extract.pos + seq.extract.len;
    let limit = start + CONVERT_WINDOW;
    for ins in instructions(tokens) {
        if ins.pos < start {
            continue;
        }
        if ins.pos > limit {
            break;
        }
        if ins.opcode != opcode::ITOF && ins.opcode != opcode::UTOF {
            continue;
        }
        let Some(dst) = read_operand(tokens, ins.pos + 1) else {
            continue;
        };
        if dst.kind() != operand_type::TEMP
            || dst.index0 != Some(seq.dst_reg)
            || single_component_mask(dst.token) != Some(seq.component)
        {
            continue;
        }
        let Some(src) = read_operand(tokens, dst.pos + dst.len) else {
            continue;
        };
        if src.kind() == operand_type::TEMP
            && src.index0 == Some(seq.dst_reg)
            && reads_component(src.token, seq.component)
        {
            return Some(ins);
        }
    }
    None
}

/// `mul` of the extracted register against an immediate near 1/32768; the
/// operand order is not fixed. Returns the position of the immediate value
/// DWORD.
fn find_scale(tokens: &[u32], seq: &Sequence) -> Option<usize> {
    let start = seq.extract.pos + seq.extract.len;
    let limit = start + SCALE_WINDOW;
    for ins in instructions(tokens) {
        if ins.pos < start {
            continue;
        }
        if ins.pos > limit {
            break;
        }
        if ins.opcode != opcode::MUL {
            continue;
        }
        let Some(dst) = read_operand(tokens, ins.pos + 1) else {
            continue;
        };
        if dst.kind() != operand_type::TEMP {
            continue;
        }
        let Some(a) = read_operand(tokens, dst.pos + dst.len) else {
            continue;
        };
        let Some(b) = read_operand(tokens, a.pos + a.len) else {
            continue;
        };
        for (reg, imm) in [(&a, &b), (&b, &a)] {
            let reg_matches = reg.kind() == operand_type::TEMP
                && reg.index0 == Some(seq.dst_reg)
                && reads_component(reg.token, seq.component);
            let imm_value = (imm.kind() == operand_type::IMMEDIATE32
                && num_components(imm.token) == 1)
                .then(|| imm.index0)
                .flatten();
            if let (true, Some(bits)) = (reg_matches, imm_value) {
                let value = f32::from_bits(bits);
                if value > SCALE_MIN && value < SCALE_MAX {
                    return Some(operand_payload_pos(tokens, imm.pos));
                }
            }
        }
    }
    None
}

fn apply(tokens: &mut [u32], seq: &Sequence) -> u32 {
    let mut patched = 0u32;

    // Extract becomes a plain move of the packed word; the immediate shift
    // amount / mask is NOPed out with the slack.
    let pos = seq.extract.pos;
    let mov_len = 1 + seq.dst_len + seq.src_len;
    tokens[pos] = opcode::MOV | ((mov_len as u32) << 24) | (tokens[pos] & SATURATE_BIT);
    for t in &mut tokens[pos + mov_len..pos + seq.extract.len] {
        *t = NOP_TOKEN;
    }
    patched += seq.extract.len as u32;
    debug!(pos, half = ?seq.half, cb_source = seq.cb_source, "rewrote sun-data extract");

    if let Some(convert) = seq.convert {
        for t in &mut tokens[convert.pos..convert.pos + convert.len] {
            *t = NOP_TOKEN;
        }
        patched += convert.len as u32;
    }

    if let Some(imm_pos) = seq.scale_imm_pos {
        tokens[imm_pos] = FLOAT_ONE;
        patched += 1;
    }

    patched
}
