//! Shader model 5 token decoding.
//!
//! Pure helpers over 32-bit tokens, shared by every patch pass. The numbering
//! follows `d3d11TokenizedProgramFormat.hpp`; only the opcodes and operand
//! types the passes actually key on get named constants.

use bitflags::bitflags;

pub mod opcode {
    pub const AND: u32 = 0x01;
    pub const ISHR: u32 = 0x2A;
    pub const ITOF: u32 = 0x2B;
    pub const CUSTOMDATA: u32 = 0x34;
    pub const MOV: u32 = 0x36;
    pub const MUL: u32 = 0x38;
    pub const NOP: u32 = 0x3A;
    pub const UTOF: u32 = 0x56;
    pub const DCL_RESOURCE: u32 = 0x58;
    pub const DCL_CONSTANT_BUFFER: u32 = 0x59;
    pub const DCL_RESOURCE_RAW: u32 = 0xA1;
    pub const DCL_RESOURCE_STRUCTURED: u32 = 0xA2;
}

pub mod operand_type {
    pub const TEMP: u32 = 0;
    pub const INPUT: u32 = 1;
    pub const OUTPUT: u32 = 2;
    pub const INDEXABLE_TEMP: u32 = 3;
    pub const IMMEDIATE32: u32 = 4;
    pub const IMMEDIATE64: u32 = 5;
    pub const SAMPLER: u32 = 6;
    pub const RESOURCE: u32 = 7;
    pub const CONSTANT_BUFFER: u32 = 8;
    pub const LABEL: u32 = 10;
}

/// Component selection modes for 4-component operands.
pub mod select_mode {
    pub const MASK: u32 = 0;
    pub const SWIZZLE: u32 = 1;
    pub const SELECT1: u32 = 2;
}

/// A complete no-op instruction (opcode NOP, length 1).
pub const NOP_TOKEN: u32 = 0x0100_003A;

/// Operand token of a one-component 32-bit immediate.
pub const IMM32_SCALAR_TOKEN: u32 = 0x0000_4001;

/// Saturate modifier bit of an opcode token, preserved across rewrites.
pub const SATURATE_BIT: u32 = 0x0000_2000;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ComponentMask: u32 {
        const X = 1 << 0;
        const Y = 1 << 1;
        const Z = 1 << 2;
        const W = 1 << 3;
    }
}

#[inline]
pub fn opcode_id(token: u32) -> u32 {
    token & 0x7FF
}

/// Instruction length in DWORDs, including the opcode token itself.
/// Declarations occasionally encode zero; clamp so walks always advance.
#[inline]
pub fn instruction_len(token: u32) -> usize {
    ((token >> 24) & 0x7F).max(1) as usize
}

#[inline]
pub fn operand_kind(token: u32) -> u32 {
    (token >> 12) & 0xFF
}

#[inline]
pub fn num_components(token: u32) -> u32 {
    token & 0x3
}

#[inline]
pub fn selection_mode(token: u32) -> u32 {
    (token >> 2) & 0x3
}

#[inline]
pub fn write_mask(token: u32) -> ComponentMask {
    ComponentMask::from_bits_truncate((token >> 4) & 0xF)
}

#[inline]
pub fn swizzle(token: u32) -> u32 {
    (token >> 4) & 0xFF
}

#[inline]
pub fn select1(token: u32) -> u32 {
    (token >> 4) & 0x3
}

#[inline]
pub fn index_dimension(token: u32) -> u32 {
    (token >> 20) & 0x3
}

#[inline]
pub fn is_extended(token: u32) -> bool {
    token & 0x8000_0000 != 0
}

#[inline]
pub fn is_declaration(op: u32) -> bool {
    // dcl_* plus the hull-shader phase markers; customdata is handled by the
    // walker separately.
    matches!(op, 0x58..=0x6B | 0x71..=0x74 | 0x8F..=0xA2)
}

/// True when a 4-component source operand reads `.w`: swizzle `.wwww`, any
/// swizzle whose first component is w, a select1 of w, or a bare w mask.
pub fn reads_w(token: u32) -> bool {
    reads_component(token, 3)
}

pub fn reads_component(token: u32, component: u32) -> bool {
    match selection_mode(token) {
        select_mode::MASK => write_mask(token).bits() == 1 << component,
        select_mode::SWIZZLE => {
            let swz = swizzle(token);
            let broadcast = 0x55 * component; // c in all four lanes
            swz == broadcast || (swz & 0x3) == component
        }
        select_mode::SELECT1 => select1(token) == component,
        _ => false,
    }
}

/// Destination with exactly one write-mask component; returns its index.
pub fn single_component_mask(token: u32) -> Option<u32> {
    if selection_mode(token) != select_mode::MASK {
        return None;
    }
    let bits = write_mask(token).bits();
    (bits.count_ones() == 1).then(|| bits.trailing_zeros())
}

/// DWORDs an operand occupies, including its own token and any extended
/// modifier token.
///
/// Derived from the operand encoding rather than a per-opcode table: the
/// trailing DWORD count for register-like types equals the index dimension
/// (temp/output/resource/sampler 1D, cbuffer 2D, system values 0D), and
/// immediates carry their payload inline.
pub fn operand_dwords(token: u32) -> usize {
    let ext = is_extended(token) as usize;
    let payload = match operand_kind(token) {
        operand_type::IMMEDIATE32 => match num_components(token) {
            1 => 1,
            2 => {
                // 4-component immediate: one DWORD per selected component,
                // a cleared mask meaning all four.
                let bits = write_mask(token).bits().count_ones() as usize;
                if selection_mode(token) == select_mode::MASK && bits > 0 {
                    bits
                } else {
                    4
                }
            }
            _ => 1,
        },
        operand_type::IMMEDIATE64 => 2,
        _ => index_dimension(token) as usize,
    };
    1 + ext + payload
}

/// A decoded operand: its position in the token stream, the raw token and
/// up to two immediate index values (register / buffer element).
#[derive(Clone, Copy, Debug)]
pub struct Operand {
    pub pos: usize,
    pub token: u32,
    pub len: usize,
    pub index0: Option<u32>,
    pub index1: Option<u32>,
}

impl Operand {
    pub fn kind(&self) -> u32 {
        operand_kind(self.token)
    }

    pub fn is_scalar_imm32(&self, value: u32) -> bool {
        self.kind() == operand_type::IMMEDIATE32
            && num_components(self.token) == 1
            && self.index0 == Some(value)
    }
}

/// Reads the operand starting at `pos`. The index fields hold the DWORDs
/// following the (possibly extended) token; for immediates they hold the
/// payload instead.
pub fn read_operand(tokens: &[u32], pos: usize) -> Option<Operand> {
    let token = *tokens.get(pos)?;
    let len = operand_dwords(token);
    if pos + len > tokens.len() {
        return None;
    }
    let first = pos + 1 + is_extended(token) as usize;
    let avail = pos + len;
    Some(Operand {
        pos,
        token,
        len,
        index0: (first < avail).then(|| tokens[first]),
        index1: (first + 1 < avail).then(|| tokens[first + 1]),
    })
}

/// Position of the first index/payload DWORD of the operand at `pos`.
pub fn operand_payload_pos(tokens: &[u32], pos: usize) -> usize {
    pos + 1 + is_extended(tokens[pos]) as usize
}

#[derive(Clone, Copy, Debug)]
pub struct Instruction {
    pub pos: usize,
    pub opcode: u32,
    pub len: usize,
}

/// Walks instruction boundaries of a SHEX/SHDR token stream. The stream
/// starts with the version and declared-length tokens, which are skipped.
pub fn instructions(tokens: &[u32]) -> InstructionIter<'_> {
    InstructionIter { tokens, pos: 2 }
}

pub struct InstructionIter<'a> {
    tokens: &'a [u32],
    pos: usize,
}

impl Iterator for InstructionIter<'_> {
    type Item = Instruction;

    fn next(&mut self) -> Option<Instruction> {
        if self.pos >= self.tokens.len() {
            return None;
        }
        let pos = self.pos;
        let token = self.tokens[pos];
        let opcode = opcode_id(token);

        // Immediate constant buffers and interface tables carry their length
        // in the following DWORD.
        let len = if opcode == opcode::CUSTOMDATA {
            (*self.tokens.get(pos + 1)? as usize).max(2)
        } else {
            instruction_len(token)
        };

        if pos + len > self.tokens.len() {
            // Truncated tail; stop rather than hand out a partial instruction.
            self.pos = self.tokens.len();
            return None;
        }
        self.pos = pos + len;
        Some(Instruction { pos, opcode, len })
    }
}

/// Walks the operands of one non-declaration instruction by summing operand
/// footprints from `start` to the instruction end.
pub fn operands(tokens: &[u32], ins: Instruction) -> OperandIter<'_> {
    OperandIter {
        tokens,
        pos: ins.pos + 1,
        end: ins.pos + ins.len,
    }
}

pub struct OperandIter<'a> {
    tokens: &'a [u32],
    pos: usize,
    end: usize,
}

impl Iterator for OperandIter<'_> {
    type Item = Operand;

    fn next(&mut self) -> Option<Operand> {
        if self.pos >= self.end {
            return None;
        }
        let operand = read_operand(&self.tokens[..self.end], self.pos)?;
        self.pos += operand.len;
        Some(operand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Operand encoders mirroring what fxc emits; kept here so decoder tests
    // are self-contained.
    fn temp_dst(reg: u32, mask: u32) -> Vec<u32> {
        vec![2 | (mask << 4) | (1 << 20), reg]
    }

    fn temp_src(reg: u32, swz: u32) -> Vec<u32> {
        vec![2 | (select_mode::SWIZZLE << 2) | (swz << 4) | (1 << 20), reg]
    }

    fn cb_src(buf: u32, elem: u32, swz: u32) -> Vec<u32> {
        vec![
            2 | (select_mode::SWIZZLE << 2)
                | (swz << 4)
                | (operand_type::CONSTANT_BUFFER << 12)
                | (2 << 20),
            buf,
            elem,
        ]
    }

    fn imm32(value: u32) -> Vec<u32> {
        vec![IMM32_SCALAR_TOKEN, value]
    }

    fn ins(op: u32, operands: &[Vec<u32>]) -> Vec<u32> {
        let len = 1 + operands.iter().map(Vec::len).sum::<usize>();
        let mut out = vec![op | ((len as u32) << 24)];
        for o in operands {
            out.extend_from_slice(o);
        }
        out
    }

    #[test]
    fn opcode_fields() {
        let token = opcode::MUL | (7 << 24) | SATURATE_BIT;
        assert_eq!(opcode_id(token), opcode::MUL);
        assert_eq!(instruction_len(token), 7);
        assert_eq!(instruction_len(opcode::NOP), 1); // zero length clamps
    }

    #[test]
    fn footprints_match_encodings() {
        assert_eq!(operand_dwords(temp_dst(3, 0x8)[0]), 2);
        assert_eq!(operand_dwords(temp_src(3, 0xFF)[0]), 2);
        assert_eq!(operand_dwords(cb_src(2, 11, 0xFF)[0]), 3);
        assert_eq!(operand_dwords(IMM32_SCALAR_TOKEN), 2);
        // 4-component immediate with a cleared mask carries four DWORDs.
        assert_eq!(operand_dwords(0x0000_4002), 5);
        // Extended operands carry one modifier DWORD.
        assert_eq!(operand_dwords(temp_src(0, 0)[0] | 0x8000_0000), 3);
    }

    #[test]
    fn footprints_sum_to_instruction_length() {
        let body = ins(
            opcode::MUL,
            &[temp_dst(0, 0x8), temp_src(6, 0xFF), imm32(0x3800_0000)],
        );
        let mut stream = vec![0x0005_0050, 0]; // version + length placeholder
        stream.extend_from_slice(&body);
        stream[1] = stream.len() as u32;

        let ins = instructions(&stream).next().unwrap();
        assert_eq!(ins.opcode, opcode::MUL);
        let total: usize = operands(&stream, ins).map(|o| o.len).sum();
        assert_eq!(1 + total, ins.len);
    }

    #[test]
    fn w_component_detection() {
        // mask .w
        assert!(reads_w(2 | (0x8 << 4)));
        assert!(!reads_w(2 | (0x4 << 4)));
        // swizzle .wwww and first-lane w
        assert!(reads_w(2 | (select_mode::SWIZZLE << 2) | (0xFF << 4)));
        assert!(reads_w(2 | (select_mode::SWIZZLE << 2) | (0x03 << 4)));
        assert!(!reads_w(2 | (select_mode::SWIZZLE << 2) | (0xE4 << 4)));
        // select1 w
        assert!(reads_w(2 | (select_mode::SELECT1 << 2) | (3 << 4)));
        assert!(!reads_w(2 | (select_mode::SELECT1 << 2) | (2 << 4)));
    }

    #[test]
    fn single_component_masks() {
        assert_eq!(single_component_mask(2 | (0x8 << 4)), Some(3));
        assert_eq!(single_component_mask(2 | (0x1 << 4)), Some(0));
        assert_eq!(single_component_mask(2 | (0x3 << 4)), None);
        assert_eq!(
            single_component_mask(2 | (select_mode::SWIZZLE << 2) | (0xFF << 4)),
            None
        );
    }

    #[test]
    fn walker_skips_customdata_via_trailing_length() {
        let mut stream = vec![0x0005_0050, 0];
        // customdata blob of 6 DWORDs total (header pair + 4 payload).
        stream.extend_from_slice(&[opcode::CUSTOMDATA, 6, 0, 0, 0, 0]);
        stream.extend_from_slice(&ins(opcode::NOP, &[]));
        stream[1] = stream.len() as u32;

        let ops: Vec<u32> = instructions(&stream).map(|i| i.opcode).collect();
        assert_eq!(ops, vec![opcode::CUSTOMDATA, opcode::NOP]);
    }

    #[test]
    fn walker_stops_on_truncated_instruction() {
        let stream = vec![0x0005_0050, 3, opcode::MUL | (9 << 24)];
        assert_eq!(instructions(&stream).count(), 0);
    }

    #[test]
    fn read_operand_extracts_indices() {
        let stream = cb_src(2, 11, 0xFF);
        let op = read_operand(&stream, 0).unwrap();
        assert_eq!(op.kind(), operand_type::CONSTANT_BUFFER);
        assert_eq!(op.index0, Some(2));
        assert_eq!(op.index1, Some(11));
    }
}
