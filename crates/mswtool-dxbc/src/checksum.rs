//! The container integrity hash.
//!
//! DXBC carries an MD5-shaped digest of everything past the version field
//! (offset 20), but the final block is laid out differently from RFC 1321:
//! the message bit count sits in DWORD 0 and `(bits >> 2) | 1` in DWORD 15,
//! with no 64-bit trailer. A stock MD5 library therefore produces the wrong
//! digest; the compression rounds themselves are standard.

use crate::container::CHECKSUM_RANGE;

/// Hash input starts here; the magic, checksum and version fields are skipped.
pub const BODY_OFFSET: usize = 20;

const INIT: [u32; 4] = [0x6745_2301, 0xefcd_ab89, 0x98ba_dcfe, 0x1032_5476];

const SHIFTS: [[u32; 4]; 4] = [[7, 12, 17, 22], [5, 9, 14, 20], [4, 11, 16, 23], [6, 10, 15, 21]];

#[rustfmt::skip]
const K: [u32; 64] = [
    0xd76a_a478, 0xe8c7_b756, 0x2420_70db, 0xc1bd_ceee,
    0xf57c_0faf, 0x4787_c62a, 0xa830_4613, 0xfd46_9501,
    0x6980_98d8, 0x8b44_f7af, 0xffff_5bb1, 0x895c_d7be,
    0x6b90_1122, 0xfd98_7193, 0xa679_438e, 0x49b4_0821,
    0xf61e_2562, 0xc040_b340, 0x265e_5a51, 0xe9b6_c7aa,
    0xd62f_105d, 0x0244_1453, 0xd8a1_e681, 0xe7d3_fbc8,
    0x21e1_cde6, 0xc337_07d6, 0xf4d5_0d87, 0x455a_14ed,
    0xa9e3_e905, 0xfcef_a3f8, 0x676f_02d9, 0x8d2a_4c8a,
    0xfffa_3942, 0x8771_f681, 0x6d9d_6122, 0xfde5_380c,
    0xa4be_ea44, 0x4bde_cfa9, 0xf6bb_4b60, 0xbebf_bc70,
    0x289b_7ec6, 0xeaa1_27fa, 0xd4ef_3085, 0x0488_1d05,
    0xd9d4_d039, 0xe6db_99e5, 0x1fa2_7cf8, 0xc4ac_5665,
    0xf429_2244, 0x432a_ff97, 0xab94_23a7, 0xfc93_a039,
    0x655b_59c3, 0x8f0c_cc92, 0xffef_f47d, 0x8584_5dd1,
    0x6fa8_7e4f, 0xfe2c_e6e0, 0xa301_4314, 0x4e08_11a1,
    0xf753_7e82, 0xbd3a_f235, 0x2ad7_d2bb, 0xeb86_d391,
];

fn compress(state: &mut [u32; 4], block: &[u8; 64]) {
    let mut m = [0u32; 16];
    for (i, word) in m.iter_mut().enumerate() {
        *word = u32::from_le_bytes(block[i * 4..i * 4 + 4].try_into().unwrap());
    }

    let [mut a, mut b, mut c, mut d] = *state;
    for i in 0..64 {
        // Rounds 1 and 2 share one selector shape with the neighbouring
        // variables b and d exchanged; these select forms are bit-identical
        // to the reference F/G functions.
        let (f, g) = match i / 16 {
            0 => (d ^ (b & (c ^ d)), i),
            1 => (c ^ (d & (b ^ c)), (5 * i + 1) % 16),
            2 => (b ^ c ^ d, (3 * i + 5) % 16),
            _ => (c ^ (b | !d), (7 * i) % 16),
        };
        let rotated = a
            .wrapping_add(f)
            .wrapping_add(K[i])
            .wrapping_add(m[g])
            .rotate_left(SHIFTS[i / 16][i % 4]);
        (a, b, c, d) = (d, b.wrapping_add(rotated), b, c);
    }

    state[0] = state[0].wrapping_add(a);
    state[1] = state[1].wrapping_add(b);
    state[2] = state[2].wrapping_add(c);
    state[3] = state[3].wrapping_add(d);
}

/// Digest of `body` using the DXBC padding rules.
pub fn digest_body(body: &[u8]) -> [u32; 4] {
    let mut state = INIT;

    let mut blocks = body.chunks_exact(64);
    for block in blocks.by_ref() {
        compress(&mut state, block.try_into().unwrap());
    }
    let tail = blocks.remainder();
    let bits = (body.len() as u32).wrapping_mul(8);
    let marker = (bits >> 2) | 1;

    if tail.len() >= 56 {
        // Tail plus terminator fills one block; the length markers get a
        // block of their own.
        let mut block = [0u8; 64];
        block[..tail.len()].copy_from_slice(tail);
        block[tail.len()] = 0x80;
        compress(&mut state, &block);

        let mut fin = [0u8; 64];
        fin[0..4].copy_from_slice(&bits.to_le_bytes());
        fin[60..64].copy_from_slice(&marker.to_le_bytes());
        compress(&mut state, &fin);
    } else {
        let mut block = [0u8; 64];
        block[0..4].copy_from_slice(&bits.to_le_bytes());
        block[4..4 + tail.len()].copy_from_slice(tail);
        block[4 + tail.len()] = 0x80;
        block[60..64].copy_from_slice(&marker.to_le_bytes());
        compress(&mut state, &block);
    }

    state
}

fn digest_blob(blob: &[u8]) -> [u32; 4] {
    digest_body(&blob[BODY_OFFSET..])
}

/// Recomputes the digest over `blob[20..]` and rewrites bytes 4..20.
/// Callers must pass a blob at least `BODY_OFFSET` bytes long.
pub fn update_checksum(blob: &mut [u8]) {
    let words = digest_blob(blob);
    for (i, word) in words.iter().enumerate() {
        let at = CHECKSUM_RANGE.start + i * 4;
        blob[at..at + 4].copy_from_slice(&word.to_le_bytes());
    }
}

/// True when the stored checksum matches the body.
pub fn verify_checksum(blob: &[u8]) -> bool {
    if blob.len() < BODY_OFFSET {
        return false;
    }
    let words = digest_blob(blob);
    let mut stored = [0u32; 4];
    for (i, word) in stored.iter_mut().enumerate() {
        let at = CHECKSUM_RANGE.start + i * 4;
        *word = u32::from_le_bytes(blob[at..at + 4].try_into().unwrap());
    }
    stored == words
}

#[cfg(test)]
mod tests {
    use super::*;

    // Golden digests generated with a reference implementation of the
    // modified padding; the compression rounds of that implementation were
    // cross-checked against RFC 1321 MD5 on standard inputs.

    #[test]
    fn golden_empty_body() {
        assert_eq!(
            digest_body(b""),
            [0xf660_0d14, 0xbae2_75b7, 0xd4be_4a4e, 0xa1e9_b201]
        );
    }

    #[test]
    fn golden_short_tail() {
        let body: Vec<u8> = (0u8..16).collect();
        assert_eq!(
            digest_body(&body),
            [0x6100_a6f6, 0x0824_d4de, 0x903c_9e6f, 0xfdd7_7e9c]
        );
    }

    #[test]
    fn golden_long_tail_spills_into_extra_block() {
        // 60 % 64 >= 56 takes the two-block finalization path.
        let body: Vec<u8> = (0u8..60).collect();
        assert_eq!(
            digest_body(&body),
            [0x6805_8ad9, 0x3904_6f1c, 0xab8d_5aba, 0x5318_fe5e]
        );
    }

    #[test]
    fn golden_exact_block() {
        let body: Vec<u8> = (0..64).map(|i| i as u8).collect();
        assert_eq!(
            digest_body(&body),
            [0x6cb0_2ef4, 0x78c8_21a9, 0xb8e3_35e4, 0x132b_f9d4]
        );
    }

    #[test]
    fn golden_tail_boundaries() {
        // rem == 56 is the smallest remainder that spills; rem == 55 the
        // largest that fits in a single final block.
        let body: Vec<u8> = (0..120).map(|i| i as u8).collect();
        assert_eq!(
            digest_body(&body),
            [0x4fce_2f88, 0x4319_954c, 0xefad_e792, 0x43e3_3fd5]
        );
        let body: Vec<u8> = (0..119).map(|i| i as u8).collect();
        assert_eq!(
            digest_body(&body),
            [0xec67_3aba, 0xe41c_64d4, 0x91f2_08ed, 0xc61b_6e89]
        );
    }

    #[test]
    fn update_then_verify() {
        let mut blob = vec![0u8; 20];
        blob.extend_from_slice(b"some shader-shaped payload");
        assert!(!verify_checksum(&blob));

        update_checksum(&mut blob);
        assert!(verify_checksum(&blob));

        // Any body mutation invalidates the stored digest.
        *blob.last_mut().unwrap() ^= 1;
        assert!(!verify_checksum(&blob));
    }

    #[test]
    fn header_bytes_outside_body_do_not_affect_digest() {
        let mut a = vec![0u8; 20];
        a.extend_from_slice(&[7u8; 40]);
        let mut b = a.clone();
        b[0] = 0xFF;
        b[19] = 0xFF;
        update_checksum(&mut a);
        update_checksum(&mut b);
        assert_eq!(a[4..20], b[4..20]);
    }

    #[test]
    fn undersized_blob_never_verifies() {
        assert!(!verify_checksum(&[0u8; 8]));
    }
}
