//! EAC word encoding: the ETC2 alpha plane and the R11/RG11 formats.
//!
//! One 64-bit word holds an 8-bit base, a 4-bit multiplier, a 4-bit table
//! row and 16 3-bit selectors. The R11 reconstruction is the same palette
//! scaled into 11 bits, so a single 8-bit search serves both word kinds: the
//! `base * 8 + 4` expansion reduces back to the base after the final shift.

use super::{clamp8, ALPHA_BLOCK_BYTES, EAC_MODIFIER, RGB_BLOCK_BYTES};

/// Encode 16 single-channel samples (in block column-major order) into one
/// EAC word.
pub(crate) fn encode_block(values: &[u8; 16]) -> [u8; 8] {
    let mut min = 255u8;
    let mut max = 0u8;
    for &v in values {
        min = min.min(v);
        max = max.max(v);
    }

    if min == max {
        // Table 13 has a zero modifier at selector 4, reproducing the base.
        let mut word = (min as u64) << 56 | 1 << 52 | 13 << 48;
        for i in 0..16 {
            word |= 4 << (45 - 3 * i);
        }
        return word.to_be_bytes();
    }

    let base = (min as i32 + max as i32 + 1) / 2;
    let range = max as i32 - min as i32;

    let mut best = (u32::MAX, 0u64);
    for (table_idx, table) in EAC_MODIFIER.iter().enumerate() {
        let span = table[7] - table[3];
        let center = (range + span - 1) / span;
        for mult in center - 1..=center + 1 {
            let mult = mult.clamp(1, 15);
            let (error, selectors) = eval_table(values, base, mult, table);
            if error < best.0 {
                let word = (base as u64) << 56
                    | (mult as u64) << 52
                    | (table_idx as u64) << 48
                    | selectors;
                best = (error, word);
            }
        }
    }

    best.1.to_be_bytes()
}

fn eval_table(values: &[u8; 16], base: i32, mult: i32, table: &[i32; 8]) -> (u32, u64) {
    let mut error = 0u32;
    let mut selectors = 0u64;
    for (i, &v) in values.iter().enumerate() {
        let mut best = (u32::MAX, 0u64);
        for (sel, &modifier) in table.iter().enumerate() {
            let reconstructed = clamp8(base + modifier * mult);
            let d = reconstructed - v as i32;
            let e = (d * d) as u32;
            if e < best.0 {
                best = (e, sel as u64);
            }
        }
        error += best.0;
        selectors |= best.1 << (45 - 3 * i);
    }
    (error, selectors)
}

/// Alpha-plane kernel: one EAC word per 16-byte stream block.
pub(crate) fn compress_alpha(src: &[u8], dst: &mut [u8], blocks: usize) {
    for b in 0..blocks {
        let mut plane = [0u8; 16];
        plane.copy_from_slice(&src[b * ALPHA_BLOCK_BYTES..(b + 1) * ALPHA_BLOCK_BYTES]);
        dst[b * 8..(b + 1) * 8].copy_from_slice(&encode_block(&plane));
    }
}

/// EacR11 kernel: the red channel of the RGB stream, one word per block.
pub(crate) fn compress_r(src: &[u8], dst: &mut [u8], blocks: usize) {
    for b in 0..blocks {
        let block = &src[b * RGB_BLOCK_BYTES..(b + 1) * RGB_BLOCK_BYTES];
        let mut channel = [0u8; 16];
        for i in 0..16 {
            channel[i] = block[i * 3];
        }
        dst[b * 8..(b + 1) * 8].copy_from_slice(&encode_block(&channel));
    }
}

/// EacRg11 kernel: independent red and green words per block.
pub(crate) fn compress_rg(src: &[u8], dst: &mut [u8], blocks: usize) {
    for b in 0..blocks {
        let block = &src[b * RGB_BLOCK_BYTES..(b + 1) * RGB_BLOCK_BYTES];
        let mut r = [0u8; 16];
        let mut g = [0u8; 16];
        for i in 0..16 {
            r[i] = block[i * 3];
            g[i] = block[i * 3 + 1];
        }
        dst[b * 16..b * 16 + 8].copy_from_slice(&encode_block(&r));
        dst[b * 16 + 8..(b + 1) * 16].copy_from_slice(&encode_block(&g));
    }
}
