//! DXT1/DXT5/BC4/BC5 encoding.
//!
//! The color endpoints start from the luminance extremes of the block and
//! are refined by solving the least-squares system over the chosen selector
//! weights, then selectors are re-assigned against the refined palette. The
//! alpha word uses the block extremes directly.

use super::{clamp8, dither_block, expand5, expand6, RGB_BLOCK_BYTES};

/// A block of 16 RGB pixels indexed row-major (p = y * 4 + x), matching the
/// BCn selector bit order.
type ColorBlock = [[i32; 3]; 16];

fn gather_color_block(stream: &[u8]) -> ColorBlock {
    let mut block = [[0i32; 3]; 16];
    for x in 0..4 {
        for y in 0..4 {
            let i = (x * 4 + y) * 3;
            block[y * 4 + x] = [
                stream[i] as i32,
                stream[i + 1] as i32,
                stream[i + 2] as i32,
            ];
        }
    }
    block
}

#[inline]
fn to_565(c: [i32; 3]) -> u16 {
    let r = (c[0] * 31 + 127) / 255;
    let g = (c[1] * 63 + 127) / 255;
    let b = (c[2] * 31 + 127) / 255;
    ((r << 11) | (g << 5) | b) as u16
}

#[inline]
fn from_565(c: u16) -> [i32; 3] {
    [
        expand5((c >> 11) as u32 & 0x1F),
        expand6((c >> 5) as u32 & 0x3F),
        expand5(c as u32 & 0x1F),
    ]
}

/// The four palette colors for `c0 > c1` mode, matching the decoder's
/// interpolation arithmetic.
fn palette(c0: u16, c1: u16) -> [[i32; 3]; 4] {
    let e0 = from_565(c0);
    let e1 = from_565(c1);
    let mut p = [[0i32; 3]; 4];
    p[0] = e0;
    p[1] = e1;
    for c in 0..3 {
        p[2][c] = (2 * e0[c] + e1[c] + 1) / 3;
        p[3][c] = (e0[c] + 2 * e1[c] + 1) / 3;
    }
    p
}

fn assign_selectors(block: &ColorBlock, palette: &[[i32; 3]; 4]) -> (u32, u32) {
    let mut error = 0u32;
    let mut indices = 0u32;
    for (p, pixel) in block.iter().enumerate() {
        let mut best = (u32::MAX, 0u32);
        for (idx, color) in palette.iter().enumerate() {
            let dr = color[0] - pixel[0];
            let dg = color[1] - pixel[1];
            let db = color[2] - pixel[2];
            let e = (dr * dr + dg * dg + db * db) as u32;
            if e < best.0 {
                best = (e, idx as u32);
            }
        }
        error += best.0;
        indices |= best.1 << (p * 2);
    }
    (error, indices)
}

/// Interpolation weight of each palette index along the c0 -> c1 axis.
const SELECTOR_WEIGHT: [f32; 4] = [0.0, 1.0, 1.0 / 3.0, 2.0 / 3.0];

/// Solve the two-endpoint least-squares system for the current selector
/// assignment. Returns refined endpoints, or None when the system is
/// degenerate (all pixels on one endpoint).
fn refine_endpoints(block: &ColorBlock, indices: u32) -> Option<(u16, u16)> {
    let mut alpha = 0f32;
    let mut beta = 0f32;
    let mut gamma = 0f32;
    let mut b0 = [0f32; 3];
    let mut b1 = [0f32; 3];
    for (p, pixel) in block.iter().enumerate() {
        let t = SELECTOR_WEIGHT[((indices >> (p * 2)) & 3) as usize];
        let s = 1.0 - t;
        alpha += s * s;
        beta += s * t;
        gamma += t * t;
        for c in 0..3 {
            b0[c] += s * pixel[c] as f32;
            b1[c] += t * pixel[c] as f32;
        }
    }

    let det = alpha * gamma - beta * beta;
    if det.abs() < 1e-4 {
        return None;
    }

    let mut e0 = [0i32; 3];
    let mut e1 = [0i32; 3];
    for c in 0..3 {
        e0[c] = clamp8(((gamma * b0[c] - beta * b1[c]) / det).round() as i32);
        e1[c] = clamp8(((alpha * b1[c] - beta * b0[c]) / det).round() as i32);
    }
    Some((to_565(e0), to_565(e1)))
}

/// Encode one color block into a DXT1 word. Only the four-color mode is
/// emitted; solid blocks collapse onto a single endpoint.
fn encode_color_block(block: &ColorBlock) -> [u8; 8] {
    // Initial endpoints from the luminance extremes.
    let mut bright = 0;
    let mut dark = 0;
    let mut bright_luma = i32::MIN;
    let mut dark_luma = i32::MAX;
    for (p, pixel) in block.iter().enumerate() {
        let luma = pixel[0] * 76 + pixel[1] * 150 + pixel[2] * 29;
        if luma > bright_luma {
            bright_luma = luma;
            bright = p;
        }
        if luma < dark_luma {
            dark_luma = luma;
            dark = p;
        }
    }

    let mut c0 = to_565(block[bright]);
    let mut c1 = to_565(block[dark]);
    if c0 < c1 {
        std::mem::swap(&mut c0, &mut c1);
    }
    if c0 == c1 {
        return pack_color(c0, c1, 0);
    }

    let (error, mut indices) = assign_selectors(block, &palette(c0, c1));

    // One least-squares refinement pass over the chosen selectors.
    if let Some((mut r0, mut r1)) = refine_endpoints(block, indices) {
        if r0 < r1 {
            std::mem::swap(&mut r0, &mut r1);
        }
        if r0 != r1 && (r0, r1) != (c0, c1) {
            let (refined_error, refined_indices) = assign_selectors(block, &palette(r0, r1));
            if refined_error < error {
                c0 = r0;
                c1 = r1;
                indices = refined_indices;
            }
        }
    }

    pack_color(c0, c1, indices)
}

fn pack_color(c0: u16, c1: u16, indices: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[0..2].copy_from_slice(&c0.to_le_bytes());
    out[2..4].copy_from_slice(&c1.to_le_bytes());
    out[4..8].copy_from_slice(&indices.to_le_bytes());
    out
}

/// Encode 16 single-channel samples (row-major) into a BC smooth-alpha word.
/// Equal extremes fall back to the six-interpolant mode, which reproduces a
/// flat block exactly.
fn encode_alpha_word(values: &[u8; 16]) -> [u8; 8] {
    let mut min = 255u8;
    let mut max = 0u8;
    for &v in values {
        min = min.min(v);
        max = max.max(v);
    }

    let (a0, a1) = if min == max { (min, max) } else { (max, min) };

    let mut word = a0 as u64 | (a1 as u64) << 8;
    let palette = alpha_palette(a0, a1);
    for (p, &v) in values.iter().enumerate() {
        let mut best = (i32::MAX, 0u64);
        for (idx, &entry) in palette.iter().enumerate() {
            let d = (entry as i32 - v as i32).abs();
            if d < best.0 {
                best = (d, idx as u64);
            }
        }
        word |= best.1 << (16 + p * 3);
    }
    word.to_le_bytes()
}

/// The decoder's alpha palette for an endpoint pair.
fn alpha_palette(a0: u8, a1: u8) -> [u8; 8] {
    let a0 = a0 as u16;
    let a1 = a1 as u16;
    let mut p = [0u8; 8];
    p[0] = a0 as u8;
    p[1] = a1 as u8;
    if a0 > a1 {
        for i in 2..8u16 {
            p[i as usize] = (((8 - i) * a0 + (i - 1) * a1 + 3) / 7) as u8;
        }
    } else {
        for i in 2..6u16 {
            p[i as usize] = (((6 - i) * a0 + (i - 1) * a1 + 2) / 5) as u8;
        }
        p[6] = 0;
        p[7] = 255;
    }
    p
}

pub(crate) fn compress_dxt1(src: &[u8], dst: &mut [u8], blocks: usize, dither: bool) {
    for b in 0..blocks {
        let stream = &src[b * RGB_BLOCK_BYTES..(b + 1) * RGB_BLOCK_BYTES];
        let block = if dither {
            let mut copy = [0u8; RGB_BLOCK_BYTES];
            copy.copy_from_slice(stream);
            dither_block(&mut copy, [5, 6, 5]);
            gather_color_block(&copy)
        } else {
            gather_color_block(stream)
        };
        dst[b * 8..(b + 1) * 8].copy_from_slice(&encode_color_block(&block));
    }
}

/// Whole-pixel kernel for Dxt5: a smooth-alpha word followed by the DXT1
/// color word per block. `src` starts at the first pixel of the kernel's
/// first block row.
pub(crate) fn compress_dxt5(src: &[u32], dst: &mut [u8], blocks: usize, width: usize) {
    let blocks_per_row = width / 4;
    for b in 0..blocks {
        let bx = b % blocks_per_row;
        let by = b / blocks_per_row;
        let origin = by * 4 * width + bx * 4;

        let mut color = [[0i32; 3]; 16];
        let mut alpha = [0u8; 16];
        for y in 0..4 {
            for x in 0..4 {
                let pixel = src[origin + y * width + x];
                let p = y * 4 + x;
                color[p] = [
                    (pixel & 0xFF) as i32,
                    ((pixel >> 8) & 0xFF) as i32,
                    ((pixel >> 16) & 0xFF) as i32,
                ];
                alpha[p] = (pixel >> 24) as u8;
            }
        }

        dst[b * 16..b * 16 + 8].copy_from_slice(&encode_alpha_word(&alpha));
        dst[b * 16 + 8..(b + 1) * 16].copy_from_slice(&encode_color_block(&color));
    }
}

fn gather_channel(stream: &[u8], channel: usize) -> [u8; 16] {
    let mut values = [0u8; 16];
    for x in 0..4 {
        for y in 0..4 {
            values[y * 4 + x] = stream[(x * 4 + y) * 3 + channel];
        }
    }
    values
}

pub(crate) fn compress_bc4(src: &[u8], dst: &mut [u8], blocks: usize) {
    for b in 0..blocks {
        let stream = &src[b * RGB_BLOCK_BYTES..(b + 1) * RGB_BLOCK_BYTES];
        let word = encode_alpha_word(&gather_channel(stream, 0));
        dst[b * 8..(b + 1) * 8].copy_from_slice(&word);
    }
}

pub(crate) fn compress_bc5(src: &[u8], dst: &mut [u8], blocks: usize) {
    for b in 0..blocks {
        let stream = &src[b * RGB_BLOCK_BYTES..(b + 1) * RGB_BLOCK_BYTES];
        let r = encode_alpha_word(&gather_channel(stream, 0));
        let g = encode_alpha_word(&gather_channel(stream, 1));
        dst[b * 16..b * 16 + 8].copy_from_slice(&r);
        dst[b * 16 + 8..(b + 1) * 16].copy_from_slice(&g);
    }
}
