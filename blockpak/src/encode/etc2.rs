//! ETC2 RGB and RGBA encoding.
//!
//! The RGB kernel runs the full ETC1 search and then offers the block to the
//! three ETC2-only modes: T (one lone color plus a painted line), H (two
//! painted lines) and planar (a color gradient). The candidate with the
//! lowest weighted squared error wins. The heuristics flag prunes candidates
//! whose per-block statistics predict an inferior result.

use super::{
    clamp8, eac, etc1, etc1::Encoded, expand4, expand6, expand7, weighted_error, ETC_DISTANCE,
    ALPHA_BLOCK_BYTES, RGB_BLOCK_BYTES,
};

/// Luminance contrast below which the T and H clustering modes are skipped
/// by the heuristics: low-contrast blocks are served by the ETC1 and planar
/// candidates.
const TH_LUMA_RANGE: i32 = 24;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Signalled {
    Diff,
    T,
    H,
    Planar,
}

#[inline]
fn sign_extend3(c: u32) -> i32 {
    ((c as i32) << 29) >> 29
}

/// The mode a decoder would detect for `hi`, following the differential-mode
/// channel overflow rules. Packers search their free bits until the intended
/// mode is signalled.
fn signalled_mode(hi: u32) -> Signalled {
    let r = ((hi >> 27) & 0x1F) as i32 + sign_extend3((hi >> 24) & 0x7);
    if !(0..=31).contains(&r) {
        return Signalled::T;
    }
    let g = ((hi >> 19) & 0x1F) as i32 + sign_extend3((hi >> 16) & 0x7);
    if !(0..=31).contains(&g) {
        return Signalled::H;
    }
    let b = ((hi >> 11) & 0x1F) as i32 + sign_extend3((hi >> 8) & 0x7);
    if !(0..=31).contains(&b) {
        return Signalled::Planar;
    }
    Signalled::Diff
}

fn pack_t(c0: [u32; 3], c1: [u32; 3], d_idx: u32) -> Option<u32> {
    let fixed = ((c0[0] >> 2) << 27)
        | ((c0[0] & 3) << 24)
        | (c0[1] << 20)
        | (c0[2] << 16)
        | (c1[0] << 12)
        | (c1[1] << 8)
        | (c1[2] << 4)
        | ((d_idx >> 1) << 2)
        | (d_idx & 1)
        | 0x2;
    for free in 0..16u32 {
        let hi = fixed | (free & 1) << 26 | (free >> 1) << 29;
        if signalled_mode(hi) == Signalled::T {
            return Some(hi);
        }
    }
    None
}

/// Pack an H-mode word. The distance LSB is derived from the base color
/// ordering, so the colors (and the matching selector halves) are swapped
/// when the natural ordering disagrees with the requested distance.
fn pack_h(c0: [u32; 3], c1: [u32; 3], d_idx: u32, lo: u32) -> Option<(u32, u32)> {
    let value = |c: [u32; 3]| (c[0] << 8) | (c[1] << 4) | c[2];
    let (c0, c1, lo) = if (value(c0) >= value(c1)) as u32 == (d_idx & 1) {
        (c0, c1, lo)
    } else if (value(c1) >= value(c0)) as u32 == (d_idx & 1) {
        // Swapping the base colors exchanges the paint pairs 0/1 and 2/3,
        // which is a flip of every selector MSB.
        (c1, c0, lo ^ 0xFFFF_0000)
    } else {
        return None;
    };

    let fixed = (c0[0] << 27)
        | ((c0[1] >> 1) << 24)
        | ((c0[1] & 1) << 20)
        | ((c0[2] >> 3) << 19)
        | (((c0[2] >> 1) & 3) << 16)
        | ((c0[2] & 1) << 15)
        | (c1[0] << 11)
        | (c1[1] << 7)
        | (c1[2] << 3)
        | (((d_idx >> 2) & 1) << 2)
        | ((d_idx >> 1) & 1)
        | 0x2;
    for free in 0..32u32 {
        let hi = fixed | (free & 1) << 18 | ((free >> 1) & 7) << 21 | (free >> 4) << 31;
        if signalled_mode(hi) == Signalled::H {
            return Some((hi, lo));
        }
    }
    None
}

fn pack_planar(ro: u32, go: u32, bo: u32, rh: u32) -> Option<u32> {
    let fixed = (ro << 25)
        | ((go >> 6) << 24)
        | ((go & 0x3F) << 17)
        | ((bo >> 5) << 16)
        | (((bo >> 3) & 3) << 11)
        | (((bo >> 1) & 3) << 8)
        | ((bo & 1) << 7)
        | ((rh >> 1) << 2)
        | (rh & 1)
        | 0x2;
    for free in 0..64u32 {
        let hi = fixed
            | (free & 1) << 10
            | ((free >> 1) & 7) << 13
            | ((free >> 4) & 1) << 23
            | (free >> 5) << 31;
        if signalled_mode(hi) == Signalled::Planar {
            return Some(hi);
        }
    }
    None
}

fn t_paint(c0: [u32; 3], c1: [u32; 3], d: i32) -> [[i32; 3]; 4] {
    let e0 = c0.map(expand4);
    let e1 = c1.map(expand4);
    [
        e0,
        [e1[0] + d, e1[1] + d, e1[2] + d],
        e1,
        [e1[0] - d, e1[1] - d, e1[2] - d],
    ]
}

fn h_paint(c0: [u32; 3], c1: [u32; 3], d: i32) -> [[i32; 3]; 4] {
    let e0 = c0.map(expand4);
    let e1 = c1.map(expand4);
    [
        [e0[0] + d, e0[1] + d, e0[2] + d],
        [e0[0] - d, e0[1] - d, e0[2] - d],
        [e1[0] + d, e1[1] + d, e1[2] + d],
        [e1[0] - d, e1[1] - d, e1[2] - d],
    ]
}

/// Pick the best paint color per pixel, returning the total error and the
/// selector word.
fn assign_selectors(rgb: &[u8], paint: &[[i32; 3]; 4]) -> (u32, u32) {
    let clamped = paint.map(|c| c.map(clamp8));
    let mut error = 0u32;
    let mut lo = 0u32;
    for i in 0..16 {
        let pixel = &rgb[i * 3..i * 3 + 3];
        let mut best = (u32::MAX, 0u32);
        for (idx, c) in clamped.iter().enumerate() {
            let e = weighted_error(c[0], c[1], c[2], pixel);
            if e < best.0 {
                best = (e, idx as u32);
            }
        }
        error += best.0;
        lo |= ((best.1 >> 1) << 16 | (best.1 & 1)) << i;
    }
    (error, lo)
}

#[inline]
fn luma(pixel: &[u8]) -> i32 {
    (pixel[0] as i32 * 76 + pixel[1] as i32 * 150 + pixel[2] as i32 * 29) >> 8
}

#[inline]
fn quant_to(v: f32, levels: u32) -> u32 {
    ((v.clamp(0.0, 255.0) * levels as f32 / 255.0) + 0.5).min(levels as f32) as u32
}

/// Least-squares plane fit and the quantized planar candidate.
///
/// With `skip_above` set, the candidate is rejected early when even the
/// unquantized fit residual is no better than the error to beat.
fn planar_candidate(rgb: &[u8], skip_above: Option<u32>) -> Option<Encoded> {
    let mut mean = [0f32; 3];
    let mut sx = [0f32; 3];
    let mut sy = [0f32; 3];
    for x in 0..4 {
        for y in 0..4 {
            let i = (x * 4 + y) * 3;
            for c in 0..3 {
                let v = rgb[i + c] as f32;
                mean[c] += v;
                sx[c] += v * (x as f32 - 1.5);
                sy[c] += v * (y as f32 - 1.5);
            }
        }
    }
    for c in 0..3 {
        mean[c] /= 16.0;
        // Sum of squared centered coordinates over the block.
        sx[c] /= 20.0;
        sy[c] /= 20.0;
    }

    if let Some(limit) = skip_above {
        let weights = [3.0f32, 6.0, 1.0];
        let mut residual = 0f32;
        for x in 0..4 {
            for y in 0..4 {
                let i = (x * 4 + y) * 3;
                for c in 0..3 {
                    let fit = mean[c] + sx[c] * (x as f32 - 1.5) + sy[c] * (y as f32 - 1.5);
                    let d = fit - rgb[i + c] as f32;
                    residual += weights[c] * d * d;
                }
            }
        }
        if residual as u32 >= limit {
            return None;
        }
    }

    let mut origin = [0u32; 3];
    let mut horizontal = [0u32; 3];
    let mut vertical = [0u32; 3];
    for c in 0..3 {
        let o = mean[c] - 1.5 * (sx[c] + sy[c]);
        let levels = if c == 1 { 127 } else { 63 };
        origin[c] = quant_to(o, levels);
        horizontal[c] = quant_to(o + 4.0 * sx[c], levels);
        vertical[c] = quant_to(o + 4.0 * sy[c], levels);
    }

    let hi = pack_planar(origin[0], origin[1], origin[2], horizontal[0])?;
    let lo = (horizontal[1] << 25)
        | (horizontal[2] << 19)
        | (vertical[0] << 13)
        | (vertical[1] << 6)
        | vertical[2];

    // Evaluate with the exact reconstruction arithmetic.
    let expand = |c: usize, v: u32| if c == 1 { expand7(v) } else { expand6(v) };
    let mut error = 0u32;
    for x in 0..4i32 {
        for y in 0..4i32 {
            let i = ((x * 4 + y) * 3) as usize;
            let mut rec = [0i32; 3];
            for c in 0..3 {
                let o = expand(c, origin[c]);
                let h = expand(c, horizontal[c]);
                let v = expand(c, vertical[c]);
                rec[c] = clamp8((x * (h - o) + y * (v - o) + 4 * o + 2) >> 2);
            }
            error += weighted_error(rec[0], rec[1], rec[2], &rgb[i..i + 3]);
        }
    }

    Some(Encoded { hi, lo, error })
}

/// Cluster the block around its mid luminance and try the T and H paint
/// modes for every distance table entry.
fn th_candidate(rgb: &[u8]) -> Option<Encoded> {
    let mut lumas = [0i32; 16];
    for i in 0..16 {
        lumas[i] = luma(&rgb[i * 3..i * 3 + 3]);
    }
    let min = *lumas.iter().min()?;
    let max = *lumas.iter().max()?;
    if min == max {
        return None;
    }
    let mid = (min + max) / 2;

    let mut sums = [[0u32; 3]; 2];
    let mut counts = [0u32; 2];
    for i in 0..16 {
        let group = (lumas[i] > mid) as usize;
        counts[group] += 1;
        for c in 0..3 {
            sums[group][c] += rgb[i * 3 + c] as u32;
        }
    }
    let quantize = |sum: [u32; 3], count: u32| {
        [
            super::quant4(((sum[0] + count / 2) / count) as u8),
            super::quant4(((sum[1] + count / 2) / count) as u8),
            super::quant4(((sum[2] + count / 2) / count) as u8),
        ]
    };
    let c_lo = quantize(sums[0], counts[0]);
    let c_hi = quantize(sums[1], counts[1]);

    let mut best: Option<Encoded> = None;
    let better = |best: &Option<Encoded>, error: u32| best.as_ref().map_or(true, |b| error < b.error);

    for (d_idx, &d) in ETC_DISTANCE.iter().enumerate() {
        let d_idx = d_idx as u32;
        for (lone, line) in [(c_lo, c_hi), (c_hi, c_lo)] {
            let (error, lo) = assign_selectors(rgb, &t_paint(lone, line, d));
            if better(&best, error) {
                if let Some(hi) = pack_t(lone, line, d_idx) {
                    best = Some(Encoded { hi, lo, error });
                }
            }
        }

        let (error, lo) = assign_selectors(rgb, &h_paint(c_lo, c_hi, d));
        if better(&best, error) {
            if let Some((hi, lo)) = pack_h(c_lo, c_hi, d_idx, lo) {
                best = Some(Encoded { hi, lo, error });
            }
        }
    }
    best
}

/// Encode one 48-byte RGB block with the full ETC2 mode set.
pub(crate) fn encode_rgb_block(rgb: &[u8], use_heuristics: bool) -> Encoded {
    let mut best = etc1::encode_block(rgb);
    if best.error == 0 {
        return best;
    }

    let skip_above = use_heuristics.then_some(best.error);
    if let Some(candidate) = planar_candidate(rgb, skip_above) {
        if candidate.error < best.error {
            best = candidate;
        }
    }

    let mut range = 0;
    if use_heuristics {
        let mut min = i32::MAX;
        let mut max = i32::MIN;
        for i in 0..16 {
            let l = luma(&rgb[i * 3..i * 3 + 3]);
            min = min.min(l);
            max = max.max(l);
        }
        range = max - min;
    }
    if !use_heuristics || range >= TH_LUMA_RANGE {
        if let Some(candidate) = th_candidate(rgb) {
            if candidate.error < best.error {
                best = candidate;
            }
        }
    }

    best
}

pub(crate) fn compress_rgb(src: &[u8], dst: &mut [u8], blocks: usize, use_heuristics: bool) {
    for b in 0..blocks {
        let block = &src[b * RGB_BLOCK_BYTES..(b + 1) * RGB_BLOCK_BYTES];
        let word = encode_rgb_block(block, use_heuristics).to_bytes();
        dst[b * 8..(b + 1) * 8].copy_from_slice(&word);
    }
}

/// Whole-pixel kernel for Etc2Rgba: an EAC alpha word followed by the ETC2
/// RGB word per block. Reads the row-major image directly; `src` starts at
/// the first pixel of the kernel's first block row.
pub(crate) fn compress_rgba(
    src: &[u32],
    dst: &mut [u8],
    blocks: usize,
    width: usize,
    use_heuristics: bool,
) {
    let blocks_per_row = width / 4;
    for b in 0..blocks {
        let bx = b % blocks_per_row;
        let by = b / blocks_per_row;
        let origin = by * 4 * width + bx * 4;

        let mut rgb = [0u8; RGB_BLOCK_BYTES];
        let mut alpha = [0u8; ALPHA_BLOCK_BYTES];
        for x in 0..4 {
            for y in 0..4 {
                let pixel = src[origin + y * width + x];
                let i = x * 4 + y;
                rgb[i * 3] = pixel as u8;
                rgb[i * 3 + 1] = (pixel >> 8) as u8;
                rgb[i * 3 + 2] = (pixel >> 16) as u8;
                alpha[i] = (pixel >> 24) as u8;
            }
        }

        let alpha_word = eac::encode_block(&alpha);
        let color_word = encode_rgb_block(&rgb, use_heuristics).to_bytes();
        dst[b * 16..b * 16 + 8].copy_from_slice(&alpha_word);
        dst[b * 16 + 8..b * 16 + 16].copy_from_slice(&color_word);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(word: &[u8; 8]) -> [u8; 64] {
        let mut out = [0u8; 64];
        blockdec::etc_rgb(word, &mut out, 16);
        out
    }

    #[test]
    fn pack_t_signals_t_mode() {
        for c0 in [[0u32, 0, 0], [15, 15, 15], [3, 14, 9], [12, 1, 7]] {
            for d_idx in 0..8 {
                let hi = pack_t(c0, [12, 1, 7], d_idx).unwrap();
                assert_eq!(signalled_mode(hi), Signalled::T);
            }
        }
    }

    #[test]
    fn pack_h_signals_h_mode() {
        for c0 in [[0u32, 0, 0], [15, 15, 15], [3, 14, 9]] {
            for d_idx in 0..8 {
                if let Some((hi, _)) = pack_h(c0, [12, 1, 7], d_idx, 0) {
                    assert_eq!(signalled_mode(hi), Signalled::H);
                }
            }
        }
    }

    #[test]
    fn pack_planar_signals_planar_mode() {
        for bo in [0u32, 31, 32, 63] {
            for ro in [0u32, 63] {
                let hi = pack_planar(ro, 100, bo, 17).unwrap();
                assert_eq!(signalled_mode(hi), Signalled::Planar);
            }
        }
    }

    #[test]
    fn t_mode_round_trips_through_decoder() {
        let c0 = [3u32, 14, 9];
        let c1 = [12u32, 1, 7];
        let hi = pack_t(c0, c1, 4).unwrap();
        // All selectors pick paint color 2, the line base color.
        let lo = 0xFFFF_0000u32;
        let mut word = [0u8; 8];
        word[0..4].copy_from_slice(&hi.to_be_bytes());
        word[4..8].copy_from_slice(&lo.to_be_bytes());

        let out = decode(&word);
        for pixel in out.chunks_exact(4) {
            assert_eq!(pixel[0] as i32, expand4(c1[0]));
            assert_eq!(pixel[1] as i32, expand4(c1[1]));
            assert_eq!(pixel[2] as i32, expand4(c1[2]));
        }
    }

    #[test]
    fn smooth_gradient_prefers_planar() {
        // A linear ramp is exactly representable by the planar plane apart
        // from channel quantization.
        let mut rgb = [0u8; 48];
        for x in 0..4 {
            for y in 0..4 {
                let i = (x * 4 + y) * 3;
                rgb[i] = (40 + x * 20) as u8;
                rgb[i + 1] = (60 + y * 12) as u8;
                rgb[i + 2] = 90;
            }
        }
        let encoded = encode_rgb_block(&rgb, true);
        let out = decode(&encoded.to_bytes());
        for x in 0..4 {
            for y in 0..4 {
                let offset = y * 16 + x * 4;
                assert!((out[offset] as i32 - (40 + x as i32 * 20)).abs() <= 8);
                assert!((out[offset + 1] as i32 - (60 + y as i32 * 12)).abs() <= 8);
                assert!((out[offset + 2] as i32 - 90).abs() <= 8);
            }
        }
    }

    #[test]
    fn two_cluster_block_improves_over_etc1() {
        // Two well-separated colors scattered so that neither sub-block
        // split isolates them. T/H clustering handles this layout.
        let a = [200u8, 30, 40];
        let b = [20u8, 160, 220];
        let mut rgb = [0u8; 48];
        for i in 0..16 {
            let c = if (i * 7) % 3 == 0 { a } else { b };
            rgb[i * 3..i * 3 + 3].copy_from_slice(&c);
        }
        let etc1_only = etc1::encode_block(&rgb);
        let full = encode_rgb_block(&rgb, false);
        assert!(full.error <= etc1_only.error);
    }

    #[test]
    fn heuristics_do_not_change_flat_blocks() {
        let mut rgb = [0u8; 48];
        for p in rgb.chunks_exact_mut(3) {
            p.copy_from_slice(&[77, 77, 77]);
        }
        let fast = encode_rgb_block(&rgb, true);
        let slow = encode_rgb_block(&rgb, false);
        assert_eq!(fast.error, slow.error);
    }
}
