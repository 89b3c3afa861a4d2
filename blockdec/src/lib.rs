#![no_std]
//! Safe, no_std per-block decoders for ETC1/ETC2/EAC and BC1/BC3/BC4/BC5
//! compressed texture blocks.
//!
//! Each function decodes a single compressed block into a caller-provided
//! buffer with `destination_pitch` many bytes per output row. Callers drive
//! the block loop themselves, which keeps these routines free of any
//! assumptions about image layout or block ordering.

// Used information sources:
// https://registry.khronos.org/OpenGL/extensions/OES/OES_compressed_ETC1_RGB8_texture.txt
// https://registry.khronos.org/DataFormat/specs/1.3/dataformat.1.3.html#ETC2
// https://docs.microsoft.com/en-us/windows/win32/direct3d10/d3d10-graphics-programming-guide-resources-block-compression

/// Modifier table shared by ETC1 and the ETC2 differential/individual modes.
/// Rows are selected by the per-sub-block codeword, columns by the two
/// selector bits as (msb << 1) | lsb.
const ETC_MODIFIER: [[i32; 4]; 8] = [
    [2, 8, -2, -8],
    [5, 17, -5, -17],
    [9, 29, -9, -29],
    [13, 42, -13, -42],
    [18, 60, -18, -60],
    [24, 80, -24, -80],
    [33, 106, -33, -106],
    [47, 183, -47, -183],
];

/// Paint color distances for the ETC2 T and H modes.
const ETC_DISTANCE: [i32; 8] = [3, 6, 11, 16, 23, 32, 41, 64];

/// EAC modifier table used by the ETC2 alpha block and the R11/RG11 formats.
const EAC_MODIFIER: [[i32; 8]; 16] = [
    [-3, -6, -9, -15, 2, 5, 8, 14],
    [-3, -7, -10, -13, 2, 6, 9, 12],
    [-2, -5, -8, -13, 1, 4, 7, 12],
    [-2, -4, -6, -13, 1, 3, 5, 12],
    [-3, -6, -8, -12, 2, 5, 7, 11],
    [-3, -7, -9, -11, 2, 6, 8, 10],
    [-4, -7, -8, -11, 3, 6, 7, 10],
    [-3, -5, -8, -11, 2, 4, 7, 10],
    [-2, -6, -8, -10, 1, 5, 7, 9],
    [-2, -5, -8, -10, 1, 4, 7, 9],
    [-2, -4, -8, -10, 1, 3, 7, 9],
    [-2, -5, -7, -10, 1, 4, 6, 9],
    [-3, -4, -7, -10, 2, 3, 6, 9],
    [-1, -2, -3, -10, 0, 1, 2, 9],
    [-4, -6, -8, -9, 3, 5, 7, 8],
    [-3, -5, -7, -9, 2, 4, 6, 8],
];

#[inline]
fn clamp8(x: i32) -> u8 {
    x.clamp(0, 255) as u8
}

#[inline]
fn expand4(c: u32) -> i32 {
    ((c << 4) | c) as i32
}

#[inline]
fn expand5(c: u32) -> i32 {
    ((c << 3) | (c >> 2)) as i32
}

#[inline]
fn expand6(c: u32) -> i32 {
    ((c << 2) | (c >> 4)) as i32
}

#[inline]
fn expand7(c: u32) -> i32 {
    ((c << 1) | (c >> 6)) as i32
}

#[inline]
fn sign_extend3(c: u32) -> i32 {
    ((c as i32) << 29) >> 29
}

// The ETC block word is specified big endian: byte 0 holds bits 63..56.
#[inline]
fn etc_words(block: &[u8]) -> (u32, u32) {
    let hi = u32::from_be_bytes(block[0..4].try_into().unwrap());
    let lo = u32::from_be_bytes(block[4..8].try_into().unwrap());
    (hi, lo)
}

// Selector for pixel `i` in ETC column-major order (i = x * 4 + y).
#[inline]
fn etc_selector(lo: u32, i: usize) -> usize {
    (((lo >> (16 + i)) & 1) << 1 | ((lo >> i) & 1)) as usize
}

/// Decode 8 bytes of an ETC1 or ETC2 RGB block to RGBA8 with
/// `destination_pitch` many bytes per output row. Alpha is set to 255.
///
/// # Examples
///
/// ```rust
/// // Decode a single 4x4 pixel block.
/// let compressed_block = [0u8; 8];
/// let mut decompressed_block = [0u8; 4 * 4 * 4];
/// blockdec::etc_rgb(&compressed_block, &mut decompressed_block, 4 * 4);
/// ```
pub fn etc_rgb(compressed_block: &[u8], decompressed_block: &mut [u8], destination_pitch: usize) {
    let (hi, lo) = etc_words(compressed_block);

    if hi & 0x2 != 0 {
        // Differential encoding, or one of the overflow-signalled ETC2 modes.
        let r0 = ((hi >> 27) & 0x1F) as i32;
        let dr = sign_extend3((hi >> 24) & 0x7);
        if r0 + dr < 0 || r0 + dr > 31 {
            return decode_t(hi, lo, decompressed_block, destination_pitch);
        }

        let g0 = ((hi >> 19) & 0x1F) as i32;
        let dg = sign_extend3((hi >> 16) & 0x7);
        if g0 + dg < 0 || g0 + dg > 31 {
            return decode_h(hi, lo, decompressed_block, destination_pitch);
        }

        let b0 = ((hi >> 11) & 0x1F) as i32;
        let db = sign_extend3((hi >> 8) & 0x7);
        if b0 + db < 0 || b0 + db > 31 {
            return decode_planar(hi, lo, decompressed_block, destination_pitch);
        }

        let base0 = [
            expand5(r0 as u32),
            expand5(g0 as u32),
            expand5(b0 as u32),
        ];
        let base1 = [
            expand5((r0 + dr) as u32),
            expand5((g0 + dg) as u32),
            expand5((b0 + db) as u32),
        ];
        decode_individual_or_diff(hi, lo, base0, base1, decompressed_block, destination_pitch);
    } else {
        let base0 = [
            expand4((hi >> 28) & 0xF),
            expand4((hi >> 20) & 0xF),
            expand4((hi >> 12) & 0xF),
        ];
        let base1 = [
            expand4((hi >> 24) & 0xF),
            expand4((hi >> 16) & 0xF),
            expand4((hi >> 8) & 0xF),
        ];
        decode_individual_or_diff(hi, lo, base0, base1, decompressed_block, destination_pitch);
    }
}

fn decode_individual_or_diff(
    hi: u32,
    lo: u32,
    base0: [i32; 3],
    base1: [i32; 3],
    out: &mut [u8],
    pitch: usize,
) {
    let cw0 = ((hi >> 5) & 0x7) as usize;
    let cw1 = ((hi >> 2) & 0x7) as usize;
    let flip = hi & 1 != 0;

    for i in 0..16 {
        let x = i / 4;
        let y = i % 4;
        // flip 0 splits the block into two 2x4 column halves, flip 1 into
        // two 4x2 row halves.
        let second = if flip { y >= 2 } else { x >= 2 };
        let (base, cw) = if second { (base1, cw1) } else { (base0, cw0) };
        let modifier = ETC_MODIFIER[cw][etc_selector(lo, i)];

        let offset = y * pitch + x * 4;
        out[offset] = clamp8(base[0] + modifier);
        out[offset + 1] = clamp8(base[1] + modifier);
        out[offset + 2] = clamp8(base[2] + modifier);
        out[offset + 3] = 255;
    }
}

fn decode_t(hi: u32, lo: u32, out: &mut [u8], pitch: usize) {
    let r0 = ((hi >> 27) & 0x3) << 2 | ((hi >> 24) & 0x3);
    let g0 = (hi >> 20) & 0xF;
    let b0 = (hi >> 16) & 0xF;
    let r1 = (hi >> 12) & 0xF;
    let g1 = (hi >> 8) & 0xF;
    let b1 = (hi >> 4) & 0xF;
    let d = ETC_DISTANCE[(((hi >> 2) & 0x3) << 1 | (hi & 1)) as usize];

    let c0 = [expand4(r0), expand4(g0), expand4(b0)];
    let c1 = [expand4(r1), expand4(g1), expand4(b1)];
    let paint = [
        c0,
        [c1[0] + d, c1[1] + d, c1[2] + d],
        c1,
        [c1[0] - d, c1[1] - d, c1[2] - d],
    ];
    put_paint(lo, &paint, out, pitch);
}

fn decode_h(hi: u32, lo: u32, out: &mut [u8], pitch: usize) {
    let r0 = (hi >> 27) & 0xF;
    let g0 = ((hi >> 24) & 0x7) << 1 | ((hi >> 20) & 1);
    let b0 = ((hi >> 19) & 1) << 3 | ((hi >> 16) & 0x3) << 1 | ((hi >> 15) & 1);
    let r1 = (hi >> 11) & 0xF;
    let g1 = (hi >> 7) & 0xF;
    let b1 = (hi >> 3) & 0xF;

    // The distance LSB is derived from the ordering of the two base colors.
    let v0 = (r0 << 8) | (g0 << 4) | b0;
    let v1 = (r1 << 8) | (g1 << 4) | b1;
    let idx = ((hi >> 2) & 1) << 2 | (hi & 1) << 1 | (v0 >= v1) as u32;
    let d = ETC_DISTANCE[idx as usize];

    let c0 = [expand4(r0), expand4(g0), expand4(b0)];
    let c1 = [expand4(r1), expand4(g1), expand4(b1)];
    let paint = [
        [c0[0] + d, c0[1] + d, c0[2] + d],
        [c0[0] - d, c0[1] - d, c0[2] - d],
        [c1[0] + d, c1[1] + d, c1[2] + d],
        [c1[0] - d, c1[1] - d, c1[2] - d],
    ];
    put_paint(lo, &paint, out, pitch);
}

fn put_paint(lo: u32, paint: &[[i32; 3]; 4], out: &mut [u8], pitch: usize) {
    for i in 0..16 {
        let x = i / 4;
        let y = i % 4;
        let c = paint[etc_selector(lo, i)];
        let offset = y * pitch + x * 4;
        out[offset] = clamp8(c[0]);
        out[offset + 1] = clamp8(c[1]);
        out[offset + 2] = clamp8(c[2]);
        out[offset + 3] = 255;
    }
}

fn decode_planar(hi: u32, lo: u32, out: &mut [u8], pitch: usize) {
    let ro = expand6((hi >> 25) & 0x3F);
    let go = expand7(((hi >> 24) & 1) << 6 | ((hi >> 17) & 0x3F));
    let bo = expand6(
        ((hi >> 16) & 1) << 5 | ((hi >> 11) & 0x3) << 3 | ((hi >> 8) & 0x3) << 1 | ((hi >> 7) & 1),
    );
    let rh = expand6(((hi >> 2) & 0x1F) << 1 | (hi & 1));
    let gh = expand7((lo >> 25) & 0x7F);
    let bh = expand6((lo >> 19) & 0x3F);
    let rv = expand6((lo >> 13) & 0x3F);
    let gv = expand7((lo >> 6) & 0x7F);
    let bv = expand6(lo & 0x3F);

    for y in 0..4i32 {
        for x in 0..4i32 {
            let offset = y as usize * pitch + x as usize * 4;
            out[offset] = clamp8((x * (rh - ro) + y * (rv - ro) + 4 * ro + 2) >> 2);
            out[offset + 1] = clamp8((x * (gh - go) + y * (gv - go) + 4 * go + 2) >> 2);
            out[offset + 2] = clamp8((x * (bh - bo) + y * (bv - bo) + 4 * bo + 2) >> 2);
            out[offset + 3] = 255;
        }
    }
}

/// Decode 8 bytes of an EAC alpha block to 8-bit values with
/// `destination_pitch` many bytes per output row and `pixel_size` many bytes
/// per output pixel.
pub fn eac_alpha(
    compressed_block: &[u8],
    decompressed_block: &mut [u8],
    destination_pitch: usize,
    pixel_size: usize,
) {
    let word = u64::from_be_bytes(compressed_block[0..8].try_into().unwrap());
    let base = (word >> 56) as i32;
    let mult = ((word >> 52) & 0xF) as i32;
    let table = &EAC_MODIFIER[((word >> 48) & 0xF) as usize];

    for i in 0..16 {
        let sel = ((word >> (45 - 3 * i)) & 0x7) as usize;
        let x = i / 4;
        let y = i % 4;
        decompressed_block[y * destination_pitch + x * pixel_size] =
            clamp8(base + table[sel] * mult);
    }
}

/// Decode 8 bytes of an EAC R11 block to 8-bit values with
/// `destination_pitch` many bytes per output row and `pixel_size` many bytes
/// per output pixel. The 11-bit reconstruction is reduced to 8 bits.
pub fn eac_r11(
    compressed_block: &[u8],
    decompressed_block: &mut [u8],
    destination_pitch: usize,
    pixel_size: usize,
) {
    let word = u64::from_be_bytes(compressed_block[0..8].try_into().unwrap());
    let base = (word >> 56) as i32;
    let mult = ((word >> 52) & 0xF) as i32;
    let table = &EAC_MODIFIER[((word >> 48) & 0xF) as usize];

    for i in 0..16 {
        let sel = ((word >> (45 - 3 * i)) & 0x7) as usize;
        let value = if mult > 0 {
            base * 8 + 4 + table[sel] * mult * 8
        } else {
            base * 8 + 4 + table[sel]
        };
        let x = i / 4;
        let y = i % 4;
        decompressed_block[y * destination_pitch + x * pixel_size] =
            (value.clamp(0, 2047) >> 3) as u8;
    }
}

/// Decode 16 bytes of an ETC2 RGBA block (EAC alpha word followed by the RGB
/// word) to RGBA8 with `destination_pitch` many bytes per output row.
pub fn etc_rgba(compressed_block: &[u8], decompressed_block: &mut [u8], destination_pitch: usize) {
    etc_rgb(&compressed_block[8..16], decompressed_block, destination_pitch);
    eac_alpha(
        &compressed_block[0..8],
        &mut decompressed_block[3..],
        destination_pitch,
        4,
    );
}

/// Decode 16 bytes of an EAC RG11 block (R word followed by G word) to RG8
/// with `destination_pitch` many bytes per output row.
pub fn eac_rg11(compressed_block: &[u8], decompressed_block: &mut [u8], destination_pitch: usize) {
    eac_r11(&compressed_block[0..8], decompressed_block, destination_pitch, 2);
    eac_r11(
        &compressed_block[8..16],
        &mut decompressed_block[1..],
        destination_pitch,
        2,
    );
}

fn rgb565_palette(compressed_block: &[u8], opaque_only: bool) -> [[u8; 4]; 4] {
    let c0 = u16::from_le_bytes(compressed_block[0..2].try_into().unwrap());
    let c1 = u16::from_le_bytes(compressed_block[2..4].try_into().unwrap());

    let unpack = |c: u16| {
        [
            expand5((c >> 11) as u32 & 0x1F),
            expand6((c >> 5) as u32 & 0x3F),
            expand5(c as u32 & 0x1F),
        ]
    };
    let e0 = unpack(c0);
    let e1 = unpack(c1);

    let mut palette = [[0u8; 4]; 4];
    palette[0] = [e0[0] as u8, e0[1] as u8, e0[2] as u8, 255];
    palette[1] = [e1[0] as u8, e1[1] as u8, e1[2] as u8, 255];

    if c0 > c1 || opaque_only {
        for c in 0..3 {
            palette[2][c] = ((2 * e0[c] + e1[c] + 1) / 3) as u8;
            palette[3][c] = ((e0[c] + 2 * e1[c] + 1) / 3) as u8;
        }
        palette[2][3] = 255;
        palette[3][3] = 255;
    } else {
        for c in 0..3 {
            palette[2][c] = ((e0[c] + e1[c] + 1) / 2) as u8;
        }
        palette[2][3] = 255;
        // Punch-through transparent black.
        palette[3] = [0, 0, 0, 0];
    }
    palette
}

fn color_indices(compressed_block: &[u8], palette: &[[u8; 4]; 4], out: &mut [u8], pitch: usize) {
    let mut indices = u32::from_le_bytes(compressed_block[4..8].try_into().unwrap());
    for y in 0..4 {
        for x in 0..4 {
            let offset = y * pitch + x * 4;
            out[offset..offset + 4].copy_from_slice(&palette[(indices & 0x3) as usize]);
            indices >>= 2;
        }
    }
}

/// Decode 8 bytes of a BC1 (DXT1) block to RGBA8 with `destination_pitch`
/// many bytes per output row.
///
/// # Examples
///
/// ```rust
/// let compressed_block = [0u8; 8];
/// let mut decompressed_block = [0u8; 4 * 4 * 4];
/// blockdec::bc1(&compressed_block, &mut decompressed_block, 4 * 4);
/// ```
pub fn bc1(compressed_block: &[u8], decompressed_block: &mut [u8], destination_pitch: usize) {
    let palette = rgb565_palette(compressed_block, false);
    color_indices(compressed_block, &palette, decompressed_block, destination_pitch);
}

fn smooth_alpha(compressed_block: &[u8], out: &mut [u8], pitch: usize, pixel_size: usize) {
    let a0 = compressed_block[0] as u16;
    let a1 = compressed_block[1] as u16;

    let mut palette = [0u8; 8];
    palette[0] = a0 as u8;
    palette[1] = a1 as u8;
    if a0 > a1 {
        for i in 2..8u16 {
            palette[i as usize] = (((8 - i) * a0 + (i - 1) * a1 + 3) / 7) as u8;
        }
    } else {
        for i in 2..6u16 {
            palette[i as usize] = (((6 - i) * a0 + (i - 1) * a1 + 2) / 5) as u8;
        }
        palette[6] = 0;
        palette[7] = 255;
    }

    let word = u64::from_le_bytes(compressed_block[0..8].try_into().unwrap());
    let mut indices = word >> 16;
    for y in 0..4 {
        for x in 0..4 {
            out[y * pitch + x * pixel_size] = palette[(indices & 0x7) as usize];
            indices >>= 3;
        }
    }
}

/// Decode 16 bytes of a BC3 (DXT5) block to RGBA8 with `destination_pitch`
/// many bytes per output row.
pub fn bc3(compressed_block: &[u8], decompressed_block: &mut [u8], destination_pitch: usize) {
    let palette = rgb565_palette(&compressed_block[8..], true);
    color_indices(
        &compressed_block[8..],
        &palette,
        decompressed_block,
        destination_pitch,
    );
    smooth_alpha(
        &compressed_block[0..8],
        &mut decompressed_block[3..],
        destination_pitch,
        4,
    );
}

/// Decode 8 bytes of a BC4 block to R8 with `destination_pitch` many bytes
/// per output row.
pub fn bc4(compressed_block: &[u8], decompressed_block: &mut [u8], destination_pitch: usize) {
    smooth_alpha(compressed_block, decompressed_block, destination_pitch, 1);
}

/// Decode 16 bytes of a BC5 block to RG8 with `destination_pitch` many bytes
/// per output row.
pub fn bc5(compressed_block: &[u8], decompressed_block: &mut [u8], destination_pitch: usize) {
    smooth_alpha(&compressed_block[0..8], decompressed_block, destination_pitch, 2);
    smooth_alpha(
        &compressed_block[8..16],
        &mut decompressed_block[1..],
        destination_pitch,
        2,
    );
}
