//! Parallel shard dispatch for encoding.
//!
//! The block grid of each mip level is split into block-row-aligned shards
//! that are encoded on the rayon pool. Shards receive disjoint sub-slices of
//! the payload, so no locking is needed anywhere in the hot path; joining
//! the parallel iterator is the single synchronization point.

use rayon::prelude::*;

use crate::error::CreateError;
use crate::payload::{encode_span, encode_span_rgba};
use crate::{
    div_round_up, mip_dimension, mipmap::downsample_rgba, Bitmap, BlockBitmap, BlockData,
    Channels, Format,
};

/// Lower bound on blocks per shard, amortizing per-task overhead.
const MIN_SHARD_BLOCKS: usize = 4096;

/// Options for the high-level encode entry points.
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    /// Encode a full mip chain down to 1x1 instead of just the base level.
    pub mipmaps: bool,
    /// Diffuse quantization error before encoding (Etc1 and Dxt1 only).
    pub dither: bool,
    /// Prune ETC2 mode candidates from per-block statistics.
    pub use_heuristics: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            mipmaps: false,
            dither: false,
            use_heuristics: true,
        }
    }
}

/// Encode `bitmap` into an in-memory payload.
pub fn encode_bitmap(
    bitmap: &Bitmap,
    format: Format,
    options: EncodeOptions,
) -> Result<BlockData, CreateError> {
    let mut data = BlockData::in_memory(bitmap.width(), bitmap.height(), options.mipmaps, format)?;
    encode_into(&mut data, bitmap, options)?;
    Ok(data)
}

/// Encode `bitmap` into a memory-mapped PVR v3 file at `path`.
pub fn encode_bitmap_to_file<P: AsRef<std::path::Path>>(
    path: P,
    bitmap: &Bitmap,
    format: Format,
    options: EncodeOptions,
) -> Result<BlockData, CreateError> {
    let mut data = BlockData::create(
        path,
        bitmap.width(),
        bitmap.height(),
        options.mipmaps,
        format,
    )?;
    encode_into(&mut data, bitmap, options)?;
    Ok(data)
}

fn encode_into(
    data: &mut BlockData,
    bitmap: &Bitmap,
    options: EncodeOptions,
) -> Result<(), CreateError> {
    let mut pixels = bitmap.data().to_vec();
    let mut width = bitmap.width() as usize;
    let mut height = bitmap.height() as usize;

    for level in 0..data.mip_levels() {
        if level > 0 {
            // Levels smaller than one block stay padded to 4x4; clamped box
            // sampling fills the padding with edge pixels.
            let new_width = (mip_dimension(bitmap.width(), level).max(4)) as usize;
            let new_height = (mip_dimension(bitmap.height(), level).max(4)) as usize;
            pixels = downsample_rgba(new_width, new_height, width, height, &pixels);
            width = new_width;
            height = new_height;
        }
        process_level(data, &pixels, width, level, options)?;
    }
    Ok(())
}

fn process_level(
    data: &mut BlockData,
    pixels: &[u32],
    width: usize,
    level: u32,
    options: EncodeOptions,
) -> Result<(), CreateError> {
    let format = data.format();
    let bytes_per_block = format.bytes_per_block();
    let blocks = data.level_blocks(level);
    let blocks_per_row = width / 4;
    let block_rows = blocks / blocks_per_row;

    // Enough shards to cover the pool, but at least a few thousand blocks
    // each, rounded to whole block rows.
    let target_shards = rayon::current_num_threads() * 4;
    let rows_per_shard = div_round_up(block_rows, target_shards)
        .max(div_round_up(MIN_SHARD_BLOCKS, blocks_per_row))
        .min(block_rows);
    let shard_blocks = rows_per_shard * blocks_per_row;
    log::debug!(
        "level {}: {} blocks in {} shards",
        level,
        blocks,
        div_round_up(blocks, shard_blocks)
    );

    let whole_pixel = matches!(format, Format::Etc2Rgba | Format::Dxt5);
    if whole_pixel {
        let dst = data.level_span_mut(level);
        dst.par_chunks_mut(shard_blocks * bytes_per_block)
            .enumerate()
            .for_each(|(shard, chunk)| {
                let start_row = shard * rows_per_shard;
                let shard_blocks = chunk.len() / bytes_per_block;
                let src = &pixels[start_row * 4 * width..];
                encode_span_rgba(
                    format,
                    options.use_heuristics,
                    src,
                    chunk,
                    shard_blocks,
                    width,
                );
            });
    } else {
        let stream = BlockBitmap::from_rgba(
            pixels,
            width as u32,
            (blocks / blocks_per_row * 4) as u32,
            Channels::Rgb,
        )?;
        let stream_bytes = stream.data().len() / blocks;
        let dst = data.level_span_mut(level);
        dst.par_chunks_mut(shard_blocks * bytes_per_block)
            .enumerate()
            .for_each(|(shard, chunk)| {
                let count = chunk.len() / bytes_per_block;
                let start = shard * shard_blocks * stream_bytes;
                encode_span(
                    format,
                    Channels::Rgb,
                    options.dither,
                    options.use_heuristics,
                    &stream.data()[start..start + count * stream_bytes],
                    chunk,
                    count,
                );
            });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_bitmap(width: u32, height: u32) -> Bitmap {
        let mut bitmap = Bitmap::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let r = (x * 255 / (width - 1).max(1)) & 0xFF;
                let g = (y * 255 / (height - 1).max(1)) & 0xFF;
                bitmap.set_pixel(x, y, r | (g << 8) | (0x60 << 16) | (0xFF << 24));
            }
        }
        bitmap
    }

    fn psnr(a: &Bitmap, b: &Bitmap) -> f64 {
        let mut sum = 0f64;
        let mut count = 0usize;
        for (pa, pb) in a.data().iter().zip(b.data()) {
            for c in 0..3 {
                let d = ((pa >> (c * 8)) & 0xFF) as f64 - ((pb >> (c * 8)) & 0xFF) as f64;
                sum += d * d;
                count += 1;
            }
        }
        let mse = sum / count as f64;
        if mse == 0.0 {
            f64::INFINITY
        } else {
            10.0 * (255.0f64 * 255.0 / mse).log10()
        }
    }

    #[test]
    fn encode_is_idempotent() {
        let bitmap = gradient_bitmap(16, 16);
        let a = encode_bitmap(&bitmap, Format::Etc2Rgb, EncodeOptions::default()).unwrap();
        let b = encode_bitmap(&bitmap, Format::Etc2Rgb, EncodeOptions::default()).unwrap();
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn smooth_image_meets_psnr_floor() {
        let bitmap = gradient_bitmap(64, 64);
        for format in [Format::Etc1, Format::Etc2Rgb, Format::Dxt1] {
            let encoded = encode_bitmap(&bitmap, format, EncodeOptions::default()).unwrap();
            let decoded = encoded.decode();
            let quality = psnr(&bitmap, &decoded);
            assert!(quality >= 30.0, "{format}: {quality:.1} dB");
        }
    }

    #[test]
    fn rgba_formats_carry_alpha() {
        let mut bitmap = gradient_bitmap(8, 8);
        for y in 0..8 {
            for x in 0..8 {
                let pixel = bitmap.pixel(x, y) & 0x00FF_FFFF;
                bitmap.set_pixel(x, y, pixel | ((x * 30) << 24));
            }
        }
        for format in [Format::Etc2Rgba, Format::Dxt5] {
            let encoded = encode_bitmap(&bitmap, format, EncodeOptions::default()).unwrap();
            let decoded = encoded.decode();
            for y in 0..8 {
                for x in 0..8 {
                    let expected = (bitmap.pixel(x, y) >> 24) as i32;
                    let got = (decoded.pixel(x, y) >> 24) as i32;
                    assert!((expected - got).abs() <= 8, "{format} alpha at {x},{y}");
                }
            }
        }
    }

    #[test]
    fn mipmapped_encode_fills_every_level() {
        let bitmap = gradient_bitmap(16, 16);
        let options = EncodeOptions {
            mipmaps: true,
            ..Default::default()
        };
        let encoded = encode_bitmap(&bitmap, Format::Etc1, options).unwrap();
        assert_eq!(encoded.mip_levels(), 5);
        // The final level is a padded 4x4 block encoding the image average;
        // a zeroed word would decode to pure black, so check it was written.
        let last = encoded.mip_block_offset(4) * 8 + 52;
        assert_ne!(&encoded.data()[last..last + 8], &[0u8; 8]);
    }

    #[test]
    fn single_channel_round_trip_on_ramps() {
        let mut bitmap = Bitmap::new(8, 8);
        for y in 0..8 {
            for x in 0..8 {
                // Small-range ramps are representable by the 8-point
                // palettes of the single channel formats.
                let r = 100 + x + y * 2;
                let g = 40 + x * 2;
                bitmap.set_pixel(x, y, r | (g << 8) | (0xFF << 24));
            }
        }
        for format in [Format::EacR11, Format::EacRg11, Format::Bc4, Format::Bc5] {
            let encoded = encode_bitmap(&bitmap, format, EncodeOptions::default()).unwrap();
            let decoded = encoded.decode();
            let two_channel = matches!(format, Format::EacRg11 | Format::Bc5);
            for y in 0..8 {
                for x in 0..8 {
                    let expected = bitmap.pixel(x, y);
                    let got = decoded.pixel(x, y);
                    let dr = ((expected & 0xFF) as i32 - (got & 0xFF) as i32).abs();
                    assert!(dr <= 1, "{format} red at {x},{y}");
                    if two_channel {
                        let dg =
                            (((expected >> 8) & 0xFF) as i32 - ((got >> 8) & 0xFF) as i32).abs();
                        assert!(dg <= 1, "{format} green at {x},{y}");
                    }
                }
            }
        }
    }
}
