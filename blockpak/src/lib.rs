//! # Introduction
//! blockpak compresses RGBA images into the fixed-rate GPU texture formats
//! of the ETC family (ETC1, ETC2 RGB/RGBA, EAC R11/RG11) and the DXT/BC
//! family (DXT1, DXT5, BC4, BC5), wrapped in a PVR v3 container, and decodes
//! both PVR v3 and KTX files back to pixels.
//!
//! Encoding works on 4x4 pixel blocks. The image is first rearranged into
//! block-scan order by [BlockBitmap] so the kernels can stream through their
//! input, then the block grid is split into shards and encoded in parallel
//! directly into a memory-mapped output file (or a heap buffer for in-memory
//! use). Mipmap chains are generated with a box filter and stored
//! largest-first, each level padded to at least one block.
//!
//! The simplest entry points are [encode_bitmap] and [encode_bitmap_to_file]:
//!
//! ```no_run
//! use blockpak::{encode_bitmap_to_file, Bitmap, EncodeOptions, Format};
//!
//! let bitmap = Bitmap::new(256, 256);
//! encode_bitmap_to_file(
//!     "out.pvr",
//!     &bitmap,
//!     Format::Etc2Rgb,
//!     EncodeOptions::default(),
//! )?;
//! let reread = blockpak::BlockData::open("out.pvr")?.decode();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Lower level control (separate alpha planes, custom shard dispatch) is
//! available through [BlockData::process] and [BlockData::process_rgba].
//!
//! # Limitations
//! Compression is lossy and deterministic; decode(encode(x)) approximates x
//! but only the narrow-range single and dual channel formats round-trip
//! within 1 LSB. Only 2D textures are handled. The KTX read path recognizes
//! the ETC2/EAC formats only, and writing always emits PVR v3.

mod bitmap;
mod container;
mod dispatch;
mod encode;
mod layout;
mod mipmap;
mod payload;

pub mod error;

pub use bitmap::Bitmap;
pub use dispatch::{encode_bitmap, encode_bitmap_to_file, EncodeOptions};
pub use layout::{BlockBitmap, Channels};
pub use mipmap::{downsample_rgba, mip_dimension, mip_level_count};
pub use payload::BlockData;

/// Supported compressed texture formats.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, strum::EnumString, strum::Display, strum::EnumIter)]
pub enum Format {
    Etc1,
    Etc2Rgb,
    Etc2Rgba,
    EacR11,
    EacRg11,
    Dxt1,
    Dxt5,
    Bc4,
    Bc5,
}

impl Format {
    /// Number of 64-bit block words per 4x4 block: dual-plane formats store
    /// an alpha or second-channel word before the color word.
    pub fn planes(&self) -> usize {
        match self {
            Format::Etc1 | Format::Etc2Rgb | Format::EacR11 | Format::Dxt1 | Format::Bc4 => 1,
            Format::Etc2Rgba | Format::EacRg11 | Format::Dxt5 | Format::Bc5 => 2,
        }
    }

    /// Compressed size of one 4x4 block in bytes.
    pub fn bytes_per_block(&self) -> usize {
        self.planes() * 8
    }
}

#[inline]
pub(crate) fn div_round_up(x: usize, d: usize) -> usize {
    (x + d - 1) / d
}

/// Number of blocks in mip `level`, padding levels smaller than one block up
/// to a full 4x4 block.
pub(crate) fn level_block_count(width: u32, height: u32, level: u32) -> usize {
    let w = mip_dimension(width, level).max(4) as usize;
    let h = mip_dimension(height, level).max(4) as usize;
    div_round_up(w, 4) * div_round_up(h, 4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::PVR_HEADER_SIZE;
    use crate::payload::payload_len;

    #[test]
    fn block_word_sizes() {
        use strum::IntoEnumIterator;
        for format in Format::iter() {
            assert_eq!(format.bytes_per_block(), format.planes() * 8);
        }
        assert_eq!(Format::Etc1.bytes_per_block(), 8);
        assert_eq!(Format::Etc2Rgba.bytes_per_block(), 16);
        assert_eq!(Format::Dxt5.bytes_per_block(), 16);
        assert_eq!(Format::Bc5.bytes_per_block(), 16);
        assert_eq!(Format::EacRg11.bytes_per_block(), 16);
    }

    #[test]
    fn payload_length_formula() {
        // Single level: width x height / 16 blocks.
        assert_eq!(payload_len(8, 8, 1, Format::Etc1), 4 * 8);
        assert_eq!(payload_len(8, 8, 1, Format::Dxt5), 4 * 16);
        // Mip chain of an 8x8 Etc2Rgba surface: 4 + 1 + 1 + 1 blocks, the
        // tail levels padded to one block each.
        assert_eq!(payload_len(8, 8, 4, Format::Etc2Rgba), 7 * 16);
        assert_eq!(
            PVR_HEADER_SIZE + payload_len(8, 8, 4, Format::Etc2Rgba),
            164
        );
    }

    #[test]
    fn level_counts_pad_to_one_block() {
        assert_eq!(level_block_count(16, 16, 0), 16);
        assert_eq!(level_block_count(16, 16, 1), 4);
        assert_eq!(level_block_count(16, 16, 2), 1);
        // 1x1 is still one padded block.
        assert_eq!(level_block_count(16, 16, 4), 1);
    }

    #[test]
    fn format_names_parse() {
        use std::str::FromStr;
        assert_eq!(Format::from_str("Etc2Rgb").unwrap(), Format::Etc2Rgb);
        assert_eq!(Format::Dxt1.to_string(), "Dxt1");
    }
}
