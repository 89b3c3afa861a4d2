//! Ownership and dispatch for the compressed block payload.
//!
//! A [BlockData] owns exactly one of a read-only mapping, a writable mapping
//! or a heap buffer for its whole lifetime, plus the geometry needed to
//! route block ranges to the per-format kernels.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use memmap2::{Mmap, MmapMut};

use crate::container::{self, PVR_HEADER_SIZE};
use crate::encode::{dxtc, eac, etc1, etc2};
use crate::error::{CreateError, OpenError};
use crate::{level_block_count, mip_level_count, Bitmap, Channels, Format};

enum Storage {
    ReadMap { map: Mmap, _file: File },
    WriteMap { map: MmapMut, _file: File },
    Heap(Vec<u8>),
}

/// A compressed texture payload and its logical geometry.
pub struct BlockData {
    storage: Storage,
    width: u32,
    height: u32,
    format: Format,
    levels: u32,
    data_offset: usize,
}

impl BlockData {
    /// Open an existing PVR v3 or KTX file with a shared read-only mapping.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, OpenError> {
        let file = File::open(path.as_ref())?;
        let map = unsafe { Mmap::map(&file)? };
        let header = container::parse_header(&map)?;
        log::debug!(
            "opened {}: {} {}x{}, {} levels, payload at {}",
            path.as_ref().display(),
            header.format,
            header.width,
            header.height,
            header.levels,
            header.data_offset
        );
        Ok(Self {
            storage: Storage::ReadMap { map, _file: file },
            width: header.width,
            height: header.height,
            format: header.format,
            levels: header.levels,
            data_offset: header.data_offset,
        })
    }

    /// Create a PVR v3 file sized for the whole payload and map it writable,
    /// so the kernels emit directly into the page cache.
    pub fn create<P: AsRef<Path>>(
        path: P,
        width: u32,
        height: u32,
        mipmap: bool,
        format: Format,
    ) -> Result<Self, CreateError> {
        let levels = validate_create(width, height, mipmap)?;
        let len = PVR_HEADER_SIZE + payload_len(width, height, levels, format);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        // Extend the file by touching its final byte, then map the range.
        file.seek(SeekFrom::Start(len as u64 - 1))?;
        file.write_all(&[0])?;
        let mut map = unsafe { MmapMut::map_mut(&file)? };
        container::write_pvr_header(&mut map[..PVR_HEADER_SIZE], format, width, height, levels);

        log::debug!(
            "created {}: {} {}x{}, {} levels, {} bytes",
            path.as_ref().display(),
            format,
            width,
            height,
            levels,
            len
        );
        Ok(Self {
            storage: Storage::WriteMap { map, _file: file },
            width,
            height,
            format,
            levels,
            data_offset: PVR_HEADER_SIZE,
        })
    }

    /// Create a payload backed by plain heap memory, laid out exactly like
    /// the file variant (header region included).
    pub fn in_memory(
        width: u32,
        height: u32,
        mipmap: bool,
        format: Format,
    ) -> Result<Self, CreateError> {
        let levels = validate_create(width, height, mipmap)?;
        let len = PVR_HEADER_SIZE + payload_len(width, height, levels, format);
        let mut data = vec![0u8; len];
        container::write_pvr_header(&mut data[..PVR_HEADER_SIZE], format, width, height, levels);
        Ok(Self {
            storage: Storage::Heap(data),
            width,
            height,
            format,
            levels,
            data_offset: PVR_HEADER_SIZE,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn mip_levels(&self) -> u32 {
        self.levels
    }

    /// The container bytes, header included.
    pub fn data(&self) -> &[u8] {
        match &self.storage {
            Storage::ReadMap { map, .. } => map,
            Storage::WriteMap { map, .. } => map,
            Storage::Heap(data) => data,
        }
    }

    fn writable(&mut self) -> &mut [u8] {
        match &mut self.storage {
            Storage::WriteMap { map, .. } => map,
            Storage::Heap(data) => data,
            Storage::ReadMap { .. } => panic!("payload was opened read-only"),
        }
    }

    /// Block offset of `level` from the start of the payload, following the
    /// largest-first tightly packed level layout.
    pub fn mip_block_offset(&self, level: u32) -> usize {
        (0..level)
            .map(|l| level_block_count(self.width, self.height, l))
            .sum()
    }

    /// Number of blocks in `level`.
    pub fn level_blocks(&self, level: u32) -> usize {
        level_block_count(self.width, self.height, level)
    }

    /// The writable byte region of `level`.
    pub(crate) fn level_span_mut(&mut self, level: u32) -> &mut [u8] {
        let bytes_per_block = self.format.bytes_per_block();
        let start = self.data_offset + self.mip_block_offset(level) * bytes_per_block;
        let len = self.level_blocks(level) * bytes_per_block;
        &mut self.writable()[start..start + len]
    }

    /// Encode `blocks` blocks from the block-scan stream `src` into the
    /// payload at block `offset`.
    ///
    /// The kernel is selected by (format, channels, dither): alpha planes
    /// encode as EAC words except under [Format::Etc1], which uses grayscale
    /// ETC1 words. Concurrent calls are safe only for disjoint ranges, which
    /// the parallel dispatcher guarantees by construction.
    pub fn process(
        &mut self,
        src: &[u8],
        blocks: usize,
        offset: usize,
        channels: Channels,
        dither: bool,
        use_heuristics: bool,
    ) {
        let format = self.format;
        let bytes_per_block = format.bytes_per_block();
        let start = self.data_offset + offset * bytes_per_block;
        let dst = &mut self.writable()[start..start + blocks * bytes_per_block];
        encode_span(format, channels, dither, use_heuristics, src, dst, blocks);
    }

    /// Encode `blocks` whole-pixel blocks for the dual-plane RGBA formats
    /// ([Format::Etc2Rgba], [Format::Dxt5]).
    ///
    /// `src` is the row-major RGBA image starting at the first pixel of the
    /// block row containing block `offset`, which must sit on a block-row
    /// boundary; `width` is the image width in pixels.
    pub fn process_rgba(
        &mut self,
        src: &[u32],
        blocks: usize,
        offset: usize,
        width: usize,
        use_heuristics: bool,
    ) {
        let format = self.format;
        let bytes_per_block = format.bytes_per_block();
        let start = self.data_offset + offset * bytes_per_block;
        let dst = &mut self.writable()[start..start + blocks * bytes_per_block];
        encode_span_rgba(format, use_heuristics, src, dst, blocks, width);
    }

    /// Decode the base level back into a pixel buffer. Single-pass and
    /// sequential; a corrupted payload yields garbage pixels, not an error.
    pub fn decode(&self) -> Bitmap {
        let width = self.width as usize;
        let height = self.height as usize;
        let format = self.format;
        let bytes_per_block = format.bytes_per_block();

        let mut bitmap = Bitmap::new(self.width, self.height);
        let src = &self.data()[self.data_offset..];
        let blocks_x = width.div_ceil(4);
        let blocks_y = height.div_ceil(4);

        for by in 0..blocks_y {
            for bx in 0..blocks_x {
                let block = &src[(by * blocks_x + bx) * bytes_per_block..][..bytes_per_block];
                let mut pixels = [0u8; 64];
                decode_block(format, block, &mut pixels);
                put_block(bitmap.data_bytes_mut(), &pixels, bx * 4, by * 4, width, height);
            }
        }
        bitmap
    }
}

fn validate_create(width: u32, height: u32, mipmap: bool) -> Result<u32, CreateError> {
    if width == 0 || height == 0 {
        return Err(CreateError::ZeroSized { width, height });
    }
    if width % 4 != 0 || height % 4 != 0 {
        return Err(CreateError::NonIntegralDimensions { width, height });
    }
    if mipmap {
        if !width.is_power_of_two() || !height.is_power_of_two() {
            return Err(CreateError::MipmapsRequirePowerOfTwo { width, height });
        }
        Ok(mip_level_count(width, height))
    } else {
        Ok(1)
    }
}

/// Payload byte length for a mip chain: every level stores at least one
/// block per plane.
pub(crate) fn payload_len(width: u32, height: u32, levels: u32, format: Format) -> usize {
    (0..levels)
        .map(|l| level_block_count(width, height, l))
        .sum::<usize>()
        * format.bytes_per_block()
}

pub(crate) fn encode_span(
    format: Format,
    channels: Channels,
    dither: bool,
    use_heuristics: bool,
    src: &[u8],
    dst: &mut [u8],
    blocks: usize,
) {
    match channels {
        Channels::Alpha => match format {
            Format::Etc1 => etc1::compress_alpha(src, dst, blocks),
            Format::Etc2Rgba | Format::Dxt5 => {
                panic!("whole-pixel formats encode through process_rgba")
            }
            _ => eac::compress_alpha(src, dst, blocks),
        },
        Channels::Rgb => match format {
            Format::Etc1 => etc1::compress_rgb(src, dst, blocks, dither),
            Format::Etc2Rgb => etc2::compress_rgb(src, dst, blocks, use_heuristics),
            Format::EacR11 => eac::compress_r(src, dst, blocks),
            Format::EacRg11 => eac::compress_rg(src, dst, blocks),
            Format::Dxt1 => dxtc::compress_dxt1(src, dst, blocks, dither),
            Format::Bc4 => dxtc::compress_bc4(src, dst, blocks),
            Format::Bc5 => dxtc::compress_bc5(src, dst, blocks),
            Format::Etc2Rgba | Format::Dxt5 => {
                panic!("whole-pixel formats encode through process_rgba")
            }
        },
    }
}

pub(crate) fn encode_span_rgba(
    format: Format,
    use_heuristics: bool,
    src: &[u32],
    dst: &mut [u8],
    blocks: usize,
    width: usize,
) {
    match format {
        Format::Etc2Rgba => etc2::compress_rgba(src, dst, blocks, width, use_heuristics),
        Format::Dxt5 => dxtc::compress_dxt5(src, dst, blocks, width),
        _ => panic!("split-plane formats encode through process"),
    }
}

fn decode_block(format: Format, block: &[u8], pixels: &mut [u8; 64]) {
    match format {
        Format::Etc1 | Format::Etc2Rgb => blockdec::etc_rgb(block, pixels, 16),
        Format::Etc2Rgba => blockdec::etc_rgba(block, pixels, 16),
        Format::Dxt1 => blockdec::bc1(block, pixels, 16),
        Format::Dxt5 => blockdec::bc3(block, pixels, 16),
        Format::EacR11 => {
            let mut red = [0u8; 16];
            blockdec::eac_r11(block, &mut red, 4, 1);
            spread_channels(&red, 1, pixels);
        }
        Format::EacRg11 => {
            let mut red_green = [0u8; 32];
            blockdec::eac_rg11(block, &mut red_green, 8);
            spread_channels(&red_green, 2, pixels);
        }
        Format::Bc4 => {
            let mut red = [0u8; 16];
            blockdec::bc4(block, &mut red, 4);
            spread_channels(&red, 1, pixels);
        }
        Format::Bc5 => {
            let mut red_green = [0u8; 32];
            blockdec::bc5(block, &mut red_green, 8);
            spread_channels(&red_green, 2, pixels);
        }
    }
}

/// Expand one- or two-channel block output to opaque RGBA.
fn spread_channels(src: &[u8], channels: usize, pixels: &mut [u8; 64]) {
    for i in 0..16 {
        pixels[i * 4] = src[i * channels];
        pixels[i * 4 + 1] = if channels == 2 { src[i * channels + 1] } else { 0 };
        pixels[i * 4 + 2] = 0;
        pixels[i * 4 + 3] = 255;
    }
}

/// Copy a decoded 4x4 block into the surface, clamping at the right and
/// bottom edges for images that are not block aligned.
fn put_block(surface: &mut [u8], pixels: &[u8; 64], x: usize, y: usize, width: usize, height: usize) {
    let columns = 4.min(width - x);
    for row in 0..4.min(height - y) {
        let offset = ((y + row) * width + x) * 4;
        surface[offset..offset + columns * 4]
            .copy_from_slice(&pixels[row * 16..row * 16 + columns * 4]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("blockpak_{}_{}", std::process::id(), name))
    }

    #[test]
    fn create_sizes_the_file() {
        let path = temp_path("create_sizes.pvr");
        let data = BlockData::create(&path, 8, 8, false, Format::Etc1).unwrap();
        // 4 blocks of 8 bytes after the 52-byte header.
        assert_eq!(data.data().len(), 52 + 4 * 8);
        drop(data);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn create_rejects_bad_geometry() {
        assert!(matches!(
            BlockData::in_memory(6, 4, false, Format::Etc1),
            Err(CreateError::NonIntegralDimensions { .. })
        ));
        assert!(matches!(
            BlockData::in_memory(0, 0, false, Format::Etc1),
            Err(CreateError::ZeroSized { .. })
        ));
        assert!(matches!(
            BlockData::in_memory(12, 12, true, Format::Etc1),
            Err(CreateError::MipmapsRequirePowerOfTwo { .. })
        ));
    }

    #[test]
    fn open_recognizes_pvr_geometry() {
        let path = temp_path("open_pvr.pvr");
        drop(BlockData::create(&path, 8, 8, false, Format::Etc2Rgb).unwrap());

        let data = BlockData::open(&path).unwrap();
        assert_eq!(data.format(), Format::Etc2Rgb);
        assert_eq!((data.width(), data.height()), (8, 8));
        assert_eq!(data.level_blocks(0), 4);
        assert_eq!(data.data().len(), 52 + 4 * 8);
        drop(data);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn open_rejects_unknown_magic() {
        let path = temp_path("bad_magic.bin");
        std::fs::write(&path, vec![0x55u8; 64]).unwrap();
        assert!(matches!(
            BlockData::open(&path),
            Err(OpenError::UnrecognizedContainer { .. })
        ));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn mip_offsets_are_padded() {
        let data = BlockData::in_memory(16, 16, true, Format::Etc1).unwrap();
        assert_eq!(data.mip_levels(), 5);
        assert_eq!(data.level_blocks(0), 16);
        // 8x8 level.
        assert_eq!(data.mip_block_offset(1), 16);
        // Every level at or below 4x4 still occupies one full block.
        assert_eq!(data.level_blocks(2), 1);
        assert_eq!(data.level_blocks(3), 1);
        assert_eq!(data.level_blocks(4), 1);
        assert_eq!(data.data().len(), 52 + (16 + 4 + 1 + 1 + 1) * 8);
    }

    #[test]
    fn dual_plane_formats_double_the_payload() {
        let single = BlockData::in_memory(8, 8, false, Format::Etc2Rgb).unwrap();
        let dual = BlockData::in_memory(8, 8, false, Format::Etc2Rgba).unwrap();
        assert_eq!(single.data().len(), 52 + 4 * 8);
        assert_eq!(dual.data().len(), 52 + 4 * 16);
    }

    #[test]
    fn minimum_image_is_one_block() {
        let mut data = BlockData::in_memory(4, 4, false, Format::Etc1).unwrap();
        let stream = [128u8; 48];
        data.process(&stream, 1, 0, Channels::Rgb, false, true);
        let decoded = data.decode();
        assert_eq!((decoded.width(), decoded.height()), (4, 4));
        for y in 0..4 {
            for x in 0..4 {
                let pixel = decoded.pixel(x, y);
                assert!(((pixel & 0xFF) as i32 - 128).abs() <= 4);
            }
        }
    }

    #[test]
    fn alpha_plane_into_etc1_uses_gray_words() {
        let mut data = BlockData::in_memory(4, 4, false, Format::Etc1).unwrap();
        let plane = [200u8; 16];
        data.process(&plane, 1, 0, Channels::Alpha, false, true);
        // Grayscale ETC1 word: decoding as RGB reproduces the plane value.
        let decoded = data.decode();
        let pixel = decoded.pixel(0, 0);
        assert!(((pixel & 0xFF) as i32 - 200).abs() <= 4);
    }

    #[test]
    fn decode_is_repeatable() {
        let mut data = BlockData::in_memory(8, 4, false, Format::Dxt1).unwrap();
        let mut stream = [0u8; 96];
        for (i, v) in stream.iter_mut().enumerate() {
            *v = (i * 11 % 256) as u8;
        }
        data.process(&stream, 2, 0, Channels::Rgb, false, true);
        assert_eq!(data.decode(), data.decode());
    }
}
