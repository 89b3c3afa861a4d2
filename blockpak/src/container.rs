//! PVR v3 and KTX container headers.
//!
//! Both containers are a fixed grid of little-endian 32-bit words followed
//! by optional metadata and the raw block payload. Reading recognizes both;
//! writing always emits PVR v3.

use crate::{error::OpenError, Format};

pub(crate) const PVR_MAGIC: u32 = 0x0352_5650;
pub(crate) const PVR_HEADER_SIZE: usize = 52;

/// First word of the canonical 12-byte KTX identifier, as seen through a
/// little-endian word view.
pub(crate) const KTX_MAGIC: u32 = 0x5854_4BAB;
const KTX_IDENTIFIER: [u8; 12] = [
    0xAB, 0x4B, 0x54, 0x58, 0x20, 0x31, 0x31, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A,
];
const KTX_HEADER_SIZE: usize = 68;
const KTX_LITTLE_ENDIAN: u32 = 0x0403_0201;

/// Geometry parsed out of a container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ContainerHeader {
    pub format: Format,
    pub width: u32,
    pub height: u32,
    pub levels: u32,
    pub data_offset: usize,
}

#[inline]
fn word(bytes: &[u8], index: usize) -> u32 {
    u32::from_le_bytes(bytes[index * 4..index * 4 + 4].try_into().unwrap())
}

fn pvr_format(code: u32) -> Option<Format> {
    match code {
        6 => Some(Format::Etc1),
        7 => Some(Format::Dxt1),
        11 => Some(Format::Dxt5),
        12 => Some(Format::Bc4),
        13 => Some(Format::Bc5),
        22 => Some(Format::Etc2Rgb),
        23 => Some(Format::Etc2Rgba),
        25 => Some(Format::EacR11),
        26 => Some(Format::EacRg11),
        _ => None,
    }
}

fn pvr_code(format: Format) -> u32 {
    match format {
        Format::Etc1 => 6,
        Format::Dxt1 => 7,
        Format::Dxt5 => 11,
        Format::Bc4 => 12,
        Format::Bc5 => 13,
        Format::Etc2Rgb => 22,
        Format::Etc2Rgba => 23,
        Format::EacR11 => 25,
        Format::EacRg11 => 26,
    }
}

/// The KTX read path recognizes only the ETC2/EAC internal formats.
fn ktx_format(gl_internal_format: u32) -> Option<Format> {
    match gl_internal_format {
        0x9270 => Some(Format::EacR11),
        0x9272 => Some(Format::EacRg11),
        0x9274 => Some(Format::Etc2Rgb),
        0x9278 => Some(Format::Etc2Rgba),
        _ => None,
    }
}

pub(crate) fn parse_header(bytes: &[u8]) -> Result<ContainerHeader, OpenError> {
    if bytes.len() < 4 {
        return Err(OpenError::TruncatedHeader);
    }

    match word(bytes, 0) {
        PVR_MAGIC => {
            if bytes.len() < PVR_HEADER_SIZE {
                return Err(OpenError::TruncatedHeader);
            }
            let code = word(bytes, 2);
            let format = pvr_format(code).ok_or(OpenError::UnsupportedPvrFormat { code })?;
            Ok(ContainerHeader {
                format,
                height: word(bytes, 6),
                width: word(bytes, 7),
                levels: word(bytes, 11).max(1),
                data_offset: PVR_HEADER_SIZE + word(bytes, 12) as usize,
            })
        }
        KTX_MAGIC => {
            if bytes.len() < KTX_HEADER_SIZE || bytes[0..12] != KTX_IDENTIFIER {
                return Err(OpenError::TruncatedHeader);
            }
            debug_assert_eq!(word(bytes, 3), KTX_LITTLE_ENDIAN);
            let gl_format = word(bytes, 7);
            let format =
                ktx_format(gl_format).ok_or(OpenError::UnsupportedKtxFormat { format: gl_format })?;
            Ok(ContainerHeader {
                format,
                width: word(bytes, 9),
                height: word(bytes, 10),
                levels: word(bytes, 14).max(1),
                data_offset: KTX_HEADER_SIZE + word(bytes, 15) as usize,
            })
        }
        magic => Err(OpenError::UnrecognizedContainer { magic }),
    }
}

/// Materialize a PVR v3 header for the given geometry into `bytes`.
pub(crate) fn write_pvr_header(bytes: &mut [u8], format: Format, width: u32, height: u32, levels: u32) {
    let words: [u32; 13] = [
        PVR_MAGIC,
        0, // flags
        pvr_code(format),
        0, // pixel format, high word
        0, // color space
        0, // channel type
        height,
        width,
        1, // depth
        1, // surface count
        1, // face count
        levels,
        0, // metadata size
    ];
    for (i, w) in words.iter().enumerate() {
        bytes[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pvr_header_round_trip() {
        let mut bytes = [0u8; PVR_HEADER_SIZE];
        write_pvr_header(&mut bytes, Format::Etc2Rgb, 8, 16, 1);
        let header = parse_header(&bytes).unwrap();
        assert_eq!(
            header,
            ContainerHeader {
                format: Format::Etc2Rgb,
                width: 8,
                height: 16,
                levels: 1,
                data_offset: PVR_HEADER_SIZE,
            }
        );
    }

    #[test]
    fn pvr_metadata_moves_payload() {
        let mut bytes = [0u8; PVR_HEADER_SIZE];
        write_pvr_header(&mut bytes, Format::Dxt1, 4, 4, 1);
        bytes[48..52].copy_from_slice(&16u32.to_le_bytes());
        let header = parse_header(&bytes).unwrap();
        assert_eq!(header.data_offset, PVR_HEADER_SIZE + 16);
    }

    #[test]
    fn unknown_magic_is_rejected() {
        let bytes = [0x44u8; 64];
        assert!(matches!(
            parse_header(&bytes),
            Err(OpenError::UnrecognizedContainer { .. })
        ));
    }

    #[test]
    fn unknown_pvr_code_is_rejected() {
        let mut bytes = [0u8; PVR_HEADER_SIZE];
        write_pvr_header(&mut bytes, Format::Etc1, 4, 4, 1);
        bytes[8..12].copy_from_slice(&99u32.to_le_bytes());
        assert!(matches!(
            parse_header(&bytes),
            Err(OpenError::UnsupportedPvrFormat { code: 99 })
        ));
    }

    #[test]
    fn ktx_header_is_parsed() {
        let mut bytes = [0u8; KTX_HEADER_SIZE];
        bytes[0..12].copy_from_slice(&KTX_IDENTIFIER);
        bytes[12..16].copy_from_slice(&KTX_LITTLE_ENDIAN.to_le_bytes());
        bytes[28..32].copy_from_slice(&0x9274u32.to_le_bytes()); // internal format
        bytes[36..40].copy_from_slice(&8u32.to_le_bytes()); // width
        bytes[40..44].copy_from_slice(&8u32.to_le_bytes()); // height
        bytes[56..60].copy_from_slice(&1u32.to_le_bytes()); // mip levels
        bytes[60..64].copy_from_slice(&0u32.to_le_bytes()); // key/value bytes

        let header = parse_header(&bytes).unwrap();
        assert_eq!(header.format, Format::Etc2Rgb);
        assert_eq!(header.width, 8);
        assert_eq!(header.height, 8);
        assert_eq!(header.data_offset, KTX_HEADER_SIZE);
    }

    #[test]
    fn ktx_dxt_formats_are_not_readable() {
        // The DXT family has no KTX mapping on the read path.
        let mut bytes = [0u8; KTX_HEADER_SIZE];
        bytes[0..12].copy_from_slice(&KTX_IDENTIFIER);
        bytes[12..16].copy_from_slice(&KTX_LITTLE_ENDIAN.to_le_bytes());
        bytes[28..32].copy_from_slice(&0x83F1u32.to_le_bytes());
        assert!(matches!(
            parse_header(&bytes),
            Err(OpenError::UnsupportedKtxFormat { format: 0x83F1 })
        ));
    }
}
