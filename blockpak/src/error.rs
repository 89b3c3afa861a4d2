use thiserror::Error;

/// Errors from opening an existing compressed texture container.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("file does not start with a known container magic (found {magic:#010x})")]
    UnrecognizedContainer { magic: u32 },

    #[error("PVR pixel format code {code} is not supported")]
    UnsupportedPvrFormat { code: u32 },

    #[error("KTX internal format {format:#06x} is not supported")]
    UnsupportedKtxFormat { format: u32 },

    #[error("file is too short to contain a container header")]
    TruncatedHeader,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from creating a payload for encoding.
#[derive(Debug, Error)]
pub enum CreateError {
    #[error("surface dimensions {width} x {height} are not multiples of the block size")]
    NonIntegralDimensions { width: u32, height: u32 },

    #[error("surface dimensions {width} x {height} contain no pixels")]
    ZeroSized { width: u32, height: u32 },

    #[error("mipmapped surfaces require power of two dimensions, found {width} x {height}")]
    MipmapsRequirePowerOfTwo { width: u32, height: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
