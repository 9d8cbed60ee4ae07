//! Errors that may be encountered while decoding or encoding a JPEG image.

use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

/// Common decode errors.
///
/// The entropy layer never raises any of these; a corrupt bitstream
/// decodes to zero coefficients and degrades the picture instead. These
/// errors come from the header parser and table builders only.
#[allow(clippy::module_name_repetitions)]
pub enum DecodeErrors
{
    /// Illegal magic bytes, the file does not start with an SOI marker
    IllegalMagicBytes(u16),
    /// A generic formatting error with context
    Format(String),
    /// A generic formatting error without allocation
    FormatStatic(&'static str),
    /// Problems with the Huffman tables in the file
    HuffmanDecode(String),
    /// Problems with arithmetic conditioning tables
    ArithmeticDecode(String),
    /// Discrete Quantization Table errors
    DqtError(String),
    /// Start of Scan errors
    SosError(String),
    /// Start of Frame errors
    SofError(String),
    /// Image has a zero width or height
    ZeroError,
    /// Image dimensions are too large to allocate for
    LargeDimensions(usize),
    /// The stream ended while a segment expected more data
    ExhaustedData,
    /// Decoding was cancelled by the caller
    Cancelled,
    /// The coding process is recognized but not implemented
    Unsupported(UnsupportedSchemes),
}

impl DecodeErrors
{
    fn message(&self, f: &mut Formatter<'_>) -> std::fmt::Result
    {
        match &self
        {
            Self::IllegalMagicBytes(bytes) =>
            {
                write!(f, "Error parsing image. Illegal start bytes:{bytes:#06X}")
            }
            Self::Format(ref reason) => write!(f, "{reason}"),
            Self::FormatStatic(reason) => write!(f, "{reason}"),
            Self::HuffmanDecode(ref reason) =>
            {
                write!(f, "Error decoding huffman tables. Reason:{reason}")
            }
            Self::ArithmeticDecode(ref reason) =>
            {
                write!(f, "Error parsing arithmetic conditioning. Reason:{reason}")
            }
            Self::DqtError(ref reason) => write!(f, "Error parsing DQT segment. Reason:{reason}"),
            Self::SosError(ref reason) => write!(f, "Error parsing SOS segment. Reason:{reason}"),
            Self::SofError(ref reason) => write!(f, "Error parsing SOF segment. Reason:{reason}"),
            Self::ZeroError => write!(f, "Image width or height is set to zero, cannot continue"),
            Self::LargeDimensions(dimensions) =>
            {
                write!(f, "Image dimensions {dimensions} larger than the library limit")
            }
            Self::ExhaustedData => write!(f, "The byte stream ended before the segment finished"),
            Self::Cancelled => write!(f, "Decoding cancelled by the caller"),
            Self::Unsupported(ref scheme) => write!(f, "{scheme:?}"),
        }
    }
}

impl Debug for DecodeErrors
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result
    {
        self.message(f)
    }
}

impl Display for DecodeErrors
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result
    {
        self.message(f)
    }
}

impl Error for DecodeErrors {}

/// Recognized but unimplemented JPEG coding processes.
#[derive(Eq, PartialEq, Copy, Clone)]
pub enum UnsupportedSchemes
{
    /// SOF_5/SOF_13, differential sequential
    DifferentialSequential,
    /// SOF_6/SOF_14, differential progressive
    DifferentialProgressive,
    /// SOF_7/SOF_15, differential lossless
    DifferentialLossless,
    /// DHP marker driven hierarchical progression
    Hierarchical,
}

impl Debug for UnsupportedSchemes
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result
    {
        match &self
        {
            Self::DifferentialSequential =>
            {
                write!(f, "The library does not decode differential sequential frames")
            }
            Self::DifferentialProgressive =>
            {
                write!(f, "The library does not decode differential progressive frames")
            }
            Self::DifferentialLossless =>
            {
                write!(f, "The library does not decode differential lossless frames")
            }
            Self::Hierarchical =>
            {
                write!(f, "The library does not decode hierarchical (DHP/EXP) images")
            }
        }
    }
}

impl UnsupportedSchemes
{
    /// Map an SOFn index to the unsupported scheme it selects, `None`
    /// when the index belongs to a supported frame type.
    #[must_use]
    pub fn from_sof_index(n: u8) -> Option<UnsupportedSchemes>
    {
        match n
        {
            5 | 13 => Some(Self::DifferentialSequential),
            6 | 14 => Some(Self::DifferentialProgressive),
            7 | 15 => Some(Self::DifferentialLossless),
            _ => None,
        }
    }
}

/// Errors the encoder can produce.
pub enum EncodeErrors
{
    /// Image dimensions are zero or larger than 65535
    BadDimensions(usize, usize),
    /// The surface carries a format the encoder cannot read
    UnsupportedFormat(&'static str),
    /// Writing to the output stream failed
    IoError(std::io::Error),
}

impl Debug for EncodeErrors
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result
    {
        match &self
        {
            Self::BadDimensions(w, h) =>
            {
                write!(f, "Cannot encode an image of dimensions {w} x {h}")
            }
            Self::UnsupportedFormat(fmt) =>
            {
                write!(f, "Cannot encode from surface format {fmt}")
            }
            Self::IoError(ref err) => write!(f, "Underlying stream error: {err}"),
        }
    }
}

impl Display for EncodeErrors
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result
    {
        <Self as Debug>::fmt(self, f)
    }
}

impl Error for EncodeErrors {}

impl From<std::io::Error> for EncodeErrors
{
    fn from(err: std::io::Error) -> Self
    {
        Self::IoError(err)
    }
}
