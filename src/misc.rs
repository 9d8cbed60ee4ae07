//! Small shared types, tables and limits.
//!
//! Most of the things in this file are consumed by nearly every other module,
//! i.e the zig-zag tables, the frame marker classification and the byte reader
//! the header parser uses to walk segment payloads.

use std::fmt;

use crate::errors::DecodeErrors;

/// Maximum number of components the library decodes (Y/Cb/Cr/K).
pub const MAX_COMPONENTS: usize = 4;

/// Maximum number of 8x8 blocks a single MCU may carry, a limit imposed
/// by the JPEG specification (sum of `hs*vs` over scan components).
pub const MAX_BLOCKS_IN_MCU: usize = 10;

/// Maximum number of samples in one MCU (`64 * MAX_BLOCKS_IN_MCU`).
pub const MAX_SAMPLES_IN_MCU: usize = 64 * MAX_BLOCKS_IN_MCU;

/// Maximum number of pixels (w*h) we are willing to allocate for.
pub const MAX_DIMENSIONS: usize = 1 << 27;

/// Undo run length encoding of coefficients by placing them in natural order.
///
/// Maps a zig-zag position to its row-major position in the 8x8 block.
#[rustfmt::skip]
pub const UN_ZIGZAG: [usize; 64] = [
    0,  1,  8,  16, 9,  2,  3, 10,
    17, 24, 32, 25, 18, 11, 4,  5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13, 6,  7,  14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63,
];

/// The inverse of [`UN_ZIGZAG`].
///
/// Maps a row-major position in the 8x8 block to its zig-zag position,
/// used when emitting tables and coefficients in the encoder.
#[rustfmt::skip]
pub const ZIGZAG_NATURAL: [usize; 64] = [
    0,  1,  5,  6,  14, 15, 27, 28,
    2,  4,  7,  13, 16, 26, 29, 42,
    3,  8,  12, 17, 25, 30, 41, 43,
    9,  11, 18, 24, 31, 40, 44, 53,
    10, 19, 23, 32, 39, 45, 52, 54,
    20, 22, 33, 38, 46, 51, 55, 60,
    21, 34, 37, 47, 50, 56, 59, 61,
    35, 36, 48, 49, 57, 58, 62, 63,
];

/// Align data to a 32 byte boundary
#[repr(align(32))]
#[derive(Clone)]
pub struct Aligned32<T: ?Sized>(pub T);

impl<T> Default for Aligned32<T>
where
    T: Default,
{
    fn default() -> Self
    {
        Aligned32(T::default())
    }
}

/// Align data to a 64 byte boundary, matches a cache line and the widest
/// vector loads the SIMD paths issue.
#[repr(align(64))]
#[derive(Clone)]
pub struct Aligned64<T: ?Sized>(pub T);

impl<T> Default for Aligned64<T>
where
    T: Default,
{
    fn default() -> Self
    {
        Aligned64(T::default())
    }
}

/// Sample formats the decoder can write and the encoder can read.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SampleFormat
{
    /// 8 bit luminance
    Y8,
    /// Blue,Green,Red interleaved, 3 bytes per pixel
    BGR,
    /// Red,Green,Blue interleaved, 3 bytes per pixel
    RGB,
    /// Blue,Green,Red,Alpha. Alpha is set to 255.
    BGRA,
    /// Red,Green,Blue,Alpha. Alpha is set to 255.
    RGBA,
}

impl SampleFormat
{
    /// Number of bytes a single pixel occupies in this format
    #[must_use]
    pub const fn num_components(self) -> usize
    {
        match self
        {
            Self::Y8 => 1,
            Self::BGR | Self::RGB => 3,
            Self::BGRA | Self::RGBA => 4,
        }
    }

    /// True if the format carries an alpha byte
    #[must_use]
    pub const fn has_alpha(self) -> bool
    {
        matches!(self, Self::BGRA | Self::RGBA)
    }
}

impl Default for SampleFormat
{
    fn default() -> Self
    {
        SampleFormat::RGBA
    }
}

/// Color transform of a 3/4 component image, set by the APP14 Adobe
/// segment (or inferred from the component count when it is absent).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ColorTransform
{
    /// Plain CMYK, no transform applied
    Cmyk,
    /// YCbCr, the common case
    YCbCr,
    /// YCbCr applied on top of CMY, K passes through
    Ycck,
    /// Components are plain R,G,B (Adobe transform=0 with 3 components)
    Rgb,
}

/// Start of frame markers
///
/// They identify the coding process, whether the file is lossy (DCT) or
/// lossless and whether the entropy coding is Huffman or arithmetic.
#[derive(Eq, PartialEq, Copy, Clone)]
#[allow(clippy::upper_case_acronyms)]
pub enum SOFMarkers
{
    /// Baseline DCT
    BaselineDct,
    /// SOF_1 Extended sequential DCT, Huffman coding
    ExtendedSequentialHuffman,
    /// Progressive DCT, Huffman coding
    ProgressiveDctHuffman,
    /// Lossless (sequential), Huffman coding
    LosslessHuffman,
    /// Extended sequential DCT, arithmetic coding
    ExtendedSequentialDctArithmetic,
    /// Progressive DCT, arithmetic coding
    ProgressiveDctArithmetic,
    /// Lossless (sequential), arithmetic coding
    LosslessArithmetic,
}

impl Default for SOFMarkers
{
    fn default() -> Self
    {
        Self::BaselineDct
    }
}

impl SOFMarkers
{
    /// Check if a frame is sequential DCT or not
    #[must_use]
    pub fn is_sequential_dct(self) -> bool
    {
        matches!(
            self,
            Self::BaselineDct
                | Self::ExtendedSequentialHuffman
                | Self::ExtendedSequentialDctArithmetic
        )
    }

    /// Check if a frame is lossless or not
    #[must_use]
    pub fn is_lossless(self) -> bool
    {
        matches!(self, Self::LosslessHuffman | Self::LosslessArithmetic)
    }

    /// Check whether a frame is progressive or not
    #[must_use]
    pub fn is_progressive(self) -> bool
    {
        matches!(
            self,
            Self::ProgressiveDctHuffman | Self::ProgressiveDctArithmetic
        )
    }

    /// Check whether the frame uses the QM arithmetic coder
    #[must_use]
    pub fn is_arithmetic(self) -> bool
    {
        matches!(
            self,
            Self::ExtendedSequentialDctArithmetic
                | Self::ProgressiveDctArithmetic
                | Self::LosslessArithmetic
        )
    }

    /// Map an SOFn index (the `n`) to a marker classification.
    ///
    /// Differential frames (5..7, 13..15) have no classification here,
    /// they are rejected earlier as unsupported.
    #[must_use]
    pub fn from_sof_index(n: u8) -> Option<SOFMarkers>
    {
        match n
        {
            0 => Some(Self::BaselineDct),
            1 => Some(Self::ExtendedSequentialHuffman),
            2 => Some(Self::ProgressiveDctHuffman),
            3 => Some(Self::LosslessHuffman),
            9 => Some(Self::ExtendedSequentialDctArithmetic),
            10 => Some(Self::ProgressiveDctArithmetic),
            11 => Some(Self::LosslessArithmetic),
            _ => None,
        }
    }
}

impl fmt::Debug for SOFMarkers
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match &self
        {
            Self::BaselineDct => write!(f, "Baseline DCT"),
            Self::ExtendedSequentialHuffman =>
            {
                write!(f, "Extended sequential DCT, Huffman coding")
            }
            Self::ProgressiveDctHuffman => write!(f, "Progressive DCT, Huffman coding"),
            Self::LosslessHuffman => write!(f, "Lossless (sequential), Huffman coding"),
            Self::ExtendedSequentialDctArithmetic =>
            {
                write!(f, "Extended sequential DCT, arithmetic coding")
            }
            Self::ProgressiveDctArithmetic => write!(f, "Progressive DCT, arithmetic coding"),
            Self::LosslessArithmetic => write!(f, "Lossless (sequential), arithmetic coding"),
        }
    }
}

/// A big-endian byte reader over an in-memory slice.
///
/// The whole decoder operates on a complete in-memory stream, so this is
/// just a cursor; the entropy-coded section is handled separately by
/// [`crate::bitstream::BitStream`].
pub struct ByteReader<'a>
{
    buf:      &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a>
{
    pub fn new(buf: &'a [u8]) -> ByteReader<'a>
    {
        ByteReader { buf, position: 0 }
    }

    /// Read one byte, returning zero when the stream is exhausted.
    ///
    /// Incomplete files are common enough in the wild that the parser
    /// prefers zero filling over hard errors for single byte reads.
    #[inline]
    pub fn get_u8(&mut self) -> u8
    {
        let byte = *self.buf.get(self.position).unwrap_or(&0);
        self.position += 1;
        byte
    }

    /// Read a big-endian u16, erroring when there are not enough bytes.
    #[inline]
    pub fn get_u16_be(&mut self) -> Result<u16, DecodeErrors>
    {
        if self.position + 2 > self.buf.len()
        {
            return Err(DecodeErrors::ExhaustedData);
        }
        let value = u16::from_be_bytes([self.buf[self.position], self.buf[self.position + 1]]);
        self.position += 2;
        Ok(value)
    }

    /// Read a big-endian u32, erroring when there are not enough bytes.
    #[inline]
    pub fn get_u32_be(&mut self) -> Result<u32, DecodeErrors>
    {
        if self.position + 4 > self.buf.len()
        {
            return Err(DecodeErrors::ExhaustedData);
        }
        let mut bytes = [0; 4];
        bytes.copy_from_slice(&self.buf[self.position..self.position + 4]);
        self.position += 4;
        Ok(u32::from_be_bytes(bytes))
    }

    /// Read exactly `buf.len()` bytes into `buf`.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), DecodeErrors>
    {
        if self.position + buf.len() > self.buf.len()
        {
            return Err(DecodeErrors::ExhaustedData);
        }
        buf.copy_from_slice(&self.buf[self.position..self.position + buf.len()]);
        self.position += buf.len();
        Ok(())
    }

    /// Borrow `len` bytes without copying, erroring on exhaustion.
    pub fn get_slice(&mut self, len: usize) -> Result<&'a [u8], DecodeErrors>
    {
        if self.position + len > self.buf.len()
        {
            return Err(DecodeErrors::ExhaustedData);
        }
        let slice = &self.buf[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    /// Skip `n` bytes, saturating at the end of the stream.
    #[inline]
    pub fn skip(&mut self, n: usize)
    {
        self.position = (self.position + n).min(self.buf.len());
    }

    #[inline]
    #[must_use]
    pub fn position(&self) -> usize
    {
        self.position
    }

    #[inline]
    pub fn set_position(&mut self, position: usize)
    {
        self.position = position.min(self.buf.len());
    }

    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize
    {
        self.buf.len().saturating_sub(self.position)
    }

    /// Peek at the byte `offset` positions ahead without advancing.
    #[inline]
    #[must_use]
    pub fn peek_at(&self, offset: usize) -> Option<u8>
    {
        self.buf.get(self.position + offset).copied()
    }

    /// The whole underlying stream.
    #[inline]
    #[must_use]
    pub fn inner(&self) -> &'a [u8]
    {
        self.buf
    }
}
