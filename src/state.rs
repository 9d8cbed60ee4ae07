//! Entropy-decode and pixel-process state.
//!
//! The two halves of the pipeline keep separate state on purpose: the
//! entropy side (`DecodeState`) is cloned per task when restart
//! intervals allow parallel decoding, while the process side
//! (`ProcessState`) is immutable after the frame headers are parsed and
//! is shared by every worker.

use crate::arithmetic::ArithmeticDecoder;
use crate::bitstream::BitStream;
use crate::components::Frame;
use crate::huffman::HuffmanDecoder;
use crate::misc::{Aligned32, ColorTransform, MAX_BLOCKS_IN_MCU, MAX_COMPONENTS};

/// One block slot of the current scan: where its coefficients go inside
/// the MCU, which component predictor it belongs to and which entropy
/// tables code it.
#[derive(Copy, Clone, Default, Debug)]
pub(crate) struct DecodeBlock
{
    /// Coefficient offset of this block inside the MCU buffer.
    pub offset: usize,
    /// Component (predictor) index in scan order.
    pub pred:   usize,
    /// DC table destination selector.
    pub dc:     usize,
    /// AC table destination selector.
    pub ac:     usize,
}

/// Which of the twelve entropy decode routines the current scan uses.
///
/// Selected once per SOS; the per-MCU dispatch is a plain match so the
/// hot loops stay monomorphic.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum McuCoder
{
    HuffSequential,
    HuffLossless,
    HuffDcFirst,
    HuffDcRefine,
    HuffAcFirst,
    HuffAcRefine,
    ArithSequential,
    ArithLossless,
    ArithDcFirst,
    ArithDcRefine,
    ArithAcFirst,
    ArithAcRefine,
}

/// Everything the entropy decoders touch while walking a scan.
#[derive(Clone)]
pub(crate) struct DecodeState
{
    pub stream:     BitStream,
    pub huffman:    HuffmanDecoder,
    pub arithmetic: ArithmeticDecoder,

    pub is_arithmetic: bool,

    pub block:  [DecodeBlock; MAX_BLOCKS_IN_MCU],
    pub blocks: usize,

    pub comps_in_scan: usize,

    pub spectral_start:  usize,
    pub spectral_end:    usize,
    pub successive_high: u8,
    pub successive_low:  u8,

    pub coder: McuCoder,
}

impl Default for DecodeState
{
    fn default() -> Self
    {
        DecodeState {
            stream:          BitStream::new(0),
            huffman:         HuffmanDecoder::default(),
            arithmetic:      ArithmeticDecoder::default(),
            is_arithmetic:   false,
            block:           [DecodeBlock::default(); MAX_BLOCKS_IN_MCU],
            blocks:          0,
            comps_in_scan:   0,
            spectral_start:  0,
            spectral_end:    63,
            successive_high: 0,
            successive_low:  0,
            coder:           McuCoder::HuffSequential,
        }
    }
}

impl DecodeState
{
    /// Decode the next MCU (or block, for progressive scans) into
    /// `output` with the routine the current scan selected.
    #[inline]
    pub fn decode_mcu(&mut self, input: &[u8], output: &mut [i16])
    {
        match self.coder
        {
            McuCoder::HuffSequential => self.huff_decode_mcu(input, output),
            McuCoder::HuffLossless => self.huff_decode_mcu_lossless(input, output),
            McuCoder::HuffDcFirst => self.huff_decode_dc_first(input, output),
            McuCoder::HuffDcRefine => self.huff_decode_dc_refine(input, output),
            McuCoder::HuffAcFirst => self.huff_decode_ac_first(input, output),
            McuCoder::HuffAcRefine => self.huff_decode_ac_refine(input, output),
            McuCoder::ArithSequential => self.arith_decode_mcu(input, output),
            McuCoder::ArithLossless => self.arith_decode_mcu_lossless(input, output),
            McuCoder::ArithDcFirst => self.arith_decode_dc_first(input, output),
            McuCoder::ArithDcRefine => self.arith_decode_dc_refine(input, output),
            McuCoder::ArithAcFirst => self.arith_decode_ac_first(input, output),
            McuCoder::ArithAcRefine => self.arith_decode_ac_refine(input, output),
        }
    }

    /// Reset the entropy state after a restart marker.
    ///
    /// For Huffman scans this clears the bit buffer and DC predictors,
    /// for arithmetic scans the coder re-initializes itself from the two
    /// bytes following the marker.
    pub fn restart(&mut self, input: &[u8])
    {
        self.stream.restart();

        if self.is_arithmetic
        {
            let DecodeState {
                stream, arithmetic, ..
            } = self;
            arithmetic.restart(stream, input);
        }
        else
        {
            self.huffman.restart();
        }
    }

    /// The per-component last-DC slot shared by the lossless drivers,
    /// it lives on whichever coder the scan uses.
    pub fn set_last_dc(&mut self, component: usize, value: i32)
    {
        if self.is_arithmetic
        {
            self.arithmetic.last_dc[component] = value;
        }
        else
        {
            self.huffman.last_dc[component] = value;
        }
    }
}

/// Dequantize-and-IDCT function: 64 coefficients and a quantization
/// table in, 64 clamped bytes out.
pub(crate) type IdctFn = fn(dest: &mut [u8; 64], data: &[i16], qt: &[i16; 64]);

/// Process function: convert one decoded MCU into a destination pixel
/// rectangle of `width x height` at the given byte stride.
pub(crate) type ProcessFn =
    fn(dest: &mut [u8], stride: usize, data: &[i16], state: &ProcessState, width: usize, height: usize);

/// Immutable per-frame processing configuration, computed once after
/// SOF/SOS and shared read-only between worker threads.
#[derive(Clone)]
pub(crate) struct ProcessState
{
    /// Quantization tables in natural order.
    pub qt:       [Aligned32<[i16; 64]>; MAX_COMPONENTS],
    /// Per MCU-block quantization table selector.
    pub block_qt: [usize; MAX_BLOCKS_IN_MCU],
    /// Number of blocks in one MCU.
    pub blocks:   usize,

    /// Frame components in frame order.
    pub frames: Vec<Frame>,

    pub color_transform: ColorTransform,

    pub idct:    IdctFn,
    pub process: ProcessFn,
}

impl ProcessState
{
    /// Quantization table for MCU block `i`.
    #[inline(always)]
    pub fn block_table(&self, i: usize) -> &[i16; 64]
    {
        &self.qt[self.block_qt[i]].0
    }
}
