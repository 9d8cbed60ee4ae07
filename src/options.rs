//! Decoder and encoder options.
//!
//! Options are built with chained setters and handed to
//! [`crate::Decoder::new_with_options`] or [`crate::Encoder::new`].

use std::num::NonZeroU32;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::misc::SampleFormat;

/// A rectangle of decoded pixels handed to the progress callback.
///
/// `progress` is the fraction of image height this update covers, the
/// accumulated fractions over a full decode sum to 1.0.
#[derive(Debug, Copy, Clone)]
pub struct DecodeRect
{
    pub x:        usize,
    pub y:        usize,
    pub width:    usize,
    pub height:   usize,
    pub progress: f32,
}

/// Progress callback invoked when a band of pixels has been written.
///
/// Called from worker threads in arbitrary order; the caller is
/// responsible for any serialization it needs.
pub type ProgressFn = Arc<dyn Fn(&DecodeRect) + Send + Sync>;

/// Options for the decoder.
#[derive(Clone)]
pub struct DecoderOptions
{
    pub(crate) out_format:  SampleFormat,
    pub(crate) multithread: bool,
    pub(crate) simd:        bool,
    pub(crate) strict:      bool,
    pub(crate) num_threads: Option<NonZeroU32>,
    pub(crate) callback:    Option<ProgressFn>,
    pub(crate) cancel:      Option<Arc<AtomicBool>>,
}

impl DecoderOptions
{
    #[must_use]
    pub fn new() -> DecoderOptions
    {
        DecoderOptions {
            out_format:  SampleFormat::RGBA,
            multithread: true,
            simd:        true,
            strict:      false,
            num_threads: None,
            callback:    None,
            cancel:      None,
        }
    }

    /// Set the sample format pixels are written in.
    #[must_use]
    pub fn set_out_format(mut self, format: SampleFormat) -> Self
    {
        self.out_format = format;
        self
    }

    /// Enable or disable threaded decoding.
    #[must_use]
    pub fn set_multithread(mut self, yes: bool) -> Self
    {
        self.multithread = yes;
        self
    }

    /// Enable or disable runtime SIMD dispatch; when disabled the scalar
    /// paths run everywhere.
    #[must_use]
    pub fn set_simd(mut self, yes: bool) -> Self
    {
        self.simd = yes;
        self
    }

    /// In strict mode some tolerated stream defects become hard errors.
    #[must_use]
    pub fn set_strict_mode(mut self, yes: bool) -> Self
    {
        self.strict = yes;
        self
    }

    /// Pin the number of worker threads instead of using the CPU count.
    #[must_use]
    pub fn set_num_threads(mut self, threads: NonZeroU32) -> Self
    {
        self.num_threads = Some(threads);
        self
    }

    /// Install a progress callback, see [`DecodeRect`].
    #[must_use]
    pub fn set_callback(mut self, callback: ProgressFn) -> Self
    {
        self.callback = Some(callback);
        self
    }

    /// Install a cancellation flag; it is polled before every MCU row
    /// band and before every dispatched task.
    #[must_use]
    pub fn set_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self
    {
        self.cancel = Some(flag);
        self
    }

    #[must_use]
    pub fn get_out_format(&self) -> SampleFormat
    {
        self.out_format
    }

    #[must_use]
    pub fn get_multithread(&self) -> bool
    {
        self.multithread
    }

    #[must_use]
    pub fn get_simd(&self) -> bool
    {
        self.simd
    }

    #[must_use]
    pub fn get_strict_mode(&self) -> bool
    {
        self.strict
    }

    /// Number of worker threads a threaded decode will use.
    #[must_use]
    pub fn get_num_threads(&self) -> usize
    {
        if !self.multithread
        {
            return 1;
        }
        self.num_threads
            .map_or_else(num_cpus::get, |v| v.get() as usize)
    }
}

impl Default for DecoderOptions
{
    fn default() -> Self
    {
        Self::new()
    }
}

/// Options for the encoder.
#[derive(Clone)]
pub struct EncoderOptions
{
    pub(crate) quality:     f32,
    pub(crate) icc:         Vec<u8>,
    pub(crate) multithread: bool,
    pub(crate) simd:        bool,
    pub(crate) num_threads: Option<NonZeroU32>,
}

impl EncoderOptions
{
    #[must_use]
    pub fn new() -> EncoderOptions
    {
        EncoderOptions {
            quality:     0.9,
            icc:         Vec::new(),
            multithread: true,
            simd:        true,
            num_threads: None,
        }
    }

    /// Set encode quality, `0.0` (worst) to `1.0` (best). Values outside
    /// the range are clamped.
    #[must_use]
    pub fn set_quality(mut self, quality: f32) -> Self
    {
        self.quality = quality.clamp(0.0, 1.0);
        self
    }

    /// Embed an ICC profile; it is written as numbered APP2 segments.
    #[must_use]
    pub fn set_icc_profile(mut self, icc: Vec<u8>) -> Self
    {
        self.icc = icc;
        self
    }

    /// Enable or disable threaded encoding.
    #[must_use]
    pub fn set_multithread(mut self, yes: bool) -> Self
    {
        self.multithread = yes;
        self
    }

    /// Enable or disable runtime SIMD dispatch.
    #[must_use]
    pub fn set_simd(mut self, yes: bool) -> Self
    {
        self.simd = yes;
        self
    }

    /// Pin the number of worker threads instead of using the CPU count.
    #[must_use]
    pub fn set_num_threads(mut self, threads: NonZeroU32) -> Self
    {
        self.num_threads = Some(threads);
        self
    }

    #[must_use]
    pub fn get_quality(&self) -> f32
    {
        self.quality
    }

    #[must_use]
    pub fn get_num_threads(&self) -> usize
    {
        if !self.multithread
        {
            return 1;
        }
        self.num_threads
            .map_or_else(num_cpus::get, |v| v.get() as usize)
    }
}

impl Default for EncoderOptions
{
    fn default() -> Self
    {
        Self::new()
    }
}
