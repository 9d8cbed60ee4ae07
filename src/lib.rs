//! A JPEG decoder and encoder.
//!
//! The decoder handles baseline, extended sequential, progressive and
//! lossless frames with both Huffman and arithmetic (QM) entropy
//! coding, multi-threaded over MCU row bands and restart intervals. The
//! encoder writes baseline sequential streams with a restart marker per
//! MCU row so rows can be entropy coded in parallel.
//!
//! ```no_run
//! use zephyr_jpeg::{Decoder, DecoderOptions, SampleFormat};
//!
//! let data = std::fs::read("image.jpg").unwrap();
//! let mut decoder =
//!     Decoder::new_with_options(DecoderOptions::new().set_out_format(SampleFormat::RGB));
//! let pixels = decoder.decode(&data).unwrap();
//! ```
#![allow(
    clippy::needless_return,
    clippy::similar_names,
    clippy::inline_always,
    clippy::needless_range_loop,
    clippy::manual_range_contains
)]
#![warn(clippy::correctness, clippy::perf, clippy::pedantic)]
#[macro_use]
extern crate log;

pub use crate::decoder::{DecodeStatus, Decoder, ImageInfo};
pub use crate::encoder::{EncodeStatus, Encoder};
pub use crate::misc::{ColorTransform, SOFMarkers, SampleFormat};
pub use crate::options::{DecodeRect, DecoderOptions, EncoderOptions, ProgressFn};
pub use crate::surface::Surface;

mod arithmetic;
pub mod bitstream;
mod bitwriter;
mod color_convert;
mod components;
mod decoder;
mod encoder;
pub mod errors;
mod fdct;
mod headers;
mod huffman;
mod idct;
mod lossless;
mod marker;
mod mcu;
mod mcu_prog;
mod misc;
mod options;
mod state;
mod surface;
mod worker;
