//! The decoder: marker walk, table bookkeeping and the decode entry
//! points.
//!
//! Parsing is two-phase the way a picture viewer wants it: header mode
//! walks the stream only until the first SOF and records where the rest
//! begins, so dimensions and metadata are available without entropy
//! decoding; decode mode resumes from that byte range.

use std::sync::atomic::Ordering;

use crate::color_convert::choose_process_func;
use crate::errors::DecodeErrors;
use crate::headers::{
    parse_app, parse_dac, parse_dht, parse_dqt, parse_dri, parse_sos, parse_start_of_frame,
};
use crate::idct::choose_idct_func;
use crate::marker::Marker;
use crate::misc::{
    Aligned32, ByteReader, ColorTransform, SOFMarkers, SampleFormat, MAX_BLOCKS_IN_MCU,
    MAX_COMPONENTS,
};
use crate::options::DecoderOptions;
use crate::state::{DecodeState, ProcessState};
use crate::surface::Surface;
use crate::components::Frame;

/// Status of a successful decode.
pub struct DecodeStatus
{
    /// True when pixels were written straight into the caller's surface
    /// with no intermediate surface and final blit.
    pub direct: bool,
    /// Diagnostics: encoding, entropy coder and the chosen inner loops.
    pub info:   String,
}

/// A struct representing image information
#[derive(Default, Clone, Eq, PartialEq, Debug)]
pub struct ImageInfo
{
    /// Width of the image
    pub width:      u16,
    /// Height of the image
    pub height:     u16,
    /// Bits per sample (8, 12, or 2..16 for lossless)
    pub precision:  u8,
    /// Number of components
    pub components: u8,
    /// Start of frame marker classification
    pub sof:        SOFMarkers,
    /// Horizontal pixel density from JFIF
    pub x_density:  u16,
    /// Vertical pixel density from JFIF
    pub y_density:  u16,
}

/// A JPEG decoder instance.
pub struct Decoder
{
    pub(crate) options: DecoderOptions,
    pub(crate) info:    ImageInfo,

    /// Quantization tables in natural order.
    pub(crate) qt:     [Aligned32<[i16; 64]>; MAX_COMPONENTS],
    pub(crate) qt_set: [bool; MAX_COMPONENTS],

    pub(crate) decode_state: DecodeState,

    pub(crate) frames:          Vec<Frame>,
    /// Component of the current progressive AC scan.
    pub(crate) scan_frame:      Option<usize>,
    pub(crate) color_transform: ColorTransform,
    /// Raw Adobe APP14 transform byte, resolved at SOF.
    pub(crate) adobe_transform: Option<u8>,
    pub(crate) block_qt:        [usize; MAX_BLOCKS_IN_MCU],

    pub(crate) precision:  u8,
    pub(crate) components: usize,

    pub(crate) is_baseline:    bool,
    pub(crate) is_progressive: bool,
    pub(crate) is_multiscan:   bool,
    pub(crate) is_lossless:    bool,

    pub(crate) hmax:           usize,
    pub(crate) vmax:           usize,
    pub(crate) blocks_in_mcu:  usize,
    pub(crate) xblock:         usize,
    pub(crate) yblock:         usize,
    pub(crate) xmcu:           usize,
    pub(crate) ymcu:           usize,
    pub(crate) mcus:           usize,
    pub(crate) aligned_width:  usize,
    pub(crate) aligned_height: usize,

    pub(crate) restart_interval: usize,
    pub(crate) restart_counter:  usize,

    /// Byte offset of the stream after the SOF segment.
    pub(crate) scan_start:      usize,
    /// Byte offset of the current scan's entropy data.
    pub(crate) scan_data_start: usize,
    pub(crate) headers_done:    bool,

    // metadata payloads, captured but not parsed
    pub(crate) exif: Option<Vec<u8>>,
    pub(crate) xmp:  Option<Vec<u8>>,
    pub(crate) icc:  Vec<u8>,

    /// Per-MCU-row byte offsets from an APP14 "Mango1" chunk, they
    /// allow row-parallel entropy decode without restart markers.
    pub(crate) restart_offsets: Vec<u32>,
    pub(crate) decode_interval: usize,

    /// Whole-image coefficients for progressive and multi-scan decodes.
    pub(crate) coefficients: Vec<i16>,

    pub(crate) proc: Option<ProcessState>,

    pub(crate) encoding_name: &'static str,
    pub(crate) idct_name:     &'static str,
    pub(crate) process_name:  &'static str,
}

impl Decoder
{
    /// Create a new decoder with default options.
    #[must_use]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Decoder
    {
        Decoder::new_with_options(DecoderOptions::new())
    }

    /// Create a new decoder with the given options.
    #[must_use]
    pub fn new_with_options(options: DecoderOptions) -> Decoder
    {
        Decoder {
            options,
            info: ImageInfo::default(),
            qt: [
                Aligned32([0; 64]),
                Aligned32([0; 64]),
                Aligned32([0; 64]),
                Aligned32([0; 64]),
            ],
            qt_set: [false; MAX_COMPONENTS],
            decode_state: DecodeState::default(),
            frames: Vec::new(),
            scan_frame: None,
            color_transform: ColorTransform::Cmyk,
            adobe_transform: None,
            block_qt: [0; MAX_BLOCKS_IN_MCU],
            precision: 8,
            components: 0,
            is_baseline: true,
            is_progressive: false,
            is_multiscan: false,
            is_lossless: false,
            hmax: 1,
            vmax: 1,
            blocks_in_mcu: 0,
            xblock: 0,
            yblock: 0,
            xmcu: 0,
            ymcu: 0,
            mcus: 0,
            aligned_width: 0,
            aligned_height: 0,
            restart_interval: 0,
            restart_counter: 0,
            scan_start: 0,
            scan_data_start: 0,
            headers_done: false,
            exif: None,
            xmp: None,
            icc: Vec::new(),
            restart_offsets: Vec::new(),
            decode_interval: 0,
            coefficients: Vec::new(),
            proc: None,
            encoding_name: "",
            idct_name: "",
            process_name: "",
        }
    }

    /// Image width in pixels, zero until headers were parsed.
    #[must_use]
    pub fn width(&self) -> u16
    {
        self.info.width
    }

    /// Image height in pixels, zero until headers were parsed.
    #[must_use]
    pub fn height(&self) -> u16
    {
        self.info.height
    }

    /// Image information, `None` until headers were parsed.
    #[must_use]
    pub fn info(&self) -> Option<ImageInfo>
    {
        if !self.headers_done
        {
            return None;
        }
        Some(self.info.clone())
    }

    /// The raw Exif payload, when an APP1/APP3 segment carried one.
    #[must_use]
    pub fn exif(&self) -> Option<&[u8]>
    {
        self.exif.as_deref()
    }

    /// The raw XMP payload, when an APP1 segment carried one.
    #[must_use]
    pub fn xmp(&self) -> Option<&[u8]>
    {
        self.xmp.as_deref()
    }

    /// The ICC profile accumulated over APP2 segments, empty when the
    /// stream carries none.
    #[must_use]
    pub fn icc_profile(&self) -> &[u8]
    {
        &self.icc
    }

    /// MCU-aligned dimensions `(width, height)`, what a temporary
    /// decode surface must measure.
    #[must_use]
    pub fn aligned_dimensions(&self) -> (usize, usize)
    {
        (self.aligned_width, self.aligned_height)
    }

    /// True when the caller's cancel flag is raised.
    pub(crate) fn cancelled(&self) -> bool
    {
        self.options
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Parse headers up to (and including) the first SOF.
    ///
    /// # Errors
    /// On malformed or unsupported frame headers.
    pub fn decode_headers(&mut self, data: &[u8]) -> Result<(), DecodeErrors>
    {
        if self.headers_done
        {
            return Ok(());
        }

        let mut reader = ByteReader::new(data);

        let magic = reader.get_u16_be()?;
        if magic != 0xFFD8
        {
            return Err(DecodeErrors::IllegalMagicBytes(magic));
        }
        self.restart_interval = 0;

        loop
        {
            if self.cancelled()
            {
                return Err(DecodeErrors::Cancelled);
            }

            let marker = self.next_marker(&mut reader)?;

            match marker
            {
                Marker::SOF(n) =>
                {
                    parse_start_of_frame(self, &mut reader, n)?;

                    // header mode: stop here and remember where the
                    // scan data starts
                    self.scan_start = reader.position();
                    self.headers_done = true;
                    return Ok(());
                }
                Marker::EOI =>
                {
                    return Err(DecodeErrors::FormatStatic(
                        "Premature end of image, no frame header found",
                    ));
                }
                Marker::SOS =>
                {
                    return Err(DecodeErrors::SosError(
                        "Scan data before any frame header".to_string(),
                    ));
                }
                other => self.handle_marker(other, &mut reader)?,
            }
        }
    }

    /// Advance to the next marker, skipping `0xFF` padding runs.
    fn next_marker(&mut self, reader: &mut ByteReader) -> Result<Marker, DecodeErrors>
    {
        let byte = reader.get_u8();

        if byte != 0xFF
        {
            return Err(DecodeErrors::Format(format!(
                "Expected a marker, got byte {byte:#04X}"
            )));
        }

        let mut id = reader.get_u8();
        // ancient encoders pad with extra 0xFF bytes
        while id == 0xFF
        {
            if self.options.get_strict_mode()
            {
                return Err(DecodeErrors::FormatStatic(
                    "[strict-mode]: Extra padding bytes between markers",
                ));
            }

            if reader.remaining() == 0
            {
                return Err(DecodeErrors::ExhaustedData);
            }
            id = reader.get_u8();
        }

        Marker::from_u8(id).ok_or(DecodeErrors::FormatStatic("Invalid zero marker byte"))
    }

    /// Handle one table/metadata segment. SOF, SOS and EOI are handled
    /// by the phase-specific loops.
    pub(crate) fn handle_marker(
        &mut self, marker: Marker, reader: &mut ByteReader,
    ) -> Result<(), DecodeErrors>
    {
        match marker
        {
            Marker::DQT => parse_dqt(self, reader),
            Marker::DHT => parse_dht(self, reader),
            Marker::DAC => parse_dac(self, reader),
            Marker::DRI => parse_dri(self, reader),
            Marker::APP(n) => parse_app(self, reader, n),
            Marker::DNL =>
            {
                // accepted but the new height is never applied
                let length = reader.get_u16_be()?;
                let lines = reader.get_u16_be()?;
                info!("DNL: {} lines (ignored)", lines);
                reader.skip((length as usize).saturating_sub(4));
                Ok(())
            }
            Marker::DHP | Marker::EXP =>
            {
                // hierarchical progression markers are parsed for their
                // length and skipped, selecting a differential frame
                // later fails as unsupported
                warn!("Hierarchical marker {:?} present, ignoring segment", marker);
                self.skip_segment(reader)
            }
            Marker::SOI | Marker::RST(_) | Marker::TEM =>
            {
                // standalone markers, nothing to skip
                Ok(())
            }
            _ => self.skip_segment(reader),
        }
    }

    /// Skip a segment using its length field.
    fn skip_segment(&mut self, reader: &mut ByteReader) -> Result<(), DecodeErrors>
    {
        let length = reader.get_u16_be()?;

        if length < 2
        {
            return Err(DecodeErrors::Format(format!(
                "Found a marker with invalid length {length}"
            )));
        }

        reader.skip(usize::from(length) - 2);
        Ok(())
    }

    /// Decode to a freshly allocated pixel buffer in the configured
    /// output format.
    ///
    /// # Errors
    /// See [`DecodeErrors`]; entropy-level corruption does not error.
    pub fn decode(&mut self, data: &[u8]) -> Result<Vec<u8>, DecodeErrors>
    {
        self.decode_headers(data)?;

        let format = self.output_format();
        let mut surface = Surface::new(
            usize::from(self.info.width),
            usize::from(self.info.height),
            format,
        );

        self.decode_into(data, &mut surface)?;

        Ok(surface.into_data())
    }

    /// The sample format [`Self::decode`] will produce: the configured
    /// output format, except where the frame forces one.
    #[must_use]
    pub fn output_format(&self) -> SampleFormat
    {
        if self.is_lossless
        {
            // the lossless path only renders luminance or RGBA
            if self.components == 1
            {
                return SampleFormat::Y8;
            }
            return SampleFormat::RGBA;
        }

        if self.components == 4
        {
            // CMYK resolves to RGBA in the slow path
            return SampleFormat::RGBA;
        }

        self.options.get_out_format()
    }

    /// Decode into the caller's surface.
    ///
    /// When the surface's format matches [`Self::output_format`] and it
    /// is at least image sized, pixels land in it directly; otherwise a
    /// temporary MCU-aligned surface is decoded and blitted over with
    /// format conversion.
    ///
    /// # Errors
    /// Only header-level failures error; a truncated or corrupt entropy
    /// stream produces degraded pixels and `Ok`.
    pub fn decode_into(
        &mut self, data: &[u8], target: &mut Surface,
    ) -> Result<DecodeStatus, DecodeErrors>
    {
        self.decode_headers(data)?;

        let width = usize::from(self.info.width);
        let height = usize::from(self.info.height);
        let internal_format = self.output_format();

        // progressive and multi-scan images decode into a whole-image
        // coefficient buffer first
        if self.is_progressive
        {
            self.coefficients = vec![0; self.mcus * self.blocks_in_mcu * 64];
        }

        self.configure(internal_format)?;

        let direct = target.format() == internal_format
            && target.width() >= width
            && target.height() >= height;

        let mut status = DecodeStatus {
            direct,
            info: String::new(),
        };

        if direct
        {
            self.decode_body(data, target)?;
        }
        else
        {
            let mut temp =
                Surface::new(self.aligned_width, self.aligned_height, internal_format);

            self.decode_body(data, &mut temp)?;

            target.blit(0, 0, &temp);
        }

        self.coefficients = Vec::new();

        status.info = self.info_string();
        Ok(status)
    }

    /// Build the immutable processing configuration.
    fn configure(&mut self, format: SampleFormat) -> Result<(), DecodeErrors>
    {
        let (idct, idct_name) = choose_idct_func(self.precision, self.options.get_simd());

        // the lossless driver writes samples itself, it has no use for
        // a block process function
        let (process, process_name) = if self.is_lossless
        {
            (
                crate::color_convert::process_y_8bit as crate::state::ProcessFn,
                "Lossless",
            )
        }
        else
        {
            choose_process_func(
                format,
                self.components,
                self.xblock,
                self.yblock,
                self.blocks_in_mcu,
                self.color_transform,
            )?
        };

        self.idct_name = idct_name;
        self.process_name = process_name;

        if !self.is_lossless
        {
            for frame in &self.frames
            {
                if !self.qt_set[frame.tq]
                {
                    warn!(
                        "Component {} references quantization table {} which was never defined",
                        frame.component_id, frame.tq
                    );
                }
            }
        }

        self.proc = Some(ProcessState {
            qt: self.qt.clone(),
            block_qt: self.block_qt,
            blocks: self.blocks_in_mcu,
            frames: self.frames.clone(),
            color_transform: self.color_transform,
            idct,
            process,
        });

        Ok(())
    }

    /// Walk the post-SOF stream: table segments, scans, EOI.
    fn decode_body(&mut self, data: &[u8], surface: &mut Surface)
        -> Result<(), DecodeErrors>
    {
        let mut reader = ByteReader::new(data);
        reader.set_position(self.scan_start);

        loop
        {
            if self.cancelled()
            {
                return Err(DecodeErrors::Cancelled);
            }

            if reader.remaining() < 2
            {
                // the EOI marker is optional; plenty of writers drop it
                info!("Stream ended without an EOI marker");
                break;
            }

            let marker = match self.next_marker(&mut reader)
            {
                Ok(marker) => marker,
                Err(_) =>
                {
                    // garbage between segments, try to find the next marker
                    let next = crate::mcu::seek_marker(data, reader.position());
                    if next >= data.len()
                    {
                        break;
                    }
                    reader.set_position(next);
                    continue;
                }
            };

            match marker
            {
                Marker::EOI =>
                {
                    trace!("EOI reached");
                    break;
                }
                Marker::SOS =>
                {
                    parse_sos(self, &mut reader)?;

                    let next = self.decode_scan(data, reader.position(), surface)?;
                    reader.set_position(next);
                }
                Marker::SOF(_) =>
                {
                    return Err(DecodeErrors::SofError(
                        "Multiple frame headers in one stream".to_string(),
                    ));
                }
                other => self.handle_marker(other, &mut reader)?,
            }
        }

        if self.is_progressive || self.is_multiscan
        {
            self.finish_frame(surface)?;
        }

        Ok(())
    }

    /// Dispatch one parsed scan to the right driver. Returns the byte
    /// position parsing continues from.
    fn decode_scan(
        &mut self, data: &[u8], position: usize, surface: &mut Surface,
    ) -> Result<usize, DecodeErrors>
    {
        self.restart_counter = self.restart_interval;
        self.scan_data_start = position;

        self.decode_state.stream = crate::bitstream::BitStream::new(position);
        self.decode_state.stream.restart();

        if self.decode_state.is_arithmetic
        {
            let DecodeState {
                stream, arithmetic, ..
            } = &mut self.decode_state;
            arithmetic.restart(stream, data);
        }
        else
        {
            self.decode_state.huffman.restart();
        }

        if self.is_lossless
        {
            self.decode_lossless(data, surface)?;
        }
        else if self.is_multiscan
        {
            self.decode_multiscan(data)?;
        }
        else if self.is_progressive
        {
            self.decode_progressive(data)?;
        }
        else
        {
            self.decode_sequential(data, surface)?;
        }

        Ok(crate::mcu::seek_marker(
            data,
            self.decode_state.stream.position,
        ))
    }

    /// Diagnostics string carried in [`DecodeStatus`].
    fn info_string(&self) -> String
    {
        let mut info = String::from(self.encoding_name);

        info.push_str(", ");
        info.push_str(if self.decode_state.is_arithmetic
        {
            "Arithmetic"
        }
        else
        {
            "Huffman"
        });

        if !self.idct_name.is_empty()
        {
            info.push_str(", ");
            info.push_str(self.idct_name);
        }

        if !self.process_name.is_empty()
        {
            info.push_str(", ");
            info.push_str(self.process_name);
        }

        if self.restart_interval > 0
        {
            info.push_str(" [RST]");
        }

        info
    }
}
