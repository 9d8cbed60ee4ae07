//! Segment parsers for everything between SOI and the entropy data.
//!
//! A good guide on the marker layout can be found
//! [here](http://vip.sugovica.hu/Sardi/kepnezo/JPEG%20File%20Layout%20and%20Format.htm)

use crate::components::Frame;
use crate::decoder::Decoder;
use crate::errors::{DecodeErrors, UnsupportedSchemes};
use crate::huffman::HuffmanTable;
use crate::misc::{ByteReader, ColorTransform, SOFMarkers, MAX_BLOCKS_IN_MCU, MAX_COMPONENTS, MAX_DIMENSIONS, UN_ZIGZAG};
use crate::state::{DecodeBlock, McuCoder};

/// **B.2.4.1 Quantization table-specification syntax**
///
/// A single DQT segment may carry several tables; the payload is in
/// zig-zag order and is stored in natural order.
pub(crate) fn parse_dqt(decoder: &mut Decoder, reader: &mut ByteReader)
    -> Result<(), DecodeErrors>
{
    let qt_length = reader
        .get_u16_be()
        .map_err(|_| DecodeErrors::DqtError("Could not read DQT length".to_string()))?;

    let mut length_left = i32::from(qt_length) - 2;

    while length_left > 0
    {
        let qt_info = reader.get_u8();

        // 0 = 8 bit, 1 = 16 bit. The baseline-only limit of 0 is
        // relaxed on purpose, non-conforming files are common.
        let precision = (qt_info >> 4) as usize;
        let table_position = (qt_info & 0x0F) as usize;

        if precision > 1
        {
            return Err(DecodeErrors::DqtError(format!(
                "Expected QT precision of 0 or 1, found {precision}"
            )));
        }

        if table_position >= MAX_COMPONENTS
        {
            return Err(DecodeErrors::DqtError(format!(
                "Too large quantization table index {table_position}, expected between 0 and 3"
            )));
        }

        trace!(
            "Quantization table {} precision: {} bits",
            table_position,
            (precision + 1) * 8
        );

        let table = &mut decoder.qt[table_position].0;

        if precision == 0
        {
            let mut values = [0_u8; 64];
            reader.read_exact(&mut values).map_err(|_| {
                DecodeErrors::DqtError("Could not read quantization values".to_string())
            })?;

            for i in 0..64
            {
                table[UN_ZIGZAG[i]] = i16::from(values[i]);
            }
        }
        else
        {
            for i in 0..64
            {
                let value = reader.get_u16_be().map_err(|_| {
                    DecodeErrors::DqtError(
                        "Could not read 16 bit quantization values".to_string(),
                    )
                })?;
                table[UN_ZIGZAG[i]] = value as i16;
            }
        }

        decoder.qt_set[table_position] = true;

        length_left -= 1 + 64 * (precision as i32 + 1);
    }

    Ok(())
}

/// **B.2.4.2 Huffman table-specification syntax**
pub(crate) fn parse_dht(decoder: &mut Decoder, reader: &mut ByteReader)
    -> Result<(), DecodeErrors>
{
    let dht_length = reader.get_u16_be().map_err(|_| {
        DecodeErrors::HuffmanDecode("Could not read Huffman length from image".to_string())
    })?;

    let mut length_left = i32::from(dht_length) - 2;

    while length_left > 0
    {
        let ht_info = reader.get_u8();

        // table class: 0 = DC (or lossless), 1 = AC
        let dc_or_ac = (ht_info >> 4) & 0x0F;
        let index = (ht_info & 0x0F) as usize;

        if dc_or_ac > 1
        {
            return Err(DecodeErrors::HuffmanDecode(format!(
                "Invalid Huffman table class {dc_or_ac}"
            )));
        }
        if index >= MAX_COMPONENTS
        {
            return Err(DecodeErrors::HuffmanDecode(format!(
                "Invalid Huffman table destination {index}"
            )));
        }

        let mut counts = [0_u8; 17];
        reader.read_exact(&mut counts[1..]).map_err(|_| {
            DecodeErrors::HuffmanDecode("Could not read Huffman code counts".to_string())
        })?;

        let symbols_sum: u16 = counts.iter().map(|&c| u16::from(c)).sum();
        if symbols_sum > 256
        {
            return Err(DecodeErrors::HuffmanDecode(
                "Encountered Huffman table with excessive length in DHT".to_string(),
            ));
        }

        let symbols = reader.get_slice(usize::from(symbols_sum)).map_err(|_| {
            DecodeErrors::HuffmanDecode("Could not read Huffman symbols".to_string())
        })?;

        // building validates the canonical code assignment
        let table = HuffmanTable::new(&counts, symbols)?;

        if dc_or_ac == 0
        {
            decoder.decode_state.huffman.dc_tables[index] = Some(table);
        }
        else
        {
            decoder.decode_state.huffman.ac_tables[index] = Some(table);
        }

        length_left -= 17 + i32::from(symbols_sum);
    }

    Ok(())
}

/// **B.2.4.3 Arithmetic conditioning table-specification syntax**
pub(crate) fn parse_dac(decoder: &mut Decoder, reader: &mut ByteReader)
    -> Result<(), DecodeErrors>
{
    let la = reader
        .get_u16_be()
        .map_err(|_| DecodeErrors::ArithmeticDecode("Could not read DAC length".to_string()))?;

    if decoder.is_baseline && decoder.headers_done
    {
        return Err(DecodeErrors::ArithmeticDecode(
            "Baseline DCT does not support arithmetic coding tables".to_string(),
        ));
    }

    let n = (i32::from(la) - 2) / 2;

    if n > 32
    {
        return Err(DecodeErrors::ArithmeticDecode(format!(
            "Too many DAC entries ({n})"
        )));
    }

    for _ in 0..n
    {
        let x = reader.get_u8();
        let tc = (x >> 4) & 0x0F;
        let tb = usize::from(x & 0x0F);
        let cs = reader.get_u8();

        if tc > 1 || tb > 3
        {
            return Err(DecodeErrors::ArithmeticDecode(format!(
                "Invalid arithmetic table selector (Tc: {tc}, Tb: {tb})"
            )));
        }

        if tc == 0
        {
            // DC conditioning: L in the low nibble, U in the high one
            let l = cs & 0x0F;
            let u = cs >> 4;
            if u < l
            {
                return Err(DecodeErrors::ArithmeticDecode(format!(
                    "Invalid DC conditioning value {cs}"
                )));
            }
            decoder.decode_state.arithmetic.dc_l[tb] = l;
            decoder.decode_state.arithmetic.dc_u[tb] = u;
        }
        else
        {
            if cs < 1 || cs > 63
            {
                return Err(DecodeErrors::ArithmeticDecode(format!(
                    "Invalid AC conditioning value {cs}"
                )));
            }
            decoder.decode_state.arithmetic.ac_k[tb] = cs;
        }

        trace!("DAC entry Tc: {} Tb: {} Cs: {}", tc, tb, cs);
    }

    Ok(())
}

/// **B.2.4.4 Restart interval definition syntax**
pub(crate) fn parse_dri(decoder: &mut Decoder, reader: &mut ByteReader)
    -> Result<(), DecodeErrors>
{
    if reader.get_u16_be()? != 4
    {
        return Err(DecodeErrors::FormatStatic("Bad DRI length, corrupt JPEG"));
    }

    decoder.restart_interval = usize::from(reader.get_u16_be()?);
    decoder.restart_counter = decoder.restart_interval;

    info!("Restart interval: {} MCUs", decoder.restart_interval);

    Ok(())
}

/// Application segments.
///
/// JFIF density, Exif/XMP/ICC payload capture, the Adobe color
/// transform and the "Mango1" per-row offset chunk all live here; any
/// other APP is skipped.
pub(crate) fn parse_app(
    decoder: &mut Decoder, reader: &mut ByteReader, n: u8,
) -> Result<(), DecodeErrors>
{
    let length = reader.get_u16_be()? as usize;
    if length < 2
    {
        return Err(DecodeErrors::Format(format!(
            "APP{n} segment with invalid length {length}"
        )));
    }

    let payload = reader.get_slice(length - 2)?;

    match n
    {
        0 =>
        {
            // JFIF / JFXX
            if payload.len() >= 14
                && (payload.starts_with(b"JFIF\0") || payload.starts_with(b"JFXX\0"))
            {
                let body = &payload[5..];

                let x_density = u16::from(body[3]) << 8 | u16::from(body[4]);
                let y_density = u16::from(body[5]) << 8 | u16::from(body[6]);

                decoder.info.x_density = x_density;
                decoder.info.y_density = y_density;

                trace!("JFIF density: {} x {}", x_density, y_density);
            }
        }
        1 =>
        {
            const XMP_ID: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";

            if payload.starts_with(b"Exif\0\0") || payload.starts_with(b"Exif\0\xFF")
            {
                decoder.exif = Some(payload[6..].to_vec());
                trace!("EXIF: {} bytes", payload.len() - 6);
            }
            else if payload.starts_with(XMP_ID)
            {
                decoder.xmp = Some(payload[XMP_ID.len()..].to_vec());
                trace!("XMP: {} bytes", payload.len() - XMP_ID.len());
            }
        }
        2 =>
        {
            const ICC_ID: &[u8] = b"ICC_PROFILE\0";

            if payload.len() > ICC_ID.len() + 2 && payload.starts_with(ICC_ID)
            {
                let seq = payload[ICC_ID.len()];
                let total = payload[ICC_ID.len() + 1];
                let chunk = &payload[ICC_ID.len() + 2..];

                trace!("ICC: {} / {} ({} bytes)", seq, total, chunk.len());

                // markers have a maximum size, large profiles arrive split
                decoder.icc.extend_from_slice(chunk);
            }
        }
        3 =>
        {
            // 'META' and 'Meta' also carry Exif
            if payload.len() > 6
                && (payload.starts_with(b"META\0\0") || payload.starts_with(b"Meta\0\0"))
            {
                decoder.exif = Some(payload[6..].to_vec());
            }
        }
        14 =>
        {
            if payload.len() == 12 && payload.starts_with(b"Adobe")
            {
                // 0 - components are plain RGB/CMYK, 1 - YCbCr, 2 - YCCK;
                // resolved against the component count at SOF
                let transform = payload[11];
                if transform <= 2
                {
                    decoder.adobe_transform = Some(transform);
                    if decoder.components != 0
                    {
                        // APP14 after SOF, re-resolve right away
                        decoder.color_transform =
                            resolve_color_transform(decoder.adobe_transform, decoder.components);
                    }
                }
                trace!("Adobe color transform: {}", transform);
            }
            else if payload.starts_with(b"Mango1") && payload.len() >= 10
            {
                // per-MCU-row absolute byte offsets, they permit
                // row-parallel entropy decode with no restart markers
                let mut chunk = ByteReader::new(&payload[6..]);

                decoder.decode_interval = chunk.get_u32_be()? as usize;

                let intervals = (payload.len() - 10) / 4;
                decoder.restart_offsets.clear();
                for _ in 0..intervals
                {
                    decoder.restart_offsets.push(chunk.get_u32_be()?);
                }

                info!(
                    "Row offset chunk: interval {}, {} offsets",
                    decoder.decode_interval, intervals
                );
            }
        }
        _ =>
        {}
    }

    Ok(())
}

/// **B.2.2 Frame header syntax**
pub(crate) fn parse_start_of_frame(
    decoder: &mut Decoder, reader: &mut ByteReader, sof_index: u8,
) -> Result<(), DecodeErrors>
{
    if let Some(scheme) = UnsupportedSchemes::from_sof_index(sof_index)
    {
        return Err(DecodeErrors::Unsupported(scheme));
    }

    let Some(sof) = SOFMarkers::from_sof_index(sof_index)
    else
    {
        return Err(DecodeErrors::SofError(format!(
            "SOF{sof_index} is not a frame header"
        )));
    };

    let length = reader.get_u16_be()?;

    let precision = reader.get_u8();
    let height = reader.get_u16_be()?;
    let width = reader.get_u16_be()?;
    let num_components = usize::from(reader.get_u8());

    info!("Image: {} x {} x {} ({:?})", width, height, precision, sof);

    if length != (8 + 3 * num_components) as u16
    {
        return Err(DecodeErrors::SofError(format!(
            "Length of start of frame differs from expected {}, value is {}",
            8 + 3 * num_components,
            length
        )));
    }

    if width == 0 || height == 0
    {
        return Err(DecodeErrors::ZeroError);
    }

    if usize::from(width) * usize::from(height) > MAX_DIMENSIONS
    {
        return Err(DecodeErrors::LargeDimensions(
            usize::from(width) * usize::from(height),
        ));
    }

    if !(1..=MAX_COMPONENTS).contains(&num_components)
    {
        return Err(DecodeErrors::SofError(format!(
            "Unsupported number of components {num_components}"
        )));
    }

    decoder.is_baseline = sof == SOFMarkers::BaselineDct;
    decoder.is_progressive = sof.is_progressive();
    decoder.is_lossless = sof.is_lossless();
    decoder.is_multiscan = false;
    decoder.decode_state.is_arithmetic = sof.is_arithmetic();

    decoder.encoding_name = match sof
    {
        SOFMarkers::BaselineDct => "Baseline DCT",
        SOFMarkers::ExtendedSequentialHuffman | SOFMarkers::ExtendedSequentialDctArithmetic =>
        {
            "Extended sequential DCT"
        }
        SOFMarkers::ProgressiveDctHuffman | SOFMarkers::ProgressiveDctArithmetic =>
        {
            "Progressive DCT"
        }
        SOFMarkers::LosslessHuffman | SOFMarkers::LosslessArithmetic => "Lossless",
    };

    // precision limits depend on the coding process
    let precision_ok = if decoder.is_baseline
    {
        precision == 8
    }
    else if decoder.is_lossless
    {
        (2..=16).contains(&precision)
    }
    else
    {
        precision == 8 || precision == 12
    };

    if !precision_ok
    {
        return Err(DecodeErrors::SofError(format!(
            "Invalid sample precision {precision} for {:?}",
            sof
        )));
    }

    decoder.precision = precision;
    decoder.components = num_components;

    decoder.info.width = width;
    decoder.info.height = height;
    decoder.info.precision = precision;
    decoder.info.components = num_components as u8;
    decoder.info.sof = sof;

    let mut frames = Vec::with_capacity(num_components);

    let mut hmax = 0_usize;
    let mut vmax = 0_usize;
    let mut blocks_in_mcu = 0_usize;
    let mut offset = 0_usize;

    for _ in 0..num_components
    {
        let mut bytes = [0_u8; 3];
        reader.read_exact(&mut bytes)?;

        let mut frame = Frame::from_bytes(bytes, offset, decoder.is_lossless)?;

        if num_components == 1
        {
            // force the block size to 8x8 for grayscale images
            frame.hsf = 1;
            frame.vsf = 1;
        }

        hmax = hmax.max(frame.hsf);
        vmax = vmax.max(frame.vsf);
        blocks_in_mcu += frame.blocks_per_mcu();

        if blocks_in_mcu > MAX_BLOCKS_IN_MCU
        {
            return Err(DecodeErrors::SofError(format!(
                "Too many blocks in MCU ({blocks_in_mcu}), the limit is {MAX_BLOCKS_IN_MCU}"
            )));
        }

        for _ in 0..frame.blocks_per_mcu()
        {
            decoder.block_qt[offset] = frame.tq;
            offset += 1;
        }

        trace!(
            "Frame component {}: Hsf {} Vsf {} Tq {} offset {}",
            frame.component_id,
            frame.hsf,
            frame.vsf,
            frame.tq,
            frame.offset
        );

        frames.push(frame);
    }

    decoder.frames = frames;
    decoder.hmax = hmax;
    decoder.vmax = vmax;
    decoder.blocks_in_mcu = blocks_in_mcu;

    decoder.xblock = 8 * hmax;
    decoder.yblock = 8 * vmax;

    // align to the next MCU boundary
    decoder.aligned_width =
        (usize::from(width) + decoder.xblock - 1) / decoder.xblock * decoder.xblock;
    decoder.aligned_height =
        (usize::from(height) + decoder.yblock - 1) / decoder.yblock * decoder.yblock;

    decoder.xmcu = decoder.aligned_width / decoder.xblock;
    decoder.ymcu = decoder.aligned_height / decoder.yblock;
    decoder.mcus = decoder.xmcu * decoder.ymcu;

    // resolve the color transform now the component count is known
    decoder.color_transform = resolve_color_transform(decoder.adobe_transform, num_components);

    trace!(
        "{} MCUs ({} x {}), blocks in MCU: {}",
        decoder.mcus,
        decoder.xmcu,
        decoder.ymcu,
        blocks_in_mcu
    );

    Ok(())
}

/// Map the Adobe APP14 transform byte and the component count to the
/// transform the color pipeline applies.
fn resolve_color_transform(adobe: Option<u8>, components: usize) -> ColorTransform
{
    match (adobe, components)
    {
        (Some(0), 3) => ColorTransform::Rgb,
        (Some(0), _) | (None, 4) => ColorTransform::Cmyk,
        (Some(2), _) => ColorTransform::Ycck,
        _ => ColorTransform::YCbCr,
    }
}

/// **B.2.3 Scan header syntax**
///
/// Selects the scan components and entropy tables, reads the spectral
/// parameters and configures the entropy decoder for the scan.
pub(crate) fn parse_sos(decoder: &mut Decoder, reader: &mut ByteReader)
    -> Result<(), DecodeErrors>
{
    let length = reader.get_u16_be()?;
    let ns = usize::from(reader.get_u8());

    if length != (6 + 2 * ns) as u16
    {
        return Err(DecodeErrors::SosError("Bad SOS length, corrupt JPEG".to_string()));
    }

    if !(1..=MAX_COMPONENTS).contains(&ns)
    {
        return Err(DecodeErrors::SosError(format!(
            "Number of scan components should be between 1 and 4, found {ns}"
        )));
    }

    if ns != decoder.components && !decoder.is_progressive
    {
        // sequential scans over a component subset: the frame needs the
        // whole-image coefficient buffer and a final process pass
        decoder.is_multiscan = true;

        if decoder.coefficients.is_empty()
        {
            decoder.coefficients = vec![0; decoder.mcus * decoder.blocks_in_mcu * 64];
        }
    }

    let state = &mut decoder.decode_state;
    state.comps_in_scan = ns;
    state.blocks = 0;

    // table selector limits per coding process
    let (max_dc, max_ac) = if decoder.is_baseline
    {
        (1, 1)
    }
    else if decoder.is_lossless
    {
        (3, 0)
    }
    else
    {
        (3, 3)
    };

    for _ in 0..ns
    {
        let cs = reader.get_u8();
        let tables = reader.get_u8();

        let dc = usize::from((tables >> 4) & 0x0F);
        let ac = usize::from(tables & 0x0F);

        if dc > max_dc || ac > max_ac
        {
            return Err(DecodeErrors::SosError(format!(
                "Invalid coding table selector (DC: {dc}, AC: {ac})"
            )));
        }

        // find the frame component this scan selector names
        let Some(pred) = decoder
            .frames
            .iter()
            .position(|frame| frame.component_id == cs)
        else
        {
            return Err(DecodeErrors::SosError(format!(
                "Scan component selector {cs} matches no frame component"
            )));
        };

        let frame = decoder.frames[pred];
        decoder.scan_frame = Some(pred);

        let mut offset = frame.offset;
        for _ in 0..frame.blocks_per_mcu()
        {
            if state.blocks >= MAX_BLOCKS_IN_MCU
            {
                return Err(DecodeErrors::SosError(format!(
                    "Too many blocks in scan, the limit is {MAX_BLOCKS_IN_MCU}"
                )));
            }

            state.block[state.blocks] = DecodeBlock {
                offset: offset * 64,
                pred,
                dc,
                ac,
            };

            offset += 1;
            state.blocks += 1;
        }
    }

    let ss = usize::from(reader.get_u8());
    let se = usize::from(reader.get_u8());

    let approx = reader.get_u8();
    let ah = (approx >> 4) & 0x0F;
    let al = approx & 0x0F;

    // spectral range limits per coding process
    let spectral_ok = if decoder.is_progressive
    {
        ss <= 63 && se >= ss && se <= 63 && ah <= 13 && al <= 13
    }
    else if decoder.is_lossless
    {
        // Ss selects the predictor, Al the point transform
        (1..=7).contains(&ss) && se == 0 && ah == 0 && al <= 15
    }
    else
    {
        ss == 0 && se == 63 && ah == 0 && al == 0
    };

    if !spectral_ok
    {
        return Err(DecodeErrors::SosError(format!(
            "Invalid spectral range Ss {ss} Se {se} Ah {ah} Al {al}"
        )));
    }

    if decoder.is_progressive && ss != 0 && ns != 1
    {
        return Err(DecodeErrors::SosError(
            "Progressive AC scans cannot be interleaved".to_string(),
        ));
    }

    state.spectral_start = ss;
    state.spectral_end = se;
    state.successive_high = ah;
    state.successive_low = al;

    trace!("Scan: {} components, Ss {} Se {} Ah {} Al {}", ns, ss, se, ah, al);

    // choose the decode routine
    let arithmetic = state.is_arithmetic;
    let dc_scan = ss == 0;
    let refining = ah != 0;

    state.coder = if decoder.is_lossless
    {
        if arithmetic
        {
            McuCoder::ArithLossless
        }
        else
        {
            McuCoder::HuffLossless
        }
    }
    else if decoder.is_progressive
    {
        match (dc_scan, refining, arithmetic)
        {
            (true, false, false) => McuCoder::HuffDcFirst,
            (true, true, false) => McuCoder::HuffDcRefine,
            (false, false, false) => McuCoder::HuffAcFirst,
            (false, true, false) => McuCoder::HuffAcRefine,
            (true, false, true) => McuCoder::ArithDcFirst,
            (true, true, true) => McuCoder::ArithDcRefine,
            (false, false, true) => McuCoder::ArithAcFirst,
            (false, true, true) => McuCoder::ArithAcRefine,
        }
    }
    else if arithmetic
    {
        McuCoder::ArithSequential
    }
    else
    {
        McuCoder::HuffSequential
    };

    Ok(())
}
