//! Hand-built baseline streams: chroma subsampling topologies, 16 bit
//! quantization tables, the arithmetic coder and the per-row offset
//! chunk.

mod common;

use common::{
    gradient_surface, huffman_code, push_diff, BitPusher, JpegBuilder, STD_AC_CHROMA_COUNTS,
    STD_AC_CHROMA_SYMBOLS, STD_AC_LUMA_COUNTS, STD_AC_LUMA_SYMBOLS, STD_DC_CHROMA_COUNTS,
    STD_DC_LUMA_COUNTS, STD_DC_SYMBOLS,
};
use zephyr_jpeg::{Decoder, DecoderOptions, Encoder, EncoderOptions, SampleFormat};

/// Push one flat (all zero) block: DC diff 0 then EOB.
fn push_flat_luma_block(bits: &mut BitPusher)
{
    push_diff(bits, &STD_DC_LUMA_COUNTS, &STD_DC_SYMBOLS, 0);
    let (eob, eob_len) = huffman_code(&STD_AC_LUMA_COUNTS, &STD_AC_LUMA_SYMBOLS, 0x00);
    bits.push(eob, eob_len);
}

fn push_flat_chroma_block(bits: &mut BitPusher)
{
    push_diff(bits, &STD_DC_CHROMA_COUNTS, &STD_DC_SYMBOLS, 0);
    let (eob, eob_len) = huffman_code(&STD_AC_CHROMA_COUNTS, &STD_AC_CHROMA_SYMBOLS, 0x00);
    bits.push(eob, eob_len);
}

/// Build a single-MCU color image with the given luma sampling byte and
/// check it decodes to flat mid-gray.
fn assert_flat_subsampled(sampling: u8, width: u16, height: u16, luma_blocks: usize)
{
    let mut builder = JpegBuilder::new();
    builder
        .unit_dqt(0)
        .sof(
            0,
            8,
            width,
            height,
            &[(1, sampling, 0), (2, 0x11, 0), (3, 0x11, 0)],
        )
        .std_huffman_tables()
        .sos(&[(1, 0x00), (2, 0x11), (3, 0x11)], 0, 63, 0x00);

    let mut bits = BitPusher::new();
    for _ in 0..luma_blocks
    {
        push_flat_luma_block(&mut bits);
    }
    push_flat_chroma_block(&mut bits);
    push_flat_chroma_block(&mut bits);
    builder.raw(&bits.finish());

    let bytes = builder.eoi();

    for multithread in [false, true]
    {
        let mut decoder = Decoder::new_with_options(
            DecoderOptions::new()
                .set_out_format(SampleFormat::RGBA)
                .set_multithread(multithread),
        );
        let pixels = decoder.decode(&bytes).unwrap();

        assert_eq!(pixels.len(), usize::from(width) * usize::from(height) * 4);
        for pixel in pixels.chunks_exact(4)
        {
            assert_eq!(pixel, [128, 128, 128, 255], "sampling {sampling:#04X}");
        }
    }
}

#[test]
fn flat_444_single_mcu()
{
    assert_flat_subsampled(0x11, 8, 8, 1);
}

#[test]
fn flat_420_single_mcu()
{
    assert_flat_subsampled(0x22, 16, 16, 4);
}

#[test]
fn flat_422_single_mcu()
{
    assert_flat_subsampled(0x21, 16, 8, 2);
}

#[test]
fn flat_440_single_mcu()
{
    assert_flat_subsampled(0x12, 8, 16, 2);
}

#[test]
fn flat_unusual_sampling_takes_generic_path()
{
    // 4x1 luma sampling: a 32x8 MCU, outside the specialized loops
    assert_flat_subsampled(0x41, 32, 8, 4);
}

#[test]
fn sixteen_bit_quantization_tables()
{
    let mut builder = JpegBuilder::new();
    builder
        .unit_dqt16(0)
        .sof(0, 8, 8, 8, &[(1, 0x11, 0)])
        .std_huffman_tables()
        .sos(&[(1, 0x00)], 0, 63, 0x00);

    let mut bits = BitPusher::new();
    push_diff(&mut bits, &STD_DC_LUMA_COUNTS, &STD_DC_SYMBOLS, 4);
    let (eob, eob_len) = huffman_code(&STD_AC_LUMA_COUNTS, &STD_AC_LUMA_SYMBOLS, 0x00);
    bits.push(eob, eob_len);
    builder.raw(&bits.finish());

    let bytes = builder.eoi();

    let mut decoder = Decoder::new_with_options(
        DecoderOptions::new()
            .set_out_format(SampleFormat::Y8)
            .set_multithread(false),
    );
    let pixels = decoder.decode(&bytes).unwrap();

    assert_eq!(pixels, vec![129_u8; 64]);
}

#[test]
fn arithmetic_sequential_zero_stream()
{
    // an all-zero entropy stream decodes every QM decision as the MPS,
    // which yields zero coefficients: a flat mid-gray image
    let mut builder = JpegBuilder::new();
    builder
        .unit_dqt(0)
        .sof(9, 8, 8, 8, &[(1, 0x11, 0)])
        .sos(&[(1, 0x00)], 0, 63, 0x00);
    builder.raw(&[0_u8; 16]);

    let bytes = builder.eoi();

    let mut decoder = Decoder::new_with_options(
        DecoderOptions::new()
            .set_out_format(SampleFormat::Y8)
            .set_multithread(false),
    );
    let pixels = decoder.decode(&bytes).unwrap();

    assert_eq!(pixels, vec![128_u8; 8 * 8]);
}

/// Build a flat four-component single-MCU stream, optionally tagged
/// with an Adobe transform byte.
fn flat_four_component(adobe_transform: Option<u8>) -> Vec<u8>
{
    let mut builder = JpegBuilder::new();

    if let Some(transform) = adobe_transform
    {
        let mut adobe = Vec::new();
        adobe.extend_from_slice(b"Adobe");
        adobe.extend_from_slice(&[0x00, 0x65]); // version
        adobe.extend_from_slice(&[0, 0, 0, 0]); // flags
        adobe.push(transform);
        builder.segment(0xEE, &adobe);
    }

    builder
        .unit_dqt(0)
        .sof(
            0,
            8,
            8,
            8,
            &[(1, 0x11, 0), (2, 0x11, 0), (3, 0x11, 0), (4, 0x11, 0)],
        )
        .std_huffman_tables()
        .sos(&[(1, 0x00), (2, 0x00), (3, 0x00), (4, 0x00)], 0, 63, 0x00);

    let mut bits = BitPusher::new();
    for _ in 0..4
    {
        push_flat_luma_block(&mut bits);
    }
    builder.raw(&bits.finish());

    builder.eoi()
}

#[test]
fn cmyk_decodes_uniform_pixels()
{
    let bytes = flat_four_component(None);

    let mut decoder = Decoder::new_with_options(DecoderOptions::new().set_multithread(false));
    let pixels = decoder.decode(&bytes).unwrap();

    // four components always resolve to RGBA
    assert_eq!(pixels.len(), 8 * 8 * 4);

    let first = &pixels[..4];
    assert_eq!(first[3], 255);
    // a flat C=M=Y plane gives a neutral gray
    assert_eq!(first[0], first[1]);
    assert_eq!(first[1], first[2]);

    for pixel in pixels.chunks_exact(4)
    {
        assert_eq!(pixel, first);
    }
}

#[test]
fn ycck_decodes_uniform_pixels()
{
    let bytes = flat_four_component(Some(2));

    let mut decoder = Decoder::new_with_options(DecoderOptions::new().set_multithread(false));
    let pixels = decoder.decode(&bytes).unwrap();

    assert_eq!(pixels.len(), 8 * 8 * 4);

    let first = &pixels[..4];
    assert_eq!(first[3], 255);
    // the YCCK inversion of neutral chroma is still neutral
    assert_eq!(first[0], first[1]);
    assert_eq!(first[1], first[2]);

    for pixel in pixels.chunks_exact(4)
    {
        assert_eq!(pixel, first);
    }
}

#[test]
fn row_offset_chunk_decodes_rows_in_parallel()
{
    let surface = gradient_surface(48, 48, SampleFormat::RGB);
    let bytes = Encoder::new(EncoderOptions::new().set_quality(0.9))
        .encode_to_vec(&surface)
        .unwrap();

    let mut reference = Decoder::new_with_options(DecoderOptions::new().set_multithread(false));
    let expected = reference.decode(&bytes).unwrap();

    // every MCU row ends at a restart marker; the offsets point at the
    // byte after each one
    let rst_ends: Vec<usize> = bytes
        .windows(2)
        .enumerate()
        .filter(|(_, w)| w[0] == 0xFF && (0xD0..=0xD7).contains(&w[1]))
        .map(|(i, _)| i + 2)
        .collect();
    assert_eq!(rst_ends.len(), 6);

    // the chunk goes right after SOI, shifting all offsets by its size
    let offsets = &rst_ends[..rst_ends.len() - 1];
    let segment_len = 2 + 2 + 6 + 4 + 4 * offsets.len();

    let mut payload = Vec::new();
    payload.extend_from_slice(b"Mango1");
    payload.extend_from_slice(&1_u32.to_be_bytes());
    for &offset in offsets
    {
        payload.extend_from_slice(&((offset + segment_len) as u32).to_be_bytes());
    }

    let mut with_chunk = Vec::new();
    with_chunk.extend_from_slice(&bytes[..2]);
    with_chunk.extend_from_slice(&[0xFF, 0xEE]);
    with_chunk.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    with_chunk.extend_from_slice(&payload);
    with_chunk.extend_from_slice(&bytes[2..]);

    let mut decoder = Decoder::new_with_options(DecoderOptions::new().set_multithread(true));
    let pixels = decoder.decode(&with_chunk).unwrap();

    assert_eq!(pixels, expected);
}

#[test]
fn jfif_exif_and_icc_payloads_are_captured()
{
    let surface = gradient_surface(8, 8, SampleFormat::RGB);
    let icc = vec![0x42_u8; 300];
    let bytes = Encoder::new(
        EncoderOptions::new()
            .set_multithread(false)
            .set_icc_profile(icc.clone()),
    )
    .encode_to_vec(&surface)
    .unwrap();

    // splice a JFIF APP0 and an Exif APP1 after SOI
    let mut spliced = Vec::new();
    spliced.extend_from_slice(&bytes[..2]);

    let mut jfif = Vec::new();
    jfif.extend_from_slice(b"JFIF\0");
    jfif.extend_from_slice(&[1, 2, 1]); // version, units
    jfif.extend_from_slice(&72_u16.to_be_bytes());
    jfif.extend_from_slice(&96_u16.to_be_bytes());
    jfif.extend_from_slice(&[0, 0]); // no thumbnail
    spliced.extend_from_slice(&[0xFF, 0xE0]);
    spliced.extend_from_slice(&((jfif.len() + 2) as u16).to_be_bytes());
    spliced.extend_from_slice(&jfif);

    let exif_payload = b"Exif\0\0MM\x00\x2A";
    spliced.extend_from_slice(&[0xFF, 0xE1]);
    spliced.extend_from_slice(&((exif_payload.len() + 2) as u16).to_be_bytes());
    spliced.extend_from_slice(exif_payload);

    spliced.extend_from_slice(&bytes[2..]);

    let mut decoder = Decoder::new();
    decoder.decode_headers(&spliced).unwrap();

    let info = decoder.info().unwrap();
    assert_eq!(info.x_density, 72);
    assert_eq!(info.y_density, 96);

    assert_eq!(decoder.exif(), Some(&b"MM\x00\x2A"[..]));
    assert_eq!(decoder.icc_profile(), &icc[..]);
}
