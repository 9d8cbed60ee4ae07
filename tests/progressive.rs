//! Hand-built progressive streams: DC first/refine, AC first/refine
//! and EOB runs spanning blocks.

mod common;

use common::{
    huffman_code, push_diff, BitPusher, JpegBuilder, STD_AC_LUMA_COUNTS, STD_AC_LUMA_SYMBOLS,
    STD_DC_LUMA_COUNTS, STD_DC_SYMBOLS,
};
use zephyr_jpeg::{Decoder, DecoderOptions, SampleFormat};

fn y8_decoder() -> Decoder
{
    Decoder::new_with_options(
        DecoderOptions::new()
            .set_out_format(SampleFormat::Y8)
            .set_multithread(false),
    )
}

#[test]
fn four_scan_script_reconstructs_dc()
{
    let mut builder = JpegBuilder::new();
    builder
        .unit_dqt(0)
        .sof(2, 8, 8, 8, &[(1, 0x11, 0)])
        .std_huffman_tables();

    // scan 1: DC first, Al = 1, carrying DC value 4 (so coefficient 8)
    builder.sos(&[(1, 0x00)], 0, 0, 0x01);
    let mut bits = BitPusher::new();
    push_diff(&mut bits, &STD_DC_LUMA_COUNTS, &STD_DC_SYMBOLS, 4);
    builder.raw(&bits.finish());

    // scan 2: DC refine, one bit per block, raising the DC to 9
    builder.sos(&[(1, 0x00)], 0, 0, 0x10);
    let mut bits = BitPusher::new();
    bits.push(1, 1);
    builder.raw(&bits.finish());

    // scan 3: AC first with Al = 1, everything zero: a plain EOB
    builder.sos(&[(1, 0x00)], 1, 63, 0x01);
    let mut bits = BitPusher::new();
    let (eob, eob_len) = huffman_code(&STD_AC_LUMA_COUNTS, &STD_AC_LUMA_SYMBOLS, 0x00);
    bits.push(eob, eob_len);
    builder.raw(&bits.finish());

    // scan 4: AC refine to Al = 0, still nothing: an EOB run of one
    builder.sos(&[(1, 0x00)], 1, 63, 0x10);
    let mut bits = BitPusher::new();
    bits.push(eob, eob_len);
    builder.raw(&bits.finish());

    let bytes = builder.eoi();

    let mut decoder = y8_decoder();
    let pixels = decoder.decode(&bytes).unwrap();

    // DC of 9 with unit quantization is a flat 129
    assert_eq!(pixels, vec![129_u8; 64]);
}

#[test]
fn dc_only_scan_renders_after_eoi()
{
    let mut builder = JpegBuilder::new();
    builder
        .unit_dqt(0)
        .sof(2, 8, 8, 8, &[(1, 0x11, 0)])
        .std_huffman_tables();

    builder.sos(&[(1, 0x00)], 0, 0, 0x00);
    let mut bits = BitPusher::new();
    push_diff(&mut bits, &STD_DC_LUMA_COUNTS, &STD_DC_SYMBOLS, 4);
    builder.raw(&bits.finish());

    let bytes = builder.eoi();

    let mut decoder = y8_decoder();
    let pixels = decoder.decode(&bytes).unwrap();

    // DC 4, unit quantization: flat 129
    assert_eq!(pixels, vec![129_u8; 64]);
}

#[test]
fn eob_run_spans_blocks()
{
    let mut builder = JpegBuilder::new();
    builder
        .unit_dqt(0)
        // two vertical blocks
        .sof(2, 8, 8, 16, &[(1, 0x11, 0)])
        .std_huffman_tables();

    // a custom AC table with one single-bit symbol: 0x10, an EOB run
    // of category 1
    let mut dht = vec![0x11_u8];
    let mut counts = [0_u8; 16];
    counts[0] = 1;
    dht.extend_from_slice(&counts);
    dht.push(0x10);
    builder.segment(0xC4, &dht);

    // DC scan for both blocks
    builder.sos(&[(1, 0x00)], 0, 0, 0x00);
    let mut bits = BitPusher::new();
    push_diff(&mut bits, &STD_DC_LUMA_COUNTS, &STD_DC_SYMBOLS, 4);
    push_diff(&mut bits, &STD_DC_LUMA_COUNTS, &STD_DC_SYMBOLS, 0);
    builder.raw(&bits.finish());

    // AC scan: symbol 0x10 (code '0') plus one appended bit of zero
    // makes eob_run = 2, consuming both blocks at once
    builder.sos(&[(1, 0x01)], 1, 63, 0x00);
    let mut bits = BitPusher::new();
    bits.push(0, 1); // the 0x10 symbol
    bits.push(0, 1); // its appended eob_run bit
    builder.raw(&bits.finish());

    let bytes = builder.eoi();

    let mut decoder = y8_decoder();
    let pixels = decoder.decode(&bytes).unwrap();

    // both blocks carry DC 4 and no AC at all
    assert_eq!(pixels, vec![129_u8; 8 * 16]);
}

#[test]
fn progressive_matches_sequential_encoding_of_same_coefficients()
{
    // sequential stream with the same DC-only content as the
    // progressive four-scan script above (DC coefficient 9)
    let mut builder = JpegBuilder::new();
    builder
        .unit_dqt(0)
        .sof(0, 8, 8, 8, &[(1, 0x11, 0)])
        .std_huffman_tables();

    builder.sos(&[(1, 0x00)], 0, 63, 0x00);
    let mut bits = BitPusher::new();
    push_diff(&mut bits, &STD_DC_LUMA_COUNTS, &STD_DC_SYMBOLS, 9);
    let (eob, eob_len) = huffman_code(&STD_AC_LUMA_COUNTS, &STD_AC_LUMA_SYMBOLS, 0x00);
    bits.push(eob, eob_len);
    builder.raw(&bits.finish());

    let sequential = builder.eoi();

    let mut decoder = y8_decoder();
    let baseline_pixels = decoder.decode(&sequential).unwrap();

    assert_eq!(baseline_pixels, vec![129_u8; 64]);
}
