//! Hand-built lossless (SOF3) streams round-trip exactly.

mod common;

use common::{push_diff, BitPusher, JpegBuilder, STD_DC_LUMA_COUNTS, STD_DC_SYMBOLS};
use zephyr_jpeg::{Decoder, DecoderOptions};

/// Differences the decoder's predictor scheme expects for a raster,
/// predictor 1 (west), 8 bit precision, no point transform.
fn diff_stream(samples: &[Vec<i32>], width: usize, height: usize) -> BitPusher
{
    let mut bits = BitPusher::new();

    for y in 0..height
    {
        for x in 0..width
        {
            for channel in samples
            {
                let value = channel[y * width + x];

                let prediction = if x == 0 && y == 0
                {
                    128
                }
                else if y == 0
                {
                    channel[x - 1]
                }
                else if x == 0
                {
                    channel[(y - 1) * width]
                }
                else
                {
                    // predictor 1: west
                    channel[y * width + x - 1]
                };

                push_diff(&mut bits, &STD_DC_LUMA_COUNTS, &STD_DC_SYMBOLS, value - prediction);
            }
        }
    }

    bits
}

#[test]
fn grayscale_ramp_roundtrips_exactly()
{
    let width = 4;
    let height = 4;

    let mut ramp = vec![0_i32; width * height];
    for y in 0..height
    {
        for x in 0..width
        {
            ramp[y * width + x] = (40 + 13 * y + 3 * x) as i32;
        }
    }

    let mut builder = JpegBuilder::new();
    builder
        .sof(3, 8, width as u16, height as u16, &[(1, 0x11, 0)])
        .std_huffman_tables()
        // Ss selects predictor 1, Se must be 0
        .sos(&[(1, 0x00)], 1, 0, 0x00);

    let bits = diff_stream(&[ramp.clone()], width, height);
    builder.raw(&bits.finish());
    let bytes = builder.eoi();

    let mut decoder = Decoder::new_with_options(DecoderOptions::new().set_multithread(false));
    let pixels = decoder.decode(&bytes).unwrap();

    // lossless grayscale decodes to Y8
    let expected: Vec<u8> = ramp.iter().map(|&v| v as u8).collect();
    assert_eq!(pixels, expected);
}

#[test]
fn three_component_ramp_roundtrips_exactly()
{
    let width = 4;
    let height = 4;

    let mut channels: Vec<Vec<i32>> = Vec::new();
    for c in 0..3
    {
        let mut plane = vec![0_i32; width * height];
        for y in 0..height
        {
            for x in 0..width
            {
                plane[y * width + x] = (20 + 40 * c + 7 * y + 2 * x) as i32;
            }
        }
        channels.push(plane);
    }

    let mut builder = JpegBuilder::new();
    builder
        .sof(
            3,
            8,
            width as u16,
            height as u16,
            &[(1, 0x11, 0), (2, 0x11, 0), (3, 0x11, 0)],
        )
        .std_huffman_tables()
        .sos(&[(1, 0x00), (2, 0x00), (3, 0x00)], 1, 0, 0x00);

    let bits = diff_stream(&channels, width, height);
    builder.raw(&bits.finish());
    let bytes = builder.eoi();

    let mut decoder = Decoder::new_with_options(DecoderOptions::new().set_multithread(false));
    let pixels = decoder.decode(&bytes).unwrap();

    // three-component lossless decodes to RGBA
    assert_eq!(pixels.len(), width * height * 4);
    for (i, pixel) in pixels.chunks_exact(4).enumerate()
    {
        assert_eq!(i32::from(pixel[0]), channels[0][i], "red at {i}");
        assert_eq!(i32::from(pixel[1]), channels[1][i], "green at {i}");
        assert_eq!(i32::from(pixel[2]), channels[2][i], "blue at {i}");
        assert_eq!(pixel[3], 255);
    }
}

#[test]
fn north_predictor_roundtrips()
{
    // predictor 2 (north) on a vertical ramp
    let width = 3;
    let height = 5;

    let mut plane = vec![0_i32; width * height];
    for y in 0..height
    {
        for x in 0..width
        {
            plane[y * width + x] = (100 + 20 * y + x) as i32;
        }
    }

    let mut bits = BitPusher::new();
    for y in 0..height
    {
        for x in 0..width
        {
            let value = plane[y * width + x];
            let prediction = if x == 0 && y == 0
            {
                128
            }
            else if y == 0
            {
                plane[x - 1]
            }
            else if x == 0
            {
                plane[(y - 1) * width]
            }
            else
            {
                // predictor 2: north
                plane[(y - 1) * width + x]
            };
            push_diff(&mut bits, &STD_DC_LUMA_COUNTS, &STD_DC_SYMBOLS, value - prediction);
        }
    }

    let mut builder = JpegBuilder::new();
    builder
        .sof(3, 8, width as u16, height as u16, &[(1, 0x11, 0)])
        .std_huffman_tables()
        .sos(&[(1, 0x00)], 2, 0, 0x00);
    builder.raw(&bits.finish());
    let bytes = builder.eoi();

    let mut decoder = Decoder::new_with_options(DecoderOptions::new().set_multithread(false));
    let pixels = decoder.decode(&bytes).unwrap();

    let expected: Vec<u8> = plane.iter().map(|&v| v as u8).collect();
    assert_eq!(pixels, expected);
}
