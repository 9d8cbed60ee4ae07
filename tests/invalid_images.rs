//! Malformed and damaged stream handling.

mod common;

use common::gradient_surface;
use zephyr_jpeg::errors::DecodeErrors;
use zephyr_jpeg::{Decoder, DecoderOptions, Encoder, EncoderOptions, SampleFormat};

#[test]
fn empty_and_bad_magic()
{
    let mut decoder = Decoder::new();
    assert!(decoder.decode(&[]).is_err());

    let mut decoder = Decoder::new();
    let err = decoder.decode(&[0x89, 0x50, 0x4E, 0x47]).unwrap_err();
    assert!(matches!(err, DecodeErrors::IllegalMagicBytes(0x8950)));
}

#[test]
fn eof_after_soi()
{
    let mut decoder = Decoder::new();
    let err = decoder.decode(&[0xFF, 0xD8, 0xA4]).unwrap_err();
    assert!(matches!(
        err,
        DecodeErrors::Format(_) | DecodeErrors::ExhaustedData
    ));
}

#[test]
fn zero_sized_frame_is_rejected()
{
    let mut builder = common::JpegBuilder::new();
    builder.unit_dqt(0).sof(0, 8, 0, 8, &[(1, 0x11, 0)]);
    let bytes = builder.eoi();

    let mut decoder = Decoder::new();
    assert!(matches!(
        decoder.decode(&bytes),
        Err(DecodeErrors::ZeroError)
    ));
}

#[test]
fn oversubscribed_huffman_table_is_rejected()
{
    let mut builder = common::JpegBuilder::new();
    builder.unit_dqt(0);

    // five two-bit codes cannot exist
    let mut dht = vec![0x00];
    let mut counts = [0_u8; 16];
    counts[1] = 5;
    dht.extend_from_slice(&counts);
    dht.extend_from_slice(&[0, 1, 2, 3, 4]);
    builder.segment(0xC4, &dht);

    let bytes = builder.eoi();

    let mut decoder = Decoder::new();
    assert!(matches!(
        decoder.decode(&bytes),
        Err(DecodeErrors::HuffmanDecode(_))
    ));
}

#[test]
fn too_many_blocks_in_mcu_is_rejected()
{
    let mut builder = common::JpegBuilder::new();
    builder.unit_dqt(0).sof(
        0,
        8,
        16,
        16,
        // 16 + 1 + 1 blocks, well over the limit of 10
        &[(1, 0x44, 0), (2, 0x11, 0), (3, 0x11, 0)],
    );
    let bytes = builder.eoi();

    let mut decoder = Decoder::new();
    assert!(matches!(decoder.decode(&bytes), Err(DecodeErrors::SofError(_))));
}

#[test]
fn differential_frames_are_unsupported()
{
    let mut builder = common::JpegBuilder::new();
    builder.unit_dqt(0).sof(5, 8, 8, 8, &[(1, 0x11, 0)]);
    let bytes = builder.eoi();

    let mut decoder = Decoder::new();
    assert!(matches!(
        decoder.decode(&bytes),
        Err(DecodeErrors::Unsupported(_))
    ));
}

#[test]
fn truncated_stream_still_renders_the_start()
{
    let surface = gradient_surface(64, 64, SampleFormat::RGB);
    let bytes = Encoder::new(EncoderOptions::new().set_quality(0.9))
        .encode_to_vec(&surface)
        .unwrap();

    let mut full = Decoder::new_with_options(DecoderOptions::new().set_multithread(false));
    let reference = full.decode(&bytes).unwrap();

    // cut the file in the middle of a later restart interval, EOI and
    // all; the encoder restarts per MCU row so the first row's band is
    // complete
    let second_rst = bytes
        .windows(2)
        .enumerate()
        .filter(|(_, w)| w[0] == 0xFF && (0xD0..=0xD7).contains(&w[1]))
        .map(|(i, _)| i)
        .nth(2)
        .expect("at least three restart markers");

    let truncated = &bytes[..second_rst];

    let mut decoder = Decoder::new_with_options(DecoderOptions::new().set_multithread(false));
    let pixels = decoder
        .decode(truncated)
        .expect("truncated streams decode with degraded output");

    // the first MCU row band matches the full decode
    let band = 64 * 8 * 4;
    assert_eq!(&pixels[..band], &reference[..band]);
    assert_eq!(pixels.len(), reference.len());
}

#[test]
fn corrupt_restart_marker_index_is_tolerated()
{
    let surface = gradient_surface(32, 32, SampleFormat::RGB);
    let bytes = Encoder::new(EncoderOptions::new().set_quality(0.9))
        .encode_to_vec(&surface)
        .unwrap();

    let mut reference_decoder =
        Decoder::new_with_options(DecoderOptions::new().set_multithread(false));
    let reference = reference_decoder.decode(&bytes).unwrap();

    // break the second restart marker's index; any RSTn still resyncs
    let mut corrupt = bytes.clone();
    let rst = corrupt
        .windows(2)
        .enumerate()
        .filter(|(_, w)| w[0] == 0xFF && (0xD0..=0xD7).contains(&w[1]))
        .map(|(i, _)| i)
        .nth(1)
        .unwrap();
    corrupt[rst + 1] ^= 0x04;

    for multithread in [false, true]
    {
        let mut decoder = Decoder::new_with_options(
            DecoderOptions::new().set_multithread(multithread),
        );
        let pixels = decoder.decode(&corrupt).unwrap();
        assert_eq!(pixels, reference, "multithread: {multithread}");
    }
}

#[test]
fn double_ff_padding_before_markers()
{
    let surface = gradient_surface(16, 16, SampleFormat::RGB);
    let bytes = Encoder::new(EncoderOptions::new())
        .encode_to_vec(&surface)
        .unwrap();

    // inject extra 0xFF padding before the SOF marker
    let sof = bytes
        .windows(2)
        .position(|w| w == [0xFF, 0xC0])
        .unwrap();

    let mut padded = Vec::new();
    padded.extend_from_slice(&bytes[..sof]);
    padded.extend_from_slice(&[0xFF, 0xFF, 0xFF]);
    padded.extend_from_slice(&bytes[sof..]);

    let mut decoder = Decoder::new();
    assert!(decoder.decode(&padded).is_ok());
}

#[test]
fn missing_eoi_is_tolerated()
{
    let surface = gradient_surface(16, 16, SampleFormat::RGB);
    let bytes = Encoder::new(EncoderOptions::new())
        .encode_to_vec(&surface)
        .unwrap();

    let without_eoi = &bytes[..bytes.len() - 2];

    let mut reference = Decoder::new();
    let mut decoder = Decoder::new();

    assert_eq!(
        decoder.decode(without_eoi).unwrap(),
        reference.decode(&bytes).unwrap()
    );
}
