//! Encoder -> decoder round trips.

mod common;

use common::{gradient_surface, psnr};
use zephyr_jpeg::{Decoder, DecoderOptions, Encoder, EncoderOptions, SampleFormat, Surface};

fn encode(surface: &Surface, quality: f32) -> Vec<u8>
{
    Encoder::new(EncoderOptions::new().set_quality(quality))
        .encode_to_vec(surface)
        .unwrap()
}

#[test]
fn flat_gray_single_mcu()
{
    // a flat mid-gray block must decode to exactly (128,128,128,255)
    let mut surface = Surface::new(8, 8, SampleFormat::RGB);
    surface.data_mut().fill(128);

    let bytes = encode(&surface, 1.0);

    let mut decoder = Decoder::new();
    let pixels = decoder.decode(&bytes).unwrap();

    assert_eq!(pixels.len(), 8 * 8 * 4);
    for pixel in pixels.chunks_exact(4)
    {
        assert_eq!(pixel, [128, 128, 128, 255]);
    }
}

#[test]
fn gradient_high_quality_psnr()
{
    let surface = gradient_surface(64, 64, SampleFormat::RGB);
    let bytes = encode(&surface, 0.9);

    let mut decoder = Decoder::new_with_options(
        DecoderOptions::new().set_out_format(SampleFormat::RGB),
    );
    let pixels = decoder.decode(&bytes).unwrap();

    let quality = psnr(surface.data(), &pixels);
    assert!(quality >= 35.0, "PSNR {quality} below 35 dB");
}

#[test]
fn tiny_gradient_quality_and_size()
{
    let surface = gradient_surface(8, 8, SampleFormat::RGB);
    let bytes = encode(&surface, 0.75);

    // headers dominate a single-MCU file; the whole thing stays small
    assert!(bytes.len() < 1024, "encoded size {}", bytes.len());

    let mut decoder = Decoder::new_with_options(
        DecoderOptions::new().set_out_format(SampleFormat::RGB),
    );
    let pixels = decoder.decode(&bytes).unwrap();

    let quality = psnr(surface.data(), &pixels);
    assert!(quality >= 30.0, "PSNR {quality} below 30 dB");
}

#[test]
fn grayscale_roundtrip()
{
    let surface = gradient_surface(32, 24, SampleFormat::Y8);
    let bytes = encode(&surface, 0.95);

    let mut decoder = Decoder::new_with_options(
        DecoderOptions::new().set_out_format(SampleFormat::Y8),
    );

    decoder.decode_headers(&bytes).unwrap();
    assert_eq!(decoder.width(), 32);
    assert_eq!(decoder.height(), 24);
    assert_eq!(decoder.info().unwrap().components, 1);

    let pixels = decoder.decode(&bytes).unwrap();
    assert!(psnr(surface.data(), &pixels) >= 35.0);
}

#[test]
fn multithread_output_is_byte_identical()
{
    let surface = gradient_surface(133, 97, SampleFormat::RGB);
    let bytes = encode(&surface, 0.9);

    let mut st = Decoder::new_with_options(
        DecoderOptions::new()
            .set_out_format(SampleFormat::RGBA)
            .set_multithread(false),
    );
    let mut mt = Decoder::new_with_options(
        DecoderOptions::new()
            .set_out_format(SampleFormat::RGBA)
            .set_multithread(true),
    );

    assert_eq!(st.decode(&bytes).unwrap(), mt.decode(&bytes).unwrap());
}

#[test]
fn multithread_encode_matches_singlethread()
{
    let surface = gradient_surface(100, 60, SampleFormat::RGB);

    let st = Encoder::new(
        EncoderOptions::new().set_quality(0.8).set_multithread(false),
    )
    .encode_to_vec(&surface)
    .unwrap();

    let mt = Encoder::new(
        EncoderOptions::new().set_quality(0.8).set_multithread(true),
    )
    .encode_to_vec(&surface)
    .unwrap();

    assert_eq!(st, mt);
}

#[test]
fn decode_into_other_formats()
{
    let surface = gradient_surface(31, 17, SampleFormat::RGB);
    let bytes = encode(&surface, 0.9);

    for format in [
        SampleFormat::RGB,
        SampleFormat::BGR,
        SampleFormat::RGBA,
        SampleFormat::BGRA,
        SampleFormat::Y8,
    ]
    {
        let mut decoder = Decoder::new_with_options(
            DecoderOptions::new().set_out_format(format),
        );
        let pixels = decoder.decode(&bytes).unwrap();
        assert_eq!(pixels.len(), 31 * 17 * format.num_components());
    }

    // RGB and BGR must be channel swaps of each other
    let mut rgb = Decoder::new_with_options(
        DecoderOptions::new().set_out_format(SampleFormat::RGB),
    );
    let mut bgr = Decoder::new_with_options(
        DecoderOptions::new().set_out_format(SampleFormat::BGR),
    );

    let rgb_pixels = rgb.decode(&bytes).unwrap();
    let bgr_pixels = bgr.decode(&bytes).unwrap();

    for (a, b) in rgb_pixels.chunks_exact(3).zip(bgr_pixels.chunks_exact(3))
    {
        assert_eq!(a[0], b[2]);
        assert_eq!(a[1], b[1]);
        assert_eq!(a[2], b[0]);
    }
}

#[test]
fn decode_into_caller_surface_direct()
{
    let source = gradient_surface(40, 40, SampleFormat::RGB);
    let bytes = encode(&source, 0.9);

    let mut decoder = Decoder::new_with_options(
        DecoderOptions::new().set_out_format(SampleFormat::RGBA),
    );
    decoder.decode_headers(&bytes).unwrap();

    let mut target = Surface::new(40, 40, SampleFormat::RGBA);
    let status = decoder.decode_into(&bytes, &mut target).unwrap();

    assert!(status.direct);
    assert!(!status.info.is_empty());

    // a mismatched target goes through the temporary + blit path
    let mut decoder = Decoder::new_with_options(
        DecoderOptions::new().set_out_format(SampleFormat::RGBA),
    );
    let mut converted = Surface::new(40, 40, SampleFormat::BGR);
    let status = decoder.decode_into(&bytes, &mut converted).unwrap();

    assert!(!status.direct);
    assert_eq!(converted.data()[..3], [target.data()[2], target.data()[1], target.data()[0]]);
}

#[test]
fn boundary_dimensions_roundtrip()
{
    for (w, h) in [(1, 1), (1, 17), (17, 1), (9, 9), (1023, 1)]
    {
        let surface = gradient_surface(w, h, SampleFormat::RGB);
        let bytes = encode(&surface, 0.9);

        let mut decoder = Decoder::new_with_options(
            DecoderOptions::new().set_out_format(SampleFormat::RGB),
        );
        let pixels = decoder.decode(&bytes).unwrap();
        assert_eq!(pixels.len(), w * h * 3, "{w}x{h}");
    }
}

#[test]
fn progress_callback_covers_image()
{
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let surface = gradient_surface(64, 64, SampleFormat::RGB);
    let bytes = encode(&surface, 0.9);

    let rows_seen = Arc::new(AtomicUsize::new(0));
    let counter = rows_seen.clone();

    let mut decoder = Decoder::new_with_options(
        DecoderOptions::new().set_callback(Arc::new(move |rect| {
            counter.fetch_add(rect.height, Ordering::Relaxed);
        })),
    );

    decoder.decode(&bytes).unwrap();
    assert_eq!(rows_seen.load(Ordering::Relaxed), 64);
}

#[test]
fn cancellation_stops_decoding()
{
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    let surface = gradient_surface(64, 64, SampleFormat::RGB);
    let bytes = encode(&surface, 0.9);

    let flag = Arc::new(AtomicBool::new(true));

    let mut decoder = Decoder::new_with_options(
        DecoderOptions::new().set_cancel_flag(flag),
    );

    assert!(matches!(
        decoder.decode(&bytes),
        Err(zephyr_jpeg::errors::DecodeErrors::Cancelled)
    ));
}
