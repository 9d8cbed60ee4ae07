//! Shared helpers for the integration tests: a tiny segment/bit writer
//! so tests can synthesize exactly the streams they need, plus PSNR.

#![allow(dead_code)]

use zephyr_jpeg::{SampleFormat, Surface};

/// Peak signal-to-noise ratio between two equal-length pixel buffers.
pub fn psnr(a: &[u8], b: &[u8]) -> f64
{
    assert_eq!(a.len(), b.len());

    let mse: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = f64::from(x) - f64::from(y);
            d * d
        })
        .sum::<f64>()
        / a.len() as f64;

    if mse == 0.0
    {
        return f64::INFINITY;
    }

    10.0 * (255.0_f64 * 255.0 / mse).log10()
}

/// A smooth gradient test image.
pub fn gradient_surface(width: usize, height: usize, format: SampleFormat) -> Surface
{
    let mut surface = Surface::new(width, height, format);
    let bpp = format.num_components();
    let stride = surface.stride();

    for y in 0..height
    {
        for x in 0..width
        {
            let r = ((x * 255) / width.max(1)) as u8;
            let g = ((y * 255) / height.max(1)) as u8;
            let b = (((x + y) * 255) / (width + height).max(1)) as u8;

            let pixel = &mut surface.data_mut()[y * stride + x * bpp..];
            match format
            {
                SampleFormat::Y8 => pixel[0] = r,
                SampleFormat::RGB =>
                {
                    pixel[..3].copy_from_slice(&[r, g, b]);
                }
                SampleFormat::BGR =>
                {
                    pixel[..3].copy_from_slice(&[b, g, r]);
                }
                SampleFormat::RGBA =>
                {
                    pixel[..4].copy_from_slice(&[r, g, b, 255]);
                }
                SampleFormat::BGRA =>
                {
                    pixel[..4].copy_from_slice(&[b, g, r, 255]);
                }
            }
        }
    }

    surface
}

/// Builds JPEG streams segment by segment.
pub struct JpegBuilder
{
    pub bytes: Vec<u8>,
}

impl JpegBuilder
{
    pub fn new() -> JpegBuilder
    {
        JpegBuilder { bytes: vec![0xFF, 0xD8] }
    }

    pub fn raw(&mut self, data: &[u8]) -> &mut Self
    {
        self.bytes.extend_from_slice(data);
        self
    }

    /// A marker segment with the length field filled in.
    pub fn segment(&mut self, marker: u8, payload: &[u8]) -> &mut Self
    {
        self.bytes.extend_from_slice(&[0xFF, marker]);
        self.bytes
            .extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        self.bytes.extend_from_slice(payload);
        self
    }

    /// DQT with an 8 bit table of all ones (identity quantization).
    pub fn unit_dqt(&mut self, index: u8) -> &mut Self
    {
        let mut payload = vec![index];
        payload.extend_from_slice(&[1; 64]);
        self.segment(0xDB, &payload)
    }

    /// DQT with a 16 bit table of all ones.
    pub fn unit_dqt16(&mut self, index: u8) -> &mut Self
    {
        let mut payload = vec![0x10 | index];
        for _ in 0..64
        {
            payload.extend_from_slice(&[0x00, 0x01]);
        }
        self.segment(0xDB, &payload)
    }

    /// SOFn for components given as (id, sampling byte, tq).
    pub fn sof(&mut self, n: u8, precision: u8, width: u16, height: u16, comps: &[(u8, u8, u8)])
        -> &mut Self
    {
        let mut payload = vec![precision];
        payload.extend_from_slice(&height.to_be_bytes());
        payload.extend_from_slice(&width.to_be_bytes());
        payload.push(comps.len() as u8);
        for &(id, sampling, tq) in comps
        {
            payload.extend_from_slice(&[id, sampling, tq]);
        }
        self.segment(0xC0 + n, &payload)
    }

    /// SOS for components given as (id, table byte).
    pub fn sos(&mut self, comps: &[(u8, u8)], ss: u8, se: u8, ah_al: u8) -> &mut Self
    {
        let mut payload = vec![comps.len() as u8];
        for &(id, tables) in comps
        {
            payload.extend_from_slice(&[id, tables]);
        }
        payload.extend_from_slice(&[ss, se, ah_al]);
        self.segment(0xDA, &payload)
    }

    /// The four standard Annex K Huffman tables.
    pub fn std_huffman_tables(&mut self) -> &mut Self
    {
        // DC luminance
        self.segment(0xC4, &std_dht_payload(0x00, &STD_DC_LUMA_COUNTS, &STD_DC_SYMBOLS));
        // AC luminance
        self.segment(0xC4, &std_dht_payload(0x10, &STD_AC_LUMA_COUNTS, &STD_AC_LUMA_SYMBOLS));
        // DC chrominance
        self.segment(0xC4, &std_dht_payload(0x01, &STD_DC_CHROMA_COUNTS, &STD_DC_SYMBOLS));
        // AC chrominance
        self.segment(
            0xC4,
            &std_dht_payload(0x11, &STD_AC_CHROMA_COUNTS, &STD_AC_CHROMA_SYMBOLS),
        );
        self
    }

    pub fn eoi(&mut self) -> Vec<u8>
    {
        self.bytes.extend_from_slice(&[0xFF, 0xD9]);
        self.bytes.clone()
    }
}

fn std_dht_payload(class_id: u8, counts: &[u8; 16], symbols: &[u8]) -> Vec<u8>
{
    let mut payload = vec![class_id];
    payload.extend_from_slice(counts);
    payload.extend_from_slice(symbols);
    payload
}

// Annex K table definitions
pub const STD_DC_LUMA_COUNTS: [u8; 16] = [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0];
pub const STD_DC_CHROMA_COUNTS: [u8; 16] = [0, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0];
pub const STD_DC_SYMBOLS: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

pub const STD_AC_LUMA_COUNTS: [u8; 16] =
    [0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 0x7D];
#[rustfmt::skip]
pub const STD_AC_LUMA_SYMBOLS: [u8; 162] = [
    0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61, 0x07,
    0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xA1, 0x08, 0x23, 0x42, 0xB1, 0xC1, 0x15, 0x52, 0xD1, 0xF0,
    0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0A, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x25, 0x26, 0x27, 0x28,
    0x29, 0x2A, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3A, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49,
    0x4A, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5A, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69,
    0x6A, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7A, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89,
    0x8A, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9A, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7,
    0xA8, 0xA9, 0xAA, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6, 0xB7, 0xB8, 0xB9, 0xBA, 0xC2, 0xC3, 0xC4, 0xC5,
    0xC6, 0xC7, 0xC8, 0xC9, 0xCA, 0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA, 0xE1, 0xE2,
    0xE3, 0xE4, 0xE5, 0xE6, 0xE7, 0xE8, 0xE9, 0xEA, 0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8,
    0xF9, 0xFA,
];

pub const STD_AC_CHROMA_COUNTS: [u8; 16] =
    [0, 2, 1, 2, 4, 4, 3, 4, 7, 5, 4, 4, 0, 1, 2, 0x77];
#[rustfmt::skip]
pub const STD_AC_CHROMA_SYMBOLS: [u8; 162] = [
    0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21, 0x31, 0x06, 0x12, 0x41, 0x51, 0x07, 0x61, 0x71,
    0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91, 0xA1, 0xB1, 0xC1, 0x09, 0x23, 0x33, 0x52, 0xF0,
    0x15, 0x62, 0x72, 0xD1, 0x0A, 0x16, 0x24, 0x34, 0xE1, 0x25, 0xF1, 0x17, 0x18, 0x19, 0x1A, 0x26,
    0x27, 0x28, 0x29, 0x2A, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3A, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48,
    0x49, 0x4A, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5A, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68,
    0x69, 0x6A, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7A, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87,
    0x88, 0x89, 0x8A, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9A, 0xA2, 0xA3, 0xA4, 0xA5,
    0xA6, 0xA7, 0xA8, 0xA9, 0xAA, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6, 0xB7, 0xB8, 0xB9, 0xBA, 0xC2, 0xC3,
    0xC4, 0xC5, 0xC6, 0xC7, 0xC8, 0xC9, 0xCA, 0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA,
    0xE2, 0xE3, 0xE4, 0xE5, 0xE6, 0xE7, 0xE8, 0xE9, 0xEA, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8,
    0xF9, 0xFA,
];

/// An MSB-first bit pusher with byte stuffing, for hand-built entropy
/// streams.
pub struct BitPusher
{
    pub bytes: Vec<u8>,
    acc:       u32,
    bits:      u32,
}

impl BitPusher
{
    pub fn new() -> BitPusher
    {
        BitPusher { bytes: Vec::new(), acc: 0, bits: 0 }
    }

    pub fn push(&mut self, value: u32, count: u32)
    {
        for i in (0..count).rev()
        {
            self.acc = (self.acc << 1) | ((value >> i) & 1);
            self.bits += 1;

            if self.bits == 8
            {
                let byte = self.acc as u8;
                self.bytes.push(byte);
                if byte == 0xFF
                {
                    self.bytes.push(0x00);
                }
                self.acc = 0;
                self.bits = 0;
            }
        }
    }

    /// Pad the final byte with one bits.
    pub fn finish(mut self) -> Vec<u8>
    {
        while self.bits != 0
        {
            self.push(1, 1);
        }
        self.bytes
    }
}

/// Canonical code for a symbol of a table given by its counts.
pub fn huffman_code(counts: &[u8; 16], symbols: &[u8], wanted: u8) -> (u32, u32)
{
    let mut code = 0_u32;
    let mut k = 0_usize;

    for length in 1..=16_u32
    {
        for _ in 0..counts[length as usize - 1]
        {
            if symbols[k] == wanted
            {
                return (code, length);
            }
            code += 1;
            k += 1;
        }
        code <<= 1;
    }

    panic!("symbol {wanted:#04X} not in table");
}

/// Push one DC-style difference: category symbol then magnitude bits.
pub fn push_diff(bits: &mut BitPusher, counts: &[u8; 16], symbols: &[u8], diff: i32)
{
    let size = if diff == 0
    {
        0
    }
    else
    {
        32 - (diff.unsigned_abs()).leading_zeros()
    };

    let (code, length) = huffman_code(counts, symbols, size as u8);
    bits.push(code, length);

    if size > 0
    {
        let value = if diff < 0 { diff - 1 } else { diff };
        bits.push((value as u32) & ((1 << size) - 1), size);
    }
}
