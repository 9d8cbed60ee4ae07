//! Baseline sequential JPEG encoder.
//!
//! The output layout is fixed: SOI, optional split APP2 ICC segments,
//! two quantization tables scaled from the quality setting, SOF0, the
//! canned Annex K Huffman tables, a DRI of one MCU row, SOS, then the
//! entropy stream with an RSTn marker after every MCU row, and EOI.
//!
//! Restarting every row keeps the per-row bitstreams independent, which
//! is what lets rows encode on worker threads into private buffers that
//! are then concatenated in order.

use std::io::Write;

use scoped_threadpool::Pool;

use crate::bitwriter::BitWriter;
use crate::errors::EncodeErrors;
use crate::fdct::{choose_fdct, FdctFn};
use crate::misc::{SampleFormat, ZIGZAG_NATURAL};
use crate::options::EncoderOptions;
use crate::surface::Surface;

// Table K.1 - luminance quantization, natural order
#[rustfmt::skip]
const LUMINANCE_QUANT_TABLE: [u8; 64] = [
    16, 11, 10, 16,  24,  40,  51,  61,
    12, 12, 14, 19,  26,  58,  60,  55,
    14, 13, 16, 24,  40,  57,  69,  56,
    14, 17, 22, 29,  51,  87,  80,  62,
    18, 22, 37, 56,  68, 109, 103,  77,
    24, 35, 55, 64,  81, 104, 113,  92,
    49, 64, 78, 87, 103, 121, 120, 101,
    72, 92, 95, 98, 112, 100, 103,  99,
];

// Table K.2 - chrominance quantization, natural order
#[rustfmt::skip]
const CHROMINANCE_QUANT_TABLE: [u8; 64] = [
    17, 18, 24, 47, 99, 99, 99, 99,
    18, 21, 26, 66, 99, 99, 99, 99,
    24, 26, 56, 99, 99, 99, 99, 99,
    47, 66, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
];

// Tables K.3/K.4 - DC difference codes, indexed by size category
const LUMINANCE_DC_CODE: [u32; 12] = [
    0x0000, 0x0004, 0x000C, 0x0020, 0x0050, 0x00C0, 0x0380, 0x0F00, 0x3E00, 0xFC00, 0x0003_F800,
    0x000F_F000,
];
const LUMINANCE_DC_SIZE: [u16; 12] = [2, 4, 5, 6, 7, 8, 10, 12, 14, 16, 18, 20];

const CHROMINANCE_DC_CODE: [u32; 12] = [
    0x0000, 0x0002, 0x0008, 0x0030, 0x00E0, 0x03C0, 0x0F80, 0x3F00, 0xFE00, 0x0003_FC00,
    0x000F_F800, 0x003F_F000,
];
const CHROMINANCE_DC_SIZE: [u16; 12] = [2, 3, 4, 6, 8, 10, 12, 14, 16, 18, 20, 22];

// Tables K.5/K.6 - AC codes, indexed by `run + size * 16`; index 0 is
// EOB, index 1 is ZRL
#[rustfmt::skip]
const LUMINANCE_AC_CODE: [u32; 176] = [
    0x0000000a, 0x000007f9, 0x00000000, 0x00000000, 0x00000000, 0x00000000, 0x00000000, 0x00000000, 0x00000000, 0x00000000, 0x00000000, 0x00000000, 0x00000000, 0x00000000, 0x00000000, 0x00000000,
    0x00000000, 0x00000018, 0x00000038, 0x00000074, 0x00000076, 0x000000f4, 0x000000f6, 0x000001f4, 0x000003f0, 0x000003f2, 0x000003f4, 0x000007f2, 0x000007f4, 0x00000ff0, 0x0001ffd6, 0x0001ffea,
    0x00000004, 0x0000006c, 0x000003e4, 0x000007dc, 0x00000fe0, 0x00001fdc, 0x00003fd8, 0x00003fdc, 0x0001ff00, 0x0003fef8, 0x0003ff1c, 0x0003ff40, 0x0003ff64, 0x0003ff88, 0x0003ffb0, 0x0003ffd8,
    0x00000020, 0x000003c8, 0x00001fb8, 0x00007fa8, 0x0007fcb0, 0x0007fcf0, 0x0007fd30, 0x0007fd70, 0x0007fdb0, 0x0007fdf8, 0x0007fe40, 0x0007fe88, 0x0007fed0, 0x0007ff18, 0x0007ff68, 0x0007ffb8,
    0x000000b0, 0x00001f60, 0x0000ff40, 0x000ff8f0, 0x000ff970, 0x000ff9f0, 0x000ffa70, 0x000ffaf0, 0x000ffb70, 0x000ffc00, 0x000ffc90, 0x000ffd20, 0x000ffdb0, 0x000ffe40, 0x000ffee0, 0x000fff80,
    0x00000340, 0x0000fec0, 0x001ff120, 0x001ff200, 0x001ff300, 0x001ff400, 0x001ff500, 0x001ff600, 0x001ff700, 0x001ff820, 0x001ff940, 0x001ffa60, 0x001ffb80, 0x001ffca0, 0x001ffde0, 0x001fff20,
    0x00001e00, 0x003fe100, 0x003fe280, 0x003fe440, 0x003fe640, 0x003fe840, 0x003fea40, 0x003fec40, 0x003fee40, 0x003ff080, 0x003ff2c0, 0x003ff500, 0x003ff740, 0x003ff980, 0x003ffc00, 0x003ffe80,
    0x00007c00, 0x007fc280, 0x007fc580, 0x007fc900, 0x007fcd00, 0x007fd100, 0x007fd500, 0x007fd900, 0x007fdd00, 0x007fe180, 0x007fe600, 0x007fea80, 0x007fef00, 0x007ff380, 0x007ff880, 0x007ffd80,
    0x0003f600, 0x00ff8600, 0x00ff8c00, 0x00ff9300, 0x00ff9b00, 0x00ffa300, 0x00ffab00, 0x00ffb300, 0x00ffbb00, 0x00ffc400, 0x00ffcd00, 0x00ffd600, 0x00ffdf00, 0x00ffe800, 0x00fff200, 0x00fffc00,
    0x01ff0400, 0x01ff0e00, 0x01ff1a00, 0x01ff2800, 0x01ff3800, 0x01ff4800, 0x01ff5800, 0x01ff6800, 0x01ff7800, 0x01ff8a00, 0x01ff9c00, 0x01ffae00, 0x01ffc000, 0x01ffd200, 0x01ffe600, 0x01fffa00,
    0x03fe0c00, 0x03fe2000, 0x03fe3800, 0x03fe5400, 0x03fe7400, 0x03fe9400, 0x03feb400, 0x03fed400, 0x03fef400, 0x03ff1800, 0x03ff3c00, 0x03ff6000, 0x03ff8400, 0x03ffa800, 0x03ffd000, 0x03fff800,
];

#[rustfmt::skip]
const LUMINANCE_AC_SIZE: [u16; 176] = [
    0x0004, 0x000b, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000,
    0x0003, 0x0005, 0x0006, 0x0007, 0x0007, 0x0008, 0x0008, 0x0009, 0x000a, 0x000a, 0x000a, 0x000b, 0x000b, 0x000c, 0x0011, 0x0011,
    0x0004, 0x0007, 0x000a, 0x000b, 0x000c, 0x000d, 0x000e, 0x000e, 0x0011, 0x0012, 0x0012, 0x0012, 0x0012, 0x0012, 0x0012, 0x0012,
    0x0006, 0x000a, 0x000d, 0x000f, 0x0013, 0x0013, 0x0013, 0x0013, 0x0013, 0x0013, 0x0013, 0x0013, 0x0013, 0x0013, 0x0013, 0x0013,
    0x0008, 0x000d, 0x0010, 0x0014, 0x0014, 0x0014, 0x0014, 0x0014, 0x0014, 0x0014, 0x0014, 0x0014, 0x0014, 0x0014, 0x0014, 0x0014,
    0x000a, 0x0010, 0x0015, 0x0015, 0x0015, 0x0015, 0x0015, 0x0015, 0x0015, 0x0015, 0x0015, 0x0015, 0x0015, 0x0015, 0x0015, 0x0015,
    0x000d, 0x0016, 0x0016, 0x0016, 0x0016, 0x0016, 0x0016, 0x0016, 0x0016, 0x0016, 0x0016, 0x0016, 0x0016, 0x0016, 0x0016, 0x0016,
    0x000f, 0x0017, 0x0017, 0x0017, 0x0017, 0x0017, 0x0017, 0x0017, 0x0017, 0x0017, 0x0017, 0x0017, 0x0017, 0x0017, 0x0017, 0x0017,
    0x0012, 0x0018, 0x0018, 0x0018, 0x0018, 0x0018, 0x0018, 0x0018, 0x0018, 0x0018, 0x0018, 0x0018, 0x0018, 0x0018, 0x0018, 0x0018,
    0x0019, 0x0019, 0x0019, 0x0019, 0x0019, 0x0019, 0x0019, 0x0019, 0x0019, 0x0019, 0x0019, 0x0019, 0x0019, 0x0019, 0x0019, 0x0019,
    0x001a, 0x001a, 0x001a, 0x001a, 0x001a, 0x001a, 0x001a, 0x001a, 0x001a, 0x001a, 0x001a, 0x001a, 0x001a, 0x001a, 0x001a, 0x001a,
];

#[rustfmt::skip]
const CHROMINANCE_AC_CODE: [u32; 176] = [
    0x00000000, 0x000003fa, 0x00000000, 0x00000000, 0x00000000, 0x00000000, 0x00000000, 0x00000000, 0x00000000, 0x00000000, 0x00000000, 0x00000000, 0x00000000, 0x00000000, 0x00000000, 0x00000000,
    0x00000002, 0x00000016, 0x00000034, 0x00000036, 0x00000074, 0x00000076, 0x000000f2, 0x000000f4, 0x000001f2, 0x000003ee, 0x000003f0, 0x000003f2, 0x000003f4, 0x00000ff2, 0x00007fc0, 0x0000ff86,
    0x00000010, 0x000000e4, 0x000003dc, 0x000003e0, 0x000007d8, 0x00000fe4, 0x00001fdc, 0x00001fe0, 0x0003fedc, 0x0003ff00, 0x0003ff24, 0x0003ff48, 0x0003ff6c, 0x0003ff90, 0x0003ffb4, 0x0003ffd8,
    0x00000050, 0x000007b0, 0x00001fb8, 0x00001fc0, 0x0007fcb8, 0x0007fcf8, 0x0007fd38, 0x0007fd78, 0x0007fdc0, 0x0007fe08, 0x0007fe50, 0x0007fe98, 0x0007fee0, 0x0007ff28, 0x0007ff70, 0x0007ffb8,
    0x00000180, 0x00001f50, 0x0000ff60, 0x0000ff70, 0x000ff980, 0x000ffa00, 0x000ffa80, 0x000ffb00, 0x000ffb90, 0x000ffc20, 0x000ffcb0, 0x000ffd40, 0x000ffdd0, 0x000ffe60, 0x000ffef0, 0x000fff80,
    0x00000320, 0x0000fec0, 0x000ff840, 0x001ff220, 0x001ff320, 0x001ff420, 0x001ff520, 0x001ff620, 0x001ff740, 0x001ff860, 0x001ff980, 0x001ffaa0, 0x001ffbc0, 0x001ffce0, 0x001ffe00, 0x001fff20,
    0x00000e00, 0x0003fd40, 0x003fe300, 0x003fe480, 0x003fe680, 0x003fe880, 0x003fea80, 0x003fec80, 0x003feec0, 0x003ff100, 0x003ff340, 0x003ff580, 0x003ff7c0, 0x003ffa00, 0x003ffc40, 0x003ffe80,
    0x00003c00, 0x007fc400, 0x007fc680, 0x007fc980, 0x007fcd80, 0x007fd180, 0x007fd580, 0x007fd980, 0x007fde00, 0x007fe280, 0x007fe700, 0x007feb80, 0x007ff000, 0x007ff480, 0x007ff900, 0x007ffd80,
    0x0001f400, 0x00ff8900, 0x00ff8e00, 0x00ff9400, 0x00ff9c00, 0x00ffa400, 0x00ffac00, 0x00ffb400, 0x00ffbd00, 0x00ffc600, 0x00ffcf00, 0x00ffd800, 0x00ffe100, 0x00ffea00, 0x00fff300, 0x00fffc00,
    0x0007ec00, 0x01ff1400, 0x01ff1e00, 0x01ff2a00, 0x01ff3a00, 0x01ff4a00, 0x01ff5a00, 0x01ff6a00, 0x01ff7c00, 0x01ff8e00, 0x01ffa000, 0x01ffb200, 0x01ffc400, 0x01ffd600, 0x01ffe800, 0x01fffa00,
    0x003fd000, 0x03fe2c00, 0x03fe4000, 0x03fe5800, 0x03fe7800, 0x03fe9800, 0x03feb800, 0x03fed800, 0x03fefc00, 0x03ff2000, 0x03ff4400, 0x03ff6800, 0x03ff8c00, 0x03ffb000, 0x03ffd400, 0x03fff800,
];

#[rustfmt::skip]
const CHROMINANCE_AC_SIZE: [u16; 176] = [
    0x0002, 0x000a, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000,
    0x0003, 0x0005, 0x0006, 0x0006, 0x0007, 0x0007, 0x0008, 0x0008, 0x0009, 0x000a, 0x000a, 0x000a, 0x000a, 0x000c, 0x000f, 0x0010,
    0x0005, 0x0008, 0x000a, 0x000a, 0x000b, 0x000c, 0x000d, 0x000d, 0x0012, 0x0012, 0x0012, 0x0012, 0x0012, 0x0012, 0x0012, 0x0012,
    0x0007, 0x000b, 0x000d, 0x000d, 0x0013, 0x0013, 0x0013, 0x0013, 0x0013, 0x0013, 0x0013, 0x0013, 0x0013, 0x0013, 0x0013, 0x0013,
    0x0009, 0x000d, 0x0010, 0x0010, 0x0014, 0x0014, 0x0014, 0x0014, 0x0014, 0x0014, 0x0014, 0x0014, 0x0014, 0x0014, 0x0014, 0x0014,
    0x000a, 0x0010, 0x0014, 0x0015, 0x0015, 0x0015, 0x0015, 0x0015, 0x0015, 0x0015, 0x0015, 0x0015, 0x0015, 0x0015, 0x0015, 0x0015,
    0x000c, 0x0012, 0x0016, 0x0016, 0x0016, 0x0016, 0x0016, 0x0016, 0x0016, 0x0016, 0x0016, 0x0016, 0x0016, 0x0016, 0x0016, 0x0016,
    0x000e, 0x0017, 0x0017, 0x0017, 0x0017, 0x0017, 0x0017, 0x0017, 0x0017, 0x0017, 0x0017, 0x0017, 0x0017, 0x0017, 0x0017, 0x0017,
    0x0011, 0x0018, 0x0018, 0x0018, 0x0018, 0x0018, 0x0018, 0x0018, 0x0018, 0x0018, 0x0018, 0x0018, 0x0018, 0x0018, 0x0018, 0x0018,
    0x0013, 0x0019, 0x0019, 0x0019, 0x0019, 0x0019, 0x0019, 0x0019, 0x0019, 0x0019, 0x0019, 0x0019, 0x0019, 0x0019, 0x0019, 0x0019,
    0x0016, 0x001a, 0x001a, 0x001a, 0x001a, 0x001a, 0x001a, 0x001a, 0x001a, 0x001a, 0x001a, 0x001a, 0x001a, 0x001a, 0x001a, 0x001a,
];

// The four standard Annex K Huffman tables as ready-made DHT segments.
#[rustfmt::skip]
const DHT_SEGMENTS: [u8; 432] = [
    0xFF, 0xC4, 0x00, 0x1F, 0x00, 0x00, 0x01, 0x05, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B,
    0xFF, 0xC4, 0x00, 0xB5, 0x10, 0x00, 0x02, 0x01, 0x03, 0x03, 0x02, 0x04, 0x03, 0x05, 0x05, 0x04, 0x04, 0x00, 0x00, 0x01, 0x7D, 0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21, 0x31, 0x41, 0x06,
    0x13, 0x51, 0x61, 0x07, 0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xA1, 0x08, 0x23, 0x42, 0xB1, 0xC1, 0x15, 0x52, 0xD1, 0xF0, 0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0A, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x25,
    0x26, 0x27, 0x28, 0x29, 0x2A, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3A, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4A, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5A, 0x63, 0x64, 0x65, 0x66, 0x67,
    0x68, 0x69, 0x6A, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7A, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8A, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9A, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6,
    0xA7, 0xA8, 0xA9, 0xAA, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6, 0xB7, 0xB8, 0xB9, 0xBA, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6, 0xC7, 0xC8, 0xC9, 0xCA, 0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA, 0xE1, 0xE2,
    0xE3, 0xE4, 0xE5, 0xE6, 0xE7, 0xE8, 0xE9, 0xEA, 0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8, 0xF9, 0xFA,
    0xFF, 0xC4, 0x00, 0x1F, 0x01, 0x00, 0x03, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B,
    0xFF, 0xC4, 0x00, 0xB5, 0x11, 0x00, 0x02, 0x01, 0x02, 0x04, 0x04, 0x03, 0x04, 0x07, 0x05, 0x04, 0x04, 0x00, 0x01, 0x02, 0x77, 0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21, 0x31, 0x06, 0x12, 0x41,
    0x51, 0x07, 0x61, 0x71, 0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91, 0xA1, 0xB1, 0xC1, 0x09, 0x23, 0x33, 0x52, 0xF0, 0x15, 0x62, 0x72, 0xD1, 0x0A, 0x16, 0x24, 0x34, 0xE1, 0x25, 0xF1, 0x17, 0x18,
    0x19, 0x1A, 0x26, 0x27, 0x28, 0x29, 0x2A, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3A, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4A, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5A, 0x63, 0x64, 0x65, 0x66,
    0x67, 0x68, 0x69, 0x6A, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7A, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8A, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9A, 0xA2, 0xA3, 0xA4,
    0xA5, 0xA6, 0xA7, 0xA8, 0xA9, 0xAA, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6, 0xB7, 0xB8, 0xB9, 0xBA, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6, 0xC7, 0xC8, 0xC9, 0xCA, 0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA,
    0xE2, 0xE3, 0xE4, 0xE5, 0xE6, 0xE7, 0xE8, 0xE9, 0xEA, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8, 0xF9, 0xFA,
];

/// Status of a finished encode.
pub struct EncodeStatus
{
    /// True when the surface was read without a conversion pass.
    pub direct: bool,
    /// Diagnostics: sampler, fDCT and entropy loop in use.
    pub info:   String,
}

/// Entropy tables and quantizer of one channel.
#[derive(Copy, Clone)]
struct Channel
{
    component: usize,
    dc_code:   &'static [u32; 12],
    dc_size:   &'static [u16; 12],
    ac_code:   &'static [u32; 176],
    ac_size:   &'static [u16; 176],
}

type ReadFn = fn(&mut [i16; 192], &[u8], usize, usize, usize);

/// A baseline JPEG encoder instance.
pub struct Encoder
{
    options: EncoderOptions,
}

impl Encoder
{
    #[must_use]
    #[allow(clippy::new_without_default)]
    pub fn new(options: EncoderOptions) -> Encoder
    {
        Encoder { options }
    }

    /// Encode `surface` into `sink`.
    ///
    /// # Errors
    /// On zero/oversize dimensions or a failing writer.
    pub fn encode<W: Write>(
        &self, surface: &Surface, sink: &mut W,
    ) -> Result<EncodeStatus, EncodeErrors>
    {
        let width = surface.width();
        let height = surface.height();

        if width == 0 || height == 0 || width > 65535 || height > 65535
        {
            return Err(EncodeErrors::BadDimensions(width, height));
        }

        let state = EncodeState::new(surface, &self.options);
        state.encode_image(surface, sink, &self.options)
    }

    /// Convenience: encode to a fresh byte vector.
    ///
    /// # Errors
    /// See [`Self::encode`].
    pub fn encode_to_vec(&self, surface: &Surface) -> Result<Vec<u8>, EncodeErrors>
    {
        let mut out = Vec::new();
        self.encode(surface, &mut out)?;
        Ok(out)
    }
}

/// Precomputed per-image encode configuration.
struct EncodeState
{
    components:      usize,
    bytes_per_pixel: usize,

    horizontal_mcus:     usize,
    vertical_mcus:       usize,
    rows_in_bottom_mcus: usize,
    cols_in_right_mcus:  usize,

    luminance_qtable:           [u8; 64],
    chrominance_qtable:         [u8; 64],
    inverse_luminance_qtable:   [i16; 64],
    inverse_chrominance_qtable: [i16; 64],

    read:      ReadFn,
    fdct:      FdctFn,
    fdct_name: &'static str,

    channels: [Channel; 3],
}

impl EncodeState
{
    fn new(surface: &Surface, options: &EncoderOptions) -> EncodeState
    {
        let (read, bytes_per_pixel, components): (ReadFn, usize, usize) =
            match surface.format()
            {
                SampleFormat::Y8 => (read_y_format, 1, 1),
                SampleFormat::BGR => (read_bgr_format, 3, 3),
                SampleFormat::RGB => (read_rgb_format, 3, 3),
                SampleFormat::BGRA => (read_bgra_format, 4, 3),
                SampleFormat::RGBA => (read_rgba_format, 4, 3),
            };

        let horizontal_mcus = (surface.width() + 7) >> 3;
        let vertical_mcus = (surface.height() + 7) >> 3;

        let rows_in_bottom_mcus = surface.height() - (vertical_mcus - 1) * 8;
        let cols_in_right_mcus = surface.width() - (horizontal_mcus - 1) * 8;

        // quality in [0,1] maps to a multiplier on the Annex K tables
        let quality = options.quality.clamp(0.0, 1.0);
        let scale = ((1.0 + (1.0 - quality)).powf(11.0) * 8.0) as u32;

        let mut luminance_qtable = [0_u8; 64];
        let mut chrominance_qtable = [0_u8; 64];
        let mut inverse_luminance_qtable = [0_i16; 64];
        let mut inverse_chrominance_qtable = [0_i16; 64];

        for i in 0..64
        {
            // the DQT payload is written in zig-zag order
            let zig = ZIGZAG_NATURAL[i];

            let lum =
                ((u32::from(LUMINANCE_QUANT_TABLE[i]) * scale + 0x200) >> 10).clamp(2, 255);
            luminance_qtable[zig] = lum as u8;
            inverse_luminance_qtable[i] = (0x8000 / lum) as i16;

            let chroma =
                ((u32::from(CHROMINANCE_QUANT_TABLE[i]) * scale + 0x200) >> 10).clamp(2, 255);
            chrominance_qtable[zig] = chroma as u8;
            inverse_chrominance_qtable[i] = (0x8000 / chroma) as i16;
        }

        let channels = [
            Channel {
                component: 0,
                dc_code:   &LUMINANCE_DC_CODE,
                dc_size:   &LUMINANCE_DC_SIZE,
                ac_code:   &LUMINANCE_AC_CODE,
                ac_size:   &LUMINANCE_AC_SIZE,
            },
            Channel {
                component: 1,
                dc_code:   &CHROMINANCE_DC_CODE,
                dc_size:   &CHROMINANCE_DC_SIZE,
                ac_code:   &CHROMINANCE_AC_CODE,
                ac_size:   &CHROMINANCE_AC_SIZE,
            },
            Channel {
                component: 2,
                dc_code:   &CHROMINANCE_DC_CODE,
                dc_size:   &CHROMINANCE_DC_SIZE,
                ac_code:   &CHROMINANCE_AC_CODE,
                ac_size:   &CHROMINANCE_AC_SIZE,
            },
        ];

        let (fdct, fdct_name) = choose_fdct(options.simd);

        EncodeState {
            components,
            bytes_per_pixel,
            horizontal_mcus,
            vertical_mcus,
            rows_in_bottom_mcus,
            cols_in_right_mcus,
            luminance_qtable,
            chrominance_qtable,
            inverse_luminance_qtable,
            inverse_chrominance_qtable,
            read,
            fdct,
            fdct_name,
            channels,
        }
    }

    /// Emit everything before the entropy stream.
    fn write_markers<W: Write>(
        &self, sink: &mut W, surface: &Surface, options: &EncoderOptions,
    ) -> Result<(), EncodeErrors>
    {
        let mut head: Vec<u8> = Vec::with_capacity(1024);

        let w16 = |buf: &mut Vec<u8>, v: u16| buf.extend_from_slice(&v.to_be_bytes());

        // SOI
        w16(&mut head, 0xFFD8);

        // ICC profile, split over numbered APP2 segments when large
        if !options.icc.is_empty()
        {
            const ICC_ID: &[u8] = b"ICC_PROFILE\0";
            const MAX_SEGMENT: usize = 65000;

            let segments = options.icc.chunks(MAX_SEGMENT).count();

            for (i, chunk) in options.icc.chunks(MAX_SEGMENT).enumerate()
            {
                w16(&mut head, 0xFFE2);
                w16(&mut head, (chunk.len() + ICC_ID.len() + 4) as u16);
                head.extend_from_slice(ICC_ID);
                head.push((i + 1) as u8);
                head.push(segments as u8);
                head.extend_from_slice(chunk);
            }
        }

        // DQT x2, zig-zag order, 8 bit precision
        w16(&mut head, 0xFFDB);
        w16(&mut head, 0x43);
        head.push(0x00);
        head.extend_from_slice(&self.luminance_qtable);

        w16(&mut head, 0xFFDB);
        w16(&mut head, 0x43);
        head.push(0x01);
        head.extend_from_slice(&self.chrominance_qtable);

        // SOF0
        w16(&mut head, 0xFFC0);
        w16(&mut head, (8 + 3 * self.components) as u16);
        head.push(8); // precision
        w16(&mut head, surface.height() as u16);
        w16(&mut head, surface.width() as u16);
        head.push(self.components as u8);

        if self.components == 1
        {
            head.extend_from_slice(&[0x01, 0x11, 0x00]);
        }
        else
        {
            head.extend_from_slice(&[0x01, 0x11, 0x00, 0x02, 0x11, 0x01, 0x03, 0x11, 0x01]);
        }

        // the standard Annex K Huffman tables
        head.extend_from_slice(&DHT_SEGMENTS);

        // one restart interval per MCU row
        w16(&mut head, 0xFFDD);
        w16(&mut head, 4);
        w16(&mut head, self.horizontal_mcus as u16);

        // SOS
        w16(&mut head, 0xFFDA);
        w16(&mut head, (6 + self.components * 2) as u16);
        head.push(self.components as u8);

        if self.components == 1
        {
            head.extend_from_slice(&[0x01, 0x00]);
        }
        else
        {
            head.extend_from_slice(&[0x01, 0x00, 0x02, 0x11, 0x03, 0x11]);
        }

        head.push(0x00); // Ss
        head.push(0x3F); // Se
        head.push(0x00); // Ah/Al

        sink.write_all(&head)?;
        Ok(())
    }

    /// Encode one MCU row into a private buffer.
    fn encode_interval(&self, buffer: &mut Vec<u8>, image: &[u8], stride: usize, rows: usize)
    {
        let mut writer = BitWriter::new();
        let mut last_dc = [0_i16; 3];

        let right_mcu = self.horizontal_mcus - 1;
        let mcu_stride = 8 * self.bytes_per_pixel;

        let mut offset = 0_usize;

        for x in 0..self.horizontal_mcus
        {
            let cols = if x >= right_mcu
            {
                self.cols_in_right_mcus
            }
            else
            {
                8
            };

            let mut block = [0_i16; 192];
            (self.read)(&mut block, &image[offset..], stride, rows, cols);

            for i in 0..self.components
            {
                let channel = &self.channels[i];
                let qtable = if i == 0
                {
                    &self.inverse_luminance_qtable
                }
                else
                {
                    &self.inverse_chrominance_qtable
                };

                encode_block(
                    &mut writer,
                    buffer,
                    self.fdct,
                    block[i * 64..(i + 1) * 64].try_into().unwrap(),
                    qtable,
                    channel,
                    &mut last_dc,
                );
            }

            offset += mcu_stride;
        }

        writer.flush(buffer);
    }

    fn encode_image<W: Write>(
        &self, surface: &Surface, sink: &mut W, options: &EncoderOptions,
    ) -> Result<EncodeStatus, EncodeErrors>
    {
        self.write_markers(sink, surface, options)?;

        let stride = surface.stride();
        let image = surface.data();

        let threads = options.get_num_threads().min(64);

        let mut buffers: Vec<Vec<u8>> = vec![Vec::new(); self.vertical_mcus];

        if threads > 1
        {
            let mut pool = Pool::new(threads as u32);

            pool.scoped(|scope| {
                for (y, buffer) in buffers.iter_mut().enumerate()
                {
                    let rows = if y + 1 == self.vertical_mcus
                    {
                        self.rows_in_bottom_mcus
                    }
                    else
                    {
                        8
                    };

                    let image = &image[y * 8 * stride..];

                    scope.execute(move || {
                        self.encode_interval(buffer, image, stride, rows);
                    });
                }
            });
        }
        else
        {
            for (y, buffer) in buffers.iter_mut().enumerate()
            {
                let rows = if y + 1 == self.vertical_mcus
                {
                    self.rows_in_bottom_mcus
                }
                else
                {
                    8
                };

                self.encode_interval(buffer, &image[y * 8 * stride..], stride, rows);
            }
        }

        // concatenate rows in order, a restart marker between each
        for (y, buffer) in buffers.iter().enumerate()
        {
            sink.write_all(buffer)?;
            sink.write_all(&[0xFF, 0xD0 + (y & 7) as u8])?;
        }

        // EOI
        sink.write_all(&[0xFF, 0xD9])?;

        Ok(EncodeStatus {
            direct: true,
            info:   format!(
                "fDCT: {}, Color: {}, Encoder: Scalar",
                self.fdct_name,
                match surface.format()
                {
                    SampleFormat::Y8 => "Y 8x8",
                    SampleFormat::BGR => "BGR 8x8",
                    SampleFormat::RGB => "RGB 8x8",
                    SampleFormat::BGRA => "BGRA 8x8",
                    SampleFormat::RGBA => "RGBA 8x8",
                }
            ),
        })
    }
}

#[inline]
fn bit_size(value: i32) -> u32
{
    32 - (value as u32).leading_zeros()
}

/// Huffman code the DC difference.
#[inline]
fn encode_dc(
    writer: &mut BitWriter, output: &mut Vec<u8>, dc: i16, channel: &Channel,
    last_dc: &mut [i16; 3],
)
{
    let mut coeff = i32::from(dc) - i32::from(last_dc[channel.component]);
    last_dc[channel.component] = dc;

    let abs_coeff = coeff.abs();
    // negative values code as value-1 in their magnitude bits
    coeff -= i32::from(abs_coeff != coeff);

    let size = if abs_coeff == 0 { 0 } else { bit_size(abs_coeff) };
    let mask = (1_u64 << size) - 1;

    writer.put_bits(
        output,
        u64::from(channel.dc_code[size as usize]) | (coeff as u64 & mask),
        i32::from(channel.dc_size[size as usize]),
    );
}

/// fDCT, zig-zag and Huffman code one block.
fn encode_block(
    writer: &mut BitWriter, output: &mut Vec<u8>, fdct: FdctFn, input: &[i16; 64],
    qtable: &[i16; 64], channel: &Channel, last_dc: &mut [i16; 3],
)
{
    let mut block = [0_i16; 64];
    fdct(&mut block, input, qtable);

    encode_dc(writer, output, block[0], channel, last_dc);

    let zero16_code = u64::from(channel.ac_code[1]);
    let zero16_size = i32::from(channel.ac_size[1]);

    let mut run = 0_i32;

    for i in 1..64
    {
        let mut coeff = i32::from(block[crate::misc::UN_ZIGZAG[i]]);

        if coeff != 0
        {
            while run > 15
            {
                // ZRL, sixteen zeros
                run -= 16;
                writer.put_bits(output, zero16_code, zero16_size);
            }

            let abs_coeff = coeff.abs();
            coeff -= i32::from(abs_coeff != coeff);

            let size = bit_size(abs_coeff);
            let mask = (1_u64 << size) - 1;

            let index = (run + size as i32 * 16) as usize;
            writer.put_bits(
                output,
                u64::from(channel.ac_code[index]) | (coeff as u64 & mask),
                i32::from(channel.ac_size[index]),
            );

            run = 0;
        }
        else
        {
            run += 1;
        }
    }

    if run > 0
    {
        // EOB, the rest of the block is zero
        writer.put_bits(
            output,
            u64::from(channel.ac_code[0]),
            i32::from(channel.ac_size[0]),
        );
    }
}

// ----------------------------------------------------------------------------
// pixel readers, one per sample format, all with edge replication
// ----------------------------------------------------------------------------

#[inline]
fn compute_ycbcr(block: &mut [i16; 192], index: usize, r: i32, g: i32, b: i32)
{
    let y = (76 * r + 151 * g + 29 * b) >> 8;
    let cr = ((r - y) * 182) >> 8;
    let cb = ((b - y) * 144) >> 8;

    block[index] = (y - 128) as i16;
    block[64 + index] = cb as i16;
    block[128 + index] = cr as i16;
}

/// Replicate the last written column into columns `cols..8` and the
/// last written row into rows `rows..8` for every channel present.
fn replicate_edges(block: &mut [i16; 192], rows: usize, cols: usize, channels: usize)
{
    for c in 0..channels
    {
        let base = c * 64;

        if cols < 8
        {
            for y in 0..rows
            {
                let last = block[base + y * 8 + cols - 1];
                for x in cols..8
                {
                    block[base + y * 8 + x] = last;
                }
            }
        }

        if rows < 8
        {
            let (head, tail) = block.split_at_mut(base + rows * 8);
            let last_row = &head[base + (rows - 1) * 8..base + rows * 8];
            for y in 0..8 - rows
            {
                tail[y * 8..y * 8 + 8].copy_from_slice(last_row);
            }
        }
    }
}

fn read_y_format(block: &mut [i16; 192], input: &[u8], stride: usize, rows: usize, cols: usize)
{
    for y in 0..rows
    {
        for x in 0..cols
        {
            block[y * 8 + x] = i16::from(input[y * stride + x]) - 128;
        }
    }
    replicate_edges(block, rows, cols, 1);
}

fn read_rgb_format(block: &mut [i16; 192], input: &[u8], stride: usize, rows: usize, cols: usize)
{
    for y in 0..rows
    {
        let scan = &input[y * stride..];
        for x in 0..cols
        {
            compute_ycbcr(
                block,
                y * 8 + x,
                i32::from(scan[x * 3]),
                i32::from(scan[x * 3 + 1]),
                i32::from(scan[x * 3 + 2]),
            );
        }
    }
    replicate_edges(block, rows, cols, 3);
}

fn read_bgr_format(block: &mut [i16; 192], input: &[u8], stride: usize, rows: usize, cols: usize)
{
    for y in 0..rows
    {
        let scan = &input[y * stride..];
        for x in 0..cols
        {
            compute_ycbcr(
                block,
                y * 8 + x,
                i32::from(scan[x * 3 + 2]),
                i32::from(scan[x * 3 + 1]),
                i32::from(scan[x * 3]),
            );
        }
    }
    replicate_edges(block, rows, cols, 3);
}

fn read_rgba_format(block: &mut [i16; 192], input: &[u8], stride: usize, rows: usize, cols: usize)
{
    for y in 0..rows
    {
        let scan = &input[y * stride..];
        for x in 0..cols
        {
            compute_ycbcr(
                block,
                y * 8 + x,
                i32::from(scan[x * 4]),
                i32::from(scan[x * 4 + 1]),
                i32::from(scan[x * 4 + 2]),
            );
        }
    }
    replicate_edges(block, rows, cols, 3);
}

fn read_bgra_format(block: &mut [i16; 192], input: &[u8], stride: usize, rows: usize, cols: usize)
{
    for y in 0..rows
    {
        let scan = &input[y * stride..];
        for x in 0..cols
        {
            compute_ycbcr(
                block,
                y * 8 + x,
                i32::from(scan[x * 4 + 2]),
                i32::from(scan[x * 4 + 1]),
                i32::from(scan[x * 4]),
            );
        }
    }
    replicate_edges(block, rows, cols, 3);
}

#[cfg(test)]
mod tests
{
    use super::{bit_size, Encoder};
    use crate::misc::SampleFormat;
    use crate::options::EncoderOptions;
    use crate::surface::Surface;

    #[test]
    fn bit_sizes()
    {
        assert_eq!(bit_size(1), 1);
        assert_eq!(bit_size(2), 2);
        assert_eq!(bit_size(3), 2);
        assert_eq!(bit_size(255), 8);
        assert_eq!(bit_size(256), 9);
    }

    #[test]
    fn rejects_empty_surface()
    {
        let surface = Surface::new(0, 0, SampleFormat::RGB);
        let encoder = Encoder::new(EncoderOptions::new());
        assert!(encoder.encode_to_vec(&surface).is_err());
    }

    #[test]
    fn stream_shape_is_sane()
    {
        let surface = Surface::new(8, 8, SampleFormat::Y8);
        let encoder = Encoder::new(EncoderOptions::new().set_multithread(false));
        let bytes = encoder.encode_to_vec(&surface).unwrap();

        // SOI at the front, EOI at the back
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9]);
        // one restart marker right before EOI (single MCU row)
        assert_eq!(&bytes[bytes.len() - 4..bytes.len() - 2], &[0xFF, 0xD0]);
    }

    #[test]
    fn icc_profile_is_embedded()
    {
        let surface = Surface::new(8, 8, SampleFormat::Y8);
        let options = EncoderOptions::new()
            .set_multithread(false)
            .set_icc_profile(vec![0xAB; 128]);
        let bytes = Encoder::new(options).encode_to_vec(&surface).unwrap();

        let position = bytes
            .windows(12)
            .position(|w| w == b"ICC_PROFILE\0")
            .expect("ICC marker present");
        // segment numbering 1 of 1
        assert_eq!(bytes[position + 12], 1);
        assert_eq!(bytes[position + 13], 1);
    }
}
