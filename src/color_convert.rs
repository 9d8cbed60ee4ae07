//! MCU process functions: IDCT, chroma upsampling and color conversion
//! into the caller's sample format.
//!
//! Conversion is full-range BT.601-style fixed point, one integer
//! multiply per channel term:
//!
//! ```text
//! R = Y + ( 91750*Cr             - 11711232) >> 16
//! G = Y + (-22479*Cb -  46596*Cr +  8874368) >> 16
//! B = Y + (115671*Cb             - 14773120) >> 16
//! ```
//!
//! The four common YCbCr geometries (8x8, 8x16, 16x8, 16x16) get
//! specialized loops with the chroma replication inlined; everything
//! else goes through a generic path that first expands every component
//! to the full MCU raster with nearest-neighbor replication.

use std::sync::OnceLock;

use crate::errors::DecodeErrors;
use crate::misc::{ColorTransform, SampleFormat, MAX_SAMPLES_IN_MCU};
use crate::state::{ProcessFn, ProcessState};

#[inline(always)]
fn clamp_u8(x: i32) -> u8
{
    x.clamp(0, 255) as u8
}

/// The chroma contributions for one (Cb, Cr) pair.
#[inline(always)]
fn compute_cbcr(cb: i32, cr: i32) -> (i32, i32, i32)
{
    let r = (cr * 91750 - 11_711_232) >> 16;
    let g = (cb * -22479 + cr * -46596 + 8_874_368) >> 16;
    let b = (cb * 115_671 - 14_773_120) >> 16;
    (r, g, b)
}

#[inline(always)]
fn write_color_rgb(dest: &mut [u8], y: i32, r: i32, g: i32, b: i32)
{
    dest[0] = clamp_u8(r + y);
    dest[1] = clamp_u8(g + y);
    dest[2] = clamp_u8(b + y);
}

#[inline(always)]
fn write_color_bgr(dest: &mut [u8], y: i32, r: i32, g: i32, b: i32)
{
    dest[0] = clamp_u8(b + y);
    dest[1] = clamp_u8(g + y);
    dest[2] = clamp_u8(r + y);
}

#[inline(always)]
fn write_color_rgba(dest: &mut [u8], y: i32, r: i32, g: i32, b: i32)
{
    dest[0] = clamp_u8(r + y);
    dest[1] = clamp_u8(g + y);
    dest[2] = clamp_u8(b + y);
    dest[3] = 0xFF;
}

#[inline(always)]
fn write_color_bgra(dest: &mut [u8], y: i32, r: i32, g: i32, b: i32)
{
    dest[0] = clamp_u8(b + y);
    dest[1] = clamp_u8(g + y);
    dest[2] = clamp_u8(r + y);
    dest[3] = 0xFF;
}

// ----------------------------------------------------------------------------
// grayscale sources
// ----------------------------------------------------------------------------

pub(crate) fn process_y_8bit(
    dest: &mut [u8], stride: usize, data: &[i16], state: &ProcessState, width: usize,
    height: usize,
)
{
    let mut result = [0_u8; 64];
    (state.idct)(&mut result, data, state.block_table(0));

    for y in 0..height
    {
        dest[y * stride..y * stride + width].copy_from_slice(&result[y * 8..y * 8 + width]);
    }
}

pub(crate) fn process_y_24bit(
    dest: &mut [u8], stride: usize, data: &[i16], state: &ProcessState, width: usize,
    height: usize,
)
{
    let mut result = [0_u8; 64];
    (state.idct)(&mut result, data, state.block_table(0));

    for y in 0..height
    {
        let row = &mut dest[y * stride..];
        for x in 0..width
        {
            let v = result[y * 8 + x];
            row[x * 3] = v;
            row[x * 3 + 1] = v;
            row[x * 3 + 2] = v;
        }
    }
}

pub(crate) fn process_y_32bit(
    dest: &mut [u8], stride: usize, data: &[i16], state: &ProcessState, width: usize,
    height: usize,
)
{
    let mut result = [0_u8; 64];
    (state.idct)(&mut result, data, state.block_table(0));

    for y in 0..height
    {
        let row = &mut dest[y * stride..];
        for x in 0..width
        {
            let v = result[y * 8 + x];
            row[x * 4] = v;
            row[x * 4 + 1] = v;
            row[x * 4 + 2] = v;
            row[x * 4 + 3] = 0xFF;
        }
    }
}

/// Color image decoded to plain luminance: only the luma blocks are
/// transformed, the two chroma blocks at the end of the MCU are skipped.
pub(crate) fn process_ycbcr_8bit(
    dest: &mut [u8], stride: usize, data: &[i16], state: &ProcessState, width: usize,
    height: usize,
)
{
    let mut result = [0_u8; MAX_SAMPLES_IN_MCU];

    let luma_blocks = state.blocks.saturating_sub(2);
    for i in 0..luma_blocks
    {
        let block = &mut result[i * 64..(i + 1) * 64];
        (state.idct)(
            block.try_into().unwrap(),
            &data[i * 64..],
            state.block_table(i),
        );
    }

    let xsize = (width + 7) / 8;
    let ysize = (height + 7) / 8;

    for yb in 0..ysize
    {
        let ymax = 8.min(height - yb * 8);

        for xb in 0..xsize
        {
            let block = &result[(yb * xsize + xb) * 64..];
            let xmax = 8.min(width - xb * 8);

            for y in 0..ymax
            {
                let start = (yb * 8 + y) * stride + xb * 8;
                dest[start..start + xmax].copy_from_slice(&block[y * 8..y * 8 + xmax]);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// expand helper shared by the generic YCbCr and CMYK paths
// ----------------------------------------------------------------------------

/// Expand one component's blocks into the full `hmax*8 x vmax*8` MCU
/// raster with nearest-neighbor replication.
fn expand_component(
    result: &[u8], temp: &mut [u8], offset: usize, hsf: usize, vsf: usize, hmax: usize,
    vmax: usize,
)
{
    let raster = hmax * 8;

    for yblock in 0..vsf
    {
        for xblock in 0..hsf
        {
            let source = &result[offset + (yblock * hsf + xblock) * 64..];
            let mut dst = yblock * 8 * raster + xblock * 8;

            if hmax != hsf || vmax != vsf
            {
                let xscale = hmax / hsf;
                let yscale = vmax / vsf;

                for y in 0..8
                {
                    for x in 0..8
                    {
                        let sample = source[y * 8 + x];
                        temp[dst + x * xscale..dst + (x + 1) * xscale].fill(sample);
                    }

                    dst += raster;

                    for _ in 1..yscale
                    {
                        temp.copy_within(dst - raster..dst - raster + xscale * 8, dst);
                        dst += raster;
                    }
                }
            }
            else
            {
                for y in 0..8
                {
                    temp[dst..dst + 8].copy_from_slice(&source[y * 8..y * 8 + 8]);
                    dst += raster;
                }
            }
        }
    }
}

fn sampling_max(state: &ProcessState) -> (usize, usize)
{
    let mut hmax = 1;
    let mut vmax = 1;
    for frame in state.frames.iter().take(3)
    {
        hmax = hmax.max(frame.hsf);
        vmax = vmax.max(frame.vsf);
    }
    (hmax, vmax)
}

// ----------------------------------------------------------------------------
// YCbCr process functions, one family per output format
// ----------------------------------------------------------------------------

macro_rules! ycbcr_process_fns {
    (
        $generic:ident, $f8x8:ident, $f8x16:ident, $f16x8:ident, $f16x16:ident,
        $writer:ident, $xstep:expr
    ) => {
        /// Generic topology: expand every component, then convert row
        /// by row.
        pub(crate) fn $generic(
            dest: &mut [u8], stride: usize, data: &[i16], state: &ProcessState, width: usize,
            height: usize,
        )
        {
            let mut result = [0_u8; MAX_SAMPLES_IN_MCU];

            for i in 0..state.blocks
            {
                let block = &mut result[i * 64..(i + 1) * 64];
                (state.idct)(
                    block.try_into().unwrap(),
                    &data[i * 64..],
                    state.block_table(i),
                );
            }

            let (hmax, vmax) = sampling_max(state);

            let mut temp = [0_u8; MAX_SAMPLES_IN_MCU * 3];
            for (i, frame) in state.frames.iter().take(3).enumerate()
            {
                expand_component(
                    &result,
                    &mut temp[i * MAX_SAMPLES_IN_MCU..(i + 1) * MAX_SAMPLES_IN_MCU],
                    frame.offset * 64,
                    frame.hsf,
                    frame.vsf,
                    hmax,
                    vmax,
                );
            }

            let raster = hmax * 8;
            for y in 0..height
            {
                let row = &mut dest[y * stride..];
                for x in 0..width
                {
                    let y0 = i32::from(temp[y * raster + x]);
                    let cb = i32::from(temp[MAX_SAMPLES_IN_MCU + y * raster + x]);
                    let cr = i32::from(temp[2 * MAX_SAMPLES_IN_MCU + y * raster + x]);
                    let (r, g, b) = compute_cbcr(cb, cr);
                    $writer(&mut row[x * $xstep..], y0, r, g, b);
                }
            }
        }

        /// 4:4:4, one block per component.
        pub(crate) fn $f8x8(
            dest: &mut [u8], stride: usize, data: &[i16], state: &ProcessState, _width: usize,
            _height: usize,
        )
        {
            let mut result = [0_u8; 64 * 3];
            for i in 0..3
            {
                let block = &mut result[i * 64..(i + 1) * 64];
                (state.idct)(
                    block.try_into().unwrap(),
                    &data[i * 64..],
                    state.block_table(i),
                );
            }

            for y in 0..8
            {
                let row = &mut dest[y * stride..];
                for x in 0..8
                {
                    let y0 = i32::from(result[y * 8 + x]);
                    let cb = i32::from(result[y * 8 + x + 64]);
                    let cr = i32::from(result[y * 8 + x + 128]);
                    let (r, g, b) = compute_cbcr(cb, cr);
                    $writer(&mut row[x * $xstep..], y0, r, g, b);
                }
            }
        }

        /// 4:4:0, two stacked luma blocks, chroma rows replicate down.
        pub(crate) fn $f8x16(
            dest: &mut [u8], stride: usize, data: &[i16], state: &ProcessState, _width: usize,
            _height: usize,
        )
        {
            let mut result = [0_u8; 64 * 4];
            for i in 0..4
            {
                let block = &mut result[i * 64..(i + 1) * 64];
                (state.idct)(
                    block.try_into().unwrap(),
                    &data[i * 64..],
                    state.block_table(i),
                );
            }

            for y in 0..8
            {
                // row pairs 2y / 2y+1 share the chroma row y
                let s = &result[y * 16..];
                let c = &result[y * 8 + 128..];

                for x in 0..8
                {
                    let y0 = i32::from(s[x]);
                    let y1 = i32::from(s[x + 8]);
                    let cb = i32::from(c[x]);
                    let cr = i32::from(c[x + 64]);
                    let (r, g, b) = compute_cbcr(cb, cr);

                    $writer(&mut dest[y * 2 * stride + x * $xstep..], y0, r, g, b);
                    $writer(&mut dest[(y * 2 + 1) * stride + x * $xstep..], y1, r, g, b);
                }
            }
        }

        /// 4:2:2, two side-by-side luma blocks, chroma replicates right.
        pub(crate) fn $f16x8(
            dest: &mut [u8], stride: usize, data: &[i16], state: &ProcessState, _width: usize,
            _height: usize,
        )
        {
            let mut result = [0_u8; 64 * 4];
            for i in 0..4
            {
                let block = &mut result[i * 64..(i + 1) * 64];
                (state.idct)(
                    block.try_into().unwrap(),
                    &data[i * 64..],
                    state.block_table(i),
                );
            }

            for y in 0..8
            {
                let row = &mut dest[y * stride..];
                let s = &result[y * 8..];
                let c = &result[y * 8 + 128..];

                for x in 0..4
                {
                    let y0 = i32::from(s[x * 2]);
                    let y1 = i32::from(s[x * 2 + 1]);
                    let cb = i32::from(c[x]);
                    let cr = i32::from(c[x + 64]);
                    let (r, g, b) = compute_cbcr(cb, cr);

                    $writer(&mut row[x * 2 * $xstep..], y0, r, g, b);
                    $writer(&mut row[(x * 2 + 1) * $xstep..], y1, r, g, b);
                }

                for x in 0..4
                {
                    let y0 = i32::from(s[x * 2 + 64]);
                    let y1 = i32::from(s[x * 2 + 65]);
                    let cb = i32::from(c[x + 4]);
                    let cr = i32::from(c[x + 68]);
                    let (r, g, b) = compute_cbcr(cb, cr);

                    $writer(&mut row[(8 + x * 2) * $xstep..], y0, r, g, b);
                    $writer(&mut row[(8 + x * 2 + 1) * $xstep..], y1, r, g, b);
                }
            }
        }

        /// 4:2:0, four luma blocks, each chroma sample covers a 2x2
        /// pixel quad.
        pub(crate) fn $f16x16(
            dest: &mut [u8], stride: usize, data: &[i16], state: &ProcessState, _width: usize,
            _height: usize,
        )
        {
            let mut result = [0_u8; 64 * 6];
            for i in 0..6
            {
                let block = &mut result[i * 64..(i + 1) * 64];
                (state.idct)(
                    block.try_into().unwrap(),
                    &data[i * 64..],
                    state.block_table(i),
                );
            }

            for quad in 0..4
            {
                let cbcr_offset = (quad & 1) * 4 + (quad >> 1) * 32;
                let y_offset = quad * 64;
                let dest_offset = (quad >> 1) * 8 * stride + (quad & 1) * 8 * $xstep;

                for y in 0..4
                {
                    let ptr_y = &result[y_offset + y * 16..];
                    let ptr_cbcr = &result[256 + cbcr_offset + y * 8..];
                    let scan = dest_offset + y * 2 * stride;

                    for x in 0..4
                    {
                        let y0 = i32::from(ptr_y[x * 2]);
                        let y1 = i32::from(ptr_y[x * 2 + 1]);
                        let y2 = i32::from(ptr_y[x * 2 + 8]);
                        let y3 = i32::from(ptr_y[x * 2 + 9]);
                        let cb = i32::from(ptr_cbcr[x]);
                        let cr = i32::from(ptr_cbcr[x + 64]);
                        let (r, g, b) = compute_cbcr(cb, cr);

                        $writer(&mut dest[scan + x * 2 * $xstep..], y0, r, g, b);
                        $writer(&mut dest[scan + (x * 2 + 1) * $xstep..], y1, r, g, b);
                        $writer(&mut dest[scan + stride + x * 2 * $xstep..], y2, r, g, b);
                        $writer(&mut dest[scan + stride + (x * 2 + 1) * $xstep..], y3, r, g, b);
                    }
                }
            }
        }
    };
}

ycbcr_process_fns!(
    process_ycbcr_rgb,
    process_ycbcr_rgb_8x8,
    process_ycbcr_rgb_8x16,
    process_ycbcr_rgb_16x8,
    process_ycbcr_rgb_16x16,
    write_color_rgb,
    3
);

ycbcr_process_fns!(
    process_ycbcr_bgr,
    process_ycbcr_bgr_8x8,
    process_ycbcr_bgr_8x16,
    process_ycbcr_bgr_16x8,
    process_ycbcr_bgr_16x16,
    write_color_bgr,
    3
);

ycbcr_process_fns!(
    process_ycbcr_rgba,
    process_ycbcr_rgba_8x8,
    process_ycbcr_rgba_8x16,
    process_ycbcr_rgba_16x8,
    process_ycbcr_rgba_16x16,
    write_color_rgba,
    4
);

ycbcr_process_fns!(
    process_ycbcr_bgra,
    process_ycbcr_bgra_8x8,
    process_ycbcr_bgra_8x16,
    process_ycbcr_bgra_16x8,
    process_ycbcr_bgra_16x16,
    write_color_bgra,
    4
);

// ----------------------------------------------------------------------------
// direct RGB components (Adobe transform 0 on a 3 component frame)
// ----------------------------------------------------------------------------

macro_rules! rgb_process_fns {
    ($name:ident, $writer:ident, $xstep:expr) => {
        pub(crate) fn $name(
            dest: &mut [u8], stride: usize, data: &[i16], state: &ProcessState, _width: usize,
            _height: usize,
        )
        {
            let mut result = [0_u8; 64 * 3];
            for i in 0..3
            {
                let block = &mut result[i * 64..(i + 1) * 64];
                (state.idct)(
                    block.try_into().unwrap(),
                    &data[i * 64..],
                    state.block_table(i),
                );
            }

            for y in 0..8
            {
                let row = &mut dest[y * stride..];
                for x in 0..8
                {
                    let r = i32::from(result[y * 8 + x]);
                    let g = i32::from(result[y * 8 + x + 64]);
                    let b = i32::from(result[y * 8 + x + 128]);
                    // luma term zero, the components already are R,G,B
                    $writer(&mut row[x * $xstep..], 0, r, g, b);
                }
            }
        }
    };
}

rgb_process_fns!(process_rgb_rgb, write_color_rgb, 3);
rgb_process_fns!(process_rgb_bgr, write_color_bgr, 3);
rgb_process_fns!(process_rgb_rgba, write_color_rgba, 4);
rgb_process_fns!(process_rgb_bgra, write_color_bgra, 4);

// ----------------------------------------------------------------------------
// CMYK / YCCK
// ----------------------------------------------------------------------------

/// Linear to sRGB transfer lookup, finishing the CMYK path.
fn linear_to_srgb_table() -> &'static [u8; 256]
{
    static TABLE: OnceLock<[u8; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0_u8; 256];
        for (i, entry) in table.iter_mut().enumerate()
        {
            let l = i as f32 / 255.0;
            let s = if l <= 0.003_130_8
            {
                l * 12.92
            }
            else
            {
                1.055 * l.powf(1.0 / 2.4) - 0.055
            };
            *entry = (s * 255.0 + 0.5).clamp(0.0, 255.0) as u8;
        }
        table
    })
}

/// Four component path: YCCK is first inverted to CMYK, then CMYK is
/// multiplied out to RGBA. No attempt at colorimetric accuracy.
pub(crate) fn process_cmyk_rgba(
    dest: &mut [u8], stride: usize, data: &[i16], state: &ProcessState, width: usize,
    height: usize,
)
{
    let mut result = [0_u8; MAX_SAMPLES_IN_MCU];

    for i in 0..state.blocks
    {
        let block = &mut result[i * 64..(i + 1) * 64];
        (state.idct)(
            block.try_into().unwrap(),
            &data[i * 64..],
            state.block_table(i),
        );
    }

    let (hmax, vmax) = sampling_max(state);

    let mut temp = [0_u8; MAX_SAMPLES_IN_MCU * 4];
    for (i, frame) in state.frames.iter().take(4).enumerate()
    {
        expand_component(
            &result,
            &mut temp[i * MAX_SAMPLES_IN_MCU..(i + 1) * MAX_SAMPLES_IN_MCU],
            frame.offset * 64,
            frame.hsf,
            frame.vsf,
            hmax,
            vmax,
        );
    }

    let lookup = linear_to_srgb_table();
    let raster = hmax * 8;

    for y in 0..height
    {
        let row = &mut dest[y * stride..];

        for x in 0..width
        {
            let y0 = i32::from(temp[y * raster + x]);
            let cb = i32::from(temp[MAX_SAMPLES_IN_MCU + y * raster + x]);
            let cr = i32::from(temp[2 * MAX_SAMPLES_IN_MCU + y * raster + x]);
            let ck = i32::from(temp[3 * MAX_SAMPLES_IN_MCU + y * raster + x]);

            let (c, m, ye, k) = match state.color_transform
            {
                ColorTransform::Ycck =>
                {
                    // invert the YCbCr transform, then invert CMY
                    let c = 255 - (y0 + ((5734 * cr - 735_052) >> 12));
                    let m = 255 - (y0 + ((-1410 * cb - 2925 * cr + 554_844) >> 12));
                    let ye = 255 - (y0 + ((7258 * cb - 929_038) >> 12));
                    (c, m, ye, ck)
                }
                _ => (y0, cb, cr, ck),
            };

            let r = clamp_u8((c * k + 127) / 255);
            let g = clamp_u8((m * k + 127) / 255);
            let b = clamp_u8((ye * k + 127) / 255);

            let pixel = &mut row[x * 4..x * 4 + 4];
            pixel[0] = lookup[r as usize];
            pixel[1] = lookup[g as usize];
            pixel[2] = lookup[b as usize];
            pixel[3] = 0xFF;
        }
    }
}

// ----------------------------------------------------------------------------
// selection
// ----------------------------------------------------------------------------

/// Pick the process function for the frame layout and output format.
pub(crate) fn choose_process_func(
    sample: SampleFormat, components: usize, xblock: usize, yblock: usize, blocks_in_mcu: usize,
    transform: ColorTransform,
) -> Result<(ProcessFn, &'static str), DecodeErrors>
{
    if components == 1
    {
        let f: (ProcessFn, &'static str) = match sample
        {
            SampleFormat::Y8 => (process_y_8bit, "Y"),
            SampleFormat::RGB | SampleFormat::BGR => (process_y_24bit, "Y"),
            SampleFormat::RGBA | SampleFormat::BGRA => (process_y_32bit, "Y"),
        };
        return Ok(f);
    }

    if components == 3 && transform == ColorTransform::Rgb
    {
        let f: (ProcessFn, &'static str) = match sample
        {
            SampleFormat::Y8 => (process_ycbcr_8bit, "RGB->Y"),
            SampleFormat::RGB => (process_rgb_rgb, "RGB"),
            SampleFormat::BGR => (process_rgb_bgr, "RGB"),
            SampleFormat::RGBA => (process_rgb_rgba, "RGB"),
            SampleFormat::BGRA => (process_rgb_bgra, "RGB"),
        };
        return Ok(f);
    }

    if components == 3
    {
        let (generic, f8x8, f8x16, f16x8, f16x16): (
            ProcessFn,
            ProcessFn,
            ProcessFn,
            ProcessFn,
            ProcessFn,
        ) = match sample
        {
            SampleFormat::Y8 => return Ok((process_ycbcr_8bit, "YCbCr->Y")),
            SampleFormat::RGB => (
                process_ycbcr_rgb,
                process_ycbcr_rgb_8x8,
                process_ycbcr_rgb_8x16,
                process_ycbcr_rgb_16x8,
                process_ycbcr_rgb_16x16,
            ),
            SampleFormat::BGR => (
                process_ycbcr_bgr,
                process_ycbcr_bgr_8x8,
                process_ycbcr_bgr_8x16,
                process_ycbcr_bgr_16x8,
                process_ycbcr_bgr_16x16,
            ),
            SampleFormat::RGBA => (
                process_ycbcr_rgba,
                process_ycbcr_rgba_8x8,
                process_ycbcr_rgba_8x16,
                process_ycbcr_rgba_16x8,
                process_ycbcr_rgba_16x16,
            ),
            SampleFormat::BGRA => (
                process_ycbcr_bgra,
                process_ycbcr_bgra_8x8,
                process_ycbcr_bgra_8x16,
                process_ycbcr_bgra_16x8,
                process_ycbcr_bgra_16x16,
            ),
        };

        // the specialized loops assume the usual 6-or-fewer block layout
        if blocks_in_mcu <= 6
        {
            let spec: Option<(ProcessFn, &'static str)> = match (xblock, yblock)
            {
                (8, 8) => Some((f8x8, "YCbCr 8x8")),
                (8, 16) => Some((f8x16, "YCbCr 8x16")),
                (16, 8) => Some((f16x8, "YCbCr 16x8")),
                (16, 16) => Some((f16x16, "YCbCr 16x16")),
                _ => None,
            };
            if let Some(found) = spec
            {
                return Ok(found);
            }
        }

        return Ok((generic, "YCbCr"));
    }

    if components == 4
    {
        return Ok((process_cmyk_rgba, "CMYK"));
    }

    Err(DecodeErrors::Format(format!(
        "No color path for a {components} component image"
    )))
}

#[cfg(test)]
mod tests
{
    use super::compute_cbcr;

    #[test]
    fn neutral_chroma_contributes_nothing()
    {
        let (r, g, b) = compute_cbcr(128, 128);
        assert_eq!((r, g, b), (0, 0, 0));
    }

    #[test]
    fn full_red_chroma()
    {
        // Cr at maximum pushes red up and green down
        let (r, g, _b) = compute_cbcr(128, 255);
        assert!(r > 170 && r < 182);
        assert!(g < 0);
    }
}
