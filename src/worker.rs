//! Post-entropy processing helpers: walk decoded MCU coefficients,
//! IDCT + color convert them and write clipped pixel rectangles.
//!
//! These are free functions over an immutable [`ProcessState`] so the
//! schedulers can run them from worker threads against disjoint bands
//! of the output surface.

use crate::misc::MAX_SAMPLES_IN_MCU;
use crate::state::ProcessState;

/// Geometry of the decode, copied out of the decoder so tasks do not
/// borrow it.
#[derive(Copy, Clone)]
pub(crate) struct Region
{
    /// MCU pixel width (`8 * Hmax`).
    pub xblock: usize,
    /// MCU pixel height (`8 * Vmax`).
    pub yblock: usize,
    /// MCUs per row.
    pub xmcu:   usize,
    /// MCU rows.
    pub ymcu:   usize,
    /// True image width in pixels.
    pub width:  usize,
    /// True image height in pixels.
    pub height: usize,
    /// Bytes per output pixel.
    pub bpp:    usize,
}

impl Region
{
    /// Pixel width of the MCU column `x`, clipped at the right edge.
    #[inline]
    pub fn clip_width(&self, x: usize) -> usize
    {
        if x + 1 == self.xmcu
        {
            let clip = self.width % self.xblock;
            if clip != 0
            {
                return clip;
            }
        }
        self.xblock
    }

    /// Pixel height of the MCU row `y`, clipped at the bottom edge.
    #[inline]
    pub fn clip_height(&self, y: usize) -> usize
    {
        if y + 1 == self.ymcu
        {
            let clip = self.height % self.yblock;
            if clip != 0
            {
                return clip;
            }
        }
        self.yblock
    }

    /// Samples one MCU carries in the coefficient buffer.
    #[inline]
    pub fn mcu_data_size(&self, blocks_in_mcu: usize) -> usize
    {
        blocks_in_mcu * 64
    }
}

/// Process one MCU into `dest`. When the rectangle is clipped at the
/// image edge the MCU is processed into a scratch buffer first and only
/// the visible rows/columns are copied out.
pub(crate) fn process_and_clip(
    proc: &ProcessState, region: &Region, dest: &mut [u8], stride: usize, data: &[i16],
    width: usize, height: usize,
)
{
    if region.xblock != width || region.yblock != height
    {
        let mut temp = [0_u8; MAX_SAMPLES_IN_MCU * 4];
        let block_stride = region.xblock * 4;

        (proc.process)(&mut temp, block_stride, data, proc, width, height);

        let bytes_per_scan = width * region.bpp;
        for y in 0..height
        {
            dest[y * stride..y * stride + bytes_per_scan]
                .copy_from_slice(&temp[y * block_stride..y * block_stride + bytes_per_scan]);
        }
    }
    else
    {
        // fast path, no clipping required
        (proc.process)(dest, stride, data, proc, width, height);
    }
}

/// Process MCU rows `y0..y1` from a contiguous coefficient slice into a
/// band of the output whose first byte is row `y0 * yblock`.
pub(crate) fn process_mcu_rows(
    proc: &ProcessState, region: &Region, data: &[i16], band: &mut [u8], stride: usize,
    y0: usize, y1: usize,
)
{
    let mcu_size = region.mcu_data_size(proc.blocks);
    let xstride = region.bpp * region.xblock;

    let mut data = data;

    for y in y0..y1
    {
        let ysize = region.clip_height(y);
        let row_start = (y - y0) * region.yblock * stride;

        for x in 0..region.xmcu
        {
            let xsize = region.clip_width(x);

            process_and_clip(
                proc,
                region,
                &mut band[row_start + x * xstride..],
                stride,
                data,
                xsize,
                ysize,
            );

            data = &data[mcu_size..];
        }
    }
}
