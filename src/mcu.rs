//! Sequential-mode scan drivers.
//!
//! Entropy decoding of a sequential JPEG is inherently serial (variable
//! length codes), so parallelism comes in three shapes:
//!
//! 1. no restart markers: the main thread decodes batches of MCU rows
//!    and ships the IDCT + color work to the pool.
//! 2. a restart interval equal to one MCU row: every row restarts the
//!    entropy state at a marker we can find by scanning bytes, so whole
//!    rows decode in parallel.
//! 3. an APP14 "Mango1" chunk with per-row byte offsets: same as 2
//!    without needing the markers.
//!
//! Everything else (single thread, odd restart intervals) runs the
//! plain inline loop.

use scoped_threadpool::Pool;

use crate::decoder::Decoder;
use crate::errors::DecodeErrors;
use crate::misc::{Aligned64, MAX_SAMPLES_IN_MCU};
use crate::options::DecodeRect;
use crate::state::DecodeState;
use crate::surface::Surface;
use crate::worker::{process_and_clip, process_mcu_rows, Region};

/// Find the next real marker at or after `start`.
///
/// Skips stuff bytes (`FF 00`) and `0xFF` padding runs; returns the
/// position of the `0xFF` byte, or `data.len()` when there is none.
pub(crate) fn seek_marker(data: &[u8], start: usize) -> usize
{
    let mut p = start;

    while p + 1 < data.len()
    {
        if data[p] != 0xFF
        {
            p += 1;
            continue;
        }

        match data[p + 1]
        {
            0x00 => p += 2,
            0xFF => p += 1,
            _ => return p,
        }
    }

    data.len()
}

/// True when the two bytes at `pos` are one of the eight RSTn markers.
pub(crate) fn is_restart_marker(data: &[u8], pos: usize) -> bool
{
    pos + 1 < data.len() && data[pos] == 0xFF && (0xD0..=0xD7).contains(&data[pos + 1])
}

impl Decoder
{
    /// MCU rows one worker thread should take, zero means stay serial.
    pub(crate) fn task_rows(&self) -> usize
    {
        let threads = self.options.get_num_threads().min(64);

        if threads > 1
        {
            (self.ymcu / threads).max(1)
        }
        else
        {
            0
        }
    }

    pub(crate) fn region(&self, surface: &Surface) -> Region
    {
        Region {
            xblock: self.xblock,
            yblock: self.yblock,
            xmcu:   self.xmcu,
            ymcu:   self.ymcu,
            width:  usize::from(self.info.width),
            height: usize::from(self.info.height),
            bpp:    surface.format().num_components(),
        }
    }

    /// Emit a progress rectangle for MCU rows `y0..y1`.
    pub(crate) fn emit_progress(&self, y0: usize, y1: usize)
    {
        if let Some(callback) = &self.options.callback
        {
            let height = usize::from(self.info.height);
            let rect_h = (y1 * self.yblock).min(height) - (y0 * self.yblock).min(height);

            callback(&DecodeRect {
                x:        0,
                y:        y0 * self.yblock,
                width:    usize::from(self.info.width),
                height:   rect_h,
                progress: rect_h as f32 / height as f32,
            });
        }
    }

    /// Count down the restart interval and, when it expires, consume
    /// the RSTn marker and reset entropy state.
    ///
    /// Returns true when a restart actually happened.
    pub(crate) fn handle_restart(&mut self, data: &[u8]) -> bool
    {
        if self.restart_interval > 0
        {
            self.restart_counter = self.restart_counter.saturating_sub(1);

            if self.restart_counter == 0
            {
                self.restart_counter = self.restart_interval;

                if is_restart_marker(data, self.decode_state.stream.position)
                {
                    // step past the marker, then re-arm; the arithmetic
                    // coder re-reads its registers from the two bytes
                    // that follow
                    self.decode_state.stream.position += 2;
                    self.decode_state.restart(data);
                    return true;
                }
            }
        }

        false
    }

    /// Decode a plain sequential scan into pixels.
    pub(crate) fn decode_sequential(
        &mut self, data: &[u8], surface: &mut Surface,
    ) -> Result<(), DecodeErrors>
    {
        let batch = self.task_rows();

        if batch > 0
        {
            self.decode_sequential_mt(data, surface, batch)
        }
        else
        {
            self.decode_sequential_st(data, surface)
        }
    }

    /// Single-threaded sequential decode, with or without DRI.
    fn decode_sequential_st(
        &mut self, data: &[u8], surface: &mut Surface,
    ) -> Result<(), DecodeErrors>
    {
        let region = self.region(surface);
        let proc = self.proc.clone().expect("process state configured");
        let stride = surface.stride();
        let pixels = surface.data_mut();

        const N: usize = 8;

        if self.restart_interval > 0
        {
            // restart markers present; re-sync at every interval
            let mut mcu_buffer = Aligned64([0_i16; MAX_SAMPLES_IN_MCU]);
            let mut counter = 0_usize;

            for y in 0..self.ymcu
            {
                if self.cancelled()
                {
                    return Err(DecodeErrors::Cancelled);
                }

                let ysize = region.clip_height(y);
                let xstride = region.bpp * region.xblock;

                for x in 0..self.xmcu
                {
                    self.decode_state.decode_mcu(data, &mut mcu_buffer.0);

                    let xsize = region.clip_width(x);
                    let dest = &mut pixels[y * self.yblock * stride + x * xstride..];

                    process_and_clip(&proc, &region, dest, stride, &mcu_buffer.0, xsize, ysize);

                    counter += 1;
                    if counter == self.restart_interval
                    {
                        counter = 0;

                        // skip to the restart marker even when the
                        // entropy decoder lost sync
                        let mut p = seek_marker(data, self.decode_state.stream.position);
                        if is_restart_marker(data, p)
                        {
                            p += 2;
                        }

                        // on a truncated stream the remaining intervals
                        // keep decoding as zero blocks
                        self.decode_state.stream.position = p.min(data.len());
                        self.decode_state.restart(data);
                    }
                }

                if (y + 1) % N == 0 || y + 1 == self.ymcu
                {
                    self.emit_progress(y / N * N, y + 1);
                }
            }

            return Ok(());
        }

        // no restarts: decode a batch of rows, then process it
        let mcu_size = self.blocks_in_mcu * 64;
        let mut batch_buffer = vec![0_i16; N * self.xmcu * mcu_size];

        for y0 in (0..self.ymcu).step_by(N)
        {
            if self.cancelled()
            {
                return Err(DecodeErrors::Cancelled);
            }

            let y1 = (y0 + N).min(self.ymcu);
            let count = (y1 - y0) * self.xmcu;

            for i in 0..count
            {
                self.decode_state
                    .decode_mcu(data, &mut batch_buffer[i * mcu_size..(i + 1) * mcu_size]);
            }

            let band = &mut pixels[y0 * self.yblock * stride..];
            process_mcu_rows(&proc, &region, &batch_buffer, band, stride, y0, y1);

            self.emit_progress(y0, y1);
        }

        Ok(())
    }

    /// Multi-threaded sequential decode with `batch` MCU rows per task.
    fn decode_sequential_mt(
        &mut self, data: &[u8], surface: &mut Surface, batch: usize,
    ) -> Result<(), DecodeErrors>
    {
        // fully parallel entropy decode needs a way to find each row's
        // first byte without decoding: either the "Mango1" offsets or a
        // restart marker per MCU row
        let row_offsets = self.entropy_row_offsets(data);

        if let Some(offsets) = row_offsets
        {
            return self.decode_rows_parallel(data, surface, batch, &offsets);
        }

        if self.restart_interval > 0 && self.restart_interval != self.xmcu
        {
            // restart markers in the middle of a row are against the
            // specification; the sequential loop still handles them
            return self.decode_sequential_st(data, surface);
        }

        // serial entropy decode, parallel processing
        let region = self.region(surface);
        let proc = self.proc.clone().expect("process state configured");
        let stride = surface.stride();

        let mcu_size = self.blocks_in_mcu * 64;
        let xmcu = self.xmcu;
        let ymcu = self.ymcu;
        let yblock = self.yblock;

        let mut pool = Pool::new(self.options.get_num_threads() as u32);

        let callback = self.options.callback.clone();
        let cancel = self.options.cancel.clone();
        let info = self.info.clone();

        let mut decode_error = false;

        pool.scoped(|scope| {
            let mut bands = surface
                .data_mut()
                .chunks_mut(batch * yblock * stride);

            for y0 in (0..ymcu).step_by(batch)
            {
                if self.cancelled()
                {
                    decode_error = true;
                    break;
                }

                let y1 = (y0 + batch).min(ymcu);
                let count = (y1 - y0) * xmcu;

                let mut coefficients = vec![0_i16; count * mcu_size];
                for i in 0..count
                {
                    self.decode_state
                        .decode_mcu(data, &mut coefficients[i * mcu_size..(i + 1) * mcu_size]);
                }

                let Some(band) = bands.next()
                else
                {
                    break;
                };

                let proc = &proc;
                let callback = callback.clone();
                let cancel = cancel.clone();
                let info = info.clone();

                scope.execute(move || {
                    if cancel
                        .as_ref()
                        .is_some_and(|f| f.load(std::sync::atomic::Ordering::Relaxed))
                    {
                        return;
                    }

                    process_mcu_rows(proc, &region, &coefficients, band, stride, y0, y1);

                    if let Some(callback) = callback
                    {
                        let height = usize::from(info.height);
                        let rect_h =
                            (y1 * region.yblock).min(height) - (y0 * region.yblock).min(height);
                        callback(&DecodeRect {
                            x:        0,
                            y:        y0 * region.yblock,
                            width:    usize::from(info.width),
                            height:   rect_h,
                            progress: rect_h as f32 / height as f32,
                        });
                    }
                });
            }
        });

        if decode_error
        {
            return Err(DecodeErrors::Cancelled);
        }

        Ok(())
    }

    /// Byte offsets where each MCU row's entropy data starts, when they
    /// can be known without decoding.
    ///
    /// Priority goes to the "Mango1" chunk; otherwise a restart
    /// interval of exactly one MCU row lets us locate rows by scanning
    /// for the markers between them.
    fn entropy_row_offsets(&self, data: &[u8]) -> Option<Vec<usize>>
    {
        // row 0 starts at the scan's entropy data, before the bytes the
        // arithmetic coder may already have consumed for its registers
        let start = self.scan_data_start;

        if !self.restart_offsets.is_empty() && self.restart_offsets.len() + 1 >= self.ymcu
        {
            let mut offsets = Vec::with_capacity(self.ymcu);
            offsets.push(start);

            for i in 0..self.ymcu - 1
            {
                let offset = self.restart_offsets[i] as usize;
                if offset >= data.len()
                {
                    warn!("Row offset chunk points outside the stream, ignoring it");
                    return None;
                }
                offsets.push(offset);
            }

            return Some(offsets);
        }

        if self.restart_interval == self.xmcu && self.restart_interval != 0
        {
            let mut offsets = Vec::with_capacity(self.ymcu);
            let mut p = start;

            for _ in 0..self.ymcu
            {
                offsets.push(p);

                p = seek_marker(data, p);
                if is_restart_marker(data, p)
                {
                    p += 2;
                }

                if p >= data.len()
                {
                    // truncated; pad out with end-of-stream rows which
                    // then decode to zeros
                    while offsets.len() < self.ymcu
                    {
                        offsets.push(data.len());
                    }
                    break;
                }
            }

            return Some(offsets);
        }

        None
    }

    /// Entropy decode and process whole MCU rows in parallel from known
    /// per-row byte offsets.
    fn decode_rows_parallel(
        &mut self, data: &[u8], surface: &mut Surface, batch: usize, offsets: &[usize],
    ) -> Result<(), DecodeErrors>
    {
        let region = self.region(surface);
        let proc = self.proc.clone().expect("process state configured");
        let stride = surface.stride();

        let xmcu = self.xmcu;
        let ymcu = self.ymcu;
        let yblock = self.yblock;

        let template = self.decode_state.clone();
        let callback = self.options.callback.clone();
        let cancel = self.options.cancel.clone();
        let info = self.info.clone();

        let mut pool = Pool::new(self.options.get_num_threads() as u32);

        pool.scoped(|scope| {
            let mut bands = surface
                .data_mut()
                .chunks_mut(batch * yblock * stride);

            for y0 in (0..ymcu).step_by(batch)
            {
                let y1 = (y0 + batch).min(ymcu);

                let Some(band) = bands.next()
                else
                {
                    break;
                };

                let proc = &proc;
                let template = &template;
                let callback = callback.clone();
                let cancel = cancel.clone();
                let info = info.clone();

                scope.execute(move || {
                    if cancel
                        .as_ref()
                        .is_some_and(|f| f.load(std::sync::atomic::Ordering::Relaxed))
                    {
                        return;
                    }

                    let mut mcu_buffer = Aligned64([0_i16; MAX_SAMPLES_IN_MCU]);

                    for y in y0..y1
                    {
                        let mut state = template.clone();
                        state.stream = crate::bitstream::BitStream::new(offsets[y]);
                        if state.is_arithmetic
                        {
                            let DecodeState {
                                stream, arithmetic, ..
                            } = &mut state;
                            arithmetic.restart(stream, data);
                        }

                        let ysize = region.clip_height(y);
                        let xstride = region.bpp * region.xblock;
                        let row_start = (y - y0) * region.yblock * stride;

                        for x in 0..xmcu
                        {
                            state.decode_mcu(data, &mut mcu_buffer.0);

                            let xsize = region.clip_width(x);
                            process_and_clip(
                                proc,
                                &region,
                                &mut band[row_start + x * xstride..],
                                stride,
                                &mcu_buffer.0,
                                xsize,
                                ysize,
                            );
                        }
                    }

                    if let Some(callback) = callback
                    {
                        let height = usize::from(info.height);
                        let rect_h =
                            (y1 * region.yblock).min(height) - (y0 * region.yblock).min(height);
                        callback(&DecodeRect {
                            x:        0,
                            y:        y0 * region.yblock,
                            width:    usize::from(info.width),
                            height:   rect_h,
                            progress: rect_h as f32 / height as f32,
                        });
                    }
                });
            }
        });

        // parsing resumes at the end of the last row's data
        let last = offsets.last().copied().unwrap_or(0);
        self.decode_state.stream.position = seek_marker(data, last);

        if self.cancelled()
        {
            return Err(DecodeErrors::Cancelled);
        }

        Ok(())
    }

    /// Sequential scans over a component subset: decode every scan into
    /// the whole-image coefficient buffer, pixels happen after EOI.
    pub(crate) fn decode_multiscan(&mut self, data: &[u8]) -> Result<(), DecodeErrors>
    {
        let mcu_size = self.blocks_in_mcu * 64;

        // the scan's blocks index into the MCU via their own offsets,
        // decode directly at each MCU's base
        let mut coefficients = std::mem::take(&mut self.coefficients);

        for y in 0..self.ymcu
        {
            if self.cancelled()
            {
                self.coefficients = coefficients;
                return Err(DecodeErrors::Cancelled);
            }

            for x in 0..self.xmcu
            {
                let mcu = (y * self.xmcu + x) * mcu_size;
                self.decode_multiscan_mcu(data, &mut coefficients[mcu..mcu + mcu_size]);
            }

            if is_restart_marker(data, self.decode_state.stream.position)
            {
                self.decode_state.stream.position += 2;
                self.decode_state.restart(data);
            }
        }

        self.coefficients = coefficients;
        Ok(())
    }

    /// Decode one multiscan MCU: the sequential routine writes blocks
    /// consecutively, here they live at their MCU offsets instead.
    fn decode_multiscan_mcu(&mut self, data: &[u8], mcu: &mut [i16])
    {
        let blocks = self.decode_state.blocks;
        let mut scratch = [0_i16; MAX_SAMPLES_IN_MCU];

        self.decode_state.decode_mcu(data, &mut scratch[..blocks * 64]);

        for j in 0..blocks
        {
            let offset = self.decode_state.block[j].offset;
            mcu[offset..offset + 64].copy_from_slice(&scratch[j * 64..(j + 1) * 64]);
        }
    }
}
