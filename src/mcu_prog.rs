//! Progressive-mode scan drivers.
//!
//! Every scan of a progressive image deposits bits into the whole-image
//! coefficient buffer; pixels exist only after the last scan. Entropy
//! decode stays serial within a scan (the AC refinement EOB run carries
//! state across blocks), the IDCT + color pass afterwards runs as
//! parallel row bands.

use scoped_threadpool::Pool;

use crate::decoder::Decoder;
use crate::errors::DecodeErrors;
use crate::mcu::{is_restart_marker, seek_marker};
use crate::options::DecodeRect;
use crate::surface::Surface;
use crate::worker::process_mcu_rows;

impl Decoder
{
    /// Decode one progressive scan into the coefficient buffer.
    pub(crate) fn decode_progressive(&mut self, data: &[u8]) -> Result<(), DecodeErrors>
    {
        if self.decode_state.spectral_start == 0
        {
            if self.decode_state.comps_in_scan == 1 && self.decode_state.blocks > 1
            {
                // a non-interleaved DC scan of a subsampled component
                // walks that component's own block grid
                self.decode_state.block[0].offset = 0;
                self.decode_state.blocks = 1;

                return self.decode_progressive_ac(data);
            }

            return self.decode_progressive_dc(data);
        }

        self.decode_progressive_ac(data)
    }

    /// DC scans walk MCUs in order, all scan components interleaved.
    fn decode_progressive_dc(&mut self, data: &[u8]) -> Result<(), DecodeErrors>
    {
        let mcu_size = self.blocks_in_mcu * 64;
        let mut coefficients = std::mem::take(&mut self.coefficients);

        let mut interval = 0_usize;

        for i in 0..self.mcus
        {
            if (i & 0x1FF) == 0 && self.cancelled()
            {
                self.coefficients = coefficients;
                return Err(DecodeErrors::Cancelled);
            }

            self.decode_state
                .decode_mcu(data, &mut coefficients[i * mcu_size..(i + 1) * mcu_size]);

            interval += 1;
            if self.restart_interval > 0 && interval == self.restart_interval
            {
                interval = 0;
                self.restart_at_marker(data);
            }
        }

        self.coefficients = coefficients;
        Ok(())
    }

    /// AC scans (and non-interleaved DC scans) walk the single scan
    /// component's block grid.
    fn decode_progressive_ac(&mut self, data: &[u8]) -> Result<(), DecodeErrors>
    {
        let Some(scan_frame) = self.scan_frame.map(|k| self.frames[k])
        else
        {
            return Err(DecodeErrors::SosError(
                "AC scan without a component".to_string(),
            ));
        };

        let hsf = scan_frame.hsf;
        let vsf = scan_frame.vsf;
        let scan_offset = scan_frame.offset;

        // the component's own blocks cover `hsize x vsize` pixel tiles
        let hsize = (self.hmax / hsf) * 8;
        let vsize = (self.vmax / vsf) * 8;

        let xs = (usize::from(self.info.width) + hsize - 1) / hsize;
        let ys = (usize::from(self.info.height) + vsize - 1) / vsize;

        trace!("AC scan grid: {} x {} blocks of {} x {} px", xs, ys, hsize, vsize);

        let blocks_in_mcu = self.blocks_in_mcu;
        let xmcu = self.xmcu;

        let mut coefficients = std::mem::take(&mut self.coefficients);

        let mut interval = 0_usize;

        for y in 0..ys
        {
            if self.cancelled()
            {
                self.coefficients = coefficients;
                return Err(DecodeErrors::Cancelled);
            }

            let mcu_yoffset = (y / vsf) * xmcu;
            let block_yoffset = (y % vsf) * hsf + scan_offset;

            for x in 0..xs
            {
                let mcu_offset = (mcu_yoffset + x / hsf) * blocks_in_mcu;
                let block_offset = (x % hsf) + block_yoffset;
                let position = (block_offset + mcu_offset) * 64;

                self.decode_state
                    .decode_mcu(data, &mut coefficients[position..position + 64]);

                interval += 1;
                if self.restart_interval > 0 && interval == self.restart_interval
                {
                    interval = 0;
                    self.restart_at_marker(data);
                }
            }
        }

        self.coefficients = coefficients;
        Ok(())
    }

    /// Seek the next marker; when it is an RSTn consume it and reset
    /// entropy state. The EOB run always clears at an interval edge.
    fn restart_at_marker(&mut self, data: &[u8])
    {
        let p = seek_marker(data, self.decode_state.stream.position);

        if is_restart_marker(data, p)
        {
            self.decode_state.stream.position = p + 2;
            self.decode_state.restart(data);
        }
    }

    /// The pixel pass after all scans of a progressive or multi-scan
    /// image have been decoded: IDCT + color convert the coefficient
    /// buffer in parallel row bands.
    pub(crate) fn finish_frame(&mut self, surface: &mut Surface) -> Result<(), DecodeErrors>
    {
        let region = self.region(surface);
        let proc = self.proc.clone().expect("process state configured");
        let stride = surface.stride();

        let mcu_row_size = self.xmcu * self.blocks_in_mcu * 64;
        let coefficients = std::mem::take(&mut self.coefficients);

        let batch = self.task_rows();

        if batch == 0
        {
            for y0 in (0..self.ymcu).step_by(8)
            {
                if self.cancelled()
                {
                    return Err(DecodeErrors::Cancelled);
                }

                let y1 = (y0 + 8).min(self.ymcu);
                let band = &mut surface.data_mut()[y0 * self.yblock * stride..];

                process_mcu_rows(
                    &proc,
                    &region,
                    &coefficients[y0 * mcu_row_size..],
                    band,
                    stride,
                    y0,
                    y1,
                );

                self.emit_progress(y0, y1);
            }

            return Ok(());
        }

        let ymcu = self.ymcu;
        let yblock = self.yblock;
        let callback = self.options.callback.clone();
        let cancel = self.options.cancel.clone();
        let info = self.info.clone();

        let mut pool = Pool::new(self.options.get_num_threads() as u32);

        pool.scoped(|scope| {
            let mut bands = surface.data_mut().chunks_mut(batch * yblock * stride);

            for y0 in (0..ymcu).step_by(batch)
            {
                let y1 = (y0 + batch).min(ymcu);

                let Some(band) = bands.next()
                else
                {
                    break;
                };

                let proc = &proc;
                let coefficients = &coefficients;
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

                    process_mcu_rows(
                        proc,
                        &region,
                        &coefficients[y0 * mcu_row_size..],
                        band,
                        stride,
                        y0,
                        y1,
                    );

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

        if self.cancelled()
        {
            return Err(DecodeErrors::Cancelled);
        }

        Ok(())
    }
}
