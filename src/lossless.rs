//! Lossless (SOF3 / SOF11) scan driver.
//!
//! One difference value per component per sample. The predictor
//! (selected by Ss, 1..=7) mixes the west/north/north-west neighbors
//! per T.81 H.1.2: the very first sample (and the first after a
//! restart) predicts from `1 << (P - Pt - 1)`, the rest of that line
//! predicts from the west neighbor, the first column from the north
//! one. Samples are shifted down to 8 bits at output; color
//! sub-sampling is not supported here.

use crate::decoder::Decoder;
use crate::errors::DecodeErrors;
use crate::misc::MAX_BLOCKS_IN_MCU;
use crate::surface::Surface;

impl Decoder
{
    pub(crate) fn decode_lossless(
        &mut self, data: &[u8], surface: &mut Surface,
    ) -> Result<(), DecodeErrors>
    {
        let predictor = self.decode_state.spectral_start;
        let point_transform = u32::from(self.decode_state.successive_low);

        let xsize = usize::from(self.info.width);
        let ysize = usize::from(self.info.height);
        let n_components = self.decode_state.comps_in_scan;

        let shift = u32::from(self.precision) - 8;
        let init_prediction = 1_i32 << (u32::from(self.precision) - point_transform - 1);

        // previous and current scanline per component
        let mut above: Vec<Vec<i32>> = vec![vec![0; xsize]; n_components];
        let mut current: Vec<Vec<i32>> = vec![vec![0; xsize]; n_components];

        let stride = surface.stride();
        let bpp = surface.format().num_components();
        let pixels = surface.data_mut();

        // `fresh`: the next sample uses the default prediction;
        // `first_line`: we are on the first line since scan start or
        // restart, where the west neighbor is the only history
        let mut fresh = true;
        let mut first_line = true;

        for y in 0..ysize
        {
            if self.cancelled()
            {
                return Err(DecodeErrors::Cancelled);
            }

            let row = &mut pixels[y * stride..];

            for x in 0..xsize
            {
                for component in 0..n_components
                {
                    let prediction = if fresh
                    {
                        init_prediction
                    }
                    else if first_line
                    {
                        if x == 0
                        {
                            init_prediction
                        }
                        else
                        {
                            current[component][x - 1]
                        }
                    }
                    else if x == 0
                    {
                        above[component][0]
                    }
                    else
                    {
                        let west = current[component][x - 1];
                        let north = above[component][x];
                        let north_west = above[component][x - 1];

                        match predictor
                        {
                            1 => west,
                            2 => north,
                            3 => north_west,
                            4 => west + north - north_west,
                            5 => west + ((north - north_west) >> 1),
                            6 => north + ((west - north_west) >> 1),
                            7 => (west + north) >> 1,
                            _ => 0,
                        }
                    };

                    self.decode_state.set_last_dc(component, prediction);
                }

                let mut samples = [0_i16; MAX_BLOCKS_IN_MCU];
                self.decode_state.decode_mcu(data, &mut samples);

                fresh = self.handle_restart(data);
                if fresh
                {
                    // restart resets prediction as at the scan start
                    first_line = true;
                }

                for component in 0..n_components
                {
                    let sample = i32::from(samples[component]);
                    current[component][x] = sample;

                    let value = (sample >> shift).clamp(0, 255) as u8;

                    if n_components == 1
                    {
                        row[x] = value;
                    }
                    else
                    {
                        row[x * bpp + component] = value;
                    }
                }

                if n_components > 1 && bpp == 4
                {
                    row[x * bpp + 3] = 0xFF;
                }
            }

            std::mem::swap(&mut above, &mut current);

            if !fresh
            {
                first_line = false;
            }
        }

        Ok(())
    }
}
