//! A minimal owned pixel surface.
//!
//! The decoder writes into a surface and the encoder reads from one. A
//! surface is a rectangular byte buffer with a row stride and one of the
//! five supported sample formats; `blit` converts between formats when
//! the decode target does not match what the pipeline produced.

use crate::misc::SampleFormat;

/// A rectangular pixel buffer.
pub struct Surface
{
    pub(crate) data:   Vec<u8>,
    width:             usize,
    height:            usize,
    stride:            usize,
    format:            SampleFormat,
}

impl Surface
{
    /// Create a zero filled surface with a tight stride.
    #[must_use]
    pub fn new(width: usize, height: usize, format: SampleFormat) -> Surface
    {
        let stride = width * format.num_components();
        Surface {
            data: vec![0; stride * height],
            width,
            height,
            stride,
            format,
        }
    }

    /// Create a surface over existing pixel data.
    ///
    /// Returns `None` when the buffer is too small for the described
    /// geometry.
    #[must_use]
    pub fn from_data(
        data: Vec<u8>, width: usize, height: usize, stride: usize, format: SampleFormat,
    ) -> Option<Surface>
    {
        if stride < width * format.num_components() || data.len() < stride * height
        {
            return None;
        }
        Some(Surface {
            data,
            width,
            height,
            stride,
            format,
        })
    }

    #[must_use]
    pub fn width(&self) -> usize
    {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize
    {
        self.height
    }

    /// Row stride in bytes.
    #[must_use]
    pub fn stride(&self) -> usize
    {
        self.stride
    }

    #[must_use]
    pub fn format(&self) -> SampleFormat
    {
        self.format
    }

    #[must_use]
    pub fn data(&self) -> &[u8]
    {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8]
    {
        &mut self.data
    }

    /// Consume the surface and return the raw pixels.
    #[must_use]
    pub fn into_data(self) -> Vec<u8>
    {
        self.data
    }

    /// Copy `source` into this surface at `(x, y)`, converting formats
    /// pixel by pixel where they differ and clipping to this surface.
    pub fn blit(&mut self, x: usize, y: usize, source: &Surface)
    {
        let width = source.width.min(self.width.saturating_sub(x));
        let height = source.height.min(self.height.saturating_sub(y));

        if width == 0 || height == 0
        {
            return;
        }

        let src_bpp = source.format.num_components();
        let dst_bpp = self.format.num_components();

        if source.format == self.format
        {
            // same format, row copies suffice
            for row in 0..height
            {
                let src_start = row * source.stride;
                let dst_start = (y + row) * self.stride + x * dst_bpp;
                self.data[dst_start..dst_start + width * dst_bpp]
                    .copy_from_slice(&source.data[src_start..src_start + width * src_bpp]);
            }
            return;
        }

        for row in 0..height
        {
            let src_row = &source.data[row * source.stride..];
            let dst_start = (y + row) * self.stride + x * dst_bpp;
            let dst_row = &mut self.data[dst_start..dst_start + width * dst_bpp];

            for col in 0..width
            {
                let (r, g, b) = read_rgb(&src_row[col * src_bpp..], source.format);
                write_rgb(&mut dst_row[col * dst_bpp..], self.format, r, g, b);
            }
        }
    }
}

fn read_rgb(pixel: &[u8], format: SampleFormat) -> (u8, u8, u8)
{
    match format
    {
        SampleFormat::Y8 => (pixel[0], pixel[0], pixel[0]),
        SampleFormat::RGB | SampleFormat::RGBA => (pixel[0], pixel[1], pixel[2]),
        SampleFormat::BGR | SampleFormat::BGRA => (pixel[2], pixel[1], pixel[0]),
    }
}

fn write_rgb(pixel: &mut [u8], format: SampleFormat, r: u8, g: u8, b: u8)
{
    match format
    {
        SampleFormat::Y8 =>
        {
            // same luma weights the encoder uses
            pixel[0] =
                (((76 * i32::from(r)) + (151 * i32::from(g)) + (29 * i32::from(b))) >> 8) as u8;
        }
        SampleFormat::RGB =>
        {
            pixel[0] = r;
            pixel[1] = g;
            pixel[2] = b;
        }
        SampleFormat::BGR =>
        {
            pixel[0] = b;
            pixel[1] = g;
            pixel[2] = r;
        }
        SampleFormat::RGBA =>
        {
            pixel[0] = r;
            pixel[1] = g;
            pixel[2] = b;
            pixel[3] = 255;
        }
        SampleFormat::BGRA =>
        {
            pixel[0] = b;
            pixel[1] = g;
            pixel[2] = r;
            pixel[3] = 255;
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::Surface;
    use crate::misc::SampleFormat;

    #[test]
    fn blit_same_format_copies_rows()
    {
        let mut src = Surface::new(2, 2, SampleFormat::RGB);
        src.data_mut().copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);

        let mut dst = Surface::new(4, 4, SampleFormat::RGB);
        dst.blit(1, 1, &src);

        assert_eq!(&dst.data()[4 * 3 + 3..4 * 3 + 9], &[1, 2, 3, 4, 5, 6]);
        assert_eq!(&dst.data()[8 * 3 + 3..8 * 3 + 9], &[7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn blit_converts_rgb_to_bgra()
    {
        let mut src = Surface::new(1, 1, SampleFormat::RGB);
        src.data_mut().copy_from_slice(&[10, 20, 30]);

        let mut dst = Surface::new(1, 1, SampleFormat::BGRA);
        dst.blit(0, 0, &src);

        assert_eq!(dst.data(), &[30, 20, 10, 255]);
    }

    #[test]
    fn blit_clips_to_destination()
    {
        let src = Surface::new(4, 4, SampleFormat::Y8);
        let mut dst = Surface::new(2, 2, SampleFormat::Y8);
        // must not panic
        dst.blit(1, 1, &src);
    }
}
