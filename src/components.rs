//! Frame component records, extracted from the SOF header.

use crate::errors::DecodeErrors;
use crate::misc::MAX_COMPONENTS;

/// One component of the frame: identifier, sampling factors, the
/// quantization table it selects and its first block slot in the MCU.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Frame
{
    /// Component identifier as coded in the stream (1..=255).
    pub component_id: u8,
    /// Horizontal sampling factor, 1..=4.
    pub hsf:          usize,
    /// Vertical sampling factor, 1..=4.
    pub vsf:          usize,
    /// Quantization table destination selector.
    pub tq:           usize,
    /// Offset of this component's first block within the MCU.
    pub offset:       usize,
}

impl Frame
{
    /// Parse the three bytes of one SOF component entry.
    pub fn from_bytes(bytes: [u8; 3], offset: usize, lossless: bool)
        -> Result<Frame, DecodeErrors>
    {
        let component_id = bytes[0];
        let hsf = usize::from((bytes[1] >> 4) & 0xF);
        let vsf = usize::from(bytes[1] & 0xF);
        let tq = usize::from(bytes[2]);

        if !(1..=4).contains(&hsf) || !(1..=4).contains(&vsf)
        {
            return Err(DecodeErrors::SofError(format!(
                "Invalid sampling factors ({hsf} x {vsf}) for component {component_id}, expected values between 1 and 4"
            )));
        }

        // lossless frames carry no quantization tables at all
        let max_tq = if lossless { 0 } else { MAX_COMPONENTS - 1 };
        if tq > max_tq
        {
            return Err(DecodeErrors::SofError(format!(
                "Quantization table index {tq} out of range for component {component_id}"
            )));
        }

        Ok(Frame {
            component_id,
            hsf,
            vsf,
            tq,
            offset,
        })
    }

    /// Number of 8x8 blocks this component contributes to one MCU.
    #[must_use]
    pub fn blocks_per_mcu(&self) -> usize
    {
        self.hsf * self.vsf
    }
}

#[cfg(test)]
mod tests
{
    use super::Frame;

    #[test]
    fn rejects_zero_sampling()
    {
        assert!(Frame::from_bytes([1, 0x01, 0], 0, false).is_err());
        assert!(Frame::from_bytes([1, 0x10, 0], 0, false).is_err());
    }

    #[test]
    fn rejects_large_quant_index()
    {
        assert!(Frame::from_bytes([1, 0x11, 4], 0, false).is_err());
        // and lossless allows none at all
        assert!(Frame::from_bytes([1, 0x11, 1], 0, true).is_err());
    }

    #[test]
    fn parses_a_sane_component()
    {
        let frame = Frame::from_bytes([2, 0x22, 1], 4, false).unwrap();
        assert_eq!(frame.component_id, 2);
        assert_eq!(frame.hsf, 2);
        assert_eq!(frame.vsf, 2);
        assert_eq!(frame.tq, 1);
        assert_eq!(frame.blocks_per_mcu(), 4);
    }
}
