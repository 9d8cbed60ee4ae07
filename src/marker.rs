//! JPEG marker byte definitions.
//!
//! A marker is the byte `0xFF` followed by a non-zero byte, the non zero byte
//! tells us how to treat the segment that follows (or, for the standalone
//! markers, what state change to perform).

/// Markers that can occur in a JPEG stream.
///
/// The variants carrying a `u8` collapse marker families into one arm,
/// e.g all `SOFn` markers become `SOF(n)`.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub enum Marker
{
    /// Start Of Frame n
    SOF(u8),
    /// Reserved for JPEG extensions
    JPG(u8),
    /// Define Huffman Tables
    DHT,
    /// Define Arithmetic Coding conditioning
    DAC,
    /// Restart with modulo 8 count `m`
    RST(u8),
    /// Start of Image
    SOI,
    /// End of Image
    EOI,
    /// Start of Scan
    SOS,
    /// Define Quantization Tables
    DQT,
    /// Define Number of Lines
    DNL,
    /// Define Restart Interval
    DRI,
    /// Define Hierarchical progression
    DHP,
    /// Expand Reference Components
    EXP,
    /// Application segments
    APP(u8),
    /// Comment
    COM,
    /// For temporary private use in arithmetic coding
    TEM,
    /// Reserved
    RES,
}

impl Marker
{
    /// Map the byte following `0xFF` to a marker.
    ///
    /// Returns `None` for `0x00` (a stuff byte, not a marker) and `0xFF`
    /// (fill byte before a marker).
    #[must_use]
    pub fn from_u8(n: u8) -> Option<Marker>
    {
        use self::Marker::{
            APP, COM, DAC, DHP, DHT, DNL, DQT, DRI, EOI, EXP, JPG, RES, RST, SOF, SOI, SOS, TEM,
        };
        match n
        {
            0x00 | 0xFF => None,
            0x01 => Some(TEM),
            0x02..=0xBF => Some(RES),
            0xC0 => Some(SOF(0)),
            0xC1 => Some(SOF(1)),
            0xC2 => Some(SOF(2)),
            0xC3 => Some(SOF(3)),
            0xC4 => Some(DHT),
            0xC5 => Some(SOF(5)),
            0xC6 => Some(SOF(6)),
            0xC7 => Some(SOF(7)),
            0xC8 => Some(JPG(0xC8)),
            0xC9 => Some(SOF(9)),
            0xCA => Some(SOF(10)),
            0xCB => Some(SOF(11)),
            0xCC => Some(DAC),
            0xCD => Some(SOF(13)),
            0xCE => Some(SOF(14)),
            0xCF => Some(SOF(15)),
            0xD0..=0xD7 => Some(RST(n - 0xD0)),
            0xD8 => Some(SOI),
            0xD9 => Some(EOI),
            0xDA => Some(SOS),
            0xDB => Some(DQT),
            0xDC => Some(DNL),
            0xDD => Some(DRI),
            0xDE => Some(DHP),
            0xDF => Some(EXP),
            0xE0..=0xEF => Some(APP(n - 0xE0)),
            0xF0..=0xFD => Some(JPG(n - 0xF0)),
            0xFE => Some(COM),
        }
    }

    /// The full 16 bit marker value, `0xFFxx`.
    #[must_use]
    pub fn to_u16(self) -> u16
    {
        use self::Marker::{
            APP, COM, DAC, DHP, DHT, DNL, DQT, DRI, EOI, EXP, JPG, RES, RST, SOF, SOI, SOS, TEM,
        };
        0xFF00
            | u16::from(match self
            {
                TEM => 0x01,
                RES => 0x02,
                SOF(v) => 0xC0 + v,
                DHT => 0xC4,
                JPG(v) =>
                {
                    if v == 0xC8
                    {
                        0xC8
                    }
                    else
                    {
                        0xF0 + v
                    }
                }
                DAC => 0xCC,
                RST(v) => 0xD0 + v,
                SOI => 0xD8,
                EOI => 0xD9,
                SOS => 0xDA,
                DQT => 0xDB,
                DNL => 0xDC,
                DRI => 0xDD,
                DHP => 0xDE,
                EXP => 0xDF,
                APP(v) => 0xE0 + v,
                COM => 0xFE,
            })
    }

}

#[cfg(test)]
mod tests
{
    use super::Marker;

    #[test]
    fn marker_round_trip()
    {
        for n in 1..=0xFE_u8
        {
            if let Some(m) = Marker::from_u8(n)
            {
                // RES covers a whole byte range, it cannot round trip exactly
                if m == Marker::RES
                {
                    continue;
                }
                assert_eq!(m.to_u16(), 0xFF00 | u16::from(n), "marker 0x{n:02X}");
            }
        }
    }

    #[test]
    fn stuff_and_fill_bytes_are_not_markers()
    {
        assert!(Marker::from_u8(0x00).is_none());
        assert!(Marker::from_u8(0xFF).is_none());
    }
}
