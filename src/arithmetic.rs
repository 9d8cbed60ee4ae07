//! Adaptive binary arithmetic (QM) decoding, ITU-T T.81 Annex D.
//!
//! The probability estimation state machine of Table D.2 is packed into
//! one `u32` per state: `(Qe << 16) | (next_state_on_MPS << 8) |
//! next_state_on_LPS`, the top bit of a statistics bin byte stores the
//! current MPS sense.
//!
//! Decoding is strictly serial; every routine here mirrors its Huffman
//! counterpart in `bitstream.rs` and is dispatched through
//! [`DecodeState::decode_mcu`](crate::state::DecodeState).

use crate::bitstream::BitStream;
use crate::misc::{MAX_COMPONENTS, UN_ZIGZAG};
use crate::state::{DecodeBlock, DecodeState};

/// Arithmetic conditioning tables are numbered 0..15.
pub const NUM_ARITH_TABLES: usize = 16;

/// Statistics bins for DC coding per table.
pub const DC_STAT_BINS: usize = 64;

/// Statistics bins for AC coding per table.
pub const AC_STAT_BINS: usize = 256;

/// Table D.2, packed as `(Qe << 16) | (next_MPS << 8) | next_LPS`.
#[rustfmt::skip]
const QM_STATE_TABLE: [u32; 114] = [
    0x5a1d0181, 0x2586020e, 0x11140310, 0x080b0412, 0x03d80514, 0x01da0617,
    0x00e50719, 0x006f081c, 0x0036091e, 0x001a0a21, 0x000d0b23, 0x00060c09,
    0x00030d0a, 0x00010d0c, 0x5a7f0f8f, 0x3f251024, 0x2cf21126, 0x207c1227,
    0x17b91328, 0x1182142a, 0x0cef152b, 0x09a1162d, 0x072f172e, 0x055c1830,
    0x04061931, 0x03031a33, 0x02401b34, 0x01b11c36, 0x01441d38, 0x00f51e39,
    0x00b71f3b, 0x008a203c, 0x0068213e, 0x004e223f, 0x003b2320, 0x002c0921,
    0x5ae125a5, 0x484c2640, 0x3a0d2741, 0x2ef12843, 0x261f2944, 0x1f332a45,
    0x19a82b46, 0x15182c48, 0x11772d49, 0x0e742e4a, 0x0bfb2f4b, 0x09f8304d,
    0x0861314e, 0x0706324f, 0x05cd3330, 0x04de3432, 0x040f3532, 0x03633633,
    0x02d43734, 0x025c3835, 0x01f83936, 0x01a43a37, 0x01603b38, 0x01253c39,
    0x00f63d3a, 0x00cb3e3b, 0x00ab3f3d, 0x008f203d, 0x5b1241c1, 0x4d044250,
    0x412c4351, 0x37d84452, 0x2fe84553, 0x293c4654, 0x23794756, 0x1edf4857,
    0x1aa94957, 0x174e4a48, 0x14244b48, 0x119c4c4a, 0x0f6b4d4a, 0x0d514e4b,
    0x0bb64f4d, 0x0a40304d, 0x583251d0, 0x4d1c5258, 0x438e5359, 0x3bdd545a,
    0x34ee555b, 0x2eae565c, 0x299a575d, 0x25164756, 0x557059d8, 0x4ca95a5f,
    0x44d95b60, 0x3e225c61, 0x38245d63, 0x32b45e63, 0x2e17565d, 0x56a860df,
    0x4f466165, 0x47e56266, 0x41cf6367, 0x3c3d6468, 0x375e5d63, 0x52316669,
    0x4c0f676a, 0x4639686b, 0x415e6367, 0x56276ae9, 0x50e76b6c, 0x4b85676d,
    0x55976d6e, 0x504f6b6f, 0x5a106fee, 0x55226d70, 0x59eb6ff0, 0x5a1d7171,
];

/// The coder registers, split out of [`ArithmeticDecoder`] so the
/// decision function can borrow them alongside a statistics bin.
#[derive(Clone, Copy, Default)]
struct QmRegisters
{
    c:  u32,
    a:  u32,
    ct: i32,
}

/// Decode one binary decision against the statistics bin `st`.
///
/// Sections D.2.4 and D.2.5: renormalize, compare against Qe, then run
/// the conditional MPS/LPS exchange and advance the estimation state.
#[inline]
fn arith_decode(qm: &mut QmRegisters, stream: &mut BitStream, input: &[u8], st: &mut u8) -> i32
{
    while qm.a < 0x8000
    {
        qm.ct -= 1;
        if qm.ct < 0
        {
            let data = u32::from(stream.get_byte_stuffed(input));
            qm.c = (qm.c << 8) | data;
            qm.ct += 8;
        }

        qm.a <<= 1;
    }

    let mut sv = i32::from(*st);

    let mut qe = QM_STATE_TABLE[(sv & 0x7F) as usize];
    let next_lps = (qe & 0xFF) as u8;
    qe >>= 8;
    let next_mps = (qe & 0xFF) as u8;
    qe >>= 8;

    let mut temp = qm.a.wrapping_sub(qe);
    qm.a = temp;
    temp <<= qm.ct;

    if qm.c >= temp
    {
        qm.c -= temp;

        // conditional LPS (less probable symbol) exchange
        if qm.a < qe
        {
            qm.a = qe;
            *st = ((sv as u8) & 0x80) ^ next_mps;
        }
        else
        {
            qm.a = qe;
            *st = ((sv as u8) & 0x80) ^ next_lps;
            sv ^= 0x80;
        }
    }
    else if qm.a < 0x8000
    {
        // conditional MPS (more probable symbol) exchange
        if qm.a < qe
        {
            *st = ((sv as u8) & 0x80) ^ next_lps;
            sv ^= 0x80;
        }
        else
        {
            *st = ((sv as u8) & 0x80) ^ next_mps;
        }
    }

    sv >> 7
}

/// QM decoder state: coder registers, conditioning parameters from DAC
/// and the adaptive statistics bins.
#[derive(Clone)]
pub struct ArithmeticDecoder
{
    qm: QmRegisters,

    pub(crate) last_dc:    [i32; MAX_COMPONENTS],
    dc_context:            [usize; MAX_COMPONENTS],

    /// L parameters for the DC tables (lower diff threshold).
    pub(crate) dc_l: [u8; NUM_ARITH_TABLES],
    /// U parameters for the DC tables (upper diff threshold).
    pub(crate) dc_u: [u8; NUM_ARITH_TABLES],
    /// K parameters for the AC tables (band split index).
    pub(crate) ac_k: [u8; NUM_ARITH_TABLES],

    dc_stats:  [[u8; DC_STAT_BINS]; NUM_ARITH_TABLES],
    ac_stats:  [[u8; AC_STAT_BINS]; NUM_ARITH_TABLES],
    /// Statistics bin for coding with fixed probability 0.5.
    fixed_bin: [u8; 4],
}

impl Default for ArithmeticDecoder
{
    fn default() -> Self
    {
        let mut decoder = ArithmeticDecoder {
            qm:         QmRegisters::default(),
            last_dc:    [0; MAX_COMPONENTS],
            dc_context: [0; MAX_COMPONENTS],
            dc_l:       [0; NUM_ARITH_TABLES],
            dc_u:       [1; NUM_ARITH_TABLES],
            ac_k:       [5; NUM_ARITH_TABLES],
            dc_stats:   [[0; DC_STAT_BINS]; NUM_ARITH_TABLES],
            ac_stats:   [[0; AC_STAT_BINS]; NUM_ARITH_TABLES],
            fixed_bin:  [0; 4],
        };
        decoder.fixed_bin[0] = 113;
        decoder
    }
}

impl ArithmeticDecoder
{
    /// Re-initialize the coder from the next two stream bytes and clear
    /// all adaptive state. Called at scan start and at restart markers;
    /// the DAC conditioning parameters survive.
    pub fn restart(&mut self, stream: &mut BitStream, input: &[u8])
    {
        let v0 = u32::from(stream.get_byte_stuffed(input));
        let v1 = u32::from(stream.get_byte_stuffed(input));

        self.qm.c = (v0 << 8) | v1;
        self.qm.a = 0x10000;
        self.qm.ct = 0;

        self.dc_stats = [[0; DC_STAT_BINS]; NUM_ARITH_TABLES];
        self.ac_stats = [[0; AC_STAT_BINS]; NUM_ARITH_TABLES];
        self.fixed_bin = [0; 4];
        self.fixed_bin[0] = 113;

        self.last_dc = [0; MAX_COMPONENTS];
        self.dc_context = [0; MAX_COMPONENTS];
    }

    /// Decode a DC difference (Section F.1.4.4.1) and fold it into
    /// `last_dc[ci]`, updating the conditioning context.
    fn decode_dc_value(&mut self, stream: &mut BitStream, input: &[u8], tbl: usize, ci: usize)
    {
        let idx = self.dc_context[ci];

        if arith_decode(&mut self.qm, stream, input, &mut self.dc_stats[tbl][idx]) == 0
        {
            // zero diff
            self.dc_context[ci] = 0;
            return;
        }

        let sign = arith_decode(&mut self.qm, stream, input, &mut self.dc_stats[tbl][idx + 1]);

        let mut st = (idx + 2 + sign as usize).min(DC_STAT_BINS - 1);
        let mut m = arith_decode(&mut self.qm, stream, input, &mut self.dc_stats[tbl][st]);

        if m != 0
        {
            // Table F.4: X1 = 20
            st = 20;
            while arith_decode(&mut self.qm, stream, input, &mut self.dc_stats[tbl][st]) != 0
            {
                m <<= 1;
                if m > (1 << 15) || st + 1 >= DC_STAT_BINS
                {
                    // corrupt stream, the magnitude category never ends
                    break;
                }
                st += 1;
            }
        }

        // Section F.1.4.4.1.2: establish the conditioning category
        if m < (1 << self.dc_l[tbl]) >> 1
        {
            self.dc_context[ci] = 0;
        }
        else if m > (1 << self.dc_u[tbl]) >> 1
        {
            self.dc_context[ci] = 12 + (sign as usize * 4);
        }
        else
        {
            self.dc_context[ci] = 4 + (sign as usize * 4);
        }

        let mut v = m;

        // Figure F.24: decode the magnitude bit pattern
        st += 14;
        st = st.min(DC_STAT_BINS - 1);
        while m > 1
        {
            m >>= 1;
            if arith_decode(&mut self.qm, stream, input, &mut self.dc_stats[tbl][st]) != 0
            {
                v |= m;
            }
        }

        v += 1;
        if sign != 0
        {
            v = -v;
        }
        self.last_dc[ci] += v;
    }

    /// Decode one non-zero AC coefficient magnitude after the zero-run
    /// phase placed `st` at its first magnitude bin. Returns the signed
    /// value.
    fn decode_ac_value(
        &mut self, stream: &mut BitStream, input: &[u8], tbl: usize, k: usize, mut st: usize,
    ) -> i32
    {
        let sign = arith_decode(&mut self.qm, stream, input, &mut self.fixed_bin[0]);
        st += 2;

        let mut m = arith_decode(&mut self.qm, stream, input, &mut self.ac_stats[tbl][st]);
        if m != 0
            && arith_decode(&mut self.qm, stream, input, &mut self.ac_stats[tbl][st]) != 0
        {
            m <<= 1;
            st = if k <= usize::from(self.ac_k[tbl]) { 189 } else { 217 };

            while arith_decode(&mut self.qm, stream, input, &mut self.ac_stats[tbl][st]) != 0
            {
                m <<= 1;
                if m > (1 << 15) || st + 1 >= AC_STAT_BINS
                {
                    break;
                }
                st += 1;
            }
        }

        let mut v = m;

        st = (st + 14).min(AC_STAT_BINS - 1);
        while m > 1
        {
            m >>= 1;
            if arith_decode(&mut self.qm, stream, input, &mut self.ac_stats[tbl][st]) != 0
            {
                v |= m;
            }
        }

        v += 1;
        if sign != 0
        {
            v = -v;
        }
        v
    }

    fn decode_mcu(
        &mut self, stream: &mut BitStream, input: &[u8], blocks: &[DecodeBlock], end: usize,
        output: &mut [i16],
    )
    {
        output[..blocks.len() * 64].fill(0);

        for (j, block) in blocks.iter().enumerate()
        {
            let out = &mut output[j * 64..(j + 1) * 64];

            // DC
            self.decode_dc_value(stream, input, block.dc, block.pred);
            out[0] = self.last_dc[block.pred] as i16;

            // AC, Figure F.20
            let tbl = block.ac;
            let mut k = 1_usize;

            'ac: while k <= end
            {
                let mut st = 3 * (k - 1);

                if arith_decode(&mut self.qm, stream, input, &mut self.ac_stats[tbl][st]) != 0
                {
                    // EOB
                    break;
                }

                while arith_decode(&mut self.qm, stream, input, &mut self.ac_stats[tbl][st + 1])
                    == 0
                {
                    st += 3;
                    k += 1;
                    if k > 63
                    {
                        break 'ac;
                    }
                }

                let v = self.decode_ac_value(stream, input, tbl, k, st);
                out[UN_ZIGZAG[k] & 63] = v as i16;

                k += 1;
            }
        }
    }

    fn decode_mcu_lossless(
        &mut self, stream: &mut BitStream, input: &[u8], blocks: &[DecodeBlock],
        output: &mut [i16],
    )
    {
        for (j, block) in blocks.iter().enumerate()
        {
            self.decode_dc_value(stream, input, block.dc, block.pred);
            output[j] = self.last_dc[block.pred] as i16;
        }
    }

    fn decode_dc_first(
        &mut self, stream: &mut BitStream, input: &[u8], blocks: &[DecodeBlock], al: u8,
        output: &mut [i16],
    )
    {
        for block in blocks
        {
            let dest = &mut output[block.offset..block.offset + 64];
            dest.fill(0);

            self.decode_dc_value(stream, input, block.dc, block.pred);

            dest[0] = (self.last_dc[block.pred] << al) as i16;
        }
    }

    fn decode_dc_refine(
        &mut self, stream: &mut BitStream, input: &[u8], blocks: &[DecodeBlock], al: u8,
        output: &mut [i16],
    )
    {
        for block in blocks
        {
            // the coded data is simply the next bit of the DC value
            if arith_decode(&mut self.qm, stream, input, &mut self.fixed_bin[0]) != 0
            {
                output[block.offset] |= 1 << al;
            }
        }
    }

    fn decode_ac_first(
        &mut self, stream: &mut BitStream, input: &[u8], tbl: usize, start: usize, end: usize,
        al: u8, output: &mut [i16],
    )
    {
        let mut k = start.max(1);

        while k <= end
        {
            let mut st = 3 * (k - 1);

            if arith_decode(&mut self.qm, stream, input, &mut self.ac_stats[tbl][st]) != 0
            {
                // EOB flag
                break;
            }

            while arith_decode(&mut self.qm, stream, input, &mut self.ac_stats[tbl][st + 1]) == 0
            {
                st += 3;
                k += 1;
                if k > 63
                {
                    return;
                }
            }

            let v = self.decode_ac_value(stream, input, tbl, k, st);
            output[UN_ZIGZAG[k] & 63] = (v << al) as i16;

            k += 1;
        }
    }

    fn decode_ac_refine(
        &mut self, stream: &mut BitStream, input: &[u8], tbl: usize, start: usize, end: usize,
        al: u8, output: &mut [i16],
    )
    {
        let p1 = 1_i16 << al;
        let m1 = -1_i16 << al;

        // establish EOBx, the end-of-block index of the previous stage
        let mut kex = end;
        while kex > 0
        {
            if output[UN_ZIGZAG[kex] & 63] != 0
            {
                break;
            }
            kex -= 1;
        }

        let mut k = start.max(1);
        'band: while k <= end
        {
            let mut st = 3 * (k - 1);

            if k > kex
                && arith_decode(&mut self.qm, stream, input, &mut self.ac_stats[tbl][st]) != 0
            {
                // EOB flag
                break;
            }

            // the coefficient position is pinned while the zero run
            // advances `st` and `k` below it
            let pos = UN_ZIGZAG[k] & 63;

            loop
            {
                if output[pos] != 0
                {
                    // previously non-zero, read a correction bit
                    if arith_decode(&mut self.qm, stream, input, &mut self.ac_stats[tbl][st + 2])
                        != 0
                    {
                        output[pos] += if output[pos] < 0 { m1 } else { p1 };
                    }
                    break;
                }

                if arith_decode(&mut self.qm, stream, input, &mut self.ac_stats[tbl][st + 1]) != 0
                {
                    // newly non-zero, a fixed-probability sign bit
                    let negative =
                        arith_decode(&mut self.qm, stream, input, &mut self.fixed_bin[0]) != 0;

                    output[pos] = if negative { m1 } else { p1 };
                    break;
                }

                st += 3;
                k += 1;
                if k > 63
                {
                    break 'band;
                }
            }

            k += 1;
        }
    }
}

// dispatch wrappers, these destructure `DecodeState` so the borrow of
// the bit stream and the borrow of the arithmetic state stay disjoint
impl DecodeState
{
    pub(crate) fn arith_decode_mcu(&mut self, input: &[u8], output: &mut [i16])
    {
        let blocks = self.blocks;
        let end = self.spectral_end.max(1).min(63);
        let DecodeState {
            stream, arithmetic, block, ..
        } = self;
        arithmetic.decode_mcu(stream, input, &block[..blocks], end, output);
    }

    pub(crate) fn arith_decode_mcu_lossless(&mut self, input: &[u8], output: &mut [i16])
    {
        let blocks = self.blocks;
        let DecodeState {
            stream, arithmetic, block, ..
        } = self;
        arithmetic.decode_mcu_lossless(stream, input, &block[..blocks], output);
    }

    pub(crate) fn arith_decode_dc_first(&mut self, input: &[u8], output: &mut [i16])
    {
        let blocks = self.blocks;
        let al = self.successive_low;
        let DecodeState {
            stream, arithmetic, block, ..
        } = self;
        arithmetic.decode_dc_first(stream, input, &block[..blocks], al, output);
    }

    pub(crate) fn arith_decode_dc_refine(&mut self, input: &[u8], output: &mut [i16])
    {
        let blocks = self.blocks;
        let al = self.successive_low;
        let DecodeState {
            stream, arithmetic, block, ..
        } = self;
        arithmetic.decode_dc_refine(stream, input, &block[..blocks], al, output);
    }

    pub(crate) fn arith_decode_ac_first(&mut self, input: &[u8], output: &mut [i16])
    {
        let tbl = self.block[0].ac;
        let (start, end) = (self.spectral_start, self.spectral_end.min(63));
        let al = self.successive_low;
        let DecodeState {
            stream, arithmetic, ..
        } = self;
        arithmetic.decode_ac_first(stream, input, tbl, start, end, al, output);
    }

    pub(crate) fn arith_decode_ac_refine(&mut self, input: &[u8], output: &mut [i16])
    {
        let tbl = self.block[0].ac;
        let (start, end) = (self.spectral_start, self.spectral_end.min(63));
        let al = self.successive_low;
        let DecodeState {
            stream, arithmetic, ..
        } = self;
        arithmetic.decode_ac_refine(stream, input, tbl, start, end, al, output);
    }
}

#[cfg(test)]
mod tests
{
    use super::{arith_decode, ArithmeticDecoder, QmRegisters};
    use crate::bitstream::BitStream;

    #[test]
    fn zero_stream_decodes_mps()
    {
        let mut decoder = ArithmeticDecoder::default();
        let input = [0_u8; 8];
        let mut stream = BitStream::new(0);

        decoder.restart(&mut stream, &input);
        assert_eq!(stream.position, 2);

        // with c = 0 the first decisions on a fresh bin are all MPS (0)
        let mut qm = decoder.qm;
        let mut st = 0_u8;
        for _ in 0..4
        {
            assert_eq!(arith_decode(&mut qm, &mut stream, &input, &mut st), 0);
        }
    }

    #[test]
    fn restart_clears_adaptive_state()
    {
        let mut decoder = ArithmeticDecoder::default();
        let input = [0_u8; 8];
        let mut stream = BitStream::new(0);

        decoder.last_dc = [7; 4];
        decoder.restart(&mut stream, &input);

        assert_eq!(decoder.last_dc, [0; 4]);
        assert_eq!(decoder.fixed_bin[0], 113);
        // DAC conditioning survives a restart
        assert_eq!(decoder.ac_k[0], 5);
    }

    #[test]
    fn state_table_transitions_stay_in_range()
    {
        for packed in super::QM_STATE_TABLE
        {
            let next_lps = packed & 0x7F;
            let next_mps = (packed >> 8) & 0x7F;
            assert!((next_lps as usize) < super::QM_STATE_TABLE.len());
            assert!((next_mps as usize) < super::QM_STATE_TABLE.len());
        }
    }
}
