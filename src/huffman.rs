//! Canonical Huffman table construction and symbol decode.
//!
//! A table is loaded from a DHT segment as the classic `(size, value)`
//! pair of vectors and then configured into two acceleration structures:
//!
//! - a `2^9` entry lookup that maps peeked bits straight to `(length,
//!   symbol)` for codes no longer than 9 bits, which covers nearly every
//!   symbol in real images.
//! - per-length left-justified `maxcode` values (saturated with one bits
//!   below the code) and `value_offset` deltas for the slow walk used by
//!   longer codes.

use crate::bitstream::BitStream;
use crate::errors::DecodeErrors;
use crate::misc::MAX_COMPONENTS;

/// Number of bits the fast lookup consumes at once.
pub const HUFF_LOOKUP_BITS: usize = 9;

/// Size of the fast lookup table.
pub const HUFF_LOOKUP_SIZE: usize = 1 << HUFF_LOOKUP_BITS;

/// A configured Huffman table.
#[derive(Clone)]
pub struct HuffmanTable
{
    /// Number of codes per code length, 1 indexed (`size[1]..=size[16]`).
    pub(crate) size:   [u8; 17],
    /// Symbols in canonical order.
    pub(crate) values: [u8; 256],

    // acceleration tables, built by `configure`
    maxcode:      [u64; 18],
    value_offset: [i64; 19],
    lookup_size:  [u8; HUFF_LOOKUP_SIZE],
    lookup_value: [u8; HUFF_LOOKUP_SIZE],
}

impl Default for HuffmanTable
{
    fn default() -> Self
    {
        HuffmanTable {
            size:         [0; 17],
            values:       [0; 256],
            maxcode:      [0; 18],
            value_offset: [0; 19],
            // lookup size of LOOKUP_BITS+1 flags "code longer than the lookup"
            lookup_size:  [(HUFF_LOOKUP_BITS + 1) as u8; HUFF_LOOKUP_SIZE],
            lookup_value: [0; HUFF_LOOKUP_SIZE],
        }
    }
}

impl HuffmanTable
{
    /// Build a table from the DHT `bits` counts and symbol list.
    ///
    /// # Errors
    /// When the counts describe more than 256 symbols or the canonical
    /// code assignment overflows a code length.
    pub fn new(counts: &[u8; 17], symbols: &[u8]) -> Result<HuffmanTable, DecodeErrors>
    {
        let mut table = HuffmanTable::default();

        table.size = *counts;

        if symbols.len() > 256
        {
            return Err(DecodeErrors::HuffmanDecode(
                "Huffman table carries more than 256 symbols".to_string(),
            ));
        }
        table.values[..symbols.len()].copy_from_slice(symbols);

        table.configure()?;

        Ok(table)
    }

    /// Generate the canonical codes and the acceleration tables.
    ///
    /// Follows Figures C.1/C.2/F.15 of the specification; rejects count
    /// vectors that cannot form a prefix code.
    fn configure(&mut self) -> Result<(), DecodeErrors>
    {
        let mut huffsize = [0_u8; 257];
        let mut huffcode = [0_u32; 257];

        // Figure C.1: make a table of Huffman code lengths per symbol
        let mut p = 0;
        for length in 1..=16_usize
        {
            let count = usize::from(self.size[length]);
            if p + count > 256
            {
                return Err(DecodeErrors::HuffmanDecode(
                    "Huffman table carries more than 256 symbols".to_string(),
                ));
            }
            for _ in 0..count
            {
                huffsize[p] = length as u8;
                p += 1;
            }
        }
        huffsize[p] = 0;

        // Figure C.2: generate the codes themselves, checking that the
        // counts describe a legal prefix code.
        let mut code = 0_u32;
        let mut si = huffsize[0];
        let mut k = 0;
        while huffsize[k] != 0
        {
            while huffsize[k] == si
            {
                huffcode[k] = code;
                code += 1;
                k += 1;
            }
            if code > (1 << si)
            {
                return Err(DecodeErrors::HuffmanDecode(
                    "Huffman code lengths overflow their prefix space".to_string(),
                ));
            }
            code <<= 1;
            si += 1;
        }

        // Figure F.15: generate decoding tables for bit-sequential
        // decoding. `maxcode` is left justified to the register width and
        // saturated with one bits so a left justified peek can be
        // compared against it directly.
        p = 0;
        for length in 1..=16_usize
        {
            if self.size[length] != 0
            {
                self.value_offset[length] = p as i64 - i64::from(huffcode[p]);
                p += usize::from(self.size[length]);

                let max = u64::from(huffcode[p - 1]);
                self.maxcode[length] = (max << (64 - length)) | ((1_u64 << (64 - length)) - 1);
            }
            else
            {
                // no code of this length, any peek compares larger
                self.maxcode[length] = 0;
            }
        }
        self.value_offset[17] = 0;
        self.value_offset[18] = 0;
        // terminates the slow walk no matter how corrupt the stream is
        self.maxcode[17] = u64::MAX;

        // lookahead table: left justify every short code and fill in all
        // the bit suffixes below it
        p = 0;
        for length in 1..=HUFF_LOOKUP_BITS
        {
            let shift = HUFF_LOOKUP_BITS - length;

            for _ in 0..self.size[length]
            {
                let look = (huffcode[p] as usize) << shift;

                if look + (1 << shift) > HUFF_LOOKUP_SIZE
                {
                    return Err(DecodeErrors::HuffmanDecode(
                        "Huffman lookup table overflow".to_string(),
                    ));
                }

                for suffix in 0..(1 << shift)
                {
                    self.lookup_size[look + suffix] = length as u8;
                    self.lookup_value[look + suffix] = self.values[p];
                }
                p += 1;
            }
        }

        Ok(())
    }

    /// Decode the next symbol from the bit stream.
    ///
    /// A corrupted stream decodes to symbol zero instead of erroring,
    /// callers treat zero as EOB/empty and finish the block.
    #[inline(always)]
    pub(crate) fn decode(&self, stream: &mut BitStream, input: &[u8]) -> i32
    {
        stream.ensure16(input);

        let index = stream.peek_bits(HUFF_LOOKUP_BITS as i32) as usize;
        let mut length = i32::from(self.lookup_size[index]);

        let symbol;

        if length <= HUFF_LOOKUP_BITS as i32
        {
            symbol = i32::from(self.lookup_value[index]);
        }
        else
        {
            // left justify the whole register and walk the max codes
            let x = stream.left_justified();
            while x > self.maxcode[length as usize]
            {
                length += 1;
            }

            if length > 16
            {
                // not a valid code, emit a zero symbol and let the block end
                stream.consume(16);
                return 0;
            }

            let offset = (x >> (64 - length)) as i64 + self.value_offset[length as usize];
            if !(0..256).contains(&offset)
            {
                stream.consume(length);
                return 0;
            }
            symbol = i32::from(self.values[offset as usize]);
        }

        stream.consume(length);

        symbol
    }
}

/// Per-scan Huffman decoding state, the four DC and four AC table slots
/// plus the DC predictors and the progressive EOB run counter.
#[derive(Clone, Default)]
pub struct HuffmanDecoder
{
    pub(crate) last_dc: [i32; MAX_COMPONENTS],
    pub(crate) eob_run: i32,

    pub(crate) dc_tables: [Option<HuffmanTable>; MAX_COMPONENTS],
    pub(crate) ac_tables: [Option<HuffmanTable>; MAX_COMPONENTS],
}

impl HuffmanDecoder
{
    /// Reset entropy state, called at scan start and at restart markers.
    pub fn restart(&mut self)
    {
        self.last_dc = [0; MAX_COMPONENTS];
        self.eob_run = 0;
    }
}

#[cfg(test)]
mod tests
{
    use super::HuffmanTable;

    fn std_luminance_dc() -> HuffmanTable
    {
        let mut counts = [0_u8; 17];
        counts[1..17].copy_from_slice(&[0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0]);
        let symbols: Vec<u8> = (0..12).collect();
        HuffmanTable::new(&counts, &symbols).unwrap()
    }

    #[test]
    fn standard_table_builds()
    {
        let table = std_luminance_dc();
        // symbol 0 has the two bit code 00, every lookup entry whose top
        // two bits are zero must resolve to it
        assert_eq!(table.lookup_size[0], 2);
        assert_eq!(table.lookup_value[0], 0);
    }

    #[test]
    fn oversubscribed_table_is_rejected()
    {
        let mut counts = [0_u8; 17];
        // five codes of length two cannot exist
        counts[2] = 5;
        let symbols = [0, 1, 2, 3, 4];
        assert!(HuffmanTable::new(&counts, &symbols).is_err());
    }

    #[test]
    fn all_length_16_codes_build()
    {
        let mut counts = [0_u8; 17];
        counts[16] = 4;
        let symbols = [1, 2, 3, 4];
        assert!(HuffmanTable::new(&counts, &symbols).is_ok());
    }
}
