//! Forward DCT with fused reciprocal quantization.
//!
//! AA&N-style factorization: the row pass keeps 10 fractional bits and
//! truncates to 16, the column pass keeps 13, then each coefficient is
//! quantized by a reciprocal multiply `(v * (0x8000 / q) + 0x4000) >>
//! 15` so no division happens per block. The SIMD variants run four
//! transforms per vector with the same 32 bit sequence and are bit
//! identical to the scalar path.

const C1: i32 = 1420; // cos 1PI/16 * root(2)
const C2: i32 = 1338; // cos 2PI/16 * root(2)
const C3: i32 = 1204; // cos 3PI/16 * root(2)
const C5: i32 = 805; // cos 5PI/16 * root(2)
const C6: i32 = 554; // cos 6PI/16 * root(2)
const C7: i32 = 283; // cos 7PI/16 * root(2)

/// Transform-and-quantize function, natural order in and out.
pub(crate) type FdctFn = fn(&mut [i16; 64], &[i16; 64], &[i16; 64]);

/// Pick the fastest forward DCT the CPU supports.
#[allow(unreachable_code)]
pub(crate) fn choose_fdct(use_simd: bool) -> (FdctFn, &'static str)
{
    if use_simd
    {
        #[cfg(all(feature = "x86", any(target_arch = "x86", target_arch = "x86_64")))]
        {
            if is_x86_feature_detected!("sse4.1")
            {
                return (sse41::fdct_sse41, "SSE4.1");
            }
        }

        #[cfg(all(feature = "neon", target_arch = "aarch64"))]
        {
            return (neon::fdct_neon, "NEON");
        }
    }

    (fdct_scalar, "Scalar")
}

/// Transform one level-shifted 8x8 block and quantize with the
/// reciprocal table. Input and output are in natural order.
pub(crate) fn fdct_scalar(dest: &mut [i16; 64], data: &[i16; 64], qtable: &[i16; 64])
{
    let mut temp = [0_i16; 64];

    for i in 0..8
    {
        let row = &data[i * 8..i * 8 + 8];

        let x8 = i32::from(row[0]) + i32::from(row[7]);
        let x0 = i32::from(row[0]) - i32::from(row[7]);
        let x7 = i32::from(row[1]) + i32::from(row[6]);
        let x1 = i32::from(row[1]) - i32::from(row[6]);
        let x6 = i32::from(row[2]) + i32::from(row[5]);
        let x2 = i32::from(row[2]) - i32::from(row[5]);
        let x5 = i32::from(row[3]) + i32::from(row[4]);
        let x3 = i32::from(row[3]) - i32::from(row[4]);

        let x4 = x8 + x5;
        let x8 = x8 - x5;
        let x5 = x7 + x6;
        let x7 = x7 - x6;

        temp[i * 8] = (x4 + x5) as i16;
        temp[i * 8 + 4] = (x4 - x5) as i16;
        temp[i * 8 + 2] = ((x8 * C2 + x7 * C6) >> 10) as i16;
        temp[i * 8 + 6] = ((x8 * C6 - x7 * C2) >> 10) as i16;
        temp[i * 8 + 7] = ((x0 * C7 - x1 * C5 + x2 * C3 - x3 * C1) >> 10) as i16;
        temp[i * 8 + 5] = ((x0 * C5 - x1 * C1 + x2 * C7 + x3 * C3) >> 10) as i16;
        temp[i * 8 + 3] = ((x0 * C3 - x1 * C7 - x2 * C1 - x3 * C5) >> 10) as i16;
        temp[i * 8 + 1] = ((x0 * C1 + x1 * C3 + x2 * C5 + x3 * C7) >> 10) as i16;
    }

    for i in 0..8
    {
        let x8 = i32::from(temp[i]) + i32::from(temp[i + 56]);
        let x0 = i32::from(temp[i]) - i32::from(temp[i + 56]);
        let x7 = i32::from(temp[i + 8]) + i32::from(temp[i + 48]);
        let x1 = i32::from(temp[i + 8]) - i32::from(temp[i + 48]);
        let x6 = i32::from(temp[i + 16]) + i32::from(temp[i + 40]);
        let x2 = i32::from(temp[i + 16]) - i32::from(temp[i + 40]);
        let x5 = i32::from(temp[i + 24]) + i32::from(temp[i + 32]);
        let x3 = i32::from(temp[i + 24]) - i32::from(temp[i + 32]);

        let x4 = x8 + x5;
        let x8 = x8 - x5;
        let x5 = x7 + x6;
        let x7 = x7 - x6;

        let v0 = (x4 + x5) >> 3;
        let v4 = (x4 - x5) >> 3;
        let v2 = (x8 * C2 + x7 * C6) >> 13;
        let v6 = (x8 * C6 - x7 * C2) >> 13;
        let v7 = (x0 * C7 - x1 * C5 + x2 * C3 - x3 * C1) >> 13;
        let v5 = (x0 * C5 - x1 * C1 + x2 * C7 + x3 * C3) >> 13;
        let v3 = (x0 * C3 - x1 * C7 - x2 * C1 - x3 * C5) >> 13;
        let v1 = (x0 * C1 + x1 * C3 + x2 * C5 + x3 * C7) >> 13;

        let quantize = |v: i32, q: i16| ((v * i32::from(q) + 0x4000) >> 15) as i16;

        dest[i] = quantize(v0, qtable[i]);
        dest[i + 8] = quantize(v1, qtable[i + 8]);
        dest[i + 16] = quantize(v2, qtable[i + 16]);
        dest[i + 24] = quantize(v3, qtable[i + 24]);
        dest[i + 32] = quantize(v4, qtable[i + 32]);
        dest[i + 40] = quantize(v5, qtable[i + 40]);
        dest[i + 48] = quantize(v6, qtable[i + 48]);
        dest[i + 56] = quantize(v7, qtable[i + 56]);
    }
}

#[cfg(all(feature = "x86", any(target_arch = "x86", target_arch = "x86_64")))]
mod sse41
{
    //! SSE4.1 forward DCT, four transforms per vector.

    #[cfg(target_arch = "x86")]
    use core::arch::x86::*;
    #[cfg(target_arch = "x86_64")]
    use core::arch::x86_64::*;

    use super::{C1, C2, C3, C5, C6, C7};

    pub fn fdct_sse41(dest: &mut [i16; 64], data: &[i16; 64], qtable: &[i16; 64])
    {
        unsafe {
            fdct_sse41_impl(dest, data, qtable);
        }
    }

    /// Emulate the scalar path's `as i16` truncation on i32 lanes.
    #[inline(always)]
    unsafe fn trunc16(v: __m128i) -> __m128i
    {
        _mm_srai_epi32::<16>(_mm_slli_epi32::<16>(v))
    }

    /// One butterfly stage: eight input vectors (lanes are independent
    /// transforms) to eight output vectors in coefficient order.
    #[inline(always)]
    unsafe fn butterfly(d: [__m128i; 8]) -> [__m128i; 8]
    {
        let mul = |v, c: i32| _mm_mullo_epi32(v, _mm_set1_epi32(c));

        let x8 = _mm_add_epi32(d[0], d[7]);
        let x0 = _mm_sub_epi32(d[0], d[7]);
        let x7 = _mm_add_epi32(d[1], d[6]);
        let x1 = _mm_sub_epi32(d[1], d[6]);
        let x6 = _mm_add_epi32(d[2], d[5]);
        let x2 = _mm_sub_epi32(d[2], d[5]);
        let x5 = _mm_add_epi32(d[3], d[4]);
        let x3 = _mm_sub_epi32(d[3], d[4]);

        let x4 = _mm_add_epi32(x8, x5);
        let x8 = _mm_sub_epi32(x8, x5);
        let x5 = _mm_add_epi32(x7, x6);
        let x7 = _mm_sub_epi32(x7, x6);

        [
            _mm_add_epi32(x4, x5),
            _mm_add_epi32(
                _mm_add_epi32(mul(x0, C1), mul(x1, C3)),
                _mm_add_epi32(mul(x2, C5), mul(x3, C7)),
            ),
            _mm_add_epi32(mul(x8, C2), mul(x7, C6)),
            _mm_sub_epi32(
                _mm_sub_epi32(mul(x0, C3), mul(x1, C7)),
                _mm_add_epi32(mul(x2, C1), mul(x3, C5)),
            ),
            _mm_sub_epi32(x4, x5),
            _mm_add_epi32(
                _mm_sub_epi32(mul(x0, C5), mul(x1, C1)),
                _mm_add_epi32(mul(x2, C7), mul(x3, C3)),
            ),
            _mm_sub_epi32(mul(x8, C6), mul(x7, C2)),
            _mm_sub_epi32(
                _mm_add_epi32(_mm_sub_epi32(mul(x0, C7), mul(x1, C5)), mul(x2, C3)),
                mul(x3, C1),
            ),
        ]
    }

    #[target_feature(enable = "sse4.1")]
    unsafe fn fdct_sse41_impl(dest: &mut [i16; 64], data: &[i16; 64], qtable: &[i16; 64])
    {
        // transpose the input so the row transforms see their elements
        // as contiguous lanes
        let mut cols = [0_i32; 64];
        for r in 0..8
        {
            for j in 0..8
            {
                cols[j * 8 + r] = i32::from(data[r * 8 + j]);
            }
        }

        let mut temp = [0_i32; 64];
        let mut stage = [0_i32; 32];

        // row pass: >>10 on the odd/even products, plain sums for 0/4,
        // everything truncated to 16 bits like the scalar path
        for base in [0_usize, 4]
        {
            let mut d = [_mm_setzero_si128(); 8];
            for (j, v) in d.iter_mut().enumerate()
            {
                *v = _mm_loadu_si128(cols.as_ptr().add(j * 8 + base).cast());
            }

            let out = butterfly(d);

            for (pos, v) in out.iter().enumerate()
            {
                let value = if pos == 0 || pos == 4
                {
                    trunc16(*v)
                }
                else
                {
                    trunc16(_mm_srai_epi32::<10>(*v))
                };
                _mm_storeu_si128(stage.as_mut_ptr().add(pos * 4).cast(), value);
            }

            for lane in 0..4
            {
                for pos in 0..8
                {
                    temp[(base + lane) * 8 + pos] = stage[pos * 4 + lane];
                }
            }
        }

        // column pass with fused quantization
        for base in [0_usize, 4]
        {
            let mut d = [_mm_setzero_si128(); 8];
            for (k, v) in d.iter_mut().enumerate()
            {
                *v = _mm_loadu_si128(temp.as_ptr().add(k * 8 + base).cast());
            }

            let out = butterfly(d);
            let round = _mm_set1_epi32(0x4000);

            for (pos, v) in out.iter().enumerate()
            {
                let value = if pos == 0 || pos == 4
                {
                    _mm_srai_epi32::<3>(*v)
                }
                else
                {
                    _mm_srai_epi32::<13>(*v)
                };

                // quantize: (v * inverse_q + 0x4000) >> 15
                let q16 = _mm_loadl_epi64(qtable.as_ptr().add(pos * 8 + base).cast());
                let q = _mm_cvtepi16_epi32(q16);

                let quantized =
                    _mm_srai_epi32::<15>(_mm_add_epi32(_mm_mullo_epi32(value, q), round));

                _mm_storeu_si128(stage.as_mut_ptr().add(pos * 4).cast(), quantized);
            }

            for lane in 0..4
            {
                for pos in 0..8
                {
                    dest[pos * 8 + base + lane] = stage[pos * 4 + lane] as i16;
                }
            }
        }
    }
}

#[cfg(all(feature = "neon", target_arch = "aarch64"))]
mod neon
{
    //! NEON forward DCT, see the SSE4.1 variant for the layout.

    use core::arch::aarch64::*;

    use super::{C1, C2, C3, C5, C6, C7};

    pub fn fdct_neon(dest: &mut [i16; 64], data: &[i16; 64], qtable: &[i16; 64])
    {
        unsafe {
            fdct_neon_impl(dest, data, qtable);
        }
    }

    #[inline(always)]
    unsafe fn trunc16(v: int32x4_t) -> int32x4_t
    {
        vshrq_n_s32::<16>(vshlq_n_s32::<16>(v))
    }

    #[inline(always)]
    unsafe fn butterfly(d: [int32x4_t; 8]) -> [int32x4_t; 8]
    {
        let x8 = vaddq_s32(d[0], d[7]);
        let x0 = vsubq_s32(d[0], d[7]);
        let x7 = vaddq_s32(d[1], d[6]);
        let x1 = vsubq_s32(d[1], d[6]);
        let x6 = vaddq_s32(d[2], d[5]);
        let x2 = vsubq_s32(d[2], d[5]);
        let x5 = vaddq_s32(d[3], d[4]);
        let x3 = vsubq_s32(d[3], d[4]);

        let x4 = vaddq_s32(x8, x5);
        let x8 = vsubq_s32(x8, x5);
        let x5 = vaddq_s32(x7, x6);
        let x7 = vsubq_s32(x7, x6);

        [
            vaddq_s32(x4, x5),
            vaddq_s32(
                vaddq_s32(vmulq_n_s32(x0, C1), vmulq_n_s32(x1, C3)),
                vaddq_s32(vmulq_n_s32(x2, C5), vmulq_n_s32(x3, C7)),
            ),
            vaddq_s32(vmulq_n_s32(x8, C2), vmulq_n_s32(x7, C6)),
            vsubq_s32(
                vsubq_s32(vmulq_n_s32(x0, C3), vmulq_n_s32(x1, C7)),
                vaddq_s32(vmulq_n_s32(x2, C1), vmulq_n_s32(x3, C5)),
            ),
            vsubq_s32(x4, x5),
            vaddq_s32(
                vsubq_s32(vmulq_n_s32(x0, C5), vmulq_n_s32(x1, C1)),
                vaddq_s32(vmulq_n_s32(x2, C7), vmulq_n_s32(x3, C3)),
            ),
            vsubq_s32(vmulq_n_s32(x8, C6), vmulq_n_s32(x7, C2)),
            vsubq_s32(
                vaddq_s32(
                    vsubq_s32(vmulq_n_s32(x0, C7), vmulq_n_s32(x1, C5)),
                    vmulq_n_s32(x2, C3),
                ),
                vmulq_n_s32(x3, C1),
            ),
        ]
    }

    unsafe fn fdct_neon_impl(dest: &mut [i16; 64], data: &[i16; 64], qtable: &[i16; 64])
    {
        let mut cols = [0_i32; 64];
        for r in 0..8
        {
            for j in 0..8
            {
                cols[j * 8 + r] = i32::from(data[r * 8 + j]);
            }
        }

        let mut temp = [0_i32; 64];
        let mut stage = [0_i32; 32];

        for base in [0_usize, 4]
        {
            let mut d = [vdupq_n_s32(0); 8];
            for (j, v) in d.iter_mut().enumerate()
            {
                *v = vld1q_s32(cols.as_ptr().add(j * 8 + base));
            }

            let out = butterfly(d);

            for (pos, v) in out.iter().enumerate()
            {
                let value = if pos == 0 || pos == 4
                {
                    trunc16(*v)
                }
                else
                {
                    trunc16(vshrq_n_s32::<10>(*v))
                };
                vst1q_s32(stage.as_mut_ptr().add(pos * 4), value);
            }

            for lane in 0..4
            {
                for pos in 0..8
                {
                    temp[(base + lane) * 8 + pos] = stage[pos * 4 + lane];
                }
            }
        }

        for base in [0_usize, 4]
        {
            let mut d = [vdupq_n_s32(0); 8];
            for (k, v) in d.iter_mut().enumerate()
            {
                *v = vld1q_s32(temp.as_ptr().add(k * 8 + base));
            }

            let out = butterfly(d);
            let round = vdupq_n_s32(0x4000);

            for (pos, v) in out.iter().enumerate()
            {
                let value = if pos == 0 || pos == 4
                {
                    vshrq_n_s32::<3>(*v)
                }
                else
                {
                    vshrq_n_s32::<13>(*v)
                };

                let q16 = vld1_s16(qtable.as_ptr().add(pos * 8 + base));
                let q = vmovl_s16(q16);

                let quantized = vshrq_n_s32::<15>(vaddq_s32(vmulq_s32(value, q), round));
                vst1q_s32(stage.as_mut_ptr().add(pos * 4), quantized);
            }

            for lane in 0..4
            {
                for pos in 0..8
                {
                    dest[pos * 8 + base + lane] = stage[pos * 4 + lane] as i16;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::fdct_scalar;

    // reciprocal table for quantizer 1 everywhere
    const UNIT_Q: [i16; 64] = [0x7FFF_i16; 64];

    #[test]
    fn flat_block_has_dc_only()
    {
        // a level-shifted flat block: every sample zero
        let data = [0_i16; 64];
        let mut dest = [0_i16; 64];

        fdct_scalar(&mut dest, &data, &UNIT_Q);
        assert_eq!(dest, [0; 64]);
    }

    #[test]
    fn uniform_offset_lands_in_dc()
    {
        let data = [10_i16; 64];
        let mut dest = [0_i16; 64];

        fdct_scalar(&mut dest, &data, &UNIT_Q);

        // DC carries the (scaled) mean, every AC coefficient is zero
        assert!(dest[0] > 0);
        assert!(dest[1..].iter().all(|&v| v == 0));
    }

    #[cfg(all(feature = "x86", any(target_arch = "x86", target_arch = "x86_64")))]
    #[test]
    fn sse41_matches_scalar()
    {
        if !is_x86_feature_detected!("sse4.1")
        {
            return;
        }

        let mut data = [0_i16; 64];
        for (i, d) in data.iter_mut().enumerate()
        {
            *d = ((i as i16 * 37) % 256) - 128;
        }

        let mut qtable = [0_i16; 64];
        for (i, q) in qtable.iter_mut().enumerate()
        {
            *q = (0x8000_i32 / (2 + (i as i32 % 13))) as i16;
        }

        let mut scalar = [0_i16; 64];
        let mut simd = [0_i16; 64];
        fdct_scalar(&mut scalar, &data, &qtable);
        super::sse41::fdct_sse41(&mut simd, &data, &qtable);

        assert_eq!(scalar, simd);
    }
}
