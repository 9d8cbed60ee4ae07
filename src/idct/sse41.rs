//! SSE4.1 IDCT.
//!
//! Four 1-D transforms run per vector (one lane each), so the math is
//! the exact 32 bit sequence of the scalar kernel and the outputs are
//! bit identical. The all-zero-AC shortcut of the scalar path is not
//! needed here: on a zero-AC column the full kernel computes the same
//! replicated DC value.

#![cfg(any(target_arch = "x86", target_arch = "x86_64"))]

#[cfg(target_arch = "x86")]
use core::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use core::arch::x86_64::*;

/// Safe wrapper; the caller checked `sse4.1` is available.
pub fn idct_sse41(dest: &mut [u8; 64], data: &[i16], qt: &[i16; 64])
{
    unsafe {
        idct_sse41_impl(dest, data, qt);
    }
}

/// The 8 point kernel on 4 lanes. Mirrors `crate::idct::kernel`.
#[inline(always)]
unsafe fn kernel4(s: [__m128i; 8]) -> ([__m128i; 4], [__m128i; 4])
{
    let mul = |v, c| _mm_mullo_epi32(v, _mm_set1_epi32(c));

    // even part
    let n0 = mul(_mm_add_epi32(s[2], s[6]), 2217);
    let t2 = _mm_add_epi32(n0, mul(s[6], -7567));
    let t3 = _mm_add_epi32(n0, mul(s[2], 3135));
    let t0 = _mm_slli_epi32(_mm_add_epi32(s[0], s[4]), 12);
    let t1 = _mm_slli_epi32(_mm_sub_epi32(s[0], s[4]), 12);

    let x = [
        _mm_add_epi32(t0, t3),
        _mm_add_epi32(t1, t2),
        _mm_sub_epi32(t1, t2),
        _mm_sub_epi32(t0, t3),
    ];

    // odd part
    let p1 = _mm_add_epi32(s[7], s[1]);
    let p2 = _mm_add_epi32(s[5], s[3]);
    let p3 = _mm_add_epi32(s[7], s[3]);
    let p4 = _mm_add_epi32(s[5], s[1]);
    let p5 = mul(_mm_add_epi32(p3, p4), 4816);

    let p1 = _mm_add_epi32(mul(p1, -3685), p5);
    let p2 = _mm_add_epi32(mul(p2, -10497), p5);
    let p3 = mul(p3, -8034);
    let p4 = mul(p4, -1597);

    let y = [
        _mm_add_epi32(_mm_add_epi32(p1, p3), mul(s[7], 1223)),
        _mm_add_epi32(_mm_add_epi32(p2, p4), mul(s[5], 8410)),
        _mm_add_epi32(_mm_add_epi32(p2, p3), mul(s[3], 12586)),
        _mm_add_epi32(_mm_add_epi32(p1, p4), mul(s[1], 6149)),
    ];

    (x, y)
}

#[inline(always)]
unsafe fn butterfly_shift(x: [__m128i; 4], y: [__m128i; 4], bias: i32, shift: i32)
    -> [__m128i; 8]
{
    let b = _mm_set1_epi32(bias);
    let x = [
        _mm_add_epi32(x[0], b),
        _mm_add_epi32(x[1], b),
        _mm_add_epi32(x[2], b),
        _mm_add_epi32(x[3], b),
    ];

    macro_rules! sra {
        ($v:expr) => {
            match shift
            {
                10 => _mm_srai_epi32::<10>($v),
                _ => _mm_srai_epi32::<17>($v),
            }
        };
    }

    [
        sra!(_mm_add_epi32(x[0], y[3])),
        sra!(_mm_add_epi32(x[1], y[2])),
        sra!(_mm_add_epi32(x[2], y[1])),
        sra!(_mm_add_epi32(x[3], y[0])),
        sra!(_mm_sub_epi32(x[3], y[0])),
        sra!(_mm_sub_epi32(x[2], y[1])),
        sra!(_mm_sub_epi32(x[1], y[2])),
        sra!(_mm_sub_epi32(x[0], y[3])),
    ]
}

#[target_feature(enable = "sse4.1")]
unsafe fn idct_sse41_impl(dest: &mut [u8; 64], data: &[i16], qt: &[i16; 64])
{
    // dequantize up front
    let mut dq = [0_i32; 64];
    for i in 0..64
    {
        dq[i] = i32::from(data[i]) * i32::from(qt[i]);
    }

    // first pass: columns, stored transposed like the scalar path
    let mut pass1 = [0_i32; 64];
    let mut stage = [0_i32; 32];

    for base in [0_usize, 4]
    {
        let mut s = [_mm_setzero_si128(); 8];
        for (k, v) in s.iter_mut().enumerate()
        {
            *v = _mm_loadu_si128(dq.as_ptr().add(8 * k + base).cast());
        }

        let (x, y) = kernel4(s);
        let out = butterfly_shift(x, y, 0x200, 10);

        for (j, v) in out.iter().enumerate()
        {
            _mm_storeu_si128(stage.as_mut_ptr().add(j * 4).cast(), *v);
        }
        for c in 0..4
        {
            for j in 0..8
            {
                pass1[(base + c) * 8 + j] = stage[j * 4 + c];
            }
        }
    }

    // second pass: rows of the transposed intermediate
    let shift = 17;
    let bias = 0x10000 + (128 << shift);

    for base in [0_usize, 4]
    {
        let mut s = [_mm_setzero_si128(); 8];
        for (k, v) in s.iter_mut().enumerate()
        {
            *v = _mm_loadu_si128(pass1.as_ptr().add(8 * k + base).cast());
        }

        let (x, y) = kernel4(s);
        let out = butterfly_shift(x, y, bias, shift);

        for (j, v) in out.iter().enumerate()
        {
            _mm_storeu_si128(stage.as_mut_ptr().add(j * 4).cast(), *v);
        }
        for c in 0..4
        {
            for j in 0..8
            {
                dest[(base + c) * 8 + j] = stage[j * 4 + c].clamp(0, 255) as u8;
            }
        }
    }
}
