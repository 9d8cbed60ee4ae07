//! NEON IDCT, see the SSE4.1 variant for the lane layout.
//!
//! Identical 32 bit arithmetic to the scalar kernel, four transforms
//! per vector.

#![cfg(target_arch = "aarch64")]

use core::arch::aarch64::*;

/// Safe wrapper; NEON is baseline on aarch64.
pub fn idct_neon(dest: &mut [u8; 64], data: &[i16], qt: &[i16; 64])
{
    unsafe {
        idct_neon_impl(dest, data, qt);
    }
}

#[inline(always)]
unsafe fn kernel4(s: [int32x4_t; 8]) -> ([int32x4_t; 4], [int32x4_t; 4])
{
    // even part
    let n0 = vmulq_n_s32(vaddq_s32(s[2], s[6]), 2217);
    let t2 = vaddq_s32(n0, vmulq_n_s32(s[6], -7567));
    let t3 = vaddq_s32(n0, vmulq_n_s32(s[2], 3135));
    let t0 = vshlq_n_s32(vaddq_s32(s[0], s[4]), 12);
    let t1 = vshlq_n_s32(vsubq_s32(s[0], s[4]), 12);

    let x = [
        vaddq_s32(t0, t3),
        vaddq_s32(t1, t2),
        vsubq_s32(t1, t2),
        vsubq_s32(t0, t3),
    ];

    // odd part
    let p1 = vaddq_s32(s[7], s[1]);
    let p2 = vaddq_s32(s[5], s[3]);
    let p3 = vaddq_s32(s[7], s[3]);
    let p4 = vaddq_s32(s[5], s[1]);
    let p5 = vmulq_n_s32(vaddq_s32(p3, p4), 4816);

    let p1 = vaddq_s32(vmulq_n_s32(p1, -3685), p5);
    let p2 = vaddq_s32(vmulq_n_s32(p2, -10497), p5);
    let p3 = vmulq_n_s32(p3, -8034);
    let p4 = vmulq_n_s32(p4, -1597);

    let y = [
        vaddq_s32(vaddq_s32(p1, p3), vmulq_n_s32(s[7], 1223)),
        vaddq_s32(vaddq_s32(p2, p4), vmulq_n_s32(s[5], 8410)),
        vaddq_s32(vaddq_s32(p2, p3), vmulq_n_s32(s[3], 12586)),
        vaddq_s32(vaddq_s32(p1, p4), vmulq_n_s32(s[1], 6149)),
    ];

    (x, y)
}

#[inline(always)]
unsafe fn butterfly<const SHIFT: i32>(
    x: [int32x4_t; 4], y: [int32x4_t; 4], bias: i32,
) -> [int32x4_t; 8]
{
    let b = vdupq_n_s32(bias);
    let x = [
        vaddq_s32(x[0], b),
        vaddq_s32(x[1], b),
        vaddq_s32(x[2], b),
        vaddq_s32(x[3], b),
    ];

    [
        vshrq_n_s32::<SHIFT>(vaddq_s32(x[0], y[3])),
        vshrq_n_s32::<SHIFT>(vaddq_s32(x[1], y[2])),
        vshrq_n_s32::<SHIFT>(vaddq_s32(x[2], y[1])),
        vshrq_n_s32::<SHIFT>(vaddq_s32(x[3], y[0])),
        vshrq_n_s32::<SHIFT>(vsubq_s32(x[3], y[0])),
        vshrq_n_s32::<SHIFT>(vsubq_s32(x[2], y[1])),
        vshrq_n_s32::<SHIFT>(vsubq_s32(x[1], y[2])),
        vshrq_n_s32::<SHIFT>(vsubq_s32(x[0], y[3])),
    ]
}

unsafe fn idct_neon_impl(dest: &mut [u8; 64], data: &[i16], qt: &[i16; 64])
{
    let mut dq = [0_i32; 64];
    for i in 0..64
    {
        dq[i] = i32::from(data[i]) * i32::from(qt[i]);
    }

    let mut pass1 = [0_i32; 64];
    let mut stage = [0_i32; 32];

    for base in [0_usize, 4]
    {
        let mut s = [vdupq_n_s32(0); 8];
        for (k, v) in s.iter_mut().enumerate()
        {
            *v = vld1q_s32(dq.as_ptr().add(8 * k + base));
        }

        let (x, y) = kernel4(s);
        let out = butterfly::<10>(x, y, 0x200);

        for (j, v) in out.iter().enumerate()
        {
            vst1q_s32(stage.as_mut_ptr().add(j * 4), *v);
        }
        for c in 0..4
        {
            for j in 0..8
            {
                pass1[(base + c) * 8 + j] = stage[j * 4 + c];
            }
        }
    }

    let bias = 0x10000 + (128 << 17);

    for base in [0_usize, 4]
    {
        let mut s = [vdupq_n_s32(0); 8];
        for (k, v) in s.iter_mut().enumerate()
        {
            *v = vld1q_s32(pass1.as_ptr().add(8 * k + base));
        }

        let (x, y) = kernel4(s);
        let out = butterfly::<17>(x, y, bias);

        for (j, v) in out.iter().enumerate()
        {
            vst1q_s32(stage.as_mut_ptr().add(j * 4), *v);
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
