//! Dot-product kernels for the time-domain convolution path.
//!
//! The per-sample renderer spends nearly all of its time multiplying the
//! input history against an impulse response, so that product comes in a
//! few flavors: a plain scalar reference, manually stretched loops, a
//! portable SIMD version on top of the `wide` crate and an AVX2 version
//! picked at runtime. All of them compute the same sum and must agree
//! within floating point rounding.
//!
//! When the operand lengths differ the product runs over the shorter one.

use wide::f32x8;

/// Scalar reference implementation.
pub fn dot_ref(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    a[..len].iter().zip(&b[..len]).map(|(x, y)| x * y).sum()
}

/// First sixteen products, fully unrolled.
#[inline]
fn dot_unrolled16(a: &[f32], b: &[f32]) -> f32 {
    a[0] * b[0]
        + a[1] * b[1]
        + a[2] * b[2]
        + a[3] * b[3]
        + a[4] * b[4]
        + a[5] * b[5]
        + a[6] * b[6]
        + a[7] * b[7]
        + a[8] * b[8]
        + a[9] * b[9]
        + a[10] * b[10]
        + a[11] * b[11]
        + a[12] * b[12]
        + a[13] * b[13]
        + a[14] * b[14]
        + a[15] * b[15]
}

/// Fully unrolled product of two 128-element arrays, the common filter
/// length of the compact KEMAR set.
pub fn dot_unrolled128(a: &[f32], b: &[f32]) -> f32 {
    assert!(a.len() >= 128 && b.len() >= 128);

    (0..8)
        .map(|block| dot_unrolled16(&a[block * 16..], &b[block * 16..]))
        .sum()
}

/// Scalar loop stretched eight products per iteration.
pub fn dot_8stretched(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    let mut a = &a[..len];
    let mut b = &b[..len];
    let mut sum = 0.0;

    while a.len() >= 8 {
        sum += a[0] * b[0]
            + a[1] * b[1]
            + a[2] * b[2]
            + a[3] * b[3]
            + a[4] * b[4]
            + a[5] * b[5]
            + a[6] * b[6]
            + a[7] * b[7];
        a = &a[8..];
        b = &b[8..];
    }
    for (x, y) in a.iter().zip(b) {
        sum += x * y;
    }
    sum
}

/// Mixed float by 16-bit filter product, stretched eight per iteration.
///
/// The steady state render path feeds float input history against the raw
/// integer impulse responses, saving a filter-sized conversion per sample.
pub fn dot_i16_8stretched(a: &[f32], b: &[i16]) -> f32 {
    let len = a.len().min(b.len());
    let mut a = &a[..len];
    let mut b = &b[..len];
    let mut sum = 0.0;

    while a.len() >= 8 {
        sum += a[0] * b[0] as f32
            + a[1] * b[1] as f32
            + a[2] * b[2] as f32
            + a[3] * b[3] as f32
            + a[4] * b[4] as f32
            + a[5] * b[5] as f32
            + a[6] * b[6] as f32
            + a[7] * b[7] as f32;
        a = &a[8..];
        b = &b[8..];
    }
    for (x, y) in a.iter().zip(b) {
        sum += x * *y as f32;
    }
    sum
}

/// Portable SIMD product using `wide`.
pub fn dot_wide(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    let mut a = &a[..len];
    let mut b = &b[..len];

    let mut acc = f32x8::ZERO;
    while a.len() >= 8 {
        let va = f32x8::from([a[0], a[1], a[2], a[3], a[4], a[5], a[6], a[7]]);
        let vb = f32x8::from([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
        acc = va.mul_add(vb, acc);
        a = &a[8..];
        b = &b[8..];
    }

    let mut sum = acc.reduce_add();
    for (x, y) in a.iter().zip(b) {
        sum += x * y;
    }
    sum
}

/// AVX2 product with two accumulators to hide instruction latency.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[target_feature(enable = "avx2")]
pub unsafe fn dot_avx2(a: &[f32], b: &[f32]) -> f32 {
    #[cfg(target_arch = "x86")]
    use std::arch::x86::*;
    #[cfg(target_arch = "x86_64")]
    use std::arch::x86_64::*;

    let len = a.len().min(b.len());
    let mut a = &a[..len];
    let mut b = &b[..len];

    let mut v1 = _mm256_setzero_ps();
    let mut v2 = _mm256_setzero_ps();

    while a.len() >= 16 {
        let a1 = _mm256_loadu_ps(a.as_ptr());
        let a2 = _mm256_loadu_ps(a[8..].as_ptr());
        let b1 = _mm256_loadu_ps(b.as_ptr());
        let b2 = _mm256_loadu_ps(b[8..].as_ptr());
        v1 = _mm256_add_ps(v1, _mm256_mul_ps(a1, b1));
        v2 = _mm256_add_ps(v2, _mm256_mul_ps(a2, b2));
        a = &a[16..];
        b = &b[16..];
    }
    v1 = _mm256_add_ps(v1, v2);

    let mut lanes = [0.0f32; 8];
    _mm256_storeu_ps(lanes.as_mut_ptr(), v1);
    let mut sum = lanes.iter().sum::<f32>();

    for (x, y) in a.iter().zip(b) {
        sum += x * y;
    }
    sum
}

/// Mixed float by 16-bit AVX2 product; the filter lanes are widened to
/// float on the fly.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[target_feature(enable = "avx2")]
pub unsafe fn dot_i16_avx2(a: &[f32], b: &[i16]) -> f32 {
    #[cfg(target_arch = "x86")]
    use std::arch::x86::*;
    #[cfg(target_arch = "x86_64")]
    use std::arch::x86_64::*;

    let len = a.len().min(b.len());
    let mut a = &a[..len];
    let mut b = &b[..len];

    let mut acc = _mm256_setzero_ps();
    while a.len() >= 8 {
        let va = _mm256_loadu_ps(a.as_ptr());
        let raw = _mm_loadu_si128(b.as_ptr() as *const _);
        let vb = _mm256_cvtepi32_ps(_mm256_cvtepi16_epi32(raw));
        acc = _mm256_add_ps(acc, _mm256_mul_ps(va, vb));
        a = &a[8..];
        b = &b[8..];
    }

    let mut lanes = [0.0f32; 8];
    _mm256_storeu_ps(lanes.as_mut_ptr(), acc);
    let mut sum = lanes.iter().sum::<f32>();

    for (x, y) in a.iter().zip(b) {
        sum += x * *y as f32;
    }
    sum
}

/// Runtime-selected dot-product backend.
///
/// Detection happens once at construction; the render path then dispatches
/// without further checks.
#[derive(Clone, Copy, Debug)]
pub struct DotKernel {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    use_avx2: bool,
}

impl DotKernel {
    /// Probe the CPU and pick the fastest available backend.
    pub fn detect() -> Self {
        DotKernel {
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            use_avx2: std::is_x86_feature_detected!("avx2"),
        }
    }

    /// A kernel pinned to the portable backends, for comparison tests.
    pub fn portable() -> Self {
        DotKernel {
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            use_avx2: false,
        }
    }

    /// Float by float dot product.
    #[inline]
    pub fn dot(&self, a: &[f32], b: &[f32]) -> f32 {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        if self.use_avx2 {
            return unsafe { dot_avx2(a, b) };
        }
        if a.len().min(b.len()) == 128 {
            return dot_unrolled128(a, b);
        }
        dot_wide(a, b)
    }

    /// Float by 16-bit dot product.
    #[inline]
    pub fn dot_i16(&self, a: &[f32], b: &[i16]) -> f32 {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        if self.use_avx2 {
            return unsafe { dot_i16_avx2(a, b) };
        }
        dot_i16_8stretched(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn random_operands(len: usize) -> (Vec<f32>, Vec<f32>, Vec<i16>) {
        let mut rng = rand::thread_rng();
        let a = (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let b: Vec<f32> = (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let s = (0..len).map(|_| rng.gen_range(-512i16..512)).collect();
        (a, b, s)
    }

    fn assert_close(got: f32, want: f32) {
        let tol = 1e-3f32.max(want.abs() * 1e-3);
        assert!(
            (got - want).abs() <= tol,
            "got {got}, want {want} (tol {tol})"
        );
    }

    #[test]
    fn variants_match_reference() {
        for len in 0..300 {
            let (a, b, s) = random_operands(len);
            let want = dot_ref(&a, &b);

            assert_close(dot_8stretched(&a, &b), want);
            assert_close(dot_wide(&a, &b), want);

            let want_i16: f32 = a
                .iter()
                .zip(&s)
                .map(|(x, y)| x * *y as f32)
                .sum();
            assert_close(dot_i16_8stretched(&a, &s), want_i16);

            let kernel = DotKernel::detect();
            assert_close(kernel.dot(&a, &b), want);
            assert_close(kernel.dot_i16(&a, &s), want_i16);

            let portable = DotKernel::portable();
            assert_close(portable.dot(&a, &b), want);
            assert_close(portable.dot_i16(&a, &s), want_i16);
        }
    }

    #[test]
    fn unrolled128_matches_reference() {
        let (a, b, _) = random_operands(128);
        assert_close(dot_unrolled128(&a, &b), dot_ref(&a, &b));
    }

    #[test]
    fn unrolled128_consumes_first_128_of_longer_slices() {
        for len in [129, 200, 300] {
            let (a, b, _) = random_operands(len);
            let want = dot_ref(&a[..128], &b[..128]);

            assert_close(dot_unrolled128(&a, &b), want);

            // The portable kernel takes this path when the shorter operand
            // is exactly one filter long.
            let portable = DotKernel::portable();
            assert_close(portable.dot(&a[..128], &b), want);
            assert_close(portable.dot(&a, &b[..128]), want);
        }
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    #[test]
    fn avx2_matches_reference() {
        if !std::is_x86_feature_detected!("avx2") {
            return;
        }

        for len in 0..300 {
            let (a, b, s) = random_operands(len);
            assert_close(unsafe { dot_avx2(&a, &b) }, dot_ref(&a, &b));

            let want_i16: f32 = a
                .iter()
                .zip(&s)
                .map(|(x, y)| x * *y as f32)
                .sum();
            assert_close(unsafe { dot_i16_avx2(&a, &s) }, want_i16);
        }
    }

    #[test]
    fn unequal_lengths_use_shorter() {
        let (a, b, s) = random_operands(50);
        let want = dot_ref(&a[..20], &b[..20]);
        assert_close(dot_8stretched(&a[..20], &b), want);
        assert_close(dot_wide(&a, &b[..20]), want);

        let want_i16: f32 = a[..20]
            .iter()
            .zip(&s[..20])
            .map(|(x, y)| x * *y as f32)
            .sum();
        assert_close(dot_i16_8stretched(&a[..20], &s), want_i16);
    }
}
