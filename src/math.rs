/// Compute the dot product between two vectors.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            // SAFETY: AVX2 support was checked at runtime just above.
            return unsafe { x86::dot_avx2(a, b) };
        }
    }

    dot_scalar(a, b)
}

/// Compute the squared L2 norm of a vector.
#[inline]
pub fn l2_norm_sqr(v: &[f32]) -> f32 {
    dot(v, v)
}

/// Compute the squared Euclidean distance between two vectors.
#[inline]
pub fn l2_distance_sqr(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            // SAFETY: AVX2 support was checked at runtime just above.
            return unsafe { x86::l2_distance_sqr_avx2(a, b) };
        }
    }

    l2_distance_sqr_scalar(a, b)
}

/// Multiply every element of `v` by `factor` in place.
#[inline]
pub fn scale(v: &mut [f32], factor: f32) {
    for value in v.iter_mut() {
        *value *= factor;
    }
}

#[inline]
fn dot_scalar(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[inline]
fn l2_distance_sqr_scalar(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

#[cfg(target_arch = "x86_64")]
use std::arch::is_x86_feature_detected;

#[cfg(target_arch = "x86_64")]
mod x86 {
    use core::arch::x86_64::*;

    #[inline]
    unsafe fn horizontal_sum(acc: __m256) -> f32 {
        let mut buf = [0f32; 8];
        _mm256_storeu_ps(buf.as_mut_ptr(), acc);
        buf.iter().copied().sum()
    }

    #[inline]
    #[target_feature(enable = "avx2")]
    pub unsafe fn dot_avx2(a: &[f32], b: &[f32]) -> f32 {
        let len = a.len().min(b.len());
        let chunks = len / 8;
        let a_ptr = a.as_ptr();
        let b_ptr = b.as_ptr();
        let mut acc = _mm256_setzero_ps();

        for chunk in 0..chunks {
            let offset = chunk * 8;
            let va = _mm256_loadu_ps(a_ptr.add(offset));
            let vb = _mm256_loadu_ps(b_ptr.add(offset));
            acc = _mm256_add_ps(acc, _mm256_mul_ps(va, vb));
        }

        let mut sum = horizontal_sum(acc);
        for i in chunks * 8..len {
            sum += *a_ptr.add(i) * *b_ptr.add(i);
        }
        sum
    }

    #[inline]
    #[target_feature(enable = "avx2")]
    pub unsafe fn l2_distance_sqr_avx2(a: &[f32], b: &[f32]) -> f32 {
        let len = a.len().min(b.len());
        let chunks = len / 8;
        let a_ptr = a.as_ptr();
        let b_ptr = b.as_ptr();
        let mut acc = _mm256_setzero_ps();

        for chunk in 0..chunks {
            let offset = chunk * 8;
            let va = _mm256_loadu_ps(a_ptr.add(offset));
            let vb = _mm256_loadu_ps(b_ptr.add(offset));
            let diff = _mm256_sub_ps(va, vb);
            acc = _mm256_add_ps(acc, _mm256_mul_ps(diff, diff));
        }

        let mut sum = horizontal_sum(acc);
        for i in chunks * 8..len {
            let diff = *a_ptr.add(i) - *b_ptr.add(i);
            sum += diff * diff;
        }
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simd_dot_matches_scalar_on_odd_lengths() {
        let a: Vec<f32> = (0..19).map(|i| i as f32 * 0.25 - 2.0).collect();
        let b: Vec<f32> = (0..19).map(|i| 1.5 - i as f32 * 0.125).collect();
        assert!((dot(&a, &b) - dot_scalar(&a, &b)).abs() < 1e-4);
        assert!((l2_distance_sqr(&a, &b) - l2_distance_sqr_scalar(&a, &b)).abs() < 1e-3);
    }

    #[test]
    fn scale_multiplies_in_place() {
        let mut v = vec![2.0f32, -4.0, 0.5];
        scale(&mut v, 0.5);
        assert_eq!(v, vec![1.0, -2.0, 0.25]);
    }
}
