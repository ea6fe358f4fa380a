//! Spectral transform service for the block convolution path.
//!
//! Spectra are kept at the full transform length as conjugate symmetric
//! arrays, the natural output of transforming a real signal. The forward
//! and inverse directions are backed by [`realfft`] plans working on the
//! packed `n/2 + 1` representation; the full array is reconstructed from,
//! or reduced to, that packed half around the plan calls. The inverse is
//! unnormalized: callers divide by the transform length.

use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::num_traits::Zero;
use realfft::{ComplexToReal, FftError, RealFftPlanner, RealToComplex};

/// Multiply two conjugate symmetric spectra into `product`.
///
/// Only the first `n/2 + 1` complex products are computed directly; the
/// upper half follows from `product[n - i] = conj(product[i])`, which holds
/// whenever both inputs carry that symmetry. All three slices must have the
/// same, even length.
pub fn spectral_mul(a: &[Complex<f32>], b: &[Complex<f32>], product: &mut [Complex<f32>]) {
    let n = product.len();
    let half = n / 2;

    debug_assert_eq!(a.len(), n);
    debug_assert_eq!(b.len(), n);
    debug_assert!(n > 0 && n % 2 == 0);

    for i in 0..=half {
        product[i] = a[i] * b[i];
    }
    for i in 1..half {
        product[half + i] = product[half - i].conj();
    }
}

/// Fixed-size forward/inverse transform pair with its scratch buffers.
pub(crate) struct Transform {
    len: usize,
    rfft: Arc<dyn RealToComplex<f32>>,
    ifft: Arc<dyn ComplexToReal<f32>>,
    rfft_scratch: Vec<Complex<f32>>,
    ifft_scratch: Vec<Complex<f32>>,
    real: Box<[f32]>,
    packed: Box<[Complex<f32>]>,
}

impl Transform {
    pub(crate) fn new(len: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let rfft = planner.plan_fft_forward(len);
        let ifft = planner.plan_fft_inverse(len);

        let rfft_scratch = rfft.make_scratch_vec();
        let ifft_scratch = ifft.make_scratch_vec();

        Transform {
            len,
            rfft,
            ifft,
            rfft_scratch,
            ifft_scratch,
            real: vec![0.0; len].into_boxed_slice(),
            packed: vec![Complex::zero(); len / 2 + 1].into_boxed_slice(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Transform `time` into a full-length conjugate symmetric spectrum.
    pub(crate) fn forward(
        &mut self,
        time: &[f32],
        spectrum: &mut [Complex<f32>],
    ) -> Result<(), FftError> {
        let half = self.len / 2;

        self.real.copy_from_slice(time);
        self.rfft.process_with_scratch(
            &mut self.real,
            &mut self.packed,
            &mut self.rfft_scratch,
        )?;

        spectrum[..=half].copy_from_slice(&self.packed);
        for i in 1..half {
            spectrum[half + i] = spectrum[half - i].conj();
        }

        Ok(())
    }

    /// Inverse transform of a conjugate symmetric spectrum, unnormalized.
    ///
    /// Only the packed lower half of `spectrum` is consumed. The DC and
    /// Nyquist bins are treated as purely real; rounding residue in their
    /// imaginary parts is discarded.
    pub(crate) fn inverse(
        &mut self,
        spectrum: &[Complex<f32>],
        time: &mut [f32],
    ) -> Result<(), FftError> {
        let half = self.len / 2;

        self.packed.copy_from_slice(&spectrum[..=half]);
        self.packed[0].im = 0.0;
        self.packed[half].im = 0.0;

        self.ifft
            .process_with_scratch(&mut self.packed, time, &mut self.ifft_scratch)
    }
}
