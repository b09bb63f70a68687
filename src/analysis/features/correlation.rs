// Correlation module - autocorrelation through two real FFT passes
//
// The frame is zero padded to twice its length, transformed, converted to a
// power spectrum and transformed a second time. Since the power spectrum is
// real and symmetric, the second forward transform equals the inverse
// transform up to normalization. The forward spectrum of the first pass is
// handed out as a by-product so harmonic extraction does not need its own
// FFT.

use std::sync::Mutex;

use super::fft::RealFft;
use super::window::{get_window, WindowingFunction};
use crate::error::AnalysisError;

/// Autocorrelation of frames with a fixed size
#[derive(Debug, Clone)]
pub struct Correlation {
    size: usize,
    window_type: WindowingFunction,
    fft: RealFft,
    window: Vec<f32>,
    scratch: Vec<f32>,
}

impl Correlation {
    /// Create a correlation engine for frames of `size` samples
    ///
    /// Fails with `AnalysisError::InvalidFftSize` if `size` is not a power
    /// of two.
    pub fn new(size: usize, window_type: WindowingFunction) -> Result<Self, AnalysisError> {
        if size == 0 || !size.is_power_of_two() {
            return Err(AnalysisError::InvalidFftSize { size });
        }
        let fft = RealFft::new(2 * size, window_type)?;
        Ok(Self {
            size,
            window_type,
            fft,
            window: get_window(window_type, size),
            scratch: vec![0.0; 2 * size + 2],
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn window_type(&self) -> WindowingFunction {
        self.window_type
    }

    /// Compute the autocorrelation of `input`
    ///
    /// # Arguments
    /// * `input` - Frame of `size` samples
    /// * `output` - Receives `size + 1` correlation values, lag 0 first
    /// * `disable_window` - Skip windowing even if a window was configured
    /// * `spectrum` - Optional buffer of `2 * size + 2` floats receiving the
    ///   forward spectrum of the zero padded frame
    ///
    /// # Panics
    /// Panics if a buffer size does not fit the correlation size
    pub fn correlate(
        &mut self,
        input: &[f32],
        output: &mut [f32],
        disable_window: bool,
        spectrum: Option<&mut [f32]>,
    ) {
        let size = self.size;
        assert_eq!(input.len(), size, "correlation input is of invalid size");
        assert_eq!(output.len(), size + 1, "correlation output must be of size input size + 1");

        let apply_window = !disable_window && self.window_type != WindowingFunction::Tophat;
        self.copy_in_zero_padded(input, apply_window);
        self.fft.transform_bit_reversed(&mut self.scratch);

        if let Some(spectrum) = spectrum {
            assert_eq!(
                spectrum.len(),
                2 * size + 2,
                "spectrum output must be of size 2 * input size + 2"
            );
            spectrum.copy_from_slice(&self.scratch);
        }

        let scratch = &mut self.scratch;

        // power spectrum, computed in place (index i only reads 2i and 2i + 1)
        let nyquist = scratch[2 * size];
        for i in 0..size {
            let re = scratch[2 * i];
            let im = scratch[2 * i + 1];
            scratch[i] = re * re + im * im;
        }
        scratch[size] = nyquist * nyquist;

        // restore the symmetric full spectrum
        for i in 1..size {
            scratch[size + i] = scratch[size - i];
        }
        scratch[2 * size] = 0.0;
        scratch[2 * size + 1] = 0.0;

        for (i, &reversed) in self.fft.bit_reverse_table().iter().enumerate() {
            if i > reversed {
                scratch.swap(2 * i, 2 * reversed);
                scratch.swap(2 * i + 1, 2 * reversed + 1);
            }
        }
        self.fft.transform_bit_reversed(scratch);

        let normalization = 1.0 / (2 * size) as f32;
        for (i, value) in output.iter_mut().enumerate() {
            *value = scratch[2 * i] * normalization;
        }
    }

    fn copy_in_zero_padded(&mut self, input: &[f32], apply_window: bool) {
        let size = self.size;
        let window = &self.window;
        let sample = |j: usize| -> f32 {
            if j >= size {
                0.0
            } else if apply_window {
                window[j] * input[j]
            } else {
                input[j]
            }
        };

        for (i, &reversed) in self.fft.bit_reverse_table().iter().enumerate() {
            let i2 = 2 * i;
            let ir2 = 2 * reversed;
            if i2 < ir2 {
                continue;
            }
            let (a_re, a_im) = (sample(ir2), sample(ir2 + 1));
            let (b_re, b_im) = (sample(i2), sample(i2 + 1));
            self.scratch[i2] = a_re;
            self.scratch[i2 + 1] = a_im;
            self.scratch[ir2] = b_re;
            self.scratch[ir2 + 1] = b_im;
        }
    }
}

/// Correlation and spectrum of a frame, sharing one FFT pass
///
/// Holds a `(size, window) -> Correlation` plan which is rebuilt only when
/// the frame size or window changes. The plan owns scratch memory and is
/// guarded by a mutex so one computer can be shared between threads.
#[derive(Debug, Default)]
pub struct CorrelationAndSpectrumComputer {
    plan: Mutex<Option<Correlation>>,
}

impl CorrelationAndSpectrumComputer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the correlation for `input`
    ///
    /// # Arguments
    /// * `input` - Frame of N samples, N a power of two
    /// * `window` - Window applied to the frame
    /// * `correlation_out` - N + 1 correlation values
    /// * `spectrum_out` - 2N + 2 floats, interleaved complex spectrum
    /// * `amplitude_squared_out` - N + 1 unnormalized squared amplitudes
    pub fn run(
        &self,
        input: &[f32],
        window: WindowingFunction,
        correlation_out: &mut [f32],
        spectrum_out: &mut [f32],
        amplitude_squared_out: &mut [f32],
    ) -> Result<(), AnalysisError> {
        let size = input.len();
        check_len("CorrelationAndSpectrumComputer::run correlation", size + 1, correlation_out.len())?;
        check_len("CorrelationAndSpectrumComputer::run spectrum", 2 * size + 2, spectrum_out.len())?;
        check_len(
            "CorrelationAndSpectrumComputer::run amplitude",
            size + 1,
            amplitude_squared_out.len(),
        )?;

        let mut plan = self.plan.lock().map_err(|_| AnalysisError::LockPoisoned {
            component: "CorrelationAndSpectrumComputer".to_string(),
        })?;

        let rebuild = match plan.as_ref() {
            Some(current) => current.size() != size || current.window_type() != window,
            None => true,
        };
        if rebuild {
            log::debug!("[Correlation] Creating plan for size {} and window {:?}", size, window);
            *plan = Some(Correlation::new(size, window)?);
        }

        if let Some(correlation) = plan.as_mut() {
            correlation.correlate(input, correlation_out, false, Some(spectrum_out));
        }

        for (i, amplitude) in amplitude_squared_out.iter_mut().enumerate() {
            let re = spectrum_out[2 * i];
            let im = spectrum_out[2 * i + 1];
            *amplitude = re * re + im * im;
        }
        Ok(())
    }
}

fn check_len(context: &str, expected: usize, actual: usize) -> Result<(), AnalysisError> {
    if expected != actual {
        return Err(AnalysisError::BufferSizeMismatch {
            context: context.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn naive_autocorrelation(input: &[f32]) -> Vec<f64> {
        let n = input.len();
        (0..=n)
            .map(|lag| {
                (0..n.saturating_sub(lag))
                    .map(|j| input[j] as f64 * input[j + lag] as f64)
                    .sum()
            })
            .collect()
    }

    #[test]
    fn test_matches_naive_autocorrelation() {
        let mut rng = StdRng::seed_from_u64(7);
        for size in [1usize, 2, 4, 16, 128] {
            let input: Vec<f32> = (0..size).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let mut correlation = Correlation::new(size, WindowingFunction::Tophat).unwrap();
            let mut output = vec![0.0; size + 1];
            correlation.correlate(&input, &mut output, false, None);

            for (lag, expected) in naive_autocorrelation(&input).into_iter().enumerate() {
                assert!(
                    (output[lag] as f64 - expected).abs() < 1e-3,
                    "size {} lag {}: {} vs {}",
                    size,
                    lag,
                    output[lag],
                    expected
                );
            }
        }
    }

    #[test]
    fn test_zero_lag_is_energy_and_maximal() {
        let mut rng = StdRng::seed_from_u64(11);
        let size = 256;
        let input: Vec<f32> = (0..size).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let energy: f32 = input.iter().map(|x| x * x).sum();

        let mut correlation = Correlation::new(size, WindowingFunction::Tophat).unwrap();
        let mut output = vec![0.0; size + 1];
        correlation.correlate(&input, &mut output, false, None);

        assert!((output[0] - energy).abs() < 1e-2 * energy);
        assert!(output.iter().all(|&c| c <= output[0] + 1e-3));
        assert!(output[size].abs() < 1e-3);
    }

    #[test]
    fn test_spectrum_by_product_is_zero_padded_fft() {
        let size = 8;
        let input: Vec<f32> = (0..size).map(|i| i as f32).collect();
        let mut correlation = Correlation::new(size, WindowingFunction::Tophat).unwrap();
        let mut output = vec![0.0; size + 1];
        let mut spectrum = vec![0.0; 2 * size + 2];
        correlation.correlate(&input, &mut output, false, Some(&mut spectrum));

        let mut padded = input.clone();
        padded.resize(2 * size, 0.0);
        let fft = RealFft::new(2 * size, WindowingFunction::Tophat).unwrap();
        let mut expected = vec![0.0; 2 * size + 2];
        fft.transform(&padded, &mut expected, false);

        for (a, b) in spectrum.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_window_reduces_zero_lag() {
        let size = 64;
        let input = vec![1.0; size];
        let mut correlation = Correlation::new(size, WindowingFunction::Hann).unwrap();
        let mut windowed = vec![0.0; size + 1];
        let mut plain = vec![0.0; size + 1];
        correlation.correlate(&input, &mut windowed, false, None);
        correlation.correlate(&input, &mut plain, true, None);

        assert!((plain[0] - size as f32).abs() < 1e-2);
        // sum of hann^2 over a period is 3/8 of the size
        assert!((windowed[0] - 0.375 * size as f32).abs() < 1e-2);
    }

    #[test]
    fn test_computer_rebuilds_plan_on_change() {
        let computer = CorrelationAndSpectrumComputer::new();
        for size in [32usize, 64, 32] {
            let input = vec![0.5; size];
            let mut corr = vec![0.0; size + 1];
            let mut spec = vec![0.0; 2 * size + 2];
            let mut amp = vec![0.0; size + 1];
            computer
                .run(&input, WindowingFunction::Tophat, &mut corr, &mut spec, &mut amp)
                .unwrap();
            assert!((corr[0] - 0.25 * size as f32).abs() < 1e-3);
            // DC bin of the padded spectrum
            assert!((amp[0] - (0.5 * size as f32).powi(2)).abs() < 1e-2);
        }
    }

    #[test]
    fn test_computer_reports_errors() {
        let computer = CorrelationAndSpectrumComputer::new();
        let input = vec![0.0; 100];
        let mut corr = vec![0.0; 101];
        let mut spec = vec![0.0; 202];
        let mut amp = vec![0.0; 101];
        assert_eq!(
            computer.run(&input, WindowingFunction::Tophat, &mut corr, &mut spec, &mut amp),
            Err(AnalysisError::InvalidFftSize { size: 100 })
        );

        let input = vec![0.0; 64];
        let result = computer.run(&input, WindowingFunction::Tophat, &mut corr, &mut spec, &mut amp);
        assert!(matches!(result, Err(AnalysisError::BufferSizeMismatch { expected: 65, .. })));
    }

    #[test]
    #[should_panic(expected = "correlation output must be of size input size + 1")]
    fn test_output_size_checked() {
        let mut correlation = Correlation::new(8, WindowingFunction::Tophat).unwrap();
        let mut output = vec![0.0; 8];
        correlation.correlate(&[0.0; 8], &mut output, false, None);
    }
}
