// FFT module - packed real-valued Fast Fourier Transform
//
// A real input of `size` samples is treated as `size / 2` complex values
// (even samples as real part, odd samples as imaginary part). An iterative
// radix-2 transform over these packed values is followed by a split pass
// which recovers the spectrum of the real signal.
//
// Output layout for an FFT of `size` real values (buffer of `size + 2` floats):
//   out[2k]     real part of bin k   (k = 0..=size/2)
//   out[2k + 1] imaginary part of bin k
// Bin 0 and the Nyquist bin (stored at out[size]) have zero imaginary part.
// The result is the plain forward DFT without normalization.

use super::window::{get_window, WindowingFunction};
use crate::error::AnalysisError;

/// Reverse the lowest `num_bits` bits of `value`
pub fn bit_reverse(value: usize, num_bits: u32) -> usize {
    let mut value = value;
    let mut reversed = 0;
    for _ in 0..num_bits {
        reversed = (reversed << 1) | (value & 1);
        value >>= 1;
    }
    reversed
}

/// Number of frequency bins returned by a real FFT of the given size
pub fn num_frequencies(size: usize) -> usize {
    size / 2 + 1
}

/// Frequency of bin `index` for a real FFT of `size` samples spaced by `dt`
pub fn frequency_of_index(index: usize, size: usize, dt: f32) -> f32 {
    index as f32 / (dt * size as f32)
}

/// Bin index closest to `frequency`
pub fn closest_frequency_index(frequency: f32, size: usize, dt: f32) -> usize {
    (frequency * dt * size as f32).round().max(0.0) as usize
}

/// Packed real FFT with pre-computed twiddle and bit-reversal tables
///
/// All tables are computed once in [`RealFft::new`]; transforms do not
/// allocate.
#[derive(Debug, Clone)]
pub struct RealFft {
    size: usize,
    window_type: WindowingFunction,
    n_bits: u32,
    cos_table: Vec<f32>,
    sin_table: Vec<f32>,
    cos_table_half: Vec<f32>,
    sin_table_half: Vec<f32>,
    bit_reverse_table: Vec<usize>,
    window: Vec<f32>,
}

impl RealFft {
    /// Create a new real FFT
    ///
    /// # Arguments
    /// * `size` - Number of real input samples, must be a power of two (>= 2)
    /// * `window_type` - Window applied while copying the input
    ///
    /// # Returns
    /// * `Err(AnalysisError::InvalidFftSize)` if `size` is not a power of two
    pub fn new(size: usize, window_type: WindowingFunction) -> Result<Self, AnalysisError> {
        if size < 2 || !size.is_power_of_two() {
            return Err(AnalysisError::InvalidFftSize { size });
        }
        let n_bits = size.trailing_zeros();
        let half_size = size / 2;
        let fac = -2.0 * std::f64::consts::PI / size as f64;

        let mut cos_table = Vec::with_capacity(half_size);
        let mut sin_table = Vec::with_capacity(half_size);
        let mut cos_table_half = Vec::with_capacity(half_size);
        let mut sin_table_half = Vec::with_capacity(half_size);
        let mut bit_reverse_table = Vec::with_capacity(half_size);

        for i in 0..half_size {
            let angle = 2.0 * i as f64 * fac;
            cos_table.push(angle.cos() as f32);
            sin_table.push(angle.sin() as f32);

            let angle_half = i as f64 * fac;
            cos_table_half.push(angle_half.cos() as f32);
            sin_table_half.push(angle_half.sin() as f32);

            bit_reverse_table.push(bit_reverse(i, n_bits - 1));
        }

        Ok(Self {
            size,
            window_type,
            n_bits,
            cos_table,
            sin_table,
            cos_table_half,
            sin_table_half,
            bit_reverse_table,
            window: get_window(window_type, size),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn window_type(&self) -> WindowingFunction {
        self.window_type
    }

    /// Bit-reversal permutation of the packed complex values
    pub fn bit_reverse_table(&self) -> &[usize] {
        &self.bit_reverse_table
    }

    /// Transform `input` into `output`
    ///
    /// # Arguments
    /// * `input` - `size` real samples
    /// * `output` - Buffer of `size + 2` floats receiving the spectrum
    /// * `disable_window` - Skip windowing even if a window was configured
    ///
    /// # Panics
    /// Panics if the buffer sizes do not match the FFT size
    pub fn transform(&self, input: &[f32], output: &mut [f32], disable_window: bool) {
        assert_eq!(input.len(), self.size, "FFT input is of invalid size");
        assert_eq!(output.len(), self.size + 2, "FFT output is of invalid size");

        let apply_window = !disable_window && self.window_type != WindowingFunction::Tophat;

        for (i, &reversed) in self.bit_reverse_table.iter().enumerate() {
            let i2 = 2 * i;
            let ir2 = 2 * reversed;
            if i2 < ir2 {
                continue;
            }
            if apply_window {
                output[i2] = self.window[ir2] * input[ir2];
                output[i2 + 1] = self.window[ir2 + 1] * input[ir2 + 1];
                output[ir2] = self.window[i2] * input[i2];
                output[ir2 + 1] = self.window[i2 + 1] * input[i2 + 1];
            } else {
                output[i2] = input[ir2];
                output[i2 + 1] = input[ir2 + 1];
                output[ir2] = input[i2];
                output[ir2 + 1] = input[i2 + 1];
            }
        }
        self.transform_bit_reversed(output);
    }

    /// Transform data which is already in bit-reversed order, in place
    ///
    /// # Panics
    /// Panics if `data.len() != size + 2`
    pub fn transform_bit_reversed(&self, data: &mut [f32]) {
        assert_eq!(data.len(), self.size + 2, "size of data must be fft size + 2");
        let half_size = self.size / 2;
        let mut num_inner = 1;
        let mut w_step = half_size / 2;

        for _ in 0..self.n_bits - 1 {
            let mut idx1 = 0;
            let mut idx2 = half_size / 2;

            for i in 0..num_inner {
                let cos1 = self.cos_table[idx1];
                let sin1 = self.sin_table[idx1];
                let cos2 = self.cos_table[idx2];
                let sin2 = self.sin_table[idx2];

                let mut k1re = 2 * i;
                for _ in 0..w_step {
                    let k1im = k1re + 1;
                    let k2re = k1re + 2 * num_inner;
                    let k2im = k2re + 1;

                    let tmp2_re = data[k2re];
                    let tmp2_im = data[k2im];

                    data[k2re] = data[k1re] + cos2 * tmp2_re - sin2 * tmp2_im;
                    data[k2im] = data[k1im] + cos2 * tmp2_im + sin2 * tmp2_re;
                    data[k1re] += cos1 * tmp2_re - sin1 * tmp2_im;
                    data[k1im] += cos1 * tmp2_im + sin1 * tmp2_re;

                    k1re += 4 * num_inner;
                }
                idx1 += w_step;
                idx2 += w_step;
            }
            num_inner *= 2;
            w_step /= 2;
        }

        // split the packed spectrum into the spectrum of the real signal
        for i in 1..half_size / 2 {
            let k1re = 2 * i;
            let k1im = k1re + 1;
            let k2re = 2 * (half_size - i);
            let k2im = k2re + 1;

            let cos1 = self.cos_table_half[i];
            let sin1 = self.sin_table_half[i];
            let cos2 = self.cos_table_half[half_size - i];
            let sin2 = self.sin_table_half[half_size - i];

            let fr_re = 0.5 * (data[k1re] + data[k2re]);
            let fr_im = 0.5 * (data[k1im] - data[k2im]);
            let gr_re = 0.5 * (data[k1im] + data[k2im]);
            let gr_im = 0.5 * (data[k2re] - data[k1re]);

            data[k1re] = fr_re + cos1 * gr_re - sin1 * gr_im;
            data[k1im] = fr_im + sin1 * gr_re + cos1 * gr_im;
            data[k2re] = fr_re + cos2 * gr_re + sin2 * gr_im;
            data[k2im] = -fr_im + sin2 * gr_re - cos2 * gr_im;
        }

        // the quarter bin is its own mirror, the split reduces to a conjugation
        if half_size >= 2 {
            let quarter_im = 2 * (half_size / 2) + 1;
            data[quarter_im] = -data[quarter_im];
        }

        let size = self.size;
        data[size] = data[0] - data[1];
        data[0] += data[1];
        data[1] = 0.0;
        data[size + 1] = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn naive_dft(input: &[f32]) -> Vec<(f64, f64)> {
        let n = input.len();
        (0..=n / 2)
            .map(|k| {
                let mut re = 0.0;
                let mut im = 0.0;
                for (j, &x) in input.iter().enumerate() {
                    let angle = -2.0 * std::f64::consts::PI * (k * j) as f64 / n as f64;
                    re += x as f64 * angle.cos();
                    im += x as f64 * angle.sin();
                }
                (re, im)
            })
            .collect()
    }

    fn random_signal(size: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..size).map(|_| rng.gen_range(-1.0..1.0)).collect()
    }

    #[test]
    fn test_bit_reverse() {
        assert_eq!(bit_reverse(0b001, 3), 0b100);
        assert_eq!(bit_reverse(0b110, 3), 0b011);
        assert_eq!(bit_reverse(5, 0), 0);
    }

    #[test]
    fn test_invalid_size_rejected() {
        for size in [0, 1, 3, 100, 1000] {
            match RealFft::new(size, WindowingFunction::Tophat) {
                Err(AnalysisError::InvalidFftSize { size: reported }) => assert_eq!(reported, size),
                other => panic!("expected InvalidFftSize for {}, got {:?}", size, other.map(|f| f.size())),
            }
        }
    }

    #[test]
    fn test_parseval_energy_is_preserved() {
        let mut rng = StdRng::seed_from_u64(42);
        for size in [4usize, 64, 512, 4096] {
            for _ in 0..5 {
                let amplitude = rng.gen_range(0.01f32..10.0);
                let input: Vec<f32> = (0..size).map(|_| amplitude * rng.gen_range(-1.0f32..1.0)).collect();
                let fft = RealFft::new(size, WindowingFunction::Tophat).unwrap();
                let mut output = vec![0.0; size + 2];
                fft.transform(&input, &mut output, false);

                let time_energy: f64 = input.iter().map(|&x| x as f64 * x as f64).sum();
                let power = |k: usize| (output[2 * k] as f64).powi(2) + (output[2 * k + 1] as f64).powi(2);
                // bins between DC and Nyquist stand for their mirrored twin as well
                let mut frequency_energy = power(0) + power(size / 2);
                for k in 1..size / 2 {
                    frequency_energy += 2.0 * power(k);
                }
                frequency_energy /= size as f64;

                assert!(
                    (frequency_energy - time_energy).abs() <= 1e-4 * time_energy,
                    "size {}: {} vs {}",
                    size,
                    frequency_energy,
                    time_energy
                );
            }
        }
    }

    #[test]
    fn test_matches_naive_dft() {
        for (seed, size) in [2usize, 4, 8, 16, 32, 256].iter().enumerate() {
            let fft = RealFft::new(*size, WindowingFunction::Tophat).unwrap();
            let input = random_signal(*size, seed as u64);
            let mut output = vec![0.0; size + 2];
            fft.transform(&input, &mut output, false);

            for (k, (re, im)) in naive_dft(&input).into_iter().enumerate() {
                assert!(
                    (output[2 * k] as f64 - re).abs() < 1e-3,
                    "size {} bin {} real: {} vs {}",
                    size,
                    k,
                    output[2 * k],
                    re
                );
                assert!(
                    (output[2 * k + 1] as f64 - im).abs() < 1e-3,
                    "size {} bin {} imag: {} vs {}",
                    size,
                    k,
                    output[2 * k + 1],
                    im
                );
            }
        }
    }

    #[test]
    fn test_matches_rustfft() {
        use rustfft::{num_complex::Complex, FftPlanner};

        let size = 1024;
        let input = random_signal(size, 42);
        let fft = RealFft::new(size, WindowingFunction::Tophat).unwrap();
        let mut output = vec![0.0; size + 2];
        fft.transform(&input, &mut output, false);

        let mut reference: Vec<Complex<f32>> =
            input.iter().map(|&x| Complex::new(x, 0.0)).collect();
        FftPlanner::new().plan_fft_forward(size).process(&mut reference);

        for k in 0..=size / 2 {
            assert!((output[2 * k] - reference[k].re).abs() < 1e-2, "bin {}", k);
            assert!((output[2 * k + 1] - reference[k].im).abs() < 1e-2, "bin {}", k);
        }
    }

    #[test]
    fn test_window_applied_unless_disabled() {
        let size = 64;
        let input = vec![1.0; size];
        let fft = RealFft::new(size, WindowingFunction::Hann).unwrap();
        let mut windowed = vec![0.0; size + 2];
        let mut plain = vec![0.0; size + 2];
        fft.transform(&input, &mut windowed, false);
        fft.transform(&input, &mut plain, true);

        // DC bin is the sum of the (windowed) samples
        assert!((plain[0] - size as f32).abs() < 1e-3);
        assert!((windowed[0] - 0.5 * size as f32).abs() < 1e-3);
    }

    #[test]
    fn test_pure_tone_peak_bin() {
        let size = 512;
        let bin = 37;
        let input: Vec<f32> = (0..size)
            .map(|i| (2.0 * std::f32::consts::PI * bin as f32 * i as f32 / size as f32).cos())
            .collect();
        let fft = RealFft::new(size, WindowingFunction::Tophat).unwrap();
        let mut output = vec![0.0; size + 2];
        fft.transform(&input, &mut output, false);

        let peak = (0..=size / 2)
            .max_by(|&a, &b| {
                let pa = output[2 * a].powi(2) + output[2 * a + 1].powi(2);
                let pb = output[2 * b].powi(2) + output[2 * b + 1].powi(2);
                pa.partial_cmp(&pb).unwrap()
            })
            .unwrap();
        assert_eq!(peak, bin);
        assert!((output[2 * bin] - size as f32 / 2.0).abs() < 1e-2);
    }

    #[test]
    fn test_frequency_helpers() {
        let dt = 1.0 / 44100.0;
        assert_eq!(num_frequencies(4096), 2049);
        assert!((frequency_of_index(1, 4096, dt) - 44100.0 / 4096.0).abs() < 1e-3);
        assert_eq!(closest_frequency_index(440.0, 4096, dt), 41);
    }

    #[test]
    #[should_panic(expected = "FFT output is of invalid size")]
    fn test_output_size_checked() {
        let fft = RealFft::new(8, WindowingFunction::Tophat).unwrap();
        let mut output = vec![0.0; 8];
        fft.transform(&[0.0; 8], &mut output, false);
    }
}
