// Per-frame data containers
//
// All containers are sized once at construction and never resized. They are
// filled in place by the result collector for every frame.

use std::ops::Index;

/// Samples of one frame
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub values: Vec<f32>,
    /// Absolute position of the first sample in the stream
    pub frame_position: u64,
    pub dt: f32,
}

impl TimeSeries {
    pub fn new(size: usize, dt: f32) -> Self {
        Self {
            values: vec![0.0; size],
            frame_position: 0,
            dt,
        }
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn time(&self, index: usize) -> f32 {
        index as f32 * self.dt
    }

    pub fn mean(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f32>() / self.values.len() as f32
    }

    pub fn standard_deviation(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self
            .values
            .iter()
            .map(|&v| (v - mean) * (v - mean))
            .sum::<f32>()
            / self.values.len() as f32;
        variance.sqrt()
    }
}

/// Complex spectrum with derived squared amplitudes
///
/// `spectrum` stores `size` complex values as interleaved real/imaginary
/// pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencySpectrum {
    pub spectrum: Vec<f32>,
    pub amplitude_spectrum_squared: Vec<f32>,
    /// Amplitude spectrum normalized to [0, 1] for plotting
    pub plotting_spectrum_normalized: Vec<f32>,
    pub df: f32,
}

impl FrequencySpectrum {
    pub fn new(size: usize, df: f32) -> Self {
        Self {
            spectrum: vec![0.0; 2 * size],
            amplitude_spectrum_squared: vec![0.0; size],
            plotting_spectrum_normalized: vec![0.0; size],
            df,
        }
    }

    /// Number of frequency bins
    pub fn size(&self) -> usize {
        self.amplitude_spectrum_squared.len()
    }

    pub fn frequency(&self, index: usize) -> f32 {
        index as f32 * self.df
    }

    pub fn real(&self, index: usize) -> f32 {
        self.spectrum[2 * index]
    }

    pub fn imag(&self, index: usize) -> f32 {
        self.spectrum[2 * index + 1]
    }

    pub fn phase(&self, index: usize) -> f32 {
        self.imag(index).atan2(self.real(index))
    }

    /// Copy spectrum and amplitudes from another spectrum of the same size
    pub fn copy_from(&mut self, other: &FrequencySpectrum) {
        self.spectrum.copy_from_slice(&other.spectrum);
        self.amplitude_spectrum_squared
            .copy_from_slice(&other.amplitude_spectrum_squared);
        self.plotting_spectrum_normalized
            .copy_from_slice(&other.plotting_spectrum_normalized);
        self.df = other.df;
    }

    /// Update the plotting spectrum from the squared amplitudes
    pub fn update_plotting_spectrum(&mut self) {
        normalize_min_max(
            self.amplitude_spectrum_squared.iter().map(|a| a.sqrt()),
            &mut self.plotting_spectrum_normalized,
        );
    }
}

/// Autocorrelation values at lags `i * dt`
#[derive(Debug, Clone, PartialEq)]
pub struct AutoCorrelation {
    pub values: Vec<f32>,
    pub plot_values_normalized: Vec<f32>,
    /// Position of correlation value zero in the normalized plot values
    pub plot_values_normalized_zero: f32,
    pub dt: f32,
}

impl AutoCorrelation {
    pub fn new(size: usize, dt: f32) -> Self {
        Self {
            values: vec![0.0; size],
            plot_values_normalized: vec![0.0; size],
            plot_values_normalized_zero: 0.0,
            dt,
        }
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn times(&self, index: usize) -> f32 {
        index as f32 * self.dt
    }

    pub fn update_plot_values(&mut self) {
        let (min, max) = normalize_min_max(self.values.iter().copied(), &mut self.plot_values_normalized);
        self.plot_values_normalized_zero = if max > min { -min / (max - min) } else { 0.0 };
    }
}

impl Index<usize> for AutoCorrelation {
    type Output = f32;

    fn index(&self, index: usize) -> &f32 {
        &self.values[index]
    }
}

/// Map `values` linearly to [0, 1] into `out`, returning the original (min, max)
fn normalize_min_max(values: impl Iterator<Item = f32> + Clone, out: &mut [f32]) -> (f32, f32) {
    let (min, max) = values
        .clone()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let range = max - min;
    for (o, v) in out.iter_mut().zip(values) {
        *o = if range > 0.0 { (v - min) / range } else { 0.0 };
    }
    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_series_statistics() {
        let mut series = TimeSeries::new(4, 0.5);
        series.values.copy_from_slice(&[1.0, -1.0, 1.0, -1.0]);
        assert_eq!(series.mean(), 0.0);
        assert!((series.standard_deviation() - 1.0).abs() < 1e-6);
        assert_eq!(series.time(3), 1.5);
    }

    #[test]
    fn test_spectrum_accessors() {
        let mut spectrum = FrequencySpectrum::new(3, 10.0);
        spectrum.spectrum.copy_from_slice(&[1.0, 0.0, 0.0, 2.0, 3.0, 4.0]);
        assert_eq!(spectrum.size(), 3);
        assert_eq!(spectrum.frequency(2), 20.0);
        assert_eq!(spectrum.real(2), 3.0);
        assert_eq!(spectrum.imag(1), 2.0);
        assert!((spectrum.phase(1) - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn test_plotting_normalization() {
        let mut spectrum = FrequencySpectrum::new(3, 1.0);
        spectrum
            .amplitude_spectrum_squared
            .copy_from_slice(&[0.0, 4.0, 16.0]);
        spectrum.update_plotting_spectrum();
        assert_eq!(spectrum.plotting_spectrum_normalized, vec![0.0, 0.5, 1.0]);

        let mut correlation = AutoCorrelation::new(3, 1.0);
        correlation.values.copy_from_slice(&[2.0, -2.0, 0.0]);
        correlation.update_plot_values();
        assert_eq!(correlation.plot_values_normalized, vec![1.0, 0.0, 0.5]);
        assert_eq!(correlation.plot_values_normalized_zero, 0.5);
        assert_eq!(correlation[0], 2.0);
    }
}
