// Spectral features - FFT, correlation and per-frame containers
//
// Module organization:
// - window: Window functions and their integrals
// - fft: Packed real FFT with cached twiddle/bit-reversal tables
// - correlation: Autocorrelation via two FFT passes, plan cache
// - types: TimeSeries, FrequencySpectrum, AutoCorrelation
//
// One correlation pass yields both the autocorrelation of a frame and the
// complex spectrum of the zero padded frame. Everything downstream (harmonic
// search, phase refinement, correlation peak search) reads these containers.

mod correlation;
mod fft;
mod types;
mod window;

pub use correlation::{Correlation, CorrelationAndSpectrumComputer};
pub use fft::{
    bit_reverse, closest_frequency_index, frequency_of_index, num_frequencies, RealFft,
};
pub use types::{AutoCorrelation, FrequencySpectrum, TimeSeries};
pub use window::{get_window, WindowingFunction};
