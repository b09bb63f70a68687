// Window module - window functions applied before the FFT
//
// The window is multiplied onto the frame while it is copied into the
// bit-reversed FFT buffer. The window integral is needed to scale the
// amplitude spectrum back to signal amplitudes.

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Window function applied to a frame before transformation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WindowingFunction {
    /// No window (all ones)
    #[default]
    Tophat,
    Hamming,
    Hann,
}

impl WindowingFunction {
    /// Window value at position `i` of a window with `size` entries
    pub fn value(self, i: usize, size: usize) -> f32 {
        let phase = 2.0 * PI * i as f32 / size as f32;
        match self {
            WindowingFunction::Tophat => 1.0,
            WindowingFunction::Hamming => 0.54 - 0.46 * phase.cos(),
            WindowingFunction::Hann => 0.5 * (1.0 - phase.cos()),
        }
    }

    /// Mean value of the window, used to normalize amplitude spectra
    pub fn integral(self) -> f32 {
        match self {
            WindowingFunction::Tophat => 1.0,
            WindowingFunction::Hamming => 0.54,
            WindowingFunction::Hann => 0.5,
        }
    }
}

/// Pre-compute a window of the given size
pub fn get_window(window: WindowingFunction, size: usize) -> Vec<f32> {
    (0..size).map(|i| window.value(i, size)).collect()
}
