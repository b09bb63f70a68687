// Peak frequency refinement
//
// A spectral peak at bin k only tells the frequency up to df. Two spectra of
// the same signal taken dt apart differ in phase by 2*pi*f*dt at the peak,
// so the phase difference pins down the fractional part of f*dt while the
// coarse bin frequency resolves the number of whole cycles.

use std::f32::consts::PI;

use super::features::FrequencySpectrum;

/// Phase based peak frequency of two time shifted spectra
#[derive(Debug, Clone, Copy)]
pub struct AccurateSpectrumPeakFrequency<'a> {
    previous: Option<&'a FrequencySpectrum>,
    current: Option<&'a FrequencySpectrum>,
    time_shift: f32,
}

impl<'a> AccurateSpectrumPeakFrequency<'a> {
    /// # Arguments
    /// * `previous` - Spectrum of the earlier frame
    /// * `current` - Spectrum of the later frame
    /// * `time_shift` - Time between the two frames in seconds
    pub fn new(
        previous: Option<&'a FrequencySpectrum>,
        current: Option<&'a FrequencySpectrum>,
        time_shift: f32,
    ) -> Self {
        Self {
            previous,
            current,
            time_shift,
        }
    }

    /// Frequency of the peak at spectrum `index`
    ///
    /// Falls back to `index * df` if a spectrum is missing or the time
    /// shift is zero.
    pub fn frequency(&self, index: usize) -> f32 {
        let df = match self.current.or(self.previous) {
            Some(spectrum) => spectrum.df,
            None => return 0.0,
        };
        let frequency_coarse = index as f32 * df;

        let (previous, current) = match (self.previous, self.current) {
            (Some(previous), Some(current)) if self.time_shift != 0.0 => (previous, current),
            _ => return frequency_coarse,
        };
        if index >= previous.size() || index >= current.size() {
            return frequency_coarse;
        }

        let mut phase_difference = current.phase(index) - previous.phase(index);
        if phase_difference > PI {
            phase_difference -= 2.0 * PI;
        } else if phase_difference < -PI {
            phase_difference += 2.0 * PI;
        }
        let fractional_cycles = phase_difference / (2.0 * PI);
        let cycles = (self.time_shift * frequency_coarse - fractional_cycles).round();
        (cycles + fractional_cycles) / self.time_shift
    }
}

/// Vertex of the parabola through three equidistant points
///
/// # Arguments
/// * `left`, `center`, `right` - Values at `t_center - dt`, `t_center`, `t_center + dt`
///
/// # Returns
/// `(t, value)` of the vertex, or `(t_center, center)` if the points are
/// collinear.
pub fn get_peak_of_polynomial_fit(left: f32, center: f32, right: f32, t_center: f32, dt: f32) -> (f32, f32) {
    let curvature = left - 2.0 * center + right;
    if curvature == 0.0 || (left == center && center == right) {
        return (t_center, center);
    }
    let a = 0.5 * (left + right) - center;
    let b = 0.5 * (right - left);
    let t_relative = (left - right) / (2.0 * curvature);
    (
        dt * t_relative + t_center,
        a * t_relative * t_relative + b * t_relative + center,
    )
}

/// Parabolic peak around `data[index]`, using the index as time
///
/// At the array bounds the raw point is returned.
pub fn get_peak_of_polynomial_fit_array(index: usize, data: &[f32]) -> (f32, f32) {
    if index == 0 || index + 1 >= data.len() {
        return (index as f32, data.get(index).copied().unwrap_or(0.0));
    }
    get_peak_of_polynomial_fit(data[index - 1], data[index], data[index + 1], index as f32, 1.0)
}
