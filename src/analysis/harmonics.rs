// Harmonics - harmonic series search in the amplitude spectrum
//
// Starting from the strongest peak in the search range, the series is walked
// downwards and upwards. Each step predicts the next harmonic from the last
// one found, so slightly inharmonic partials (stiff strings) are still
// tracked.

use std::ops::Index;

use super::features::FrequencySpectrum;
use super::peak_frequency::AccurateSpectrumPeakFrequency;

/// One partial of the harmonic series
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Harmonic {
    pub harmonic_number: i32,
    pub frequency: f32,
    pub spectrum_index: usize,
    pub spectrum_amplitude_squared: f32,
}

/// Bounded collection of harmonics
///
/// Storage is reserved once; adding beyond the capacity is a programmer
/// error.
#[derive(Debug, Clone)]
pub struct Harmonics {
    harmonics: Vec<Harmonic>,
    capacity: usize,
    is_sorted: bool,
}

impl Harmonics {
    pub fn new(capacity: usize) -> Self {
        Self {
            harmonics: Vec::with_capacity(capacity),
            capacity,
            is_sorted: true,
        }
    }

    /// # Panics
    /// Panics if the collection is full
    pub fn add_harmonic(
        &mut self,
        harmonic_number: i32,
        frequency: f32,
        spectrum_index: usize,
        spectrum_amplitude_squared: f32,
    ) {
        assert!(
            self.harmonics.len() < self.capacity,
            "cannot add harmonic, capacity of {} reached",
            self.capacity
        );
        if let Some(last) = self.harmonics.last() {
            if last.harmonic_number > harmonic_number {
                self.is_sorted = false;
            }
        }
        self.harmonics.push(Harmonic {
            harmonic_number,
            frequency,
            spectrum_index,
            spectrum_amplitude_squared,
        });
    }

    /// Sort by harmonic number, in place
    pub fn sort(&mut self) {
        if !self.is_sorted {
            self.harmonics.sort_unstable_by_key(|h| h.harmonic_number);
            self.is_sorted = true;
        }
    }

    pub fn is_sorted(&self) -> bool {
        self.is_sorted
    }

    pub fn clear(&mut self) {
        self.harmonics.clear();
        self.is_sorted = true;
    }

    pub fn len(&self) -> usize {
        self.harmonics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.harmonics.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Harmonic> {
        self.harmonics.iter()
    }

    pub fn as_slice(&self) -> &[Harmonic] {
        &self.harmonics
    }
}

impl Index<usize> for Harmonics {
    type Output = Harmonic;

    fn index(&self, index: usize) -> &Harmonic {
        &self.harmonics[index]
    }
}

impl<'a> IntoIterator for &'a Harmonics {
    type Item = &'a Harmonic;
    type IntoIter = std::slice::Iter<'a, Harmonic>;

    fn into_iter(self) -> Self::IntoIter {
        self.harmonics.iter()
    }
}

fn is_local_maximum(values: &[f32], index: usize) -> bool {
    values[index] >= values[index - 1] && values[index] >= values[index + 1]
}

/// Index of the largest local maximum in `[begin, end)`
///
/// The range is clipped so both neighbours exist. Only strictly positive
/// maxima are considered: the input is a squared amplitude spectrum, where
/// a range without any positive value is silence and has no peak.
///
/// # Returns
/// `None` if the range holds no positive local maximum.
pub fn find_global_maximum_index(begin: usize, end: usize, values: &[f32]) -> Option<usize> {
    let begin = begin.max(1);
    let end = end.min(values.len().saturating_sub(1));
    let mut best = None;
    let mut maximum = 0.0;
    for i in begin..end {
        if values[i] > maximum && is_local_maximum(values, i) {
            maximum = values[i];
            best = Some(i);
        }
    }
    best
}

/// Local maximum near `center` which stands out from its surroundings
///
/// # Arguments
/// * `values` - Squared amplitude spectrum
/// * `center` - Expected (fractional) index of the maximum
/// * `search_radius` - Indices within `center ± search_radius` are searched
/// * `minimum_factor_over_mean` - Maximum must exceed the local mean by this factor
/// * `mean_radius` - Radius around the maximum used for the local mean,
///   the maximum itself is excluded
pub fn find_local_maximum_index(
    values: &[f32],
    center: f32,
    search_radius: f32,
    minimum_factor_over_mean: f32,
    mean_radius: usize,
) -> Option<usize> {
    let len = values.len();
    if len < 3 {
        return None;
    }
    let begin = (center - search_radius).ceil().max(1.0) as usize;
    let end = ((center + search_radius).floor() + 1.0).min((len - 1) as f32).max(0.0) as usize;
    if begin >= end {
        return None;
    }

    let mut index = begin;
    for i in begin + 1..end {
        if values[i] > values[index] {
            index = i;
        }
    }
    let maximum = values[index];
    if values[index - 1] >= maximum || values[index + 1] >= maximum {
        return None;
    }

    let mean_begin = index.saturating_sub(mean_radius);
    let mean_end = (index + mean_radius + 1).min(len);
    let count = mean_end - mean_begin;
    let mean = if count > 1 {
        let sum: f32 = values[mean_begin..mean_end].iter().sum::<f32>() - maximum;
        sum / (count - 1) as f32
    } else {
        0.0
    };

    if maximum < mean * minimum_factor_over_mean {
        None
    } else {
        Some(index)
    }
}

/// Find the harmonic series of `frequency` in `spectrum`
///
/// `harmonics` is cleared first and receives the harmonics in search order;
/// call [`Harmonics::sort`] afterwards if ordered output is needed. Finding
/// nothing is not an error, the collection simply stays empty.
///
/// # Arguments
/// * `frequency` - Base frequency guess, e.g. from the correlation
/// * `frequency_min`, `frequency_max` - Allowed harmonic frequencies
/// * `peak_frequency` - Refines bin indices to accurate frequencies
/// * `harmonic_tolerance` - Relative search radius around predicted bins
/// * `minimum_factor_over_local_mean` - Required prominence of a harmonic
/// * `max_gap_between_harmonics` - Consecutive misses before a direction stops
#[allow(clippy::too_many_arguments)]
pub fn find_harmonics_from_spectrum(
    harmonics: &mut Harmonics,
    frequency: f32,
    frequency_min: f32,
    frequency_max: f32,
    spectrum: &FrequencySpectrum,
    peak_frequency: &AccurateSpectrumPeakFrequency<'_>,
    harmonic_tolerance: f32,
    minimum_factor_over_local_mean: f32,
    max_gap_between_harmonics: usize,
) {
    harmonics.clear();
    let df = spectrum.df;
    if frequency <= 0.0 || df <= 0.0 || harmonics.capacity() == 0 {
        return;
    }
    let amplitudes = &spectrum.amplitude_spectrum_squared;

    let index_begin = (frequency_min / df).ceil().max((0.5 * frequency / df).ceil()).max(0.0) as usize;
    let index_end = amplitudes.len().min((frequency_max / df).floor().max(0.0) as usize + 1);

    let global_index = match find_global_maximum_index(index_begin, index_end, amplitudes) {
        Some(index) => index,
        None => return,
    };
    let global_frequency = peak_frequency.frequency(global_index);
    let global_harmonic = (global_frequency / frequency).round() as i32;
    if global_harmonic <= 0 {
        return;
    }
    harmonics.add_harmonic(
        global_harmonic,
        global_frequency,
        global_index,
        amplitudes[global_index],
    );

    let search_radius = harmonic_tolerance * global_index as f32 / global_harmonic as f32;
    let mean_radius = ((global_index as f32 / (2.0 * global_harmonic as f32)).round() as usize).max(1);

    for increment in [-1i32, 1] {
        let mut previous = harmonics[0];
        let mut harmonic_number = global_harmonic + increment;
        let mut num_fails = 0;

        while num_fails < max_gap_between_harmonics && harmonic_number > 0 {
            let predicted_frequency =
                previous.frequency / previous.harmonic_number as f32 * harmonic_number as f32;
            let center = predicted_frequency / df;

            match find_local_maximum_index(
                amplitudes,
                center,
                search_radius,
                minimum_factor_over_local_mean,
                mean_radius,
            ) {
                Some(index) if index != previous.spectrum_index => {
                    let actual_frequency = peak_frequency.frequency(index);
                    if actual_frequency < frequency_min
                        || actual_frequency > frequency_max
                        || harmonics.len() >= harmonics.capacity()
                    {
                        break;
                    }
                    harmonics.add_harmonic(harmonic_number, actual_frequency, index, amplitudes[index]);
                    previous = harmonics[harmonics.len() - 1];
                    num_fails = 0;
                }
                _ if predicted_frequency < frequency_min || predicted_frequency > frequency_max => {
                    break;
                }
                _ => num_fails += 1,
            }
            harmonic_number += increment;
        }
    }
}

/// Energy of the spectrum within ±1 bin of each harmonic
pub fn compute_energy_content_of_harmonics_in_signal_absolute(
    harmonics: &Harmonics,
    amplitude_spectrum_squared: &[f32],
) -> f32 {
    let len = amplitude_spectrum_squared.len();
    if len == 0 {
        return 0.0;
    }
    harmonics
        .iter()
        .map(|harmonic| {
            let begin = harmonic.spectrum_index.saturating_sub(1);
            let end = (harmonic.spectrum_index + 2).min(len);
            if begin >= end {
                return 0.0;
            }
            amplitude_spectrum_squared[begin..end].iter().sum::<f32>()
        })
        .sum()
}

/// Share of the total spectrum energy carried by the harmonics
pub fn compute_energy_content_of_harmonics_in_signal_relative(
    harmonics: &Harmonics,
    amplitude_spectrum_squared: &[f32],
) -> f32 {
    let total: f32 = amplitude_spectrum_squared.iter().sum();
    if total == 0.0 {
        return 0.0;
    }
    compute_energy_content_of_harmonics_in_signal_absolute(harmonics, amplitude_spectrum_squared) / total
}
