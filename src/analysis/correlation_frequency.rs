// Correlation based frequency
//
// A periodic signal with period T correlates at lags T, 2T, 3T, ... and the
// highest of these peaks is not necessarily at T. After locating the global
// maximum, the lags at 1/2, 1/3, ... of it are checked and a sufficiently
// high peak at a shorter lag is preferred.

use serde::{Deserialize, Serialize};

use super::features::AutoCorrelation;
use super::peak_frequency::get_peak_of_polynomial_fit_array;

/// Radius used when searching the first minimum of the correlation
const FIRST_MINIMUM_RADIUS: usize = 2;

/// Frequency estimate from the correlation peak
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CorrelationBasedFrequency {
    pub frequency: f32,
    pub time_shift: f32,
    pub correlation_at_time_shift: f32,
}

impl CorrelationBasedFrequency {
    pub fn set(&mut self, frequency: f32, time_shift: f32, correlation_at_time_shift: f32) {
        self.frequency = frequency;
        self.time_shift = time_shift;
        self.correlation_at_time_shift = correlation_at_time_shift;
    }

    pub fn clear(&mut self) {
        self.set(0.0, 0.0, 0.0);
    }
}

fn is_local_maximum(data: &[f32], i: usize) -> bool {
    i > 0 && i + 1 < data.len() && data[i] >= data[i - 1] && data[i] >= data[i + 1]
}

/// No value within `radius` of `i` is smaller than `data[i]`
fn is_local_minimum(data: &[f32], i: usize, radius: usize) -> bool {
    let begin = i.saturating_sub(radius);
    let end = (i + radius + 1).min(data.len());
    (begin..end).all(|j| j == i || data[j] >= data[i])
}

/// First local minimum, `data.len()` if there is none
fn find_first_minimum(data: &[f32], radius: usize) -> usize {
    if data.len() <= 2 * radius {
        return data.len();
    }
    (radius..data.len() - radius)
        .find(|&i| is_local_minimum(data, i, radius))
        .unwrap_or(data.len())
}

/// Best local maximum in `[begin, end)` as a fitted `(index, value)`
fn best_local_maximum(data: &[f32], begin: usize, end: usize) -> Option<(f32, f32)> {
    let mut best: Option<usize> = None;
    for i in begin..end {
        if is_local_maximum(data, i) && best.map_or(true, |b| data[i] > data[b]) {
            best = Some(i);
        }
    }
    best.map(|index| get_peak_of_polynomial_fit_array(index, data))
}

/// Find the most probable period in `correlation`
///
/// # Arguments
/// * `results` - Receives the frequency, updated in place; all zero if
///   no candidate exists in the allowed lag range
/// * `frequency_min`, `frequency_max` - Allowed frequencies, ignored if <= 0
/// * `subharmonics_tolerance` - Allowed deviation from the ideal lag ratio,
///   e.g. 0.05 accepts peaks within `lag/2.05 .. lag/1.95`
/// * `subharmonic_peak_ratio` - A peak at a shorter lag must reach this
///   share of the global peak to replace it
pub fn find_correlation_based_frequency(
    results: &mut CorrelationBasedFrequency,
    correlation: &AutoCorrelation,
    frequency_min: f32,
    frequency_max: f32,
    subharmonics_tolerance: f32,
    subharmonic_peak_ratio: f32,
) {
    let data = &correlation.values;
    let dt = correlation.dt;
    let len = data.len();
    if len < 3 || dt <= 0.0 {
        results.clear();
        return;
    }

    let global_end = if frequency_min > 0.0 {
        let lag = (1.0 / (dt as f64 * frequency_min as f64)) as usize + 1;
        lag.min(len - 1)
    } else {
        len - 1
    };

    let first_minimum = find_first_minimum(data, FIRST_MINIMUM_RADIUS);
    let global_begin = if frequency_max > 0.0 {
        let lag = (1.0 / (dt as f64 * frequency_max as f64)).ceil() as usize;
        lag.max(first_minimum)
    } else {
        first_minimum
    };

    if global_begin >= global_end {
        results.clear();
        return;
    }

    let (mut fitted_index, mut fitted_peak) = match best_local_maximum(data, global_begin, global_end) {
        Some(peak) => peak,
        None => {
            results.clear();
            return;
        }
    };

    let required_peak = subharmonic_peak_ratio * fitted_peak;
    let maximum_division = (fitted_index / global_begin as f32).ceil() as usize;

    for division in (2..=maximum_division).rev() {
        let division = division as f32;
        let mut begin = ((fitted_index / (division + subharmonics_tolerance)).ceil() as usize).max(1);
        let mut end = ((fitted_index / (division - subharmonics_tolerance)) as usize + 1).min(len - 1);
        if end <= begin {
            begin = (fitted_index / division).round() as usize;
            end = begin + 1;
        }

        if let Some((index, peak)) = best_local_maximum(data, begin, end) {
            if peak >= required_peak {
                fitted_index = index;
                fitted_peak = peak;
                break;
            }
        }
    }

    if fitted_index <= 0.0 {
        results.clear();
        return;
    }
    let time_shift = fitted_index * dt;
    results.set(1.0 / time_shift, time_shift, fitted_peak);
}
