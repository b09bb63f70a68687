// Running statistics over harmonics

use super::harmonics::Harmonics;
use super::weighting::AcousticWeighting;

/// Weighted mean and variance, updated one value at a time (Welford)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdatableStatistics {
    weight_sum: f32,
    mean: f32,
    sum_of_squares: f32,
}

impl UpdatableStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value; values with non-positive weight are ignored
    pub fn update(&mut self, value: f32, weight: f32) {
        if weight <= 0.0 || !weight.is_finite() {
            return;
        }
        self.weight_sum += weight;
        let mean_old = self.mean;
        self.mean += (weight / self.weight_sum) * (value - mean_old);
        self.sum_of_squares += weight * (value - mean_old) * (value - self.mean);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn mean(&self) -> f32 {
        self.mean
    }

    pub fn variance(&self) -> f32 {
        if self.weight_sum > 0.0 {
            self.sum_of_squares / self.weight_sum
        } else {
            0.0
        }
    }

    pub fn standard_deviation(&self) -> f32 {
        self.variance().max(0.0).sqrt()
    }

    pub fn weight_sum(&self) -> f32 {
        self.weight_sum
    }
}

/// Base frequency estimate averaged over all harmonics
///
/// Each harmonic contributes `frequency / harmonic_number`, weighted with the
/// acoustically weighted amplitude of the harmonic.
#[derive(Debug, Clone, Default)]
pub struct HarmonicStatistics {
    statistics: UpdatableStatistics,
}

impl HarmonicStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.statistics.clear();
    }

    pub fn evaluate(&mut self, harmonics: &Harmonics, weighting: &dyn AcousticWeighting) {
        self.statistics.clear();
        for harmonic in harmonics.iter() {
            let weight = weighting.apply_to_amplitude(
                harmonic.spectrum_amplitude_squared.sqrt(),
                harmonic.frequency,
            );
            self.statistics
                .update(harmonic.frequency / harmonic.harmonic_number as f32, weight);
        }
    }

    /// Weighted base frequency, 0 if no harmonic contributed
    pub fn frequency(&self) -> f32 {
        self.statistics.mean()
    }

    pub fn frequency_variance(&self) -> f32 {
        self.statistics.variance()
    }

    pub fn frequency_standard_deviation(&self) -> f32 {
        self.statistics.standard_deviation()
    }
}
