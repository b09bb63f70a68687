// Inharmonicity - deviation of the partials from integer multiples
//
// For two harmonics a, b the inharmonicity is log(f_a/f_b) / log(h_a/h_b) - 1,
// which is 0 for ideal spacing and positive for stiff strings. The detector
// only looks at the loudest harmonics since weak ones carry most of the
// frequency error.

use super::harmonics::{Harmonic, Harmonics};
use super::statistics::UpdatableStatistics;
use super::weighting::AcousticWeighting;

/// Inharmonicity between two harmonics
pub fn compute_inharmonicity(frequency1: f32, harmonic1: i32, frequency2: f32, harmonic2: i32) -> f32 {
    if harmonic1 == harmonic2 || frequency1 <= 0.0 || frequency2 <= 0.0 {
        return 0.0;
    }
    (frequency2 / frequency1).ln() / (harmonic2 as f32 / harmonic1 as f32).ln() - 1.0
}

#[derive(Debug, Clone)]
pub struct InharmonicityDetector {
    max_num_harmonics: usize,
    loudest: Vec<Harmonic>,
    statistics: UpdatableStatistics,
}

impl InharmonicityDetector {
    pub fn new(max_num_harmonics: usize) -> Self {
        Self {
            max_num_harmonics,
            loudest: Vec::with_capacity(max_num_harmonics),
            statistics: UpdatableStatistics::new(),
        }
    }

    /// Harmonics with the highest amplitude, loudest first
    pub fn extract_and_sort_harmonics_with_highest_amplitude(&mut self, harmonics: &Harmonics) -> &[Harmonic] {
        self.loudest.clear();
        self.loudest.extend(harmonics.iter().copied());
        self.loudest.sort_unstable_by(|a, b| {
            b.spectrum_amplitude_squared
                .total_cmp(&a.spectrum_amplitude_squared)
        });
        self.loudest.truncate(self.max_num_harmonics);
        &self.loudest
    }

    /// Weighted mean inharmonicity between consecutive loudest harmonics
    ///
    /// Returns 0 if fewer than two harmonics are available.
    pub fn compute_inharmonicity(&mut self, harmonics: &Harmonics, weighting: &dyn AcousticWeighting) -> f32 {
        self.extract_and_sort_harmonics_with_highest_amplitude(harmonics);
        if self.loudest.len() < 2 {
            return 0.0;
        }

        let weight_of = |h: &Harmonic| weighting.apply_to_amplitude(h.spectrum_amplitude_squared.sqrt(), h.frequency);

        self.statistics.clear();
        for pair in self.loudest.windows(2) {
            let (previous, current) = (&pair[0], &pair[1]);
            let inharmonicity = compute_inharmonicity(
                previous.frequency,
                previous.harmonic_number,
                current.frequency,
                current.harmonic_number,
            );
            self.statistics
                .update(inharmonicity, weight_of(previous) * weight_of(current));
        }
        self.statistics.mean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::weighting::ZeroWeighting;

    #[test]
    fn test_pairwise_inharmonicity() {
        assert!(compute_inharmonicity(100.0, 1, 200.0, 2).abs() < 1e-6);
        assert!(compute_inharmonicity(300.0, 3, 100.0, 1).abs() < 1e-6);
        // stretched octave
        assert!(compute_inharmonicity(100.0, 1, 210.0, 2) > 0.0);
        assert_eq!(compute_inharmonicity(100.0, 2, 105.0, 2), 0.0);
    }

    #[test]
    fn test_loudest_harmonics_are_kept() {
        let mut harmonics = Harmonics::new(8);
        harmonics.add_harmonic(1, 100.0, 10, 0.5);
        harmonics.add_harmonic(2, 200.0, 20, 2.0);
        harmonics.add_harmonic(3, 300.0, 30, 1.0);

        let mut detector = InharmonicityDetector::new(2);
        let loudest = detector.extract_and_sort_harmonics_with_highest_amplitude(&harmonics);
        let numbers: Vec<i32> = loudest.iter().map(|h| h.harmonic_number).collect();
        assert_eq!(numbers, vec![2, 3]);
    }

    #[test]
    fn test_stiff_string() {
        let b = 1e-3f32;
        let mut harmonics = Harmonics::new(8);
        for n in 1..=5 {
            let frequency = 100.0 * n as f32 * (1.0 + b * (n * n) as f32).sqrt();
            harmonics.add_harmonic(n, frequency, 10 * n as usize, 1.0 / n as f32);
        }
        let mut detector = InharmonicityDetector::new(8);
        let inharmonicity = detector.compute_inharmonicity(&harmonics, &ZeroWeighting);
        assert!(inharmonicity > 0.0);

        let mut ideal = Harmonics::new(8);
        for n in 1..=5 {
            ideal.add_harmonic(n, 100.0 * n as f32, 10 * n as usize, 1.0 / n as f32);
        }
        assert!(detector.compute_inharmonicity(&ideal, &ZeroWeighting).abs() < 1e-5);
    }

    #[test]
    fn test_single_harmonic_has_no_inharmonicity() {
        let mut harmonics = Harmonics::new(4);
        harmonics.add_harmonic(1, 100.0, 10, 1.0);
        let mut detector = InharmonicityDetector::new(8);
        assert_eq!(detector.compute_inharmonicity(&harmonics, &ZeroWeighting), 0.0);
    }
}
