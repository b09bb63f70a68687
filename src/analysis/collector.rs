// Frequency detection result collector
//
// Runs the per frame analysis: spectrum and correlation, correlation based
// frequency, harmonics and their statistics. Results live in a recycling
// pool. The collector keeps one extra reference to the previous result, its
// spectrum is needed for the phase based peak frequency of the next frame.

use super::correlation_frequency::{find_correlation_based_frequency, CorrelationBasedFrequency};
use super::features::{AutoCorrelation, CorrelationAndSpectrumComputer, FrequencySpectrum, TimeSeries};
use super::harmonics::{
    compute_energy_content_of_harmonics_in_signal_absolute, compute_energy_content_of_harmonics_in_signal_relative,
    find_harmonics_from_spectrum, Harmonics,
};
use super::inharmonicity::InharmonicityDetector;
use super::peak_frequency::AccurateSpectrumPeakFrequency;
use super::statistics::HarmonicStatistics;
use super::weighting::AcousticWeighting;
use crate::audio::frame::SampleFrame;
use crate::audio::pool::{RecyclingPool, Shared};
use crate::config::DetectionConfig;
use crate::error::AnalysisError;

/// Shared handle to the results of one frame
pub type SharedResults = Shared<CollectedResults>;

/// Everything computed for one frame
#[derive(Debug, Clone)]
pub struct CollectedResults {
    pub size: usize,
    pub sample_rate: u32,
    pub time_series: TimeSeries,
    pub time_series_standard_deviation: f32,
    /// Spectrum of the zero padded frame, `size + 1` bins
    pub spectrum: FrequencySpectrum,
    pub previous_spectrum: FrequencySpectrum,
    /// Frame position belonging to `previous_spectrum`, if there was a previous frame
    pub previous_frame_position: Option<u64>,
    pub correlation: AutoCorrelation,
    pub correlation_based_frequency: CorrelationBasedFrequency,
    pub harmonics: Harmonics,
    pub harmonic_statistics: HarmonicStatistics,
    pub harmonic_energy_content_relative: f32,
    pub harmonic_energy_absolute: f32,
    pub inharmonicity: f32,
    /// 1 - corr[1]/corr[0], 0 for a pure tone, close to 1 for noise
    pub noise: f32,
    /// Time between this and the previous frame, 0 without previous frame
    pub time_shift: f32,
    inharmonicity_detector: InharmonicityDetector,
}

impl CollectedResults {
    pub fn new(size: usize, sample_rate: u32, max_num_harmonics_for_inharmonicity: usize) -> Self {
        let dt = 1.0 / sample_rate as f32;
        let df = sample_rate as f32 / (2 * size) as f32;
        Self {
            size,
            sample_rate,
            time_series: TimeSeries::new(size, dt),
            time_series_standard_deviation: 0.0,
            spectrum: FrequencySpectrum::new(size + 1, df),
            previous_spectrum: FrequencySpectrum::new(size + 1, df),
            previous_frame_position: None,
            correlation: AutoCorrelation::new(size + 1, dt),
            correlation_based_frequency: CorrelationBasedFrequency::default(),
            harmonics: Harmonics::new(size + 1),
            harmonic_statistics: HarmonicStatistics::new(),
            harmonic_energy_content_relative: 0.0,
            harmonic_energy_absolute: 0.0,
            inharmonicity: 0.0,
            noise: 1.0,
            time_shift: 0.0,
            inharmonicity_detector: InharmonicityDetector::new(max_num_harmonics_for_inharmonicity),
        }
    }

    /// True if the buffers fit frames of this shape
    pub fn matches(&self, size: usize, sample_rate: u32) -> bool {
        self.size == size && self.sample_rate == sample_rate
    }

    pub fn frame_position(&self) -> u64 {
        self.time_series.frame_position
    }

    /// Detected base frequency, 0 if there is none
    ///
    /// Prefers the harmonic based estimate and falls back to the
    /// correlation based frequency.
    pub fn frequency(&self) -> f32 {
        let harmonic_frequency = self.harmonic_statistics.frequency();
        if harmonic_frequency > 0.0 {
            harmonic_frequency
        } else {
            self.correlation_based_frequency.frequency
        }
    }

    fn clear_frequency_results(&mut self) {
        self.correlation_based_frequency.clear();
        self.harmonics.clear();
        self.harmonic_statistics.clear();
        self.harmonic_energy_content_relative = 0.0;
        self.harmonic_energy_absolute = 0.0;
        self.inharmonicity = 0.0;
    }
}

/// Runs the per frame analysis and owns the result pool
pub struct FrequencyDetectionResultCollector {
    config: DetectionConfig,
    weighting: Box<dyn AcousticWeighting>,
    computer: CorrelationAndSpectrumComputer,
    pool: RecyclingPool<CollectedResults>,
    previous: Option<SharedResults>,
}

impl FrequencyDetectionResultCollector {
    pub fn new(config: DetectionConfig, pool_capacity: usize) -> Self {
        let weighting = config.weighting.weighting();
        Self {
            config,
            weighting,
            computer: CorrelationAndSpectrumComputer::new(),
            pool: RecyclingPool::new(pool_capacity),
            previous: None,
        }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn pool(&self) -> &RecyclingPool<CollectedResults> {
        &self.pool
    }

    /// Drop the retained previous result, the next frame starts fresh
    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Analyze one frame
    ///
    /// # Errors
    /// Returns an error if the frame size is no power of two or the plan
    /// cache lock was poisoned.
    pub fn collect_results(&mut self, frame: &SampleFrame) -> Result<SharedResults, AnalysisError> {
        let size = frame.size();
        let sample_rate = frame.sample_rate;
        let max_num_harmonics = self.config.max_num_harmonics_for_inharmonicity;
        let mut results = self.pool.get(
            || CollectedResults::new(size, sample_rate, max_num_harmonics),
            |r| r.matches(size, sample_rate),
        );

        // the retained reference is released at the end of this block
        match self.previous.take() {
            Some(previous) if previous.matches(size, sample_rate) => {
                results.previous_spectrum.copy_from(&previous.spectrum);
                results.previous_frame_position = Some(previous.frame_position());
            }
            _ => results.previous_frame_position = None,
        }

        let r = &mut *results;
        r.time_series.values.copy_from_slice(&frame.data);
        r.time_series.frame_position = frame.frame_position;
        r.time_series_standard_deviation = r.time_series.standard_deviation();

        self.computer.run(
            &r.time_series.values,
            self.config.window,
            &mut r.correlation.values,
            &mut r.spectrum.spectrum,
            &mut r.spectrum.amplitude_spectrum_squared,
        )?;

        let scale = 2.0 / size as f32 / self.config.window.integral();
        let scale_squared = scale * scale;
        r.spectrum
            .amplitude_spectrum_squared
            .iter_mut()
            .for_each(|a| *a *= scale_squared);
        r.spectrum.update_plotting_spectrum();
        r.correlation.update_plot_values();

        r.noise = if r.correlation[0] == 0.0 {
            1.0
        } else {
            1.0 - r.correlation[1] / r.correlation[0]
        };

        r.time_shift = match r.previous_frame_position {
            Some(previous) if previous < frame.frame_position => {
                r.time_series.dt * (frame.frame_position - previous) as f32
            }
            _ => 0.0,
        };

        find_correlation_based_frequency(
            &mut r.correlation_based_frequency,
            &r.correlation,
            self.config.frequency_min,
            self.config.frequency_max,
            self.config.subharmonics_tolerance,
            self.config.subharmonic_peak_ratio,
        );

        if r.correlation_based_frequency.frequency > 0.0 {
            let previous_spectrum = if r.previous_frame_position.is_some() {
                Some(&r.previous_spectrum)
            } else {
                None
            };
            let peak_frequency = AccurateSpectrumPeakFrequency::new(previous_spectrum, Some(&r.spectrum), r.time_shift);
            find_harmonics_from_spectrum(
                &mut r.harmonics,
                r.correlation_based_frequency.frequency,
                self.config.frequency_min,
                self.config.frequency_max,
                &r.spectrum,
                &peak_frequency,
                self.config.harmonic_tolerance,
                self.config.minimum_factor_over_local_mean,
                self.config.max_gap_between_harmonics,
            );
            r.harmonics.sort();
            r.harmonic_statistics.evaluate(&r.harmonics, self.weighting.as_ref());
            r.harmonic_energy_absolute = compute_energy_content_of_harmonics_in_signal_absolute(
                &r.harmonics,
                &r.spectrum.amplitude_spectrum_squared,
            );
            r.harmonic_energy_content_relative = compute_energy_content_of_harmonics_in_signal_relative(
                &r.harmonics,
                &r.spectrum.amplitude_spectrum_squared,
            );
            r.inharmonicity = r
                .inharmonicity_detector
                .compute_inharmonicity(&r.harmonics, self.weighting.as_ref());
        } else {
            r.clear_frequency_results();
        }

        let shared = results.into_shared();
        self.previous = Some(shared.clone());
        Ok(shared)
    }
}

impl std::fmt::Debug for FrequencyDetectionResultCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrequencyDetectionResultCollector")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .field("has_previous", &self.previous.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 44100;

    fn frame_of(position: u64, size: usize, partials: &[(f32, f32)]) -> SampleFrame {
        let mut frame = SampleFrame::new(size, SAMPLE_RATE);
        frame.reset(position);
        let samples: Vec<f32> = (0..size as u64)
            .map(|i| {
                let t = (position + i) as f64 / SAMPLE_RATE as f64;
                partials
                    .iter()
                    .map(|&(amplitude, frequency)| amplitude * (2.0 * std::f64::consts::PI * frequency as f64 * t).sin() as f32)
                    .sum()
            })
            .collect();
        frame.add_data(position, &samples);
        frame
    }

    #[test]
    fn test_previous_result_is_retained() {
        let mut collector = FrequencyDetectionResultCollector::new(DetectionConfig::default(), 4);
        let first = collector.collect_results(&frame_of(0, 1024, &[(1.0, 440.0)])).unwrap();
        assert_eq!(first.previous_frame_position, None);
        assert_eq!(first.time_shift, 0.0);
        // the collector holds the second reference
        assert_eq!(Shared::reference_count(&first), 2);
        drop(first);
        assert_eq!(collector.pool().in_use(), 1);

        let second = collector.collect_results(&frame_of(256, 1024, &[(1.0, 440.0)])).unwrap();
        assert_eq!(second.previous_frame_position, Some(0));
        assert!((second.time_shift - 256.0 / SAMPLE_RATE as f32).abs() < 1e-7);
        // previous result went back to the pool
        assert_eq!(collector.pool().in_use(), 1);
        assert_eq!(collector.pool().available(), 1);
    }

    #[test]
    fn test_frame_size_change_discards_previous() {
        let mut collector = FrequencyDetectionResultCollector::new(DetectionConfig::default(), 4);
        collector.collect_results(&frame_of(0, 1024, &[(1.0, 440.0)])).unwrap();
        let results = collector.collect_results(&frame_of(512, 2048, &[(1.0, 440.0)])).unwrap();
        assert_eq!(results.size, 2048);
        assert_eq!(results.previous_frame_position, None);
        assert_eq!(results.spectrum.size(), 2049);
        assert_eq!(results.correlation.size(), 2049);
    }

    #[test]
    fn test_silence_gives_no_frequency() {
        let mut collector = FrequencyDetectionResultCollector::new(DetectionConfig::default(), 4);
        let frame = SampleFrame::new(2048, SAMPLE_RATE);
        let results = collector.collect_results(&frame).unwrap();
        assert_eq!(results.frequency(), 0.0);
        assert_eq!(results.noise, 1.0);
        assert!(results.harmonics.is_empty());
        assert_eq!(results.harmonic_energy_absolute, 0.0);
    }

    #[test]
    fn test_invalid_frame_size_is_an_error() {
        let mut collector = FrequencyDetectionResultCollector::new(DetectionConfig::default(), 4);
        let frame = SampleFrame::new(1000, SAMPLE_RATE);
        assert_eq!(
            collector.collect_results(&frame).unwrap_err(),
            AnalysisError::InvalidFftSize { size: 1000 }
        );
    }

    #[test]
    fn test_amplitude_spectrum_is_normalized() {
        // bin aligned tone: 2N = 2048 bins over 44100 Hz, bin 40
        let size = 1024;
        let frequency = 40.0 * SAMPLE_RATE as f32 / (2 * size) as f32;
        let mut collector = FrequencyDetectionResultCollector::new(DetectionConfig::default(), 4);
        let results = collector.collect_results(&frame_of(0, size, &[(0.5, frequency)])).unwrap();
        let amplitude = results.spectrum.amplitude_spectrum_squared[40].sqrt();
        assert!((amplitude - 0.5).abs() < 0.01, "amplitude {}", amplitude);
        assert!(results.noise < 0.02);
    }
}
