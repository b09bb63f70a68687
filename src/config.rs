//! Configuration management for the pitch tracker
//!
//! This module provides runtime configuration loading from JSON files,
//! so detection and smoothing parameters can be tuned against recordings
//! without recompilation. Changing the detection section requires a
//! restart of the engine, since all frame sized buffers are allocated for it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::analysis::features::WindowingFunction;
use crate::analysis::weighting::AcousticWeightingKind;
use crate::audio::frame::required_queue_capacity;
use crate::error::AnalysisError;
use crate::tuning::{Instrument, SmoothingKind};

/// Lowest frequency the tracker will ever report
pub const FREQUENCY_MIN: f32 = 16.0;
/// Highest frequency the tracker will ever report
pub const FREQUENCY_MAX: f32 = 16000.0;

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub detection: DetectionConfig,
    pub evaluation: EvaluationConfig,
    pub stream: StreamConfig,
}

/// Per frame frequency detection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Frame size in samples, must be a power of two
    pub window_size: usize,
    /// Fraction of a frame shared with the next frame, in [0, 1)
    pub overlap: f32,
    pub window: WindowingFunction,
    pub frequency_min: f32,
    pub frequency_max: f32,
    /// Relative tolerance when checking correlation peaks at subharmonic lags
    pub subharmonics_tolerance: f32,
    /// A subharmonic peak wins if it reaches this fraction of the main peak
    pub subharmonic_peak_ratio: f32,
    /// Search radius for harmonics, relative to the fundamental
    pub harmonic_tolerance: f32,
    /// Spectrum peak must exceed the local mean by this factor
    pub minimum_factor_over_local_mean: f32,
    /// Harmonic search stops after this many missing harmonics in a row
    pub max_gap_between_harmonics: usize,
    /// Number of strongest harmonics used for inharmonicity
    pub max_num_harmonics_for_inharmonicity: usize,
    pub weighting: AcousticWeightingKind,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            window_size: 4096,
            overlap: 0.25,
            window: WindowingFunction::Tophat,
            frequency_min: FREQUENCY_MIN,
            frequency_max: FREQUENCY_MAX,
            subharmonics_tolerance: 0.05,
            subharmonic_peak_ratio: 0.8,
            harmonic_tolerance: 0.1,
            minimum_factor_over_local_mean: 5.0,
            max_gap_between_harmonics: 10,
            max_num_harmonics_for_inharmonicity: 8,
            weighting: AcousticWeightingKind::C,
        }
    }
}

/// Smoothing and target note parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub smoothing: SmoothingKind,
    /// Number of values averaged by the smoother
    pub num_moving_average: usize,
    /// Relative deviation above which a value counts as an outlier
    pub outlier_tolerance: f32,
    /// Consistent outliers needed to accept a pitch change
    pub max_num_faulty_values: usize,
    /// Frames with more noise (0 = pure tone, 1 = noise only) are ignored
    pub max_noise: f32,
    /// Minimum share of spectrum energy in the harmonics
    pub min_harmonic_energy_content: f32,
    /// Input sensitivity in percent, higher values accept quieter signals
    pub sensitivity: f32,
    pub tolerance_in_cents: f32,
    pub reference_frequency: f32,
    pub notes_per_octave: u32,
    pub instrument: Instrument,
    /// Number of values kept by the pitch history
    pub history_size: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            smoothing: SmoothingKind::PitchHistory,
            num_moving_average: 5,
            outlier_tolerance: 0.1,
            max_num_faulty_values: 3,
            max_noise: 0.1,
            min_harmonic_energy_content: 0.1,
            sensitivity: 90.0,
            tolerance_in_cents: 5.0,
            reference_frequency: 440.0,
            notes_per_octave: 12,
            instrument: Instrument::chromatic(),
            history_size: 200,
        }
    }
}

/// Streaming layer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Samples per captured block
    pub block_size: usize,
    /// Frames waiting for analysis, 0 derives it from block and frame size
    pub queue_capacity: usize,
    /// Idle frames and results kept for reuse
    pub pool_capacity: usize,
    /// Blocks in flight between the audio callback and the capture thread
    pub buffer_pool_size: usize,
    /// Sample rate of synthetic sources
    pub sample_rate: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            block_size: 1024,
            queue_capacity: 0,
            pool_capacity: 10,
            buffer_pool_size: 16,
            sample_rate: 44100,
        }
    }
}

fn invalid(reason: impl Into<String>) -> AnalysisError {
    AnalysisError::InvalidConfig { reason: reason.into() }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The loaded configuration, or the default configuration if the file
    /// doesn't exist or the JSON is invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the default location
    pub fn load() -> Self {
        Self::load_from_file("assets/pitch_config.json")
    }

    /// Check all values before an engine is built from them
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let detection = &self.detection;
        if detection.window_size < 4 || !detection.window_size.is_power_of_two() {
            return Err(AnalysisError::InvalidFftSize {
                size: detection.window_size,
            });
        }
        if !(0.0..1.0).contains(&detection.overlap) {
            return Err(invalid(format!("overlap must be in [0, 1), got {}", detection.overlap)));
        }
        if !(detection.frequency_min > 0.0 && detection.frequency_min < detection.frequency_max) {
            return Err(invalid(format!(
                "frequency range [{}, {}] is empty",
                detection.frequency_min, detection.frequency_max
            )));
        }
        if detection.harmonic_tolerance <= 0.0 || detection.subharmonics_tolerance < 0.0 {
            return Err(invalid("tolerances must not be negative"));
        }

        let evaluation = &self.evaluation;
        if evaluation.num_moving_average == 0 || evaluation.history_size == 0 {
            return Err(invalid("smoothing sizes must be greater than 0"));
        }
        if evaluation.max_num_faulty_values == 0 {
            return Err(invalid("max_num_faulty_values must be greater than 0"));
        }
        if evaluation.reference_frequency <= 0.0 || evaluation.notes_per_octave == 0 {
            return Err(invalid("musical scale needs a positive reference frequency and notes per octave"));
        }
        if !(0.0..=100.0).contains(&evaluation.sensitivity) {
            return Err(invalid(format!("sensitivity must be in [0, 100], got {}", evaluation.sensitivity)));
        }

        let stream = &self.stream;
        if stream.block_size == 0 || stream.buffer_pool_size == 0 || stream.sample_rate == 0 {
            return Err(invalid("stream sizes and sample rate must be greater than 0"));
        }
        Ok(())
    }

    /// Capacity of the frame queue, derived from block and frame size unless set
    pub fn queue_capacity(&self) -> usize {
        if self.stream.queue_capacity > 0 {
            self.stream.queue_capacity
        } else {
            required_queue_capacity(self.stream.block_size, self.detection.window_size, self.detection.overlap)
        }
    }
}
