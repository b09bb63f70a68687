// Frequency evaluation - from per frame results to a tuning target
//
// Frames are gated by noise, harmonic energy content and signal level. The
// remaining frequencies are smoothed and mapped to a target note, which
// stays locked as long as the smoothed frequency is inside its band.

use serde::{Deserialize, Serialize};

use super::instrument::Instrument;
use super::pitch_history::PitchHistory;
use super::scale::{MusicalNote, MusicalScale};
use super::smoother::OutlierRemovingSmoother;
use super::target_note::{TuningTarget, TuningTargetComputer};
use crate::analysis::collector::CollectedResults;
use crate::config::{EvaluationConfig, FREQUENCY_MAX, FREQUENCY_MIN};

/// Energy mapped to signal level 0
const LEVEL_MIN_ENERGY: f32 = 1e-7;
/// Energy mapped to signal level 100
const LEVEL_MAX_ENERGY: f32 = 1e-2;

/// Smoothing strategy of the evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingKind {
    /// Moving average with pitch change detection
    #[default]
    PitchHistory,
    /// Competing outlier removing buffers
    OutlierRemoving,
}

#[derive(Debug, Clone)]
enum Smoother {
    PitchHistory(PitchHistory),
    OutlierRemoving(OutlierRemovingSmoother),
}

impl Smoother {
    fn from_config(config: &EvaluationConfig) -> Self {
        match config.smoothing {
            SmoothingKind::PitchHistory => Smoother::PitchHistory(
                PitchHistory::new(config.history_size)
                    .with_num_moving_average(config.num_moving_average)
                    .with_max_num_faulty_values(config.max_num_faulty_values)
                    .with_max_noise(config.max_noise)
                    .with_allowed_relative_deviation(config.outlier_tolerance),
            ),
            SmoothingKind::OutlierRemoving => Smoother::OutlierRemoving(OutlierRemovingSmoother::new(
                config.num_moving_average,
                FREQUENCY_MIN,
                FREQUENCY_MAX,
                config.outlier_tolerance,
                config.max_num_faulty_values,
                OutlierRemovingSmoother::DEFAULT_MIN_NUM_VALUES_FOR_VALID_MEAN,
                OutlierRemovingSmoother::DEFAULT_NUM_BUFFERS,
            )),
        }
    }

    // 0 if the value did not produce a new smoothed value
    fn smooth(&mut self, value: f32, noise: f32) -> f32 {
        match self {
            Smoother::PitchHistory(history) => {
                if history.append_value(value, noise) {
                    history.current_value()
                } else {
                    0.0
                }
            }
            Smoother::OutlierRemoving(smoother) => smoother.append(value),
        }
    }
}

/// Map a harmonic energy to a level between 0 and 100 (logarithmic)
pub fn signal_level(energy: f32) -> f32 {
    let min_level = LEVEL_MIN_ENERGY.log10();
    let max_level = LEVEL_MAX_ENERGY.log10();
    let level = energy.max(LEVEL_MIN_ENERGY).log10();
    (100.0 * (level - min_level) / (max_level - min_level)).clamp(0.0, 100.0)
}

/// Evaluation of one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Smoothed frequency, 0 if the frame was rejected
    pub smoothed_frequency: f32,
    /// Raw frequency detected in the frame
    pub detected_frequency: f32,
    pub target: Option<TuningTarget>,
    /// Seconds since the last frame producing a smoothed frequency
    pub time_since_last_detection: f32,
    pub frame_position: u64,
    pub noise: f32,
    pub harmonic_energy_relative: f32,
    pub harmonic_energy_absolute: f32,
    pub inharmonicity: f32,
}

/// Turns collected frame results into tuning targets
#[derive(Debug, Clone)]
pub struct FrequencyEvaluator {
    smoother: Smoother,
    target_computer: TuningTargetComputer,
    max_noise: f32,
    min_harmonic_energy_content: f32,
    sensitivity: f32,
    current_target_note: Option<MusicalNote>,
    last_detection_position: Option<u64>,
}

impl FrequencyEvaluator {
    pub fn new(config: &EvaluationConfig) -> Self {
        let scale = MusicalScale::new(
            config.reference_frequency,
            config.notes_per_octave,
            FREQUENCY_MIN,
            FREQUENCY_MAX,
        );
        Self::with_scale(config, &scale, &config.instrument)
    }

    pub fn with_scale(config: &EvaluationConfig, scale: &MusicalScale, instrument: &Instrument) -> Self {
        Self {
            smoother: Smoother::from_config(config),
            target_computer: TuningTargetComputer::new(scale, instrument, config.tolerance_in_cents),
            max_noise: config.max_noise,
            min_harmonic_energy_content: config.min_harmonic_energy_content,
            sensitivity: config.sensitivity,
            current_target_note: None,
            last_detection_position: None,
        }
    }

    pub fn scale(&self) -> &MusicalScale {
        self.target_computer.scale()
    }

    /// Currently locked target note
    pub fn current_target_note(&self) -> Option<MusicalNote> {
        self.current_target_note
    }

    fn passes_gate(&self, results: &CollectedResults) -> bool {
        // a level of 0 must pass for sensitivity 100
        let required_level = 100.0 - self.sensitivity - 0.0001;
        results.noise < self.max_noise
            && results.harmonic_energy_content_relative >= self.min_harmonic_energy_content
            && signal_level(results.harmonic_energy_absolute) >= required_level
    }

    /// Evaluate one frame
    ///
    /// # Arguments
    /// * `results` - Collected results of the frame
    /// * `user_defined_note` - Target chosen by the user, overrides detection
    pub fn evaluate(&mut self, results: &CollectedResults, user_defined_note: Option<MusicalNote>) -> EvaluationResult {
        let frame_position = results.frame_position();
        let detected_frequency = results.frequency();

        let mut smoothed_frequency = 0.0;
        let mut target = None;
        if self.passes_gate(results) {
            smoothed_frequency = self.smoother.smooth(detected_frequency, results.noise);
            if smoothed_frequency > 0.0 {
                self.last_detection_position = Some(frame_position);
                let new_target =
                    self.target_computer
                        .compute(smoothed_frequency, self.current_target_note, user_defined_note);
                self.current_target_note = Some(new_target.note);
                target = Some(new_target);
            }
        }

        let since = frame_position.saturating_sub(self.last_detection_position.unwrap_or(0));
        EvaluationResult {
            smoothed_frequency,
            detected_frequency,
            target,
            time_since_last_detection: since as f32 * results.time_series.dt,
            frame_position,
            noise: results.noise,
            harmonic_energy_relative: results.harmonic_energy_content_relative,
            harmonic_energy_absolute: results.harmonic_energy_absolute,
            inharmonicity: results.inharmonicity,
        }
    }
}
