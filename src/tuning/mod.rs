// Tuning module - from detected frequencies to target notes
//
// Pipeline per frame: gate → smoother (PitchHistory or
// OutlierRemovingSmoother) → TargetNoteAutoDetection with hysteresis.

pub mod evaluator;
pub mod instrument;
pub mod pitch_history;
pub mod scale;
pub mod smoother;
pub mod target_note;

pub use evaluator::{signal_level, EvaluationResult, FrequencyEvaluator, SmoothingKind};
pub use instrument::{Instrument, SortedAndDistinctInstrumentStrings};
pub use pitch_history::PitchHistory;
pub use scale::{cents_to_ratio, ratio_to_cents, MusicalNote, MusicalScale};
pub use smoother::{OutlierRemovingSmoother, OutlierRemovingSmoothingBuffer};
pub use target_note::{FrequencyBand, TargetNoteAutoDetection, TuningTarget, TuningTargetComputer};
