// Target note detection with hysteresis
//
// Once a note is locked, it is kept as long as the frequency stays inside
// a band around it. The band is the wider of a deviation band (a fraction of
// the distance to the neighbouring target) and a fixed cent band, which is
// clipped so that it never reaches into the tolerance of the neighbour.

use serde::{Deserialize, Serialize};

use super::instrument::{Instrument, SortedAndDistinctInstrumentStrings};
use super::scale::{cents_to_ratio, ratio_to_cents, MusicalNote, MusicalScale};

/// Fraction of the distance to the neighbouring target at which we switch
pub const RELATIVE_DEVIATION_FOR_CHANGING_TARGET: f32 = 0.6;

/// Band in cents inside which the target is never changed
pub const MINIMUM_CENT_DEVIATION_BEFORE_CHANGING_TARGET: f32 = 20.0;

/// Frequency band `[lower, upper]` keeping a locked note
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyBand {
    pub lower: f32,
    pub upper: f32,
}

impl FrequencyBand {
    /// Band which contains no frequency
    pub const NEVER: FrequencyBand = FrequencyBand {
        lower: f32::INFINITY,
        upper: f32::NEG_INFINITY,
    };

    /// Band which contains every frequency
    pub const ALWAYS: FrequencyBand = FrequencyBand {
        lower: f32::NEG_INFINITY,
        upper: f32::INFINITY,
    };

    pub fn contains(&self, frequency: f32) -> bool {
        frequency >= self.lower && frequency <= self.upper
    }
}

/// Detects the target note of a frequency
#[derive(Debug, Clone)]
pub struct TargetNoteAutoDetection {
    scale: MusicalScale,
    is_chromatic: bool,
    strings: SortedAndDistinctInstrumentStrings,
    tolerance_in_cents: f32,
    relative_deviation_for_changing_target: f32,
    minimum_cent_deviation_before_changing_target: f32,
}

impl TargetNoteAutoDetection {
    /// # Arguments
    /// * `scale` - Scale defining note frequencies
    /// * `instrument` - Possible targets; `None` means chromatic
    /// * `tolerance_in_cents` - Deviation at which a note counts as in tune
    pub fn new(scale: &MusicalScale, instrument: Option<&Instrument>, tolerance_in_cents: f32) -> Self {
        let chromatic = Instrument::chromatic();
        let instrument = instrument.unwrap_or(&chromatic);
        Self {
            scale: scale.clone(),
            is_chromatic: instrument.is_chromatic,
            strings: SortedAndDistinctInstrumentStrings::new(instrument, scale),
            tolerance_in_cents,
            relative_deviation_for_changing_target: RELATIVE_DEVIATION_FOR_CHANGING_TARGET,
            minimum_cent_deviation_before_changing_target: MINIMUM_CENT_DEVIATION_BEFORE_CHANGING_TARGET,
        }
    }

    /// Override the hysteresis constants
    pub fn with_hysteresis(mut self, relative_deviation: f32, minimum_cents: f32) -> Self {
        self.relative_deviation_for_changing_target = relative_deviation;
        self.minimum_cent_deviation_before_changing_target = minimum_cents;
        self
    }

    pub fn strings(&self) -> &SortedAndDistinctInstrumentStrings {
        &self.strings
    }

    /// Detect the target note of `frequency`
    ///
    /// Returns `previous` if the frequency lies in its band, `None` for a
    /// non-positive frequency or an instrument without usable strings.
    pub fn detect(&self, frequency: f32, previous: Option<MusicalNote>) -> Option<MusicalNote> {
        let num_different_notes = self.strings.num_different_notes();
        if frequency <= 0.0 || (!self.is_chromatic && num_different_notes == 0) {
            return None;
        }

        if self.frequency_band(previous).contains(frequency) && self.strings.is_note_part_of_instrument(previous) {
            return previous;
        }

        if self.is_chromatic {
            return Some(self.scale.note(self.scale.closest_note_index(frequency)));
        }

        let sorted = self.strings.note_indices();
        if num_different_notes == 1 {
            return Some(self.scale.note(sorted[0]));
        }

        let exact = self.scale.note_index(frequency);
        let insertion = sorted.partition_point(|&index| (index as f32) < exact);
        let position = if insertion == 0 {
            0
        } else if insertion >= num_different_notes {
            num_different_notes - 1
        } else if exact - (sorted[insertion - 1] as f32) < (sorted[insertion] as f32) - exact {
            insertion - 1
        } else {
            insertion
        };
        Some(self.scale.note(sorted[position]))
    }

    /// Band inside which `note` is kept
    pub fn frequency_band(&self, note: Option<MusicalNote>) -> FrequencyBand {
        let num_different_notes = self.strings.num_different_notes();
        let note = match note {
            Some(note) if self.is_chromatic || num_different_notes > 0 => note,
            _ => return FrequencyBand::NEVER,
        };

        if self.is_chromatic {
            return self.chromatic_band(note.index);
        }
        if num_different_notes <= 1 {
            return FrequencyBand::ALWAYS;
        }
        match self.strings.position_of(note) {
            Some(position) if position < num_different_notes => self.instrument_band(position),
            _ => FrequencyBand::NEVER,
        }
    }

    fn lower_cent_bound(&self, center: f32, neighbour: f32) -> f32 {
        let cents_to_neighbour = ratio_to_cents(center / neighbour) - self.tolerance_in_cents;
        center / cents_to_ratio(self.minimum_cent_deviation_before_changing_target.min(cents_to_neighbour))
    }

    fn upper_cent_bound(&self, center: f32, neighbour: f32) -> f32 {
        let cents_to_neighbour = ratio_to_cents(neighbour / center) - self.tolerance_in_cents;
        center * cents_to_ratio(self.minimum_cent_deviation_before_changing_target.min(cents_to_neighbour))
    }

    fn chromatic_band(&self, index: i32) -> FrequencyBand {
        let index = index as f32;
        let deviation = self.relative_deviation_for_changing_target;
        let center = self.scale.note_frequency(index);

        let lower_deviation = self.scale.note_frequency(index - deviation);
        let upper_deviation = self.scale.note_frequency(index + deviation);
        let lower_cents = self.lower_cent_bound(center, self.scale.note_frequency(index - 1.0));
        let upper_cents = self.upper_cent_bound(center, self.scale.note_frequency(index + 1.0));

        FrequencyBand {
            lower: lower_deviation.min(lower_cents),
            upper: upper_deviation.max(upper_cents),
        }
    }

    // outermost strings are unbounded outward
    fn instrument_band(&self, position: usize) -> FrequencyBand {
        let sorted = self.strings.note_indices();
        let num_different_notes = self.strings.num_different_notes();
        let deviation = self.relative_deviation_for_changing_target;
        let current = sorted[position] as f32;
        let center = self.scale.note_frequency(current);

        let lower = if position == 0 {
            f32::NEG_INFINITY
        } else {
            let neighbour = sorted[position - 1] as f32;
            let deviation_based = self.scale.note_frequency((1.0 - deviation) * current + deviation * neighbour);
            deviation_based.min(self.lower_cent_bound(center, self.scale.note_frequency(neighbour)))
        };

        let upper = if position + 1 == num_different_notes {
            f32::INFINITY
        } else {
            let neighbour = sorted[position + 1] as f32;
            let deviation_based = self.scale.note_frequency((1.0 - deviation) * current + deviation * neighbour);
            deviation_based.max(self.upper_cent_bound(center, self.scale.note_frequency(neighbour)))
        };

        FrequencyBand { lower, upper }
    }
}

/// Note to tune to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningTarget {
    pub note: MusicalNote,
    /// Note name, e.g. `A4`
    pub name: String,
    /// Exact frequency of the note
    pub frequency: f32,
    /// False if the note only comes from the chromatic fallback
    pub is_part_of_instrument: bool,
    pub instrument_has_no_strings: bool,
}

/// Computes the tuning target, falling back to chromatic detection when
/// the instrument has no matching string
#[derive(Debug, Clone)]
pub struct TuningTargetComputer {
    scale: MusicalScale,
    instrument_has_no_strings: bool,
    detection: TargetNoteAutoDetection,
    chromatic_detection: TargetNoteAutoDetection,
}

impl TuningTargetComputer {
    pub fn new(scale: &MusicalScale, instrument: &Instrument, tolerance_in_cents: f32) -> Self {
        Self {
            scale: scale.clone(),
            instrument_has_no_strings: instrument.has_no_strings(),
            detection: TargetNoteAutoDetection::new(scale, Some(instrument), tolerance_in_cents),
            chromatic_detection: TargetNoteAutoDetection::new(scale, None, tolerance_in_cents),
        }
    }

    pub fn scale(&self) -> &MusicalScale {
        &self.scale
    }

    /// # Arguments
    /// * `frequency` - Smoothed frequency, may be 0 if there is none
    /// * `previous` - Currently locked note
    /// * `user_defined` - Note chosen by the user, takes precedence if it is in the scale
    pub fn compute(
        &self,
        frequency: f32,
        previous: Option<MusicalNote>,
        user_defined: Option<MusicalNote>,
    ) -> TuningTarget {
        if let Some(note) = user_defined.filter(|&note| self.scale.has_note(note)) {
            let part_of_instrument = self.detection.strings().is_note_part_of_instrument(Some(note));
            return self.target(note, part_of_instrument);
        }

        if frequency <= 0.0 {
            let note = self.scale.reference_note();
            let part_of_instrument = self.detection.strings().is_note_part_of_instrument(Some(note));
            return self.target(note, part_of_instrument);
        }

        if let Some(note) = self.detection.detect(frequency, previous) {
            return self.target(note, true);
        }

        let note = self
            .chromatic_detection
            .detect(frequency, previous)
            .unwrap_or_else(|| self.scale.reference_note());
        self.target(note, false)
    }

    fn target(&self, note: MusicalNote, is_part_of_instrument: bool) -> TuningTarget {
        TuningTarget {
            note,
            name: self.scale.note_name(note),
            frequency: self.scale.note_frequency(note.index as f32),
            is_part_of_instrument,
            instrument_has_no_strings: self.instrument_has_no_strings,
        }
    }
}
