// Musical scale - equal temperament note indices and frequencies
//
// Notes are identified by an integer index relative to the reference note
// (index 0 = reference frequency, A4 = 440 Hz by default). Fractional indices
// are used for band limits between notes.

use serde::{Deserialize, Serialize};

const NOTE_NAMES_12: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Semitone offset of the reference note (A) above C
const REFERENCE_OFFSET_FROM_C: i32 = 9;
const REFERENCE_OCTAVE: i32 = 4;

pub fn ratio_to_cents(ratio: f32) -> f32 {
    (1200.0 * (ratio as f64).log2()) as f32
}

pub fn cents_to_ratio(cents: f32) -> f32 {
    2f64.powf(cents as f64 / 1200.0) as f32
}

/// Note of a musical scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MusicalNote {
    /// Index relative to the reference note
    pub index: i32,
}

impl MusicalNote {
    pub fn new(index: i32) -> Self {
        Self { index }
    }
}

/// Equal temperament scale limited to a note index range
#[derive(Debug, Clone, PartialEq)]
pub struct MusicalScale {
    reference_frequency: f32,
    notes_per_octave: u32,
    index_begin: i32,
    index_end: i32,
}

impl MusicalScale {
    /// Scale covering all notes between `frequency_min` and `frequency_max`
    pub fn new(reference_frequency: f32, notes_per_octave: u32, frequency_min: f32, frequency_max: f32) -> Self {
        let mut scale = Self {
            reference_frequency,
            notes_per_octave: notes_per_octave.max(1),
            index_begin: 0,
            index_end: 1,
        };
        scale.index_begin = scale.note_index(frequency_min).ceil() as i32;
        scale.index_end = (scale.note_index(frequency_max).floor() as i32 + 1).max(scale.index_begin);
        scale
    }

    pub fn reference_frequency(&self) -> f32 {
        self.reference_frequency
    }

    pub fn notes_per_octave(&self) -> u32 {
        self.notes_per_octave
    }

    pub fn reference_note(&self) -> MusicalNote {
        MusicalNote::new(0)
    }

    /// First note index of the scale
    pub fn index_begin(&self) -> i32 {
        self.index_begin
    }

    /// One past the last note index of the scale
    pub fn index_end(&self) -> i32 {
        self.index_end
    }

    /// Frequency of a (fractional) note index
    pub fn note_frequency(&self, index: f32) -> f32 {
        let octaves = index as f64 / self.notes_per_octave as f64;
        (self.reference_frequency as f64 * 2f64.powf(octaves)) as f32
    }

    /// Fractional note index of a frequency
    pub fn note_index(&self, frequency: f32) -> f32 {
        (self.notes_per_octave as f64 * (frequency as f64 / self.reference_frequency as f64).log2()) as f32
    }

    /// Closest note index within the scale range
    pub fn closest_note_index(&self, frequency: f32) -> i32 {
        let index = self.note_index(frequency).round() as i32;
        index.clamp(self.index_begin, (self.index_end - 1).max(self.index_begin))
    }

    pub fn note(&self, index: i32) -> MusicalNote {
        MusicalNote::new(index)
    }

    pub fn has_note(&self, note: MusicalNote) -> bool {
        (self.index_begin..self.index_end).contains(&note.index)
    }

    pub fn note_name(&self, note: MusicalNote) -> String {
        if self.notes_per_octave != 12 {
            return format!("n{}", note.index);
        }
        let from_c = note.index + REFERENCE_OFFSET_FROM_C;
        let name = NOTE_NAMES_12[from_c.rem_euclid(12) as usize];
        let octave = REFERENCE_OCTAVE + from_c.div_euclid(12);
        format!("{}{}", name, octave)
    }

    /// Parse a 12-EDO note name like `A4`, `C#5` or `Eb2`
    pub fn parse_note(&self, name: &str) -> Option<MusicalNote> {
        if self.notes_per_octave != 12 {
            return None;
        }
        let name = name.trim();
        let split = name.find(|c: char| c.is_ascii_digit() || c == '-')?;
        let (pitch, octave) = name.split_at(split);
        let octave: i32 = octave.parse().ok()?;

        let mut chars = pitch.chars();
        let base = match chars.next()?.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };
        let modifier = match chars.as_str() {
            "" => 0,
            "#" => 1,
            "b" => -1,
            _ => return None,
        };
        let from_c = base + modifier + 12 * (octave - REFERENCE_OCTAVE);
        Some(MusicalNote::new(from_c - REFERENCE_OFFSET_FROM_C))
    }
}

impl Default for MusicalScale {
    fn default() -> Self {
        Self::new(440.0, 12, 16.0, 16000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_frequencies() {
        let scale = MusicalScale::default();
        assert!((scale.note_frequency(0.0) - 440.0).abs() < 1e-4);
        assert!((scale.note_frequency(12.0) - 880.0).abs() < 1e-3);
        assert!((scale.note_frequency(-9.0) - 261.6256).abs() < 1e-3);
        assert!((scale.note_index(466.1638) - 1.0).abs() < 1e-4);
        assert_eq!(scale.closest_note_index(452.0), 0);
        assert_eq!(scale.closest_note_index(454.0), 1);
    }

    #[test]
    fn test_index_range() {
        let scale = MusicalScale::default();
        // C0 (16.35 Hz) is the first note above 16 Hz
        assert_eq!(scale.note_name(scale.note(scale.index_begin())), "C0");
        assert!(scale.note_frequency((scale.index_end() - 1) as f32) <= 16000.0);
        assert!(scale.note_frequency(scale.index_end() as f32) > 16000.0);
        assert_eq!(scale.closest_note_index(1.0), scale.index_begin());
        assert!(!scale.has_note(MusicalNote::new(scale.index_end())));
    }

    #[test]
    fn test_note_names() {
        let scale = MusicalScale::default();
        assert_eq!(scale.note_name(MusicalNote::new(0)), "A4");
        assert_eq!(scale.note_name(MusicalNote::new(4)), "C#5");
        assert_eq!(scale.note_name(MusicalNote::new(-29)), "E2");
        assert_eq!(scale.parse_note("E2"), Some(MusicalNote::new(-29)));
        assert_eq!(scale.parse_note("Bb3"), Some(MusicalNote::new(-11)));
        assert_eq!(scale.parse_note("H2"), None);
    }

    #[test]
    fn test_cents() {
        assert!((ratio_to_cents(2.0) - 1200.0).abs() < 1e-3);
        assert!((cents_to_ratio(100.0) - 1.059463).abs() < 1e-5);
    }
}
