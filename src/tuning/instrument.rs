// Instruments - sets of target notes

use serde::{Deserialize, Serialize};

use super::scale::{MusicalNote, MusicalScale};

/// Instrument defining the possible target notes
///
/// A chromatic instrument accepts every note of the scale, otherwise only
/// the notes of its strings are targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    /// Note index of each string
    pub strings: Vec<i32>,
    pub is_chromatic: bool,
}

impl Instrument {
    pub fn chromatic() -> Self {
        Self {
            name: "chromatic".to_string(),
            strings: Vec::new(),
            is_chromatic: true,
        }
    }

    /// Six string guitar in standard tuning (E2 A2 D3 G3 B3 E4)
    pub fn guitar() -> Self {
        Self {
            name: "guitar".to_string(),
            strings: vec![-29, -24, -19, -14, -10, -5],
            is_chromatic: false,
        }
    }

    /// Four string bass in standard tuning (E1 A1 D2 G2)
    pub fn bass() -> Self {
        Self {
            name: "bass".to_string(),
            strings: vec![-41, -36, -31, -26],
            is_chromatic: false,
        }
    }

    /// Violin (G3 D4 A4 E5)
    pub fn violin() -> Self {
        Self {
            name: "violin".to_string(),
            strings: vec![-14, -7, 0, 7],
            is_chromatic: false,
        }
    }

    /// Look up one of the built-in instruments by name
    pub fn by_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "chromatic" => Some(Self::chromatic()),
            "guitar" => Some(Self::guitar()),
            "bass" => Some(Self::bass()),
            "violin" => Some(Self::violin()),
            _ => None,
        }
    }

    pub fn has_no_strings(&self) -> bool {
        !self.is_chromatic && self.strings.is_empty()
    }
}

impl Default for Instrument {
    fn default() -> Self {
        Self::chromatic()
    }
}

/// Sorted, distinct note indices of an instrument's strings
///
/// Strings outside of the scale are dropped; if there was any, `i32::MAX`
/// is appended once so callers can tell.
#[derive(Debug, Clone, PartialEq)]
pub struct SortedAndDistinctInstrumentStrings {
    is_chromatic: bool,
    note_indices: Vec<i32>,
    scale: MusicalScale,
}

impl SortedAndDistinctInstrumentStrings {
    pub fn new(instrument: &Instrument, scale: &MusicalScale) -> Self {
        let mut note_indices: Vec<i32> = Vec::new();
        if !instrument.is_chromatic {
            note_indices = instrument
                .strings
                .iter()
                .map(|&index| {
                    if scale.has_note(MusicalNote::new(index)) {
                        index
                    } else {
                        i32::MAX
                    }
                })
                .collect();
            note_indices.sort_unstable();
            note_indices.dedup();
        }
        Self {
            is_chromatic: instrument.is_chromatic,
            note_indices,
            scale: scale.clone(),
        }
    }

    pub fn note_indices(&self) -> &[i32] {
        &self.note_indices
    }

    /// Number of strings in the scale, not counting the `i32::MAX` marker
    pub fn num_different_notes(&self) -> usize {
        match self.note_indices.last() {
            Some(&i32::MAX) => self.note_indices.len() - 1,
            Some(_) => self.note_indices.len(),
            None => 0,
        }
    }

    /// Position of `note` in the sorted list, if it is a string in the scale
    pub fn position_of(&self, note: MusicalNote) -> Option<usize> {
        if note.index == i32::MAX {
            return None;
        }
        self.note_indices.binary_search(&note.index).ok()
    }

    pub fn is_note_part_of_instrument(&self, note: Option<MusicalNote>) -> bool {
        match note {
            None => false,
            Some(note) if self.is_chromatic => self.scale.has_note(note),
            Some(note) => self.position_of(note).is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strings_are_sorted_and_distinct() {
        let instrument = Instrument {
            name: "test".to_string(),
            strings: vec![5, -3, 5, 1000, -3, 2000],
            is_chromatic: false,
        };
        let strings = SortedAndDistinctInstrumentStrings::new(&instrument, &MusicalScale::default());
        assert_eq!(strings.note_indices(), &[-3, 5, i32::MAX]);
        assert_eq!(strings.num_different_notes(), 2);
        assert!(strings.is_note_part_of_instrument(Some(MusicalNote::new(5))));
        assert!(!strings.is_note_part_of_instrument(Some(MusicalNote::new(4))));
        assert!(!strings.is_note_part_of_instrument(Some(MusicalNote::new(i32::MAX))));
        assert!(!strings.is_note_part_of_instrument(None));
    }

    #[test]
    fn test_chromatic_accepts_scale_notes() {
        let strings = SortedAndDistinctInstrumentStrings::new(&Instrument::chromatic(), &MusicalScale::default());
        assert_eq!(strings.num_different_notes(), 0);
        assert!(strings.is_note_part_of_instrument(Some(MusicalNote::new(3))));
        assert!(!strings.is_note_part_of_instrument(Some(MusicalNote::new(500))));
    }

    #[test]
    fn test_builtin_instruments() {
        assert_eq!(Instrument::by_name("Guitar"), Some(Instrument::guitar()));
        assert!(Instrument::by_name("theremin").is_none());
        let scale = MusicalScale::default();
        let names: Vec<String> = Instrument::guitar()
            .strings
            .iter()
            .map(|&i| scale.note_name(MusicalNote::new(i)))
            .collect();
        assert_eq!(names, vec!["E2", "A2", "D3", "G3", "B3", "E4"]);
    }
}
