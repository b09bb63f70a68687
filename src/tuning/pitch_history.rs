// PitchHistory - moving average with pitch change detection
//
// Values close to the current average are accepted directly. Other values are
// buffered as possibly faulty; once enough mutually consistent values are
// buffered they are accepted as a pitch change and the average restarts.

use std::collections::VecDeque;

/// Bounded history of accepted pitch values and their moving averages
#[derive(Debug, Clone)]
pub struct PitchHistory {
    size: usize,
    values: VecDeque<f32>,
    averaged_values: VecDeque<f32>,
    num_moving_average: usize,
    /// Accepted values since the last pitch change
    num_values_since_change: usize,
    max_num_faulty_values: usize,
    max_noise: f32,
    allowed_relative_deviation: f32,
    maybe_faulty_values: Vec<f32>,
    /// One inconsistent value tolerated while collecting faulty values
    faulty_value_exception: Option<f32>,
    num_values_since_last_update: u64,
}

impl PitchHistory {
    pub const DEFAULT_NUM_MOVING_AVERAGE: usize = 5;
    pub const DEFAULT_MAX_NUM_FAULTY_VALUES: usize = 3;
    pub const DEFAULT_MAX_NOISE: f32 = 0.1;
    pub const DEFAULT_ALLOWED_RELATIVE_DEVIATION: f32 = 0.1;

    /// History keeping at most `size` values
    pub fn new(size: usize) -> Self {
        Self {
            size: size.max(1),
            values: VecDeque::with_capacity(size),
            averaged_values: VecDeque::with_capacity(size),
            num_moving_average: Self::DEFAULT_NUM_MOVING_AVERAGE,
            num_values_since_change: 0,
            max_num_faulty_values: Self::DEFAULT_MAX_NUM_FAULTY_VALUES,
            max_noise: Self::DEFAULT_MAX_NOISE,
            allowed_relative_deviation: Self::DEFAULT_ALLOWED_RELATIVE_DEVIATION,
            maybe_faulty_values: Vec::with_capacity(Self::DEFAULT_MAX_NUM_FAULTY_VALUES),
            faulty_value_exception: None,
            num_values_since_last_update: 0,
        }
    }

    pub fn with_num_moving_average(mut self, num_moving_average: usize) -> Self {
        self.num_moving_average = num_moving_average.max(1);
        self
    }

    pub fn with_max_num_faulty_values(mut self, max_num_faulty_values: usize) -> Self {
        self.max_num_faulty_values = max_num_faulty_values.max(1);
        self
    }

    pub fn with_max_noise(mut self, max_noise: f32) -> Self {
        self.max_noise = max_noise;
        self
    }

    pub fn with_allowed_relative_deviation(mut self, allowed_relative_deviation: f32) -> Self {
        self.allowed_relative_deviation = allowed_relative_deviation;
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Change the maximum number of stored values, dropping the oldest
    pub fn resize(&mut self, size: usize) {
        self.size = size.max(1);
        while self.values.len() > self.size {
            self.values.pop_front();
        }
        while self.averaged_values.len() > self.size {
            self.averaged_values.pop_front();
        }
    }

    /// Append a new frequency
    ///
    /// Values with `noise > max_noise` and non-positive values are ignored.
    ///
    /// # Returns
    /// True if the history was updated.
    pub fn append_value(&mut self, value: f32, noise: f32) -> bool {
        if noise > self.max_noise || value <= 0.0 {
            self.num_values_since_last_update += 1;
            return false;
        }

        let accepted = match self.values.back() {
            None => true,
            Some(&reference) => self.is_within_allowed_range(value, reference),
        };

        let updated = if accepted {
            self.push(value);
            true
        } else {
            self.collect_maybe_faulty(value)
        };

        if updated {
            self.maybe_faulty_values.clear();
            self.faulty_value_exception = None;
            self.num_values_since_last_update = 0;
        } else {
            self.num_values_since_last_update += 1;
        }
        updated
    }

    // returns true if the buffered values were accepted as a pitch change
    fn collect_maybe_faulty(&mut self, value: f32) -> bool {
        match self.maybe_faulty_values.last().copied() {
            None => self.maybe_faulty_values.push(value),
            Some(last) if self.is_within_allowed_range(value, last) => {
                self.maybe_faulty_values.push(value);
                self.faulty_value_exception = None;
            }
            Some(_) => match self.faulty_value_exception.take() {
                None => self.faulty_value_exception = Some(value),
                // second inconsistent value restarts the collection
                Some(exception) => {
                    self.maybe_faulty_values.clear();
                    if self.is_within_allowed_range(value, exception) {
                        self.maybe_faulty_values.push(exception);
                    }
                    self.maybe_faulty_values.push(value);
                }
            },
        }

        if self.maybe_faulty_values.len() < self.max_num_faulty_values {
            return false;
        }
        self.num_values_since_change = 0;
        let changed = std::mem::take(&mut self.maybe_faulty_values);
        for &v in &changed {
            self.push(v);
        }
        self.maybe_faulty_values = changed;
        true
    }

    fn push(&mut self, value: f32) {
        if self.values.len() >= self.size {
            self.values.pop_front();
        }
        if self.averaged_values.len() >= self.size {
            self.averaged_values.pop_front();
        }
        self.values.push_back(value);
        self.num_values_since_change += 1;

        let count = self
            .num_moving_average
            .min(self.num_values_since_change)
            .min(self.values.len());
        let sum: f32 = self.values.iter().rev().take(count).sum();
        self.averaged_values.push_back(sum / count as f32);
    }

    fn is_within_allowed_range(&self, value: f32, reference: f32) -> bool {
        (value - reference).abs() <= self.allowed_relative_deviation * reference.abs()
    }

    /// Current moving average, 0 if nothing was accepted yet
    pub fn current_value(&self) -> f32 {
        self.averaged_values.back().copied().unwrap_or(0.0)
    }

    /// Accepted raw values, oldest first
    pub fn values(&self) -> impl Iterator<Item = f32> + '_ {
        self.values.iter().copied()
    }

    /// Moving averages, one per accepted value
    pub fn averaged_values(&self) -> impl Iterator<Item = f32> + '_ {
        self.averaged_values.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values appended since the history changed last
    pub fn num_values_since_last_update(&self) -> u64 {
        self.num_values_since_last_update
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.averaged_values.clear();
        self.maybe_faulty_values.clear();
        self.faulty_value_exception = None;
        self.num_values_since_change = 0;
        self.num_values_since_last_update = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_sizes_with_pitch_changes() {
        let mut history = PitchHistory::new(10)
            .with_max_num_faulty_values(2)
            .with_allowed_relative_deviation(0.03);

        assert!(history.append_value(440.0, 0.0));
        assert_eq!(history.len(), 1);

        // a change needs a second value to be confirmed
        assert!(!history.append_value(1000.0, 0.0));
        assert_eq!(history.len(), 1);
        assert!(history.append_value(1000.0, 0.0));
        assert_eq!(history.len(), 3);

        // one exceptional value in between is not accepted
        history.append_value(40.0, 0.0);
        history.append_value(1000.0, 0.0);
        assert_eq!(history.len(), 4);

        // one exception is allowed while changing back
        history.append_value(440.0, 0.0);
        assert_eq!(history.len(), 4);
        history.append_value(240.0, 0.0);
        history.append_value(440.0, 0.0);
        assert_eq!(history.len(), 6);
        assert_eq!(history.averaged_values().count(), history.len());

        for value in [441.0, 444.0, 450.0, 445.0] {
            assert!(history.append_value(value, 0.0));
        }
        assert_eq!(history.len(), 10);

        history.append_value(445.0, 0.0);
        assert_eq!(history.len(), 10);
        for _ in 0..3 {
            history.append_value(1000.0, 0.0);
        }
        assert_eq!(history.len(), 10);
        assert_eq!(history.averaged_values().count(), 10);
    }

    #[test]
    fn test_glide_is_accepted_at_every_step() {
        let mut history = PitchHistory::new(20);
        let mut value = 100.0f32;
        for step in 0..8 {
            assert!(history.append_value(value, 0.0), "step {} at {} Hz", step, value);
            value *= 1.08;
        }
        assert_eq!(history.len(), 8);
        assert_eq!(history.num_values_since_last_update(), 0);
    }

    #[test]
    fn test_constant_input_gives_constant_average() {
        let mut history = PitchHistory::new(20);
        for _ in 0..12 {
            history.append_value(196.0, 0.01);
            assert!((history.current_value() - 196.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_single_outlier_does_not_shift_average() {
        let mut history = PitchHistory::new(20);
        for _ in 0..5 {
            history.append_value(220.0, 0.0);
        }
        assert!(!history.append_value(440.0, 0.0));
        assert!((history.current_value() - 220.0).abs() < 1e-4);
        assert!(history.append_value(220.0, 0.0));
        assert!((history.current_value() - 220.0).abs() < 1e-4);
        assert_eq!(history.values().filter(|&v| v == 440.0).count(), 0);
    }

    #[test]
    fn test_three_consistent_values_change_pitch() {
        let mut history = PitchHistory::new(20);
        for _ in 0..5 {
            history.append_value(220.0, 0.0);
        }
        assert!(!history.append_value(330.0, 0.0));
        assert!(!history.append_value(331.0, 0.0));
        assert_eq!(history.num_values_since_last_update(), 2);
        assert!(history.append_value(330.5, 0.0));
        // the average restarts at the change
        assert!((history.current_value() - 330.5).abs() < 1e-3);
        assert_eq!(history.num_values_since_last_update(), 0);
    }

    #[test]
    fn test_noisy_values_are_ignored() {
        let mut history = PitchHistory::new(20).with_max_noise(0.2);
        assert!(!history.append_value(440.0, 0.5));
        assert!(!history.append_value(0.0, 0.0));
        assert!(history.is_empty());
        assert_eq!(history.num_values_since_last_update(), 2);
        assert_eq!(history.current_value(), 0.0);
    }

    #[test]
    fn test_resize_drops_oldest() {
        let mut history = PitchHistory::new(10);
        for i in 0..6 {
            history.append_value(100.0 + i as f32, 0.0);
        }
        history.resize(3);
        let values: Vec<f32> = history.values().collect();
        assert_eq!(values, vec![103.0, 104.0, 105.0]);
        assert_eq!(history.averaged_values().count(), 3);
    }
}
