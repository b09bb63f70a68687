// Outlier removing smoother
//
// Several ring buffers collect values in parallel. A value goes into the
// first buffer which accepts it, so when the pitch changes a second buffer
// starts averaging the new pitch while the first one still holds the old
// one. Buffers with too many successive outliers are cleared.

/// Ring buffer computing the mean of the accepted values
#[derive(Debug, Clone)]
pub struct OutlierRemovingSmoothingBuffer {
    values: Vec<f32>,
    index_zero: usize,
    size: usize,
    mean: f32,
    num_successive_outliers: usize,
    min_value: f32,
    max_value: f32,
    max_relative_deviation: f32,
    max_num_successive_outliers: usize,
}

impl OutlierRemovingSmoothingBuffer {
    /// # Arguments
    /// * `max_size` - Number of values the mean is computed over
    /// * `min_value`, `max_value` - Values outside are always outliers
    /// * `max_relative_deviation` - Allowed relative deviation from the mean
    /// * `max_num_successive_outliers` - The buffer is cleared after more outliers in a row
    pub fn new(
        max_size: usize,
        min_value: f32,
        max_value: f32,
        max_relative_deviation: f32,
        max_num_successive_outliers: usize,
    ) -> Self {
        Self {
            values: vec![0.0; max_size],
            index_zero: 0,
            size: 0,
            mean: 0.0,
            num_successive_outliers: 0,
            min_value,
            max_value,
            max_relative_deviation,
            max_num_successive_outliers,
        }
    }

    pub fn clear(&mut self) {
        self.index_zero = 0;
        self.size = 0;
        self.mean = 0.0;
        self.num_successive_outliers = 0;
    }

    /// Add `value` if it is no outlier
    ///
    /// # Returns
    /// True if the value was added, otherwise the outlier count is incremented.
    pub fn append(&mut self, value: f32) -> bool {
        if self.values.is_empty() {
            return false;
        }
        if value < self.min_value || value > self.max_value || self.deviation(value) > self.max_relative_deviation {
            self.increment_outlier_count();
            return false;
        }

        let capacity = self.values.len();
        let index = (self.index_zero + self.size) % capacity;
        self.values[index] = value;
        if self.size == capacity {
            self.index_zero = (self.index_zero + 1) % capacity;
        } else {
            self.size += 1;
        }
        self.num_successive_outliers = 0;
        self.mean = self.compute_mean();
        true
    }

    /// Count an outlier without offering a value
    pub fn increment_outlier_count(&mut self) {
        self.num_successive_outliers += 1;
        if self.num_successive_outliers > self.max_num_successive_outliers {
            self.clear();
        }
    }

    /// Mean of the stored values, 0 if empty
    pub fn mean(&self) -> f32 {
        self.mean
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn num_successive_outliers(&self) -> usize {
        self.num_successive_outliers
    }

    fn compute_mean(&self) -> f32 {
        let capacity = self.values.len();
        let sum: f32 = (0..self.size)
            .map(|i| self.values[(self.index_zero + i) % capacity])
            .sum();
        sum / self.size as f32
    }

    fn deviation(&self, value: f32) -> f32 {
        if self.size == 0 {
            0.0
        } else {
            (value - self.mean).abs() / self.mean.abs()
        }
    }
}

/// Online smoother over several competing buffers
#[derive(Debug, Clone)]
pub struct OutlierRemovingSmoother {
    buffers: Vec<OutlierRemovingSmoothingBuffer>,
    min_num_values_for_valid_mean: usize,
    smoothed_value: f32,
}

impl OutlierRemovingSmoother {
    pub const DEFAULT_RELATIVE_DEVIATION: f32 = 0.1;
    pub const DEFAULT_MAX_NUM_SUCCESSIVE_OUTLIERS: usize = 1;
    pub const DEFAULT_MIN_NUM_VALUES_FOR_VALID_MEAN: usize = 2;
    pub const DEFAULT_NUM_BUFFERS: usize = 3;

    /// Smoother with the default outlier settings
    pub fn with_defaults(size: usize, min_value: f32, max_value: f32) -> Self {
        Self::new(
            size,
            min_value,
            max_value,
            Self::DEFAULT_RELATIVE_DEVIATION,
            Self::DEFAULT_MAX_NUM_SUCCESSIVE_OUTLIERS,
            Self::DEFAULT_MIN_NUM_VALUES_FOR_VALID_MEAN,
            Self::DEFAULT_NUM_BUFFERS,
        )
    }

    /// # Arguments
    /// * `size` - Number of values the smoothed value is computed over
    /// * `min_value`, `max_value` - Values outside are outliers
    /// * `relative_deviation_to_be_an_outlier` - Allowed relative deviation from a buffer mean
    /// * `max_num_successive_outliers` - A buffer is cleared after more outliers in a row
    /// * `min_num_values_for_valid_mean` - Values needed before a mean is reported (at most `size`)
    /// * `num_buffers` - Buffers collecting values in parallel
    pub fn new(
        size: usize,
        min_value: f32,
        max_value: f32,
        relative_deviation_to_be_an_outlier: f32,
        max_num_successive_outliers: usize,
        min_num_values_for_valid_mean: usize,
        num_buffers: usize,
    ) -> Self {
        let buffers = (0..num_buffers.max(1))
            .map(|_| {
                OutlierRemovingSmoothingBuffer::new(
                    size,
                    min_value,
                    max_value,
                    relative_deviation_to_be_an_outlier,
                    max_num_successive_outliers,
                )
            })
            .collect();
        Self {
            buffers,
            min_num_values_for_valid_mean: min_num_values_for_valid_mean.min(size),
            smoothed_value: 0.0,
        }
    }

    /// Add a value
    ///
    /// # Returns
    /// The new smoothed value, or 0 if there is none for this value. The last
    /// valid value stays available in [`smoothed_value`](Self::smoothed_value).
    pub fn append(&mut self, value: f32) -> f32 {
        let mut appended = false;
        for buffer in self.buffers.iter_mut() {
            if appended {
                buffer.increment_outlier_count();
            } else {
                appended = buffer.append(value);
            }
        }

        // stable: buffers of equal size keep their order
        if self.buffers[0].size() < self.min_num_values_for_valid_mean {
            self.buffers.sort_by(|a, b| b.size().cmp(&a.size()));
        }

        let leading = &self.buffers[0];
        if leading.num_successive_outliers() == 0 && leading.size() >= self.min_num_values_for_valid_mean {
            self.smoothed_value = leading.mean();
            self.smoothed_value
        } else {
            0.0
        }
    }

    /// Last valid smoothed value, 0 if there was none yet
    pub fn smoothed_value(&self) -> f32 {
        self.smoothed_value
    }

    pub fn clear(&mut self) {
        self.buffers.iter_mut().for_each(OutlierRemovingSmoothingBuffer::clear);
        self.smoothed_value = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_rejects_and_clears() {
        let mut buffer = OutlierRemovingSmoothingBuffer::new(3, 10.0, 100.0, 0.3, 2);

        assert!(!buffer.append(150.0));
        assert!(!buffer.append(1.0));
        assert_eq!(buffer.num_successive_outliers(), 2);
        assert_eq!(buffer.size(), 0);

        assert!(buffer.append(50.0));
        assert_eq!(buffer.num_successive_outliers(), 0);
        assert!(buffer.append(60.0));
        assert!(buffer.append(55.0));
        assert!((buffer.mean() - 55.0).abs() < 1e-4);

        // ring buffer drops the oldest value
        assert!(buffer.append(65.0));
        assert!((buffer.mean() - 60.0).abs() < 1e-4);
        assert!(buffer.append(61.0));
        assert!((buffer.mean() - (55.0 + 65.0 + 61.0) / 3.0).abs() < 1e-4);

        assert!(!buffer.append(15.0));
        assert!(!buffer.append(95.0));
        assert_eq!(buffer.size(), 3);
        assert_eq!(buffer.num_successive_outliers(), 2);

        // third outlier in a row exceeds the limit
        assert!(!buffer.append(95.0));
        assert_eq!(buffer.size(), 0);
        assert_eq!(buffer.mean(), 0.0);
        assert_eq!(buffer.num_successive_outliers(), 0);
    }

    #[test]
    fn test_smoother_switches_to_new_value() {
        let mut smoother = OutlierRemovingSmoother::new(3, 10.0, 100.0, 0.3, 2, 2, 3);
        assert_eq!(smoother.smoothed_value(), 0.0);

        // two values are needed for a mean
        assert_eq!(smoother.append(50.0), 0.0);
        assert_eq!(smoother.append(60.0), 55.0);
        assert!((smoother.append(55.0) - 55.0).abs() < 1e-4);

        assert_eq!(smoother.append(90.0), 0.0);
        assert!((smoother.smoothed_value() - 55.0).abs() < 1e-4);
        assert_eq!(smoother.append(92.0), 0.0);
        assert!((smoother.smoothed_value() - 55.0).abs() < 1e-4);

        // the first buffer is cleared now, the second one takes over
        assert!((smoother.append(91.0) - 91.0).abs() < 1e-4);
        assert!((smoother.smoothed_value() - 91.0).abs() < 1e-4);

        smoother.append(20.0);
        let value = smoother.append(95.0);
        assert!((value - (92.0 + 91.0 + 95.0) / 3.0).abs() < 1e-4);

        smoother.append(50.0);
        smoother.append(22.0);
        smoother.append(52.0);
        assert!((smoother.append(21.0) - 21.0).abs() < 1e-4);
    }

    #[test]
    fn test_constant_input_is_returned_unchanged() {
        let mut smoother = OutlierRemovingSmoother::with_defaults(5, 16.0, 16000.0);
        let results: Vec<f32> = (0..8).map(|_| smoother.append(329.63)).collect();
        assert_eq!(results[0], 0.0);
        for value in &results[1..] {
            assert!((value - 329.63).abs() < 1e-3);
        }
    }

    #[test]
    fn test_zero_sized_smoother_never_reports() {
        let mut smoother = OutlierRemovingSmoother::new(0, 10.0, 100.0, 0.3, 2, 2, 3);
        assert_eq!(smoother.append(50.0), 0.0);
        assert_eq!(smoother.append(50.0), 0.0);
    }
}
