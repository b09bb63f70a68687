// Frame slicing - overlapping analysis frames from a continuous stream
//
// Capture delivers blocks of arbitrary size. Every `hop` samples a new frame
// of `window_size` samples starts; it is filled from as many blocks as needed
// and emitted once complete. Frames come from a recycling pool so the slicer
// does not allocate in steady state.

use std::collections::VecDeque;

use super::pool::{Pooled, RecyclingPool};

/// One analysis frame
#[derive(Debug, Clone)]
pub struct SampleFrame {
    pub data: Vec<f32>,
    pub sample_rate: u32,
    /// Absolute stream position of `data[0]`
    pub frame_position: u64,
    // filled region is [min_level, max_level)
    min_level: usize,
    max_level: usize,
}

impl SampleFrame {
    pub fn new(size: usize, sample_rate: u32) -> Self {
        Self {
            data: vec![0.0; size],
            sample_rate,
            frame_position: 0,
            min_level: size,
            max_level: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn dt(&self) -> f32 {
        1.0 / self.sample_rate as f32
    }

    /// Prepare the frame for a new start position
    pub fn reset(&mut self, frame_position: u64) {
        self.frame_position = frame_position;
        self.min_level = self.size();
        self.max_level = 0;
    }

    /// Copy the part of `samples` which overlaps with this frame
    ///
    /// # Arguments
    /// * `block_position` - Absolute stream position of `samples[0]`
    pub fn add_data(&mut self, block_position: u64, samples: &[f32]) {
        let frame_start = self.frame_position;
        let frame_end = frame_start + self.size() as u64;
        let block_end = block_position + samples.len() as u64;

        let start = frame_start.max(block_position);
        let end = frame_end.min(block_end);
        if start >= end {
            return;
        }

        let destination = (start - frame_start) as usize..(end - frame_start) as usize;
        let source = (start - block_position) as usize..(end - block_position) as usize;
        self.min_level = self.min_level.min(destination.start);
        self.max_level = self.max_level.max(destination.end);
        self.data[destination].copy_from_slice(&samples[source]);
    }

    pub fn is_full(&self) -> bool {
        self.min_level == 0 && self.max_level == self.size()
    }
}

/// Number of samples between two frame starts
pub fn hop_size(window_size: usize, overlap: f32) -> usize {
    ((1.0 - overlap) * window_size as f32).round().max(1.0) as usize
}

/// Queue capacity needed to hold the frames produced by two blocks
pub fn required_queue_capacity(block_size: usize, window_size: usize, overlap: f32) -> usize {
    let hop = (window_size as f32 * (1.0 - overlap)) as usize;
    (2 * block_size / (1 + hop)).max(2)
}

/// Slices a stream of blocks into overlapping frames
#[derive(Debug)]
pub struct FrameSlicer {
    window_size: usize,
    hop: usize,
    sample_rate: u32,
    next_frame_position: Option<u64>,
    pending: VecDeque<Pooled<SampleFrame>>,
    pool: RecyclingPool<SampleFrame>,
}

impl FrameSlicer {
    /// # Arguments
    /// * `window_size` - Samples per frame
    /// * `overlap` - Fraction of a frame shared with the next one, in [0, 1)
    /// * `sample_rate` - Sample rate stored in the frames
    /// * `pool` - Pool the frames are taken from
    pub fn new(window_size: usize, overlap: f32, sample_rate: u32, pool: RecyclingPool<SampleFrame>) -> Self {
        let hop = hop_size(window_size, overlap);
        Self {
            window_size,
            hop,
            sample_rate,
            next_frame_position: None,
            pending: VecDeque::with_capacity(window_size / hop + 2),
            pool,
        }
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of frames started but not yet complete
    pub fn num_pending(&self) -> usize {
        self.pending.len()
    }

    /// Feed one block and emit all frames completed by it, in order
    ///
    /// The first block defines the position of the first frame.
    pub fn push_block<E>(&mut self, block_position: u64, samples: &[f32], mut emit: E)
    where
        E: FnMut(Pooled<SampleFrame>),
    {
        let block_end = block_position + samples.len() as u64;
        let mut next = self.next_frame_position.unwrap_or(block_position);

        while next < block_end {
            let (window_size, sample_rate) = (self.window_size, self.sample_rate);
            let mut frame = self.pool.get(
                || SampleFrame::new(window_size, sample_rate),
                |f| f.size() == window_size && f.sample_rate == sample_rate,
            );
            frame.reset(next);
            self.pending.push_back(frame);
            next += self.hop as u64;
        }
        self.next_frame_position = Some(next);

        for frame in self.pending.iter_mut() {
            frame.add_data(block_position, samples);
        }

        while self.pending.front().map_or(false, |f| f.is_full()) {
            if let Some(frame) = self.pending.pop_front() {
                emit(frame);
            }
        }
    }
}
