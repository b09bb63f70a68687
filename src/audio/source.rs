// AudioSource - where the capture thread gets its samples from
//
// Implementations: CpalSource (desktop microphone), SyntheticSource and
// WavSource (test fixtures). Sources deliver mono f32 samples; the capture
// thread tracks absolute stream positions.

use crate::error::AudioError;

/// Outcome of one read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRead {
    /// Number of samples written to the start of the block, may be 0 if
    /// no data arrived in time
    Samples(usize),
    /// The source will never deliver samples again
    Exhausted,
}

/// Mono sample source driven by the capture thread
pub trait AudioSource: Send {
    /// Sample rate of the delivered samples in Hz
    fn sample_rate(&self) -> u32;

    /// Fill the start of `block` with the next samples
    ///
    /// May block for a short time waiting for data. Returning
    /// `SourceRead::Samples(0)` lets the capture thread check its shutdown
    /// flag.
    ///
    /// # Errors
    /// Returns `AudioError` if the underlying device or file failed.
    fn read_block(&mut self, block: &mut [f32]) -> Result<SourceRead, AudioError>;

    /// Short description used in log messages
    fn description(&self) -> String {
        "audio source".to_string()
    }
}

impl AudioSource for Box<dyn AudioSource> {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn read_block(&mut self, block: &mut [f32]) -> Result<SourceRead, AudioError> {
        (**self).read_block(block)
    }

    fn description(&self) -> String {
        (**self).description()
    }
}
