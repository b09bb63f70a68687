// BufferPool - lock-free block pool with dual SPSC queues
//
// Carries capture blocks from the audio callback to the capture thread
// without allocating in the callback.
//
// Architecture:
// - DATA_QUEUE: audio callback pushes filled blocks, capture thread consumes
// - POOL_QUEUE: capture thread returns empty blocks, audio callback recycles
//
// Block flow:
// 1. Audio callback pops an empty block from POOL_QUEUE
// 2. Audio callback fills it with (mono) samples
// 3. Audio callback pushes the block to DATA_QUEUE
// 4. Capture thread pops the block, feeds the frame slicer
// 5. Capture thread pushes the empty block back to POOL_QUEUE

use rtrb::{Consumer, Producer};

/// Configuration constants for buffer pool
pub const DEFAULT_BUFFER_COUNT: usize = 16;
pub const DEFAULT_BUFFER_SIZE: usize = 2048;

/// Audio block type - pre-allocated vector of f32 samples
pub type AudioBuffer = Vec<f32>;

/// All four queue ends, as returned by [`BufferPool::new`]
pub struct BufferPoolChannels {
    /// Producer for sending filled blocks to the capture thread
    pub data_producer: Producer<AudioBuffer>,
    /// Consumer for receiving filled blocks in the capture thread
    pub data_consumer: Consumer<AudioBuffer>,
    /// Producer for returning empty blocks from the capture thread
    pub pool_producer: Producer<AudioBuffer>,
    /// Consumer for retrieving empty blocks in the audio callback
    pub pool_consumer: Consumer<AudioBuffer>,
}

/// Queue ends owned by the audio callback
pub struct AudioThreadChannels {
    pub data_producer: Producer<AudioBuffer>,
    pub pool_consumer: Consumer<AudioBuffer>,
}

/// Queue ends owned by the capture thread
pub struct CaptureThreadChannels {
    pub data_consumer: Consumer<AudioBuffer>,
    pub pool_producer: Producer<AudioBuffer>,
}

impl BufferPoolChannels {
    /// Split the channels between the audio callback and the capture thread
    pub fn split_for_threads(self) -> (AudioThreadChannels, CaptureThreadChannels) {
        (
            AudioThreadChannels {
                data_producer: self.data_producer,
                pool_consumer: self.pool_consumer,
            },
            CaptureThreadChannels {
                data_consumer: self.data_consumer,
                pool_producer: self.pool_producer,
            },
        )
    }
}

impl CaptureThreadChannels {
    /// Number of filled blocks waiting for the capture thread
    pub fn pending_blocks(&self) -> usize {
        self.data_consumer.slots()
    }
}

/// Lock-free block pool using dual SPSC ring buffers
///
/// Pre-allocates a fixed number of blocks and manages them through two
/// lock-free queues. All heap allocations happen during initialization.
///
/// # Example
/// ```ignore
/// let channels = BufferPool::new(16, 2048);
/// let (mut audio, mut capture) = channels.split_for_threads();
///
/// // In audio callback:
/// if let Ok(block) = audio.pool_consumer.pop() {
///     audio.data_producer.push(block).ok();
/// }
///
/// // In capture thread:
/// if let Ok(block) = capture.data_consumer.pop() {
///     capture.pool_producer.push(block).ok();
/// }
/// ```
pub struct BufferPool;

impl BufferPool {
    /// Create a new BufferPool with specified block count and size
    ///
    /// # Arguments
    /// * `buffer_count` - Number of blocks to pre-allocate (typical: 8-32)
    /// * `buffer_size` - Capacity of each block in f32 samples
    ///
    /// # Panics
    /// Panics if buffer_count is 0 or buffer_size is 0
    #[allow(clippy::new_ret_no_self)]
    pub fn new(buffer_count: usize, buffer_size: usize) -> BufferPoolChannels {
        assert!(buffer_count > 0, "buffer_count must be greater than 0");
        assert!(buffer_size > 0, "buffer_size must be greater than 0");

        let (mut pool_producer, pool_consumer) = rtrb::RingBuffer::new(buffer_count);
        let (data_producer, data_consumer) = rtrb::RingBuffer::new(buffer_count);

        for _ in 0..buffer_count {
            let buffer = vec![0.0_f32; buffer_size];
            // the ring holds exactly buffer_count slots
            let _ = pool_producer.push(buffer);
        }

        BufferPoolChannels {
            data_producer,
            data_consumer,
            pool_producer,
            pool_consumer,
        }
    }
}
