// Audio module - sample sources, frame slicing and the streaming primitives
// shared by the capture and analysis threads

pub mod buffer_pool;
pub mod capture;
pub mod frame;
pub mod latest_queue;
pub mod pool;
pub mod source;

// Re-export commonly used types for convenience
pub use buffer_pool::{
    AudioBuffer, BufferPool, BufferPoolChannels, DEFAULT_BUFFER_COUNT, DEFAULT_BUFFER_SIZE,
};
pub use capture::{spawn_capture_thread, CaptureEnd, CaptureThreadContext};
pub use frame::{hop_size, required_queue_capacity, FrameSlicer, SampleFrame};
pub use latest_queue::{LatestQueue, LatestQueueError};
pub use pool::{Pooled, RecyclingPool, Shared};
pub use source::{AudioSource, SourceRead};

// Microphone capture needs cpal, which is only a desktop dependency
cfg_if::cfg_if! {
    if #[cfg(not(target_os = "android"))] {
        pub mod engine_cpal;
        pub use engine_cpal::CpalSource;
    }
}
