// Capture thread - from an AudioSource to complete analysis frames
//
// Blocks are read from the source, sliced into overlapping frames and
// pushed to the latest-wins frame queue. Capture never waits for analysis:
// frames evicted on overflow are released to the frame pool right away.
// The queue is closed when capture ends so the analysis thread can drain
// it and exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::frame::{FrameSlicer, SampleFrame};
use super::pool::RecyclingPool;
use super::source::{AudioSource, SourceRead};
use crate::analysis::FrameQueue;
use crate::error::{log_audio_error, AudioError};
use crate::telemetry::{self, DiagnosticError, LifecyclePhase};

/// Everything the capture thread needs, moved into the thread on spawn
pub struct CaptureThreadContext {
    pub source: Box<dyn AudioSource>,
    pub frames: Arc<FrameQueue>,
    pub running: Arc<AtomicBool>,
    pub block_size: usize,
    pub window_size: usize,
    pub overlap: f32,
    /// Maximum number of idle frames kept for reuse
    pub frame_pool_capacity: usize,
}

/// Why the capture loop ended
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEnd {
    Stopped,
    SourceExhausted,
    SourceFailed(AudioError),
}

struct CaptureWorker {
    source: Box<dyn AudioSource>,
    frames: Arc<FrameQueue>,
    running: Arc<AtomicBool>,
    slicer: FrameSlicer,
    frame_pool: RecyclingPool<SampleFrame>,
    block: Vec<f32>,
    position: u64,
}

impl CaptureWorker {
    fn new(context: CaptureThreadContext) -> Self {
        let frame_pool = RecyclingPool::new(context.frame_pool_capacity);
        let slicer = FrameSlicer::new(
            context.window_size,
            context.overlap,
            context.source.sample_rate(),
            frame_pool.clone(),
        );
        Self {
            source: context.source,
            frames: context.frames,
            running: context.running,
            slicer,
            frame_pool,
            block: vec![0.0; context.block_size.max(1)],
            position: 0,
        }
    }

    fn capture_loop(&mut self) -> CaptureEnd {
        while self.running.load(Ordering::SeqCst) {
            let num_samples = match self.source.read_block(&mut self.block) {
                Ok(SourceRead::Samples(n)) => n.min(self.block.len()),
                Ok(SourceRead::Exhausted) => return CaptureEnd::SourceExhausted,
                Err(err) => return CaptureEnd::SourceFailed(err),
            };
            if num_samples == 0 {
                continue;
            }

            let frames = &self.frames;
            self.slicer
                .push_block(self.position, &self.block[..num_samples], |frame| {
                    // an evicted frame drops here and returns to the pool
                    drop(frames.push(frame));
                });
            self.position += num_samples as u64;

            let occupancy = self.frames.len() as f32 / self.frames.capacity() as f32 * 100.0;
            telemetry::hub().record_buffer_occupancy("frame_queue", occupancy);
        }
        CaptureEnd::Stopped
    }

    fn run(mut self) -> CaptureEnd {
        tracing::info!(
            "[CaptureThread] Capturing from {} at {} Hz, hop {} samples",
            self.source.description(),
            self.source.sample_rate(),
            self.slicer.hop()
        );

        let end = self.capture_loop();
        match &end {
            CaptureEnd::Stopped => {
                tracing::info!("[CaptureThread] Shutdown flag set, exiting");
            }
            CaptureEnd::SourceExhausted => {
                tracing::info!(
                    "[CaptureThread] Source exhausted after {} samples",
                    self.position
                );
                telemetry::hub().record_lifecycle(LifecyclePhase::SourceExhausted);
            }
            CaptureEnd::SourceFailed(err) => {
                log_audio_error(err, "capture_thread");
                telemetry::hub().record_error(DiagnosticError::SourceRead, err.to_string());
            }
        }

        self.frames.close();
        telemetry::hub().record_pool_usage(
            "sample_frames",
            self.frame_pool.in_use(),
            self.frame_pool.available(),
        );
        end
    }
}

/// Spawn the capture thread
///
/// The thread ends when the running flag is cleared, the source is
/// exhausted or fails; the frame queue is closed in every case.
///
/// # Errors
/// Returns `AudioError::StreamFailure` if the OS refuses to spawn the thread.
pub fn spawn_capture_thread(context: CaptureThreadContext) -> Result<JoinHandle<CaptureEnd>, AudioError> {
    let worker = CaptureWorker::new(context);
    thread::Builder::new()
        .name("pitch-capture".to_string())
        .spawn(move || worker.run())
        .map_err(|err| AudioError::StreamFailure {
            reason: format!("failed to spawn capture thread: {}", err),
        })
}
