// Analysis module - DSP pipeline for pitch detection
//
// This module orchestrates the per frame analysis. Frames sliced by the
// capture thread arrive through a latest-wins queue; the analysis thread
// turns each one into CollectedResults and an EvaluationResult which is
// broadcast to subscribers.
//
// Architecture:
// - AnalysisThread: main loop consuming frames from the frame queue
// - Pipeline: correlation + spectrum → correlation based frequency →
//   harmonics → statistics → evaluator (smoothing, target note)
// - Output: EvaluationResult sent via tokio broadcast channel

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::audio::frame::SampleFrame;
use crate::audio::latest_queue::{LatestQueue, LatestQueueError};
use crate::audio::pool::Pooled;
use crate::config::{DetectionConfig, EvaluationConfig};
use crate::error::{log_analysis_error, AnalysisError};
use crate::telemetry::{self, DiagnosticError};
use crate::tuning::{EvaluationResult, FrequencyEvaluator, MusicalNote};

pub mod collector;
pub mod correlation_frequency;
pub mod features;
pub mod harmonics;
pub mod inharmonicity;
pub mod peak_frequency;
pub mod statistics;
pub mod weighting;

use collector::FrequencyDetectionResultCollector;

/// Queue of complete frames between capture and analysis
pub type FrameQueue = LatestQueue<Pooled<SampleFrame>>;

/// Target note chosen by the user, shared with the analysis thread
pub type UserTargetNote = Arc<Mutex<Option<MusicalNote>>>;

/// How long the analysis thread waits for a frame before rechecking the
/// running flag
const POP_TIMEOUT: Duration = Duration::from_millis(20);

/// Everything the analysis thread needs, moved into the thread on spawn
pub struct AnalysisThreadContext {
    pub frames: Arc<FrameQueue>,
    pub detection: DetectionConfig,
    pub evaluation: EvaluationConfig,
    pub pool_capacity: usize,
    pub result_sender: broadcast::Sender<EvaluationResult>,
    pub running: Arc<AtomicBool>,
    pub user_target_note: UserTargetNote,
    /// Log a progress line every n frames, 0 disables it
    pub log_every_n_frames: u64,
}

struct AnalysisWorker {
    frames: Arc<FrameQueue>,
    collector: FrequencyDetectionResultCollector,
    evaluator: FrequencyEvaluator,
    result_sender: broadcast::Sender<EvaluationResult>,
    running: Arc<AtomicBool>,
    user_target_note: UserTargetNote,
    log_every_n_frames: u64,
    frames_processed: u64,
    last_overflow_count: u64,
}

impl AnalysisWorker {
    fn new(context: AnalysisThreadContext) -> Self {
        let collector = FrequencyDetectionResultCollector::new(context.detection, context.pool_capacity);
        let evaluator = FrequencyEvaluator::new(&context.evaluation);
        Self {
            frames: context.frames,
            collector,
            evaluator,
            result_sender: context.result_sender,
            running: context.running,
            user_target_note: context.user_target_note,
            log_every_n_frames: context.log_every_n_frames,
            frames_processed: 0,
            last_overflow_count: 0,
        }
    }

    fn user_target_note(&self) -> Option<MusicalNote> {
        *self
            .user_target_note
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn process_frame(&mut self, frame: Pooled<SampleFrame>) -> Result<(), AnalysisError> {
        let started = Instant::now();
        let results = self.collector.collect_results(&frame)?;
        // the frame goes back to the slicer's pool before evaluation
        drop(frame);

        let user_target_note = self.user_target_note();
        let evaluation = self.evaluator.evaluate(&results, user_target_note);
        let processing_ms = started.elapsed().as_secs_f32() * 1000.0;

        telemetry::hub().record_frame(
            results.frame_position(),
            evaluation.smoothed_frequency,
            results.noise,
            processing_ms,
        );

        let overflow_count = self.frames.overflow_count();
        if overflow_count != self.last_overflow_count {
            tracing::debug!(
                "[AnalysisThread] Frame queue overflowed, {} frames dropped so far",
                overflow_count
            );
            telemetry::hub().record_queue_overflow(overflow_count);
            self.last_overflow_count = overflow_count;
        }

        self.frames_processed += 1;
        if self.log_every_n_frames > 0 && self.frames_processed % self.log_every_n_frames == 0 {
            let pool = self.collector.pool();
            tracing::info!(
                "[AnalysisThread] {} frames analyzed, frequency {:.2} Hz, noise {:.3}, results in use {}",
                self.frames_processed,
                evaluation.smoothed_frequency,
                results.noise,
                pool.in_use()
            );
            telemetry::hub().record_pool_usage("collected_results", pool.in_use(), pool.available());
        }

        // no receivers is not an error, results are simply dropped
        let _ = self.result_sender.send(evaluation);
        Ok(())
    }

    fn run(mut self) {
        tracing::info!("[AnalysisThread] Starting analysis loop");

        loop {
            if !self.running.load(Ordering::SeqCst) {
                tracing::info!("[AnalysisThread] Shutdown flag set, exiting");
                break;
            }

            let frame = match self.frames.pop_timeout(POP_TIMEOUT) {
                Ok(frame) => frame,
                Err(LatestQueueError::Empty) => continue,
                Err(LatestQueueError::Closed) => {
                    tracing::info!("[AnalysisThread] Frame queue closed and drained, exiting");
                    break;
                }
            };

            if let Err(err) = self.process_frame(frame) {
                log_analysis_error(&err, "analysis_thread");
                telemetry::hub().record_error(DiagnosticError::Analysis, err.to_string());
                // configuration errors do not heal, stop the whole stream
                self.running.store(false, Ordering::SeqCst);
                self.frames.close();
                break;
            }
        }

        // frames still queued go back to their pool
        drop(self.frames.drain());
        tracing::info!(
            "[AnalysisThread] Analysis loop finished after {} frames",
            self.frames_processed
        );
    }
}

/// Spawn the analysis thread
///
/// The thread exits when the frame queue is closed and drained, when the
/// running flag is cleared, or after an `AnalysisError`.
///
/// # Errors
/// Returns `AnalysisError::WorkerFailed` if the OS refuses to spawn the thread.
pub fn spawn_analysis_thread(context: AnalysisThreadContext) -> Result<JoinHandle<()>, AnalysisError> {
    let worker = AnalysisWorker::new(context);
    thread::Builder::new()
        .name("pitch-analysis".to_string())
        .spawn(move || worker.run())
        .map_err(|err| AnalysisError::WorkerFailed {
            reason: format!("failed to spawn analysis thread: {}", err),
        })
}
