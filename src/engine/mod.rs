//! PitchEngine: lifecycle of the capture and analysis threads.
//!
//! `start` wires an [`AudioSource`] to a capture thread, a latest-wins frame
//! queue and the analysis thread; results fan out to any number of
//! subscribers over a `tokio::sync::broadcast` channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use crate::analysis::{spawn_analysis_thread, AnalysisThreadContext, FrameQueue, UserTargetNote};
use crate::audio::{spawn_capture_thread, AudioSource, CaptureEnd, CaptureThreadContext};
use crate::config::AppConfig;
use crate::error::{log_audio_error, AnalysisError, AudioError};
use crate::telemetry::{self, LifecyclePhase};
use crate::tuning::{EvaluationResult, MusicalNote};

/// Capacity of the result broadcast channel
const RESULT_CHANNEL_CAPACITY: usize = 64;
/// Analysis progress is logged every n frames
const LOG_EVERY_N_FRAMES: u64 = 100;

/// Threads and shared state of a running engine
struct RunningState {
    running: Arc<AtomicBool>,
    frames: Arc<FrameQueue>,
    capture: JoinHandle<CaptureEnd>,
    analysis: JoinHandle<()>,
}

impl RunningState {
    fn is_alive(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.analysis.is_finished()
    }

    /// Join capture first, then analysis
    fn join(self) -> Result<CaptureEnd, AudioError> {
        let capture_end = self.capture.join().map_err(|_| AudioError::StreamFailure {
            reason: "capture thread panicked".to_string(),
        });
        // analysis cannot outlive a closed queue
        self.frames.close();
        let analysis_end = self.analysis.join().map_err(|_| AudioError::StreamFailure {
            reason: "analysis thread panicked".to_string(),
        });
        telemetry::hub().record_lifecycle(LifecyclePhase::Stopped);

        let capture_end = capture_end?;
        analysis_end?;
        Ok(capture_end)
    }
}

/// Real-time pitch tracking engine
pub struct PitchEngine {
    config: AppConfig,
    state: Mutex<Option<RunningState>>,
    result_tx: broadcast::Sender<EvaluationResult>,
    user_target_note: UserTargetNote,
}

impl PitchEngine {
    /// Create an engine for a validated configuration
    ///
    /// # Errors
    /// Returns the `AnalysisError` reported by [`AppConfig::validate`].
    pub fn new(config: AppConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        let (result_tx, _) = broadcast::channel(RESULT_CHANNEL_CAPACITY);
        Ok(Self {
            config,
            state: Mutex::new(None),
            result_tx,
            user_target_note: Arc::new(Mutex::new(None)),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Start capturing from `source`
    ///
    /// # Errors
    /// - `AudioError::AlreadyRunning` if the engine was started and not stopped
    /// - `AudioError::SourceFailed` for a source without sample rate
    /// - `AudioError::StreamFailure` if a thread cannot be spawned
    pub fn start(&self, source: Box<dyn AudioSource>) -> Result<(), AudioError> {
        let mut guard = self.lock_state()?;
        self.check_not_running(&guard)?;

        if source.sample_rate() == 0 {
            let err = AudioError::SourceFailed {
                reason: format!("{} reports a sample rate of 0", source.description()),
            };
            log_audio_error(&err, "start");
            return Err(err);
        }

        let detection = &self.config.detection;
        let frames = Arc::new(FrameQueue::new(self.config.queue_capacity()));
        let running = Arc::new(AtomicBool::new(true));

        let analysis = spawn_analysis_thread(AnalysisThreadContext {
            frames: Arc::clone(&frames),
            detection: detection.clone(),
            evaluation: self.config.evaluation.clone(),
            pool_capacity: self.config.stream.pool_capacity,
            result_sender: self.result_tx.clone(),
            running: Arc::clone(&running),
            user_target_note: Arc::clone(&self.user_target_note),
            log_every_n_frames: LOG_EVERY_N_FRAMES,
        })
        .map_err(|err| {
            let err = AudioError::StreamFailure {
                reason: err.to_string(),
            };
            log_audio_error(&err, "start");
            err
        })?;

        let capture = spawn_capture_thread(CaptureThreadContext {
            source,
            frames: Arc::clone(&frames),
            running: Arc::clone(&running),
            block_size: self.config.stream.block_size,
            window_size: detection.window_size,
            overlap: detection.overlap,
            frame_pool_capacity: self.config.stream.pool_capacity,
        });
        let capture = match capture {
            Ok(capture) => capture,
            Err(err) => {
                log_audio_error(&err, "start");
                running.store(false, Ordering::SeqCst);
                frames.close();
                let _ = analysis.join();
                return Err(err);
            }
        };

        telemetry::hub().record_lifecycle(LifecyclePhase::Started);
        tracing::info!(
            "[PitchEngine] Started with window {} (overlap {}), queue capacity {}",
            detection.window_size,
            detection.overlap,
            frames.capacity()
        );

        *guard = Some(RunningState {
            running,
            frames,
            capture,
            analysis,
        });
        Ok(())
    }

    /// Stop the engine: clear the running flag, then join capture and
    /// analysis
    ///
    /// # Errors
    /// - `AudioError::NotRunning` if the engine was never started
    /// - `AudioError::StreamFailure` if a worker thread panicked
    pub fn stop(&self) -> Result<CaptureEnd, AudioError> {
        let state = self.take_state("stop")?;
        state.running.store(false, Ordering::SeqCst);
        let end = state.join()?;
        tracing::info!("[PitchEngine] Stopped");
        Ok(end)
    }

    /// Wait until the source is exhausted and every frame is analyzed
    ///
    /// Only returns for finite sources (files, synthetic signals) or after
    /// an error; use [`PitchEngine::stop`] for live input.
    ///
    /// # Errors
    /// Same as [`PitchEngine::stop`].
    pub fn wait_until_finished(&self) -> Result<CaptureEnd, AudioError> {
        let state = self.take_state("wait_until_finished")?;
        let end = state.join()?;
        tracing::info!("[PitchEngine] Finished: {:?}", end);
        Ok(end)
    }

    /// True while the threads are running and the stream was not stopped by
    /// an error
    pub fn is_running(&self) -> bool {
        self.lock_state()
            .map(|guard| guard.as_ref().map_or(false, RunningState::is_alive))
            .unwrap_or(false)
    }

    /// Subscribe to evaluation results
    pub fn subscribe(&self) -> broadcast::Receiver<EvaluationResult> {
        self.result_tx.subscribe()
    }

    /// Evaluation results as an async stream
    ///
    /// Results missed by a slow consumer are skipped with a warning; the
    /// stream ends when the engine is dropped.
    pub fn result_stream(&self) -> impl Stream<Item = EvaluationResult> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(|result| async move {
            match result {
                Ok(result) => Some(result),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!("[PitchEngine] Result stream lagged, {} results skipped", skipped);
                    None
                }
            }
        })
    }

    /// Fix the target note, `None` returns to automatic detection
    pub fn set_target_note(&self, note: Option<MusicalNote>) {
        *self
            .user_target_note
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = note;
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, Option<RunningState>>, AudioError> {
        self.state.lock().map_err(|_| {
            let err = AudioError::LockPoisoned {
                component: "pitch_engine".to_string(),
            };
            log_audio_error(&err, "lock_state");
            err
        })
    }

    fn check_not_running(&self, guard: &Option<RunningState>) -> Result<(), AudioError> {
        if guard.is_some() {
            let err = AudioError::AlreadyRunning;
            log_audio_error(&err, "check_not_running");
            return Err(err);
        }
        Ok(())
    }

    fn take_state(&self, context: &str) -> Result<RunningState, AudioError> {
        self.lock_state()?.take().ok_or_else(|| {
            let err = AudioError::NotRunning;
            log_audio_error(&err, context);
            err
        })
    }
}

impl Drop for PitchEngine {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(state) = state {
            state.running.store(false, Ordering::SeqCst);
            let _ = state.join();
        }
    }
}
