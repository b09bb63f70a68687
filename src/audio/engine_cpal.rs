// CpalSource - desktop microphone input via cpal
//
// The cpal stream lives on its own thread because streams are not Send on
// every platform. The input callback copies the first channel into blocks
// taken from the lock-free BufferPool; the capture thread reads those
// blocks through the AudioSource interface.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::buffer_pool::{AudioBuffer, AudioThreadChannels, BufferPool, CaptureThreadChannels};
use super::source::{AudioSource, SourceRead};
use crate::error::{log_audio_error, AudioError};
use crate::telemetry::{self, DiagnosticError};

/// How long read_block waits for the callback before returning no samples
const READ_POLL_INTERVAL: Duration = Duration::from_millis(2);
const READ_POLLS_PER_CALL: usize = 10;

pub struct CpalSource {
    channels: CaptureThreadChannels,
    buffer_count: usize,
    sample_rate: u32,
    device_name: String,
    /// Block currently being handed out and the read offset into it
    current: Option<(AudioBuffer, usize)>,
    dropped_blocks: Arc<AtomicU64>,
    last_dropped_blocks: u64,
    stream_running: Arc<AtomicBool>,
    stream_thread: Option<JoinHandle<()>>,
}

impl CpalSource {
    /// Open the default input device
    ///
    /// # Arguments
    /// * `buffer_count` - Number of pre-allocated callback blocks
    /// * `buffer_size` - Capacity of each block in samples
    ///
    /// # Errors
    /// Returns `AudioError::StreamOpenFailed` if there is no usable input
    /// device and `AudioError::HardwareError` if the stream does not start.
    pub fn open_default(buffer_count: usize, buffer_size: usize) -> Result<Self, AudioError> {
        let (audio_channels, capture_channels) = BufferPool::new(buffer_count, buffer_size).split_for_threads();
        let dropped_blocks = Arc::new(AtomicU64::new(0));
        let stream_running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread_running = Arc::clone(&stream_running);
        let thread_dropped = Arc::clone(&dropped_blocks);
        let stream_thread = thread::Builder::new()
            .name("pitch-cpal-stream".to_string())
            .spawn(move || run_stream(audio_channels, buffer_size, thread_dropped, thread_running, ready_tx))
            .map_err(|err| AudioError::StreamFailure {
                reason: format!("failed to spawn stream thread: {}", err),
            })?;

        let ready = ready_rx.recv().unwrap_or_else(|_| {
            Err(AudioError::StreamFailure {
                reason: "stream thread ended before the stream started".to_string(),
            })
        });
        match ready {
            Ok((sample_rate, device_name)) => {
                tracing::info!(
                    "[CpalSource] Input stream running on '{}' at {} Hz",
                    device_name,
                    sample_rate
                );
                Ok(Self {
                    channels: capture_channels,
                    buffer_count,
                    sample_rate,
                    device_name,
                    current: None,
                    dropped_blocks,
                    last_dropped_blocks: 0,
                    stream_running,
                    stream_thread: Some(stream_thread),
                })
            }
            Err(err) => {
                log_audio_error(&err, "open_default");
                let _ = stream_thread.join();
                Err(err)
            }
        }
    }

    fn next_block(&mut self) -> Option<(AudioBuffer, usize)> {
        for _ in 0..READ_POLLS_PER_CALL {
            if let Ok(block) = self.channels.data_consumer.pop() {
                return Some((block, 0));
            }
            if !self.stream_running.load(Ordering::SeqCst) {
                return None;
            }
            thread::sleep(READ_POLL_INTERVAL);
        }
        None
    }

    fn report_pressure(&mut self) {
        let occupancy = self.channels.pending_blocks() as f32 / self.buffer_count as f32 * 100.0;
        telemetry::hub().record_buffer_occupancy("capture_blocks", occupancy);

        let dropped = self.dropped_blocks.load(Ordering::Relaxed);
        if dropped != self.last_dropped_blocks {
            tracing::warn!(
                "[CpalSource] Block pool exhausted, {} callback blocks dropped",
                dropped
            );
            telemetry::hub().record_error(
                DiagnosticError::StreamBackpressure,
                format!("{} callback blocks dropped", dropped),
            );
            self.last_dropped_blocks = dropped;
        }
    }
}

impl AudioSource for CpalSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_block(&mut self, block: &mut [f32]) -> Result<SourceRead, AudioError> {
        let (buffer, offset) = match self.current.take() {
            Some(current) => current,
            None => match self.next_block() {
                Some(next) => next,
                None if !self.stream_running.load(Ordering::SeqCst) => {
                    return Err(AudioError::StreamFailure {
                        reason: "input stream stopped".to_string(),
                    })
                }
                None => return Ok(SourceRead::Samples(0)),
            },
        };

        let n = (buffer.len() - offset).min(block.len());
        block[..n].copy_from_slice(&buffer[offset..offset + n]);
        if offset + n < buffer.len() {
            self.current = Some((buffer, offset + n));
        } else if self.channels.pool_producer.push(buffer).is_err() {
            tracing::warn!("[CpalSource] Pool queue full, dropping block");
        }

        self.report_pressure();
        Ok(SourceRead::Samples(n))
    }

    fn description(&self) -> String {
        format!("input device '{}'", self.device_name)
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.stream_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.stream_thread.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

fn run_stream(
    channels: AudioThreadChannels,
    buffer_size: usize,
    dropped_blocks: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    ready_tx: mpsc::Sender<Result<(u32, String), AudioError>>,
) {
    let error_flag = Arc::clone(&running);
    let stream = match build_input_stream(channels, buffer_size, dropped_blocks, error_flag) {
        Ok(stream) => stream,
        Err(err) => {
            running.store(false, Ordering::SeqCst);
            let _ = ready_tx.send(Err(err));
            return;
        }
    };

    let (stream, sample_rate, device_name) = stream;
    if let Err(e) = stream.play() {
        running.store(false, Ordering::SeqCst);
        let _ = ready_tx.send(Err(AudioError::HardwareError {
            details: format!("Input start failed: {}", e),
        }));
        return;
    }
    let _ = ready_tx.send(Ok((sample_rate, device_name)));

    while running.load(Ordering::SeqCst) {
        thread::park_timeout(Duration::from_millis(50));
    }
    drop(stream);
    tracing::info!("[CpalSource] Input stream closed");
}

fn build_input_stream(
    mut channels: AudioThreadChannels,
    buffer_size: usize,
    dropped_blocks: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
) -> Result<(cpal::Stream, u32, String), AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| AudioError::StreamOpenFailed {
            reason: "No default input device found".to_string(),
        })?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let config = device
        .default_input_config()
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("Failed to get default input config: {:?}", e),
        })?;

    let stream_config: cpal::StreamConfig = config.clone().into();
    let channels_count = (stream_config.channels as usize).max(1);
    let sample_rate = stream_config.sample_rate.0;

    let err_fn = move |err| {
        tracing::error!("[CpalSource] Input stream error: {}", err);
        running.store(false, Ordering::SeqCst);
    };

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // a callback larger than one block is split over several
                for chunk in data.chunks(buffer_size * channels_count) {
                    match channels.pool_consumer.pop() {
                        Ok(mut buffer) => {
                            buffer.clear();
                            if channels_count == 1 {
                                buffer.extend_from_slice(chunk);
                            } else {
                                // De-interleave: take first channel
                                buffer.extend(chunk.chunks(channels_count).map(|frame| frame[0]));
                            }
                            if channels.data_producer.push(buffer).is_err() {
                                dropped_blocks.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        Err(_) => {
                            dropped_blocks.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            },
            err_fn,
            None,
        ),
        _ => {
            return Err(AudioError::StreamOpenFailed {
                reason: "Only F32 sample format is currently supported for input".to_string(),
            })
        }
    }
    .map_err(|e| AudioError::StreamOpenFailed {
        reason: format!("{:?}", e),
    })?;

    Ok((stream, sample_rate, device_name))
}
