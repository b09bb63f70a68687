//! Deterministic audio sources for tests and the CLI.
//!
//! `SyntheticSource` renders a [`ToneSpec`] (sum of partials, seeded white
//! noise, optional dropouts); `WavSource` streams a WAV file. Both implement
//! [`AudioSource`] so they run through the live capture and analysis threads
//! exactly like microphone input, optionally paced in real time.

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::{AudioSource, SourceRead};
use crate::error::AudioError;

/// Sample rate used when a [`ToneSpec`] does not name one
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// One sinusoidal component of a synthetic tone
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Partial {
    pub frequency_hz: f32,
    pub amplitude: f32,
}

/// Declarative description of a synthetic test signal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToneSpec {
    pub partials: Vec<Partial>,
    /// Peak amplitude of uniform white noise added to the tone
    #[serde(default)]
    pub noise_amplitude: f32,
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u32,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Silent sections as (start_ms, length_ms)
    #[serde(default)]
    pub dropouts: Vec<(u32, u32)>,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_duration_ms() -> u32 {
    1_000
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_seed() -> u64 {
    0x5A5A_FFF0
}

impl ToneSpec {
    /// Pure sine tone of one second
    pub fn sine(frequency_hz: f32, amplitude: f32) -> Self {
        Self {
            partials: vec![Partial {
                frequency_hz,
                amplitude,
            }],
            noise_amplitude: 0.0,
            duration_ms: default_duration_ms(),
            sample_rate: default_sample_rate(),
            dropouts: Vec::new(),
            seed: default_seed(),
        }
    }

    pub fn with_partial(mut self, frequency_hz: f32, amplitude: f32) -> Self {
        self.partials.push(Partial {
            frequency_hz,
            amplitude,
        });
        self
    }

    pub fn with_noise(mut self, noise_amplitude: f32) -> Self {
        self.noise_amplitude = noise_amplitude;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u32) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_dropout(mut self, start_ms: u32, length_ms: u32) -> Self {
        self.dropouts.push((start_ms, length_ms));
        self
    }

    /// Total number of samples
    pub fn num_samples(&self) -> usize {
        duration_samples(self.duration_ms, self.sample_rate)
    }

    fn is_dropout(&self, index: usize) -> bool {
        self.dropouts.iter().any(|&(start_ms, length_ms)| {
            let start = duration_samples(start_ms, self.sample_rate);
            let end = start + duration_samples(length_ms, self.sample_rate);
            (start..end).contains(&index)
        })
    }

    /// Noise free tone value at sample `index`
    fn tone_at(&self, index: usize) -> f32 {
        let t = index as f64 / self.sample_rate as f64;
        self.partials
            .iter()
            .map(|p| p.amplitude as f64 * (2.0 * PI * p.frequency_hz as f64 * t).sin())
            .sum::<f64>() as f32
    }

    /// Render the complete signal, mainly for tests
    pub fn render(&self) -> Vec<f32> {
        let mut source = SyntheticSource::new(self.clone());
        let mut samples = vec![0.0; self.num_samples()];
        let mut filled = 0;
        while let Ok(SourceRead::Samples(n)) = source.read_block(&mut samples[filled..]) {
            if n == 0 {
                break;
            }
            filled += n;
        }
        samples
    }
}

fn duration_samples(duration_ms: u32, sample_rate: u32) -> usize {
    ((duration_ms as f64 / 1_000.0) * sample_rate as f64).round() as usize
}

/// Sleeps so that samples are not delivered faster than real time
#[derive(Debug)]
struct Pacer {
    started: Option<Instant>,
    sample_rate: u32,
}

impl Pacer {
    fn new(sample_rate: u32) -> Self {
        Self {
            started: None,
            sample_rate: sample_rate.max(1),
        }
    }

    /// Wait until `position` samples are due
    fn wait_for(&mut self, position: usize) {
        let started = *self.started.get_or_insert_with(Instant::now);
        let due = started + Duration::from_secs_f64(position as f64 / self.sample_rate as f64);
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
    }
}

/// Streams a [`ToneSpec`]
#[derive(Debug)]
pub struct SyntheticSource {
    spec: ToneSpec,
    rng: StdRng,
    position: usize,
    total: usize,
    pacer: Option<Pacer>,
}

impl SyntheticSource {
    pub fn new(spec: ToneSpec) -> Self {
        let total = spec.num_samples();
        Self {
            rng: StdRng::seed_from_u64(spec.seed),
            spec,
            position: 0,
            total,
            pacer: None,
        }
    }

    /// Deliver samples no faster than the sample rate
    pub fn realtime(mut self, enabled: bool) -> Self {
        self.pacer = enabled.then(|| Pacer::new(self.spec.sample_rate));
        self
    }

    pub fn spec(&self) -> &ToneSpec {
        &self.spec
    }

    pub fn rewind(&mut self) {
        self.position = 0;
        self.rng = StdRng::seed_from_u64(self.spec.seed);
        if let Some(pacer) = self.pacer.as_mut() {
            pacer.started = None;
        }
    }
}

impl AudioSource for SyntheticSource {
    fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    fn read_block(&mut self, block: &mut [f32]) -> Result<SourceRead, AudioError> {
        if self.position >= self.total {
            return Ok(SourceRead::Exhausted);
        }

        let n = block.len().min(self.total - self.position);
        let noise = self.spec.noise_amplitude;
        for (i, sample) in block[..n].iter_mut().enumerate() {
            let index = self.position + i;
            // the noise sequence does not depend on dropouts
            let noise_value = if noise > 0.0 {
                self.rng.gen_range(-noise..noise)
            } else {
                0.0
            };
            *sample = if self.spec.is_dropout(index) {
                0.0
            } else {
                self.spec.tone_at(index) + noise_value
            };
        }

        self.position += n;
        if let Some(pacer) = self.pacer.as_mut() {
            pacer.wait_for(self.position);
        }
        Ok(SourceRead::Samples(n))
    }

    fn description(&self) -> String {
        let frequencies: Vec<String> = self
            .spec
            .partials
            .iter()
            .map(|p| format!("{} Hz", p.frequency_hz))
            .collect();
        format!("synthetic tone [{}]", frequencies.join(", "))
    }
}

/// Streams a WAV file, down-mixed to mono
#[derive(Debug)]
pub struct WavSource {
    samples: Vec<f32>,
    sample_rate: u32,
    position: usize,
    name: String,
    pacer: Option<Pacer>,
}

impl WavSource {
    /// Load a WAV file (16/24/32 bit integer or float)
    ///
    /// # Errors
    /// Returns `AudioError::SourceFailed` if the file cannot be read or has
    /// an unsupported format.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AudioError> {
        let path = path.as_ref();
        let (samples, sample_rate) = read_wav(path)?;
        tracing::info!(
            "[WavSource] Loaded {} samples at {} Hz from {}",
            samples.len(),
            sample_rate,
            path.display()
        );
        Ok(Self {
            samples,
            sample_rate,
            position: 0,
            name: path.display().to_string(),
            pacer: None,
        })
    }

    pub fn realtime(mut self, enabled: bool) -> Self {
        self.pacer = enabled.then(|| Pacer::new(self.sample_rate));
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl AudioSource for WavSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_block(&mut self, block: &mut [f32]) -> Result<SourceRead, AudioError> {
        if self.position >= self.samples.len() {
            return Ok(SourceRead::Exhausted);
        }
        let n = block.len().min(self.samples.len() - self.position);
        block[..n].copy_from_slice(&self.samples[self.position..self.position + n]);
        self.position += n;
        if let Some(pacer) = self.pacer.as_mut() {
            pacer.wait_for(self.position);
        }
        Ok(SourceRead::Samples(n))
    }

    fn description(&self) -> String {
        format!("wav file {}", self.name)
    }
}

fn source_failed(path: &Path, detail: impl std::fmt::Display) -> AudioError {
    AudioError::SourceFailed {
        reason: format!("{}: {}", path.display(), detail),
    }
}

fn read_wav(path: &Path) -> Result<(Vec<f32>, u32), AudioError> {
    let mut reader = hound::WavReader::open(path).map_err(|err| source_failed(path, err))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(source_failed(path, "zero channels"));
    }

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<f32>, _>>()
            .map_err(|err| source_failed(path, err))?,
        hound::SampleFormat::Int => match spec.bits_per_sample {
            16 => reader
                .samples::<i16>()
                .map(|sample| sample.map(|v| v as f32 / i16::MAX as f32))
                .collect::<Result<Vec<f32>, _>>()
                .map_err(|err| source_failed(path, err))?,
            24 | 32 => {
                let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<f32>, _>>()
                    .map_err(|err| source_failed(path, err))?
            }
            bits => {
                return Err(source_failed(
                    path,
                    format!("unsupported bits_per_sample={}", bits),
                ))
            }
        },
    };

    if spec.channels == 1 {
        return Ok((samples, spec.sample_rate));
    }

    let channels = spec.channels as usize;
    let mono = samples
        .chunks(channels)
        .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
        .collect();
    Ok((mono, spec.sample_rate))
}

/// Write mono samples as 32 bit float WAV
///
/// # Errors
/// Returns `AudioError::SourceFailed` if the file cannot be written.
pub fn write_wav<P: AsRef<Path>>(path: P, samples: &[f32], sample_rate: u32) -> Result<(), AudioError> {
    let path = path.as_ref();
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(|err| source_failed(path, err))?;
    for &sample in samples {
        writer.write_sample(sample).map_err(|err| source_failed(path, err))?;
    }
    writer.finalize().map_err(|err| source_failed(path, err))
}

#[cfg(test)]
mod tests;
