use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use pitch_tracker::audio::{AudioSource, CaptureEnd};
use pitch_tracker::config::{AppConfig, FREQUENCY_MAX, FREQUENCY_MIN};
use pitch_tracker::engine::PitchEngine;
use pitch_tracker::telemetry;
use pitch_tracker::testing::{SyntheticSource, ToneSpec, WavSource};
use pitch_tracker::tuning::{EvaluationResult, Instrument, MusicalScale};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "pitch_cli",
    about = "Real-time monophonic pitch tracker: stream audio through the live engine"
)]
struct Cli {
    /// JSON configuration file (defaults to assets/pitch_config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Instrument whose strings are preferred as targets (chromatic, guitar, bass, violin)
    #[arg(long)]
    instrument: Option<String>,
    /// Fixed target note such as A4, automatic detection if omitted
    #[arg(long)]
    note: Option<String>,
    /// Print every n-th result
    #[arg(long, default_value_t = 1)]
    every: usize,
    /// Only print frames with a detected frequency
    #[arg(long)]
    detected_only: bool,
    /// Print the telemetry snapshot after the run
    #[arg(long)]
    telemetry: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream a synthetic tone through the engine and print JSON results
    Synth {
        #[arg(long, default_value_t = 440.0)]
        frequency: f32,
        #[arg(long, default_value_t = 0.5)]
        amplitude: f32,
        /// Additional partials as FREQUENCY:AMPLITUDE
        #[arg(long = "partial")]
        partials: Vec<String>,
        /// Peak amplitude of added white noise
        #[arg(long, default_value_t = 0.0)]
        noise: f32,
        #[arg(long, default_value_t = 2_000)]
        duration_ms: u32,
        /// Deliver samples as fast as possible instead of in real time
        #[arg(long)]
        fast: bool,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Stream a WAV file in real time
    Wav {
        path: PathBuf,
        /// Deliver samples as fast as possible instead of in real time
        #[arg(long)]
        fast: bool,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Track the default microphone until Ctrl-C
    Listen {
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Print the effective configuration as JSON
    DumpConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::load(),
    };

    match cli.command {
        Commands::Synth {
            frequency,
            amplitude,
            partials,
            noise,
            duration_ms,
            fast,
            output,
        } => {
            let mut spec = ToneSpec::sine(frequency, amplitude)
                .with_noise(noise)
                .with_duration_ms(duration_ms)
                .with_sample_rate(config.stream.sample_rate);
            for partial in &partials {
                let (f, a) = parse_partial(partial)?;
                spec = spec.with_partial(f, a);
            }
            let source = SyntheticSource::new(spec).realtime(!fast);
            run_finite(config, Box::new(source), &output).await
        }
        Commands::Wav { path, fast, output } => {
            let source = WavSource::open(&path)
                .with_context(|| format!("opening {}", path.display()))?
                .realtime(!fast);
            run_finite(config, Box::new(source), &output).await
        }
        Commands::Listen { output } => run_listen(config, &output).await,
        Commands::DumpConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::from(0))
        }
    }
}

fn parse_partial(value: &str) -> Result<(f32, f32)> {
    let (frequency, amplitude) = value
        .split_once(':')
        .ok_or_else(|| anyhow!("partial '{}' is not FREQUENCY:AMPLITUDE", value))?;
    Ok((
        frequency.trim().parse().with_context(|| format!("frequency in '{}'", value))?,
        amplitude.trim().parse().with_context(|| format!("amplitude in '{}'", value))?,
    ))
}

fn build_engine(mut config: AppConfig, output: &OutputArgs) -> Result<Arc<PitchEngine>> {
    if let Some(name) = &output.instrument {
        config.evaluation.instrument =
            Instrument::by_name(name).ok_or_else(|| anyhow!("unknown instrument '{}'", name))?;
    }
    let scale = MusicalScale::new(
        config.evaluation.reference_frequency,
        config.evaluation.notes_per_octave,
        FREQUENCY_MIN,
        FREQUENCY_MAX,
    );

    let engine = PitchEngine::new(config).map_err(|err| anyhow!("invalid configuration: {}", err))?;
    if let Some(name) = &output.note {
        let note = scale
            .parse_note(name)
            .ok_or_else(|| anyhow!("unknown note '{}'", name))?;
        engine.set_target_note(Some(note));
    }
    Ok(Arc::new(engine))
}

/// Prints results according to the output options
struct ResultPrinter {
    every: usize,
    detected_only: bool,
    received: usize,
    lagged: u64,
}

impl ResultPrinter {
    fn new(output: &OutputArgs) -> Self {
        Self {
            every: output.every.max(1),
            detected_only: output.detected_only,
            received: 0,
            lagged: 0,
        }
    }

    fn print(&mut self, result: &EvaluationResult) -> Result<()> {
        self.received += 1;
        if self.detected_only && result.smoothed_frequency <= 0.0 {
            return Ok(());
        }
        if (self.received - 1) % self.every == 0 {
            println!("{}", serde_json::to_string(result)?);
        }
        Ok(())
    }

    fn handle(&mut self, received: Result<EvaluationResult, RecvError>) -> Result<bool> {
        match received {
            Ok(result) => {
                self.print(&result)?;
                Ok(true)
            }
            Err(RecvError::Lagged(skipped)) => {
                self.lagged += skipped;
                tracing::warn!("[pitch_cli] Output lagged, {} results skipped", skipped);
                Ok(true)
            }
            Err(RecvError::Closed) => Ok(false),
        }
    }

    fn drain(&mut self, rx: &mut broadcast::Receiver<EvaluationResult>) -> Result<()> {
        while let Ok(result) = rx.try_recv() {
            self.print(&result)?;
        }
        Ok(())
    }
}

async fn run_finite(config: AppConfig, source: Box<dyn AudioSource>, output: &OutputArgs) -> Result<ExitCode> {
    let engine = build_engine(config, output)?;
    let mut rx = engine.subscribe();
    let mut printer = ResultPrinter::new(output);
    engine.start(source)?;

    let waiter = Arc::clone(&engine);
    let mut finished = tokio::task::spawn_blocking(move || waiter.wait_until_finished());

    let end = loop {
        tokio::select! {
            end = &mut finished => break end??,
            received = rx.recv() => {
                if !printer.handle(received)? {
                    break finished.await??;
                }
            }
        }
    };
    printer.drain(&mut rx)?;
    finish(end, printer, output.telemetry)
}

async fn run_listen(config: AppConfig, output: &OutputArgs) -> Result<ExitCode> {
    #[cfg(target_os = "android")]
    {
        let _ = (config, output);
        Err(anyhow!("microphone input is only available on desktop platforms"))
    }

    #[cfg(not(target_os = "android"))]
    {
        let source = pitch_tracker::audio::CpalSource::open_default(
            config.stream.buffer_pool_size,
            config.stream.block_size,
        )?;
        let engine = build_engine(config, output)?;
        let stream = engine.result_stream();
        tokio::pin!(stream);
        let mut printer = ResultPrinter::new(output);
        engine.start(Box::new(source))?;
        eprintln!("Listening, press Ctrl-C to stop");

        loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    signal.context("waiting for Ctrl-C")?;
                    break;
                }
                next = stream.next() => {
                    match next {
                        Some(result) => printer.print(&result)?,
                        None => break,
                    }
                    if !engine.is_running() {
                        break;
                    }
                }
            }
        }

        let end = engine.stop()?;
        finish(end, printer, output.telemetry)
    }
}

fn finish(end: CaptureEnd, printer: ResultPrinter, print_telemetry: bool) -> Result<ExitCode> {
    if print_telemetry {
        eprintln!("{}", serde_json::to_string_pretty(&telemetry::hub().snapshot())?);
    }
    if printer.lagged > 0 {
        eprintln!("{} results were skipped because output was too slow", printer.lagged);
    }

    match end {
        CaptureEnd::SourceFailed(err) => Err(anyhow!("audio source failed: {}", err)),
        CaptureEnd::Stopped | CaptureEnd::SourceExhausted => Ok(ExitCode::from(0)),
    }
}
