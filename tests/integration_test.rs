//! Integration tests for the PitchEngine
//!
//! These tests run deterministic sources through the real capture and
//! analysis threads, including:
//! - Engine start/stop lifecycle and result streaming
//! - Target note locking for chromatic and instrument tuning
//! - User defined target notes
//! - Dropouts and WAV file playback
//!
//! Sources are paced in real time where a test depends on every frame being
//! analyzed, since the frame queue drops stale frames under backpressure.

use pitch_tracker::audio::CaptureEnd;
use pitch_tracker::config::AppConfig;
use pitch_tracker::engine::PitchEngine;
use pitch_tracker::error::AudioError;
use pitch_tracker::testing::{write_wav, SyntheticSource, ToneSpec, WavSource};
use pitch_tracker::tuning::{EvaluationResult, Instrument, MusicalNote, MusicalScale};
use tokio::sync::broadcast;

fn collect(rx: &mut broadcast::Receiver<EvaluationResult>) -> Vec<EvaluationResult> {
    let mut results = Vec::new();
    while let Ok(result) = rx.try_recv() {
        results.push(result);
    }
    results
}

fn run_to_end(engine: &PitchEngine, source: SyntheticSource) -> Vec<EvaluationResult> {
    let mut rx = engine.subscribe();
    engine.start(Box::new(source.realtime(true))).unwrap();
    let end = engine.wait_until_finished().unwrap();
    assert_eq!(end, CaptureEnd::SourceExhausted);
    collect(&mut rx)
}

/// A pure tone locks the closest note of the chromatic scale
#[test]
fn test_tone_locks_chromatic_target() {
    let engine = PitchEngine::new(AppConfig::default()).unwrap();
    let results = run_to_end(&engine, SyntheticSource::new(ToneSpec::sine(440.0, 0.5)));

    assert!(!results.is_empty(), "engine should publish results");
    let positions: Vec<u64> = results.iter().map(|r| r.frame_position).collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "results must be ordered: {:?}", positions);

    let last = results.last().unwrap();
    let target = last.target.as_ref().expect("last frame should have a target");
    assert_eq!(target.name, "A4");
    assert_eq!(target.note, MusicalNote::new(0));
    assert!((target.frequency - 440.0).abs() < 1e-3);
    assert!(
        (last.smoothed_frequency - 440.0).abs() < 1.0,
        "smoothed frequency {}",
        last.smoothed_frequency
    );
    assert!(last.noise < 0.1);
    assert!(!engine.is_running());
}

/// Harmonics do not pull the detection away from the fundamental
#[test]
fn test_rich_tone_tracks_fundamental() {
    let spec = ToneSpec::sine(196.0, 0.4)
        .with_partial(392.0, 0.3)
        .with_partial(588.0, 0.2)
        .with_noise(0.01);
    let engine = PitchEngine::new(AppConfig::default()).unwrap();
    let results = run_to_end(&engine, SyntheticSource::new(spec));

    let last = results.last().unwrap();
    assert_eq!(last.target.as_ref().unwrap().name, "G3");
    assert!((last.smoothed_frequency - 196.0).abs() < 1.0);
    assert!(last.harmonic_energy_relative >= 0.1);
}

/// A guitar string is marked as part of the instrument
#[test]
fn test_instrument_string_target() {
    let mut config = AppConfig::default();
    config.evaluation.instrument = Instrument::guitar();
    let engine = PitchEngine::new(config).unwrap();
    let results = run_to_end(&engine, SyntheticSource::new(ToneSpec::sine(110.0, 0.5)));

    let target = results.last().unwrap().target.clone().unwrap();
    assert_eq!(target.name, "A2");
    assert!(target.is_part_of_instrument);
    assert!(!target.instrument_has_no_strings);
}

/// A user defined note overrides automatic detection
#[test]
fn test_user_defined_target_note() {
    let engine = PitchEngine::new(AppConfig::default()).unwrap();
    let e4 = MusicalScale::default().parse_note("E4").unwrap();
    engine.set_target_note(Some(e4));

    let results = run_to_end(&engine, SyntheticSource::new(ToneSpec::sine(440.0, 0.5)));
    let last = results.last().unwrap();
    assert_eq!(last.target.as_ref().unwrap().note, e4);
    assert!((last.smoothed_frequency - 440.0).abs() < 1.0);

    // back to automatic detection on the next run
    engine.set_target_note(None);
    let results = run_to_end(&engine, SyntheticSource::new(ToneSpec::sine(440.0, 0.5)));
    assert_eq!(results.last().unwrap().target.as_ref().unwrap().name, "A4");
}

/// Silent sections produce frames without a detection
#[test]
fn test_dropout_interrupts_detection() {
    let spec = ToneSpec::sine(330.0, 0.5)
        .with_duration_ms(800)
        .with_dropout(300, 300);
    let engine = PitchEngine::new(AppConfig::default()).unwrap();
    let results = run_to_end(&engine, SyntheticSource::new(spec));

    let silent: Vec<&EvaluationResult> = results.iter().filter(|r| r.smoothed_frequency == 0.0).collect();
    assert!(!silent.is_empty(), "dropout frames should be rejected");
    assert!(silent.iter().any(|r| r.target.is_none() && r.time_since_last_detection > 0.0));

    let last = results.last().unwrap();
    assert!((last.smoothed_frequency - 330.0).abs() < 1.0);
    assert_eq!(last.time_since_last_detection, 0.0);
}

/// A WAV file streams through the same pipeline
#[test]
fn test_wav_source_playback() {
    let path = std::env::temp_dir().join(format!("pitch_tracker_it_{}.wav", std::process::id()));
    let samples = ToneSpec::sine(330.0, 0.5).with_sample_rate(48_000).render();
    write_wav(&path, &samples, 48_000).unwrap();

    let source = WavSource::open(&path).unwrap().realtime(true);
    std::fs::remove_file(&path).ok();

    let engine = PitchEngine::new(AppConfig::default()).unwrap();
    let mut rx = engine.subscribe();
    engine.start(Box::new(source)).unwrap();
    assert_eq!(engine.wait_until_finished().unwrap(), CaptureEnd::SourceExhausted);

    let results = collect(&mut rx);
    let last = results.last().unwrap();
    assert_eq!(last.target.as_ref().unwrap().name, "E4");
    assert!((last.smoothed_frequency - 330.0).abs() < 1.0);
}

/// Stopping a live source ends the stream and allows a restart
#[test]
fn test_stop_and_restart() {
    let engine = PitchEngine::new(AppConfig::default()).unwrap();
    let live = ToneSpec::sine(440.0, 0.5).with_duration_ms(60_000);
    engine.start(Box::new(SyntheticSource::new(live.clone()).realtime(true))).unwrap();
    assert!(engine.is_running());

    std::thread::sleep(std::time::Duration::from_millis(200));
    assert_eq!(engine.stop().unwrap(), CaptureEnd::Stopped);
    assert!(!engine.is_running());
    assert_eq!(engine.stop().unwrap_err(), AudioError::NotRunning);

    engine.start(Box::new(SyntheticSource::new(live).realtime(true))).unwrap();
    assert_eq!(
        engine.start(Box::new(SyntheticSource::new(ToneSpec::sine(1.0, 0.1)))).unwrap_err(),
        AudioError::AlreadyRunning
    );
    assert_eq!(engine.stop().unwrap(), CaptureEnd::Stopped);
}

/// Several subscribers see the same results
#[test]
fn test_multiple_subscribers() {
    let engine = PitchEngine::new(AppConfig::default()).unwrap();
    let mut first = engine.subscribe();
    let mut second = engine.subscribe();

    engine
        .start(Box::new(SyntheticSource::new(ToneSpec::sine(220.0, 0.5).with_duration_ms(500))))
        .unwrap();
    engine.wait_until_finished().unwrap();

    let a = collect(&mut first);
    let b = collect(&mut second);
    assert!(!a.is_empty());
    assert_eq!(a, b);
}
