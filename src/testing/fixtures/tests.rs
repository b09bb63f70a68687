use super::*;

fn read_all(source: &mut dyn AudioSource, block_size: usize) -> Vec<f32> {
    let mut block = vec![0.0; block_size];
    let mut samples = Vec::new();
    loop {
        match source.read_block(&mut block).unwrap() {
            SourceRead::Samples(n) => samples.extend_from_slice(&block[..n]),
            SourceRead::Exhausted => break,
        }
    }
    samples
}

#[test]
fn synthetic_source_delivers_duration_then_exhausts() {
    let spec = ToneSpec::sine(110.0, 0.5)
        .with_sample_rate(8_000)
        .with_duration_ms(100);
    let mut source = SyntheticSource::new(spec);
    assert_eq!(source.sample_rate(), 8_000);

    let samples = read_all(&mut source, 300);
    assert_eq!(samples.len(), 800);
    assert!(samples.iter().all(|s| s.abs() <= 0.5 + 1e-6));
    assert_eq!(source.read_block(&mut [0.0; 4]).unwrap(), SourceRead::Exhausted);
}

#[test]
fn synthetic_source_is_deterministic() {
    let spec = ToneSpec::sine(220.0, 0.3)
        .with_partial(440.0, 0.2)
        .with_noise(0.05)
        .with_duration_ms(50);
    let first = spec.render();
    let second = spec.render();
    assert_eq!(first, second);

    let mut source = SyntheticSource::new(spec);
    let streamed = read_all(&mut source, 7);
    assert_eq!(streamed, first);

    source.rewind();
    assert_eq!(read_all(&mut source, 64), first);
}

#[test]
fn noise_stays_within_amplitude() {
    let samples = ToneSpec::sine(0.0, 0.0)
        .with_noise(0.1)
        .with_duration_ms(100)
        .render();
    assert!(samples.iter().all(|s| s.abs() <= 0.1));
    assert!(samples.iter().any(|s| s.abs() > 0.05));
}

#[test]
fn dropouts_are_silent() {
    let spec = ToneSpec::sine(440.0, 0.5)
        .with_sample_rate(10_000)
        .with_duration_ms(100)
        .with_dropout(20, 10);
    let samples = spec.render();
    assert!(samples[200..300].iter().all(|&s| s == 0.0));
    assert!(samples[300..400].iter().any(|s| s.abs() > 0.4));
}

#[test]
fn tone_spec_json_defaults() {
    let spec: ToneSpec =
        serde_json::from_str(r#"{"partials":[{"frequency_hz":330.0,"amplitude":0.4}]}"#).unwrap();
    assert_eq!(spec.duration_ms, 1_000);
    assert_eq!(spec.sample_rate, DEFAULT_SAMPLE_RATE);
    assert_eq!(spec.noise_amplitude, 0.0);
    assert!(spec.dropouts.is_empty());
}

#[test]
fn realtime_pacing_waits_for_samples() {
    let spec = ToneSpec::sine(440.0, 0.5)
        .with_sample_rate(1_000)
        .with_duration_ms(60);
    let mut source = SyntheticSource::new(spec).realtime(true);

    let started = Instant::now();
    let samples = read_all(&mut source, 20);
    assert_eq!(samples.len(), 60);
    assert!(started.elapsed() >= Duration::from_millis(55));
}

#[test]
fn wav_source_roundtrip_through_file() {
    let path = std::env::temp_dir().join(format!("pitch_tracker_fixture_{}.wav", std::process::id()));
    let expected = ToneSpec::sine(330.0, 0.5)
        .with_sample_rate(16_000)
        .with_duration_ms(50)
        .render();
    write_wav(&path, &expected, 16_000).unwrap();

    let mut source = WavSource::open(&path).unwrap();
    assert_eq!(source.sample_rate(), 16_000);
    assert_eq!(source.len(), expected.len());
    let samples = read_all(&mut source, 128);
    std::fs::remove_file(&path).ok();

    assert_eq!(samples, expected);
}

#[test]
fn wav_source_reports_missing_file() {
    let err = WavSource::open("/nonexistent/pitch_tracker/missing.wav").unwrap_err();
    assert!(matches!(err, AudioError::SourceFailed { .. }));
}
