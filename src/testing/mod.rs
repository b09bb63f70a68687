//! Testability harness utilities.
//!
//! Deterministic audio sources that feed the live engine without touching
//! audio hardware. Used by unit tests, the integration tests and the
//! `synth`/`wav` subcommands of the CLI.

pub mod fixtures;

pub use fixtures::{write_wav, Partial, SyntheticSource, ToneSpec, WavSource};
