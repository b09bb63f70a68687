// Error types for the pitch tracker
//
// This module defines custom error types for audio capture and analysis,
// providing structured error handling with numeric error codes that can be
// reported by the CLI and telemetry surfaces.

mod analysis;
mod audio;

pub use analysis::{log_analysis_error, AnalysisError, AnalysisErrorCodes};
pub use audio::{log_audio_error, AudioError, AudioErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the engine, the CLI and the telemetry hub.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
