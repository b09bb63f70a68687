// Analysis error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Analysis error code constants
///
/// Error code range: 3001-3005
pub struct AnalysisErrorCodes {}

impl AnalysisErrorCodes {
    /// FFT size is not a power of two
    pub const INVALID_FFT_SIZE: i32 = 3001;

    /// Buffers handed between pipeline stages do not fit together
    pub const BUFFER_SIZE_MISMATCH: i32 = 3002;

    /// Configuration value is out of range
    pub const INVALID_CONFIG: i32 = 3003;

    /// Shared analysis state lock was poisoned
    pub const LOCK_POISONED: i32 = 3004;

    /// Analysis worker thread stopped unexpectedly
    pub const WORKER_FAILED: i32 = 3005;
}

/// Log an analysis error with structured context
pub fn log_analysis_error(err: &AnalysisError, context: &str) {
    error!(
        "Analysis error in {}: code={}, component=NoteDetection, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Analysis-related errors
///
/// These are configuration and programmer errors. Transient signal
/// conditions (noise, missing peaks) are never reported through this
/// type; they show up as zero-valued results instead.
///
/// Error code range: 3001-3005
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// FFT size must be a power of two and at least 2
    InvalidFftSize { size: usize },

    /// Buffers handed between pipeline stages do not fit together
    BufferSizeMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    /// Configuration value is out of range
    InvalidConfig { reason: String },

    /// Shared analysis state lock was poisoned
    LockPoisoned { component: String },

    /// Analysis worker thread stopped unexpectedly
    WorkerFailed { reason: String },
}

impl ErrorCode for AnalysisError {
    fn code(&self) -> i32 {
        match self {
            AnalysisError::InvalidFftSize { .. } => AnalysisErrorCodes::INVALID_FFT_SIZE,
            AnalysisError::BufferSizeMismatch { .. } => AnalysisErrorCodes::BUFFER_SIZE_MISMATCH,
            AnalysisError::InvalidConfig { .. } => AnalysisErrorCodes::INVALID_CONFIG,
            AnalysisError::LockPoisoned { .. } => AnalysisErrorCodes::LOCK_POISONED,
            AnalysisError::WorkerFailed { .. } => AnalysisErrorCodes::WORKER_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            AnalysisError::InvalidFftSize { size } => {
                format!("FFT size must be a power of 2 but {} given", size)
            }
            AnalysisError::BufferSizeMismatch {
                context,
                expected,
                actual,
            } => {
                format!(
                    "Buffer size mismatch in {}: expected {}, got {}",
                    context, expected, actual
                )
            }
            AnalysisError::InvalidConfig { reason } => {
                format!("Invalid configuration: {}", reason)
            }
            AnalysisError::LockPoisoned { component } => {
                format!("Lock poisoned for component: {}", component)
            }
            AnalysisError::WorkerFailed { reason } => {
                format!("Analysis worker failed: {}", reason)
            }
        }
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AnalysisError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AnalysisError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_error_codes() {
        assert_eq!(AnalysisError::InvalidFftSize { size: 3 }.code(), 3001);
        assert_eq!(
            AnalysisError::BufferSizeMismatch {
                context: "test".to_string(),
                expected: 1,
                actual: 2
            }
            .code(),
            3002
        );
        assert_eq!(
            AnalysisError::InvalidConfig {
                reason: "test".to_string()
            }
            .code(),
            3003
        );
        assert_eq!(
            AnalysisError::LockPoisoned {
                component: "test".to_string()
            }
            .code(),
            3004
        );
        assert_eq!(
            AnalysisError::WorkerFailed {
                reason: "test".to_string()
            }
            .code(),
            3005
        );
    }

    #[test]
    fn test_analysis_error_display() {
        let err = AnalysisError::InvalidFftSize { size: 1000 };
        assert!(err.message().contains("power of 2"));
        assert!(err.message().contains("1000"));

        let err = AnalysisError::BufferSizeMismatch {
            context: "Correlation::correlate".to_string(),
            expected: 4096,
            actual: 2048,
        };
        assert!(err.to_string().contains("expected 4096"));
        assert!(err.to_string().contains("got 2048"));
    }
}
