// Pitch Tracker Core - Rust Audio Engine
// Real-time monophonic pitch detection with a latest-wins frame pipeline

// Module declarations
pub mod analysis;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod telemetry;
pub mod testing;
pub mod tuning;

// Re-exports for convenience
pub use config::AppConfig;
pub use engine::PitchEngine;
pub use error::{AnalysisError, AudioError, ErrorCode};
pub use tuning::{EvaluationResult, MusicalNote, MusicalScale};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds_engine() {
        let engine = PitchEngine::new(AppConfig::default()).unwrap();
        assert!(!engine.is_running());
        assert_eq!(engine.config().detection.window_size, 4096);
    }
}
