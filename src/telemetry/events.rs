//! Core telemetry event types describing diagnostics data exposed to
//! the CLI and to in-process subscribers.

use serde::{Deserialize, Serialize};

/// Lifecycle stages reported by the pitch engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Started,
    SourceExhausted,
    Stopped,
}

/// Diagnostic error codes surfaced via telemetry metrics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticError {
    SourceRead,
    Analysis,
    StreamBackpressure,
    Unknown,
}

/// Metric events covering analysis latency, queue pressure, pools and lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    FrameAnalyzed {
        frame_position: u64,
        frequency: f32,
        noise: f32,
        processing_ms: f32,
    },
    Latency {
        avg_ms: f32,
        max_ms: f32,
        sample_count: usize,
    },
    QueueOverflow {
        dropped_total: u64,
    },
    PoolUsage {
        pool: String,
        in_use: usize,
        available: usize,
    },
    BufferOccupancy {
        channel: String,
        percent: f32,
    },
    EngineLifecycle {
        phase: LifecyclePhase,
        timestamp_ms: u64,
    },
    Error {
        code: DiagnosticError,
        context: String,
    },
}
