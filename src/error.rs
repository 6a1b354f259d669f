// Handshake Badge: Error Types
//
// Only hardware absence is fatal. Everything else is surfaced to the
// orchestrator as an empty or boolean outcome and retried structurally.

use thiserror::Error;

/// Unrecoverable start-up condition; the device halts (fail-stop).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FatalError {
    #[error("required hardware not detected: {0}")]
    HardwareAbsent(&'static str),
}

/// A non-successful model invocation. Never propagated past the classifier.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InferenceError {
    #[error("model invocation failed with status {0}")]
    Invoke(i32),
    #[error("model is not loaded")]
    NotLoaded,
}

/// An advertisement field does not fit its fixed wire width.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RecordError {
    #[error("{field} is {len} bytes, wire field holds {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}
