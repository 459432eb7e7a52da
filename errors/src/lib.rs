//! # KinetiZK Errors
//!
//! Error handling for the capture engine and its processing collaborators.
//!
//! The taxonomy follows how each failure must be treated:
//! - [`KeyMaterialError`]: initialization failures, surfaced before any
//!   capture is attempted
//! - [`ProcessingError`]: failures of the external processing service; stage
//!   failures are recovered into a degraded outcome by the pipeline
//! - [`CaptureError`]: failures the capture path cannot recover from locally
//!
//! Re-entrant triggers are not errors and have no variant here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One stage of the stop → extract → score → prove → verify sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    StopCapture,
    ExtractFeatures,
    Score,
    GenerateProof,
    VerifyProof
}

impl PipelineStage {
    /// All stages in execution order.
    pub const ORDER: [PipelineStage; 5] = [
        PipelineStage::StopCapture,
        PipelineStage::ExtractFeatures,
        PipelineStage::Score,
        PipelineStage::GenerateProof,
        PipelineStage::VerifyProof
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopCapture => "stop_capture",
            Self::ExtractFeatures => "extract_features",
            Self::Score => "score",
            Self::GenerateProof => "generate_proof",
            Self::VerifyProof => "verify_proof"
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors reported by a processing service implementation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProcessingError {
    #[error("Processing service used before initialize()")]
    NotInitialized,

    #[error("Invalid key material: {reason}")]
    InvalidKeys { reason: String },

    #[error("Stage {stage} failed: {reason}")]
    StageFailed { stage: PipelineStage, reason: String },

    #[error("Malformed {payload} payload: {reason}")]
    MalformedPayload { payload: String, reason: String },

    #[error("No capture in progress")]
    NotCollecting
}

impl ProcessingError {
    pub fn stage(stage: PipelineStage, reason: impl Into<String>) -> Self {
        Self::StageFailed {
            stage,
            reason: reason.into()
        }
    }

    pub fn malformed(payload: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::MalformedPayload {
            payload: payload.into(),
            reason: reason.to_string()
        }
    }

    /// Whether this error is a caller-side ordering bug rather than a runtime
    /// condition.
    pub fn is_precondition_violation(&self) -> bool {
        matches!(self, Self::NotInitialized)
    }
}

/// Errors raised while loading proving / verifying key material.
#[derive(Debug, Error)]
pub enum KeyMaterialError {
    #[error("Key file not found: {path}")]
    NotFound { path: String },

    #[error("IO error reading key material: {0}")]
    Io(#[from] std::io::Error),

    #[error("Key document is not valid JSON: {reason}")]
    Malformed { reason: String },

    #[error("Key document is missing field: {field}")]
    MissingField { field: String },

    #[error("Field {field} is not valid base64: {reason}")]
    InvalidEncoding { field: String, reason: String },

    #[error("Field {field} decodes to an empty key")]
    Empty { field: String }
}

/// Errors surfaced by the capture state machine to its caller.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Capture attempted before the processing service was initialized")]
    ServiceNotInitialized,

    #[error("Processing service error: {0}")]
    Processing(ProcessingError),

    #[error("Runtime error: {reason}")]
    Runtime { reason: String }
}

impl From<ProcessingError> for CaptureError {
    fn from(err: ProcessingError) -> Self {
        match err {
            ProcessingError::NotInitialized => CaptureError::ServiceNotInitialized,
            other => CaptureError::Processing(other)
        }
    }
}

pub type CaptureResult<T> = std::result::Result<T, CaptureError>;
