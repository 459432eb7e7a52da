//! Capability traits at the seams of the capture engine.

use crate::types::{
    FeatureBlob, ProofBlob, ProofKeys, Reading, SensorKind, SensorSample, SessionBlob
};
use errors::ProcessingError;
use tokio::sync::mpsc;

/// Receiver of fused readings while a capture window is open.
///
/// Sinks are invoked on the sensor delivery path with the fusion lock held:
/// implementations must return quickly, must not block and must not call
/// back into the assembler that feeds them.
pub trait ReadingSink: Send + Sync {
    fn accept(&self, reading: &Reading);
}

/// An independent physical sensor stream.
pub trait SensorSource: Send + Sync {
    fn kind(&self) -> SensorKind;

    /// Starts delivering samples into a fresh channel.
    ///
    /// The source stops producing once the returned receiver is dropped.
    fn open(&self) -> mpsc::Receiver<SensorSample>;
}

/// The external processing capability: collector, feature extraction,
/// scoring and proof generation / verification.
///
/// Every operation other than [`initialize`](Self::initialize) and
/// [`is_initialized`](Self::is_initialized) fails with
/// [`ProcessingError::NotInitialized`] until `initialize` has succeeded once.
pub trait ProcessingService: Send + Sync {
    /// Loads key material. Idempotent: later calls are accepted and ignored.
    fn initialize(&self, keys: &ProofKeys) -> Result<(), ProcessingError>;

    fn is_initialized(&self) -> bool;

    /// Resets the collector for a new session.
    fn start_capture(&self) -> Result<(), ProcessingError>;

    fn add_reading(&self, reading: &Reading) -> Result<(), ProcessingError>;

    /// Finalizes the collector; `stop_timestamp_ms` is wall-clock Unix millis.
    fn stop_capture(&self, stop_timestamp_ms: i64) -> Result<SessionBlob, ProcessingError>;

    fn extract_features(&self, session: &SessionBlob) -> Result<FeatureBlob, ProcessingError>;

    fn score(&self, features: &FeatureBlob) -> Result<f64, ProcessingError>;

    fn generate_proof(&self, features: &FeatureBlob) -> Result<ProofBlob, ProcessingError>;

    fn verify_proof(&self, proof: &ProofBlob) -> Result<bool, ProcessingError>;
}
