use base64::{Engine as _, engine::general_purpose};
use errors::{PipelineStage, ProcessingError};
use kz_core::{
    FeatureBlob, ProcessingService, ProofBlob, ProofKeys, Reading, ReadingSink, SensorKind,
    SensorSample, SessionBlob
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Operations observed by [`FakeProcessingService`], in call order.
///
/// `add_reading` is not logged here; see [`FakeProcessingService::readings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceCall {
    Initialize,
    StartCapture,
    StopCapture,
    ExtractFeatures,
    Score,
    GenerateProof,
    VerifyProof
}

struct Script {
    failures: Vec<(PipelineStage, String)>,
    start_failure: Option<String>,
    score: f64,
    class: Option<i64>,
    verify_result: bool
}

impl Default for Script {
    fn default() -> Self {
        Self {
            failures: Vec::new(),
            start_failure: None,
            score: 0.92,
            class: Some(0),
            verify_result: true
        }
    }
}

/// Scriptable [`ProcessingService`].
///
/// By default every stage succeeds with score 0.92, class 0 and a proof that
/// verifies.
#[derive(Default)]
pub struct FakeProcessingService {
    initialized: AtomicBool,
    collecting: AtomicBool,
    script: Mutex<Script>,
    calls: Mutex<Vec<ServiceCall>>,
    readings: Mutex<Vec<Reading>>,
    stop_timestamps: Mutex<Vec<i64>>
}

impl FakeProcessingService {
    /// An uninitialized service.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialized() -> Self {
        let service = Self::new();
        service.initialized.store(true, Ordering::SeqCst);
        service
    }

    pub fn fail_at(&self, stage: PipelineStage, reason: impl Into<String>) {
        self.script.lock().failures.push((stage, reason.into()));
    }

    pub fn fail_start_capture(&self, reason: impl Into<String>) {
        self.script.lock().start_failure = Some(reason.into());
    }

    pub fn set_score(&self, score: f64) {
        self.script.lock().score = score;
    }

    /// `None` leaves `class` out of the public inputs.
    pub fn set_class(&self, class: Option<i64>) {
        self.script.lock().class = class;
    }

    pub fn set_verify_result(&self, verified: bool) {
        self.script.lock().verify_result = verified;
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: ServiceCall) -> usize {
        self.calls.lock().iter().filter(|c| **c == call).count()
    }

    /// Readings collected since the last `start_capture`.
    pub fn readings(&self) -> Vec<Reading> {
        self.readings.lock().clone()
    }

    pub fn stop_timestamps(&self) -> Vec<i64> {
        self.stop_timestamps.lock().clone()
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting.load(Ordering::SeqCst)
    }

    fn enter(&self, call: ServiceCall) -> Result<(), ProcessingError> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(ProcessingError::NotInitialized);
        }
        self.calls.lock().push(call);
        Ok(())
    }

    fn scripted_failure(&self, stage: PipelineStage) -> Result<(), ProcessingError> {
        let script = self.script.lock();
        match script.failures.iter().find(|(s, _)| *s == stage) {
            Some((_, reason)) => Err(ProcessingError::stage(stage, reason.clone())),
            None => Ok(())
        }
    }
}

impl ProcessingService for FakeProcessingService {
    fn initialize(&self, keys: &ProofKeys) -> Result<(), ProcessingError> {
        self.calls.lock().push(ServiceCall::Initialize);
        if keys.proving_key.is_empty() || keys.verifying_key.is_empty() {
            return Err(ProcessingError::InvalidKeys {
                reason: "empty key".to_string()
            });
        }
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn start_capture(&self) -> Result<(), ProcessingError> {
        self.enter(ServiceCall::StartCapture)?;
        if let Some(reason) = self.script.lock().start_failure.clone() {
            return Err(ProcessingError::malformed("collector", reason));
        }
        self.readings.lock().clear();
        self.collecting.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn add_reading(&self, reading: &Reading) -> Result<(), ProcessingError> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(ProcessingError::NotInitialized);
        }
        if !self.collecting.load(Ordering::SeqCst) {
            return Err(ProcessingError::NotCollecting);
        }
        self.readings.lock().push(*reading);
        Ok(())
    }

    fn stop_capture(&self, stop_timestamp_ms: i64) -> Result<SessionBlob, ProcessingError> {
        self.enter(ServiceCall::StopCapture)?;
        self.collecting.store(false, Ordering::SeqCst);
        self.stop_timestamps.lock().push(stop_timestamp_ms);
        self.scripted_failure(PipelineStage::StopCapture)?;

        let session = serde_json::json!({
            "stopped_at_ms": stop_timestamp_ms,
            "readings": self.readings.lock().len()
        });
        Ok(SessionBlob::new(session.to_string().into_bytes()))
    }

    fn extract_features(&self, _session: &SessionBlob) -> Result<FeatureBlob, ProcessingError> {
        self.enter(ServiceCall::ExtractFeatures)?;
        self.scripted_failure(PipelineStage::ExtractFeatures)?;
        Ok(FeatureBlob::new(b"fake-features".to_vec()))
    }

    fn score(&self, _features: &FeatureBlob) -> Result<f64, ProcessingError> {
        self.enter(ServiceCall::Score)?;
        self.scripted_failure(PipelineStage::Score)?;
        Ok(self.script.lock().score)
    }

    fn generate_proof(&self, _features: &FeatureBlob) -> Result<ProofBlob, ProcessingError> {
        self.enter(ServiceCall::GenerateProof)?;
        self.scripted_failure(PipelineStage::GenerateProof)?;

        let public_inputs = match self.script.lock().class {
            Some(class) => serde_json::json!({ "class": class }),
            None => serde_json::json!({ "nonce": 7 })
        };
        let envelope = serde_json::json!({
            "proof_base64": general_purpose::STANDARD.encode(b"fake-proof"),
            "public_inputs_json": public_inputs.to_string()
        });
        Ok(ProofBlob::new(envelope.to_string().into_bytes()))
    }

    fn verify_proof(&self, _proof: &ProofBlob) -> Result<bool, ProcessingError> {
        self.enter(ServiceCall::VerifyProof)?;
        self.scripted_failure(PipelineStage::VerifyProof)?;
        Ok(self.script.lock().verify_result)
    }
}

/// Window consumer that keeps every reading it receives.
#[derive(Default)]
pub struct RecordingSink {
    readings: Mutex<Vec<Reading>>
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn readings(&self) -> Vec<Reading> {
        self.readings.lock().clone()
    }

    pub fn timestamps_ms(&self) -> Vec<i64> {
        self.readings.lock().iter().map(Reading::timestamp_ms).collect()
    }

    pub fn len(&self) -> usize {
        self.readings.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.lock().is_empty()
    }
}

impl ReadingSink for RecordingSink {
    fn accept(&self, reading: &Reading) {
        self.readings.lock().push(*reading);
    }
}

/// Sensor source that replays a fixed sample train each time it is opened.
pub struct ScriptedSource {
    kind: SensorKind,
    samples: Vec<SensorSample>,
    interval: Duration
}

impl ScriptedSource {
    pub fn new(kind: SensorKind, samples: Vec<SensorSample>) -> Self {
        Self {
            kind,
            samples,
            interval: Duration::ZERO
        }
    }

    /// Waits `interval` before each sample.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl kz_core::SensorSource for ScriptedSource {
    fn kind(&self) -> SensorKind {
        self.kind
    }

    fn open(&self) -> mpsc::Receiver<SensorSample> {
        let (tx, rx) = mpsc::channel(self.samples.len().max(1));
        let samples = self.samples.clone();
        let interval = self.interval;
        tokio::spawn(async move {
            for sample in samples {
                if !interval.is_zero() {
                    tokio::time::sleep(interval).await;
                }
                if tx.send(sample).await.is_err() {
                    break;
                }
            }
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uninitialized_calls_fail() {
        let service = FakeProcessingService::new();
        assert_eq!(service.start_capture(), Err(ProcessingError::NotInitialized));
        assert_eq!(
            service.stop_capture(0).unwrap_err(),
            ProcessingError::NotInitialized
        );
        assert!(service.calls().is_empty());
    }

    #[test]
    fn test_initialize_then_capture() {
        let service = FakeProcessingService::new();
        service
            .initialize(&ProofKeys::new(vec![1], vec![2]))
            .unwrap();
        service.start_capture().unwrap();
        service
            .add_reading(&crate::reading_at_ms(1))
            .unwrap();
        assert_eq!(service.readings().len(), 1);
        service.stop_capture(5).unwrap();
        assert_eq!(service.stop_timestamps(), vec![5]);
        assert_eq!(
            service.add_reading(&crate::reading_at_ms(2)),
            Err(ProcessingError::NotCollecting)
        );
    }

    #[test]
    fn test_missing_class_is_omitted_from_public_inputs() {
        let service = FakeProcessingService::initialized();
        service.set_class(None);
        let proof = service
            .generate_proof(&FeatureBlob::new(Vec::new()))
            .unwrap();
        let parts = proof.decompose().unwrap();
        assert_eq!(parts.proof, b"fake-proof");
        assert_eq!(parts.public_inputs.class, 0);
        assert!(parts.public_inputs.extra.contains_key("nonce"));
    }
}
