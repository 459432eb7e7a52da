//! Local reference implementation of the processing service.

use crate::features::MotionFeatures;
use chrono::Utc;
use errors::{PipelineStage, ProcessingError};
use kz_core::{
    FeatureBlob, ProcessingService, ProofBlob, ProofKeys, PublicInputs, Reading, SessionBlob
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

const PROOF_DOMAIN: &[u8] = b"kinetizk/digest-proof/v1";
const DEFAULT_THRESHOLD: f64 = 0.5;

/// Serialized form of a finished capture, carried by [`SessionBlob`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub started_at_ms: i64,
    pub stopped_at_ms: i64,
    pub readings: Vec<Reading>
}

struct KeyFingerprints {
    proving: [u8; 32],
    verifying: [u8; 32]
}

struct Collector {
    started_at_ms: i64,
    readings: Vec<Reading>
}

/// Deterministic [`ProcessingService`] backed by SHA-256.
///
/// Sessions score by motion energy; `class` is 0 when the score reaches the
/// threshold and 1 otherwise. The proof tag is a digest over both key
/// fingerprints and the public inputs, so any edit to the public inputs fails
/// verification.
pub struct DigestProver {
    keys: OnceLock<KeyFingerprints>,
    collector: Mutex<Option<Collector>>,
    threshold: f64
}

impl Default for DigestProver {
    fn default() -> Self {
        Self::new()
    }
}

impl DigestProver {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_THRESHOLD)
    }

    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            keys: OnceLock::new(),
            collector: Mutex::new(None),
            threshold
        }
    }

    fn fingerprints(&self) -> Result<&KeyFingerprints, ProcessingError> {
        self.keys.get().ok_or(ProcessingError::NotInitialized)
    }

    fn proof_tag(
        &self,
        keys: &KeyFingerprints,
        public_inputs: &PublicInputs
    ) -> Result<Vec<u8>, ProcessingError> {
        let canonical = serde_json::to_vec(public_inputs)
            .map_err(|e| ProcessingError::malformed("public inputs", e))?;
        let mut hasher = Sha256::new();
        hasher.update(PROOF_DOMAIN);
        hasher.update(keys.proving);
        hasher.update(keys.verifying);
        hasher.update(&canonical);
        Ok(hasher.finalize().to_vec())
    }
}

fn fingerprint(key: &[u8]) -> [u8; 32] {
    Sha256::digest(key).into()
}

fn parse_features(features: &FeatureBlob, stage: PipelineStage) -> Result<MotionFeatures, ProcessingError> {
    serde_json::from_slice(features.as_bytes())
        .map_err(|e| ProcessingError::stage(stage, format!("unreadable features: {e}")))
}

impl ProcessingService for DigestProver {
    fn initialize(&self, keys: &ProofKeys) -> Result<(), ProcessingError> {
        if self.keys.get().is_some() {
            tracing::debug!("Processing service already initialized");
            return Ok(());
        }
        if keys.proving_key.is_empty() || keys.verifying_key.is_empty() {
            return Err(ProcessingError::InvalidKeys {
                reason: "proving and verifying keys must be non-empty".to_string()
            });
        }

        let fingerprints = KeyFingerprints {
            proving: fingerprint(&keys.proving_key),
            verifying: fingerprint(&keys.verifying_key)
        };
        if self.keys.set(fingerprints).is_ok() {
            tracing::info!(
                verifying_key = %hex::encode(&fingerprint(&keys.verifying_key)[..8]),
                "Processing service initialized"
            );
        }
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.keys.get().is_some()
    }

    fn start_capture(&self) -> Result<(), ProcessingError> {
        self.fingerprints()?;
        let mut collector = self.collector.lock();
        if collector.is_some() {
            tracing::warn!("Discarding unfinished capture");
        }
        *collector = Some(Collector {
            started_at_ms: Utc::now().timestamp_millis(),
            readings: Vec::new()
        });
        Ok(())
    }

    fn add_reading(&self, reading: &Reading) -> Result<(), ProcessingError> {
        self.fingerprints()?;
        match self.collector.lock().as_mut() {
            Some(collector) => {
                collector.readings.push(*reading);
                Ok(())
            }
            None => Err(ProcessingError::NotCollecting)
        }
    }

    fn stop_capture(&self, stop_timestamp_ms: i64) -> Result<SessionBlob, ProcessingError> {
        self.fingerprints()?;
        let collector = self
            .collector
            .lock()
            .take()
            .ok_or_else(|| ProcessingError::stage(PipelineStage::StopCapture, "no capture in progress"))?;

        let record = SessionRecord {
            started_at_ms: collector.started_at_ms,
            stopped_at_ms: stop_timestamp_ms,
            readings: collector.readings
        };
        let bytes = serde_json::to_vec(&record)
            .map_err(|e| ProcessingError::stage(PipelineStage::StopCapture, e.to_string()))?;
        Ok(SessionBlob::new(bytes))
    }

    fn extract_features(&self, session: &SessionBlob) -> Result<FeatureBlob, ProcessingError> {
        self.fingerprints()?;
        let record: SessionRecord = serde_json::from_slice(session.as_bytes()).map_err(|e| {
            ProcessingError::stage(PipelineStage::ExtractFeatures, format!("unreadable session: {e}"))
        })?;
        let features = MotionFeatures::from_readings(&record.readings).ok_or_else(|| {
            ProcessingError::stage(PipelineStage::ExtractFeatures, "session holds no readings")
        })?;

        let bytes = serde_json::to_vec(&features)
            .map_err(|e| ProcessingError::stage(PipelineStage::ExtractFeatures, e.to_string()))?;
        Ok(FeatureBlob::new(bytes))
    }

    fn score(&self, features: &FeatureBlob) -> Result<f64, ProcessingError> {
        self.fingerprints()?;
        Ok(parse_features(features, PipelineStage::Score)?.score())
    }

    fn generate_proof(&self, features: &FeatureBlob) -> Result<ProofBlob, ProcessingError> {
        let keys = self.fingerprints()?;
        let parsed = parse_features(features, PipelineStage::GenerateProof)?;
        let class = i64::from(parsed.score() < self.threshold);

        let mut extra = serde_json::Map::new();
        extra.insert(
            "features_digest".to_string(),
            serde_json::Value::String(hex::encode(Sha256::digest(features.as_bytes())))
        );
        extra.insert(
            "sample_count".to_string(),
            serde_json::Value::from(parsed.sample_count)
        );
        let public_inputs = PublicInputs { class, extra };

        let tag = self.proof_tag(keys, &public_inputs)?;
        ProofBlob::compose(&tag, &public_inputs)
    }

    fn verify_proof(&self, proof: &ProofBlob) -> Result<bool, ProcessingError> {
        let keys = self.fingerprints()?;
        let parts = proof.decompose()?;
        let expected = self.proof_tag(keys, &parts.public_inputs)?;
        Ok(expected == parts.proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kz_core::{AxisTriple, NANOS_PER_MILLI};

    fn keys() -> ProofKeys {
        ProofKeys::new(b"proving".to_vec(), b"verifying".to_vec())
    }

    fn initialized() -> DigestProver {
        let prover = DigestProver::new();
        prover.initialize(&keys()).unwrap();
        prover
    }

    fn feed(prover: &DigestProver, count: i64, amplitude: f64) {
        for i in 0..count {
            let swing = if i % 2 == 0 { amplitude } else { 0.0 };
            let reading = Reading::new(
                i * 5 * NANOS_PER_MILLI,
                AxisTriple::new(swing, 0.0, 0.0),
                AxisTriple::new(0.0, swing, 0.0)
            );
            prover.add_reading(&reading).unwrap();
        }
    }

    #[test]
    fn test_operations_fail_before_initialize() {
        let prover = DigestProver::new();
        assert!(!prover.is_initialized());
        assert_eq!(prover.start_capture(), Err(ProcessingError::NotInitialized));
        assert_eq!(
            prover.stop_capture(0).unwrap_err(),
            ProcessingError::NotInitialized
        );
        assert_eq!(
            prover.score(&FeatureBlob::default()).unwrap_err(),
            ProcessingError::NotInitialized
        );
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let prover = initialized();
        prover
            .initialize(&ProofKeys::new(b"other".to_vec(), b"keys".to_vec()))
            .unwrap();
        assert!(prover.is_initialized());
    }

    #[test]
    fn test_initialize_rejects_empty_keys() {
        let prover = DigestProver::new();
        let err = prover
            .initialize(&ProofKeys::new(Vec::new(), b"vk".to_vec()))
            .unwrap_err();
        assert!(matches!(err, ProcessingError::InvalidKeys { .. }));
        assert!(!prover.is_initialized());
    }

    #[test]
    fn test_add_reading_requires_capture() {
        let prover = initialized();
        let reading = Reading::new(0, AxisTriple::ZERO, AxisTriple::ZERO);
        assert_eq!(prover.add_reading(&reading), Err(ProcessingError::NotCollecting));
    }

    #[test]
    fn test_stop_without_start_fails_stage() {
        let prover = initialized();
        let err = prover.stop_capture(1).unwrap_err();
        assert!(matches!(
            err,
            ProcessingError::StageFailed {
                stage: PipelineStage::StopCapture,
                ..
            }
        ));
    }

    #[test]
    fn test_stop_records_readings_and_timestamp() {
        let prover = initialized();
        prover.start_capture().unwrap();
        feed(&prover, 4, 1.0);

        let blob = prover.stop_capture(1_700_000_000_000).unwrap();
        let record: SessionRecord = serde_json::from_slice(blob.as_bytes()).unwrap();
        assert_eq!(record.readings.len(), 4);
        assert_eq!(record.stopped_at_ms, 1_700_000_000_000);

        // The collector is consumed by stop.
        assert!(prover.stop_capture(0).is_err());
    }

    #[test]
    fn test_empty_session_fails_extraction() {
        let prover = initialized();
        prover.start_capture().unwrap();
        let blob = prover.stop_capture(0).unwrap();

        let err = prover.extract_features(&blob).unwrap_err();
        assert!(matches!(
            err,
            ProcessingError::StageFailed {
                stage: PipelineStage::ExtractFeatures,
                ..
            }
        ));
    }

    #[test]
    fn test_moving_session_proves_legitimate_and_verifies() {
        let prover = initialized();
        prover.start_capture().unwrap();
        feed(&prover, 30, 1.2);
        let session = prover.stop_capture(0).unwrap();

        let features = prover.extract_features(&session).unwrap();
        let score = prover.score(&features).unwrap();
        let proof = prover.generate_proof(&features).unwrap();

        assert!(score > 0.5);
        assert!(prover.verify_proof(&proof).unwrap());
        assert_eq!(proof.decompose().unwrap().public_inputs.class, 0);
    }

    #[test]
    fn test_still_session_is_classified_synthetic() {
        let prover = initialized();
        prover.start_capture().unwrap();
        feed(&prover, 30, 0.0);
        let session = prover.stop_capture(0).unwrap();

        let features = prover.extract_features(&session).unwrap();
        let proof = prover.generate_proof(&features).unwrap();
        assert_eq!(proof.decompose().unwrap().public_inputs.class, 1);
        assert!(prover.verify_proof(&proof).unwrap());
    }

    #[test]
    fn test_tampered_public_inputs_fail_verification() {
        let prover = initialized();
        prover.start_capture().unwrap();
        feed(&prover, 30, 0.0);
        let session = prover.stop_capture(0).unwrap();
        let features = prover.extract_features(&session).unwrap();
        let parts = prover.generate_proof(&features).unwrap().decompose().unwrap();

        let mut forged_inputs = parts.public_inputs.clone();
        forged_inputs.class = 0;
        let forged = ProofBlob::compose(&parts.proof, &forged_inputs).unwrap();

        assert!(!prover.verify_proof(&forged).unwrap());
    }

    #[test]
    fn test_proof_from_other_keys_fails_verification() {
        let prover = initialized();
        prover.start_capture().unwrap();
        feed(&prover, 10, 1.0);
        let features = prover
            .extract_features(&prover.stop_capture(0).unwrap())
            .unwrap();
        let proof = prover.generate_proof(&features).unwrap();

        let other = DigestProver::new();
        other
            .initialize(&ProofKeys::new(b"proving".to_vec(), b"another".to_vec()))
            .unwrap();
        assert!(!other.verify_proof(&proof).unwrap());
    }
}
