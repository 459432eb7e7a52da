//! Post-window proof pipeline.
//!
//! Runs extract-features → score → generate-proof → verify-proof on the
//! session returned by stop-capture. The first failing stage short-circuits
//! the rest and the run yields [`CaptureOutcome::degraded`] together with a
//! [`StageFailure`] describing it. An uninitialized service is not a stage
//! failure and is returned as an error.

use crate::machine::ClosedSession;
use crate::telemetry::Telemetry;
use errors::{CaptureError, CaptureResult, PipelineStage, ProcessingError};
use kz_core::{CaptureOutcome, ProcessingService, SessionBlob, SessionTicket};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

const VERIFICATION_FAILED: &str = "Proof verification failed";

/// Human-readable description of why a run did not verify.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageFailure {
    pub stage: PipelineStage,
    pub message: String
}

/// Result of running the pipeline over one closed window.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub ticket: SessionTicket,
    pub outcome: CaptureOutcome,
    pub failure: Option<StageFailure>,
    pub elapsed: Duration
}

impl PipelineRun {
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

type StageResult<T> = Result<T, (PipelineStage, ProcessingError)>;

fn at(stage: PipelineStage) -> impl FnOnce(ProcessingError) -> (PipelineStage, ProcessingError) {
    move |e| (stage, e)
}

fn run_stages(
    service: &dyn ProcessingService,
    stop: Result<SessionBlob, ProcessingError>
) -> StageResult<CaptureOutcome> {
    let session = stop.map_err(at(PipelineStage::StopCapture))?;
    let features = service
        .extract_features(&session)
        .map_err(at(PipelineStage::ExtractFeatures))?;
    let score = service
        .score(&features)
        .map_err(at(PipelineStage::Score))?;
    let proof = service
        .generate_proof(&features)
        .map_err(at(PipelineStage::GenerateProof))?;
    let parts = proof
        .decompose()
        .map_err(at(PipelineStage::GenerateProof))?;
    let verified = service
        .verify_proof(&proof)
        .map_err(at(PipelineStage::VerifyProof))?;

    Ok(CaptureOutcome {
        proof: parts.proof,
        classification: parts.public_inputs.class,
        verified,
        score
    })
}

pub struct ProofPipeline {
    service: Arc<dyn ProcessingService>
}

impl ProofPipeline {
    pub fn new(service: Arc<dyn ProcessingService>) -> Self {
        Self { service }
    }

    /// Runs the remaining stages on the calling thread.
    pub fn run(&self, closed: ClosedSession) -> CaptureResult<PipelineRun> {
        execute(self.service.as_ref(), closed)
    }

    /// Runs the remaining stages on the blocking pool.
    pub async fn complete(&self, closed: ClosedSession) -> CaptureResult<PipelineRun> {
        let service = Arc::clone(&self.service);
        tokio::task::spawn_blocking(move || execute(service.as_ref(), closed))
            .await
            .map_err(|e| CaptureError::Runtime {
                reason: format!("pipeline task failed: {e}")
            })?
    }
}

fn execute(service: &dyn ProcessingService, closed: ClosedSession) -> CaptureResult<PipelineRun> {
    let started = Instant::now();
    let ticket = closed.ticket;

    let (outcome, failure) = match run_stages(service, closed.stop) {
        Ok(outcome) if outcome.verified => (outcome, None),
        Ok(outcome) => {
            tracing::warn!(session = %ticket.id, "Proof did not verify");
            let failure = StageFailure {
                stage: PipelineStage::VerifyProof,
                message: VERIFICATION_FAILED.to_string()
            };
            (outcome, Some(failure))
        }
        Err((_, ProcessingError::NotInitialized)) => {
            tracing::error!(session = %ticket.id, "Pipeline ran before the service was initialized");
            return Err(CaptureError::ServiceNotInitialized);
        }
        Err((stage, e)) => {
            Telemetry::record_stage_failure(stage);
            tracing::warn!(session = %ticket.id, %stage, error = %e, "Pipeline stage failed");
            let failure = StageFailure {
                stage,
                message: e.to_string()
            };
            (CaptureOutcome::degraded(), Some(failure))
        }
    };

    let elapsed = started.elapsed();
    Telemetry::record_outcome(outcome.verified, elapsed.as_secs_f64() * 1000.0);
    tracing::info!(
        session = %ticket.id,
        verified = outcome.verified,
        classification = outcome.classification,
        score = outcome.score,
        elapsed_ms = elapsed.as_millis() as u64,
        "Pipeline finished"
    );

    Ok(PipelineRun {
        ticket,
        outcome,
        failure,
        elapsed
    })
}
