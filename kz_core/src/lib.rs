//! # KinetiZK Core
//!
//! Shared types and capability traits for the touch-triggered motion capture
//! engine.
//!
//! This crate provides:
//! - The fused [`Reading`] model and raw [`SensorSample`] events
//! - Opaque payloads exchanged with the processing service
//! - The [`CaptureOutcome`] record produced once per closed window
//! - Capability traits at the seams of the engine: [`ProcessingService`],
//!   [`ReadingSink`] and [`SensorSource`]

pub mod traits;
pub mod types;

pub use traits::{ProcessingService, ReadingSink, SensorSource};
pub use types::{
    AxisTriple, CaptureOutcome, Coverage, FeatureBlob, ProofBlob, ProofKeys, ProofParts,
    PublicInputs, Reading, SensorKind, SensorSample, SessionBlob, SessionTicket, TimestampNs,
    TriggerOrigin, NANOS_PER_MILLI
};
