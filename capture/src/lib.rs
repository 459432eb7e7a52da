//! # Capture Engine
//!
//! Touch-triggered motion capture: two sensor streams are fused into
//! timestamped readings, retained in a bounded history and, while a trigger
//! is held, streamed into the processing service together with a pre-roll of
//! the history. Closing the window runs the proof pipeline and yields one
//! [`CaptureOutcome`](kz_core::CaptureOutcome).
//!
//! ```text
//!  accel ──┐                      ┌── RingBuffer (always)
//!          ├─► WindowAssembler ───┤
//!  gyro  ──┘                      └── ReadingSink (window open)
//!
//!  PointerTrigger / BotScheduler ─► CaptureStateMachine ─► ProofPipeline
//! ```
//!
//! [`CaptureSession`] wires the pieces together and is the entry point for
//! presentation layers.

pub mod assembler;
pub mod bot;
pub mod clock;
pub mod machine;
pub mod pipeline;
pub mod ring_buffer;
pub mod sensors;
pub mod session;
pub mod telemetry;
pub mod trigger;

pub use assembler::{WindowAssembler, WindowOpen, WindowSummary};
pub use bot::{BotHandle, BotScheduler};
pub use clock::SensorClock;
pub use machine::{BeginOutcome, CaptureState, CaptureStateMachine, CloseRequest, ClosedSession};
pub use pipeline::{PipelineRun, ProofPipeline, StageFailure};
pub use ring_buffer::{RingBuffer, Timestamped};
pub use sensors::{Excitation, SensorHub, SimulatedImu};
pub use session::{CaptureSession, SessionEvent};
pub use trigger::{
    PointerAction, PointerEvent, PointerTrigger, SurfaceBounds, SyntheticTap, TriggerTarget,
};
