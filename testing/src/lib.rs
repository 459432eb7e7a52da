//! Shared test fixtures for the capture workspace.
//!
//! Provides:
//! - [`FakeProcessingService`]: a scriptable processing service that records
//!   every call and can fail at any pipeline stage
//! - [`RecordingSink`]: a window consumer that keeps what it receives
//! - [`ScriptedSource`]: a sensor source replaying a fixed sample train
//! - Builders for samples, readings and key material

mod fakes;
mod fixtures;

pub use fakes::*;
pub use fixtures::*;
