//! Idle / Collecting state machine.
//!
//! The machine is the single authority over sensor listener registration and
//! the open window. `begin` while collecting and `end` while idle are
//! no-ops. The collector of the processing service is started on
//! `Idle → Collecting` and stopped as part of `Collecting → Idle`, under the
//! state lock, so a new session can never restart a collector that has not
//! been finalized.

use crate::assembler::{WindowAssembler, WindowOpen, WindowSummary};
use crate::sensors::SensorHub;
use crate::telemetry::Telemetry;
use chrono::Utc;
use errors::{CaptureError, CaptureResult, ProcessingError};
use kz_core::{
    ProcessingService, Reading, ReadingSink, SessionBlob, SessionTicket, TimestampNs,
    TriggerOrigin
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Current state of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Collecting(SessionTicket)
}

impl CaptureState {
    pub fn is_collecting(&self) -> bool {
        matches!(self, Self::Collecting(_))
    }
}

/// Result of a begin trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    Started(SessionTicket),
    /// A session was already collecting; nothing changed.
    Ignored { active: SessionTicket }
}

impl BeginOutcome {
    pub fn ticket(&self) -> Option<SessionTicket> {
        match self {
            Self::Started(ticket) => Some(*ticket),
            Self::Ignored { .. } => None
        }
    }
}

/// Which window an end trigger may close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseRequest {
    /// Whatever window is open.
    Any,
    /// Only the window opened with this ticket.
    Owned(SessionTicket)
}

/// A window that has been closed and whose collector has been stopped.
#[derive(Debug, Clone)]
pub struct ClosedSession {
    pub ticket: SessionTicket,
    pub stop_timestamp_ms: i64,
    pub window: WindowSummary,
    pub stop: Result<SessionBlob, ProcessingError>
}

/// Window consumer that forwards readings into the service collector.
struct ServiceSink {
    service: Arc<dyn ProcessingService>,
    ticket: SessionTicket
}

impl ReadingSink for ServiceSink {
    fn accept(&self, reading: &Reading) {
        if let Err(e) = self.service.add_reading(reading) {
            Telemetry::record_sink_error();
            tracing::warn!(session = %self.ticket.id, error = %e, "Collector rejected reading");
        }
    }
}

pub struct CaptureStateMachine {
    state: Mutex<CaptureState>,
    assembler: Arc<WindowAssembler>,
    hub: Arc<SensorHub>,
    service: Arc<dyn ProcessingService>,
    retain_while_idle: bool
}

impl CaptureStateMachine {
    pub fn new(
        assembler: Arc<WindowAssembler>,
        hub: Arc<SensorHub>,
        service: Arc<dyn ProcessingService>,
        retain_while_idle: bool
    ) -> Self {
        Self {
            state: Mutex::new(CaptureState::Idle),
            assembler,
            hub,
            service,
            retain_while_idle
        }
    }

    pub fn state(&self) -> CaptureState {
        *self.state.lock()
    }

    pub fn assembler(&self) -> &Arc<WindowAssembler> {
        &self.assembler
    }

    pub fn hub(&self) -> &Arc<SensorHub> {
        &self.hub
    }

    pub fn is_service_initialized(&self) -> bool {
        self.service.is_initialized()
    }

    /// Handles a begin trigger stamped `down_timestamp_ns` on the sensor clock.
    ///
    /// Fails with [`CaptureError::ServiceNotInitialized`] if the processing
    /// service has not been initialized; the machine stays idle.
    pub fn begin(
        &self,
        origin: TriggerOrigin,
        down_timestamp_ns: TimestampNs
    ) -> CaptureResult<BeginOutcome> {
        let mut state = self.state.lock();
        if let CaptureState::Collecting(active) = *state {
            Telemetry::record_session_ignored(origin);
            tracing::debug!(
                origin = origin.as_str(),
                active = %active.id,
                "Begin ignored, already collecting"
            );
            return Ok(BeginOutcome::Ignored { active });
        }

        if !self.service.is_initialized() {
            tracing::error!("Capture started before the processing service was initialized");
            return Err(CaptureError::ServiceNotInitialized);
        }

        let registered_here = self.hub.register()?;
        if let Err(e) = self.service.start_capture() {
            if registered_here && !self.retain_while_idle {
                self.hub.unregister();
            }
            return Err(e.into());
        }

        let ticket = SessionTicket::issue(origin, down_timestamp_ns);
        let sink = Arc::new(ServiceSink {
            service: Arc::clone(&self.service),
            ticket
        });
        if let WindowOpen::AlreadyOpen = self.assembler.begin_window(down_timestamp_ns, sink) {
            // Only this machine opens windows, and it is idle.
            return Err(CaptureError::Runtime {
                reason: "window open while idle".to_string()
            });
        }

        *state = CaptureState::Collecting(ticket);
        Telemetry::record_session_started(origin);
        tracing::info!(
            session = %ticket.id,
            origin = origin.as_str(),
            down_timestamp_ns,
            "Collecting"
        );
        Ok(BeginOutcome::Started(ticket))
    }

    /// Handles an end trigger.
    ///
    /// Blocking: the collector is stopped synchronously before this returns.
    ///
    /// Returns `None` when idle, or when `request` names a window other than
    /// the open one. Otherwise closes the window, releases the listeners
    /// unless they are retained while idle, stops the collector and returns
    /// to `Idle` whatever the collector reports.
    pub fn end(&self, request: CloseRequest) -> CaptureResult<Option<ClosedSession>> {
        let mut state = self.state.lock();
        let CaptureState::Collecting(active) = *state else {
            return Ok(None);
        };
        if let CloseRequest::Owned(ticket) = request {
            if ticket.id != active.id {
                tracing::debug!(
                    requested = %ticket.id,
                    active = %active.id,
                    "End ignored, window owned by another trigger"
                );
                return Ok(None);
            }
        }

        let window = self.assembler.end_window().unwrap_or_default();
        if !self.retain_while_idle {
            self.hub.unregister();
        }
        // stop_capture runs on the caller's thread with the state lock held:
        // no begin can reset the collector until it has been finalized. Only
        // the later stages move to the blocking pool (ProofPipeline::complete),
        // so a slow collector stalls this call and any concurrent trigger.
        let stop_timestamp_ms = Utc::now().timestamp_millis();
        let stop = self.service.stop_capture(stop_timestamp_ms);
        *state = CaptureState::Idle;
        drop(state);

        Telemetry::record_session_closed();
        tracing::info!(
            session = %active.id,
            delivered = window.delivered(),
            "Idle"
        );

        if matches!(stop, Err(ProcessingError::NotInitialized)) {
            return Err(CaptureError::ServiceNotInitialized);
        }
        Ok(Some(ClosedSession {
            ticket: active,
            stop_timestamp_ms,
            window,
            stop
        }))
    }
}
