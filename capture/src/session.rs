//! Capture session facade.
//!
//! [`CaptureSession`] owns the assembler, listener hub, state machine and
//! pipeline for one processing service, exposes begin/end for presentation
//! layers and publishes [`SessionEvent`]s on a broadcast channel.

use crate::assembler::WindowAssembler;
use crate::bot::{BotHandle, BotScheduler};
use crate::clock::SensorClock;
use crate::machine::{BeginOutcome, CaptureState, CaptureStateMachine, CloseRequest, ClosedSession};
use crate::pipeline::ProofPipeline;
use crate::sensors::SensorHub;
use crate::trigger::{SurfaceBounds, SyntheticTap, TriggerTarget};
use async_trait::async_trait;
use config::{BotConfig, CaptureConfig};
use errors::{CaptureError, CaptureResult, PipelineStage};
use kz_core::{
    CaptureOutcome, ProcessingService, SensorSource, SessionTicket, TimestampNs, TriggerOrigin
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle notifications for presentation layers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Started {
        ticket: SessionTicket
    },
    Ignored {
        origin: TriggerOrigin,
        active: SessionTicket
    },
    /// Why a session did not verify. Sent at most once per closed window,
    /// before its `Finished`.
    Failed {
        ticket: SessionTicket,
        stage: PipelineStage,
        message: String
    },
    Finished {
        ticket: SessionTicket,
        outcome: CaptureOutcome,
        elapsed_ms: u64
    },
    BotTap {
        tap: SyntheticTap
    }
}

pub struct CaptureSession {
    machine: CaptureStateMachine,
    pipeline: ProofPipeline,
    clock: SensorClock,
    events: broadcast::Sender<SessionEvent>,
    bot_config: BotConfig,
    bot: Mutex<Option<BotHandle>>,
    surface: Mutex<SurfaceBounds>
}

impl CaptureSession {
    /// Wires a session over `sources`. When listeners are retained while
    /// idle they are registered immediately, which requires a tokio runtime.
    pub fn new(
        config: &CaptureConfig,
        service: Arc<dyn ProcessingService>,
        sources: Vec<Arc<dyn SensorSource>>,
        clock: SensorClock
    ) -> CaptureResult<Arc<Self>> {
        let assembler = Arc::new(WindowAssembler::from_config(&config.window));
        let hub = Arc::new(SensorHub::new(Arc::clone(&assembler), sources));
        if config.window.retain_while_idle {
            hub.register()?;
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Arc::new(Self {
            machine: CaptureStateMachine::new(
                assembler,
                hub,
                Arc::clone(&service),
                config.window.retain_while_idle
            ),
            pipeline: ProofPipeline::new(service),
            clock,
            events,
            bot_config: config.bot.clone(),
            bot: Mutex::new(None),
            surface: Mutex::new(SurfaceBounds::default())
        }))
    }

    pub fn clock(&self) -> SensorClock {
        self.clock
    }

    pub fn state(&self) -> CaptureState {
        self.machine.state()
    }

    pub fn assembler(&self) -> &Arc<WindowAssembler> {
        self.machine.assembler()
    }

    pub fn hub(&self) -> &Arc<SensorHub> {
        self.machine.hub()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Genuine begin stamped with the current sensor time.
    pub fn begin_session(&self) -> CaptureResult<BeginOutcome> {
        self.begin_at(TriggerOrigin::Genuine, self.clock.now_ns())
    }

    pub fn begin_at(
        &self,
        origin: TriggerOrigin,
        down_timestamp_ns: TimestampNs
    ) -> CaptureResult<BeginOutcome> {
        let begun = self.machine.begin(origin, down_timestamp_ns)?;
        match begun {
            BeginOutcome::Started(ticket) => self.emit(SessionEvent::Started { ticket }),
            BeginOutcome::Ignored { active } => self.emit(SessionEvent::Ignored { origin, active })
        }
        Ok(begun)
    }

    /// Closes whatever window is open and runs the pipeline.
    ///
    /// Returns `None` if nothing was collecting.
    pub async fn end_session(&self) -> CaptureResult<Option<CaptureOutcome>> {
        self.end(CloseRequest::Any).await
    }

    pub async fn end(&self, request: CloseRequest) -> CaptureResult<Option<CaptureOutcome>> {
        let Some(closed) = self.machine.end(request)? else {
            return Ok(None);
        };
        self.finish(closed).await.map(Some)
    }

    /// Runs the pipeline for a closed window and publishes its result.
    pub async fn finish(&self, closed: ClosedSession) -> CaptureResult<CaptureOutcome> {
        let run = self.pipeline.complete(closed).await?;
        if let Some(failure) = &run.failure {
            self.emit(SessionEvent::Failed {
                ticket: run.ticket,
                stage: failure.stage,
                message: failure.message.clone()
            });
        }
        self.emit(SessionEvent::Finished {
            ticket: run.ticket,
            outcome: run.outcome.clone(),
            elapsed_ms: run.elapsed_ms()
        });
        Ok(run.outcome)
    }

    /// Turns the bot scheduler on or off. Returns whether the mode changed.
    ///
    /// Enabling fails with [`CaptureError::ServiceNotInitialized`] while the
    /// processing service has no key material.
    pub fn set_synthetic_mode(self: &Arc<Self>, enabled: bool) -> CaptureResult<bool> {
        let mut bot = self.bot.lock();
        if !enabled {
            return Ok(match bot.take() {
                Some(handle) => {
                    handle.stop();
                    true
                }
                None => false
            });
        }
        if bot.as_ref().is_some_and(BotHandle::is_running) {
            return Ok(false);
        }

        if !self.machine.is_service_initialized() {
            tracing::error!("Bot mode enabled before the processing service was initialized");
            return Err(CaptureError::ServiceNotInitialized);
        }
        tokio::runtime::Handle::try_current().map_err(|e| CaptureError::Runtime {
            reason: format!("bot mode needs a tokio runtime: {e}")
        })?;
        let target: Arc<dyn TriggerTarget> = self.clone();
        *bot = Some(BotScheduler::new(self.bot_config.clone()).spawn(Arc::downgrade(&target)));
        Ok(true)
    }

    pub fn is_synthetic_mode(&self) -> bool {
        self.bot.lock().as_ref().is_some_and(BotHandle::is_running)
    }

    pub fn set_surface(&self, bounds: SurfaceBounds) {
        *self.surface.lock() = bounds;
    }

    /// Stops the bot, finishes any open window and releases the listeners.
    pub async fn shutdown(&self) -> CaptureResult<Option<CaptureOutcome>> {
        let bot = self.bot.lock().take();
        if let Some(handle) = bot {
            handle.shutdown().await;
        }
        let outcome = self.end_session().await;
        self.machine.hub().unregister();
        outcome
    }
}

#[async_trait]
impl TriggerTarget for CaptureSession {
    fn now_ns(&self) -> TimestampNs {
        self.clock.now_ns()
    }

    fn press(
        &self,
        origin: TriggerOrigin,
        down_timestamp_ns: TimestampNs
    ) -> CaptureResult<BeginOutcome> {
        self.begin_at(origin, down_timestamp_ns)
    }

    fn release(&self, request: CloseRequest) -> CaptureResult<Option<ClosedSession>> {
        self.machine.end(request)
    }

    async fn complete(&self, closed: ClosedSession) -> CaptureResult<CaptureOutcome> {
        self.finish(closed).await
    }

    fn surface(&self) -> SurfaceBounds {
        *self.surface.lock()
    }

    fn on_synthetic_tap(&self, tap: &SyntheticTap) {
        self.emit(SessionEvent::BotTap { tap: *tap });
    }
}
