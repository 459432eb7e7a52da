//! Synthetic tap scheduler.
//!
//! While running, the bot waits a uniformly random delay, then presses at a
//! random position, holds, and releases the window its own press opened.
//! A press that lands while another session is collecting is dropped.
//! Cancellation is observed between ticks only: a press that started is
//! always followed by its release.

use crate::machine::CloseRequest;
use crate::telemetry::Telemetry;
use crate::trigger::{SyntheticTap, TriggerTarget};
use config::BotConfig;
use errors::{CaptureError, CaptureResult};
use kz_core::TriggerOrigin;
use rand::Rng;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct BotScheduler {
    config: BotConfig
}

impl BotScheduler {
    pub fn new(config: BotConfig) -> Self {
        Self { config }
    }

    fn next_delay(&self) -> Duration {
        let low = self.config.min_delay_ms.min(self.config.max_delay_ms);
        let high = self.config.min_delay_ms.max(self.config.max_delay_ms);
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }

    /// Starts ticking against `target`. The task ends when the handle is
    /// stopped or dropped, or when the target is gone.
    pub fn spawn(self, target: Weak<dyn TriggerTarget>) -> BotHandle {
        let (cancel, mut cancelled) = watch::channel(false);

        let task = tokio::spawn(async move {
            tracing::info!(
                min_delay_ms = self.config.min_delay_ms,
                max_delay_ms = self.config.max_delay_ms,
                "Bot started"
            );
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(self.next_delay()) => {}
                    _ = cancelled.changed() => break,
                }
                if *cancelled.borrow() {
                    break;
                }
                let Some(target) = target.upgrade() else {
                    break;
                };
                if let Err(e) = self.tick(target).await {
                    tracing::error!(error = %e, "Bot cannot continue");
                    break;
                }
            }
            tracing::info!("Bot stopped");
        });

        BotHandle { cancel, task }
    }

    /// One press/hold/release cycle. Only an uninitialized processing
    /// service is reported as an error; other failures end the tick.
    async fn tick(&self, target: Arc<dyn TriggerTarget>) -> CaptureResult<()> {
        let (x, y) = target.surface().sample(self.config.vertical_fraction);
        let down_timestamp_ns = target.now_ns();

        let begun = match target.press(TriggerOrigin::Synthetic, down_timestamp_ns) {
            Ok(begun) => begun,
            Err(CaptureError::ServiceNotInitialized) => {
                return Err(CaptureError::ServiceNotInitialized);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Bot press rejected");
                return Ok(());
            }
        };
        let ticket = begun.ticket();
        Telemetry::record_bot_tick(ticket.is_some());
        target.on_synthetic_tap(&SyntheticTap {
            x,
            y,
            down_timestamp_ns,
            accepted: ticket.is_some(),
            ticket
        });

        let Some(ticket) = ticket else {
            tracing::debug!("Bot tap dropped, session in progress");
            return Ok(());
        };

        tokio::time::sleep(Duration::from_millis(self.config.hold_ms)).await;

        match target.release(CloseRequest::Owned(ticket)) {
            Ok(Some(closed)) => {
                tokio::spawn(async move {
                    if let Err(e) = target.complete(closed).await {
                        tracing::warn!(session = %ticket.id, error = %e, "Bot session failed");
                    }
                });
            }
            Ok(None) => {
                tracing::debug!(session = %ticket.id, "Bot window already closed");
            }
            Err(CaptureError::ServiceNotInitialized) => {
                return Err(CaptureError::ServiceNotInitialized);
            }
            Err(e) => {
                tracing::warn!(session = %ticket.id, error = %e, "Bot release failed");
            }
        }
        Ok(())
    }
}

/// Running bot. Dropping the handle cancels it at the next tick boundary.
pub struct BotHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>
}

impl BotHandle {
    pub fn stop(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops the bot and waits for an in-flight tick to release its window.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Bot task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::WindowSummary;
    use crate::machine::{BeginOutcome, ClosedSession};
    use async_trait::async_trait;
    use kz_core::{CaptureOutcome, SessionBlob, SessionTicket, TimestampNs};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Target {
        active: Mutex<Option<SessionTicket>>,
        presses: Mutex<Vec<TriggerOrigin>>,
        taps: Mutex<Vec<SyntheticTap>>,
        closed: Mutex<Vec<SessionTicket>>,
        uninitialized: bool
    }

    #[async_trait]
    impl TriggerTarget for Target {
        fn now_ns(&self) -> TimestampNs {
            0
        }

        fn press(&self, origin: TriggerOrigin, ts: TimestampNs) -> CaptureResult<BeginOutcome> {
            self.presses.lock().push(origin);
            if self.uninitialized {
                return Err(CaptureError::ServiceNotInitialized);
            }
            let mut active = self.active.lock();
            if let Some(active) = *active {
                return Ok(BeginOutcome::Ignored { active });
            }
            let ticket = SessionTicket::issue(origin, ts);
            *active = Some(ticket);
            Ok(BeginOutcome::Started(ticket))
        }

        fn release(&self, request: CloseRequest) -> CaptureResult<Option<ClosedSession>> {
            let mut active = self.active.lock();
            let Some(ticket) = *active else {
                return Ok(None);
            };
            if let CloseRequest::Owned(owner) = request {
                if owner != ticket {
                    return Ok(None);
                }
            }
            *active = None;
            self.closed.lock().push(ticket);
            Ok(Some(ClosedSession {
                ticket,
                stop_timestamp_ms: 0,
                window: WindowSummary::default(),
                stop: Ok(SessionBlob::new(Vec::new()))
            }))
        }

        async fn complete(&self, _closed: ClosedSession) -> CaptureResult<CaptureOutcome> {
            Ok(CaptureOutcome::degraded())
        }

        fn on_synthetic_tap(&self, tap: &SyntheticTap) {
            self.taps.lock().push(*tap);
        }
    }

    fn config() -> BotConfig {
        BotConfig {
            min_delay_ms: 600,
            max_delay_ms: 1300,
            hold_ms: 70,
            ..BotConfig::default()
        }
    }

    fn weak(target: &Arc<Target>) -> Weak<dyn TriggerTarget> {
        let target: Arc<dyn TriggerTarget> = target.clone();
        Arc::downgrade(&target)
    }

    #[tokio::test(start_paused = true)]
    async fn test_bot_ticks_and_closes_own_windows() {
        let target = Arc::new(Target::default());
        let handle = BotScheduler::new(config()).spawn(weak(&target));

        tokio::time::sleep(Duration::from_secs(10)).await;
        handle.shutdown().await;

        let presses = target.presses.lock().len();
        // One tick every 0.67s..1.37s including the hold.
        assert!((7..=15).contains(&presses), "presses = {presses}");
        assert!(target.presses.lock().iter().all(|o| *o == TriggerOrigin::Synthetic));
        assert!(target.active.lock().is_none());
        assert_eq!(target.closed.lock().len(), presses);
        assert!(target.taps.lock().iter().all(|t| t.accepted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bot_never_closes_foreign_window() {
        let target = Arc::new(Target::default());
        let genuine = match target.press(TriggerOrigin::Genuine, 0).unwrap() {
            BeginOutcome::Started(ticket) => ticket,
            other => panic!("Expected start, got {other:?}")
        };

        let handle = BotScheduler::new(config()).spawn(weak(&target));
        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.shutdown().await;

        assert_eq!(*target.active.lock(), Some(genuine));
        assert!(target.closed.lock().is_empty());
        let taps = target.taps.lock();
        assert!(!taps.is_empty());
        assert!(taps.iter().all(|t| !t.accepted && t.ticket.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_ticks() {
        let target = Arc::new(Target::default());
        let handle = BotScheduler::new(config()).spawn(weak(&target));

        handle.stop();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!handle.is_running());
        assert!(target.presses.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bot_exits_when_target_dropped() {
        let target = Arc::new(Target::default());
        let handle = BotScheduler::new(config()).spawn(weak(&target));
        drop(target);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!handle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bot_stops_when_service_uninitialized() {
        let target = Arc::new(Target {
            uninitialized: true,
            ..Default::default()
        });
        let handle = BotScheduler::new(config()).spawn(weak(&target));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!handle.is_running());
        assert_eq!(target.presses.lock().len(), 1);
        assert!(target.taps.lock().is_empty());
    }

    #[test]
    fn test_delay_within_configured_range() {
        let scheduler = BotScheduler::new(config());
        for _ in 0..200 {
            let delay = scheduler.next_delay();
            assert!(delay >= Duration::from_millis(600) && delay <= Duration::from_millis(1300));
        }
    }
}
