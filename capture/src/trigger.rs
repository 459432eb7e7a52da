//! Trigger sources.
//!
//! A trigger source turns gestures into begin/end requests against a
//! [`TriggerTarget`]. Genuine pointer gestures go through [`PointerTrigger`];
//! synthetic taps come from the [`BotScheduler`](crate::bot::BotScheduler).
//! Both only ever close the window their own begin opened.

use crate::clock::SensorClock;
use crate::machine::{BeginOutcome, CloseRequest, ClosedSession};
use async_trait::async_trait;
use errors::CaptureResult;
use kz_core::{CaptureOutcome, SessionTicket, TimestampNs, TriggerOrigin};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;

/// The capture surface a trigger source drives.
#[async_trait]
pub trait TriggerTarget: Send + Sync {
    /// Current time on the sensor clock.
    fn now_ns(&self) -> TimestampNs;

    fn press(
        &self,
        origin: TriggerOrigin,
        down_timestamp_ns: TimestampNs
    ) -> CaptureResult<BeginOutcome>;

    fn release(&self, request: CloseRequest) -> CaptureResult<Option<ClosedSession>>;

    /// Runs the pipeline for a window closed by [`release`](Self::release).
    async fn complete(&self, closed: ClosedSession) -> CaptureResult<CaptureOutcome>;

    /// Surface synthetic taps are positioned on.
    fn surface(&self) -> SurfaceBounds {
        SurfaceBounds::default()
    }

    /// Presentation hook for bot taps.
    fn on_synthetic_tap(&self, _tap: &SyntheticTap) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerAction {
    Down,
    Up,
    Move,
    Cancel
}

#[derive(Debug, Clone, Copy)]
pub struct PointerEvent {
    pub action: PointerAction,
    pub x: f64,
    pub y: f64,
    pub at: Instant
}

impl PointerEvent {
    pub fn now(action: PointerAction, x: f64, y: f64) -> Self {
        Self {
            action,
            x,
            y,
            at: Instant::now()
        }
    }
}

/// Maps pointer down/up onto begin/end. Other actions are ignored.
pub struct PointerTrigger<T: TriggerTarget + ?Sized> {
    target: Arc<T>,
    clock: SensorClock,
    held: Mutex<Option<SessionTicket>>
}

impl<T: TriggerTarget + ?Sized> PointerTrigger<T> {
    pub fn new(target: Arc<T>, clock: SensorClock) -> Self {
        Self {
            target,
            clock,
            held: Mutex::new(None)
        }
    }

    /// Handles one pointer event. Returns the outcome when an up closed the
    /// window opened by the matching down.
    pub async fn handle(&self, event: PointerEvent) -> CaptureResult<Option<CaptureOutcome>> {
        match event.action {
            PointerAction::Down => {
                let down_timestamp_ns = self.clock.at(event.at);
                let begun = self.target.press(TriggerOrigin::Genuine, down_timestamp_ns)?;
                // An ignored down leaves the window this pointer already holds open.
                if let Some(ticket) = begun.ticket() {
                    *self.held.lock() = Some(ticket);
                }
                Ok(None)
            }
            PointerAction::Up => {
                // A down that was ignored owns nothing to close.
                let Some(ticket) = self.held.lock().take() else {
                    return Ok(None);
                };
                match self.target.release(CloseRequest::Owned(ticket))? {
                    Some(closed) => Ok(Some(self.target.complete(closed).await?)),
                    None => Ok(None)
                }
            }
            PointerAction::Move | PointerAction::Cancel => Ok(None)
        }
    }
}

/// Size of the surface bot taps land on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SurfaceBounds {
    pub width: f64,
    pub height: f64
}

impl SurfaceBounds {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Random position with `x` in `[0, width)` and `y` in
    /// `[0, height * vertical_fraction)`.
    pub fn sample(&self, vertical_fraction: f64) -> (f64, f64) {
        let x = rand::random::<f64>() * self.width.max(0.0);
        let y = rand::random::<f64>() * (self.height * vertical_fraction).max(0.0);
        (x, y)
    }
}

impl Default for SurfaceBounds {
    fn default() -> Self {
        Self::new(1080.0, 1920.0)
    }
}

/// One bot tick, reported to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SyntheticTap {
    pub x: f64,
    pub y: f64,
    pub down_timestamp_ns: TimestampNs,
    /// Whether the tap opened a window. Taps during another session are dropped.
    pub accepted: bool,
    pub ticket: Option<SessionTicket>
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::WindowSummary;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        presses: Mutex<Vec<(TriggerOrigin, TimestampNs)>>,
        releases: Mutex<Vec<CloseRequest>>,
        ignore_press: bool
    }

    #[async_trait]
    impl TriggerTarget for Recorder {
        fn now_ns(&self) -> TimestampNs {
            0
        }

        fn press(&self, origin: TriggerOrigin, ts: TimestampNs) -> CaptureResult<BeginOutcome> {
            self.presses.lock().push((origin, ts));
            let ticket = SessionTicket::issue(origin, ts);
            if self.ignore_press {
                Ok(BeginOutcome::Ignored { active: ticket })
            } else {
                Ok(BeginOutcome::Started(ticket))
            }
        }

        fn release(&self, request: CloseRequest) -> CaptureResult<Option<ClosedSession>> {
            self.releases.lock().push(request);
            let CloseRequest::Owned(ticket) = request else {
                return Ok(None);
            };
            Ok(Some(ClosedSession {
                ticket,
                stop_timestamp_ms: 0,
                window: WindowSummary::default(),
                stop: Ok(kz_core::SessionBlob::new(Vec::new()))
            }))
        }

        async fn complete(&self, _closed: ClosedSession) -> CaptureResult<CaptureOutcome> {
            Ok(CaptureOutcome::degraded())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_down_up_maps_to_press_release() {
        let clock = SensorClock::new();
        let target = Arc::new(Recorder::default());
        let trigger = PointerTrigger::new(target.clone(), clock);

        tokio::time::advance(Duration::from_millis(40)).await;
        let down = trigger
            .handle(PointerEvent::now(PointerAction::Down, 10.0, 20.0))
            .await
            .unwrap();
        assert!(down.is_none());
        let up = trigger
            .handle(PointerEvent::now(PointerAction::Up, 10.0, 20.0))
            .await
            .unwrap();
        assert!(up.is_some());

        let presses = target.presses.lock().clone();
        assert_eq!(presses, vec![(TriggerOrigin::Genuine, 40_000_000)]);
        assert!(matches!(
            target.releases.lock().as_slice(),
            [CloseRequest::Owned(_)]
        ));
    }

    #[tokio::test]
    async fn test_move_and_cancel_are_ignored() {
        let target = Arc::new(Recorder::default());
        let trigger = PointerTrigger::new(target.clone(), SensorClock::new());

        for action in [PointerAction::Move, PointerAction::Cancel, PointerAction::Up] {
            assert!(
                trigger
                    .handle(PointerEvent::now(action, 0.0, 0.0))
                    .await
                    .unwrap()
                    .is_none()
            );
        }
        assert!(target.presses.lock().is_empty());
        assert!(target.releases.lock().is_empty());
    }

    #[tokio::test]
    async fn test_up_after_ignored_down_closes_nothing() {
        let target = Arc::new(Recorder {
            ignore_press: true,
            ..Default::default()
        });
        let trigger = PointerTrigger::new(target.clone(), SensorClock::new());

        trigger
            .handle(PointerEvent::now(PointerAction::Down, 0.0, 0.0))
            .await
            .unwrap();
        trigger
            .handle(PointerEvent::now(PointerAction::Up, 0.0, 0.0))
            .await
            .unwrap();
        assert!(target.releases.lock().is_empty());
    }

    /// Starts only the first window; later presses see it as active.
    #[derive(Default)]
    struct SingleWindow {
        open: Mutex<Option<SessionTicket>>,
        releases: Mutex<Vec<CloseRequest>>
    }

    #[async_trait]
    impl TriggerTarget for SingleWindow {
        fn now_ns(&self) -> TimestampNs {
            0
        }

        fn press(&self, origin: TriggerOrigin, ts: TimestampNs) -> CaptureResult<BeginOutcome> {
            let mut open = self.open.lock();
            match *open {
                Some(active) => Ok(BeginOutcome::Ignored { active }),
                None => {
                    let ticket = SessionTicket::issue(origin, ts);
                    *open = Some(ticket);
                    Ok(BeginOutcome::Started(ticket))
                }
            }
        }

        fn release(&self, request: CloseRequest) -> CaptureResult<Option<ClosedSession>> {
            self.releases.lock().push(request);
            let mut open = self.open.lock();
            match (request, *open) {
                (CloseRequest::Owned(ticket), Some(active)) if ticket == active => {
                    *open = None;
                    Ok(Some(ClosedSession {
                        ticket,
                        stop_timestamp_ms: 0,
                        window: WindowSummary::default(),
                        stop: Ok(kz_core::SessionBlob::new(Vec::new()))
                    }))
                }
                _ => Ok(None)
            }
        }

        async fn complete(&self, _closed: ClosedSession) -> CaptureResult<CaptureOutcome> {
            Ok(CaptureOutcome::degraded())
        }
    }

    #[tokio::test]
    async fn test_second_down_does_not_forget_held_window() {
        let target = Arc::new(SingleWindow::default());
        let trigger = PointerTrigger::new(target.clone(), SensorClock::new());

        for action in [PointerAction::Down, PointerAction::Down] {
            trigger
                .handle(PointerEvent::now(action, 0.0, 0.0))
                .await
                .unwrap();
        }
        let opened = (*target.open.lock()).unwrap();
        let up = trigger
            .handle(PointerEvent::now(PointerAction::Up, 0.0, 0.0))
            .await
            .unwrap();

        assert!(up.is_some());
        assert!(target.open.lock().is_none());
        assert!(matches!(
            target.releases.lock().as_slice(),
            [CloseRequest::Owned(t)] if *t == opened
        ));
    }

    #[test]
    fn test_sampled_position_stays_in_upper_region() {
        let bounds = SurfaceBounds::new(1080.0, 1920.0);
        for _ in 0..200 {
            let (x, y) = bounds.sample(2.0 / 3.0);
            assert!((0.0..1080.0).contains(&x));
            assert!((0.0..1280.0).contains(&y));
        }
    }

    #[test]
    fn test_empty_surface_samples_origin() {
        let (x, y) = SurfaceBounds::new(0.0, 0.0).sample(2.0 / 3.0);
        assert_eq!((x, y), (0.0, 0.0));
    }
}
