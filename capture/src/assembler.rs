//! Dual-stream fusion and window streaming.
//!
//! Every sample from either source updates that source's cached triple and
//! produces one fused [`Reading`] stamped with the sample's timestamp; the
//! other source's triple is carried forward. Each reading is retained in the
//! ring buffer and, while a window is open, forwarded to the window's sink.
//!
//! Cache, ring buffer and window live behind a single lock. Opening a window
//! replays the pre-roll and installs the sink inside one critical section,
//! and live readings are forwarded inside the same lock that fused them, so
//! the sink observes pre-roll strictly before any live reading and no
//! reading twice.

use crate::ring_buffer::RingBuffer;
use crate::telemetry::Telemetry;
use kz_core::{AxisTriple, Coverage, Reading, ReadingSink, SensorKind, SensorSample, TimestampNs};
use parking_lot::Mutex;
use std::sync::Arc;

/// Result of [`WindowAssembler::begin_window`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOpen {
    /// The window is open; `replayed` pre-roll readings were delivered.
    Opened { replayed: usize },
    /// A window was already open; its sink was left in place.
    AlreadyOpen
}

/// Delivery counts for a closed window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowSummary {
    pub down_timestamp_ns: TimestampNs,
    pub replayed: usize,
    pub live: usize
}

impl WindowSummary {
    pub fn delivered(&self) -> usize {
        self.replayed + self.live
    }
}

struct OpenWindow {
    sink: Arc<dyn ReadingSink>,
    cutoff_ns: TimestampNs,
    summary: WindowSummary
}

struct FusionState {
    accel: Option<AxisTriple>,
    gyro: Option<AxisTriple>,
    last_timestamp_ns: Option<TimestampNs>,
    ring: RingBuffer<Reading>,
    window: Option<OpenWindow>
}

impl FusionState {
    fn fuse(&mut self, sample: &SensorSample) -> (Reading, bool) {
        match sample.kind {
            SensorKind::Accelerometer => self.accel = Some(sample.values),
            SensorKind::Gyroscope => self.gyro = Some(sample.values)
        }

        // Streams are clocked independently; keep the fused stream monotonic.
        let (timestamp_ns, clamped) = match self.last_timestamp_ns {
            Some(last) if sample.timestamp_ns < last => (last, true),
            _ => (sample.timestamp_ns, false)
        };
        self.last_timestamp_ns = Some(timestamp_ns);

        let reading = Reading::new(
            timestamp_ns,
            self.accel.unwrap_or(AxisTriple::ZERO),
            self.gyro.unwrap_or(AxisTriple::ZERO)
        )
        .with_coverage(Coverage {
            accel: self.accel.is_some(),
            gyro: self.gyro.is_some()
        });
        (reading, clamped)
    }
}

/// Fuses accelerometer and gyroscope samples and streams them into windows.
pub struct WindowAssembler {
    state: Mutex<FusionState>,
    pre_roll_ns: TimestampNs
}

impl WindowAssembler {
    pub fn new(capacity: usize, pre_roll_ns: TimestampNs) -> Self {
        Self {
            state: Mutex::new(FusionState {
                accel: None,
                gyro: None,
                last_timestamp_ns: None,
                ring: RingBuffer::new(capacity),
                window: None
            }),
            pre_roll_ns
        }
    }

    pub fn from_config(config: &config::WindowConfig) -> Self {
        Self::new(config.ring_capacity, config.pre_roll_ns())
    }

    pub fn pre_roll_ns(&self) -> TimestampNs {
        self.pre_roll_ns
    }

    /// Fuses one raw sample, retains the reading and forwards it to the open
    /// window, if any.
    pub fn on_sample(&self, sample: SensorSample) -> Reading {
        let mut state = self.state.lock();
        let (reading, clamped) = state.fuse(&sample);
        state.ring.push(reading);

        if let Some(window) = state.window.as_mut() {
            // Samples stamped before the pre-roll cutoff belong to no window.
            if reading.timestamp_ns >= window.cutoff_ns {
                window.sink.accept(&reading);
                window.summary.live += 1;
            }
        }
        drop(state);

        Telemetry::record_fused(clamped);
        if clamped {
            tracing::trace!(
                kind = %sample.kind,
                timestamp_ns = sample.timestamp_ns,
                "Out-of-order sample stamped with previous timestamp"
            );
        }
        reading
    }

    /// Opens a window for a trigger at `down_timestamp_ns`.
    ///
    /// Retained readings from `down_timestamp_ns - pre_roll` onwards are
    /// replayed into `sink` before it starts receiving live readings.
    pub fn begin_window(
        &self,
        down_timestamp_ns: TimestampNs,
        sink: Arc<dyn ReadingSink>
    ) -> WindowOpen {
        let mut state = self.state.lock();
        if state.window.is_some() {
            return WindowOpen::AlreadyOpen;
        }

        let cutoff_ns = down_timestamp_ns.saturating_sub(self.pre_roll_ns);
        let pre_roll = state.ring.snapshot_since(cutoff_ns);
        for reading in &pre_roll {
            sink.accept(reading);
        }

        state.window = Some(OpenWindow {
            sink,
            cutoff_ns,
            summary: WindowSummary {
                down_timestamp_ns,
                replayed: pre_roll.len(),
                live: 0
            }
        });
        drop(state);

        Telemetry::record_pre_roll(pre_roll.len());
        tracing::debug!(
            down_timestamp_ns,
            cutoff_ns,
            replayed = pre_roll.len(),
            "Window opened"
        );
        WindowOpen::Opened {
            replayed: pre_roll.len()
        }
    }

    /// Detaches the window's sink. Readings keep being retained.
    pub fn end_window(&self) -> Option<WindowSummary> {
        let window = self.state.lock().window.take()?;
        Telemetry::record_forwarded(window.summary.delivered() as u64);
        tracing::debug!(
            replayed = window.summary.replayed,
            live = window.summary.live,
            "Window closed"
        );
        Some(window.summary)
    }

    pub fn is_window_open(&self) -> bool {
        self.state.lock().window.is_some()
    }

    pub fn retained(&self) -> usize {
        self.state.lock().ring.len()
    }

    pub fn snapshot_since(&self, since: TimestampNs) -> Vec<Reading> {
        self.state.lock().ring.snapshot_since(since)
    }

    /// Drops retained history and cached triples.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.ring.clear();
        state.accel = None;
        state.gyro = None;
        state.last_timestamp_ns = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kz_core::NANOS_PER_MILLI;

    #[derive(Default)]
    struct Collect(Mutex<Vec<Reading>>);

    impl ReadingSink for Collect {
        fn accept(&self, reading: &Reading) {
            self.0.lock().push(*reading);
        }
    }

    impl Collect {
        fn stamps_ms(&self) -> Vec<i64> {
            self.0.lock().iter().map(Reading::timestamp_ms).collect()
        }
    }

    fn accel(ms: i64, x: f64) -> SensorSample {
        SensorSample::accel(ms * NANOS_PER_MILLI, AxisTriple::new(x, 0.0, 0.0))
    }

    fn gyro(ms: i64, y: f64) -> SensorSample {
        SensorSample::gyro(ms * NANOS_PER_MILLI, AxisTriple::new(0.0, y, 0.0))
    }

    fn assembler() -> WindowAssembler {
        WindowAssembler::new(300, 50 * NANOS_PER_MILLI)
    }

    #[test]
    fn test_fusion_carries_other_source_forward() {
        let assembler = assembler();
        let first = assembler.on_sample(accel(0, 1.0));
        assert_eq!(first.accel.x, 1.0);
        assert_eq!(first.gyro, AxisTriple::ZERO);
        assert!(first.coverage.accel);
        assert!(!first.coverage.gyro);

        let second = assembler.on_sample(gyro(2, 0.5));
        assert_eq!(second.timestamp_ms(), 2);
        assert_eq!(second.accel.x, 1.0);
        assert_eq!(second.gyro.y, 0.5);
        assert!(second.coverage.is_complete());

        let third = assembler.on_sample(accel(4, 2.0));
        assert_eq!(third.accel.x, 2.0);
        assert_eq!(third.gyro.y, 0.5);
    }

    #[test]
    fn test_every_sample_is_retained_without_window() {
        let assembler = assembler();
        for i in 0..10 {
            assembler.on_sample(accel(i, 0.0));
            assembler.on_sample(gyro(i, 0.0));
        }
        assert_eq!(assembler.retained(), 20);
        assert!(!assembler.is_window_open());
    }

    #[test]
    fn test_out_of_order_sample_is_clamped() {
        let assembler = assembler();
        assembler.on_sample(accel(10, 0.0));
        let late = assembler.on_sample(gyro(9, 0.3));
        assert_eq!(late.timestamp_ms(), 10);
        assert_eq!(late.gyro.y, 0.3);
    }

    #[test]
    fn test_pre_roll_replay_then_live() {
        let assembler = assembler();
        for i in 0..100 {
            assembler.on_sample(accel(i * 10, 0.0));
        }

        let sink = Arc::new(Collect::default());
        let opened = assembler.begin_window(990 * NANOS_PER_MILLI, sink.clone());
        assert_eq!(opened, WindowOpen::Opened { replayed: 6 });
        assert_eq!(sink.stamps_ms(), vec![940, 950, 960, 970, 980, 990]);

        assembler.on_sample(gyro(1000, 0.1));
        assembler.on_sample(accel(1010, 0.2));
        assert_eq!(
            sink.stamps_ms(),
            vec![940, 950, 960, 970, 980, 990, 1000, 1010]
        );

        let summary = assembler.end_window().unwrap();
        assert_eq!(summary.replayed, 6);
        assert_eq!(summary.live, 2);
        assert_eq!(summary.delivered(), 8);
    }

    #[test]
    fn test_nothing_delivered_after_end_window() {
        let assembler = assembler();
        let sink = Arc::new(Collect::default());
        assembler.begin_window(0, sink.clone());
        assembler.on_sample(accel(1, 0.0));
        assembler.end_window();
        assembler.on_sample(accel(2, 0.0));
        assembler.on_sample(gyro(3, 0.0));

        assert_eq!(sink.stamps_ms(), vec![1]);
        assert_eq!(assembler.retained(), 3);
        assert!(assembler.end_window().is_none());
    }

    #[test]
    fn test_second_begin_keeps_first_sink() {
        let assembler = assembler();
        let first = Arc::new(Collect::default());
        let second = Arc::new(Collect::default());

        assert!(matches!(
            assembler.begin_window(0, first.clone()),
            WindowOpen::Opened { .. }
        ));
        assert_eq!(
            assembler.begin_window(0, second.clone()),
            WindowOpen::AlreadyOpen
        );

        assembler.on_sample(accel(5, 0.0));
        assert_eq!(first.stamps_ms(), vec![5]);
        assert!(second.stamps_ms().is_empty());
    }

    #[test]
    fn test_live_readings_before_cutoff_are_not_forwarded() {
        let assembler = assembler();
        let sink = Arc::new(Collect::default());
        assembler.begin_window(500 * NANOS_PER_MILLI, sink.clone());

        assembler.on_sample(accel(100, 0.0));
        assembler.on_sample(accel(460, 0.0));
        assert_eq!(sink.stamps_ms(), vec![460]);
    }

    #[test]
    fn test_concurrent_producers_deliver_ordered_exactly_once() {
        let assembler = Arc::new(assembler());
        let sink = Arc::new(Collect::default());
        let clock = Arc::new(std::sync::atomic::AtomicI64::new(0));

        assembler.begin_window(0, sink.clone());
        let producers: Vec<_> = [SensorKind::Accelerometer, SensorKind::Gyroscope]
            .into_iter()
            .map(|kind| {
                let assembler = Arc::clone(&assembler);
                let clock = Arc::clone(&clock);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let ts = clock.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        assembler.on_sample(SensorSample {
                            kind,
                            values: AxisTriple::ZERO,
                            timestamp_ns: ts
                        });
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        let summary = assembler.end_window().unwrap();

        let delivered = sink.0.lock().clone();
        assert_eq!(delivered.len(), 1000);
        assert_eq!(summary.live, 1000);
        assert!(
            delivered
                .windows(2)
                .all(|pair| pair[0].timestamp_ns <= pair[1].timestamp_ns)
        );
    }
}
