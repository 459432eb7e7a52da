//! Sensor listener registration and simulated sources.

use crate::assembler::WindowAssembler;
use crate::clock::SensorClock;
use errors::{CaptureError, CaptureResult};
use kz_core::{AxisTriple, SensorKind, SensorSample, SensorSource, TimestampNs};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const SAMPLE_CHANNEL_CAPACITY: usize = 256;

/// Listener over a set of sensor sources.
///
/// While registered, one pump task per source drains that source's channel
/// into the assembler. Registration is idempotent, so at most one set of
/// pumps exists at any time.
pub struct SensorHub {
    sources: Vec<Arc<dyn SensorSource>>,
    assembler: Arc<WindowAssembler>,
    pumps: Mutex<Option<Vec<JoinHandle<()>>>>
}

impl SensorHub {
    pub fn new(assembler: Arc<WindowAssembler>, sources: Vec<Arc<dyn SensorSource>>) -> Self {
        Self {
            sources,
            assembler,
            pumps: Mutex::new(None)
        }
    }

    /// Starts the pumps. Returns `false` if they were already running.
    pub fn register(&self) -> CaptureResult<bool> {
        let mut pumps = self.pumps.lock();
        if pumps.is_some() {
            return Ok(false);
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| CaptureError::Runtime {
            reason: format!("sensor listeners need a tokio runtime: {e}")
        })?;
        let _guard = runtime.enter();

        let handles = self
            .sources
            .iter()
            .map(|source| {
                let kind = source.kind();
                let mut rx = source.open();
                let assembler = Arc::clone(&self.assembler);
                runtime.spawn(async move {
                    while let Some(sample) = rx.recv().await {
                        assembler.on_sample(sample);
                    }
                    tracing::debug!(%kind, "Sensor stream ended");
                })
            })
            .collect();
        *pumps = Some(handles);

        tracing::info!(sources = self.sources.len(), "Sensor listeners registered");
        Ok(true)
    }

    /// Stops the pumps. Returns `false` if none were running.
    pub fn unregister(&self) -> bool {
        let Some(handles) = self.pumps.lock().take() else {
            return false;
        };
        for handle in handles {
            handle.abort();
        }
        tracing::info!("Sensor listeners unregistered");
        true
    }

    pub fn is_registered(&self) -> bool {
        self.pumps.lock().is_some()
    }
}

impl Drop for SensorHub {
    fn drop(&mut self) {
        self.unregister();
    }
}

/// Shared switch that adds a motion burst to simulated sensors, standing in
/// for the hand movement that accompanies a physical tap.
#[derive(Debug, Default)]
pub struct Excitation {
    until_ns: AtomicI64,
    amplitude_bits: AtomicU64
}

impl Excitation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Excite every attached source until `until_ns` on the sensor clock.
    pub fn excite(&self, until_ns: TimestampNs, amplitude: f64) {
        self.amplitude_bits.store(amplitude.to_bits(), Ordering::Relaxed);
        self.until_ns.store(until_ns, Ordering::Release);
    }

    pub fn amplitude_at(&self, now_ns: TimestampNs) -> f64 {
        if now_ns < self.until_ns.load(Ordering::Acquire) {
            f64::from_bits(self.amplitude_bits.load(Ordering::Relaxed))
        } else {
            0.0
        }
    }
}

/// A sensor stream synthesized from noise, with jittered sample intervals.
pub struct SimulatedImu {
    kind: SensorKind,
    clock: SensorClock,
    period: Duration,
    jitter: f64,
    noise: f64,
    excitation: Arc<Excitation>
}

impl SimulatedImu {
    pub fn new(
        kind: SensorKind,
        clock: SensorClock,
        period: Duration,
        jitter: f64,
        noise: f64,
        excitation: Arc<Excitation>
    ) -> Self {
        Self {
            kind,
            clock,
            period,
            jitter: jitter.clamp(0.0, 0.9),
            noise: noise.max(0.0),
            excitation
        }
    }

    /// Accelerometer and gyroscope pair configured from `config`.
    pub fn pair(
        config: &config::SensorConfig,
        clock: SensorClock,
        excitation: Arc<Excitation>
    ) -> Vec<Arc<dyn SensorSource>> {
        let accel = SimulatedImu::new(
            SensorKind::Accelerometer,
            clock,
            Duration::from_micros(config.accel_period_us),
            config.period_jitter,
            config.noise_amplitude,
            Arc::clone(&excitation)
        );
        let gyro = SimulatedImu::new(
            SensorKind::Gyroscope,
            clock,
            Duration::from_micros(config.gyro_period_us),
            config.period_jitter,
            config.noise_amplitude,
            excitation
        );
        vec![Arc::new(accel), Arc::new(gyro)]
    }
}

fn jittered(period: Duration, jitter: f64) -> Duration {
    let factor = 1.0 + jitter * (2.0 * rand::random::<f64>() - 1.0);
    period.mul_f64(factor)
}

fn noisy_triple(amplitude: f64) -> AxisTriple {
    let axis = || amplitude * (2.0 * rand::random::<f64>() - 1.0);
    AxisTriple::new(axis(), axis(), axis())
}

impl SensorSource for SimulatedImu {
    fn kind(&self) -> SensorKind {
        self.kind
    }

    fn open(&self) -> mpsc::Receiver<SensorSample> {
        let (tx, rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
        let kind = self.kind;
        let clock = self.clock;
        let period = self.period;
        let jitter = self.jitter;
        let noise = self.noise;
        let excitation = Arc::clone(&self.excitation);

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(jittered(period, jitter)).await;
                let timestamp_ns = clock.now_ns();
                let burst = excitation.amplitude_at(timestamp_ns);
                let sample = SensorSample {
                    kind,
                    values: noisy_triple(noise + burst),
                    timestamp_ns
                };
                if tx.send(sample).await.is_err() {
                    break;
                }
            }
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kz_core::NANOS_PER_MILLI;

    #[tokio::test(start_paused = true)]
    async fn test_register_is_idempotent_and_feeds_assembler() {
        let clock = SensorClock::new();
        let assembler = Arc::new(WindowAssembler::new(1000, 50 * NANOS_PER_MILLI));
        let sources = SimulatedImu::pair(
            &config::SensorConfig::default(),
            clock,
            Arc::new(Excitation::new())
        );
        let hub = SensorHub::new(Arc::clone(&assembler), sources);

        assert!(hub.register().unwrap());
        assert!(!hub.register().unwrap());
        assert!(hub.is_registered());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(assembler.retained() > 0);

        assert!(hub.unregister());
        assert!(!hub.unregister());
        let retained = assembler.retained();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(assembler.retained(), retained);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pumps_deliver_every_scripted_sample() {
        let assembler = Arc::new(WindowAssembler::new(100, 0));
        let accel = testing::ScriptedSource::new(
            SensorKind::Accelerometer,
            testing::sample_train(SensorKind::Accelerometer, 0, 10, 20)
        )
        .with_interval(Duration::from_millis(10));
        let gyro = testing::ScriptedSource::new(
            SensorKind::Gyroscope,
            testing::sample_train(SensorKind::Gyroscope, 5, 10, 20)
        )
        .with_interval(Duration::from_millis(10));
        let sources: Vec<Arc<dyn SensorSource>> = vec![Arc::new(accel), Arc::new(gyro)];
        let hub = SensorHub::new(Arc::clone(&assembler), sources);

        hub.register().unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let readings = assembler.snapshot_since(0);
        assert_eq!(readings.len(), 40);
        assert!(readings.last().unwrap().coverage.is_complete());
    }

    #[test]
    fn test_register_outside_runtime_fails() {
        let assembler = Arc::new(WindowAssembler::new(10, 0));
        let hub = SensorHub::new(assembler, Vec::new());
        assert!(matches!(hub.register(), Err(CaptureError::Runtime { .. })));
    }

    #[test]
    fn test_excitation_window() {
        let excitation = Excitation::new();
        assert_eq!(excitation.amplitude_at(0), 0.0);
        excitation.excite(100, 1.5);
        assert_eq!(excitation.amplitude_at(99), 1.5);
        assert_eq!(excitation.amplitude_at(100), 0.0);
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let period = Duration::from_micros(2_500);
        for _ in 0..100 {
            let d = jittered(period, 0.2);
            assert!(d >= Duration::from_micros(2_000) && d <= Duration::from_micros(3_000));
        }
    }
}
