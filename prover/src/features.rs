//! Motion statistics extracted from a captured session.

use kz_core::Reading;
use serde::{Deserialize, Serialize};

/// Midpoint of the logistic score, in combined magnitude standard deviation.
const SCORE_MIDPOINT: f64 = 0.08;
const SCORE_STEEPNESS: f64 = 60.0;

/// Summary statistics over the magnitudes of the fused readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionFeatures {
    pub sample_count: usize,
    /// Readings fused before both sources had reported.
    pub partial_count: usize,
    pub span_ms: f64,
    pub accel_mean: f64,
    pub accel_peak: f64,
    pub accel_std: f64,
    pub gyro_mean: f64,
    pub gyro_peak: f64,
    pub gyro_std: f64
}

impl MotionFeatures {
    /// Returns `None` for an empty session.
    pub fn from_readings(readings: &[Reading]) -> Option<Self> {
        let first = readings.first()?;
        let last = readings.last()?;

        let accel: Vec<f64> = readings.iter().map(|r| r.accel.magnitude()).collect();
        let gyro: Vec<f64> = readings.iter().map(|r| r.gyro.magnitude()).collect();
        let (accel_mean, accel_std, accel_peak) = summarize(&accel);
        let (gyro_mean, gyro_std, gyro_peak) = summarize(&gyro);

        Some(Self {
            sample_count: readings.len(),
            partial_count: readings.iter().filter(|r| !r.coverage.is_complete()).count(),
            span_ms: (last.timestamp_ns - first.timestamp_ns) as f64 / 1e6,
            accel_mean,
            accel_peak,
            accel_std,
            gyro_mean,
            gyro_peak,
            gyro_std
        })
    }

    /// Variability of the motion during the window.
    pub fn motion_energy(&self) -> f64 {
        self.accel_std + self.gyro_std
    }

    /// Confidence in `[0, 1]` that the window holds a physical interaction.
    pub fn score(&self) -> f64 {
        let z = SCORE_STEEPNESS * (self.motion_energy() - SCORE_MIDPOINT);
        1.0 / (1.0 + (-z).exp())
    }
}

/// Returns `(mean, population std, peak)`.
fn summarize(values: &[f64]) -> (f64, f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let peak = values.iter().copied().fold(0.0, f64::max);
    (mean, variance.sqrt(), peak)
}
