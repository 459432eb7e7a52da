use kz_core::{
    AxisTriple, Coverage, NANOS_PER_MILLI, ProofKeys, Reading, SensorKind, SensorSample,
    TimestampNs
};

pub fn ms(millis: i64) -> TimestampNs {
    millis * NANOS_PER_MILLI
}

/// A fully covered reading with zero motion at `millis`.
pub fn reading_at_ms(millis: i64) -> Reading {
    Reading::new(ms(millis), AxisTriple::ZERO, AxisTriple::ZERO).with_coverage(Coverage::FULL)
}

pub fn accel_at_ms(millis: i64, values: AxisTriple) -> SensorSample {
    SensorSample::accel(ms(millis), values)
}

pub fn gyro_at_ms(millis: i64, values: AxisTriple) -> SensorSample {
    SensorSample::gyro(ms(millis), values)
}

/// `count` samples of `kind` starting at `start_ms`, `step_ms` apart.
pub fn sample_train(
    kind: SensorKind,
    start_ms: i64,
    step_ms: i64,
    count: usize
) -> Vec<SensorSample> {
    (0..count as i64)
        .map(|i| SensorSample {
            kind,
            values: AxisTriple::new(0.01 * i as f64, 0.0, 0.0),
            timestamp_ns: ms(start_ms + i * step_ms)
        })
        .collect()
}

/// Accelerometer and gyroscope samples alternating every `step_ms / 2`,
/// with a sinusoidal motion of `amplitude`.
pub fn interleaved_motion(start_ms: i64, step_ms: i64, count: usize, amplitude: f64) -> Vec<SensorSample> {
    (0..count as i64)
        .map(|i| {
            let phase = i as f64 * 0.7;
            let values = AxisTriple::new(
                amplitude * phase.sin(),
                amplitude * phase.cos(),
                amplitude * (2.0 * phase).sin()
            );
            let timestamp_ns = ms(start_ms) + i * ms(step_ms) / 2;
            let kind = if i % 2 == 0 {
                SensorKind::Accelerometer
            } else {
                SensorKind::Gyroscope
            };
            SensorSample {
                kind,
                values,
                timestamp_ns
            }
        })
        .collect()
}

pub fn test_keys() -> ProofKeys {
    ProofKeys::new(b"test-proving-key".to_vec(), b"test-verifying-key".to_vec())
}
