//! Core value types for the capture engine.

use base64::{Engine as _, engine::general_purpose};
use errors::ProcessingError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Monotonic nanoseconds in the sensor clock domain.
pub type TimestampNs = i64;

pub const NANOS_PER_MILLI: i64 = 1_000_000;

/// Physical sensor stream feeding the fusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Linear acceleration (gravity removed), m/s².
    Accelerometer,
    /// Angular velocity, rad/s.
    Gyroscope
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accelerometer => write!(f, "accelerometer"),
            Self::Gyroscope => write!(f, "gyroscope")
        }
    }
}

/// Per-axis values of one sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisTriple {
    pub x: f64,
    pub y: f64,
    pub z: f64
}

impl AxisTriple {
    pub const ZERO: AxisTriple = AxisTriple {
        x: 0.0,
        y: 0.0,
        z: 0.0
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

impl From<[f32; 3]> for AxisTriple {
    fn from(values: [f32; 3]) -> Self {
        Self::new(
            f64::from(values[0]),
            f64::from(values[1]),
            f64::from(values[2])
        )
    }
}

/// A raw event from one sensor stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub kind: SensorKind,
    pub values: AxisTriple,
    pub timestamp_ns: TimestampNs
}

impl SensorSample {
    pub fn accel(timestamp_ns: TimestampNs, values: AxisTriple) -> Self {
        Self {
            kind: SensorKind::Accelerometer,
            values,
            timestamp_ns
        }
    }

    pub fn gyro(timestamp_ns: TimestampNs, values: AxisTriple) -> Self {
        Self {
            kind: SensorKind::Gyroscope,
            values,
            timestamp_ns
        }
    }
}

/// Which sources had produced at least one event when a reading was fused.
///
/// A triple whose source has not reported yet is zero-filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    pub accel: bool,
    pub gyro: bool
}

impl Coverage {
    pub const FULL: Coverage = Coverage {
        accel: true,
        gyro: true
    };

    pub fn is_complete(&self) -> bool {
        self.accel && self.gyro
    }
}

impl Default for Coverage {
    fn default() -> Self {
        Self::FULL
    }
}

/// One fused sample: the latest accelerometer and gyroscope values at the
/// time either source reported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp_ns: TimestampNs,
    pub accel: AxisTriple,
    pub gyro: AxisTriple,
    #[serde(default)]
    pub coverage: Coverage
}

impl Reading {
    pub fn new(timestamp_ns: TimestampNs, accel: AxisTriple, gyro: AxisTriple) -> Self {
        Self {
            timestamp_ns,
            accel,
            gyro,
            coverage: Coverage::FULL
        }
    }

    pub fn with_coverage(mut self, coverage: Coverage) -> Self {
        self.coverage = coverage;
        self
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ns / NANOS_PER_MILLI
    }
}

macro_rules! opaque_blob {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq)]
        pub struct $name(Vec<u8>);

        impl $name {
            pub fn new(bytes: Vec<u8>) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn into_bytes(self) -> Vec<u8> {
                self.0
            }

            pub fn len(&self) -> usize {
                self.0.len()
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl From<Vec<u8>> for $name {
            fn from(bytes: Vec<u8>) -> Self {
                Self(bytes)
            }
        }
    };
}

opaque_blob!(
    /// Serialized session produced by `stop_capture`.
    SessionBlob
);
opaque_blob!(
    /// Serialized feature vector produced by `extract_features`.
    FeatureBlob
);
opaque_blob!(
    /// Serialized proof envelope produced by `generate_proof`.
    ProofBlob
);

/// Public inputs attached to a proof.
///
/// Only `class` is interpreted; a missing `class` reads as the legitimate
/// class (0). Fractional numbers are truncated and numeric strings are
/// parsed; any other value also reads as 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublicInputs {
    #[serde(default, deserialize_with = "lenient_int::deserialize")]
    pub class: i64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>
}

/// A proof envelope split into its payload and public inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct ProofParts {
    pub proof: Vec<u8>,
    pub public_inputs: PublicInputs
}

#[derive(Serialize, Deserialize)]
struct ProofEnvelope {
    proof_base64: String,
    public_inputs_json: String
}

impl ProofBlob {
    /// Builds the envelope `{ proof_base64, public_inputs_json }`.
    pub fn compose(proof: &[u8], public_inputs: &PublicInputs) -> Result<Self, ProcessingError> {
        let public_inputs_json = serde_json::to_string(public_inputs)
            .map_err(|e| ProcessingError::malformed("public inputs", e))?;
        let envelope = ProofEnvelope {
            proof_base64: general_purpose::STANDARD.encode(proof),
            public_inputs_json
        };
        let bytes =
            serde_json::to_vec(&envelope).map_err(|e| ProcessingError::malformed("proof", e))?;
        Ok(Self(bytes))
    }

    pub fn decompose(&self) -> Result<ProofParts, ProcessingError> {
        let envelope: ProofEnvelope =
            serde_json::from_slice(&self.0).map_err(|e| ProcessingError::malformed("proof", e))?;
        let proof = general_purpose::STANDARD
            .decode(envelope.proof_base64.as_bytes())
            .map_err(|e| ProcessingError::malformed("proof_base64", e))?;
        let public_inputs: PublicInputs = serde_json::from_str(&envelope.public_inputs_json)
            .map_err(|e| ProcessingError::malformed("public_inputs_json", e))?;
        Ok(ProofParts {
            proof,
            public_inputs
        })
    }
}

/// Result of one capture session, built exactly once per closed window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureOutcome {
    #[serde(with = "proof_bytes")]
    pub proof: Vec<u8>,
    /// 0 = legitimate interaction, nonzero = synthetic.
    pub classification: i64,
    pub verified: bool,
    pub score: f64
}

impl CaptureOutcome {
    /// The outcome reported when any pipeline stage fails.
    pub fn degraded() -> Self {
        Self {
            proof: Vec::new(),
            classification: 0,
            verified: false,
            score: 0.0
        }
    }

    pub fn is_legitimate(&self) -> bool {
        self.classification == 0
    }
}

mod lenient_int {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        Ok(coerce(&Value::deserialize(deserializer)?))
    }

    pub(super) fn coerce(value: &Value) -> i64 {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
                    .unwrap_or(0)
            }
            _ => 0
        }
    }
}

mod proof_bytes {
    use base64::{Engine as _, engine::general_purpose};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Proving and verifying key material for the processing service.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ProofKeys {
    pub proving_key: Vec<u8>,
    pub verifying_key: Vec<u8>
}

impl ProofKeys {
    pub fn new(proving_key: Vec<u8>, verifying_key: Vec<u8>) -> Self {
        Self {
            proving_key,
            verifying_key
        }
    }
}

impl std::fmt::Debug for ProofKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofKeys")
            .field("proving_key", &format_args!("<{} bytes>", self.proving_key.len()))
            .field("verifying_key", &format_args!("<{} bytes>", self.verifying_key.len()))
            .finish()
    }
}

/// Where a capture trigger came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOrigin {
    /// A real pointer gesture.
    Genuine,
    /// A gesture emitted by the bot scheduler.
    Synthetic
}

impl TriggerOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Genuine => "genuine",
            Self::Synthetic => "synthetic"
        }
    }
}

/// Proof of ownership of an open window, handed out by a successful begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionTicket {
    pub id: Uuid,
    pub origin: TriggerOrigin,
    pub down_timestamp_ns: TimestampNs
}

impl SessionTicket {
    pub fn issue(origin: TriggerOrigin, down_timestamp_ns: TimestampNs) -> Self {
        Self {
            id: Uuid::new_v4(),
            origin,
            down_timestamp_ns
        }
    }
}
