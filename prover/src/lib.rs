//! # KinetiZK Prover
//!
//! Everything on the far side of the [`ProcessingService`] seam that ships
//! with the engine:
//! - [`keys`]: loading, validating and generating key material documents
//! - [`DigestProver`]: a deterministic local implementation of the service
//!   contract, used by the CLI and by integration tests
//!
//! `DigestProver` binds public inputs to the key pair with SHA-256. It is a
//! stand-in for the real proving backend and provides no zero-knowledge
//! guarantees.
//!
//! [`ProcessingService`]: kz_core::ProcessingService

pub mod digest;
pub mod features;
pub mod keys;

pub use digest::{DigestProver, SessionRecord};
pub use features::MotionFeatures;
pub use keys::{KeyDocument, generate_keys, load_keys, parse_keys, write_keys};
