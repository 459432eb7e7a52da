//! Key material documents.
//!
//! A key document is a JSON object with two base64 string fields:
//!
//! ```json
//! { "proving_key_base64": "...", "verifying_key_base64": "..." }
//! ```

use base64::{Engine as _, engine::general_purpose};
use errors::KeyMaterialError;
use kz_core::ProofKeys;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const PROVING_KEY_FIELD: &str = "proving_key_base64";
pub const VERIFYING_KEY_FIELD: &str = "verifying_key_base64";

/// On-disk representation of [`ProofKeys`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyDocument {
    pub proving_key_base64: String,
    pub verifying_key_base64: String
}

impl From<&ProofKeys> for KeyDocument {
    fn from(keys: &ProofKeys) -> Self {
        Self {
            proving_key_base64: general_purpose::STANDARD.encode(&keys.proving_key),
            verifying_key_base64: general_purpose::STANDARD.encode(&keys.verifying_key)
        }
    }
}

/// Read and decode a key document from `path`.
pub fn load_keys(path: &Path) -> Result<ProofKeys, KeyMaterialError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            KeyMaterialError::NotFound {
                path: path.display().to_string()
            }
        } else {
            KeyMaterialError::Io(e)
        }
    })?;

    let keys = parse_keys(&text)?;
    tracing::info!(
        path = %path.display(),
        proving_key_len = keys.proving_key.len(),
        verifying_key_len = keys.verifying_key.len(),
        "Loaded key material"
    );
    Ok(keys)
}

/// Decode a key document held in memory.
pub fn parse_keys(text: &str) -> Result<ProofKeys, KeyMaterialError> {
    let document: serde_json::Value =
        serde_json::from_str(text).map_err(|e| KeyMaterialError::Malformed {
            reason: e.to_string()
        })?;
    if !document.is_object() {
        return Err(KeyMaterialError::Malformed {
            reason: "expected a JSON object".to_string()
        });
    }

    let proving_key = decode_field(&document, PROVING_KEY_FIELD)?;
    let verifying_key = decode_field(&document, VERIFYING_KEY_FIELD)?;
    Ok(ProofKeys::new(proving_key, verifying_key))
}

fn decode_field(document: &serde_json::Value, field: &str) -> Result<Vec<u8>, KeyMaterialError> {
    let encoded = document
        .get(field)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| KeyMaterialError::MissingField {
            field: field.to_string()
        })?;

    // Tolerate documents wrapped at a fixed column.
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| KeyMaterialError::InvalidEncoding {
            field: field.to_string(),
            reason: e.to_string()
        })?;

    if bytes.is_empty() {
        return Err(KeyMaterialError::Empty {
            field: field.to_string()
        });
    }
    Ok(bytes)
}

/// Fresh random key material of `len` bytes per key.
pub fn generate_keys(len: usize) -> ProofKeys {
    let mut rng = rand::thread_rng();
    let mut proving_key = vec![0u8; len];
    let mut verifying_key = vec![0u8; len];
    rng.fill_bytes(&mut proving_key);
    rng.fill_bytes(&mut verifying_key);
    ProofKeys::new(proving_key, verifying_key)
}

/// Write `keys` as a pretty-printed key document.
pub fn write_keys(path: &Path, keys: &ProofKeys) -> Result<(), KeyMaterialError> {
    let document = KeyDocument::from(keys);
    let text = serde_json::to_string_pretty(&document).map_err(|e| KeyMaterialError::Malformed {
        reason: e.to_string()
    })?;
    std::fs::write(path, text)?;
    Ok(())
}
