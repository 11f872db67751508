//! `Upload-Metadata` codec.
//!
//! Pairs are serialized as `key base64(value)` and joined with commas.
//! Keys are emitted in sorted order so the header is deterministic.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::ProtocolError;

/// Checks that a metadata key can be carried in the header.
pub fn validate_metadata_key(key: &str) -> Result<(), ProtocolError> {
    if key.is_empty() {
        return Err(ProtocolError::InvalidMetadata("empty key".into()));
    }
    if key.contains([' ', ',']) {
        return Err(ProtocolError::InvalidMetadata(format!(
            "key must not contain spaces or commas: {key:?}"
        )));
    }
    Ok(())
}

/// Encodes metadata for the `Upload-Metadata` header.
///
/// Returns `None` when there is nothing to send.
pub fn encode_metadata(metadata: &BTreeMap<String, String>) -> Option<String> {
    if metadata.is_empty() {
        return None;
    }
    let encoded = metadata
        .iter()
        .map(|(key, value)| format!("{key} {}", STANDARD.encode(value.as_bytes())))
        .collect::<Vec<_>>()
        .join(",");
    Some(encoded)
}

/// Decodes an `Upload-Metadata` header value.
///
/// A key without a value decodes to an empty string.
pub fn decode_metadata(header: &str) -> Result<BTreeMap<String, String>, ProtocolError> {
    let mut out = BTreeMap::new();
    for pair in header.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let mut parts = pair.splitn(2, ' ');
        let key = parts.next().unwrap_or_default();
        validate_metadata_key(key)?;

        let value = match parts.next().map(str::trim) {
            Some(encoded) if !encoded.is_empty() => {
                let bytes = STANDARD
                    .decode(encoded)
                    .map_err(|e| ProtocolError::InvalidMetadata(format!("{key}: {e}")))?;
                String::from_utf8(bytes)
                    .map_err(|e| ProtocolError::InvalidMetadata(format!("{key}: {e}")))?
            }
            _ => String::new(),
        };
        out.insert(key.to_string(), value);
    }
    Ok(out)
}
