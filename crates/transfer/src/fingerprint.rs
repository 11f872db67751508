use sha2::{Digest, Sha256};

use crate::SourceIdentity;

/// Leading bytes hashed for sources that have no stable name.
const DIGEST_PREFIX: usize = 64 * 1024;

/// Computes the hex SHA-256 of the first 64 KiB of `data`.
pub(crate) fn content_digest(data: &[u8]) -> String {
    let head = &data[..data.len().min(DIGEST_PREFIX)];
    hex::encode(Sha256::digest(head))
}

/// Derives the resumption fingerprint of an upload.
///
/// Combines the source identity, its size and the destination endpoint.
/// Returns `None` when the source has nothing stable to identify it by (an
/// anonymous stream), in which case the upload cannot be resumed later.
pub fn fingerprint(identity: &SourceIdentity, size: Option<u64>, endpoint: &str) -> Option<String> {
    if identity.name.is_none() && identity.content_digest.is_none() {
        return None;
    }

    let mut hasher = Sha256::new();
    let fields = [
        identity.kind.to_string(),
        identity.name.clone().unwrap_or_default(),
        identity.content_digest.clone().unwrap_or_default(),
        size.map(|s| s.to_string()).unwrap_or_default(),
        identity.modified_ms.map(|m| m.to_string()).unwrap_or_default(),
        endpoint.to_string(),
    ];
    for field in &fields {
        hasher.update(field.as_bytes());
        hasher.update([0u8]);
    }
    Some(format!("{}-{}", identity.kind, hex::encode(hasher.finalize())))
}
