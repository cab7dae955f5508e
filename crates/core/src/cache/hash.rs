//! Canonical request keys for cache entries.

use sha2::{Digest, Sha256};

/// Compute the cache key for a request.
///
/// Keys are method-qualified so a GET entry can never answer another
/// method. The URL is expected to be canonical already (no fragment).
pub fn request_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
