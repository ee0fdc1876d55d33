//! Content-integrity digests for downloaded artifacts.
//!
//! Digests are self-describing, SRI style: an algorithm prefix followed by
//! the standard-base64 digest of the bytes (`sha512-<base64>`). The full
//! string is what gets pinned in the lockfile and compared on later runs.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha512};

/// Algorithm prefix carried by every digest this engine produces.
pub const SRI_PREFIX: &str = "sha512-";

/// Compute the integrity digest of a response body.
pub fn digest(bytes: &[u8]) -> String {
    let hash = Sha512::digest(bytes);
    format!("{}{}", SRI_PREFIX, STANDARD.encode(hash))
}

/// Check a body against a pinned integrity value.
///
/// Comparison is exact over the full self-describing string, so a pin made
/// with a different algorithm never verifies.
pub fn matches(bytes: &[u8], pinned: &str) -> bool {
    digest(bytes) == pinned
}
