//! Entity tag generation.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

/// Number of base64 characters of the digest kept in the tag.
const HASH_LEN: usize = 27;

/// Generates a weak entity tag for a response body.
///
/// The tag has the form `W/"<length in hex>-<hash>"`, where the hash is the
/// base64 SHA-256 digest of the body truncated to 27 characters. Equal
/// bodies always produce equal tags.
pub fn generate(body: &[u8]) -> String {
    let digest = STANDARD.encode(Sha256::digest(body));
    let hash = &digest[..HASH_LEN.min(digest.len())];
    format!("W/\"{:x}-{hash}\"", body.len())
}
