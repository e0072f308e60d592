//! PKCE (RFC 7636, S256) and random token generation

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// Random bytes behind a verifier; 32 bytes encode to 43 characters, the RFC minimum.
const VERIFIER_BYTES: usize = 32;

/// Random bytes behind `state` and `nonce` (256 bits)
const TOKEN_BYTES: usize = 32;

fn random_base64url(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a PKCE code verifier: base64url (no padding) of 32 CSPRNG bytes
pub fn generate_verifier() -> String {
    random_base64url(VERIFIER_BYTES)
}

/// `challenge = BASE64URL(SHA256(verifier))`, no padding
pub fn compute_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Unguessable opaque token for `state` and `nonce`
pub fn secure_random_token() -> String {
    random_base64url(TOKEN_BYTES)
}
