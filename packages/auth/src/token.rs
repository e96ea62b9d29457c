//! # Session tokens
//!
//! The raw token is the bearer credential handed to the browser in the
//! `auth-session` cookie. Only its SHA-256 digest ever reaches the database, so a
//! leaked `sessions` table does not hand out usable credentials.
//!
//! | Function | Purpose |
//! |----------|---------|
//! | [`generate_session_token`] | 20 random bytes, lowercase base32 without padding (32 chars). |
//! | [`derive_session_id`] | Lowercase hex SHA-256 of the token (64 chars). |

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Number of random bytes in a session token (160 bits).
const TOKEN_BYTES: usize = 20;

/// RFC 4648 base32 alphabet, lowercased.
const BASE32_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Generate a new random session token.
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    encode_base32_lower(&bytes)
}

/// Derive the persisted session id from a raw token.
pub fn derive_session_id(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Base32 encoding with the lowercase alphabet and no `=` padding.
fn encode_base32_lower(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits = 0;

    for &byte in bytes {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }

    out
}
