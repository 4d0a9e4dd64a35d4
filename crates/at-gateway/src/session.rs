//! Gateway session credentials.
//!
//! The router's login challenge is `sha1(nonce + sha1(password + key))`,
//! hex-encoded, where the nonce embeds a device tag, a client MAC, the
//! current Unix time, and a random number.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use sha1::{Digest, Sha1};
use tokio::time::Instant;

/// Device type tag embedded in every nonce.
const NONCE_DEVICE_TYPE: u8 = 0;

/// Client MAC the router expects in the nonce; any fixed value is accepted.
const NONCE_DEVICE_MAC: &str = "11:22:33:44:55:66";

/// An authenticated gateway session.
///
/// The gateway does not advertise token lifetimes, so `assumed_expiry` is a
/// local estimate used only to avoid logging in on every poll. An unauthorized
/// response is the authoritative expiry signal.
#[derive(Clone)]
pub struct Session {
    pub token: String,
    pub issued_at: Instant,
    pub assumed_expiry: Instant,
    pub nonce: String,
}

impl Session {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.assumed_expiry
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"[REDACTED]")
            .field("issued_at", &self.issued_at)
            .field("assumed_expiry", &self.assumed_expiry)
            .field("nonce", &self.nonce)
            .finish()
    }
}

/// Builds a login nonce from a Unix timestamp and a random value.
pub fn derive_nonce(unix_secs: u64, random: u32) -> String {
    format!("{NONCE_DEVICE_TYPE}_{NONCE_DEVICE_MAC}_{unix_secs}_{random}")
}

/// Builds a nonce for the current time with a random suffix in `0..=9999`.
pub fn fresh_nonce() -> String {
    let unix_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs());
    let random = rand::thread_rng().gen_range(0..=9999);
    derive_nonce(unix_secs, random)
}

/// Derives the login challenge response for `password`.
pub fn encrypt_password(password: &str, key: &str, nonce: &str) -> String {
    let salted = sha1_hex(&format!("{password}{key}"));
    sha1_hex(&format!("{nonce}{salted}"))
}

fn sha1_hex(input: &str) -> String {
    format!("{:x}", Sha1::digest(input.as_bytes()))
}
