//! Single-use login nonces
//!
//! Every login mints a nonce that the broker echoes back inside the ID token.
//! Consuming it removes it, so a captured token cannot be replayed while it is
//! still within its validity window.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{ApiError, Result};
use crate::platform::Clock;

const NONCE_BYTES: usize = 32;

/// In-memory nonce store
///
/// The whole map sits behind one mutex: mint, consume and expiry purging all
/// run under the same lock, so two concurrent consumes of one nonce cannot
/// both succeed.
pub struct NonceRegistry {
    entries: Mutex<HashMap<String, u64>>,
}

impl NonceRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Generate and record a fresh nonce valid for `ttl_secs`
    pub fn mint(&self, ttl_secs: u64, clock: &dyn Clock) -> String {
        let now = clock.now_secs();
        let mut entries = self.lock();
        purge_expired(&mut entries, now);

        let nonce = loop {
            let candidate = generate_nonce();
            if !entries.contains_key(&candidate) {
                break candidate;
            }
        };

        entries.insert(nonce.clone(), now.saturating_add(ttl_secs));
        nonce
    }

    /// Consume a nonce. Unknown, already used and expired nonces all fail the same way.
    pub fn consume(&self, nonce: &str, clock: &dyn Clock) -> Result<()> {
        let now = clock.now_secs();
        let mut entries = self.lock();
        purge_expired(&mut entries, now);

        match entries.remove(nonce) {
            Some(_) => Ok(()),
            None => Err(ApiError::Nonce),
        }
    }

    /// Number of live or not-yet-purged entries
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn insert(&self, nonce: &str, expires_at: u64) {
        self.lock().insert(nonce.to_string(), expires_at);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        // Every critical section leaves the map consistent, so a panic elsewhere
        // while holding the lock does not invalidate it.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for NonceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn purge_expired(entries: &mut HashMap<String, u64>, now: u64) {
    entries.retain(|_, expires_at| *expires_at >= now);
}

fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
