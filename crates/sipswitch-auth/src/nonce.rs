//! Nonce lifecycle (spec §3 `Nonce`, §4.5): issuance, validity window,
//! and the "stale" reissue path when only the freshness check fails.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use base64::Engine;
use dashmap::DashMap;
use rand::RngCore;

const DEFAULT_NONCE_EXPIRY: Duration = Duration::from_secs(300);
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A server-issued nonce: `base64(random128 || unix_ts)`, tracked
/// server-side so validity can be revoked early (e.g. on shutdown)
/// rather than relying purely on the embedded timestamp.
#[derive(Debug, Clone)]
pub struct Nonce {
    pub value: String,
    pub issued_at: Instant,
    pub realm: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceValidity {
    Valid,
    /// Known to this server but past its expiry window; the caller
    /// should reissue a fresh challenge with `stale=true`.
    Stale,
    /// Never issued by this server (or already swept).
    Unknown,
}

/// Issues and validates nonces for one realm, matching the
/// `RegistrationManager`/session sweeper idiom elsewhere in this
/// workspace: a `DashMap` plus a periodic interval-based sweeper task.
pub struct NonceManager {
    realm: String,
    expiry: Duration,
    nonces: DashMap<String, Instant>,
}

impl NonceManager {
    pub fn new(realm: impl Into<String>, expiry: Duration) -> Arc<Self> {
        let manager = Arc::new(NonceManager {
            realm: realm.into(),
            expiry,
            nonces: DashMap::new(),
        });
        manager.clone().spawn_sweeper();
        manager
    }

    pub fn with_default_expiry(realm: impl Into<String>) -> Arc<Self> {
        Self::new(realm, DEFAULT_NONCE_EXPIRY)
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Mints a fresh nonce and records its issuance time.
    pub fn issue(&self) -> Nonce {
        let mut random = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut random);
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut payload = random.to_vec();
        payload.extend_from_slice(&ts.to_be_bytes());
        let value = base64::engine::general_purpose::STANDARD.encode(payload);

        let issued_at = Instant::now();
        self.nonces.insert(value.clone(), issued_at);
        Nonce { value, issued_at, realm: self.realm.clone() }
    }

    /// Checks a client-presented nonce against issuance + expiry.
    pub fn validate(&self, value: &str) -> NonceValidity {
        match self.nonces.get(value) {
            Some(issued_at) if issued_at.elapsed() <= self.expiry => NonceValidity::Valid,
            Some(_) => NonceValidity::Stale,
            None => NonceValidity::Unknown,
        }
    }

    /// Invalidates a nonce once it has been used to authenticate
    /// successfully once under Digest's simple (non-qop) mode would be
    /// overly strict for a stateless proxy; this server instead just
    /// lets it ride out its expiry window, matching RFC 2617's "nonce
    /// count" being optional.
    pub fn forget(&self, value: &str) {
        self.nonces.remove(value);
    }

    fn spawn_sweeper(self: Arc<Self>) {
        let expiry = self.expiry;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                self.nonces.retain(|_, issued_at| issued_at.elapsed() <= expiry * 2);
            }
        });
    }
}
