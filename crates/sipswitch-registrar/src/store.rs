//! The `RegistrationStore` collaborator interface (spec §6) and an
//! in-memory reference implementation, grounded on
//! `rvoip-registrar-core`'s `LocationService` (a `DashMap<aor, Vec<Contact>>`)
//! generalized with expiry filtering and Call-ID/CSeq anti-replay
//! tracking (spec §3 `RegistrarContact` invariants).

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::contact::RegistrarContact;

/// External collaborator owning persisted registrations (spec §6). This
/// workspace ships only the in-memory implementation below; a
/// production deployment swaps in a durable one without the core
/// noticing, matching how `registrar-core` ships `LocationService` as
/// the default.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn put(&self, contact: RegistrarContact);
    /// Returns the non-expired bindings for `aor`, per spec §8's
    /// testable property: exactly those with `expires_at > now`.
    async fn get(&self, aor: &str) -> Vec<RegistrarContact>;
    async fn delete(&self, aor: &str, uri: &str);
    async fn delete_all(&self, aor: &str);
    /// Removes every row whose `expires_at <= now`, returning what was
    /// removed (spec §4.6 background sweeper).
    async fn sweep_expired(&self) -> Vec<RegistrarContact>;
    /// The last accepted `CSeq` for `(aor, call_id)`, used to reject
    /// out-of-order REGISTERs (RFC 3261 §10.3).
    async fn last_cseq(&self, aor: &str, call_id: &str) -> Option<u32>;
    async fn record_cseq(&self, aor: &str, call_id: &str, cseq: u32);
}

#[derive(Debug, Default)]
pub struct InMemoryRegistrationStore {
    contacts: DashMap<String, Vec<RegistrarContact>>,
    cseqs: DashMap<(String, String), u32>,
}

impl InMemoryRegistrationStore {
    pub fn new() -> Self {
        InMemoryRegistrationStore {
            contacts: DashMap::new(),
            cseqs: DashMap::new(),
        }
    }
}

#[async_trait]
impl RegistrationStore for InMemoryRegistrationStore {
    async fn put(&self, contact: RegistrarContact) {
        let mut entry = self.contacts.entry(contact.aor.clone()).or_default();
        entry.retain(|c| c.uri != contact.uri);
        entry.push(contact);
    }

    async fn get(&self, aor: &str) -> Vec<RegistrarContact> {
        let now = Utc::now();
        self.contacts
            .get(aor)
            .map(|entry| entry.iter().filter(|c| !c.is_expired(now)).cloned().collect())
            .unwrap_or_default()
    }

    async fn delete(&self, aor: &str, uri: &str) {
        if let Some(mut entry) = self.contacts.get_mut(aor) {
            entry.retain(|c| c.uri != uri);
        }
    }

    async fn delete_all(&self, aor: &str) {
        self.contacts.remove(aor);
    }

    async fn sweep_expired(&self) -> Vec<RegistrarContact> {
        let now = Utc::now();
        let mut removed = Vec::new();
        for mut entry in self.contacts.iter_mut() {
            let (kept, expired): (Vec<_>, Vec<_>) =
                entry.value().iter().cloned().partition(|c| !c.is_expired(now));
            *entry.value_mut() = kept;
            removed.extend(expired);
        }
        removed
    }

    async fn last_cseq(&self, aor: &str, call_id: &str) -> Option<u32> {
        self.cseqs.get(&(aor.to_string(), call_id.to_string())).map(|v| *v)
    }

    async fn record_cseq(&self, aor: &str, call_id: &str, cseq: u32) {
        self.cseqs.insert((aor.to_string(), call_id.to_string()), cseq);
    }
}
