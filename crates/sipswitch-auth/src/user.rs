//! The `User` record (spec §3) and the `UserStore` collaborator
//! interface the core consumes (spec §6). The core never stores
//! passwords, only the precomputed `HA1 = MD5(username:realm:password)`.

use async_trait::async_trait;
use dashmap::DashMap;

/// A user record as the core needs it: enough to verify a digest
/// response, nothing about how it got there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub realm: String,
    pub ha1_hash: String,
}

/// External collaborator providing `HA1` lookups (spec §6). Production
/// deployments back this with whatever user CRUD storage they run; the
/// core is indifferent to the backing engine.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_ha1(&self, username: &str, realm: &str) -> Option<String>;
}

/// An in-memory `UserStore`, the default when `database.path` is unset
/// and the reference implementation used by tests (spec §6, §SPEC_FULL
/// ambient storage note).
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: DashMap<(String, String), String>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        InMemoryUserStore { users: DashMap::new() }
    }

    /// Registers a user from a plaintext password, computing `HA1` the
    /// way the digest authenticator will recompute it on challenge.
    pub fn add_user(&self, username: impl Into<String>, realm: impl Into<String>, password: &str) {
        let username = username.into();
        let realm = realm.into();
        let ha1 = crate::digest::compute_ha1(&username, &realm, password);
        self.users.insert((username, realm), ha1);
    }

    pub fn add_user_with_ha1(&self, username: impl Into<String>, realm: impl Into<String>, ha1: impl Into<String>) {
        self.users.insert((username.into(), realm.into()), ha1.into());
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get_ha1(&self, username: &str, realm: &str) -> Option<String> {
        self.users
            .get(&(username.to_string(), realm.to_string()))
            .map(|v| v.clone())
    }
}
