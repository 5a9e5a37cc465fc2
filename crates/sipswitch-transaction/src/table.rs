//! The transaction table (spec §4.3): a mapping keyed by `(branch,
//! sent-by, method_or_"INVITE-for-ACK")`, sharded the way
//! `dashmap::DashMap` already shards internally by key hash, matching
//! the whole-workspace sharding approach of spec §5. Client and server
//! transactions never collide in this table since they're looked up
//! through separate maps — a branch can legitimately name both a client
//! transaction this server opened and a server transaction it received.
//!
//! Cleanup runs periodically (every 30s, spec §4.3) in addition to the
//! transaction event loops' own terminal-state timers; the sweep here is
//! a backstop for entries whose `Terminated` event was missed (e.g. the
//! `mpsc` receiver lagged) rather than the primary removal path.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use crate::client::ClientTransactionData;
use crate::key::TransactionKey;
use crate::server::ServerTransactionData;

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

pub struct TransactionTable {
    clients: DashMap<TransactionKey, Arc<ClientTransactionData>>,
    servers: DashMap<TransactionKey, Arc<ServerTransactionData>>,
}

impl TransactionTable {
    pub fn new() -> Arc<Self> {
        let table = Arc::new(TransactionTable {
            clients: DashMap::new(),
            servers: DashMap::new(),
        });
        table.clone().spawn_sweeper();
        table
    }

    pub fn insert_client(&self, data: Arc<ClientTransactionData>) {
        self.clients.insert(data.id.clone(), data);
    }

    pub fn insert_server(&self, data: Arc<ServerTransactionData>) {
        self.servers.insert(data.id.clone(), data);
    }

    /// Locates a client transaction by the RFC 3261 §17.2.3 matching
    /// rule, used to route an incoming response.
    pub fn find_client(&self, key: &TransactionKey) -> Option<Arc<ClientTransactionData>> {
        self.clients.get(key).map(|e| e.value().clone())
    }

    /// Locates a server transaction, used both to detect a retransmitted
    /// request and to route an ACK to a non-2xx INVITE response (the
    /// ACK's key collapses onto the INVITE key, see [`TransactionKey`]).
    pub fn find_server(&self, key: &TransactionKey) -> Option<Arc<ServerTransactionData>> {
        self.servers.get(key).map(|e| e.value().clone())
    }

    pub fn remove_client(&self, key: &TransactionKey) {
        self.clients.remove(key);
    }

    pub fn remove_server(&self, key: &TransactionKey) {
        self.servers.remove(key);
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    fn spawn_sweeper(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                let before = self.clients.len() + self.servers.len();
                self.clients.retain(|_, data| !data.state.get().is_terminal());
                self.servers.retain(|_, data| !data.state.get().is_terminal());
                let removed = before - (self.clients.len() + self.servers.len());
                if removed > 0 {
                    debug!(removed, "swept terminated transactions");
                }
            }
        });
    }
}
