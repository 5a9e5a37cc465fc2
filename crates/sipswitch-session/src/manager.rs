//! Session registry, refresh, and expiry-driven termination (spec
//! §4.7). There is no direct teacher file for this component (the
//! teacher's dialog coordination is richer and dialog-oriented); it is
//! grounded on the sweeper-task idiom of the registrar's
//! `RegistrationManager` (periodic interval task) combined with the
//! timer-factory idiom of the transaction layer (a per-entity
//! `tokio::spawn` sleep, cancelled by generation rather than by handle
//! so a racing refresh cannot be dropped mid-flight).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::session::{Refresher, Session};

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Emitted when a session's timer elapses with no intervening refresh;
/// the receiver (server wiring) is responsible for sending BYE to both
/// dialog legs (spec §4.7).
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Expired(Session),
}

struct Entry {
    session: Session,
    generation: u64,
}

pub struct SessionManager {
    sessions: DashMap<String, Entry>,
    events_tx: mpsc::Sender<SessionEvent>,
}

impl SessionManager {
    pub fn new() -> (Arc<Self>, mpsc::Receiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::channel(256);
        let manager = Arc::new(SessionManager {
            sessions: DashMap::new(),
            events_tx,
        });
        manager.clone().spawn_sweeper();
        (manager, events_rx)
    }

    /// Records a newly-established dialog's session timer and arms its
    /// expiry timer (spec §4.7 "On successful dialog establishment").
    pub fn establish(
        self: &Arc<Self>,
        call_id: impl Into<String>,
        from_tag: impl Into<String>,
        to_tag: impl Into<String>,
        session_expires: i64,
        refresher: Refresher,
        min_se: i64,
    ) -> Session {
        let call_id = call_id.into();
        let session = Session {
            call_id: call_id.clone(),
            from_tag: from_tag.into(),
            to_tag: to_tag.into(),
            expires_at: Utc::now() + chrono::Duration::seconds(session_expires.max(min_se)),
            refresher,
            min_se,
        };
        self.sessions.insert(call_id.clone(), Entry { session: session.clone(), generation: 0 });
        self.arm_timer(call_id, 0, Duration::from_secs(session_expires.max(min_se).max(0) as u64));
        session
    }

    /// A re-INVITE/UPDATE refreshed the session: extends `expires_at`
    /// and bumps the generation so the previously-armed timer, when it
    /// eventually fires, finds a stale generation and does nothing.
    pub fn refresh(self: &Arc<Self>, call_id: &str, session_expires: i64) -> Option<Session> {
        let mut entry = self.sessions.get_mut(call_id)?;
        entry.generation += 1;
        entry.session.expires_at = Utc::now() + chrono::Duration::seconds(session_expires.max(entry.session.min_se));
        let generation = entry.generation;
        let session = entry.session.clone();
        drop(entry);
        self.arm_timer(call_id.to_string(), generation, Duration::from_secs(session_expires.max(session.min_se).max(0) as u64));
        Some(session)
    }

    /// A BYE ended the dialog: removes the session without emitting an
    /// expiry event (the caller already knows it ended).
    pub fn terminate(&self, call_id: &str) -> Option<Session> {
        self.sessions.remove(call_id).map(|(_, entry)| entry.session)
    }

    pub fn get(&self, call_id: &str) -> Option<Session> {
        self.sessions.get(call_id).map(|e| e.session.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    fn arm_timer(self: &Arc<Self>, call_id: String, generation: u64, duration: Duration) {
        let manager = self.clone();
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let expired = manager.sessions.get(&call_id).map(|e| e.generation == generation).unwrap_or(false);
            if expired {
                if let Some((_, entry)) = manager.sessions.remove(&call_id) {
                    debug!(call_id = %entry.session.call_id, "session timer expired");
                    let _ = events_tx.send(SessionEvent::Expired(entry.session)).await;
                }
            }
        });
    }

    fn spawn_sweeper(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                let now = Utc::now();
                let stale: Vec<String> = self
                    .sessions
                    .iter()
                    .filter(|e| e.session.is_expired(now))
                    .map(|e| e.key().clone())
                    .collect();
                for call_id in &stale {
                    if let Some((_, entry)) = self.sessions.remove(call_id) {
                        let _ = self.events_tx.send(SessionEvent::Expired(entry.session)).await;
                    }
                }
                if !stale.is_empty() {
                    info!(count = stale.len(), "sweeper cleared stale sessions");
                }
            }
        });
    }
}
