//! RFC 3261 §17 timers (A–K) plus the T1/T2/T4 base intervals they're all
//! derived from. Grounded on `dialog-core::transaction::timer`'s
//! `TimerSettings`/`Timer`/`TimerType`/`TimerManager`/`TimerFactory` split.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::key::TransactionKey;

/// The letter-named RFC 3261 timers, plus a generic `Cleanup` used by the
/// 30s transaction-table sweep (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerType {
    A,
    B,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
}

impl std::fmt::Display for TimerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// T1/T2/T4 base intervals (RFC 3261 §17.1.1.1), overridable for tests
/// that want faster timers.
#[derive(Debug, Clone, Copy)]
pub struct TimerSettings {
    pub t1: Duration,
    pub t2: Duration,
    pub t4: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        TimerSettings {
            t1: Duration::from_millis(500),
            t2: Duration::from_secs(4),
            t4: Duration::from_secs(5),
        }
    }
}

impl TimerSettings {
    /// Timer B / F: 64*T1 transaction timeout.
    pub fn timeout(&self) -> Duration {
        self.t1 * 64
    }

    /// Timer D: >= 32s on an unreliable transport, 0 on a reliable one.
    pub fn d(&self, reliable: bool) -> Duration {
        if reliable {
            Duration::ZERO
        } else {
            Duration::from_secs(32)
        }
    }

    /// Timer H: 64*T1, same constant as B/F.
    pub fn h(&self) -> Duration {
        self.t1 * 64
    }

    /// Timer I: T4 on unreliable, 0 on reliable.
    pub fn i(&self, reliable: bool) -> Duration {
        if reliable {
            Duration::ZERO
        } else {
            self.t4
        }
    }

    /// Timer J: 64*T1 on unreliable, 0 on reliable.
    pub fn j(&self, reliable: bool) -> Duration {
        if reliable {
            Duration::ZERO
        } else {
            self.t1 * 64
        }
    }

    /// Timer K: T4 on unreliable, 0 on reliable.
    pub fn k(&self, reliable: bool) -> Duration {
        if reliable {
            Duration::ZERO
        } else {
            self.t4
        }
    }

    /// The next retransmit interval for Timer A/E (doubling, capped at T2).
    pub fn next_retransmit(&self, previous: Duration) -> Duration {
        std::cmp::min(previous * 2, self.t2)
    }

    /// The next retransmit interval for Timer G (doubling, capped at T2).
    pub fn next_g(&self, previous: Duration) -> Duration {
        std::cmp::min(previous * 2, self.t2)
    }
}

/// Fires `Tick(TimerType)` on `events_tx` after `duration`, via a
/// `tokio::spawn`'d sleep. The returned handle is abort-on-drop from the
/// caller's side (the transaction event loop holds it and aborts on its
/// own teardown), matching the `JoinHandle` ownership pattern in
/// `ClientTransactionData`/`ServerTransactionData`.
pub struct Timer {
    pub timer_type: TimerType,
    pub key: TransactionKey,
    handle: JoinHandle<()>,
}

impl Timer {
    pub fn schedule(
        timer_type: TimerType,
        key: TransactionKey,
        duration: Duration,
        events_tx: mpsc::Sender<TimerFired>,
    ) -> Self {
        let fire_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            trace!(timer = %timer_type, id = %fire_key, "timer fired");
            let _ = events_tx.send(TimerFired { timer_type, key: fire_key }).await;
        });
        Timer { timer_type, key, handle }
    }

    pub fn cancel(self) {
        self.handle.abort();
    }
}

#[derive(Debug, Clone)]
pub struct TimerFired {
    pub timer_type: TimerType,
    pub key: TransactionKey,
}

/// Builds the standard RFC 3261 timer schedules for each transaction kind,
/// parameterized on whether the transport is reliable (TCP) or not (UDP);
/// unreliable transports get retransmission timers (A, E, G), reliable
/// ones skip them per RFC 3261 §17.1.1.2 / §17.2.1.
pub struct TimerFactory {
    settings: Arc<TimerSettings>,
}

impl Default for TimerFactory {
    fn default() -> Self {
        TimerFactory::new(TimerSettings::default())
    }
}

impl TimerFactory {
    pub fn new(settings: TimerSettings) -> Self {
        TimerFactory {
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> Arc<TimerSettings> {
        self.settings.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_d_is_zero_on_reliable_transport() {
        let s = TimerSettings::default();
        assert_eq!(s.d(true), Duration::ZERO);
        assert_eq!(s.d(false), Duration::from_secs(32));
    }

    #[test]
    fn retransmit_interval_caps_at_t2() {
        let s = TimerSettings::default();
        let mut interval = s.t1;
        for _ in 0..10 {
            interval = s.next_retransmit(interval);
        }
        assert_eq!(interval, s.t2);
    }

    #[tokio::test]
    async fn timer_fires_after_duration() {
        let (tx, mut rx) = mpsc::channel(1);
        let key = TransactionKey::new("z9hG4bK1", "host:5060", &sipswitch_core::Method::Invite);
        let _timer = Timer::schedule(TimerType::A, key.clone(), Duration::from_millis(10), tx);
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.key, key);
        assert_eq!(fired.timer_type, TimerType::A);
    }
}
