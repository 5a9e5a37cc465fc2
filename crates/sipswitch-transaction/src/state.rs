//! Transaction states across all four state machines (RFC 3261 §17), kept
//! as one enum with unused variants per machine rather than four separate
//! enums, since the transaction table and its cleanup sweeper only ever
//! need to ask "is this terminal".

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransactionState {
    Calling = 0,
    Trying = 1,
    Proceeding = 2,
    Completed = 3,
    Confirmed = 4,
    Terminated = 5,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Terminated)
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => TransactionState::Calling,
            1 => TransactionState::Trying,
            2 => TransactionState::Proceeding,
            3 => TransactionState::Completed,
            4 => TransactionState::Confirmed,
            _ => TransactionState::Terminated,
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionState::Calling => "Calling",
            TransactionState::Trying => "Trying",
            TransactionState::Proceeding => "Proceeding",
            TransactionState::Completed => "Completed",
            TransactionState::Confirmed => "Confirmed",
            TransactionState::Terminated => "Terminated",
        };
        f.write_str(s)
    }
}

/// A lock-free cell holding the current state, shared between the
/// transaction's owning task and any handle callers hold, mirroring
/// `dialog-core`'s `AtomicTransactionState`.
pub struct AtomicTransactionState {
    inner: AtomicU8,
}

impl AtomicTransactionState {
    pub fn new(initial: TransactionState) -> Self {
        AtomicTransactionState {
            inner: AtomicU8::new(initial as u8),
        }
    }

    pub fn get(&self) -> TransactionState {
        TransactionState::from_u8(self.inner.load(Ordering::Acquire))
    }

    /// Transitions never go backwards; terminal states are absorbing
    /// (spec §3 invariants). Returns whether the transition was applied.
    pub fn transition_to(&self, next: TransactionState) -> bool {
        let current = self.get();
        if current.is_terminal() || (next as u8) <= (current as u8) {
            return false;
        }
        self.inner.store(next as u8, Ordering::Release);
        true
    }
}
